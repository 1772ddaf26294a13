//! Benchmarks for loop fusion.
//!
//! Measures the legality checks and the complete pass on chains of adjacent
//! counted loops:
//! - Legality of one pair in a long chain
//! - The fusion pass over chains of increasing length
//! - The pass scheduler over many independent functions

extern crate loopfuse;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use loopfuse::prelude::*;
use std::hint::black_box;

/// `count` loops over `0..n`; loop `k` reads array `k - 1` and writes array
/// `k` at the same index, so neighbouring loops meet in the same iteration.
fn chain(name: &str, count: usize) -> SsaFunction {
    SsaFunctionBuilder::new(name).build_with(|f| {
        let arrays: Vec<SsaVarId> = (0..count).map(|_| f.param()).collect();
        let n = f.param();
        let (zero, one) = f.block(0, |b| {
            let consts = (b.const_i64(0), b.const_i64(1));
            b.jump(1);
            consts
        });
        for k in 0..count {
            let base = 4 * k;
            let next = f.var();
            let i = f.block(base + 1, |b| {
                let i = b.phi(&[(base, zero), (base + 3, next)]);
                let c = b.cmp(CmpKind::Lt, i, n);
                b.branch(c, base + 2, base + 4);
                i
            });
            f.block(base + 2, |b| {
                let v = if k == 0 {
                    i
                } else {
                    let prev = b.load(arrays[k - 1], i);
                    b.add(prev, one)
                };
                b.store(arrays[k], i, v);
                b.jump(base + 3);
            });
            f.block(base + 3, |b| {
                b.add_into(next, i, one);
                b.jump(base + 1);
            });
            if k + 1 < count {
                f.block(base + 4, |b| b.jump(base + 5));
            }
        }
        f.block(4 * count, |b| b.ret());
    })
}

/// Benchmark the legality verdict for the first pair of a 32-loop chain.
fn bench_legality_pair(c: &mut Criterion) {
    let ssa = chain("chain32", 32);
    let forest = ssa.analyze_loops();
    let order: Vec<LoopId> = forest.top_level_loops().into_iter().rev().collect();
    let config = FusionConfig::default();

    c.bench_function("fusion_legality_pair", |b| {
        b.iter(|| {
            let analyses = AnalysisManager::new();
            let verdict = LegalityChecker::new(&ssa, &forest, &analyses, &config)
                .check(black_box(order[0]), black_box(order[1]));
            black_box(verdict)
        });
    });
}

/// Benchmark the fusion pass over chains of increasing length.
fn bench_fusion_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("fusion_pass");
    for count in [2, 8, 32] {
        let ssa = chain("chain", count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &ssa, |b, ssa| {
            b.iter(|| {
                let mut work = ssa.clone();
                let events = EventLog::new();
                let preserved = LoopFusionPass::new()
                    .run_function(&mut work, &FusionConfig::default(), &events)
                    .unwrap();
                black_box((preserved, work))
            });
        });
    }
    group.finish();
}

/// Benchmark the scheduler over 64 functions of 8 loops each.
fn bench_pipeline(c: &mut Criterion) {
    let functions: Vec<SsaFunction> = (0..64)
        .map(|index| chain(&format!("f{index}"), 8))
        .collect();

    c.bench_function("fusion_pipeline_64x8", |b| {
        b.iter(|| {
            let ctx = CompilerContext::default();
            for ssa in &functions {
                ctx.add_function(ssa.clone());
            }
            let mut scheduler = PassScheduler::from_context(&ctx);
            scheduler.add_pass(Box::new(LoopFusionPass::new()));
            let iterations = scheduler.run_pipeline(&ctx).unwrap();
            black_box(iterations)
        });
    });
}

criterion_group!(
    benches,
    bench_legality_pair,
    bench_fusion_pass,
    bench_pipeline
);
criterion_main!(benches);
