#![no_main]

use libfuzzer_sys::fuzz_target;
use loopfuse::prelude::*;

const LEN: usize = 8;

/// Builds a chain of counted loops from `data`. Each loop takes three bytes:
/// which bound it runs to, which earlier array it reads, and the read offset.
fn build(data: &[u8]) -> Option<(SsaFunction, Vec<Argument>)> {
    let (&head, rest) = data.split_first()?;
    let count = usize::from(head % 4) + 2;
    let specs: Vec<(bool, usize, i64)> = rest
        .chunks_exact(3)
        .take(count)
        .map(|c| (c[0] % 2 == 0, usize::from(c[1]), i64::from(c[2] % 3) - 1))
        .collect();
    if specs.len() < 2 {
        return None;
    }
    let count = specs.len();

    let ssa = SsaFunctionBuilder::new("fuzz").build_with(|f| {
        let arrays: Vec<SsaVarId> = (0..count).map(|_| f.param()).collect();
        let (n, m) = (f.param(), f.param());
        let (zero, one) = f.block(0, |b| {
            let consts = (b.const_i64(0), b.const_i64(1));
            b.jump(1);
            consts
        });
        for (k, &(use_n, source, shift)) in specs.iter().enumerate() {
            let base = 4 * k;
            let next = f.var();
            let i = f.block(base + 1, |b| {
                let i = b.phi(&[(base, zero), (base + 3, next)]);
                let c = b.cmp(CmpKind::Lt, i, if use_n { n } else { m });
                b.branch(c, base + 2, base + 4);
                i
            });
            f.block(base + 2, |b| {
                let value = if k == 0 {
                    i
                } else {
                    let offset = b.const_i64(shift);
                    let index = b.add(i, offset);
                    b.load(arrays[source % k], index)
                };
                b.store(arrays[k], i, value);
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
    });

    let bound = |byte: Option<&u8>| i64::from(byte.copied().unwrap_or(0) % 6);
    let mut args: Vec<Argument> = (0..count).map(|_| Argument::Array(vec![0; LEN])).collect();
    args.push(Argument::Int(bound(data.get(1))));
    args.push(Argument::Int(bound(data.get(2))));
    Some((ssa, args))
}

fuzz_target!(|data: &[u8]| {
    let Some((ssa, args)) = build(data) else {
        return;
    };

    let mut fused = ssa.clone();
    let config = FusionConfig {
        verify_after_merge: true,
        ..FusionConfig::default()
    };
    LoopFusionPass::new()
        .run_function(&mut fused, &config, &EventLog::new())
        .expect("fusion of a well-formed function succeeds");

    // Reads at offset -1 from index 0 fault; both versions must then fault.
    let before = SsaEvaluator::new(&ssa).run(&args);
    let after = SsaEvaluator::new(&fused).run(&args);
    match (before, after) {
        (Ok(before), Ok(after)) => assert_eq!(before.memory, after.memory),
        (Err(_), Err(_)) => {}
        (before, after) => panic!("fusion changed behavior: {before:?} vs {after:?}"),
    }
});
