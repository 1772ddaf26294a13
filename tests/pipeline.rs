//! Pass pipeline integration tests.
//!
//! Runs the fusion pass through the scheduler over a context holding several
//! functions at once and checks what each function ends up with.

use loopfuse::prelude::*;

/// `count` loops over `0..n`, loop `k` storing into its own array parameter.
fn loops(name: &str, count: usize) -> SsaFunction {
    SsaFunctionBuilder::new(name).build_with(|f| {
        let arrays: Vec<SsaVarId> = (0..count).map(|_| f.param()).collect();
        let n = f.param();
        let (zero, one) = f.block(0, |bb| {
            let consts = (bb.const_i64(0), bb.const_i64(1));
            bb.jump(1);
            consts
        });
        for (k, &array) in arrays.iter().enumerate() {
            let base = 4 * k;
            let next = f.var();
            let i = f.block(base + 1, |bb| {
                let i = bb.phi(&[(base, zero), (base + 3, next)]);
                let c = bb.cmp(CmpKind::Lt, i, n);
                bb.branch(c, base + 2, base + 4);
                i
            });
            f.block(base + 2, |bb| {
                let v = bb.add(i, one);
                bb.store(array, i, v);
                bb.jump(base + 3);
            });
            f.block(base + 3, |bb| {
                bb.add_into(next, i, one);
                bb.jump(base + 1);
            });
            if k + 1 < count {
                f.block(base + 4, |bb| bb.jump(base + 5));
            }
        }
        f.block(4 * count, |bb| bb.ret());
    })
}

/// Two loops whose bounds differ: never fused.
fn mismatched() -> SsaFunction {
    SsaFunctionBuilder::new("mismatched").build_with(|f| {
        let (a, n, m) = (f.param(), f.param(), f.param());
        let (i_next, j_next) = (f.var(), f.var());
        let (zero, one) = f.block(0, |bb| {
            let consts = (bb.const_i64(0), bb.const_i64(1));
            bb.jump(1);
            consts
        });
        let i = f.block(1, |bb| {
            let i = bb.phi(&[(0, zero), (3, i_next)]);
            let c = bb.cmp(CmpKind::Lt, i, n);
            bb.branch(c, 2, 4);
            i
        });
        f.block(2, |bb| {
            bb.store(a, i, i);
            bb.jump(3);
        });
        f.block(3, |bb| {
            bb.add_into(i_next, i, one);
            bb.jump(1);
        });
        f.block(4, |bb| bb.jump(5));
        let j = f.block(5, |bb| {
            let j = bb.phi(&[(4, zero), (7, j_next)]);
            let c = bb.cmp(CmpKind::Lt, j, m);
            bb.branch(c, 6, 8);
            j
        });
        f.block(6, |bb| {
            bb.store(a, j, one);
            bb.jump(7);
        });
        f.block(7, |bb| {
            bb.add_into(j_next, j, one);
            bb.jump(5);
        });
        f.block(8, |bb| bb.ret());
    })
}

fn straight_line() -> SsaFunction {
    SsaFunctionBuilder::new("straight").build_with(|f| {
        let x = f.param();
        f.block(0, |bb| {
            let y = bb.add(x, x);
            bb.ret_val(y);
        });
    })
}

fn scheduler(ctx: &CompilerContext) -> PassScheduler {
    let mut scheduler = PassScheduler::from_context(ctx);
    scheduler.add_pass(Box::new(LoopFusionPass::new()));
    scheduler
}

#[test]
fn test_pipeline_over_many_functions() -> Result<()> {
    let ctx = CompilerContext::new(CompilerConfig::verifying());
    ctx.add_function(loops("pair", 2));
    ctx.add_function(loops("quad", 4));
    ctx.add_function(mismatched());
    ctx.add_function(straight_line());

    let iterations = scheduler(&ctx).run_pipeline(&ctx)?;
    // one iteration fuses, the next confirms the fixpoint
    assert_eq!(iterations, 2);

    assert!(ctx.was_changed("pair"));
    assert!(ctx.was_changed("quad"));
    assert!(!ctx.was_changed("mismatched"));
    assert!(!ctx.was_changed("straight"));

    assert_eq!(ctx.with_function("pair", |f| f.analyze_loops().len()), Some(1));
    assert_eq!(ctx.with_function("quad", |f| f.analyze_loops().len()), Some(1));
    assert_eq!(ctx.with_function("mismatched", |f| f.analyze_loops().len()), Some(2));

    let stats = DerivedStats::from_log(&ctx.events)
        .with_iterations(iterations)
        .with_time(ctx.elapsed());
    assert_eq!(stats.loops_fused, 1 + 3);
    assert_eq!(stats.induction_variables_unified, 4);
    assert_eq!(stats.functions_transformed, 2);
    // the mismatched pair is reported once per iteration
    assert_eq!(stats.fusions_rejected, 2);
    assert_eq!(stats.errors, 0);
    assert!(stats.summary().starts_with("2 functions, 4 loops fused"));
    Ok(())
}

#[test]
fn test_pipeline_preserves_semantics() -> Result<()> {
    let original = loops("quad", 4);
    let ctx = CompilerContext::default();
    ctx.add_function(original.clone());
    scheduler(&ctx).run_pipeline(&ctx)?;

    let fused = ctx.take_function("quad")?;
    fused.validate()?;
    for n in [0, 3, 5] {
        let args: Vec<Argument> = (0..4)
            .map(|_| Argument::Array(vec![0; 5]))
            .chain([Argument::Int(n)])
            .collect();
        let before = SsaEvaluator::new(&original).run(&args)?;
        let after = SsaEvaluator::new(&fused).run(&args)?;
        assert_eq!(before.memory, after.memory, "n = {n}");
        assert!(after.steps < before.steps || n == 0);
    }
    Ok(())
}

#[test]
fn test_pass_events_are_attributed() -> Result<()> {
    let ctx = CompilerContext::default();
    ctx.add_function(loops("pair", 2));
    scheduler(&ctx).run_pipeline(&ctx)?;

    let fused: Vec<&Event> = ctx.events.filter_kind(EventKind::LoopsFused).collect();
    assert_eq!(fused.len(), 1);
    assert_eq!(fused[0].function.as_deref(), Some("pair"));
    assert_eq!(fused[0].pass.as_deref(), Some("loop-fusion"));
    assert!(ctx.events.has(EventKind::PassStarted));
    assert!(ctx.events.has(EventKind::PassCompleted));
    assert_eq!(ctx.events.filter_function("pair").count(), ctx.events.transformations().count());
    Ok(())
}

#[test]
fn test_missing_function() {
    let ctx = CompilerContext::default();
    assert!(matches!(
        ctx.take_function("nowhere"),
        Err(Error::FunctionNotFound(name)) if name == "nowhere"
    ));
}
