//! End-to-end scenarios for graph construction, inlining and linearization.
//!
//! These tests drive the public API only:
//! 1. Build instruction lists with `InstrBuilder`
//! 2. Build control flow graphs
//! 3. Inline methods and closures, directly or through the pipeline
//! 4. Linearize and inspect the emitted stream

use irflow::{
    analysis::{BlockFlags, EdgeType},
    ir::{Instr, InstrBuilder, Label, Operand, Scope, Variable},
    utils::graph::NodeId,
    CalleeTable, CfgInliner, CompileUnit, CompilerConfig, ControlFlowGraph, Error, EventKind,
    EventLog, Linearizer, Pipeline, RejectReason, Result,
};

fn op(name: &str) -> Instr {
    Instr::Op {
        dst: None,
        name: name.to_string(),
        args: vec![],
        raises: false,
    }
}

fn build(scope: &mut Scope, instrs: Vec<Instr>) -> Result<ControlFlowGraph> {
    ControlFlowGraph::build(scope, instrs, &CompilerConfig::default())
}

/// `[L0: i1; BRANCH L1; i2; L1: i3]`
fn branch_scenario(scope: &mut Scope) -> (Vec<Instr>, Label, Label) {
    let l0 = scope.new_label();
    let l1 = scope.new_label();
    let instrs = InstrBuilder::new()
        .label(l0)
        .push(op("i1"))
        .branch(Variable::local("c"), l1)
        .push(op("i2"))
        .label(l1)
        .push(op("i3"))
        .build();
    (instrs, l0, l1)
}

#[test]
fn scenario_a_branch_builds_three_blocks() -> Result<()> {
    let mut scope = Scope::new("scenario_a");
    let (instrs, l0, l1) = branch_scenario(&mut scope);
    let cfg = build(&mut scope, instrs.clone())?;

    let b0 = cfg.block_for_label(l0).unwrap();
    let b2 = cfg.block_for_label(l1).unwrap();
    let b1 = cfg.fall_through_successor(b0).unwrap();

    assert_eq!(cfg.block(b0).unwrap().instrs(), &instrs[1..3]);
    assert_eq!(cfg.block(b1).unwrap().instrs(), &instrs[3..4]);
    assert_eq!(cfg.block(b2).unwrap().instrs(), &instrs[5..]);

    assert_eq!(cfg.outgoing(b0).len(), 2);
    assert!(cfg.has_edge(b0, b1, EdgeType::FallThrough));
    assert!(cfg.has_edge(b0, b2, EdgeType::Branch));
    assert_eq!(cfg.fall_through_successor(b1), Some(b2));
    // Dummy entry and exit plus the three blocks.
    assert_eq!(cfg.block_count(), 5);
    Ok(())
}

#[test]
fn scenario_a_linearizes_unchanged() -> Result<()> {
    let mut scope = Scope::new("scenario_a");
    let (instrs, _, _) = branch_scenario(&mut scope);
    let cfg = build(&mut scope, instrs.clone())?;

    let linear = Linearizer::new(&EventLog::new()).linearize(&cfg)?;
    assert_eq!(linear.instructions(), instrs);
    assert_eq!(linear.jumps_inserted, 0);
    assert_eq!(linear.returns_inserted, 0);
    Ok(())
}

#[test]
fn scenario_b_straight_line_callee_merges_into_one_block() -> Result<()> {
    let config = CompilerConfig::default();
    let events = EventLog::new();

    let mut callee_scope = Scope::new("compute");
    let v = Variable::local("v");
    let callee = build(
        &mut callee_scope,
        InstrBuilder::new()
            .op(v.clone(), "i1", vec![])
            .ret(v.clone())
            .build(),
    )?;

    let mut scope = Scope::new("scenario_b");
    let r = Variable::local("r");
    let mut cfg = build(
        &mut scope,
        InstrBuilder::new()
            .push(op("before"))
            .call(r.clone(), Operand::Nil, "compute", vec![])
            .push(op("after"))
            .ret(r.clone())
            .build(),
    )?;

    let (block, index) = cfg.call_sites()[0];
    CfgInliner::new(&config, &events).inline_method(&mut cfg, &mut scope, block, index, &callee)?;

    assert_eq!(cfg.block_count(), 3);
    let instrs = cfg.block(block).unwrap().instrs();
    assert_eq!(instrs.len(), 5);
    assert_eq!(instrs[0], op("before"));

    // The callee's local became a host temporary.
    let temp = match &instrs[1] {
        Instr::Op { dst: Some(dst), name, .. } if name == "i1" => dst.clone(),
        other => panic!("expected the callee body, got {other}"),
    };
    assert_ne!(temp, v);
    assert_eq!(
        instrs[2],
        Instr::Copy {
            dst: r.clone(),
            src: Operand::Var(temp)
        }
    );
    assert_eq!(instrs[3], op("after"));
    assert_eq!(instrs[4], Instr::Return(Operand::Var(r)));
    cfg.validate()?;
    Ok(())
}

#[test]
fn scenario_c_protected_throw_reaches_caller_handler() -> Result<()> {
    let config = CompilerConfig::default();
    let events = EventLog::new();

    let mut callee_scope = Scope::new("fail");
    let callee = build(
        &mut callee_scope,
        InstrBuilder::new()
            .push(op("prepare"))
            .throw(Variable::local("err"))
            .build(),
    )?;
    let raiser = callee.find_instrs(|i| matches!(i, Instr::Throw(_)))[0].0;
    assert!(callee.has_edge(raiser, callee.exit(), EdgeType::Exception));

    let mut scope = Scope::new("scenario_c");
    let rescue = scope.new_label();
    let mut cfg = build(
        &mut scope,
        InstrBuilder::new()
            .region_start(rescue, None)
            .call(None, Operand::Nil, "fail", vec![])
            .region_end()
            .ret(Operand::Nil)
            .label(rescue)
            .ret(Operand::Fixnum(1))
            .build(),
    )?;
    let handler = cfg.block_for_label(rescue).unwrap();

    let (block, index) = cfg.call_sites()[0];
    CfgInliner::new(&config, &events).inline_method(&mut cfg, &mut scope, block, index, &callee)?;

    let throws = cfg.find_instrs(|i| matches!(i, Instr::Throw(_)));
    assert_eq!(throws.len(), 1);
    let thrower = throws[0].0;
    assert!(cfg.has_edge(thrower, handler, EdgeType::Exception));
    assert!(!cfg.has_edge(thrower, cfg.exit(), EdgeType::Exception));
    assert_eq!(cfg.rescuer(thrower), Some(handler));
    assert!(cfg
        .block(handler)
        .unwrap()
        .flags()
        .contains(BlockFlags::RESCUE_ENTRY));
    cfg.validate()?;
    Ok(())
}

#[test]
fn scenario_d_two_yield_sites_reject_without_mutation() -> Result<()> {
    let config = CompilerConfig::default();
    let events = EventLog::new();

    let mut callee_scope = Scope::new("twice");
    let callee = build(
        &mut callee_scope,
        InstrBuilder::new()
            .yield_block(None, vec![Operand::Fixnum(1)])
            .yield_block(None, vec![Operand::Fixnum(2)])
            .ret(Operand::Nil)
            .build(),
    )?;

    let mut scope = Scope::new("scenario_d");
    let closure = scope.define_closure(vec![Instr::ClosureReturn(Operand::Nil)]);
    let mut cfg = build(
        &mut scope,
        InstrBuilder::new()
            .call_with_closure(None, Operand::Nil, "twice", vec![], closure)
            .ret(Operand::Nil)
            .build(),
    )?;
    let before = cfg.to_string();
    let labels_before = scope.label_count();

    let (block, index) = cfg.call_sites()[0];
    let err = CfgInliner::new(&config, &events)
        .inline_method(&mut cfg, &mut scope, block, index, &callee)
        .unwrap_err();

    assert!(err.is_recoverable());
    assert_eq!(err.reject_reason(), Some(&RejectReason::MultipleYieldSites(2)));
    assert_eq!(cfg.to_string(), before);
    assert_eq!(scope.label_count(), labels_before);
    assert!(!scope.is_consumed(closure));
    assert_eq!(cfg.call_sites(), vec![(block, index)]);
    Ok(())
}

#[test]
fn scenario_d_through_pipeline_keeps_the_call() -> Result<()> {
    let callees = CalleeTable::from_units(
        [CompileUnit::new(
            Scope::new("twice"),
            InstrBuilder::new()
                .yield_block(None, vec![])
                .yield_block(None, vec![])
                .ret(Operand::Nil)
                .build(),
        )],
        &CompilerConfig::default(),
    )?;

    let mut scope = Scope::new("main");
    let closure = scope.define_closure(vec![Instr::ClosureReturn(Operand::Nil)]);
    let instrs = InstrBuilder::new()
        .call_with_closure(None, Operand::Nil, "twice", vec![], closure)
        .ret(Operand::Nil)
        .build();

    let compiled = Pipeline::default().compile(CompileUnit::new(scope, instrs), &callees)?;
    assert_eq!(compiled.cfg.call_sites().len(), 1);
    assert_eq!(compiled.events.count_kind(EventKind::InlineRejected), 1);
    assert_eq!(compiled.events.warnings().count(), 1);
    assert!(!compiled.scope.is_consumed(closure));
    Ok(())
}

#[test]
fn closure_in_method_inlines_end_to_end() -> Result<()> {
    let x = Variable::local("x");
    let callees = CalleeTable::from_units(
        [CompileUnit::new(
            Scope::new("each_once"),
            InstrBuilder::new()
                .receive_arg(x.clone(), 0)
                .yield_block(None, vec![x.into()])
                .ret(Operand::Nil)
                .build(),
        )],
        &CompilerConfig::default(),
    )?;

    let mut scope = Scope::new("main");
    let y = Variable::local("y");
    let closure = scope.define_closure(
        InstrBuilder::new()
            .receive_arg(y.clone(), 0)
            .op(None, "print", vec![y.into(), Variable::outer("total", 1).into()])
            .closure_return(Operand::Nil)
            .build(),
    );
    let instrs = InstrBuilder::new()
        .copy(Variable::local("total"), 0i64)
        .call_with_closure(None, Operand::Nil, "each_once", vec![Operand::Fixnum(5)], closure)
        .ret(Operand::Nil)
        .build();

    let compiled = Pipeline::default().compile(CompileUnit::new(scope, instrs), &callees)?;

    assert!(compiled.events.has(EventKind::MethodInlined));
    assert!(compiled.events.has(EventKind::ClosureInlined));
    assert!(compiled.scope.is_consumed(closure));
    assert!(compiled.cfg.call_sites().is_empty());
    assert!(compiled
        .cfg
        .find_instrs(|i| matches!(i, Instr::Yield { .. }))
        .is_empty());

    // The closure's outer reference now names the host's own local.
    let stream = compiled.linearization.instructions();
    let print = stream
        .iter()
        .find_map(|i| match i {
            Instr::Op { name, args, .. } if name == "print" => Some(args.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(print[1], Operand::Var(Variable::local("total")));
    assert_ne!(print[0], Operand::Var(Variable::local("y")));
    Ok(())
}

#[test]
fn closure_is_consumed_once() -> Result<()> {
    let config = CompilerConfig::default();
    let events = EventLog::new();

    let mut scope = Scope::new("twice");
    let closure = scope.define_closure(vec![Instr::ClosureReturn(Operand::Fixnum(7))]);
    let r = Variable::local("r");
    let mut cfg = build(
        &mut scope,
        InstrBuilder::new()
            .yield_to(r.clone(), closure, vec![])
            .yield_to(None, closure, vec![])
            .ret(r)
            .build(),
    )?;
    let inliner = CfgInliner::new(&config, &events);

    let sites = cfg.find_instrs(|i| matches!(i, Instr::Yield { .. }));
    let (block, index) = sites[0];
    inliner.inline_closure(&mut cfg, &mut scope, block, index)?;
    assert!(scope.is_consumed(closure));

    let sites = cfg.find_instrs(|i| matches!(i, Instr::Yield { .. }));
    assert_eq!(sites.len(), 1);
    let before = cfg.to_string();
    let err = inliner
        .inline_closure(&mut cfg, &mut scope, sites[0].0, sites[0].1)
        .unwrap_err();
    assert_eq!(err.reject_reason(), Some(&RejectReason::ClosureConsumed(closure.id())));
    assert_eq!(cfg.to_string(), before);
    Ok(())
}

#[test]
fn exception_edge_to_exit_does_not_count_as_fall_through() -> Result<()> {
    let mut scope = Scope::new("tie_break");
    let other = scope.new_label();
    let tail = scope.new_label();
    let cfg = build(
        &mut scope,
        InstrBuilder::new()
            .branch(Variable::local("c"), other)
            .jump(tail)
            .label(other)
            .throw(Operand::Nil)
            .label(tail)
            .raising_op(None, "last", vec![])
            .build(),
    )?;

    // `other` only leaves through an exception edge into the exit; it must not get a
    // `Return nil` or a jump appended.
    let thrower = cfg.block_for_label(other).unwrap();
    assert!(cfg.has_edge(thrower, cfg.exit(), EdgeType::Exception));
    assert!(!cfg.has_edge(thrower, cfg.exit(), EdgeType::Exit));

    let linear = Linearizer::new(&EventLog::new()).linearize(&cfg)?;
    let placed = &linear.blocks[linear.position(thrower).unwrap()];
    assert_eq!(placed.instrs, vec![Instr::Throw(Operand::Nil)]);

    // The raising tail falls off the scope and gets an explicit return.
    let last = cfg.block_for_label(tail).unwrap();
    let placed = &linear.blocks[linear.position(last).unwrap()];
    assert_eq!(placed.instrs.last(), Some(&Instr::Return(Operand::Nil)));
    Ok(())
}

#[test]
fn unplaced_block_is_reported_as_internal() -> Result<()> {
    let mut scope = Scope::new("orphan");
    let mut cfg = build(&mut scope, InstrBuilder::new().ret(Operand::Nil).build())?;
    let orphan = cfg.new_block(&mut scope);

    match Linearizer::new(&EventLog::new()).linearize(&cfg) {
        Err(err @ Error::UnplacedBlock { .. }) => {
            assert!(err.is_internal());
            assert!(!err.is_recoverable());
            assert!(err.to_string().contains(&orphan.to_string()));
        }
        other => panic!("expected an unplaced block, got {other:?}"),
    }
    Ok(())
}

#[test]
fn structural_errors_reject_the_scope() {
    let mut scope = Scope::new("broken");
    let missing = scope.new_label();
    let err = build(&mut scope, InstrBuilder::new().jump(missing).build()).unwrap_err();
    assert!(matches!(err, Error::UndefinedLabel { label, .. } if label == missing));

    let mut scope = Scope::new("twice");
    let l = scope.new_label();
    let err = build(
        &mut scope,
        InstrBuilder::new()
            .label(l)
            .push(op("a"))
            .label(l)
            .ret(Operand::Nil)
            .build(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateLabel { label, .. } if label == l));

    let mut scope = Scope::new("open");
    let rescue = scope.new_label();
    let err = build(
        &mut scope,
        InstrBuilder::new()
            .region_start(rescue, None)
            .ret(Operand::Nil)
            .build(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnbalancedRegion { .. }));
    assert!(!err.is_recoverable());
    assert!(!err.is_internal());
}

#[test]
fn compile_all_reports_each_scope() {
    let units = vec![
        CompileUnit::new(
            Scope::new("ok"),
            InstrBuilder::new().ret(Operand::Nil).build(),
        ),
        CompileUnit::new(Scope::new("bad"), vec![Instr::RegionEnd]),
    ];
    let results = Pipeline::default().compile_all(units, &CalleeTable::new());
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().map(|c| c.scope.name()).ok(), Some("ok"));
    assert!(results[1].is_err());
    // Block ids are stable and start after the two dummies.
    let compiled = results[0].as_ref().unwrap();
    assert!(compiled.cfg.block(NodeId::new(2)).is_some());
}
