#![no_main]

use libfuzzer_sys::fuzz_target;
use irflow::{
    ir::{Instr, Label, Operand, Scope, Variable},
    CalleeTable, CompileUnit, CompilerConfig, Pipeline,
};

/// Decodes two bytes per instruction into a small, label-heavy instruction set.
fn decode(data: &[u8], scope: &mut Scope) -> Vec<Instr> {
    let labels: Vec<Label> = (0..8).map(|_| scope.new_label()).collect();
    let var = |b: u8| Variable::local(format!("v{}", b % 4));
    data.chunks_exact(2)
        .map(|pair| {
            let (kind, arg) = (pair[0], pair[1]);
            let label = labels[usize::from(arg % 8)];
            match kind % 12 {
                0 => Instr::Label(label),
                1 => Instr::Branch { cond: var(arg).into(), target: label },
                2 => Instr::Jump(label),
                3 => Instr::Return(var(arg).into()),
                4 => Instr::Throw(Operand::Nil),
                5 => Instr::RegionStart { rescue: label, ensure: None },
                6 => Instr::RegionEnd,
                7 => Instr::Call {
                    dst: Some(var(arg)),
                    receiver: Operand::Nil,
                    method: "callee".to_string(),
                    args: vec![Operand::Fixnum(i64::from(arg))],
                    closure: None,
                },
                8 => Instr::Op { dst: None, name: "raise".to_string(), args: vec![], raises: true },
                9 => Instr::Case {
                    value: var(arg).into(),
                    arms: vec![(Operand::Fixnum(1), label)],
                    default: labels[usize::from(arg / 8 % 8)],
                },
                10 => Instr::Copy { dst: var(arg), src: Operand::Fixnum(i64::from(arg)) },
                _ => Instr::Op { dst: Some(var(arg)), name: "op".to_string(), args: vec![], raises: false },
            }
        })
        .collect()
}

fuzz_target!(|data: &[u8]| {
    let (callee_data, host_data) = data.split_at(data.len() / 3 & !1);
    let config = CompilerConfig::default().with_parallel(false);

    let mut callee_scope = Scope::new("callee");
    let callee = decode(callee_data, &mut callee_scope);
    let callees = CalleeTable::from_units([CompileUnit::new(callee_scope, callee)], &config)
        .unwrap_or_default();

    let mut scope = Scope::new("host");
    let instrs = decode(host_data, &mut scope);
    match Pipeline::new(config).compile(CompileUnit::new(scope, instrs), &callees) {
        Ok(compiled) => assert!(compiled.cfg.validate().is_ok()),
        // Bad input is fine; a broken invariant is a bug.
        Err(err) => assert!(!err.is_internal(), "{err}"),
    }
});
