//! Per-inlining rename context.

use std::collections::HashMap;

use crate::{
    ir::{Instr, Label, Operand, Scope, Variable},
    utils::graph::NodeId,
};

/// What kind of body is being spliced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineMode {
    /// A callee method body replacing a `Call`.
    Method,
    /// A closure body replacing a `Yield`.
    Closure,
}

/// What happened to one body instruction during cloning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rewrite {
    /// Emit the instruction.
    Keep(Instr),
    /// Emit the instruction and remember it as a yield to the call's closure.
    YieldSite(Instr),
    /// The instruction has no counterpart in the host.
    Drop,
}

/// Rename and substitution state for one inlining operation.
///
/// Labels and variables of the inlined body are translated into the host scope on
/// first sight ("get or create") so every later occurrence maps to the same host
/// identifier. Blocks are mapped as they are cloned. The call (or yield) operands are
/// captured up front so the body's receive instructions can be replaced by copies.
#[derive(Debug, Clone)]
pub struct InlinerInfo {
    mode: InlineMode,
    label_rename: HashMap<Label, Label>,
    var_rename: HashMap<Variable, Variable>,
    block_rename: HashMap<NodeId, NodeId>,
    call_args: Vec<Operand>,
    call_receiver: Operand,
    call_closure: Option<Operand>,
    call_result: Option<Variable>,
    yield_sites: Vec<(NodeId, usize)>,
}

impl InlinerInfo {
    fn new(mode: InlineMode, receiver: Operand) -> Self {
        InlinerInfo {
            mode,
            label_rename: HashMap::new(),
            var_rename: HashMap::new(),
            block_rename: HashMap::new(),
            call_args: Vec::new(),
            call_receiver: receiver,
            call_closure: None,
            call_result: None,
            yield_sites: Vec::new(),
        }
    }

    /// Captures the operands of a `Call`. Returns `None` for any other instruction.
    #[must_use]
    pub fn for_call(instr: &Instr) -> Option<Self> {
        let Instr::Call {
            dst,
            receiver,
            args,
            closure,
            ..
        } = instr
        else {
            return None;
        };
        let mut info = Self::new(InlineMode::Method, receiver.clone());
        info.call_args = args.clone();
        info.call_closure = closure.clone();
        info.call_result = dst.clone();
        Some(info)
    }

    /// Captures the operands of a `Yield`. Returns `None` for any other instruction.
    ///
    /// The closure's `self` is the host's `%self`.
    #[must_use]
    pub fn for_yield(instr: &Instr) -> Option<Self> {
        let Instr::Yield { dst, args, .. } = instr else {
            return None;
        };
        let mut info = Self::new(InlineMode::Closure, Operand::Var(Variable::self_var()));
        info.call_args = args.clone();
        info.call_result = dst.clone();
        Some(info)
    }

    /// Returns the inlining mode.
    #[must_use]
    pub fn mode(&self) -> InlineMode {
        self.mode
    }

    /// Returns the captured receiver.
    #[must_use]
    pub fn call_receiver(&self) -> &Operand {
        &self.call_receiver
    }

    /// Returns the captured positional arguments.
    #[must_use]
    pub fn call_args(&self) -> &[Operand] {
        &self.call_args
    }

    /// Returns the captured block argument.
    #[must_use]
    pub fn call_closure(&self) -> Option<&Operand> {
        self.call_closure.as_ref()
    }

    /// Returns the captured result slot.
    #[must_use]
    pub fn call_result(&self) -> Option<&Variable> {
        self.call_result.as_ref()
    }

    /// Returns the yields to the call's closure found while cloning, as host
    /// positions.
    #[must_use]
    pub fn yield_sites(&self) -> &[(NodeId, usize)] {
        &self.yield_sites
    }

    /// Maps a body label to its host label, issuing a fresh one on first sight.
    pub fn rename_label(&mut self, scope: &mut Scope, label: Label) -> Label {
        *self
            .label_rename
            .entry(label)
            .or_insert_with(|| scope.new_label())
    }

    /// Maps a body variable to its host variable.
    ///
    /// Method bodies get a fresh temporary for every variable. Closure bodies get fresh
    /// temporaries for their own temporaries and locals, while locals of enclosing
    /// scopes move one level inward.
    pub fn rename_var(&mut self, scope: &mut Scope, var: &Variable) -> Variable {
        if let Some(renamed) = self.var_rename.get(var) {
            return renamed.clone();
        }
        let renamed = match (self.mode, var) {
            (InlineMode::Closure, Variable::Local { name, depth }) if *depth > 0 => {
                Variable::outer(name.clone(), depth - 1)
            }
            _ => scope.new_temp(),
        };
        self.var_rename.insert(var.clone(), renamed.clone());
        renamed
    }

    /// Records that body block `body` was cloned as host block `host`.
    pub fn map_block(&mut self, body: NodeId, host: NodeId) {
        self.block_rename.insert(body, host);
    }

    /// Returns the host clone of body block `body`.
    #[must_use]
    pub fn mapped_block(&self, body: NodeId) -> Option<NodeId> {
        self.block_rename.get(&body).copied()
    }

    /// Returns the whole block map.
    #[must_use]
    pub fn block_map(&self) -> &HashMap<NodeId, NodeId> {
        &self.block_rename
    }

    pub(crate) fn add_yield_site(&mut self, block: NodeId, index: usize) {
        self.yield_sites.push((block, index));
    }

    /// Keeps yield sites valid after `absorbed` was appended to `absorber` at
    /// `offset`.
    pub fn block_merged(&mut self, absorbed: NodeId, absorber: NodeId, offset: usize) {
        for site in &mut self.yield_sites {
            if site.0 == absorbed {
                *site = (absorber, site.1 + offset);
            }
        }
    }

    /// Renames one body instruction into the host and applies the mode's
    /// substitutions.
    pub(crate) fn rewrite(&mut self, scope: &mut Scope, instr: &Instr) -> Rewrite {
        let mut instr = instr.clone();
        instr.for_each_label_mut(|label| *label = self.rename_label(scope, *label));
        instr.for_each_variable_mut(|var| *var = self.rename_var(scope, var));

        match (self.mode, instr) {
            (_, Instr::ReceiveSelf(dst)) => Rewrite::Keep(Instr::Copy {
                dst,
                src: self.call_receiver.clone(),
            }),
            (_, Instr::ReceiveArg { dst, index }) => Rewrite::Keep(Instr::Copy {
                dst,
                src: self.call_args.get(index).cloned().unwrap_or(Operand::Nil),
            }),
            (_, Instr::ReceiveClosure(dst)) => Rewrite::Keep(Instr::Copy {
                dst,
                src: self.call_closure.clone().unwrap_or(Operand::Nil),
            }),
            (InlineMode::Method, Instr::Return(value))
            | (InlineMode::Closure, Instr::ClosureReturn(value)) => match &self.call_result {
                Some(result) => Rewrite::Keep(Instr::Copy {
                    dst: result.clone(),
                    src: value,
                }),
                None => Rewrite::Drop,
            },
            (
                InlineMode::Method,
                Instr::Yield {
                    dst,
                    closure: None,
                    args,
                },
            ) => Rewrite::YieldSite(Instr::Yield {
                dst,
                closure: Some(self.call_closure.clone().unwrap_or(Operand::Nil)),
                args,
            }),
            (_, instr) => Rewrite::Keep(instr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ClosureId;

    fn call() -> Instr {
        Instr::Call {
            dst: Some(Variable::local("r")),
            receiver: Operand::Var(Variable::local("obj")),
            method: "each".into(),
            args: vec![Operand::Fixnum(7)],
            closure: Some(Operand::Closure(ClosureId(0))),
        }
    }

    #[test]
    fn test_capture() {
        let info = InlinerInfo::for_call(&call()).unwrap();
        assert_eq!(info.mode(), InlineMode::Method);
        assert_eq!(info.call_args(), &[Operand::Fixnum(7)]);
        assert_eq!(info.call_result(), Some(&Variable::local("r")));
        assert!(InlinerInfo::for_call(&Instr::RegionEnd).is_none());

        let yield_instr = Instr::Yield {
            dst: None,
            closure: None,
            args: vec![],
        };
        let info = InlinerInfo::for_yield(&yield_instr).unwrap();
        assert_eq!(info.call_receiver(), &Operand::Var(Variable::self_var()));
    }

    #[test]
    fn test_renames_are_get_or_create() {
        let mut scope = Scope::new("host");
        let mut info = InlinerInfo::for_call(&call()).unwrap();
        let l = Label::new(40);
        let first = info.rename_label(&mut scope, l);
        assert_eq!(info.rename_label(&mut scope, l), first);
        assert_eq!(scope.label_count(), 1);

        let x = Variable::local("x");
        let renamed = info.rename_var(&mut scope, &x);
        assert_eq!(renamed, Variable::Temp(0));
        assert_eq!(info.rename_var(&mut scope, &x), renamed);
        assert_eq!(scope.temp_count(), 1);
    }

    #[test]
    fn test_closure_depths_shift_inward() {
        let mut scope = Scope::new("host");
        let yield_instr = Instr::Yield {
            dst: None,
            closure: None,
            args: vec![],
        };
        let mut info = InlinerInfo::for_yield(&yield_instr).unwrap();
        assert_eq!(
            info.rename_var(&mut scope, &Variable::outer("sum", 1)),
            Variable::local("sum")
        );
        assert_eq!(
            info.rename_var(&mut scope, &Variable::outer("deep", 2)),
            Variable::outer("deep", 1)
        );
        assert!(matches!(
            info.rename_var(&mut scope, &Variable::local("item")),
            Variable::Temp(_)
        ));
    }

    #[test]
    fn test_method_rewrites() {
        let mut scope = Scope::new("host");
        let mut info = InlinerInfo::for_call(&call()).unwrap();

        let arg = info.rewrite(
            &mut scope,
            &Instr::ReceiveArg {
                dst: Variable::local("a"),
                index: 0,
            },
        );
        assert_eq!(
            arg,
            Rewrite::Keep(Instr::Copy {
                dst: Variable::Temp(0),
                src: Operand::Fixnum(7),
            })
        );

        let missing = info.rewrite(
            &mut scope,
            &Instr::ReceiveArg {
                dst: Variable::local("b"),
                index: 3,
            },
        );
        assert!(matches!(missing, Rewrite::Keep(Instr::Copy { src: Operand::Nil, .. })));

        let ret = info.rewrite(&mut scope, &Instr::Return(Operand::Var(Variable::local("a"))));
        assert_eq!(
            ret,
            Rewrite::Keep(Instr::Copy {
                dst: Variable::local("r"),
                src: Operand::Var(Variable::Temp(0)),
            })
        );

        let yielded = info.rewrite(
            &mut scope,
            &Instr::Yield {
                dst: None,
                closure: None,
                args: vec![],
            },
        );
        assert!(matches!(
            yielded,
            Rewrite::YieldSite(Instr::Yield {
                closure: Some(Operand::Closure(_)),
                ..
            })
        ));
    }

    #[test]
    fn test_closure_rewrites() {
        let mut scope = Scope::new("host");
        let yield_instr = Instr::Yield {
            dst: None,
            closure: None,
            args: vec![Operand::Fixnum(1)],
        };
        let mut info = InlinerInfo::for_yield(&yield_instr).unwrap();

        let ret = info.rewrite(&mut scope, &Instr::ClosureReturn(Operand::Nil));
        assert_eq!(ret, Rewrite::Drop);

        let me = info.rewrite(&mut scope, &Instr::ReceiveSelf(Variable::self_var()));
        assert!(matches!(
            me,
            Rewrite::Keep(Instr::Copy { src: Operand::Var(ref v), .. }) if *v == Variable::self_var()
        ));

        let outer_yield = Instr::Yield {
            dst: None,
            closure: None,
            args: vec![],
        };
        assert_eq!(info.rewrite(&mut scope, &outer_yield), Rewrite::Keep(outer_yield));

        let non_local = info.rewrite(&mut scope, &Instr::Return(Operand::Nil));
        assert_eq!(non_local, Rewrite::Keep(Instr::Return(Operand::Nil)));
    }

    #[test]
    fn test_yield_sites_follow_merges() {
        let mut info = InlinerInfo::for_call(&call()).unwrap();
        info.add_yield_site(NodeId::new(5), 1);
        info.block_merged(NodeId::new(5), NodeId::new(2), 3);
        assert_eq!(info.yield_sites(), &[(NodeId::new(2), 4)]);
    }
}
