//! SSA validation: every SSA value is defined exactly once, before any use.
//!
//! "Before" here means earlier in program order (see [`cf::next_block`]),
//! not "dominating": this is a single linear scan, so it accepts e.g. a value
//! defined in an `If`'s "then" arm and used in its "else" arm. Frontends are
//! expected to only produce properly dominated uses, and the scan exists to
//! catch passes that break the ordering (or reuse SSA indices).

use crate::func_at::FuncAt;
use crate::{Func, FuncDef, FuncRole, IrForm, Node, NodeKind, PredReg, Ref, Shader, cf};
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValidationErrorKind {
    UseBeforeDef,
    DoubleDef,
    /// SSA index not allocated through the function's counter.
    OutOfRange,
    /// Phi source naming a value defined nowhere.
    Undefined,
    /// `If` conditioned on anything other than (possibly inverted) `p0`.
    NonP0Condition,
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ValidationErrorKind::UseBeforeDef => "use before definition",
            ValidationErrorKind::DoubleDef => "redefinition",
            ValidationErrorKind::OutOfRange => "out-of-range SSA index",
            ValidationErrorKind::Undefined => "undefined value",
            ValidationErrorKind::NonP0Condition => "`If` condition other than `p0`",
        })
    }
}

/// Where (and why) validation failed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error(
    "SSA validation failed: {kind} of `{reference}` in {} in block #{block} of {func_role:?} function #{func}",
    describe_location(.inst, .group)
)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub reference: Ref,
    /// Instruction index (`None` for `If` conditions).
    pub inst: Option<u32>,
    /// Group index (bundled form only).
    pub group: Option<u32>,
    pub block: u32,
    pub func: u32,
    pub func_role: FuncRole,
}

fn describe_location(inst: &Option<u32>, group: &Option<u32>) -> String {
    let mut location = match inst {
        Some(inst) => format!("instruction #{inst}"),
        None => "the control-flow tree".to_string(),
    };
    if let Some(group) = group {
        location += &format!(" (group #{group})");
    }
    location
}

/// Fixed-size bitset, one bit per SSA index.
struct SsaBitSet {
    words: Vec<u64>,
}

impl SsaBitSet {
    fn new(len: u32) -> Self {
        Self { words: vec![0; (len as usize).div_ceil(64)] }
    }

    fn contains(&self, idx: u32) -> bool {
        (self.words[idx as usize / 64] & (1 << (idx % 64))) != 0
    }

    fn insert(&mut self, idx: u32) {
        self.words[idx as usize / 64] |= 1 << (idx % 64);
    }
}

/// Validate every function of `shader`, in its current form.
pub fn validate_shader(shader: &Shader) -> Result<(), ValidationError> {
    for func in shader.funcs.keys() {
        validate_func(shader, func)?;
    }
    Ok(())
}

pub fn validate_func(shader: &Shader, func: Func) -> Result<(), ValidationError> {
    Validator::new(&shader.funcs[func], shader.form()).run()
}

struct Validator<'a> {
    func_def: &'a FuncDef,
    form: IrForm,
    defined: SsaBitSet,
}

impl<'a> Validator<'a> {
    fn new(func_def: &'a FuncDef, form: IrForm) -> Self {
        Self { func_def, form, defined: SsaBitSet::new(func_def.counters.ssa) }
    }

    fn error(
        &self,
        kind: ValidationErrorKind,
        reference: Ref,
        inst: Option<u32>,
        group: Option<u32>,
        block: Node,
    ) -> ValidationError {
        ValidationError {
            kind,
            reference,
            inst,
            group,
            block: self.func_def.nodes[block].index,
            func: self.func_def.index,
            func_role: self.func_def.role,
        }
    }

    fn run(mut self) -> Result<(), ValidationError> {
        let func_def = self.func_def;
        let root = func_def.root;

        for param in &func_def.params {
            if let Some(idx) = param.value.ssa_idx() {
                self.define(idx, param.value, None, None, root)?;
            }
        }

        let func_at = func_def.at(self.form, root);
        for block in func_at.blocks() {
            match self.form {
                IrForm::Scalar => {
                    for inst in block.at_insts() {
                        self.scan_inst(inst, None, block.position)?;
                    }
                }
                IrForm::Bundled => {
                    for group in block.at_groups() {
                        let group_idx = group.def().index;
                        for (_, inst) in group.insts() {
                            self.scan_inst(inst, Some(group_idx), block.position)?;
                        }
                    }
                }
            }
        }

        // Uses outside the linear instruction stream only need a definition.
        for block in func_at.blocks() {
            let insts: Vec<FuncAt<'_, crate::Inst>> = match self.form {
                IrForm::Scalar => block.at_insts().into_iter().collect(),
                IrForm::Bundled => {
                    block.at_groups().into_iter().flat_map(|g| g.insts().map(|(_, i)| i)).collect()
                }
            };
            for inst in insts {
                let inst_def = inst.def();
                for phi_src in inst_def.phi_srcs() {
                    self.check_defined_somewhere(phi_src.value, Some(inst_def.index), block.position)?;
                }
            }
        }
        for (node, node_def) in func_def.nodes.iter() {
            if let NodeKind::If { cond, .. } = node_def.kind {
                // Detached nodes aren't part of the program.
                if node_def.parent.is_some() {
                    let block = cf::first_block_in(&func_def.nodes, node).unwrap_or(root);
                    if cond.as_pred() != Some(PredReg::P0) {
                        return Err(self.error(ValidationErrorKind::NonP0Condition, cond, None, None, block));
                    }
                }
            }
        }

        Ok(())
    }

    fn scan_inst(
        &mut self,
        inst: FuncAt<'a, crate::Inst>,
        group: Option<u32>,
        block: Node,
    ) -> Result<(), ValidationError> {
        let inst_def = inst.def();
        for &src in &inst_def.srcs {
            if let Some(idx) = src.ssa_idx() {
                if idx >= self.func_def.counters.ssa {
                    return Err(self.error(ValidationErrorKind::OutOfRange, src, Some(inst_def.index), group, block));
                }
                if !self.defined.contains(idx) {
                    return Err(self.error(ValidationErrorKind::UseBeforeDef, src, Some(inst_def.index), group, block));
                }
            }
        }
        for &dst in &inst_def.dsts {
            if let Some(idx) = dst.ssa_idx() {
                self.define(idx, dst, Some(inst_def.index), group, block)?;
            }
        }
        Ok(())
    }

    fn define(
        &mut self,
        idx: u32,
        reference: Ref,
        inst: Option<u32>,
        group: Option<u32>,
        block: Node,
    ) -> Result<(), ValidationError> {
        if idx >= self.func_def.counters.ssa {
            return Err(self.error(ValidationErrorKind::OutOfRange, reference, inst, group, block));
        }
        if self.defined.contains(idx) {
            return Err(self.error(ValidationErrorKind::DoubleDef, reference, inst, group, block));
        }
        self.defined.insert(idx);
        Ok(())
    }

    fn check_defined_somewhere(
        &self,
        reference: Ref,
        inst: Option<u32>,
        block: Node,
    ) -> Result<(), ValidationError> {
        match reference.ssa_idx() {
            Some(idx) if idx >= self.func_def.counters.ssa => {
                Err(self.error(ValidationErrorKind::OutOfRange, reference, inst, None, block))
            }
            Some(idx) if !self.defined.contains(idx) => {
                Err(self.error(ValidationErrorKind::Undefined, reference, inst, None, block))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::TstCmp;
    use crate::{Context, Op, PhiSrc, RegClass, ShaderStage};
    use std::rc::Rc;

    fn shader() -> (Shader, Func) {
        let mut shader = Shader::new(Rc::new(Context::default()), ShaderStage::Fragment);
        let func = shader.add_func(FuncRole::Entrypoint);
        (shader, func)
    }

    #[test]
    fn accepts_well_ordered_function() {
        let (mut shader, func) = shader();
        let mut b = shader.builder(func);
        let x = b.param(crate::DataType::Float, crate::BitWidth::B32);
        let y = b.ssa();
        b.alu2(Op::Fmul, y, x, x);
        b.tst(TstCmp::Lt, y, Ref::imm_f32(0.5));
        let if_node = b.push_if(Ref::pred(PredReg::P0));
        let z = b.ssa();
        b.mov(z, y);
        b.exit_if(if_node);
        b.mov(Ref::reg(RegClass::PixOut, 0), y);
        assert_eq!(validate_shader(&shader), Ok(()));
    }

    #[test]
    fn rejects_use_before_def() {
        let (mut shader, func) = shader();
        let mut b = shader.builder(func);
        let x = b.ssa();
        let y = b.ssa();
        b.mov(y, x);
        b.mov(x, Ref::imm(1));

        let err = validate_shader(&shader).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UseBeforeDef);
        assert_eq!(err.reference, x);
        assert_eq!(err.inst, Some(0));
        assert_eq!(err.func_role, FuncRole::Entrypoint);
        assert!(err.to_string().contains("use before definition of `%0` in instruction #0"), "{err}");
    }

    #[test]
    fn rejects_double_def() {
        let (mut shader, func) = shader();
        let mut b = shader.builder(func);
        let x = b.ssa();
        b.mov(x, Ref::imm(1));
        b.mov(x, Ref::imm(2));

        let err = validate_shader(&shader).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::DoubleDef);
        assert_eq!(err.inst, Some(1));
    }

    #[test]
    fn rejects_unallocated_ssa() {
        let (mut shader, func) = shader();
        let mut b = shader.builder(func);
        b.mov(Ref::ssa(7), Ref::imm(1));
        assert_eq!(validate_shader(&shader).unwrap_err().kind, ValidationErrorKind::OutOfRange);
    }

    #[test]
    fn phi_sources_only_need_a_definition() {
        let (mut shader, func) = shader();
        let mut b = shader.builder(func);
        let init = b.ssa();
        b.mov(init, Ref::imm(0));
        let entry = b.block();
        let loop_node = b.push_loop();
        let header = b.block();
        let (acc, next) = (b.ssa(), b.ssa());
        // `next` is only defined later in the loop (the backedge).
        b.phi(acc, [PhiSrc { block: entry, value: init }, PhiSrc { block: header, value: next }]);
        b.alu2(Op::Iadd, next, acc, Ref::imm(1));
        b.exit_loop(loop_node);
        assert_eq!(validate_shader(&shader), Ok(()));

        let missing = push_phi_with_missing_src(&mut shader, func);
        let err = validate_shader(&shader).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Undefined);
        assert_eq!(err.reference, missing);
    }

    fn push_phi_with_missing_src(shader: &mut Shader, func: Func) -> Ref {
        let mut b = shader.builder(func);
        let block = b.block();
        let (dst, never_defined) = (b.ssa(), b.ssa());
        b.phi(dst, [PhiSrc { block, value: never_defined }]);
        never_defined
    }

    #[test]
    fn rejects_if_on_other_predicates() {
        let (mut shader, func) = shader();
        let mut b = shader.builder(func);
        let if_node = b.push_if(Ref::pred(PredReg::Pe));
        b.mov(Ref::reg(RegClass::PixOut, 0), Ref::imm(1));
        b.exit_if(if_node);

        let err = validate_shader(&shader).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::NonP0Condition);
        assert_eq!(err.reference, Ref::pred(PredReg::Pe));
        assert_eq!(err.inst, None);
        assert!(err.to_string().contains("in the control-flow tree"), "{err}");

        // Inverted `p0` is fine.
        if let NodeKind::If { cond, .. } = &mut shader.funcs[func].nodes[if_node].kind {
            *cond = Ref::pred(PredReg::P0).not();
        }
        assert_eq!(validate_shader(&shader), Ok(()));
    }

    #[test]
    fn validation_is_idempotent() {
        let (mut shader, func) = shader();
        let mut b = shader.builder(func);
        let x = b.ssa();
        b.mov(Ref::reg(RegClass::PixOut, 0), x);

        let first = validate_shader(&shader);
        let second = validate_shader(&shader);
        assert!(first.is_err());
        assert_eq!(first, second);
        assert_eq!(first.unwrap_err().to_string(), second.unwrap_err().to_string());
    }
}
