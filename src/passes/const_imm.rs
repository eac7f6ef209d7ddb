//! Immediate legalization: hardware constants and immediate materialization.
//!
//! Immediates whose bit pattern is in the constant register file (see
//! [`op::CONST_REGS`](crate::op::CONST_REGS)) are replaced with that register,
//! keeping their modifiers. Any other immediate read by something other than
//! `Mov` gets its own `Mov` into a fresh SSA value, right before the reader.

use crate::builder::Builder;
use crate::op::const_reg_for;
use crate::{FuncDef, Op, Ref, RegClass, Shader};

pub fn const_imm(shader: &mut Shader) -> bool {
    let mut changed = false;
    for (_, func_def) in shader.funcs.iter_mut() {
        changed |= const_imm_func(func_def);
    }
    changed
}

pub fn const_imm_func(func_def: &mut FuncDef) -> bool {
    let mut changed = false;
    for inst in func_def.collect_insts() {
        let op = func_def.insts[inst].op;
        for i in 0..func_def.insts[inst].srcs.len() {
            let src = func_def.insts[inst].srcs[i];
            let Some(bits) = src.as_imm() else {
                continue;
            };

            let new_src = if let Some(const_reg) = const_reg_for(bits) {
                src.with_base_of(Ref::reg(RegClass::Const, const_reg))
            } else if op != Op::Mov {
                let value = Ref::ssa(func_def.alloc_ssa())
                    .with_data_type(src.data_type())
                    .with_width(src.width());
                Builder::before(func_def, inst).mov(value, src.base());
                src.with_base_of(value)
            } else {
                continue;
            };
            func_def.insts[inst].srcs[i] = new_src;
            changed = true;
        }
    }
    changed
}
