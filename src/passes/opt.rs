//! Copy propagation.
//!
//! A `Mov` of an SSA value (or constant register) into a scalar SSA value,
//! with no modifiers anywhere and executing unconditionally, is a pure copy:
//! every later read of its destination can read its source instead. The
//! copies themselves are left for `dce` to remove.

use crate::transform::rewrite_refs;
use crate::visit::RefRole;
use crate::{ExecCond, FuncDef, InstDef, IrForm, Op, Ref, RefKind, RegClass, Shader};
use rustc_hash::FxHashMap;

pub fn copy_prop(shader: &mut Shader) -> bool {
    let mut changed = false;
    for (_, func_def) in shader.funcs.iter_mut() {
        changed |= copy_prop_func(func_def);
    }
    changed
}

fn copy_source(inst_def: &InstDef) -> Option<(u32, Ref)> {
    if inst_def.op != Op::Mov || inst_def.exec_cond != ExecCond::Always || !inst_def.mods.is_empty() {
        return None;
    }
    let (dst, src) = (inst_def.dsts[0], inst_def.srcs[0]);

    let plain = |r: Ref| r.mods().is_empty() && r.elem() == 0 && r.lanes() == 1;
    if !(dst.is_ssa() && plain(dst) && plain(src)) {
        return None;
    }
    let propagatable = match src.kind() {
        RefKind::Ssa => true,
        RefKind::Reg => src.reg_class() == Some(RegClass::Const),
        _ => false,
    };
    propagatable.then(|| (dst.value(), src))
}

pub fn copy_prop_func(func_def: &mut FuncDef) -> bool {
    let copies: FxHashMap<u32, Ref> = func_def
        .collect_insts()
        .into_iter()
        .filter_map(|inst| copy_source(&func_def.insts[inst]))
        .collect();
    if copies.is_empty() {
        return false;
    }

    let resolve = |mut value: Ref| {
        // Copies of copies, all the way to the original value.
        while let Some(&src) = value.ssa_idx().and_then(|idx| copies.get(&idx)) {
            value = src;
        }
        value
    };

    // NOTE(tilir) phi sources are left alone, as they're only coalesced with
    // the phi itself during register allocation (which copies would break).
    let changed = rewrite_refs(func_def, IrForm::Scalar, |r, role| {
        if role != RefRole::Use || !r.is_ssa() || !copies.contains_key(&r.value()) {
            return None;
        }
        Some(r.with_base_of(resolve(r.base())))
    });
    tracing::debug!(func = func_def.index, copies = copies.len(), changed, "copy propagation");
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::{FuncRole, PhiSrc};

    #[test]
    fn chains_are_resolved() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        let (a, x, y, z) = (b.ssa(), b.ssa(), b.ssa(), b.ssa());
        b.alu2(Op::Fmul, a, Ref::temp(0), Ref::temp(1));
        b.mov(x, a);
        b.mov(y, x);
        let user = b.alu2(Op::Fadd, z, y.neg(), Ref::reg(RegClass::Const, 1));

        assert!(copy_prop_func(&mut f));
        assert_eq!(f.insts[user].srcs.as_slice(), [a.neg(), Ref::reg(RegClass::Const, 1)]);
    }

    #[test]
    fn non_copies_and_phis_are_kept() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        let (x, y, z, w) = (b.ssa(), b.ssa(), b.ssa(), b.ssa());
        b.mov(x, Ref::temp(3));
        // Modifiers on the source make this more than a copy.
        b.mov(y, Ref::reg(RegClass::Const, 1).neg());
        let block = b.block();
        let c = b.ssa();
        b.mov(c, x);
        let phi = b.phi(z, [PhiSrc { block, value: c }]);
        let user = b.alu2(Op::Fadd, w, x, y);

        // The only copy (`c`) is only read by a phi.
        assert!(!copy_prop_func(&mut f));
        assert_eq!(f.insts[phi].phi_srcs()[0].value, c);
        assert_eq!(f.insts[user].srcs.as_slice(), [x, y]);
    }
}
