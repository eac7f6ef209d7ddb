//! Dead code elimination, iterated until nothing else can be removed.

use crate::visit::{RefRole, for_each_ref};
use crate::{Consumer, FuncDef, Inst, IrForm, Shader};
use rustc_hash::FxHashSet;

pub fn dce(shader: &mut Shader) -> bool {
    let mut changed = false;
    for (_, func_def) in shader.funcs.iter_mut() {
        changed |= dce_func(func_def);
    }
    changed
}

pub fn dce_func(func_def: &mut FuncDef) -> bool {
    let mut removed = 0;
    loop {
        let mut used = FxHashSet::default();
        for_each_ref(func_def, IrForm::Scalar, |r, role| {
            if role != RefRole::Def {
                used.extend(r.ssa_idx());
            }
        });

        let dead: Vec<Inst> =
            func_def.collect_insts().into_iter().filter(|&inst| is_dead(func_def, inst, &used)).collect();
        if dead.is_empty() {
            break;
        }
        removed += dead.len();
        for inst in dead {
            func_def.delete_inst(inst);
        }
    }

    if removed > 0 {
        tracing::debug!(func = func_def.index, removed, "removed dead instructions");
    }
    removed > 0
}

fn is_dead(func_def: &FuncDef, inst: Inst, used: &FxHashSet<u32>) -> bool {
    let inst_def = &func_def.insts[inst];
    if inst_def.has_side_effects() || inst_def.end {
        return false;
    }
    // Writes to anything but SSA values are observable.
    if !inst_def.dsts.iter().all(|dst| dst.is_none() || dst.is_ssa()) {
        return false;
    }
    if let Some(vec) = func_def.vec_info.get(&inst) {
        if vec.consumer != Consumer::None {
            return false;
        }
    }
    inst_def.dsts.iter().filter_map(|dst| dst.ssa_idx()).all(|idx| !used.contains(&idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::{FuncRole, Op, PhiSrc, Ref, RegClass};

    #[test]
    fn removes_dead_chains() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        let (x, y, z) = (b.ssa(), b.ssa(), b.ssa());
        b.mov(x, Ref::temp(0));
        b.alu2(Op::Fadd, y, x, x);
        // Only `z` has an observable effect, through the output register.
        let live = b.mov(z, Ref::temp(1));
        let out = b.mov(Ref::reg(RegClass::PixOut, 0), z);
        let store = b.st(Ref::temp(2), Ref::temp(3));

        assert!(dce_func(&mut f));
        assert_eq!(f.collect_insts(), [live, out, store]);
        assert!(!dce_func(&mut f));
    }

    #[test]
    fn vectors_use_consumer_record() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        let v = b.ssa_vec(2);
        let fitr = b.fitr(v, Ref::reg(RegClass::Coeff, 0));
        let x = b.ssa();
        b.mov(x, v.with_lanes(1).with_elem(1));

        // Removing the only consumer makes the vector itself dead.
        assert!(dce_func(&mut f));
        assert!(f.collect_insts().is_empty());
        assert!(!f.insts.contains(fitr));
    }

    #[test]
    fn phi_uses_keep_values_alive() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        let x = b.ssa();
        let def = b.mov(x, Ref::temp(0));
        let block = b.block();
        let loop_node = b.push_loop();
        let y = b.ssa();
        let phi = b.phi(y, [PhiSrc { block, value: x }]);
        b.mov(Ref::reg(RegClass::PixOut, 0), y);
        b.exit_loop(loop_node);

        assert!(!dce_func(&mut f));
        assert!(f.insts.contains(def));
        assert!(f.insts.contains(phi));
    }
}
