//! Re-indexing, i.e. dense renumbering of everything in a function, in
//! program order, to make dumps taken after many passes easier to follow.
//!
//! SSA values are numbered by definition order (parameters first), with any
//! value that's read but never defined numbered after all the defined ones.

use crate::transform::rewrite_refs;
use crate::visit::{RefRole, for_each_ref};
use crate::{
    Counters, EntityDefs, EntityList, FuncDef, FxIndexMap, Inst, IrForm, Node, NodeKind, Shader,
};
use smallvec::SmallVec;

pub fn reindex(shader: &mut Shader) {
    let form = shader.form();
    for (_, func_def) in shader.funcs.iter_mut() {
        reindex_func(func_def, form);
    }
}

pub fn reindex_func(func_def: &mut FuncDef, form: IrForm) {
    let mut counters = Counters::default();

    let mut seen = vec![];
    for_each_ref(func_def, form, |r, role| {
        seen.extend(r.ssa_idx().map(|idx| (role == RefRole::Def, idx)));
    });
    let mut ssa_map = FxIndexMap::<u32, u32>::default();
    for defs in [true, false] {
        for &(is_def, idx) in &seen {
            if is_def == defs {
                let next = ssa_map.len() as u32;
                ssa_map.entry(idx).or_insert(next);
            }
        }
    }
    rewrite_refs(func_def, form, |r, _| Some(r.with_value(*ssa_map.get(&r.ssa_idx()?)?)));
    for vec in func_def.vec_info.values_mut() {
        if let Some(&new) = ssa_map.get(&vec.ssa) {
            vec.ssa = new;
            for comp in &mut vec.comps {
                *comp = comp.with_value(new);
            }
        }
    }
    counters.ssa = ssa_map.len() as u32;

    let insts: Vec<Inst> = match form {
        IrForm::Scalar => func_def.collect_insts(),
        IrForm::Bundled => {
            let func_at = func_def.at(form, func_def.root);
            let groups: Vec<_> =
                func_at.blocks().flat_map(|block| block.at_groups()).map(|group| group.position).collect();
            for &group in &groups {
                func_def.groups[group].index = counters.group;
                counters.group += 1;
            }
            groups
                .iter()
                .flat_map(|&group| func_def.groups[group].insts.into_iter().flatten())
                .collect()
        }
    };
    for inst in insts {
        func_def.insts[inst].index = counters.inst;
        counters.inst += 1;
    }

    let mut nodes = vec![];
    preorder(&func_def.nodes, func_def.root, &mut nodes);
    for node in nodes {
        let node_def = &mut func_def.nodes[node];
        let counter = match node_def.kind {
            NodeKind::Block { .. } => &mut counters.block,
            NodeKind::If { .. } => &mut counters.if_,
            NodeKind::Loop { .. } => &mut counters.loop_,
            NodeKind::Func { .. } => continue,
        };
        node_def.index = *counter;
        *counter += 1;
    }

    func_def.counters = counters;
}

fn preorder(nodes: &EntityDefs<Node>, node: Node, out: &mut Vec<Node>) {
    out.push(node);
    let lists: SmallVec<[EntityList<Node>; 2]> = match &nodes[node].kind {
        NodeKind::Block { .. } => SmallVec::new(),
        NodeKind::If { then_body, else_body, .. } => [*then_body, *else_body].into_iter().collect(),
        NodeKind::Loop { body } | NodeKind::Func { body } => [*body].into_iter().collect(),
    };
    for list in lists {
        for child in list.iter().collect_vec(nodes) {
            preorder(nodes, child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::{FuncRole, InsertPoint, Op, PredReg, Ref, RegClass};

    #[test]
    fn renumbers_in_program_order() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        // Never used anywhere, so it doesn't get renumbered.
        b.ssa();
        let (y, x) = (b.ssa(), b.ssa());
        let last = b.alu2(Op::Fadd, Ref::reg(RegClass::PixOut, 0), y, y);
        b.set_cursor(InsertPoint::Before(last));
        b.mov(x, Ref::imm(1));
        b.mov(y, x.neg());
        b.set_cursor(InsertPoint::After(last));
        let dead = b.nop();
        let if_node = b.push_if(Ref::pred(PredReg::P0));
        b.exit_if(if_node);
        f.delete_inst(dead);

        reindex_func(&mut f, IrForm::Scalar);

        let ops: Vec<_> = f
            .collect_insts()
            .into_iter()
            .map(|inst| {
                let inst_def = &f.insts[inst];
                (inst_def.index, inst_def.dsts[0], inst_def.srcs[0])
            })
            .collect();
        assert_eq!(
            ops,
            [
                (0, Ref::ssa(0), Ref::imm(1)),
                (1, Ref::ssa(1), Ref::ssa(0).neg()),
                (2, Ref::reg(RegClass::PixOut, 0), Ref::ssa(1)),
            ]
        );
        assert_eq!(f.counters.ssa, 2);
        assert_eq!(f.counters.inst, 3);
        assert_eq!((f.counters.block, f.counters.if_), (3, 1));
        assert_eq!(f.nodes[if_node].index, 0);
    }
}
