//! Lowering of structured control-flow to explicit branches.
//!
//! The tree itself is kept (program order is still derived from it), but
//! after lowering every transfer of control that isn't a fall-through to the
//! next `Block` is an `Op::Br` instruction:
//! * `If`: a conditional branch at the start of the "then" arm, skipping it
//!   (to the "else" arm, or past the whole `If`), plus an unconditional branch
//!   at the end of the "then" arm, skipping the "else" arm (if non-empty)
//! * `Loop`: an unconditional back-edge at the end of the body

use crate::builder::Builder;
use crate::{
    Arm, ExecCond, FuncDef, InsertPoint, Inst, Node, NodeKind, Op, PredReg, Ref, RefMods, cf,
};

/// Lower every `If`/`Loop` of `func_def`, returning whether there were any.
pub fn lower_structured_cf(func_def: &mut FuncDef) -> bool {
    // NOTE(tilir) branch targets are resolved to the first `Block` they reach
    // when lowering, so nested nodes must be lowered before their parents.
    let mut structured = vec![];
    collect_post_order(func_def, func_def.root, &mut structured);

    for &node in &structured {
        match func_def.nodes[node].kind {
            NodeKind::If { cond, .. } => lower_if(func_def, node, cond),
            NodeKind::Loop { .. } => lower_loop(func_def, node),
            _ => unreachable!(),
        }
    }

    tracing::debug!(func = func_def.index, nodes = structured.len(), "lowered structured control-flow");
    !structured.is_empty()
}

fn collect_post_order(func_def: &FuncDef, node: Node, out: &mut Vec<Node>) {
    let arms: &[Arm] = match func_def.nodes[node].kind {
        NodeKind::Block { .. } => &[],
        NodeKind::If { .. } => &[Arm::Then, Arm::Else],
        NodeKind::Loop { .. } | NodeKind::Func { .. } => &[Arm::None],
    };
    for &arm in arms {
        for child in func_def.node_list(node, arm).iter().collect_vec(&func_def.nodes) {
            collect_post_order(func_def, child, out);
        }
    }
    if matches!(func_def.nodes[node].kind, NodeKind::If { .. } | NodeKind::Loop { .. }) {
        out.push(node);
    }
}

/// The `Block` right after `node`, created if `node` isn't followed by one.
fn block_after(func_def: &mut FuncDef, node: Node) -> Node {
    match func_def.nodes.next_sibling(node) {
        Some(next) if matches!(func_def.nodes[next].kind, NodeKind::Block { .. }) => next,
        _ => {
            let block = func_def.define_block();
            func_def.insert_node_after(node, block);
            block
        }
    }
}

fn push_br(func_def: &mut FuncDef, block: Node, target: Node, exec_cond: ExecCond) -> Inst {
    Builder::at_block_end(func_def, block).br(target, exec_cond)
}

fn lower_if(func_def: &mut FuncDef, if_node: Node, cond: Ref) {
    assert_eq!(cond.as_pred(), Some(PredReg::P0), "cf::lower: `If` condition {cond} isn't `p0`");
    let skip_then = if cond.mods().contains(RefMods::NOT) { ExecCond::P0True } else { ExecCond::P0False };

    let after = block_after(func_def, if_node);
    let else_first = cf::first_block_in_list(&func_def.nodes, func_def.node_list(if_node, Arm::Else));

    let entry = func_def.define_block();
    func_def.insert_node_first(if_node, Arm::Then, entry);
    push_br(func_def, entry, else_first.unwrap_or(after), skip_then);

    if else_first.is_some() {
        let exit = func_def.define_block();
        func_def.insert_node_last(if_node, Arm::Then, exit);
        push_br(func_def, exit, after, ExecCond::Always);
    }
}

fn lower_loop(func_def: &mut FuncDef, loop_node: Node) {
    let back_edge = func_def.define_block();
    func_def.insert_node_last(loop_node, Arm::None, back_edge);
    let header = cf::first_block_in_list(&func_def.nodes, func_def.node_list(loop_node, Arm::None))
        .unwrap_or(back_edge);
    push_br(func_def, back_edge, header, ExecCond::Always);
}

/// Mark the last instruction of `func_def` as the end of the program,
/// appending a `Nop` for that purpose if the function is empty, or ends in
/// a branch (which can't also carry `end`).
pub fn mark_end(func_def: &mut FuncDef) -> Inst {
    let last = func_def.collect_insts().last().copied();
    let end = match last {
        Some(inst) if func_def.insts[inst].op != Op::Br => inst,
        _ => {
            let block = func_def.define_block();
            let root = func_def.root;
            func_def.insert_node_last(root, Arm::None, block);
            func_def.insert_inst(InsertPoint::BlockEnd(block), Op::Nop, [], [])
        }
    };
    func_def.insts[end].end = true;
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::TstCmp;
    use crate::{EntityList, FuncRole, IrForm, RegClass};

    fn brs(func_def: &FuncDef) -> Vec<(Node, Node, ExecCond)> {
        func_def
            .collect_insts()
            .into_iter()
            .map(|inst| &func_def.insts[inst])
            .filter(|inst_def| inst_def.op == Op::Br)
            .map(|inst_def| (inst_def.block(), inst_def.target().unwrap(), inst_def.exec_cond))
            .collect()
    }

    #[test]
    fn if_else_branches() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        b.tst(TstCmp::Eq, Ref::temp(0), Ref::temp(1));
        let if_node = b.push_if(Ref::pred(PredReg::P0));
        let then_block = b.block();
        b.mov(Ref::temp(2), Ref::temp(0));
        b.enter_else(if_node);
        let else_block = b.block();
        b.mov(Ref::temp(2), Ref::temp(1));
        b.exit_if(if_node);
        let after = b.block();

        assert!(lower_structured_cf(&mut f));

        let then_entry = f.node_list(if_node, Arm::Then).first().unwrap();
        let then_exit = f.node_list(if_node, Arm::Then).last().unwrap();
        assert_ne!(then_entry, then_block);
        assert_eq!(
            brs(&f),
            [
                (then_entry, else_block, ExecCond::P0False),
                (then_exit, after, ExecCond::Always),
            ]
        );
    }

    #[test]
    fn inverted_if_without_else_skips_to_new_block() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        let if_node = b.push_if(Ref::pred(PredReg::P0).not());
        b.mov(Ref::reg(RegClass::PixOut, 0), Ref::temp(0));

        lower_structured_cf(&mut f);

        // Nothing followed the `If`, so a `Block` had to be added after it.
        let after = f.nodes.next_sibling(if_node).unwrap();
        assert!(f.block_insts(after).is_empty());
        let brs = brs(&f);
        assert_eq!(brs.len(), 1);
        let (_, target, exec_cond) = brs[0];
        assert_eq!((target, exec_cond), (after, ExecCond::P0True));
    }

    #[test]
    fn loop_back_edge_and_end() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        let loop_node = b.push_loop();
        let header = b.block();
        b.mov(Ref::temp(0), Ref::temp(1));

        lower_structured_cf(&mut f);
        let back_edge = f.node_list(loop_node, Arm::None).last().unwrap();
        assert_eq!(brs(&f), [(back_edge, header, ExecCond::Always)]);

        // The function ends in the back-edge, so `end` needs its own `Nop`.
        let end = mark_end(&mut f);
        assert_eq!(f.insts[end].op, Op::Nop);
        assert!(f.insts[end].end);
        let blocks: Vec<_> = f.at(IrForm::Scalar, f.root).blocks().map(|b| b.position).collect();
        assert_eq!(blocks.last(), Some(&f.insts[end].block()));
    }

    fn new_if(f: &mut FuncDef, cond: Ref) -> Node {
        f.define_node(NodeKind::If { cond, then_body: EntityList::empty(), else_body: EntityList::empty() })
    }

    fn block_with_mov(f: &mut FuncDef, parent: Node, arm: Arm) -> Node {
        let block = f.define_block();
        f.insert_node_last(parent, arm, block);
        Builder::at_block_end(f, block).mov(Ref::temp(2), Ref::temp(0));
        block
    }

    #[test]
    fn loop_starting_with_if_branches_back_to_its_condition() {
        // `b0; loop { if p0 { b1 } }`, without any `Block` before the `If`.
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let root = f.root;
        Builder::at_func_end(&mut f).tst(TstCmp::Eq, Ref::temp(0), Ref::temp(1));
        let loop_node = f.define_node(NodeKind::Loop { body: EntityList::empty() });
        f.insert_node_last(root, Arm::None, loop_node);
        let if_node = new_if(&mut f, Ref::pred(PredReg::P0));
        f.insert_node_first(loop_node, Arm::None, if_node);
        let old_then = block_with_mov(&mut f, if_node, Arm::Then);

        lower_structured_cf(&mut f);

        let body = f.node_list(loop_node, Arm::None);
        let header = cf::first_block_in_list(&f.nodes, body).unwrap();
        let if_entry = f.node_list(if_node, Arm::Then).first().unwrap();
        assert_eq!(header, if_entry);
        assert_ne!(header, old_then);

        let back_edge = body.last().unwrap();
        let brs = brs(&f);
        assert!(brs.contains(&(back_edge, if_entry, ExecCond::Always)), "{brs:?}");
        assert!(brs.iter().any(|&(from, _, exec_cond)| from == if_entry && exec_cond == ExecCond::P0False));
    }

    #[test]
    fn else_starting_with_if_is_entered_at_its_condition() {
        // `if p0 { b1 } else { if !p0 { b2 } }`.
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let root = f.root;
        Builder::at_func_end(&mut f).tst(TstCmp::Eq, Ref::temp(0), Ref::temp(1));
        let outer = new_if(&mut f, Ref::pred(PredReg::P0));
        f.insert_node_last(root, Arm::None, outer);
        block_with_mov(&mut f, outer, Arm::Then);
        let inner = new_if(&mut f, Ref::pred(PredReg::P0).not());
        f.insert_node_first(outer, Arm::Else, inner);
        block_with_mov(&mut f, inner, Arm::Then);

        lower_structured_cf(&mut f);

        let outer_entry = f.node_list(outer, Arm::Then).first().unwrap();
        let inner_entry = f.node_list(inner, Arm::Then).first().unwrap();
        let brs = brs(&f);
        assert!(brs.contains(&(outer_entry, inner_entry, ExecCond::P0False)), "{brs:?}");
    }

    #[test]
    fn end_reuses_last_instruction() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        let last = b.emitpix();
        assert_eq!(mark_end(&mut f), last);
        assert!(f.insts[last].end);

        let mut empty = FuncDef::new(1, FuncRole::Preamble);
        let end = mark_end(&mut empty);
        assert_eq!(empty.collect_insts(), [end]);
    }
}
