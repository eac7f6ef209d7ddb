//! Program order of `Block`s, derived on the fly from the control-flow tree.
//!
//! Program order is a depth-first walk of the tree, visiting an `If`'s
//! "then" arm before its "else" arm. Moving to an adjacent `Block` only
//! climbs up (to the nearest ancestor with a later/earlier sibling) and then
//! descends, so each step costs time proportional to the depth of the tree.

use crate::{Arm, EntityDefs, EntityList, Node, NodeKind};

/// The first `Block` inside `node` (`node` itself if it's a `Block`).
pub fn first_block_in(nodes: &EntityDefs<Node>, node: Node) -> Option<Node> {
    match &nodes[node].kind {
        NodeKind::Block { .. } => Some(node),
        NodeKind::If { then_body, else_body, .. } => first_block_in_list(nodes, *then_body)
            .or_else(|| first_block_in_list(nodes, *else_body)),
        NodeKind::Loop { body } | NodeKind::Func { body } => first_block_in_list(nodes, *body),
    }
}

/// The last `Block` inside `node` (`node` itself if it's a `Block`).
pub fn last_block_in(nodes: &EntityDefs<Node>, node: Node) -> Option<Node> {
    match &nodes[node].kind {
        NodeKind::Block { .. } => Some(node),
        NodeKind::If { then_body, else_body, .. } => last_block_in_list(nodes, *else_body)
            .or_else(|| last_block_in_list(nodes, *then_body)),
        NodeKind::Loop { body } | NodeKind::Func { body } => last_block_in_list(nodes, *body),
    }
}

pub fn first_block_in_list(nodes: &EntityDefs<Node>, list: EntityList<Node>) -> Option<Node> {
    let mut next = list.first();
    while let Some(node) = next {
        if let Some(block) = first_block_in(nodes, node) {
            return Some(block);
        }
        next = nodes.next_sibling(node);
    }
    None
}

pub fn last_block_in_list(nodes: &EntityDefs<Node>, list: EntityList<Node>) -> Option<Node> {
    let mut prev = list.last();
    while let Some(node) = prev {
        if let Some(block) = last_block_in(nodes, node) {
            return Some(block);
        }
        prev = nodes.prev_sibling(node);
    }
    None
}

/// The `Block` executing after `block` in program order, or `None` if
/// `block` is the last one of its function.
pub fn next_block(nodes: &EntityDefs<Node>, block: Node) -> Option<Node> {
    let mut cur = block;
    loop {
        let mut sibling = nodes.next_sibling(cur);
        while let Some(node) = sibling {
            if let Some(next) = first_block_in(nodes, node) {
                return Some(next);
            }
            sibling = nodes.next_sibling(node);
        }

        let def = &nodes[cur];
        let parent = def.parent?;
        match &nodes[parent].kind {
            NodeKind::If { else_body, .. } if def.arm == Arm::Then => {
                if let Some(next) = first_block_in_list(nodes, *else_body) {
                    return Some(next);
                }
            }
            _ => {}
        }
        // The end of the root means the end of the function.
        nodes[parent].parent?;
        cur = parent;
    }
}

/// The `Block` executing before `block` in program order, or `None` if
/// `block` is the first one of its function.
pub fn prev_block(nodes: &EntityDefs<Node>, block: Node) -> Option<Node> {
    let mut cur = block;
    loop {
        let mut sibling = nodes.prev_sibling(cur);
        while let Some(node) = sibling {
            if let Some(prev) = last_block_in(nodes, node) {
                return Some(prev);
            }
            sibling = nodes.prev_sibling(node);
        }

        let def = &nodes[cur];
        let parent = def.parent?;
        match &nodes[parent].kind {
            NodeKind::If { then_body, .. } if def.arm == Arm::Else => {
                if let Some(prev) = last_block_in_list(nodes, *then_body) {
                    return Some(prev);
                }
            }
            _ => {}
        }
        nodes[parent].parent?;
        cur = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FuncDef, FuncRole, PredReg, Ref};

    /// ```text
    /// b0
    /// if0 { b1; loop0 { b2 } } else { b3 }
    /// b4
    /// if1 {} else { b5 }
    /// loop1 { if2 { b6 } else {} }
    /// loop2 {}
    /// b7
    /// ```
    fn nested_func() -> (FuncDef, Vec<Node>) {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let root = f.root;
        let cond = Ref::pred(PredReg::P0);
        let blocks: Vec<Node> = (0..8).map(|_| f.define_block()).collect();
        let new_if = |f: &mut FuncDef| {
            f.define_node(NodeKind::If {
                cond,
                then_body: EntityList::empty(),
                else_body: EntityList::empty(),
            })
        };
        let new_loop = |f: &mut FuncDef| f.define_node(NodeKind::Loop { body: EntityList::empty() });

        f.insert_node_last(root, Arm::None, blocks[0]);
        let if0 = new_if(&mut f);
        f.insert_node_last(root, Arm::None, if0);
        f.insert_node_last(if0, Arm::Then, blocks[1]);
        let loop0 = new_loop(&mut f);
        f.insert_node_last(if0, Arm::Then, loop0);
        f.insert_node_last(loop0, Arm::None, blocks[2]);
        f.insert_node_last(if0, Arm::Else, blocks[3]);
        f.insert_node_last(root, Arm::None, blocks[4]);
        let if1 = new_if(&mut f);
        f.insert_node_last(root, Arm::None, if1);
        f.insert_node_last(if1, Arm::Else, blocks[5]);
        let loop1 = new_loop(&mut f);
        f.insert_node_last(root, Arm::None, loop1);
        let if2 = new_if(&mut f);
        f.insert_node_last(loop1, Arm::None, if2);
        f.insert_node_last(if2, Arm::Then, blocks[6]);
        let loop2 = new_loop(&mut f);
        f.insert_node_last(root, Arm::None, loop2);
        f.insert_node_last(root, Arm::None, blocks[7]);

        (f, blocks)
    }

    #[test]
    fn forward_walk_visits_every_block_once_in_order() {
        let (f, blocks) = nested_func();
        let mut walked = vec![];
        let mut cur = first_block_in(&f.nodes, f.root);
        while let Some(block) = cur {
            walked.push(block);
            cur = next_block(&f.nodes, block);
        }
        assert_eq!(walked, blocks);
    }

    #[test]
    fn backward_walk_is_the_reverse() {
        let (f, blocks) = nested_func();
        let mut walked = vec![];
        let mut cur = last_block_in(&f.nodes, f.root);
        while let Some(block) = cur {
            walked.push(block);
            cur = prev_block(&f.nodes, block);
        }
        walked.reverse();
        assert_eq!(walked, blocks);
    }

    #[test]
    fn next_and_prev_are_inverses() {
        let (f, blocks) = nested_func();
        for pair in blocks.windows(2) {
            assert_eq!(next_block(&f.nodes, pair[0]), Some(pair[1]));
            assert_eq!(prev_block(&f.nodes, pair[1]), Some(pair[0]));
        }
        assert_eq!(prev_block(&f.nodes, blocks[0]), None);
        assert_eq!(next_block(&f.nodes, blocks[7]), None);
    }

    #[test]
    fn blocks_iterator_matches_walk() {
        let (f, blocks) = nested_func();
        let iterated: Vec<Node> =
            f.at(crate::IrForm::Scalar, f.root).blocks().map(|b| b.position).collect();
        assert_eq!(iterated, blocks);
    }
}
