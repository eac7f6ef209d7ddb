//! Traversal helpers for intra-function entities.
//!
//! [`FuncAt<P>`]/[`FuncAtMut<P>`] are like `(&FuncDef, P)`/`(&mut FuncDef, P)`
//! (where `P` is some type describing a "position" in the function), except:
//! * they only borrow the [`EntityDefs`] fields of [`FuncDef`](crate::FuncDef)
//!   * this can prevent borrow conflicts, especially when mutating other fields
//!   * it also avoids accidentally accessing parts of the function definition
//!     without going through `P` (as [`EntityDefs`] requires keys for any access)
//! * they carry the [`IrForm`] of the shader, so that going through the
//!   instructions of a `Block` the wrong way (for its form) can be caught
//! * they're dedicated types with inherent methods and trait `impl`s

// NOTE(tilir) wrong wrt lifetimes (https://github.com/rust-lang/rust-clippy/issues/5004).
#![allow(clippy::should_implement_trait)]

use crate::{
    EntityDefs, EntityList, EntityListIter, Inst, InstDef, InstGroup, InstGroupDef, IrForm, Node,
    NodeDef, NodeKind, Phase, cf,
};

/// Immutable traversal (i.e. visiting) helper for intra-function entities.
///
/// The point/position type `P` should be an entity or a shallow entity wrapper
/// (e.g. [`EntityList<Node>`]).
#[derive(Copy, Clone)]
pub struct FuncAt<'a, P: Copy> {
    pub nodes: &'a EntityDefs<Node>,
    pub insts: &'a EntityDefs<Inst>,
    pub groups: &'a EntityDefs<InstGroup>,

    pub form: IrForm,

    pub position: P,
}

impl<'a, P: Copy> FuncAt<'a, P> {
    /// Reposition to `new_position`.
    pub fn at<P2: Copy>(self, new_position: P2) -> FuncAt<'a, P2> {
        FuncAt {
            nodes: self.nodes,
            insts: self.insts,
            groups: self.groups,
            form: self.form,
            position: new_position,
        }
    }
}

impl<'a> FuncAt<'a, Node> {
    pub fn def(self) -> &'a NodeDef {
        &self.nodes[self.position]
    }

    /// Instructions of this `Block` (scalar form only).
    pub fn at_insts(self) -> FuncAt<'a, EntityList<Inst>> {
        assert_eq!(self.form, IrForm::Scalar, "FuncAt::at_insts: shader is bundled");
        match self.def().kind {
            NodeKind::Block { insts, .. } => self.at(insts),
            ref kind => unreachable!("FuncAt::at_insts: {kind:?} is not a block"),
        }
    }

    /// Instruction groups of this `Block` (bundled form only).
    pub fn at_groups(self) -> FuncAt<'a, EntityList<InstGroup>> {
        assert_eq!(self.form, IrForm::Bundled, "FuncAt::at_groups: shader isn't bundled yet");
        match self.def().kind {
            NodeKind::Block { groups, .. } => self.at(groups),
            ref kind => unreachable!("FuncAt::at_groups: {kind:?} is not a block"),
        }
    }

    pub fn is_block(self) -> bool {
        matches!(self.def().kind, NodeKind::Block { .. })
    }

    /// The `Block` following this one in program order (see [`cf::next_block`]).
    pub fn next_block(self) -> Option<FuncAt<'a, Node>> {
        Some(self.at(cf::next_block(self.nodes, self.position)?))
    }

    /// The `Block` preceding this one in program order (see [`cf::prev_block`]).
    pub fn prev_block(self) -> Option<FuncAt<'a, Node>> {
        Some(self.at(cf::prev_block(self.nodes, self.position)?))
    }

    /// All the `Block`s within this node, in program order.
    pub fn blocks(self) -> Blocks<'a> {
        let first = cf::first_block_in(self.nodes, self.position);
        let last = cf::last_block_in(self.nodes, self.position);
        Blocks { func_at: self.at(()), next: first, last }
    }
}

/// Iterator over `Block`s, built on [`cf::next_block`].
pub struct Blocks<'a> {
    func_at: FuncAt<'a, ()>,
    next: Option<Node>,
    last: Option<Node>,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = FuncAt<'a, Node>;
    fn next(&mut self) -> Option<Self::Item> {
        let block = self.next?;
        self.next = if Some(block) == self.last {
            None
        } else {
            cf::next_block(self.func_at.nodes, block)
        };
        Some(self.func_at.at(block))
    }
}

impl<'a> IntoIterator for FuncAt<'a, EntityList<Node>> {
    type IntoIter = FuncAt<'a, EntityListIter<Node>>;
    type Item = FuncAt<'a, Node>;
    fn into_iter(self) -> Self::IntoIter {
        self.at(self.position.iter())
    }
}

impl<'a> Iterator for FuncAt<'a, EntityListIter<Node>> {
    type Item = FuncAt<'a, Node>;
    fn next(&mut self) -> Option<Self::Item> {
        let (next, rest) = self.position.split_first(self.nodes)?;
        self.position = rest;
        Some(self.at(next))
    }
}

impl DoubleEndedIterator for FuncAt<'_, EntityListIter<Node>> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let (prev, rest) = self.position.split_last(self.nodes)?;
        self.position = rest;
        Some(self.at(prev))
    }
}

impl<'a> IntoIterator for FuncAt<'a, EntityList<Inst>> {
    type IntoIter = FuncAt<'a, EntityListIter<Inst>>;
    type Item = FuncAt<'a, Inst>;
    fn into_iter(self) -> Self::IntoIter {
        self.at(self.position.iter())
    }
}

impl<'a> Iterator for FuncAt<'a, EntityListIter<Inst>> {
    type Item = FuncAt<'a, Inst>;
    fn next(&mut self) -> Option<Self::Item> {
        let (next, rest) = self.position.split_first(self.insts)?;
        self.position = rest;
        Some(self.at(next))
    }
}

impl DoubleEndedIterator for FuncAt<'_, EntityListIter<Inst>> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let (prev, rest) = self.position.split_last(self.insts)?;
        self.position = rest;
        Some(self.at(prev))
    }
}

impl<'a> IntoIterator for FuncAt<'a, EntityList<InstGroup>> {
    type IntoIter = FuncAt<'a, EntityListIter<InstGroup>>;
    type Item = FuncAt<'a, InstGroup>;
    fn into_iter(self) -> Self::IntoIter {
        self.at(self.position.iter())
    }
}

impl<'a> Iterator for FuncAt<'a, EntityListIter<InstGroup>> {
    type Item = FuncAt<'a, InstGroup>;
    fn next(&mut self) -> Option<Self::Item> {
        let (next, rest) = self.position.split_first(self.groups)?;
        self.position = rest;
        Some(self.at(next))
    }
}

impl DoubleEndedIterator for FuncAt<'_, EntityListIter<InstGroup>> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let (prev, rest) = self.position.split_last(self.groups)?;
        self.position = rest;
        Some(self.at(prev))
    }
}

impl<'a> FuncAt<'a, Inst> {
    pub fn def(self) -> &'a InstDef {
        &self.insts[self.position]
    }
}

impl<'a> FuncAt<'a, InstGroup> {
    pub fn def(self) -> &'a InstGroupDef {
        &self.groups[self.position]
    }

    /// Instructions of this group, in phase order (lowest phase first).
    pub fn insts(self) -> impl Iterator<Item = (Phase, FuncAt<'a, Inst>)> {
        let def = self.def();
        Phase::ALL.into_iter().filter_map(move |phase| Some((phase, self.at(def.insts[phase as usize]?))))
    }
}

/// Mutable traversal (i.e. transforming) helper for intra-function entities.
///
/// The point/position type `P` should be an entity or a shallow entity wrapper
/// (e.g. [`EntityList<Node>`]).
pub struct FuncAtMut<'a, P: Copy> {
    pub nodes: &'a mut EntityDefs<Node>,
    pub insts: &'a mut EntityDefs<Inst>,
    pub groups: &'a mut EntityDefs<InstGroup>,

    pub form: IrForm,

    pub position: P,
}

impl<'a, P: Copy> FuncAtMut<'a, P> {
    /// Emulate a "reborrow", which is automatic only for `&mut` types.
    pub fn reborrow(&mut self) -> FuncAtMut<'_, P> {
        FuncAtMut {
            nodes: self.nodes,
            insts: self.insts,
            groups: self.groups,
            form: self.form,
            position: self.position,
        }
    }

    /// Reposition to `new_position`.
    pub fn at<P2: Copy>(self, new_position: P2) -> FuncAtMut<'a, P2> {
        FuncAtMut {
            nodes: self.nodes,
            insts: self.insts,
            groups: self.groups,
            form: self.form,
            position: new_position,
        }
    }
}

impl<'a> FuncAtMut<'a, Node> {
    pub fn def(self) -> &'a mut NodeDef {
        &mut self.nodes[self.position]
    }
}

// HACK(tilir) can't implement `IntoIterator` because `next` borrows `self`.
impl<'a> FuncAtMut<'a, EntityList<Inst>> {
    pub fn into_iter(self) -> FuncAtMut<'a, EntityListIter<Inst>> {
        let iter = self.position.iter();
        self.at(iter)
    }
}

// HACK(tilir) can't implement `Iterator` because `next` borrows `self`.
impl FuncAtMut<'_, EntityListIter<Inst>> {
    pub fn next(&mut self) -> Option<FuncAtMut<'_, Inst>> {
        let (next, rest) = self.position.split_first(self.insts)?;
        self.position = rest;
        Some(self.reborrow().at(next))
    }
}

impl<'a> FuncAtMut<'a, Inst> {
    pub fn def(self) -> &'a mut InstDef {
        &mut self.insts[self.position]
    }
}

impl<'a> FuncAtMut<'a, InstGroup> {
    pub fn def(self) -> &'a mut InstGroupDef {
        &mut self.groups[self.position]
    }
}
