//! Mutable IR traversal.

use crate::func_at::FuncAtMut;
use crate::visit::RefRole;
use crate::{EntityList, FuncDef, InstCf, InstDef, IrForm, Node, NodeKind, Ref};
use smallvec::{SmallVec, smallvec};

/// The result of a transformation (which is not in-place).
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transformed<T> {
    /// The original `T` value remains as it was, at no cost.
    Unchanged,

    /// Some part of the original `T` value was transformed, and a new `T` value
    /// had to be constructed. This change will propagate in any "outer" value.
    Changed(T),
}

impl<T> Transformed<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transformed<U> {
        match self {
            Transformed::Unchanged => Transformed::Unchanged,
            Transformed::Changed(new) => Transformed::Changed(f(new)),
        }
    }

    /// Write the new value (if any) to `dest`, returning whether it changed.
    pub fn apply_to(self, dest: &mut T) -> bool {
        match self {
            Transformed::Unchanged => false,
            Transformed::Changed(new) => {
                *dest = new;
                true
            }
        }
    }
}

/// Rewriting of [`Ref`]s, in place, across a whole function.
///
/// Only the leaf method has to be provided, the others recurse through the
/// IR, and can be overridden to skip (or specially handle) parts of it.
pub trait Transformer: Sized {
    // Leaves (noop default behavior).
    fn transform_ref_use(&mut self, _r: Ref, _role: RefRole) -> Transformed<Ref> {
        Transformed::Unchanged
    }

    // Non-leaves (defaulting to calling `.inner_in_place_transform_with(self)`).
    fn in_place_transform_func_def(&mut self, func_def: &mut FuncDef, form: IrForm) {
        for param in &mut func_def.params {
            self.transform_ref_use(param.value, RefRole::Def).apply_to(&mut param.value);
        }
        let root = func_def.root;
        self.in_place_transform_node_def(func_def.at_mut(form, root));
    }
    fn in_place_transform_node_def(&mut self, mut func_at_node: FuncAtMut<'_, Node>) {
        func_at_node.inner_in_place_transform_with(self);
    }
    fn in_place_transform_inst_def(&mut self, inst_def: &mut InstDef) {
        inst_def.inner_in_place_transform_with(self);
    }
}

/// Trait implemented on "deeply transformable" types, to further "explore" a
/// type by transforming its "interior" (i.e. variants and/or fields), in place.
pub trait InnerInPlaceTransform {
    fn inner_in_place_transform_with(&mut self, transformer: &mut impl Transformer);
}

impl InnerInPlaceTransform for FuncAtMut<'_, Node> {
    fn inner_in_place_transform_with(&mut self, transformer: &mut impl Transformer) {
        let form = self.form;
        let (lists, insts, groups): (SmallVec<[EntityList<Node>; 2]>, _, _) =
            match &mut self.nodes[self.position].kind {
                NodeKind::Block { insts, groups } => (SmallVec::new(), *insts, *groups),
                NodeKind::If { cond, then_body, else_body } => {
                    transformer.transform_ref_use(*cond, RefRole::Cond).apply_to(cond);
                    (smallvec![*then_body, *else_body], EntityList::empty(), EntityList::empty())
                }
                NodeKind::Loop { body } | NodeKind::Func { body } => {
                    (smallvec![*body], EntityList::empty(), EntityList::empty())
                }
            };
        let mut children = vec![];
        for list in lists {
            children.extend(list.iter().collect_vec(self.nodes));
        }

        match form {
            IrForm::Scalar => {
                let mut iter = self.reborrow().at(insts).into_iter();
                while let Some(func_at_inst) = iter.next() {
                    transformer.in_place_transform_inst_def(func_at_inst.def());
                }
            }
            IrForm::Bundled => {
                for group in groups.iter().collect_vec(self.groups) {
                    for inst in self.groups[group].insts.into_iter().flatten() {
                        transformer.in_place_transform_inst_def(&mut self.insts[inst]);
                    }
                }
            }
        }

        for child in children {
            transformer.in_place_transform_node_def(self.reborrow().at(child));
        }
    }
}

impl InnerInPlaceTransform for InstDef {
    fn inner_in_place_transform_with(&mut self, transformer: &mut impl Transformer) {
        for dst in &mut self.dsts {
            transformer.transform_ref_use(*dst, RefRole::Def).apply_to(dst);
        }
        for src in &mut self.srcs {
            transformer.transform_ref_use(*src, RefRole::Use).apply_to(src);
        }
        if let InstCf::Phi(phi_srcs) = &mut self.cf {
            for phi_src in phi_srcs {
                transformer.transform_ref_use(phi_src.value, RefRole::PhiUse).apply_to(&mut phi_src.value);
            }
        }
    }
}

/// Rewrite every [`Ref`] in `func_def` with a closure, returning whether
/// anything changed.
pub fn rewrite_refs(
    func_def: &mut FuncDef,
    form: IrForm,
    f: impl FnMut(Ref, RefRole) -> Option<Ref>,
) -> bool {
    struct ClosureTransformer<F> {
        f: F,
        changed: bool,
    }
    impl<F: FnMut(Ref, RefRole) -> Option<Ref>> Transformer for ClosureTransformer<F> {
        fn transform_ref_use(&mut self, r: Ref, role: RefRole) -> Transformed<Ref> {
            match (self.f)(r, role) {
                Some(new) if new != r => {
                    self.changed = true;
                    Transformed::Changed(new)
                }
                _ => Transformed::Unchanged,
            }
        }
    }

    let mut transformer = ClosureTransformer { f, changed: false };
    transformer.in_place_transform_func_def(func_def, form);
    transformer.changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::{FuncRole, Op, RegClass};

    #[test]
    fn rewrites_only_matching_roles() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        let x = b.ssa();
        b.mov(x, Ref::imm(3));
        let inst = b.alu2(Op::Fadd, Ref::reg(RegClass::PixOut, 0), x.neg(), x);

        let changed = rewrite_refs(&mut f, IrForm::Scalar, |r, role| {
            (role == RefRole::Use && r.ssa_idx() == Some(0)).then(|| r.with_base_of(Ref::temp(5)))
        });
        assert!(changed);
        assert_eq!(f.insts[inst].srcs.as_slice(), [Ref::temp(5).neg(), Ref::temp(5)]);
        // The definition was left alone.
        assert_eq!(f.insts[f.collect_insts()[0]].dsts[0], x);

        assert!(!rewrite_refs(&mut f, IrForm::Scalar, |_, _| None));
    }
}
