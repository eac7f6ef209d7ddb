//! Immutable IR traversal.

use crate::func_at::FuncAt;
use crate::{FuncDef, InstDef, InstGroup, IrForm, Node, NodeKind, Ref, Shader};

/// How a [`Ref`] is being used, from the point of view of its holder.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RefRole {
    /// Written (i.e. defined, for SSA values), including function parameters.
    Def,
    /// Read by an instruction, in its linear position.
    Use,
    /// Read by a phi, at the end of one of its incoming blocks.
    PhiUse,
    /// Condition of an `If`.
    Cond,
}

// FIXME(tilir) `Sized` bound shouldn't be needed but removing it requires
// writing `impl Visitor<'a> + ?Sized` in `fn inner_visit_with` signatures.
pub trait Visitor<'a>: Sized {
    // Leaves (no default provided).
    fn visit_ref_use(&mut self, r: Ref, role: RefRole);

    // Non-leaves (defaulting to calling `.inner_visit_with(self)`).
    fn visit_shader(&mut self, shader: &'a Shader) {
        shader.inner_visit_with(self);
    }
    fn visit_func_def(&mut self, func_def: &'a FuncDef, form: IrForm) {
        for param in &func_def.params {
            self.visit_ref_use(param.value, RefRole::Def);
        }
        self.visit_node_def(func_def.at(form, func_def.root));
    }
    fn visit_node_def(&mut self, func_at_node: FuncAt<'a, Node>) {
        func_at_node.inner_visit_with(self);
    }
    fn visit_group_def(&mut self, func_at_group: FuncAt<'a, InstGroup>) {
        func_at_group.inner_visit_with(self);
    }
    fn visit_inst_def(&mut self, inst_def: &'a InstDef) {
        inst_def.inner_visit_with(self);
    }
}

/// Dynamic dispatch version of [`Visitor`].
///
/// `dyn DynVisitor<'a>` is possible, unlike `dyn Visitor<'a>`.
pub trait DynVisitor<'a> {
    fn visit_ref_use(&mut self, r: Ref, role: RefRole);
}

impl<'a, F: FnMut(Ref, RefRole)> DynVisitor<'a> for F {
    fn visit_ref_use(&mut self, r: Ref, role: RefRole) {
        self(r, role);
    }
}

impl<'a> Visitor<'a> for &mut dyn DynVisitor<'a> {
    fn visit_ref_use(&mut self, r: Ref, role: RefRole) {
        (**self).visit_ref_use(r, role);
    }
}

/// Trait implemented on "deeply visitable" types, to further "explore" a type
/// by visiting its "interior" (i.e. variants and/or fields).
///
/// That is, an `impl InnerVisit for X` will call the relevant [`Visitor`] method
/// for each `X` field, effectively performing a single level of a deep visit.
pub trait InnerVisit {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>);
}

impl InnerVisit for Shader {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        for (_, func_def) in self.funcs.iter() {
            visitor.visit_func_def(func_def, self.form());
        }
    }
}

// NOTE(tilir) `FuncAt` can't implement `InnerVisit` because of the `&'a self`
// requirement, whereas this has `'a` in `self: FuncAt<'a, Node>`.
impl<'a> FuncAt<'a, Node> {
    pub fn inner_visit_with(self, visitor: &mut impl Visitor<'a>) {
        match &self.def().kind {
            NodeKind::Block { .. } => match self.form {
                IrForm::Scalar => {
                    for inst in self.at_insts() {
                        visitor.visit_inst_def(inst.def());
                    }
                }
                IrForm::Bundled => {
                    for group in self.at_groups() {
                        visitor.visit_group_def(group);
                    }
                }
            },
            NodeKind::If { cond, then_body, else_body } => {
                visitor.visit_ref_use(*cond, RefRole::Cond);
                for child in self.at(*then_body).into_iter().chain(self.at(*else_body)) {
                    visitor.visit_node_def(child);
                }
            }
            NodeKind::Loop { body } | NodeKind::Func { body } => {
                for child in self.at(*body) {
                    visitor.visit_node_def(child);
                }
            }
        }
    }
}

impl<'a> FuncAt<'a, InstGroup> {
    pub fn inner_visit_with(self, visitor: &mut impl Visitor<'a>) {
        for (_, inst) in self.insts() {
            visitor.visit_inst_def(inst.def());
        }
    }
}

impl InnerVisit for InstDef {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        for &dst in &self.dsts {
            visitor.visit_ref_use(dst, RefRole::Def);
        }
        for &src in &self.srcs {
            visitor.visit_ref_use(src, RefRole::Use);
        }
        for phi_src in self.phi_srcs() {
            visitor.visit_ref_use(phi_src.value, RefRole::PhiUse);
        }
    }
}

/// Visit every [`Ref`] in `func_def` with a closure.
pub fn for_each_ref(func_def: &FuncDef, form: IrForm, mut f: impl FnMut(Ref, RefRole)) {
    let mut visitor: &mut dyn DynVisitor<'_> = &mut f;
    visitor.visit_func_def(func_def, form);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::{FuncRole, Op, PredReg, RegClass};

    #[test]
    fn visits_refs_in_program_order_with_roles() {
        let mut f = FuncDef::new(0, FuncRole::Entrypoint);
        let mut b = Builder::at_func_end(&mut f);
        let x = b.ssa();
        b.mov(x, Ref::imm(3));
        let if_node = b.push_if(Ref::pred(PredReg::P0));
        b.alu2(Op::Fadd, Ref::reg(RegClass::PixOut, 0), x, x);
        b.exit_if(if_node);

        let mut seen = vec![];
        for_each_ref(&f, IrForm::Scalar, |r, role| seen.push((r, role)));
        assert_eq!(
            seen,
            [
                (x, RefRole::Def),
                (Ref::imm(3), RefRole::Use),
                (Ref::pred(PredReg::P0), RefRole::Cond),
                (Ref::reg(RegClass::PixOut, 0), RefRole::Def),
                (x, RefRole::Use),
                (x, RefRole::Use),
            ]
        );
    }
}
