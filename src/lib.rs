//! # `tilir`
//!
//! **Tile-ISA IR**: an SSA-form, structured-control-flow shader IR, the pass
//! pipeline lowering it, and the encoder serializing the result as a VLIW-style
//! instruction stream for a tile-based GPU.
//!
//! A [`Shader`] goes through two forms (see [`IrForm`]):
//! * **scalar**: every [`Inst`] lives directly in a `Block` [`Node`] of its
//!   function's control-flow tree, operands are mostly SSA values
//! * **bundled**: after register allocation, each `Block` holds [`InstGroup`]s
//!   (co-issued instructions, one per execution [`Phase`]) instead, ready to be
//!   encoded by [`encode`]
//!
//! #### Notable types/modules
//!
//! ##### IR data types
//! * [`Context`]: read-only device information, shared between shaders
//! * [`Shader`]: owns [`Func`]s, the resulting [`ShaderInfo`] and binary
//! * [`FuncDef`]: owns [`Node`]s, [`Inst`]s and [`InstGroup`]s (rooted by [`root`](FuncDef::root))
//! * [`Ref`]: packed operand reference (SSA value, register, immediate, etc.)
//!
//! ##### Utilities and passes
//! * [`Builder`](builder::Builder): frontend-facing API for building functions
//! * [`validate`](mod@validate): SSA definition-before-use validator
//! * [`passes::compile`]: the whole pipeline, from scalar SSA to the binary
//! * [`print`](mod@print): textual IR dumps
//!

// BEGIN - Embark standard lints v6 for Rust 1.55+
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::flat_map_option,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::from_iter_instead_of_collect,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_digit_groups,
    clippy::large_stack_arrays,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_same_arms,
    clippy::match_wild_err_arm,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::missing_enforced_import_renames,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::needless_for_each,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::rc_mutex,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::single_match_else,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v6 for Rust 1.55+
// crate-specific exceptions:
#![allow(
    // NOTE(tilir) ignored for readability (`match` used when `if let` is too long).
    clippy::single_match_else,

    // NOTE(tilir) the opcode/encoding tables intentionally repeat arm bodies.
    clippy::match_same_arms,
)]
#![forbid(unsafe_code)]

// NOTE(tilir) all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
pub mod builder;
pub mod cf;
mod context;
pub mod encode;
pub mod func_at;
pub mod group;
mod info;
pub mod op;
pub mod options;
pub mod passes;
pub mod print;
mod reference;
pub mod transform;
pub mod validate;
pub mod visit;

use smallvec::SmallVec;
use std::rc::Rc;

#[doc(hidden)]
type FxIndexMap<K, V> =
    indexmap::IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

// NOTE(tilir) these reexports are all documented inside their own modules.
pub use context::{
    Context, DeviceInfo, Entity, EntityDefs, EntityList, EntityListIter, Func, Inst, InstGroup,
    Node,
};
pub use group::InstGroupDef;
pub use info::{ShaderInfo, StageInfo};
pub use op::{Op, OpMod, Phase};
pub use reference::{
    BitWidth, DataType, IndexedReg, Io, MAX_ELEM, MAX_LANES, PredReg, Ref, RefKind, RefMods,
    RegClass,
};

/// Pipeline stage a [`Shader`] is compiled for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// Which of the two IR forms a [`Shader`] is currently in.
///
/// The form decides where [`Inst`]s live: directly in `Block` nodes
/// (`Scalar`), or inside [`InstGroup`]s (`Bundled`). Iterating a function
/// the wrong way for its form is a compiler bug, and asserts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IrForm {
    Scalar,
    Bundled,
}

// HACK(tilir) this only serves to disallow modifying the `cx` field of `Shader`.
#[doc(hidden)]
mod sealed {
    use super::*;

    pub struct Shader {
        /// Context used for device information, in this shader.
        ///
        /// Private to disallow switching the context of a shader, and [`Rc`]
        /// shared so many shaders can be compiled against the same context.
        cx: Rc<Context>,

        pub stage: ShaderStage,

        /// Driver-internal shader (as opposed to an application one), only
        /// relevant for deciding whether debug dumps apply.
        pub internal: bool,

        form: IrForm,

        pub funcs: EntityDefs<Func>,

        pub info: ShaderInfo,

        binary: Vec<u8>,
    }

    impl Shader {
        pub fn new(cx: Rc<Context>, stage: ShaderStage) -> Self {
            Self {
                cx,
                stage,
                internal: false,
                form: IrForm::Scalar,
                funcs: Default::default(),
                info: ShaderInfo::new(stage),
                binary: vec![],
            }
        }

        pub fn cx(&self) -> Rc<Context> {
            self.cx.clone()
        }

        pub fn cx_ref(&self) -> &Rc<Context> {
            &self.cx
        }

        pub fn form(&self) -> IrForm {
            self.form
        }

        pub(crate) fn set_form(&mut self, form: IrForm) {
            self.form = form;
        }

        pub fn binary_data(&self) -> &[u8] {
            &self.binary
        }

        pub fn binary_size(&self) -> usize {
            self.binary.len()
        }

        pub(crate) fn set_binary(&mut self, binary: Vec<u8>) {
            self.binary = binary;
        }
    }
}
pub use sealed::Shader;

impl Shader {
    /// Add a new (empty) function to the shader.
    ///
    /// There can be at most one function of each [`FuncRole`], and the
    /// preamble (if any) has to be added before the entrypoint.
    pub fn add_func(&mut self, role: FuncRole) -> Func {
        assert_eq!(self.form(), IrForm::Scalar, "Shader::add_func: shader already bundled");
        for (_, func_def) in self.funcs.iter() {
            assert_ne!(func_def.role, role, "Shader::add_func: duplicate {role:?}");
            assert!(
                !(role == FuncRole::Preamble && func_def.role == FuncRole::Entrypoint),
                "Shader::add_func: preamble must be added before the entrypoint"
            );
        }
        let index = self.funcs.keys().count() as u32;
        self.funcs.define(FuncDef::new(index, role))
    }

    pub fn func_by_role(&self, role: FuncRole) -> Option<Func> {
        self.funcs.iter().find(|(_, func_def)| func_def.role == role).map(|(func, _)| func)
    }

    pub fn entrypoint(&self) -> Option<Func> {
        self.func_by_role(FuncRole::Entrypoint)
    }

    /// Start traversing `func` from its root, in the shader's current form.
    pub fn func_at(&self, func: Func) -> func_at::FuncAt<'_, Node> {
        let func_def = &self.funcs[func];
        func_def.at(self.form(), func_def.root)
    }

    /// Start building `func`, positioned at the end of its last `Block`.
    pub fn builder(&mut self, func: Func) -> builder::Builder<'_> {
        assert_eq!(self.form(), IrForm::Scalar, "Shader::builder: shader already bundled");
        builder::Builder::at_func_end(&mut self.funcs[func])
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FuncRole {
    /// Runs once per draw/dispatch (e.g. to load uniforms into shared
    /// registers), ahead of the entrypoint.
    Preamble,
    Entrypoint,
}

/// Function parameter, defining the SSA value `value` on entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FuncParam {
    pub data_type: DataType,
    pub width: BitWidth,
    pub value: Ref,
}

/// Per-function monotonic counters, used to assign indices (never reused,
/// except by an explicit re-index, see [`passes::reindex`]).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub ssa: u32,
    pub inst: u32,
    pub group: u32,
    pub block: u32,
    pub if_: u32,
    pub loop_: u32,
}

/// Definition for a [`Func`]: its control-flow tree, and everything within.
pub struct FuncDef {
    /// Position of the function in the shader (and its binary).
    pub index: u32,

    pub role: FuncRole,

    pub params: SmallVec<[FuncParam; 2]>,

    pub nodes: EntityDefs<Node>,
    pub insts: EntityDefs<Inst>,
    pub groups: EntityDefs<InstGroup>,

    /// The `NodeKind::Func` root of the control-flow tree.
    pub root: Node,

    /// Side table of SSA vector values, keyed by the defining instruction.
    pub vec_info: FxIndexMap<Inst, VecInfo>,

    pub counters: Counters,

    /// Number of temporary registers used after register allocation.
    pub temps_used: u32,

    /// Byte offset of the function in the shader binary, once encoded.
    pub binary_offset: Option<usize>,
}

/// An SSA vector value, and the scalar components it decomposes into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VecInfo {
    pub ssa: u32,
    pub comps: SmallVec<[Ref; 4]>,
    pub consumer: Consumer,
}

/// What reads (any component of) a vector value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Consumer {
    None,
    Single(Inst),
    Multiple,
}

impl Consumer {
    #[must_use]
    pub fn add(self, inst: Inst) -> Self {
        match self {
            Consumer::None => Consumer::Single(inst),
            Consumer::Single(existing) if existing == inst => self,
            Consumer::Single(_) | Consumer::Multiple => Consumer::Multiple,
        }
    }
}

/// Where to insert a new [`Inst`] (only while in scalar form).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InsertPoint {
    BlockStart(Node),
    BlockEnd(Node),
    Before(Inst),
    After(Inst),
}

impl FuncDef {
    pub fn new(index: u32, role: FuncRole) -> Self {
        let mut nodes = EntityDefs::new();
        let root = nodes.define(NodeDef {
            index: 0,
            parent: None,
            arm: Arm::None,
            kind: NodeKind::Func { body: EntityList::empty() },
        });
        Self {
            index,
            role,
            params: SmallVec::new(),
            nodes,
            insts: EntityDefs::new(),
            groups: EntityDefs::new(),
            root,
            vec_info: FxIndexMap::default(),
            counters: Counters::default(),
            temps_used: 0,
            binary_offset: None,
        }
    }

    pub fn alloc_ssa(&mut self) -> u32 {
        let idx = self.counters.ssa;
        self.counters.ssa += 1;
        idx
    }

    /// Create a new node, not yet linked into the tree (see `insert_node_*`).
    pub fn define_node(&mut self, kind: NodeKind) -> Node {
        let counter = match kind {
            NodeKind::Block { .. } => &mut self.counters.block,
            NodeKind::If { .. } => &mut self.counters.if_,
            NodeKind::Loop { .. } => &mut self.counters.loop_,
            NodeKind::Func { .. } => unreachable!("FuncDef::define_node: only one root per function"),
        };
        let index = *counter;
        *counter += 1;
        self.nodes.define(NodeDef { index, parent: None, arm: Arm::None, kind })
    }

    pub fn define_block(&mut self) -> Node {
        self.define_node(NodeKind::Block { insts: EntityList::empty(), groups: EntityList::empty() })
    }

    /// The list of children `parent` has in `arm` (`Arm::None` for anything
    /// other than the arms of an `If`).
    pub fn node_list(&self, parent: Node, arm: Arm) -> EntityList<Node> {
        match (&self.nodes[parent].kind, arm) {
            (NodeKind::If { then_body, .. }, Arm::Then) => *then_body,
            (NodeKind::If { else_body, .. }, Arm::Else) => *else_body,
            (NodeKind::Loop { body } | NodeKind::Func { body }, Arm::None) => *body,
            (kind, arm) => unreachable!("FuncDef::node_list: no {arm:?} list in {kind:?}"),
        }
    }

    fn node_list_mut(&mut self, parent: Node, arm: Arm) -> &mut EntityList<Node> {
        match (&mut self.nodes[parent].kind, arm) {
            (NodeKind::If { then_body, .. }, Arm::Then) => then_body,
            (NodeKind::If { else_body, .. }, Arm::Else) => else_body,
            (NodeKind::Loop { body } | NodeKind::Func { body }, Arm::None) => body,
            (kind, arm) => unreachable!("FuncDef::node_list: no {arm:?} list in {kind:?}"),
        }
    }

    // HACK(tilir) the lists live inside `NodeDef`s, so they have to be copied
    // out of `nodes` while `nodes` itself is being mutated.
    fn edit_node_list(
        &mut self,
        parent: Node,
        arm: Arm,
        f: impl FnOnce(&mut EntityList<Node>, &mut EntityDefs<Node>),
    ) {
        let mut list = self.node_list(parent, arm);
        f(&mut list, &mut self.nodes);
        *self.node_list_mut(parent, arm) = list;
    }

    fn adopt(&mut self, child: Node, parent: Node, arm: Arm) {
        let child_def = &mut self.nodes[child];
        assert!(child_def.parent.is_none(), "FuncDef: {child:?} already has a parent");
        child_def.parent = Some(parent);
        child_def.arm = arm;
    }

    pub fn insert_node_first(&mut self, parent: Node, arm: Arm, child: Node) {
        self.adopt(child, parent, arm);
        self.edit_node_list(parent, arm, |list, nodes| list.insert_first(child, nodes));
    }

    pub fn insert_node_last(&mut self, parent: Node, arm: Arm, child: Node) {
        self.adopt(child, parent, arm);
        self.edit_node_list(parent, arm, |list, nodes| list.insert_last(child, nodes));
    }

    pub fn insert_node_before(&mut self, anchor: Node, child: Node) {
        let NodeDef { parent, arm, .. } = self.nodes[anchor];
        let parent = parent.expect("FuncDef::insert_node_before: root has no siblings");
        self.adopt(child, parent, arm);
        self.edit_node_list(parent, arm, |list, nodes| list.insert_before(child, anchor, nodes));
    }

    pub fn insert_node_after(&mut self, anchor: Node, child: Node) {
        let NodeDef { parent, arm, .. } = self.nodes[anchor];
        let parent = parent.expect("FuncDef::insert_node_after: root has no siblings");
        self.adopt(child, parent, arm);
        self.edit_node_list(parent, arm, |list, nodes| list.insert_after(child, anchor, nodes));
    }

    pub fn block_insts(&self, block: Node) -> EntityList<Inst> {
        match self.nodes[block].kind {
            NodeKind::Block { insts, .. } => insts,
            ref kind => unreachable!("FuncDef::block_insts: {kind:?} is not a block"),
        }
    }

    fn edit_block_insts(
        &mut self,
        block: Node,
        f: impl FnOnce(&mut EntityList<Inst>, &mut EntityDefs<Inst>),
    ) {
        match &mut self.nodes[block].kind {
            NodeKind::Block { insts, .. } => f(insts, &mut self.insts),
            kind => unreachable!("FuncDef: {kind:?} is not a block"),
        }
    }

    /// Create a new instruction (with no modifiers, executing unconditionally),
    /// and link it into a `Block` at `at`.
    pub fn insert_inst(
        &mut self,
        at: InsertPoint,
        op: Op,
        dsts: impl IntoIterator<Item = Ref>,
        srcs: impl IntoIterator<Item = Ref>,
    ) -> Inst {
        let block = match at {
            InsertPoint::BlockStart(block) | InsertPoint::BlockEnd(block) => block,
            InsertPoint::Before(anchor) | InsertPoint::After(anchor) => self.insts[anchor].block(),
        };
        let index = self.counters.inst;
        self.counters.inst += 1;
        let inst = self.insts.define(InstDef {
            index,
            op,
            dsts: dsts.into_iter().collect(),
            srcs: srcs.into_iter().collect(),
            mods: Default::default(),
            exec_cond: ExecCond::Always,
            end: false,
            cf: InstCf::None,
            parent: InstParent::Block(block),
        });
        self.edit_block_insts(block, |list, insts| match at {
            InsertPoint::BlockStart(_) => list.insert_first(inst, insts),
            InsertPoint::BlockEnd(_) => list.insert_last(inst, insts),
            InsertPoint::Before(anchor) => list.insert_before(inst, anchor, insts),
            InsertPoint::After(anchor) => list.insert_after(inst, anchor, insts),
        });
        inst
    }

    /// Unlink `inst` from its `Block` and discard it, along with any
    /// side-table state referring to it.
    pub fn delete_inst(&mut self, inst: Inst) {
        let block = self.insts[inst].block();
        self.edit_block_insts(block, |list, insts| list.remove(inst, insts));
        let inst_def = self.insts.remove(inst);

        self.vec_info.shift_remove(&inst);
        for vec in self.vec_info.values_mut() {
            if vec.consumer == Consumer::Single(inst) {
                vec.consumer = Consumer::None;
            }
        }

        let defined: SmallVec<[u32; 2]> =
            inst_def.dsts.iter().filter_map(|dst| dst.ssa_idx()).collect();
        if defined.is_empty() {
            return;
        }
        for (_, other) in self.insts.iter_mut() {
            if let InstCf::Phi(phi_srcs) = &mut other.cf {
                phi_srcs.retain(|src| !src.value.ssa_idx().is_some_and(|idx| defined.contains(&idx)));
            }
        }
    }

    /// Start traversing the function at `position`, in the given form.
    pub fn at<P: Copy>(&self, form: IrForm, position: P) -> func_at::FuncAt<'_, P> {
        func_at::FuncAt {
            nodes: &self.nodes,
            insts: &self.insts,
            groups: &self.groups,
            form,
            position,
        }
    }

    pub fn at_mut<P: Copy>(&mut self, form: IrForm, position: P) -> func_at::FuncAtMut<'_, P> {
        func_at::FuncAtMut {
            nodes: &mut self.nodes,
            insts: &mut self.insts,
            groups: &mut self.groups,
            form,
            position,
        }
    }

    /// Instructions of the whole function in program order (scalar form only),
    /// collected so that the function can be mutated while going through them.
    pub fn collect_insts(&self) -> Vec<Inst> {
        self.at(IrForm::Scalar, self.root)
            .blocks()
            .flat_map(|block| block.at_insts())
            .map(|inst| inst.position)
            .collect()
    }

    /// Find the instruction defining the vector SSA value `ssa`, if any.
    pub fn vec_def(&self, ssa: u32) -> Option<Inst> {
        self.vec_info.iter().find(|(_, vec)| vec.ssa == ssa).map(|(&inst, _)| inst)
    }
}

/// Which list of its parent a [`Node`] is in (only `If` has more than one).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Arm {
    None,
    Then,
    Else,
}

/// Definition for a [`Node`]: a `Block` of instructions, or a structured
/// control-flow construct containing further nodes.
#[derive(Clone, Debug)]
pub struct NodeDef {
    /// Position among the nodes of the same kind (`Block`s, `If`s, etc.).
    pub index: u32,

    /// Only `None` for the function root (and nodes not yet inserted).
    pub parent: Option<Node>,
    pub arm: Arm,

    pub kind: NodeKind,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Linear chain of instructions, executing in sequence.
    ///
    /// Only one of `insts` and `groups` is used, depending on the [`IrForm`].
    Block { insts: EntityList<Inst>, groups: EntityList<InstGroup> },

    /// Execute `then_body` if `cond` (a predicate) holds, `else_body` otherwise.
    If { cond: Ref, then_body: EntityList<Node>, else_body: EntityList<Node> },

    /// Execute `body` repeatedly, until a branch out of it is taken.
    Loop { body: EntityList<Node> },

    /// Root of a function's control-flow tree.
    Func { body: EntityList<Node> },
}

/// Predicate an instruction's execution is conditional on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExecCond {
    Always,
    P0True,
    P0False,
}

impl ExecCond {
    pub fn encode(self) -> u8 {
        match self {
            ExecCond::Always => 0,
            ExecCond::P0True => 1,
            ExecCond::P0False => 2,
        }
    }
}

/// Incoming value of a phi, from the end of `block`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PhiSrc {
    pub block: Node,
    pub value: Ref,
}

/// Control-flow related payload of an [`InstDef`].
#[derive(Clone, Debug, PartialEq, Eq, derive_more::From)]
pub enum InstCf {
    None,
    Phi(SmallVec<[PhiSrc; 2]>),
    /// Branch target (for [`Op::Br`]): the first `Block` reached by
    /// descending into this node.
    Target(Node),
}

/// Where an [`Inst`] currently lives (which one is decided by the [`IrForm`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstParent {
    Block(Node),
    Group { group: InstGroup, phase: Phase },
}

/// Definition for an [`Inst`].
#[derive(Clone, Debug)]
pub struct InstDef {
    /// Monotonically assigned per function, only used for dumps/diagnostics.
    pub index: u32,

    pub op: Op,
    pub dsts: SmallVec<[Ref; 2]>,
    pub srcs: SmallVec<[Ref; 4]>,
    pub mods: arrayvec::ArrayVec<OpMod, 2>,

    pub exec_cond: ExecCond,

    /// Last instruction of the program.
    pub end: bool,

    pub cf: InstCf,

    pub parent: InstParent,
}

impl InstDef {
    /// The `Block` this instruction is in (scalar form only).
    pub fn block(&self) -> Node {
        match self.parent {
            InstParent::Block(block) => block,
            InstParent::Group { .. } => unreachable!("InstDef::block: instruction is bundled"),
        }
    }

    /// The group (and phase within it) this instruction is in (bundled form only).
    pub fn group(&self) -> (InstGroup, Phase) {
        match self.parent {
            InstParent::Group { group, phase } => (group, phase),
            InstParent::Block(_) => unreachable!("InstDef::group: instruction isn't bundled"),
        }
    }

    pub fn phi_srcs(&self) -> &[PhiSrc] {
        match &self.cf {
            InstCf::Phi(srcs) => srcs,
            _ => &[],
        }
    }

    pub fn target(&self) -> Option<Node> {
        match self.cf {
            InstCf::Target(target) => Some(target),
            _ => None,
        }
    }

    pub fn has_side_effects(&self) -> bool {
        self.op.info().side_effects || self.end
    }

    pub fn op_mod(&self) -> Option<OpMod> {
        self.mods.first().copied()
    }
}
