//! Building functions instruction by instruction, with a cursor.
//!
//! This is the boundary a frontend lowers its own IR through, and what passes
//! use to insert new instructions. Structured control-flow is built by
//! entering and leaving `If`/`Loop` nodes, always at the end of a `Block`.

use crate::op::{SmpDim, TstCmp};
use crate::{
    Arm, BitWidth, Consumer, DataType, EntityList, ExecCond, FuncDef, FuncParam, InsertPoint, Inst,
    InstCf, MAX_ELEM, Node, NodeKind, Op, OpMod, PhiSrc, PredReg, Ref, VecInfo,
};
use smallvec::SmallVec;

pub struct Builder<'a> {
    func: &'a mut FuncDef,
    cursor: InsertPoint,
}

impl<'a> Builder<'a> {
    pub fn at(func: &'a mut FuncDef, cursor: InsertPoint) -> Self {
        Self { func, cursor }
    }

    /// Position at the end of the function, adding an empty `Block` there if
    /// the function doesn't already end in one.
    pub fn at_func_end(func: &'a mut FuncDef) -> Self {
        let root = func.root;
        let last = func.node_list(root, Arm::None).last();
        let block = match last {
            Some(node) if matches!(func.nodes[node].kind, NodeKind::Block { .. }) => node,
            _ => {
                let block = func.define_block();
                func.insert_node_last(root, Arm::None, block);
                block
            }
        };
        Self::at(func, InsertPoint::BlockEnd(block))
    }

    pub fn at_block_end(func: &'a mut FuncDef, block: Node) -> Self {
        Self::at(func, InsertPoint::BlockEnd(block))
    }

    /// Position right before `inst`, in its `Block`.
    pub fn before(func: &'a mut FuncDef, inst: Inst) -> Self {
        Self::at(func, InsertPoint::Before(inst))
    }

    pub fn func(&mut self) -> &mut FuncDef {
        self.func
    }

    pub fn cursor(&self) -> InsertPoint {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: InsertPoint) {
        self.cursor = cursor;
    }

    /// The `Block` the cursor is in.
    pub fn block(&self) -> Node {
        match self.cursor {
            InsertPoint::BlockStart(block) | InsertPoint::BlockEnd(block) => block,
            InsertPoint::Before(inst) | InsertPoint::After(inst) => self.func.insts[inst].block(),
        }
    }

    /// New scalar 32-bit SSA value.
    pub fn ssa(&mut self) -> Ref {
        Ref::ssa(self.func.alloc_ssa())
    }

    /// New SSA vector value, whose components are usable through
    /// [`Ref::with_elem`].
    pub fn ssa_vec(&mut self, lanes: u16) -> Ref {
        assert!(
            (2..=u16::from(MAX_ELEM) + 1).contains(&lanes),
            "Builder::ssa_vec: {lanes} lanes can't be decomposed into components"
        );
        self.ssa().with_lanes(lanes)
    }

    /// Add a function parameter, returning the SSA value it defines.
    pub fn param(&mut self, data_type: DataType, width: BitWidth) -> Ref {
        let value = self.ssa().with_data_type(data_type).with_width(width);
        self.func.params.push(FuncParam { data_type, width, value });
        value
    }

    /// Insert an instruction at the cursor, which then moves past it.
    pub fn push(&mut self, op: Op, dsts: &[Ref], srcs: &[Ref]) -> Inst {
        let info = op.info();
        if op != Op::Phi {
            assert_eq!(dsts.len(), usize::from(info.num_dsts), "{op}: wrong number of destinations");
            assert_eq!(srcs.len(), usize::from(info.num_srcs), "{op}: wrong number of sources");
        }

        let inst = self.func.insert_inst(self.cursor, op, dsts.iter().copied(), srcs.iter().copied());
        self.cursor = match self.cursor {
            InsertPoint::BlockStart(_) | InsertPoint::After(_) => InsertPoint::After(inst),
            cursor @ (InsertPoint::BlockEnd(_) | InsertPoint::Before(_)) => cursor,
        };

        for &dst in dsts {
            if let Some(ssa) = dst.ssa_idx() {
                if dst.lanes() > 1 {
                    let comps = (0..dst.lanes() as u8).map(|elem| dst.base().with_lanes(1).with_elem(elem)).collect();
                    self.func.vec_info.insert(inst, VecInfo { ssa, comps, consumer: Consumer::None });
                }
            }
        }
        for &src in srcs {
            if let Some(vec_def) = src.ssa_idx().and_then(|ssa| self.func.vec_def(ssa)) {
                let vec = &mut self.func.vec_info[&vec_def];
                vec.consumer = vec.consumer.add(inst);
            }
        }

        inst
    }

    pub fn with_op_mod(&mut self, inst: Inst, op_mod: OpMod) -> Inst {
        self.func.insts[inst].mods.push(op_mod);
        inst
    }

    pub fn with_exec_cond(&mut self, inst: Inst, exec_cond: ExecCond) -> Inst {
        self.func.insts[inst].exec_cond = exec_cond;
        inst
    }

    pub fn alu1(&mut self, op: Op, dst: Ref, a: Ref) -> Inst {
        self.push(op, &[dst], &[a])
    }

    pub fn alu2(&mut self, op: Op, dst: Ref, a: Ref, b: Ref) -> Inst {
        self.push(op, &[dst], &[a, b])
    }

    pub fn alu3(&mut self, op: Op, dst: Ref, a: Ref, b: Ref, c: Ref) -> Inst {
        self.push(op, &[dst], &[a, b, c])
    }

    pub fn mov(&mut self, dst: Ref, src: Ref) -> Inst {
        self.alu1(Op::Mov, dst, src)
    }

    /// Compare `a` and `b`, writing the result to `P0`.
    pub fn tst(&mut self, cmp: TstCmp, a: Ref, b: Ref) -> Inst {
        let inst = self.push(Op::Tst, &[Ref::pred(PredReg::P0)], &[a, b]);
        self.with_op_mod(inst, OpMod::Tst(cmp))
    }

    /// `dst = if P0 { a } else { b }`.
    pub fn movc(&mut self, dst: Ref, a: Ref, b: Ref) -> Inst {
        self.alu2(Op::Movc, dst, a, b)
    }

    // NOTE(tilir) the dependency counter of backend operations is assigned
    // by the `schedule` pass, `drc0` is only a placeholder.

    pub fn fitr(&mut self, dst: Ref, coeff: Ref) -> Inst {
        self.push(Op::Fitr, &[dst], &[Ref::drc(0), coeff])
    }

    pub fn smp(&mut self, dst: Ref, coords: Ref, image: Ref, sampler: Ref, dim: SmpDim) -> Inst {
        let inst = self.push(Op::Smp, &[dst], &[Ref::drc(0), coords, image, sampler]);
        self.with_op_mod(inst, OpMod::Dim(dim))
    }

    pub fn ld(&mut self, dst: Ref, addr: Ref) -> Inst {
        self.push(Op::Ld, &[dst], &[Ref::drc(0), addr])
    }

    pub fn st(&mut self, data: Ref, addr: Ref) -> Inst {
        self.push(Op::St, &[], &[Ref::drc(0), data, addr])
    }

    pub fn atomic(&mut self, dst: Ref, addr: Ref, data: Ref) -> Inst {
        self.push(Op::Atomic, &[dst], &[Ref::drc(0), addr, data])
    }

    pub fn emitpix(&mut self) -> Inst {
        self.push(Op::Emitpix, &[], &[])
    }

    pub fn uvsw(&mut self, slot: u8, value: Ref) -> Inst {
        let inst = self.push(Op::Uvsw, &[], &[value]);
        self.with_op_mod(inst, OpMod::Slot(slot))
    }

    pub fn wdf(&mut self, drc: u8) -> Inst {
        self.push(Op::Wdf, &[], &[Ref::drc(drc)])
    }

    pub fn nop(&mut self) -> Inst {
        self.push(Op::Nop, &[], &[])
    }

    pub fn barrier(&mut self) -> Inst {
        self.push(Op::Barrier, &[], &[])
    }

    /// Branch to the first `Block` of `target`, if `exec_cond` holds.
    pub fn br(&mut self, target: Node, exec_cond: ExecCond) -> Inst {
        let inst = self.push(Op::Br, &[], &[]);
        self.func.insts[inst].cf = target.into();
        self.with_exec_cond(inst, exec_cond)
    }

    /// Merge `srcs` (one per incoming `Block`) into `dst`.
    pub fn phi(&mut self, dst: Ref, srcs: impl IntoIterator<Item = PhiSrc>) -> Inst {
        let inst = self.push(Op::Phi, &[dst], &[]);
        let srcs: SmallVec<[PhiSrc; 2]> = srcs.into_iter().collect();
        self.func.insts[inst].cf = InstCf::Phi(srcs);
        inst
    }

    fn assert_at_block_end(&self, what: &str) -> Node {
        let block = self.block();
        let at_end = match self.cursor {
            InsertPoint::BlockEnd(_) => true,
            InsertPoint::After(inst) => self.func.block_insts(block).last() == Some(inst),
            InsertPoint::BlockStart(_) => self.func.block_insts(block).is_empty(),
            InsertPoint::Before(_) => false,
        };
        assert!(at_end, "Builder::{what}: cursor must be at the end of a block");
        block
    }

    /// Start an `If` (on the predicate `cond`) after the current `Block`,
    /// and move into a new `Block` of its "then" arm.
    ///
    /// Only `p0` (or `!p0`) passes validation, other predicates are rejected
    /// by `compile` as [`ValidationErrorKind::NonP0Condition`](crate::validate::ValidationErrorKind::NonP0Condition).
    pub fn push_if(&mut self, cond: Ref) -> Node {
        assert!(cond.as_pred().is_some(), "Builder::push_if: condition {cond} isn't a predicate");
        let block = self.assert_at_block_end("push_if");
        let if_node = self.func.define_node(NodeKind::If {
            cond,
            then_body: EntityList::empty(),
            else_body: EntityList::empty(),
        });
        self.func.insert_node_after(block, if_node);
        self.enter_arm(if_node, Arm::Then);
        if_node
    }

    /// Move into a new `Block` of the "else" arm of `if_node`.
    pub fn enter_else(&mut self, if_node: Node) {
        self.enter_arm(if_node, Arm::Else);
    }

    /// Leave `if_node`, moving into a new `Block` after it.
    pub fn exit_if(&mut self, if_node: Node) {
        self.exit_node(if_node);
    }

    /// Start a `Loop` after the current `Block`, and move into a new `Block`
    /// (the loop header) of its body.
    pub fn push_loop(&mut self) -> Node {
        let block = self.assert_at_block_end("push_loop");
        let loop_node = self.func.define_node(NodeKind::Loop { body: EntityList::empty() });
        self.func.insert_node_after(block, loop_node);
        self.enter_arm(loop_node, Arm::None);
        loop_node
    }

    /// Leave `loop_node`, moving into a new `Block` after it.
    pub fn exit_loop(&mut self, loop_node: Node) {
        self.exit_node(loop_node);
    }

    fn enter_arm(&mut self, parent: Node, arm: Arm) {
        let block = self.func.define_block();
        self.func.insert_node_last(parent, arm, block);
        self.cursor = InsertPoint::BlockEnd(block);
    }

    fn exit_node(&mut self, node: Node) {
        let block = self.func.define_block();
        self.func.insert_node_after(node, block);
        self.cursor = InsertPoint::BlockEnd(block);
    }
}
