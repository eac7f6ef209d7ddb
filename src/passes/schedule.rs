//! Dependency counter assignment, and the waits they require.
//!
//! Backend operations (sampling, memory, varying iteration) complete
//! asynchronously, each tracked by one of the device's dependency counters
//! (DRCs). Counters are handed out round-robin, and an `Op::Wdf` (wait for
//! DRC) is inserted:
//! * before the first instruction reading a result still pending on a counter
//! * before a counter with results still pending on it is reused
//! * at the end of every `Block` (before its final branch, if any), for every
//!   counter still pending, so that no wait is ever needed across blocks

use crate::{FuncDef, InsertPoint, Inst, IrForm, Node, Op, Ref, RefKind, Shader};
use itertools::Itertools;
use smallvec::SmallVec;

pub fn schedule(shader: &mut Shader) -> bool {
    let num_drcs = shader.cx_ref().device.num_drcs;
    let mut changed = false;
    for (_, func_def) in shader.funcs.iter_mut() {
        changed |= schedule_func(func_def, num_drcs);
    }
    changed
}

/// The identity of a value, regardless of modifiers, components or types.
fn value_key(r: Ref) -> Option<Ref> {
    matches!(r.kind(), RefKind::Ssa | RefKind::Reg | RefKind::RegIndexed)
        .then(|| Ref::NONE.with_base_of(r))
}

struct Scheduler {
    num_drcs: u8,
    next_drc: u8,
    /// Values written by in-flight backend operations, and their counter.
    pending: Vec<(Ref, u8)>,
    waits: usize,
}

impl Scheduler {
    fn wait(&mut self, func_def: &mut FuncDef, at: InsertPoint, drc: u8) {
        func_def.insert_inst(at, Op::Wdf, [], [Ref::drc(drc)]);
        self.pending.retain(|&(_, pending_drc)| pending_drc != drc);
        self.waits += 1;
    }

    fn schedule_inst(&mut self, func_def: &mut FuncDef, inst: Inst) -> bool {
        let inst_def = &func_def.insts[inst];
        let info = inst_def.op.info();

        if inst_def.op == Op::Wdf {
            if let Some(drc) = inst_def.srcs[0].as_drc() {
                self.pending.retain(|&(_, pending_drc)| pending_drc != drc);
            }
            return false;
        }

        let read: SmallVec<[u8; 2]> = inst_def
            .srcs
            .iter()
            .filter_map(|&src| value_key(src))
            .filter_map(|key| self.pending.iter().find(|&&(value, _)| value == key).map(|&(_, drc)| drc))
            .unique()
            .collect();
        let mut changed = !read.is_empty();
        for drc in read {
            self.wait(func_def, InsertPoint::Before(inst), drc);
        }

        if info.uses_drc {
            let drc = self.next_drc;
            self.next_drc = (self.next_drc + 1) % self.num_drcs;
            if self.pending.iter().any(|&(_, pending_drc)| pending_drc == drc) {
                self.wait(func_def, InsertPoint::Before(inst), drc);
            }

            let inst_def = &mut func_def.insts[inst];
            changed |= inst_def.srcs[0] != Ref::drc(drc);
            inst_def.srcs[0] = Ref::drc(drc);
            if inst_def.op.is_backend_with_result() {
                self.pending.extend(inst_def.dsts.iter().filter_map(|&dst| Some((value_key(dst)?, drc))));
            }
        }
        changed
    }

    fn finish_block(&mut self, func_def: &mut FuncDef, block: Node) -> bool {
        let drcs: SmallVec<[u8; 2]> = self.pending.iter().map(|&(_, drc)| drc).unique().sorted().collect();
        let at = match func_def.block_insts(block).last() {
            Some(last) if func_def.insts[last].op == Op::Br => InsertPoint::Before(last),
            _ => InsertPoint::BlockEnd(block),
        };
        for &drc in &drcs {
            self.wait(func_def, at, drc);
        }
        !drcs.is_empty()
    }
}

pub fn schedule_func(func_def: &mut FuncDef, num_drcs: u8) -> bool {
    assert!(num_drcs > 0, "schedule: device has no dependency counters");
    let mut scheduler = Scheduler { num_drcs, next_drc: 0, pending: vec![], waits: 0 };
    let mut changed = false;

    let blocks: Vec<Node> =
        func_def.at(IrForm::Scalar, func_def.root).blocks().map(|block| block.position).collect();
    for block in blocks {
        for inst in func_def.block_insts(block).iter().collect_vec(&func_def.insts) {
            changed |= scheduler.schedule_inst(func_def, inst);
        }
        changed |= scheduler.finish_block(func_def, block);
    }

    tracing::debug!(func = func_def.index, waits = scheduler.waits, "assigned dependency counters");
    changed
}
