//! Register allocation, replacing every SSA value with temporary registers.
//!
//! This is a linear scan over live intervals, where positions are the
//! program order of instructions (function parameters being defined at
//! position `0`, before everything else):
//! * a value read inside a `Loop` it's not defined in stays live until the end
//!   of that loop (as it will be read again by the next iteration)
//! * phis are coalesced with all their sources (i.e. "phi webs"), which
//!   requires the input to be in conventional SSA form (no two values of the
//!   same web may be live at once), and is a frontend guarantee
//! * vector values get consecutive registers, their components being
//!   `base + element`
//!
//! There is no spilling: running out of temporaries is a compiler bug.

use crate::options::{CompilationOptions, DebugFlags};
use crate::transform::rewrite_refs;
use crate::visit::RefRole;
use crate::{FuncDef, FxIndexMap, Inst, IrForm, Node, NodeKind, Op, Ref, Shader};
use itertools::Itertools;
use rustc_hash::FxHashMap;

/// Position of an instruction, in program order.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::From, derive_more::Into,
)]
struct Pos(u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Interval {
    start: Pos,
    end: Pos,
    /// Number of consecutive registers needed (i.e. vector lanes).
    size: u32,
}

/// Union-find over SSA indices, grouping each phi with its sources.
struct PhiWebs {
    parent: Vec<u32>,
}

impl PhiWebs {
    fn new(num_ssa: u32) -> Self {
        Self { parent: (0..num_ssa).collect() }
    }

    fn find(&mut self, mut idx: u32) -> u32 {
        while self.parent[idx as usize] != idx {
            let grandparent = self.parent[self.parent[idx as usize] as usize];
            self.parent[idx as usize] = grandparent;
            idx = grandparent;
        }
        idx
    }

    fn union(&mut self, a: u32, b: u32) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent[a.max(b) as usize] = a.min(b);
        }
    }
}

/// Program-order positions, and the position ranges they imply.
#[derive(Default)]
struct Layout {
    insts: Vec<(Node, Inst, Pos)>,
    /// Position of the last instruction in (or before) each `Block`.
    block_end: FxHashMap<Node, Pos>,
    /// First and last position of every `Loop`.
    loops: FxHashMap<Node, (Pos, Pos)>,
}

impl Layout {
    fn compute(func_def: &FuncDef) -> Self {
        let mut layout = Layout::default();
        let mut cur = 0;
        for block in func_def.at(IrForm::Scalar, func_def.root).blocks() {
            let first = Pos(cur + 1);
            for inst in block.at_insts() {
                cur += 1;
                layout.insts.push((block.position, inst.position, Pos(cur)));
            }
            layout.block_end.insert(block.position, Pos(cur));
            for loop_node in enclosing_loops(func_def, block.position) {
                let range = layout.loops.entry(loop_node).or_insert((first, Pos(cur)));
                range.1 = Pos(cur);
            }
        }
        layout
    }
}

fn enclosing_loops(func_def: &FuncDef, block: Node) -> impl Iterator<Item = Node> + '_ {
    std::iter::successors(func_def.nodes[block].parent, |&node| func_def.nodes[node].parent)
        .filter(|&node| matches!(func_def.nodes[node].kind, NodeKind::Loop { .. }))
}

struct Allocation {
    /// Phi web root -> base temporary register.
    bases: FxHashMap<u32, u32>,
    temps_used: u32,
}

fn build_webs(func_def: &FuncDef) -> PhiWebs {
    let mut webs = PhiWebs::new(func_def.counters.ssa);
    for (_, inst_def) in func_def.insts.iter() {
        let Some(dst) = inst_def.dsts.first().and_then(|dst| dst.ssa_idx()) else {
            continue;
        };
        for phi_src in inst_def.phi_srcs() {
            if let Some(src) = phi_src.value.ssa_idx() {
                webs.union(dst, src);
            }
        }
    }
    webs
}

fn live_intervals(func_def: &FuncDef, layout: &Layout, webs: &mut PhiWebs) -> FxIndexMap<u32, Interval> {
    let mut intervals = FxIndexMap::<u32, Interval>::default();
    let mut define = |web: u32, pos: Pos, r: Ref| {
        let size = u32::from(r.lanes());
        let interval = intervals.entry(web).or_insert(Interval { start: pos, end: pos, size });
        interval.start = interval.start.min(pos);
        interval.end = interval.end.max(pos);
        interval.size = interval.size.max(size);
    };

    for param in &func_def.params {
        if let Some(idx) = param.value.ssa_idx() {
            define(webs.find(idx), Pos(0), param.value);
        }
    }
    let mut uses = vec![];
    for &(block, inst, pos) in &layout.insts {
        let inst_def = &func_def.insts[inst];
        for &dst in &inst_def.dsts {
            if let Some(idx) = dst.ssa_idx() {
                define(webs.find(idx), pos, dst);
            }
        }
        for &src in &inst_def.srcs {
            uses.extend(src.ssa_idx().map(|idx| (idx, pos, block)));
        }
        for phi_src in inst_def.phi_srcs() {
            // Phi sources are read at the very end of their incoming block.
            let end = layout.block_end.get(&phi_src.block).copied().unwrap_or(pos);
            uses.extend(phi_src.value.ssa_idx().map(|idx| (idx, end, phi_src.block)));
        }
    }

    // Definitions first, as whether a use is loop-carried depends on the
    // start of the interval.
    for (idx, pos, block) in uses {
        let Some(interval) = intervals.get_mut(&webs.find(idx)) else {
            continue;
        };
        interval.end = interval.end.max(pos);
        for loop_node in enclosing_loops(func_def, block) {
            let (loop_start, loop_end) = layout.loops[&loop_node];
            if interval.start < loop_start {
                interval.end = interval.end.max(loop_end);
            }
        }
    }
    intervals
}

fn linear_scan(
    func_def: &FuncDef,
    intervals: &FxIndexMap<u32, Interval>,
    num_temps: u32,
    log: bool,
) -> Allocation {
    let mut free = vec![true; num_temps as usize];
    let mut active: Vec<(Interval, u32)> = vec![];
    let mut allocation = Allocation { bases: FxHashMap::default(), temps_used: 0 };

    let sorted = intervals.iter().sorted_by_key(|&(&web, interval)| (interval.start, web));
    for (&web, &interval) in sorted {
        active.retain(|&(other, base)| {
            let expired = other.end < interval.start;
            if expired {
                free[base as usize..][..other.size as usize].fill(true);
            }
            !expired
        });

        let size = interval.size as usize;
        let base = (0..free.len())
            .find(|&base| free.get(base..base + size).is_some_and(|regs| regs.iter().all(|&f| f)))
            .unwrap_or_else(|| {
                panic!(
                    "regalloc: out of temporary registers in function #{} \
                     ({} needed for %{web}, {num_temps} available, no spilling)",
                    func_def.index, size
                )
            });
        free[base..][..size].fill(false);
        active.push((interval, base as u32));

        let base = base as u32;
        allocation.bases.insert(web, base);
        allocation.temps_used = allocation.temps_used.max(base + interval.size);
        if log {
            tracing::info!(
                target: "tilir::regalloc",
                func = func_def.index,
                ssa = web,
                temp = base,
                size = interval.size,
                start = u32::from(interval.start),
                end = u32::from(interval.end),
                "assigned"
            );
        }
    }
    allocation
}

pub fn allocate_func(func_def: &mut FuncDef, num_temps: u32, log: bool) -> bool {
    let layout = Layout::compute(func_def);
    let mut webs = build_webs(func_def);
    let intervals = live_intervals(func_def, &layout, &mut webs);
    let allocation = linear_scan(func_def, &intervals, num_temps, log);

    let mut changed = rewrite_refs(func_def, IrForm::Scalar, |r, _: RefRole| {
        let base = *allocation.bases.get(&webs.find(r.ssa_idx()?))?;
        Some(r.with_base_of(Ref::temp(base + u32::from(r.elem()))).with_elem(0))
    });

    let phis = func_def.collect_insts().into_iter().filter(|&inst| func_def.insts[inst].op == Op::Phi).collect_vec();
    changed |= !phis.is_empty();
    for phi in phis {
        func_def.delete_inst(phi);
    }

    // Vectors are now just consecutive registers.
    func_def.vec_info.clear();
    func_def.temps_used = allocation.temps_used;

    tracing::debug!(func = func_def.index, temps = func_def.temps_used, "allocated registers");
    changed
}

pub fn regalloc(shader: &mut Shader, options: &CompilationOptions) -> bool {
    let log = options.dumps(DebugFlags::REGALLOC, shader);
    let num_temps = shader.cx_ref().device.num_temps;

    let mut changed = false;
    let mut temps = 0;
    for (_, func_def) in shader.funcs.iter_mut() {
        changed |= allocate_func(func_def, num_temps, log);
        temps = temps.max(func_def.temps_used);
    }
    shader.info.temps = shader.info.temps.max(temps);
    changed
}
