//! Bundling: moving every instruction into an [`InstGroupDef`], and laying
//! out the groups of the whole shader.
//!
//! Every group holds a single instruction (co-issuing several instructions
//! in one group is left to a future scheduler), so this is mostly about
//! operand routing (source banks, internal selectors, destination slots) and
//! computing the length of every encoded field, which decides each group's
//! offset in the binary. Offsets are shader-wide, functions being laid out in
//! order, each ending aligned to the instruction cache line.

use crate::group::{GroupSize, HeaderAlu, PhaseVariant, oporg_for};
use crate::op::AluType;
use crate::{
    EntityList, FuncDef, InstDef, InstGroupDef, InstParent, Io, IrForm, Node, NodeKind, Op, Phase,
    Ref, RefKind, Shader,
};

pub fn group(shader: &mut Shader) -> bool {
    let icache_align = shader.cx_ref().device.icache_align;
    let mut offset = 0;
    for (_, func_def) in shader.funcs.iter_mut() {
        offset = group_func(func_def, offset, icache_align);
    }
    shader.set_form(IrForm::Bundled);
    true
}

/// Group every instruction of `func_def`, starting at byte `offset`, and
/// returning the offset right after the function.
pub fn group_func(func_def: &mut FuncDef, start_offset: usize, icache_align: usize) -> usize {
    let blocks: Vec<Node> =
        func_def.at(IrForm::Scalar, func_def.root).blocks().map(|block| block.position).collect();

    let mut offset = start_offset;
    let mut last_group = None;
    for block in blocks {
        let insts = func_def.block_insts(block).iter().collect_vec(&func_def.insts);
        let mut groups = EntityList::empty();
        for inst in insts {
            let index = func_def.counters.group;
            func_def.counters.group += 1;

            let inst_def = &func_def.insts[inst];
            let phase = phase_of(inst_def);
            let mut group_def = build_group(inst_def, phase, index, block);
            group_def.insts[phase as usize] = Some(inst);
            group_def.offset = offset;
            offset += group_def.size.total;

            let group = func_def.groups.define(group_def);
            groups.insert_last(group, &mut func_def.groups);
            func_def.insts[inst].parent = InstParent::Group { group, phase };
            last_group = Some(group);
        }

        match &mut func_def.nodes[block].kind {
            NodeKind::Block { insts, groups: block_groups } => {
                *insts = EntityList::empty();
                *block_groups = groups;
            }
            _ => unreachable!(),
        }
    }

    if let Some(last) = last_group {
        let size = &mut func_def.groups[last].size;
        size.align_padding = (icache_align - offset % icache_align) % icache_align;
        size.recompute_total();
        offset += size.align_padding;
    }

    tracing::debug!(
        func = func_def.index,
        groups = func_def.counters.group,
        bytes = offset - start_offset,
        "bundled instructions"
    );
    offset
}

fn phase_of(inst_def: &InstDef) -> Phase {
    let Some(phase) = inst_def.op.phase() else {
        unreachable!("group: `{}` (instruction #{}) left over", inst_def.op, inst_def.index)
    };
    for &r in inst_def.dsts.iter().chain(&inst_def.srcs) {
        assert!(
            !r.is_ssa(),
            "group: SSA value {r} left in instruction #{} (was register allocation skipped?)",
            inst_def.index
        );
    }
    phase
}

fn internal_result(phase: Phase) -> Io {
    match phase {
        Phase::P0 => Io::Ft0,
        Phase::P1 => Io::Ft1,
        Phase::P2 => Io::Ft2,
        _ => unreachable!("group: {phase:?} has no internal result"),
    }
}

fn build_group(inst_def: &InstDef, phase: Phase, index: u32, block: Node) -> InstGroupDef {
    let mut group_def = InstGroupDef::new(index, block, phase.alu_type());

    // Backend instructions read the upper source bank, everything else the
    // lower one.
    let bank = if phase == Phase::Backend { 3 } else { 0 };
    for (slot, src) in inst_def.srcs.iter().filter(|src| src.is_reg_like()).enumerate() {
        assert!(slot < 3, "group: instruction #{} has too many register sources", inst_def.index);
        group_def.io.srcs[bank + slot] = *src;
    }
    for (slot, dst) in inst_def.dsts.iter().filter(|dst| dst.is_reg_like()).enumerate() {
        assert!(slot < 2, "group: instruction #{} has too many register destinations", inst_def.index);
        group_def.io.dsts[slot] = *dst;
    }
    if phase.is_main_arith() && !group_def.io.dsts[0].is_none() {
        group_def.io.iss[4] = Some(internal_result(phase));
    }

    let header = &mut group_def.header;
    header.alu = match phase.alu_type() {
        AluType::Main => {
            let Some(oporg) = oporg_for(
                phase == Phase::P0,
                phase == Phase::P1,
                phase == Phase::P2,
                phase == Phase::Backend,
            ) else {
                unreachable!()
            };
            HeaderAlu::Main { oporg }
        }
        AluType::Bitwise => HeaderAlu::Bitwise { opcnt: 1 },
        AluType::Control => HeaderAlu::Control { ctrlop: 0 },
    };
    header.cc = inst_def.exec_cond.encode();
    header.end = inst_def.end;
    header.atom = inst_def.op == Op::Atomic;

    let has_src_mods = inst_def.srcs.iter().any(|src| !src.mods().is_empty() || src.elem() != 0);
    let variant = match phase {
        Phase::P0 | Phase::P1 | Phase::P2 | Phase::Bitwise if has_src_mods => PhaseVariant::Long,
        Phase::Backend | Phase::Ctrl => {
            assert!(
                !has_src_mods,
                "group: {phase:?} instruction #{} can't encode source modifiers",
                inst_def.index
            );
            PhaseVariant::Short
        }
        _ => PhaseVariant::Short,
    };
    group_def.variant[phase as usize] = variant;

    group_def.size = group_size(&group_def, inst_def, phase);
    group_def
}

/// Encoded length of a phase instruction (see `encode`).
pub fn inst_size(inst_def: &InstDef, phase: Phase, variant: PhaseVariant) -> usize {
    let op_mod = usize::from(inst_def.op_mod().is_some());
    match phase {
        Phase::P0 | Phase::P1 | Phase::P2 | Phase::Bitwise => {
            let mod_bytes = match variant {
                PhaseVariant::Short => 0,
                PhaseVariant::Long => inst_def.srcs.len(),
            };
            2 + mod_bytes + op_mod
        }
        Phase::Backend => 2 + op_mod,
        Phase::Ctrl => match inst_def.op {
            Op::Wdf => 2,
            Op::Br => 6,
            _ => 1,
        },
    }
}

/// Encoded length of a source/destination operand (see `encode`).
pub fn operand_size(r: Ref) -> usize {
    match r.kind() {
        RefKind::Reg if r.value() < 256 => 2,
        RefKind::Reg => 3,
        RefKind::RegIndexed => 4,
        RefKind::Imm => 5,
        kind => unreachable!("group: {kind:?} reference {r} can't be an operand"),
    }
}

fn operands_size(operands: &[Ref]) -> usize {
    let size: usize = operands.iter().filter(|r| !r.is_none()).map(|&r| operand_size(r)).sum();
    if size == 0 { 0 } else { 1 + size }
}

fn group_size(group_def: &InstGroupDef, inst_def: &InstDef, phase: Phase) -> GroupSize {
    let iss = &group_def.io.iss;
    let mut size = GroupSize {
        header: if group_def.header.needs_ext() { 3 } else { 2 },
        lower_srcs: operands_size(group_def.lower_srcs()),
        upper_srcs: operands_size(group_def.upper_srcs()),
        iss: if iss[..4].iter().any(Option::is_some) {
            2
        } else if iss[4..].iter().any(Option::is_some) {
            1
        } else {
            0
        },
        dsts: operands_size(&group_def.io.dsts),
        ..GroupSize::default()
    };
    size.instrs[phase as usize] = inst_size(inst_def, phase, group_def.variant[phase as usize]);
    size.word_padding = size.unpadded() % 2;
    size.recompute_total();
    size
}
