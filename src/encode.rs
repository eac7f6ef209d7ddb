//! Binary encoding of bundled shaders.
//!
//! Every group is encoded as (each part only if its length is non-zero):
//! 1. header (2 bytes, plus an extension byte if needed)
//! 2. one instruction per occupied phase, from the highest phase down
//! 3. lower source bank (`S0..S2`), then upper source bank (`S3..S5`)
//! 4. internal source selectors
//! 5. destination slots
//! 6. word padding, then alignment padding (last group of a function only)
//!
//! The lengths of all of these were already decided by the `group` pass (see
//! [`GroupSize`](crate::group::GroupSize)), and the encoder only checks that it
//! agrees with them. Multi-byte fields are little-endian.

use crate::group::PhaseVariant;
use crate::passes::CompileError;
use crate::{
    FuncDef, FuncRole, IndexedReg, InstDef, InstGroupDef, Io, IrForm, Node, Op, Phase, Ref,
    RefKind, RefMods, Shader, cf,
};
use rustc_hash::FxHashMap;

/// Byte used for word padding, and to fill alignment padding.
pub const PADDING_BYTE: u8 = 0xff;

/// First byte of alignment padding, whose low bits hold its length in words.
pub const ALIGN_PADDING_MARKER: u8 = 0xf0;

fn push_le<T: bytemuck::Pod>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(bytemuck::bytes_of(&value));
}

/// Encode `shader` (which must be in bundled form), storing the resulting
/// binary in it, along with every function's offset.
pub fn encode_shader(shader: &mut Shader) -> Result<(), CompileError> {
    if shader.form() != IrForm::Bundled {
        return Err(CompileError::NotBundled);
    }

    let mut out = vec![];
    let mut entry_offset = None;
    for (_, func_def) in shader.funcs.iter_mut() {
        let offset = out.len();
        encode_func(func_def, &mut out);
        func_def.binary_offset = Some(offset);
        if func_def.role == FuncRole::Entrypoint {
            entry_offset = Some(offset);
        }
        tracing::debug!(func = func_def.index, offset, bytes = out.len() - offset, "encoded function");
    }

    shader.info.entry_offset = entry_offset;
    shader.set_binary(out);
    Ok(())
}

fn encode_func(func_def: &FuncDef, out: &mut Vec<u8>) {
    let func_at = func_def.at(IrForm::Bundled, func_def.root);
    let blocks: Vec<Node> = func_at.blocks().map(|block| block.position).collect();

    // Branches target blocks, so every block needs an offset, with empty ones
    // starting wherever the next non-empty one does.
    let mut block_offsets = FxHashMap::default();
    let mut next_offset = out.len()
        + func_at.blocks().flat_map(|block| block.at_groups()).map(|group| group.def().size.total).sum::<usize>();
    for &block in blocks.iter().rev() {
        if let Some(first) = func_at.at(block).at_groups().into_iter().next() {
            next_offset = first.def().offset;
        }
        block_offsets.insert(block, next_offset);
    }

    let encoder = GroupEncoder { func_def, block_offsets };
    for &block in &blocks {
        for group in func_at.at(block).at_groups() {
            encoder.encode_group(group.def(), out);
        }
    }
}

struct GroupEncoder<'a> {
    func_def: &'a FuncDef,
    block_offsets: FxHashMap<Node, usize>,
}

impl GroupEncoder<'_> {
    fn encode_group(&self, group_def: &InstGroupDef, out: &mut Vec<u8>) {
        let start = out.len();
        assert_eq!(
            group_def.offset, start,
            "encode: group #{} laid out at {:#x}, but encoded at {start:#x}",
            group_def.index, group_def.offset
        );
        let size = &group_def.size;

        let header = &group_def.header;
        let ext = header.needs_ext();
        out.push(
            header.alu.alu_type() as u8
                | (header.cc << 2)
                | (u8::from(ext) << 4)
                | (header.alu.bits() << 5),
        );
        let words = u8::try_from(size.total / 2)
            .unwrap_or_else(|_| panic!("encode: group #{} is too long ({} bytes)", group_def.index, size.total));
        out.push(words);
        if ext {
            out.push(u8::from(header.end) | (u8::from(header.atom) << 1) | (header.misc.bits() << 2));
        }

        for (phase, inst) in group_def.insts_encoding_order() {
            let inst_def = &self.func_def.insts[inst];
            let variant = group_def.variant[phase as usize];
            match phase {
                Phase::P0 | Phase::P1 | Phase::P2 | Phase::Bitwise => encode_alu(inst_def, variant, out),
                Phase::Backend => encode_backend(inst_def, out),
                Phase::Ctrl => self.encode_ctrl(inst_def, group_def.offset, out),
            }
        }

        encode_bank(group_def.lower_srcs(), out);
        encode_bank(group_def.upper_srcs(), out);
        if size.iss > 0 {
            encode_iss(&group_def.io.iss, size.iss == 2, out);
        }
        encode_bank(&group_def.io.dsts, out);

        if size.word_padding > 0 {
            out.push(PADDING_BYTE);
        }
        if size.align_padding > 0 {
            let words = u8::try_from(size.align_padding / 2).ok().filter(|&words| words < 0x10);
            let Some(words) = words else {
                panic!("encode: alignment padding of {} bytes can't be encoded", size.align_padding)
            };
            out.push(ALIGN_PADDING_MARKER | words);
            out.extend(std::iter::repeat_n(PADDING_BYTE, size.align_padding - 1));
        }

        assert_eq!(
            out.len() - start,
            size.total,
            "encode: group #{} encoded to a different length than computed",
            group_def.index
        );
    }

    fn encode_ctrl(&self, inst_def: &InstDef, group_offset: usize, out: &mut Vec<u8>) {
        out.push(inst_def.op.opcode());
        match inst_def.op {
            Op::Wdf => {
                let drc = inst_def.srcs.first().and_then(|src| src.as_drc());
                let Some(drc) = drc else {
                    unreachable!("encode: `wdf` (instruction #{}) without a counter", inst_def.index)
                };
                out.push(drc);
            }
            Op::Br => {
                let Some(target) = inst_def.target() else {
                    unreachable!("encode: `br` (instruction #{}) without a target", inst_def.index)
                };
                let target_offset = cf::first_block_in(&self.func_def.nodes, target)
                    .and_then(|block| self.block_offsets.get(&block))
                    .copied();
                let Some(target_offset) = target_offset else {
                    panic!("encode: `br` target {target:?} contains no block");
                };
                let rel = i32::try_from(target_offset as i64 - group_offset as i64)
                    .unwrap_or_else(|_| panic!("encode: branch too far"));
                let backward = rel <= 0;
                out.push(u8::from(backward));
                push_le(out, rel.to_le());
            }
            _ => {}
        }
    }
}

/// Source slot code of each (of up to three) sources: the index within its
/// bank for slot operands, `3` for anything else (e.g. predicates).
fn slot_codes(srcs: &[Ref]) -> u8 {
    let mut codes = 0;
    let mut next_slot = 0;
    for i in 0..3 {
        let code = match srcs.get(i) {
            Some(src) if src.is_reg_like() => {
                next_slot += 1;
                next_slot - 1
            }
            _ => 3,
        };
        codes |= code << (2 * i);
    }
    codes
}

fn encode_src_mods(src: Ref) -> u8 {
    let mods = src.mods();
    u8::from(mods.contains(RefMods::NEG))
        | (u8::from(mods.contains(RefMods::ABS)) << 1)
        | (u8::from(mods.contains(RefMods::FLOOR)) << 2)
        | (u8::from(mods.contains(RefMods::NOT)) << 3)
        | (u8::from(mods.contains(RefMods::CLAMP)) << 4)
        | (src.elem() << 5)
}

fn encode_alu(inst_def: &InstDef, variant: PhaseVariant, out: &mut Vec<u8>) {
    let sat = inst_def.dsts.iter().any(|dst| dst.mods().contains(RefMods::CLAMP));
    let long = variant == PhaseVariant::Long;
    out.push(inst_def.op.opcode());
    out.push(slot_codes(&inst_def.srcs) | (u8::from(sat) << 6) | (u8::from(long) << 7));
    if long {
        out.extend(inst_def.srcs.iter().map(|&src| encode_src_mods(src)));
    }
    if let Some(op_mod) = inst_def.op_mod() {
        out.push(op_mod.encode());
    }
}

fn encode_backend(inst_def: &InstDef, out: &mut Vec<u8>) {
    let drc = inst_def.srcs.first().and_then(|src| src.as_drc()).unwrap_or(0);
    assert!(drc < 2, "encode: dependency counter {drc} doesn't fit");
    let has_dst = inst_def.dsts.iter().any(|dst| !dst.is_none());
    let num_srcs = inst_def.srcs.iter().filter(|src| src.is_reg_like()).count() as u8;

    out.push(inst_def.op.opcode());
    out.push(drc | (u8::from(has_dst) << 1) | (num_srcs << 2));
    if let Some(op_mod) = inst_def.op_mod() {
        out.push(op_mod.encode());
    }
}

fn encode_operand(r: Ref, out: &mut Vec<u8>) {
    let class = r.reg_class().map_or(0, |class| class as u8) << 2;
    match r.kind() {
        RefKind::Reg => match u8::try_from(r.value()) {
            Ok(idx) => out.extend([class, idx]),
            Err(_) => {
                let Ok(idx) = u16::try_from(r.value()) else {
                    panic!("encode: register {r} out of range");
                };
                out.push(1 | class);
                push_le(out, idx.to_le());
            }
        },
        RefKind::RegIndexed => {
            let Some((_, IndexedReg { index_reg, offset })) = r.as_reg_indexed() else { unreachable!() };
            out.extend([2 | class, index_reg]);
            push_le(out, offset.to_le());
        }
        RefKind::Imm => {
            out.push(3);
            push_le(out, r.value().to_le());
        }
        kind => unreachable!("encode: {kind:?} reference {r} can't be an operand"),
    }
}

fn encode_bank(operands: &[Ref], out: &mut Vec<u8>) {
    let count = operands.iter().filter(|r| !r.is_none()).count();
    if count == 0 {
        return;
    }
    out.push(count as u8);
    for &r in operands.iter().filter(|r| !r.is_none()) {
        encode_operand(r, out);
    }
}

/// 3-bit selector of `IS4`/`IS5`.
fn wide_selector(io: Option<Io>) -> u8 {
    match io {
        None => 0,
        Some(Io::Ft0) => 1,
        Some(Io::Ft1) => 2,
        Some(Io::Ft2) => 3,
        Some(Io::Fte) => 4,
        Some(Io::S0) => 5,
        Some(Io::S1) => 6,
        Some(Io::S2) => 7,
        Some(io) => unreachable!("encode: {} can't be selected by `is4`/`is5`", io.name()),
    }
}

/// 2-bit selector of `IS0..IS3`.
fn narrow_selector(io: Option<Io>) -> u8 {
    match io {
        None => 0,
        Some(Io::S0) => 1,
        Some(Io::S1) => 2,
        Some(Io::S2) => 3,
        Some(io) => unreachable!("encode: {} can't be selected by `is0..is3`", io.name()),
    }
}

fn encode_iss(iss: &[Option<Io>; 6], ext: bool, out: &mut Vec<u8>) {
    out.push(wide_selector(iss[4]) | (wide_selector(iss[5]) << 3) | (u8::from(ext) << 6));
    if ext {
        out.push(iss[..4].iter().enumerate().fold(0, |byte, (i, &io)| byte | (narrow_selector(io) << (2 * i))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::group::group;
    use crate::{Context, ExecCond, RegClass, ShaderStage};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn bundled(build: impl FnOnce(&mut crate::builder::Builder<'_>)) -> Shader {
        let mut shader = Shader::new(Rc::new(Context::default()), ShaderStage::Fragment);
        let func = shader.add_func(FuncRole::Entrypoint);
        build(&mut shader.builder(func));
        group(&mut shader);
        shader
    }

    #[test]
    fn alu_group_bytes() {
        let mut shader = bundled(|b| {
            b.alu2(Op::Fadd, Ref::temp(2), Ref::temp(0), Ref::reg(RegClass::Const, 1));
        });
        encode_shader(&mut shader).unwrap();

        #[rustfmt::skip]
        let expected = [
            0x00, 0x08,             // header: main ALU, P0 only, 8 words
            0x01, 0x34,             // fadd, slots s0/s1/-
            0x02, 0x00, 0x00, 0x08, 0x01, // lower bank: r0, c1
            0x01,                   // is4 = ft0
            0x01, 0x00, 0x02,       // destinations: r2
            0xff,                   // word padding
            0xf1, 0xff,             // alignment padding
        ];
        assert_eq!(shader.binary_data(), expected);
        assert_eq!(shader.info.entry_offset, Some(0));
    }

    #[test]
    fn long_variant_and_alignment_padding() {
        let mut shader = bundled(|b| {
            let inst = b.alu1(Op::Mov, Ref::temp(1).clamp(), Ref::imm(0x1234_5678).neg());
            b.func().insts[inst].end = true;
        });
        encode_shader(&mut shader).unwrap();

        #[rustfmt::skip]
        let expected = [
            0x10, 0x08, 0x01,       // header + ext byte (end)
            0x08, 0xfc, 0x01,       // mov, slots s0/-/-, sat, long, neg
            0x01, 0x03, 0x78, 0x56, 0x34, 0x12, // lower bank: immediate
            0x01,                   // is4 = ft0
            0x01, 0x00, 0x01,       // destinations: r1
        ];
        assert_eq!(shader.binary_data(), expected);
    }

    #[test]
    fn branch_offsets_are_relative_to_the_group() {
        let mut shader = bundled(|b| {
            let loop_node = b.push_loop();
            let header = b.block();
            b.nop();
            b.nop();
            b.br(header, ExecCond::P0True);
            b.exit_loop(loop_node);
            b.nop();
        });
        encode_shader(&mut shader).unwrap();

        let func = shader.entrypoint().unwrap();
        let groups: Vec<_> =
            shader.func_at(func).blocks().flat_map(|block| block.at_groups()).map(|g| g.def().clone()).collect();
        let br = &groups[2];
        assert_eq!(br.header.cc, ExecCond::P0True.encode());

        let binary = shader.binary_data();
        let at = br.offset + 2;
        assert_eq!(binary[at], Op::Br.opcode());
        assert_eq!(binary[at + 1], 1);
        let rel = i32::from_le_bytes(binary[at + 2..at + 6].try_into().unwrap());
        assert_eq!(rel, -(br.offset as i32));
    }

    #[test]
    fn scalar_shaders_cant_be_encoded() {
        let mut shader = Shader::new(Rc::new(Context::default()), ShaderStage::Vertex);
        shader.add_func(FuncRole::Entrypoint);
        assert_eq!(encode_shader(&mut shader), Err(CompileError::NotBundled));
        assert_eq!(shader.binary_size(), 0);
    }
}
