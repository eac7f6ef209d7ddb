//! Instruction groups: the unit of issue (and encoding) in bundled form.
//!
//! A group co-issues up to one instruction per [`Phase`], sharing a single
//! header, two banks of source slots (lower `S0..S2`, upper `S3..S5`), the
//! internal source selectors, and two destination slots (`W0`, `W1`).

use crate::op::{AluType, Phase};
use crate::{Inst, Io, Node, Ref};

/// Definition for an [`InstGroup`](crate::InstGroup).
#[derive(Clone, Debug)]
pub struct InstGroupDef {
    /// Monotonically assigned per function, only used for dumps/diagnostics.
    pub index: u32,

    /// Instruction occupying each phase, indexed by `Phase as usize`.
    pub insts: [Option<Inst>; Phase::COUNT],

    pub header: GroupHeader,
    pub io: GroupIo,
    pub variant: [PhaseVariant; Phase::COUNT],
    pub size: GroupSize,

    /// Byte offset of this group in the shader binary.
    pub offset: usize,

    /// The `Block` this group is in.
    pub block: Node,
}

impl InstGroupDef {
    pub fn new(index: u32, block: Node, alu_type: AluType) -> Self {
        Self {
            index,
            insts: [None; Phase::COUNT],
            header: GroupHeader::new(alu_type),
            io: GroupIo::default(),
            variant: [PhaseVariant::Short; Phase::COUNT],
            size: GroupSize::default(),
            offset: 0,
            block,
        }
    }

    /// Occupied phases and their instructions, in encoding order (highest
    /// phase first).
    pub fn insts_encoding_order(&self) -> impl Iterator<Item = (Phase, Inst)> + '_ {
        Phase::ALL.iter().rev().filter_map(|&phase| Some((phase, self.insts[phase as usize]?)))
    }

    pub fn lower_srcs(&self) -> &[Ref] {
        &self.io.srcs[..3]
    }

    pub fn upper_srcs(&self) -> &[Ref] {
        &self.io.srcs[3..]
    }
}

/// ALU-category dependent header sub-field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeaderAlu {
    /// Which of the main ALU phases (and backend) are occupied, as an
    /// operation-organization code (see [`oporg_for`]).
    Main { oporg: u8 },
    Bitwise { opcnt: u8 },
    Control { ctrlop: u8 },
}

impl HeaderAlu {
    pub fn alu_type(self) -> AluType {
        match self {
            HeaderAlu::Main { .. } => AluType::Main,
            HeaderAlu::Bitwise { .. } => AluType::Bitwise,
            HeaderAlu::Control { .. } => AluType::Control,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            HeaderAlu::Main { oporg } => oporg,
            HeaderAlu::Bitwise { opcnt } => opcnt,
            HeaderAlu::Control { ctrlop } => ctrlop,
        }
    }
}

/// Second ALU-category dependent header sub-field (extension byte only).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeaderMisc {
    /// Repeat count minus one (main and bitwise groups).
    Rpt(u8),
    MiscCtl(u8),
}

impl HeaderMisc {
    pub fn bits(self) -> u8 {
        match self {
            HeaderMisc::Rpt(bits) | HeaderMisc::MiscCtl(bits) => bits,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GroupHeader {
    pub alu: HeaderAlu,
    pub misc: HeaderMisc,

    /// Condition code, i.e. [`ExecCond::encode`](crate::ExecCond::encode).
    pub cc: u8,

    pub end: bool,
    pub atom: bool,
}

impl GroupHeader {
    pub fn new(alu_type: AluType) -> Self {
        let (alu, misc) = match alu_type {
            AluType::Main => (HeaderAlu::Main { oporg: 0 }, HeaderMisc::Rpt(0)),
            AluType::Bitwise => (HeaderAlu::Bitwise { opcnt: 0 }, HeaderMisc::Rpt(0)),
            AluType::Control => (HeaderAlu::Control { ctrlop: 0 }, HeaderMisc::MiscCtl(0)),
        };
        Self { alu, misc, cc: 0, end: false, atom: false }
    }

    /// Whether the optional third header byte has to be present.
    pub fn needs_ext(&self) -> bool {
        self.end || self.atom || self.misc.bits() != 0
    }
}

/// Operation-organization code for a set of occupied main ALU phases.
pub fn oporg_for(p0: bool, p1: bool, p2: bool, backend: bool) -> Option<u8> {
    Some(match (p0, p1, p2, backend) {
        (true, false, false, false) => 0,
        (false, true, false, false) => 1,
        (false, false, true, false) => 2,
        (false, false, false, true) => 3,
        (true, false, true, false) => 4,
        (true, false, false, true) => 5,
        (true, true, true, false) => 6,
        (true, true, true, true) => 7,
        _ => return None,
    })
}

/// Shared operands of a group.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupIo {
    /// Source slots `S0..S5` (`Ref::NONE` when unused).
    pub srcs: [Ref; 6],

    /// Internal source selectors `IS0..IS5`, each routing an internal
    /// result (`Ft*`) or source slot into a unit input / destination.
    pub iss: [Option<Io>; 6],

    /// Destination slots `W0`, `W1` (`Ref::NONE` when unused).
    pub dsts: [Ref; 2],
}

/// Encoding variant of one phase's instruction.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PhaseVariant {
    #[default]
    Short,
    /// Carries per-source modifier bytes.
    Long,
}

/// Encoded length (in bytes) of every part of a group.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupSize {
    pub header: usize,
    pub instrs: [usize; Phase::COUNT],
    pub lower_srcs: usize,
    pub upper_srcs: usize,
    pub iss: usize,
    pub dsts: usize,
    pub word_padding: usize,
    pub align_padding: usize,
    pub total: usize,
}

impl GroupSize {
    /// Sum of all the parts, without any padding.
    pub fn unpadded(&self) -> usize {
        self.header
            + self.instrs.iter().sum::<usize>()
            + self.lower_srcs
            + self.upper_srcs
            + self.iss
            + self.dsts
    }

    pub fn recompute_total(&mut self) {
        self.total = self.unpadded() + self.word_padding + self.align_padding;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oporg_codes() {
        assert_eq!(oporg_for(true, false, false, false), Some(0));
        assert_eq!(oporg_for(false, false, false, true), Some(3));
        assert_eq!(oporg_for(true, true, true, true), Some(7));
        assert_eq!(oporg_for(false, true, false, true), None);
    }

    #[test]
    fn header_ext_only_when_needed() {
        let mut header = GroupHeader::new(AluType::Main);
        assert!(!header.needs_ext());
        header.end = true;
        assert!(header.needs_ext());

        let mut header = GroupHeader::new(AluType::Control);
        header.misc = HeaderMisc::MiscCtl(1);
        assert!(header.needs_ext());
    }

    #[test]
    fn size_total_is_sum_of_parts() {
        let mut size = GroupSize { header: 3, lower_srcs: 5, dsts: 3, word_padding: 1, ..Default::default() };
        size.instrs[Phase::P0 as usize] = 2;
        size.align_padding = 2;
        size.recompute_total();
        assert_eq!(size.unpadded(), 13);
        assert_eq!(size.total, 16);
    }
}
