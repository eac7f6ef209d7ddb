//! Opcodes, execution phases and opcode-specific modifiers.

use std::fmt;

/// Execution phase of an instruction group, i.e. which hardware unit (or
/// pipeline stage of the main ALU) an instruction occupies.
///
/// Within a group, instructions are encoded from the highest phase down.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Phase {
    /// Main ALU, first stage (arithmetic).
    P0 = 0,
    /// Main ALU, second stage (pack/convert).
    P1,
    /// Main ALU, third stage (test/select).
    P2,
    /// Backend (memory, sampling, varying iteration).
    Backend,
    Ctrl,
    Bitwise,
}

impl Phase {
    pub const COUNT: usize = 6;
    pub const ALL: [Phase; Self::COUNT] =
        [Phase::P0, Phase::P1, Phase::P2, Phase::Backend, Phase::Ctrl, Phase::Bitwise];

    pub fn alu_type(self) -> AluType {
        match self {
            Phase::P0 | Phase::P1 | Phase::P2 | Phase::Backend => AluType::Main,
            Phase::Bitwise => AluType::Bitwise,
            Phase::Ctrl => AluType::Control,
        }
    }

    /// Whether this phase's instructions write their result to an internal
    /// `Ft*` result, which then has to be routed to a destination slot.
    pub fn is_main_arith(self) -> bool {
        matches!(self, Phase::P0 | Phase::P1 | Phase::P2)
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::P0 => "p0",
            Phase::P1 => "p1",
            Phase::P2 => "p2",
            Phase::Backend => "backend",
            Phase::Ctrl => "ctrl",
            Phase::Bitwise => "bitwise",
        }
    }
}

/// ALU category of an instruction group, determined by its phases.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AluType {
    Main = 0,
    Bitwise,
    Control,
}

/// Static properties of an [`Op`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpInfo {
    /// `None` only for pseudo-ops, which must be gone before bundling.
    pub phase: Option<Phase>,
    pub num_dsts: u8,
    pub num_srcs: u8,
    pub side_effects: bool,

    /// Whether the first source is a dependency counter (see [`Ref::drc`](crate::Ref::drc)).
    pub uses_drc: bool,
}

macro_rules! ops {
    ($($name:ident = $opcode:literal : $phase:expr, $dsts:literal -> $srcs:literal $(, $flag:ident)*;)+) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum Op {
            $($name),+
        }

        impl Op {
            pub const ALL: &[Op] = &[$(Op::$name),+];

            /// Opcode number, as encoded in the per-phase instruction bytes.
            pub fn opcode(self) -> u8 {
                match self {
                    $(Op::$name => $opcode),+
                }
            }

            pub fn info(self) -> OpInfo {
                match self {
                    $(Op::$name => {
                        #[allow(unused_mut)]
                        let mut info = OpInfo {
                            phase: $phase,
                            num_dsts: $dsts,
                            num_srcs: $srcs,
                            side_effects: false,
                            uses_drc: false,
                        };
                        $(ops!(@flag info $flag);)*
                        info
                    })+
                }
            }
        }
    };
    (@flag $info:ident side_effects) => { $info.side_effects = true };
    (@flag $info:ident drc) => { $info.uses_drc = true };
}

ops! {
    Fadd = 0x01: Some(Phase::P0), 1 -> 2;
    Fmul = 0x02: Some(Phase::P0), 1 -> 2;
    Fmad = 0x03: Some(Phase::P0), 1 -> 3;
    Fmin = 0x04: Some(Phase::P0), 1 -> 2;
    Fmax = 0x05: Some(Phase::P0), 1 -> 2;
    Frcp = 0x06: Some(Phase::P0), 1 -> 1;
    Iadd = 0x07: Some(Phase::P0), 1 -> 2;
    Mov = 0x08: Some(Phase::P0), 1 -> 1;

    Pck = 0x10: Some(Phase::P1), 1 -> 1;

    Tst = 0x18: Some(Phase::P2), 1 -> 2;
    Movc = 0x19: Some(Phase::P2), 1 -> 2;

    Fitr = 0x20: Some(Phase::Backend), 1 -> 2, drc;
    Smp = 0x21: Some(Phase::Backend), 1 -> 4, drc;
    Ld = 0x22: Some(Phase::Backend), 1 -> 2, drc;
    St = 0x23: Some(Phase::Backend), 0 -> 3, drc, side_effects;
    Atomic = 0x24: Some(Phase::Backend), 1 -> 3, drc, side_effects;
    Emitpix = 0x25: Some(Phase::Backend), 0 -> 0, side_effects;
    Uvsw = 0x26: Some(Phase::Backend), 0 -> 1, side_effects;

    And = 0x30: Some(Phase::Bitwise), 1 -> 2;
    Or = 0x31: Some(Phase::Bitwise), 1 -> 2;
    Xor = 0x32: Some(Phase::Bitwise), 1 -> 2;
    Shl = 0x33: Some(Phase::Bitwise), 1 -> 2;
    Shr = 0x34: Some(Phase::Bitwise), 1 -> 2;

    Nop = 0x38: Some(Phase::Ctrl), 0 -> 0, side_effects;
    Wdf = 0x39: Some(Phase::Ctrl), 0 -> 1, side_effects;
    Br = 0x3a: Some(Phase::Ctrl), 0 -> 0, side_effects;
    Barrier = 0x3b: Some(Phase::Ctrl), 0 -> 0, side_effects;

    // Variable number of sources, see `InstCf::Phi`.
    Phi = 0x00: None, 1 -> 0;
}

impl Op {
    pub fn name(self) -> &'static str {
        match self {
            Op::Fadd => "fadd",
            Op::Fmul => "fmul",
            Op::Fmad => "fmad",
            Op::Fmin => "fmin",
            Op::Fmax => "fmax",
            Op::Frcp => "frcp",
            Op::Iadd => "iadd",
            Op::Mov => "mov",
            Op::Pck => "pck",
            Op::Tst => "tst",
            Op::Movc => "movc",
            Op::Fitr => "fitr",
            Op::Smp => "smp",
            Op::Ld => "ld",
            Op::St => "st",
            Op::Atomic => "atomic",
            Op::Emitpix => "emitpix",
            Op::Uvsw => "uvsw",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Shl => "shl",
            Op::Shr => "shr",
            Op::Nop => "nop",
            Op::Wdf => "wdf",
            Op::Br => "br",
            Op::Barrier => "barrier",
            Op::Phi => "phi",
        }
    }

    pub fn phase(self) -> Option<Phase> {
        self.info().phase
    }

    pub fn is_backend_with_result(self) -> bool {
        let info = self.info();
        info.phase == Some(Phase::Backend) && info.num_dsts > 0
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TstCmp {
    Eq = 0,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SmpDim {
    D1 = 0,
    D2,
    D3,
    Cube,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PckFmt {
    U8888 = 0,
    S8888,
    F16F16,
}

/// Opcode-specific modifier, encoded as one extra byte of the instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpMod {
    Tst(TstCmp),
    Dim(SmpDim),
    Pck(PckFmt),
    /// Output slot of a vertex output write.
    Slot(u8),
}

impl OpMod {
    pub fn encode(self) -> u8 {
        match self {
            OpMod::Tst(cmp) => cmp as u8,
            OpMod::Dim(dim) => dim as u8,
            OpMod::Pck(fmt) => fmt as u8,
            OpMod::Slot(slot) => slot,
        }
    }
}

impl fmt::Display for OpMod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpMod::Tst(cmp) => write!(f, "{}", format!("{cmp:?}").to_lowercase()),
            OpMod::Dim(dim) => write!(f, "{}", format!("{dim:?}").to_lowercase()),
            OpMod::Pck(fmt) => write!(f, "{}", format!("{fmt:?}").to_lowercase()),
            OpMod::Slot(slot) => write!(f, "slot{slot}"),
        }
    }
}

/// Hardware constant registers, i.e. values available without an immediate.
///
/// Each entry is `(bit pattern, constant register index)`.
pub const CONST_REGS: &[(u32, u32)] = &[
    (0x0000_0000, 0), // 0 / 0.0
    (0x3f80_0000, 1), // 1.0
    (0x0000_0001, 2), // 1
    (0x3f00_0000, 3), // 0.5
    (0x4000_0000, 4), // 2.0
    (0xffff_ffff, 5), // !0 / -1
    (0x8000_0000, 6), // -0.0
    (0xbf80_0000, 7), // -1.0
];

pub fn const_reg_for(bits: u32) -> Option<u32> {
    CONST_REGS.iter().find(|&&(value, _)| value == bits).map(|&(_, reg)| reg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_are_unique() {
        let mut seen = rustc_hash::FxHashSet::default();
        for &op in Op::ALL {
            assert!(seen.insert(op.opcode()), "duplicate opcode for {op}");
        }
    }

    #[test]
    fn only_pseudo_ops_lack_a_phase() {
        for &op in Op::ALL {
            assert_eq!(op.phase().is_none(), op == Op::Phi, "{op}");
        }
    }

    #[test]
    fn const_table_lookup() {
        assert_eq!(const_reg_for(1.0f32.to_bits()), Some(1));
        assert_eq!(const_reg_for((-1.0f32).to_bits()), Some(7));
        assert_eq!(const_reg_for(3.0f32.to_bits()), None);
    }
}
