//! Operand references, packed into a single 64-bit word.
//!
//! A [`Ref`] names anything an instruction can read or write: SSA values,
//! registers (directly or through an index register), immediates, the named
//! I/O slots of an instruction group, predicates, and dependency counters.
//!
//! Bit layout (least significant first):
//!
//! | bits     | field                                   |
//! |----------|-----------------------------------------|
//! | `0..32`  | value                                   |
//! | `32..35` | [`RefKind`]                             |
//! | `35..39` | [`RegClass`] (registers only)           |
//! | `39..41` | [`DataType`]                            |
//! | `41..44` | [`BitWidth`]                            |
//! | `44..54` | lane count minus one                    |
//! | `54..59` | [`RefMods`]                             |
//! | `59..61` | element swizzle                         |
//!
//! Every constructor leaves fields that don't apply to a kind at zero, which
//! makes equality of the packed word the same as logical equality.

use bitflags::bitflags;
use std::fmt;
use std::ops::Range;

const VALUE: Range<u32> = 0..32;
const KIND: Range<u32> = 32..35;
const CLASS: Range<u32> = 35..39;
const DATA_TYPE: Range<u32> = 39..41;
const WIDTH: Range<u32> = 41..44;
const LANES: Range<u32> = 44..54;
const MODS: Range<u32> = 54..59;
const ELEM: Range<u32> = 59..61;

/// Maximum number of lanes a single reference can span.
pub const MAX_LANES: u16 = 1 << (LANES.end - LANES.start);

/// Maximum element index selectable by a component reference.
pub const MAX_ELEM: u8 = (1 << (ELEM.end - ELEM.start)) - 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RefKind {
    None = 0,
    Ssa,
    Reg,
    RegIndexed,
    Imm,
    Io,
    Pred,
    Drc,
}

impl RefKind {
    const ALL: [Self; 8] = [
        Self::None,
        Self::Ssa,
        Self::Reg,
        Self::RegIndexed,
        Self::Imm,
        Self::Io,
        Self::Pred,
        Self::Drc,
    ];
}

/// Hardware register file a register reference points into.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RegClass {
    Temp = 0,
    Internal,
    Const,
    Special,
    Coeff,
    Shared,
    PixOut,
    VtxIn,
    VtxOut,
}

impl RegClass {
    pub const ALL: [Self; 9] = [
        Self::Temp,
        Self::Internal,
        Self::Const,
        Self::Special,
        Self::Coeff,
        Self::Shared,
        Self::PixOut,
        Self::VtxIn,
        Self::VtxOut,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Temp => "r",
            Self::Internal => "i",
            Self::Const => "c",
            Self::Special => "sr",
            Self::Coeff => "cf",
            Self::Shared => "sh",
            Self::PixOut => "o",
            Self::VtxIn => "vi",
            Self::VtxOut => "vo",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(u8)]
pub enum DataType {
    Untyped = 0,
    Float,
    Signed,
    Unsigned,
}

impl DataType {
    const ALL: [Self; 4] = [Self::Untyped, Self::Float, Self::Signed, Self::Unsigned];
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[repr(u8)]
pub enum BitWidth {
    B1 = 0,
    B8,
    B16,
    B32,
    B64,
}

impl BitWidth {
    const ALL: [Self; 5] = [Self::B1, Self::B8, Self::B16, Self::B32, Self::B64];

    pub fn bits(self) -> u32 {
        match self {
            Self::B1 => 1,
            Self::B8 => 8,
            Self::B16 => 16,
            Self::B32 => 32,
            Self::B64 => 64,
        }
    }
}

/// Named I/O of an instruction group: source slots (`S*`), destination slots
/// (`W*`), internal source selectors (`Is*`) and internal ALU results (`Ft*`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Io {
    S0 = 0,
    S1,
    S2,
    S3,
    S4,
    S5,
    W0,
    W1,
    Is0,
    Is1,
    Is2,
    Is3,
    Is4,
    Is5,
    Ft0,
    Ft1,
    Ft2,
    Fte,
}

impl Io {
    const ALL: [Self; 18] = [
        Self::S0,
        Self::S1,
        Self::S2,
        Self::S3,
        Self::S4,
        Self::S5,
        Self::W0,
        Self::W1,
        Self::Is0,
        Self::Is1,
        Self::Is2,
        Self::Is3,
        Self::Is4,
        Self::Is5,
        Self::Ft0,
        Self::Ft1,
        Self::Ft2,
        Self::Fte,
    ];

    pub fn name(self) -> &'static str {
        [
            "s0", "s1", "s2", "s3", "s4", "s5", "w0", "w1", "is0", "is1", "is2", "is3", "is4",
            "is5", "ft0", "ft1", "ft2", "fte",
        ][self as usize]
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PredReg {
    P0 = 0,
    /// Predicate-enable, i.e. the per-instance execution mask.
    Pe,
}

bitflags! {
    /// Source/destination modifiers.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RefMods: u8 {
        /// One's complement.
        const NOT = 1 << 0;
        const CLAMP = 1 << 1;
        const FLOOR = 1 << 2;
        const ABS = 1 << 3;
        const NEG = 1 << 4;
    }
}

/// Index register and offset of a [`RefKind::RegIndexed`] reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexedReg {
    pub index_reg: u8,
    pub offset: u16,
}

/// Packed operand reference (see module docs for the layout).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Ref(u64);

impl Default for Ref {
    fn default() -> Self {
        Self::NONE
    }
}

impl Ref {
    pub const NONE: Ref = Ref(0);

    fn field(self, bits: Range<u32>) -> u64 {
        (self.0 >> bits.start) & ((1 << (bits.end - bits.start)) - 1)
    }

    fn with_field(self, bits: Range<u32>, value: u64) -> Self {
        let mask = (1u64 << (bits.end - bits.start)) - 1;
        assert!(value <= mask, "Ref: {value:#x} doesn't fit in bits {bits:?}");
        Ref((self.0 & !(mask << bits.start)) | (value << bits.start))
    }

    fn new(kind: RefKind, value: u32) -> Self {
        Ref::NONE
            .with_field(KIND, kind as u64)
            .with_field(VALUE, value.into())
            .with_field(WIDTH, BitWidth::B32 as u64)
    }

    pub fn ssa(idx: u32) -> Self {
        Self::new(RefKind::Ssa, idx)
    }

    pub fn reg(class: RegClass, idx: u32) -> Self {
        Self::new(RefKind::Reg, idx).with_field(CLASS, class as u64)
    }

    pub fn temp(idx: u32) -> Self {
        Self::reg(RegClass::Temp, idx)
    }

    pub fn reg_indexed(class: RegClass, index_reg: u8, offset: u16) -> Self {
        Self::new(RefKind::RegIndexed, (u32::from(index_reg) << 16) | u32::from(offset))
            .with_field(CLASS, class as u64)
    }

    pub fn imm(bits: u32) -> Self {
        Self::new(RefKind::Imm, bits)
    }

    pub fn imm_f32(value: f32) -> Self {
        Self::imm(value.to_bits()).with_data_type(DataType::Float)
    }

    pub fn io(io: Io) -> Self {
        Self::new(RefKind::Io, io as u32)
    }

    pub fn pred(pred: PredReg) -> Self {
        Self::new(RefKind::Pred, pred as u32).with_width(BitWidth::B1)
    }

    pub fn drc(idx: u8) -> Self {
        Self::new(RefKind::Drc, idx.into())
    }

    pub fn kind(self) -> RefKind {
        RefKind::ALL[self.field(KIND) as usize]
    }

    pub fn is_none(self) -> bool {
        self.kind() == RefKind::None
    }

    pub fn is_ssa(self) -> bool {
        self.kind() == RefKind::Ssa
    }

    /// Whether this reference occupies a source/destination slot of a group
    /// (as opposed to being encoded inline in an instruction).
    pub fn is_reg_like(self) -> bool {
        matches!(self.kind(), RefKind::Reg | RefKind::RegIndexed | RefKind::Imm)
    }

    /// Raw value bits, whose meaning depends on [`Ref::kind`].
    pub fn value(self) -> u32 {
        self.field(VALUE) as u32
    }

    pub fn ssa_idx(self) -> Option<u32> {
        self.is_ssa().then(|| self.value())
    }

    pub fn reg_class(self) -> Option<RegClass> {
        matches!(self.kind(), RefKind::Reg | RefKind::RegIndexed)
            .then(|| RegClass::ALL[self.field(CLASS) as usize])
    }

    pub fn as_reg(self) -> Option<(RegClass, u32)> {
        (self.kind() == RefKind::Reg).then(|| (RegClass::ALL[self.field(CLASS) as usize], self.value()))
    }

    pub fn as_reg_indexed(self) -> Option<(RegClass, IndexedReg)> {
        (self.kind() == RefKind::RegIndexed).then(|| {
            let value = self.value();
            (
                RegClass::ALL[self.field(CLASS) as usize],
                IndexedReg { index_reg: (value >> 16) as u8, offset: value as u16 },
            )
        })
    }

    pub fn as_imm(self) -> Option<u32> {
        (self.kind() == RefKind::Imm).then(|| self.value())
    }

    pub fn as_io(self) -> Option<Io> {
        (self.kind() == RefKind::Io).then(|| Io::ALL[self.value() as usize])
    }

    pub fn as_pred(self) -> Option<PredReg> {
        (self.kind() == RefKind::Pred).then(|| if self.value() == 0 { PredReg::P0 } else { PredReg::Pe })
    }

    pub fn as_drc(self) -> Option<u8> {
        (self.kind() == RefKind::Drc).then(|| self.value() as u8)
    }

    pub fn data_type(self) -> DataType {
        DataType::ALL[self.field(DATA_TYPE) as usize]
    }

    pub fn width(self) -> BitWidth {
        BitWidth::ALL[self.field(WIDTH) as usize]
    }

    pub fn lanes(self) -> u16 {
        self.field(LANES) as u16 + 1
    }

    pub fn mods(self) -> RefMods {
        RefMods::from_bits_retain(self.field(MODS) as u8)
    }

    pub fn elem(self) -> u8 {
        self.field(ELEM) as u8
    }

    #[must_use]
    pub fn with_value(self, value: u32) -> Self {
        assert!(!self.is_none(), "Ref::with_value: `None` has no value");
        self.with_field(VALUE, value.into())
    }

    #[must_use]
    pub fn with_data_type(self, data_type: DataType) -> Self {
        self.with_field(DATA_TYPE, data_type as u64)
    }

    #[must_use]
    pub fn with_width(self, width: BitWidth) -> Self {
        self.with_field(WIDTH, width as u64)
    }

    #[must_use]
    pub fn with_lanes(self, lanes: u16) -> Self {
        assert!((1..=MAX_LANES).contains(&lanes), "Ref: invalid lane count {lanes}");
        self.with_field(LANES, u64::from(lanes - 1))
    }

    #[must_use]
    pub fn with_mods(self, mods: RefMods) -> Self {
        self.with_field(MODS, mods.bits().into())
    }

    #[must_use]
    pub fn with_elem(self, elem: u8) -> Self {
        self.with_field(ELEM, elem.into())
    }

    #[must_use]
    pub fn neg(self) -> Self {
        self.with_mods(self.mods() ^ RefMods::NEG)
    }

    #[must_use]
    pub fn abs(self) -> Self {
        self.with_mods(self.mods() | RefMods::ABS)
    }

    #[must_use]
    pub fn floor(self) -> Self {
        self.with_mods(self.mods() | RefMods::FLOOR)
    }

    #[must_use]
    pub fn clamp(self) -> Self {
        self.with_mods(self.mods() | RefMods::CLAMP)
    }

    #[must_use]
    pub fn not(self) -> Self {
        self.with_mods(self.mods() ^ RefMods::NOT)
    }

    /// Strip modifiers and the element swizzle, keeping only what is being
    /// referred to (and its shape).
    #[must_use]
    pub fn base(self) -> Self {
        self.with_field(MODS, 0).with_field(ELEM, 0)
    }

    /// Point this reference at whatever `base` refers to (kind, value, class),
    /// keeping this reference's modifiers, element and type metadata.
    #[must_use]
    pub fn with_base_of(self, base: Ref) -> Self {
        let mut r = self;
        for bits in [VALUE, KIND, CLASS] {
            r = r.with_field(bits.clone(), base.field(bits));
        }
        r
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({self})")
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mods = self.mods();
        if mods.contains(RefMods::NEG) {
            f.write_str("-")?;
        }
        if mods.contains(RefMods::NOT) {
            f.write_str("~")?;
        }
        if mods.contains(RefMods::FLOOR) {
            f.write_str("flr(")?;
        }
        if mods.contains(RefMods::ABS) {
            f.write_str("|")?;
        }

        match self.kind() {
            RefKind::None => f.write_str("_")?,
            RefKind::Ssa => write!(f, "%{}", self.value())?,
            RefKind::Reg => {
                let (class, idx) = self.as_reg().unwrap();
                write!(f, "{}{idx}", class.prefix())?;
            }
            RefKind::RegIndexed => {
                let (class, IndexedReg { index_reg, offset }) = self.as_reg_indexed().unwrap();
                write!(f, "idx{index_reg}[{}+{offset}]", class.prefix())?;
            }
            RefKind::Imm => write!(f, "{:#x}", self.value())?,
            RefKind::Io => f.write_str(self.as_io().unwrap().name())?,
            RefKind::Pred => match self.as_pred().unwrap() {
                PredReg::P0 => f.write_str("p0")?,
                PredReg::Pe => f.write_str("pe")?,
            },
            RefKind::Drc => write!(f, "drc{}", self.value())?,
        }

        if mods.contains(RefMods::ABS) {
            f.write_str("|")?;
        }
        if mods.contains(RefMods::FLOOR) {
            f.write_str(")")?;
        }
        if self.lanes() > 1 {
            write!(f, "[{}]", self.lanes())?;
        }
        if self.elem() != 0 {
            write!(f, ".e{}", self.elem())?;
        }
        if mods.contains(RefMods::CLAMP) {
            f.write_str(".sat")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_independent() {
        let r = Ref::temp(17)
            .with_lanes(4)
            .with_data_type(DataType::Float)
            .with_width(BitWidth::B16)
            .neg()
            .abs()
            .with_elem(2);
        assert_eq!(r.kind(), RefKind::Reg);
        assert_eq!(r.as_reg(), Some((RegClass::Temp, 17)));
        assert_eq!(r.lanes(), 4);
        assert_eq!(r.data_type(), DataType::Float);
        assert_eq!(r.width(), BitWidth::B16);
        assert_eq!(r.mods(), RefMods::NEG | RefMods::ABS);
        assert_eq!(r.elem(), 2);
        assert_eq!(r.base(), Ref::temp(17).with_lanes(4).with_data_type(DataType::Float).with_width(BitWidth::B16));
    }

    #[test]
    fn equality_is_structural() {
        let a = Ref::reg(RegClass::Shared, 3).floor();
        let b = Ref::reg(RegClass::Shared, 3).floor();
        assert_eq!(a, b);
        assert_eq!(b, a);

        // Changing any single field breaks equality.
        let variants = [
            a.with_value(4),
            Ref::reg(RegClass::Coeff, 3).floor(),
            a.clamp(),
            a.with_lanes(2),
            a.with_data_type(DataType::Signed),
            a.with_width(BitWidth::B64),
            a.with_elem(1),
            Ref::ssa(3).floor(),
        ];
        for v in variants {
            assert_ne!(a, v, "{a} vs {v}");
            assert_ne!(v, a, "{v} vs {a}");
        }
    }

    #[test]
    fn non_register_kinds_have_no_class() {
        assert_eq!(Ref::ssa(5).reg_class(), None);
        assert_eq!(Ref::imm(5), Ref::imm(5));
        assert_ne!(Ref::imm(5), Ref::ssa(5));
        assert_eq!(Ref::reg(RegClass::Temp, 5).reg_class(), Some(RegClass::Temp));
    }

    #[test]
    fn indexed_and_inline_kinds() {
        let r = Ref::reg_indexed(RegClass::Shared, 1, 300);
        assert_eq!(
            r.as_reg_indexed(),
            Some((RegClass::Shared, IndexedReg { index_reg: 1, offset: 300 }))
        );
        assert_eq!(Ref::io(Io::Ft2).as_io(), Some(Io::Ft2));
        assert_eq!(Ref::pred(PredReg::Pe).as_pred(), Some(PredReg::Pe));
        assert_eq!(Ref::pred(PredReg::P0).width(), BitWidth::B1);
        assert_eq!(Ref::drc(1).as_drc(), Some(1));
        assert_eq!(Ref::imm_f32(1.0).as_imm(), Some(0x3f80_0000));
    }

    #[test]
    fn with_base_of_keeps_decorations() {
        let use_ = Ref::ssa(9).neg().with_data_type(DataType::Float);
        let rewritten = use_.with_base_of(Ref::reg(RegClass::Const, 1));
        assert_eq!(rewritten.as_reg(), Some((RegClass::Const, 1)));
        assert_eq!(rewritten.mods(), RefMods::NEG);
        assert_eq!(rewritten.data_type(), DataType::Float);
    }

    #[test]
    fn display() {
        assert_eq!(Ref::ssa(3).to_string(), "%3");
        assert_eq!(Ref::temp(4).neg().abs().to_string(), "-|r4|");
        assert_eq!(Ref::ssa(2).with_lanes(4).with_elem(1).to_string(), "%2[4].e1");
        assert_eq!(Ref::reg_indexed(RegClass::Shared, 0, 8).to_string(), "idx0[sh+8]");
        assert_eq!(Ref::pred(PredReg::P0).not().to_string(), "~p0");
        assert_eq!(Ref::temp(0).clamp().to_string(), "r0.sat");
    }
}
