//! Registers as seen by compiled code.
use cranelift::codegen::ir;
use dsp56k::Registers;
use dsp56k::regs::Reg;
use util::offset_of;

/// A register that compiled code keeps in a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegId {
    A,
    B,
    X0,
    X1,
    Y0,
    Y1,
    R(u8),
    N(u8),
    M(u8),
    Sr,
    Omr,
    Sp,
    La,
    Lc,
    Vba,
    Sc,
    Sz,
    Ep,
}

impl RegId {
    /// Accumulators are kept as 56 bits in an I64, everything else as 24 bits in an I32.
    pub fn ty(self) -> ir::Type {
        match self {
            Self::A | Self::B => ir::types::I64,
            _ => ir::types::I32,
        }
    }

    /// Offset of this register in [`Registers`].
    pub fn offset(self) -> i32 {
        const WORD: usize = size_of::<dsp56k::U24>();

        let offset = match self {
            Self::A => offset_of!(Registers, a),
            Self::B => offset_of!(Registers, b),
            Self::X0 => offset_of!(Registers, x0),
            Self::X1 => offset_of!(Registers, x1),
            Self::Y0 => offset_of!(Registers, y0),
            Self::Y1 => offset_of!(Registers, y1),
            Self::R(i) => offset_of!(Registers, r) + WORD * (i as usize & 7),
            Self::N(i) => offset_of!(Registers, n) + WORD * (i as usize & 7),
            Self::M(i) => offset_of!(Registers, m) + WORD * (i as usize & 7),
            Self::Sr => offset_of!(Registers, sr),
            Self::Omr => offset_of!(Registers, omr),
            Self::Sp => offset_of!(Registers, sp),
            Self::La => offset_of!(Registers, la),
            Self::Lc => offset_of!(Registers, lc),
            Self::Vba => offset_of!(Registers, vba),
            Self::Sc => offset_of!(Registers, sc),
            Self::Sz => offset_of!(Registers, sz),
            Self::Ep => offset_of!(Registers, ep),
        };

        offset as i32
    }

    /// Position of this register in a [`RegMask`].
    fn index(self) -> u32 {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::X0 => 2,
            Self::X1 => 3,
            Self::Y0 => 4,
            Self::Y1 => 5,
            Self::R(i) => 6 + (i as u32 & 7),
            Self::N(i) => 14 + (i as u32 & 7),
            Self::M(i) => 22 + (i as u32 & 7),
            Self::Sr => 30,
            Self::Omr => 31,
            Self::Sp => 32,
            Self::La => 33,
            Self::Lc => 34,
            Self::Vba => 35,
            Self::Sc => 36,
            Self::Sz => 37,
            Self::Ep => 38,
        }
    }

    /// The register a move register lives in, if compiled code handles it directly.
    ///
    /// Accumulator parts map to their accumulator.
    pub fn of(reg: Reg) -> Option<Self> {
        Some(match reg {
            Reg::X0 => Self::X0,
            Reg::X1 => Self::X1,
            Reg::Y0 => Self::Y0,
            Reg::Y1 => Self::Y1,
            Reg::A | Reg::A0 | Reg::A1 | Reg::A2 => Self::A,
            Reg::B | Reg::B0 | Reg::B1 | Reg::B2 => Self::B,
            Reg::R(i) => Self::R(i & 7),
            Reg::N(i) => Self::N(i & 7),
            _ => return None,
        })
    }
}

/// A set of registers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegMask(u64);

impl RegMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self((1 << 39) - 1);

    #[inline(always)]
    pub fn insert(&mut self, reg: RegId) {
        self.0 |= 1 << reg.index();
    }

    #[inline(always)]
    pub fn contains(self, reg: RegId) -> bool {
        self.0 & (1 << reg.index()) != 0
    }

    #[inline(always)]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline(always)]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for RegMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::ALL {
            return f.write_str("{all}");
        }

        const ORDER: [RegId; 15] = [
            RegId::A,
            RegId::B,
            RegId::X0,
            RegId::X1,
            RegId::Y0,
            RegId::Y1,
            RegId::Sr,
            RegId::Omr,
            RegId::Sp,
            RegId::La,
            RegId::Lc,
            RegId::Vba,
            RegId::Sc,
            RegId::Sz,
            RegId::Ep,
        ];

        let banked = (0..8u8).flat_map(|i| [RegId::R(i), RegId::N(i), RegId::M(i)]);
        f.debug_set()
            .entries(
                ORDER
                    .into_iter()
                    .chain(banked)
                    .filter(|reg| self.contains(*reg)),
            )
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use dsp56k::U24;

    #[test]
    fn offsets_point_at_fields() {
        let mut regs = Registers::default();
        regs.r[5] = U24::new(0x12_3456);
        regs.m[2] = U24::new(0x00_00FF);
        regs.lc = U24::new(0x77);

        let base = (&raw const regs).cast::<u8>();
        let read = |reg: RegId| unsafe { base.add(reg.offset() as usize).cast::<u32>().read() };

        assert_eq!(read(RegId::R(5)), 0x12_3456);
        assert_eq!(read(RegId::M(2)), 0xFF);
        assert_eq!(read(RegId::Lc), 0x77);
    }

    #[test]
    fn move_registers() {
        assert_eq!(RegId::of(Reg::A2), Some(RegId::A));
        assert_eq!(RegId::of(Reg::N(3)), Some(RegId::N(3)));
        assert_eq!(RegId::of(Reg::M(3)), None);
        assert_eq!(RegId::of(Reg::Ssh), None);
    }

    #[test]
    fn masks() {
        let mut mask = RegMask::NONE;
        mask.insert(RegId::N(7));
        mask.insert(RegId::Ep);
        assert!(mask.contains(RegId::N(7)));
        assert!(!mask.contains(RegId::R(7)));
        assert!(RegMask::ALL.contains(RegId::Ep));
        assert_eq!(format!("{mask:?}"), "{Ep, N(7)}");
    }
}
