use crate::bounded::{U8, U24, U48, U56};
use bitos::{bitos, integer::u2};
use static_assertions::const_assert_eq;
use strum::FromRepr;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Bits of SR that can actually be written.
pub const SR_WRITE_MASK: u32 = 0xFB_EFFF;
/// Value of SR after a hardware reset.
pub const SR_RESET: u32 = 0xC0_0300;

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    #[bits(0)]
    pub carry: bool,
    #[bits(1)]
    pub overflow: bool,
    #[bits(2)]
    pub zero: bool,
    #[bits(3)]
    pub negative: bool,
    #[bits(4)]
    pub unnormalized: bool,
    #[bits(5)]
    pub extension: bool,
    #[bits(6)]
    pub limit: bool,
    #[bits(7)]
    pub scaling_bit: bool,
    #[bits(8..10)]
    pub interrupt_mask: u2,
    #[bits(10..12)]
    pub scaling_mode: u2,
    #[bits(13)]
    pub sixteen_bit_compat: bool,
    #[bits(14)]
    pub double_precision: bool,
    #[bits(15)]
    pub loop_flag: bool,
    #[bits(16)]
    pub forever: bool,
    #[bits(17)]
    pub sixteen_bit_arith: bool,
    #[bits(19)]
    pub cache_enable: bool,
    #[bits(20)]
    pub saturation: bool,
    #[bits(21)]
    pub rounding: bool,
    #[bits(22..24)]
    pub core_priority: u2,
}

impl Status {
    pub fn scaling(self) -> Scaling {
        Scaling::new(self.scaling_mode().value())
    }

    /// The condition code bits (low byte).
    pub fn ccr(self) -> u8 {
        self.to_bits() as u8
    }

    pub fn with_ccr(self, ccr: u8) -> Self {
        Self::from_bits((self.to_bits() & !0xFF) | ccr as u32)
    }
}

/// Data scaling mode, selected by the S1:S0 bits of SR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scaling {
    #[default]
    None,
    Down,
    Up,
}

impl Scaling {
    #[inline(always)]
    pub fn new(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => Self::Down,
            0b10 => Self::Up,
            _ => Self::None,
        }
    }

    /// Index of the bit that rounding adds to, relative to the unscaled accumulator.
    #[inline(always)]
    pub fn round_bit(self) -> u32 {
        match self {
            Self::None => 23,
            Self::Down => 24,
            Self::Up => 22,
        }
    }

    /// Applies the scaling to a sign extended accumulator value.
    #[inline(always)]
    pub fn apply(self, value: i64) -> i64 {
        match self {
            Self::None => value,
            Self::Down => value >> 1,
            Self::Up => value << 1,
        }
    }
}

/// Whether a scaled accumulator value fits in 48 signed bits.
#[inline(always)]
pub fn fits_48(scaled: i64) -> bool {
    (scaled << 16) >> 16 == scaled
}

/// The 24-bit word an accumulator shows on the data bus, limited if it doesn't fit.
///
/// Returns the word and whether limiting happened.
#[inline(always)]
pub fn limit_word(value: U56, scaling: Scaling) -> (U24, bool) {
    let scaled = scaling.apply(value.signed());
    if fits_48(scaled) {
        (U24::new((scaled >> 24) as u32), false)
    } else if scaled < 0 {
        (U24::new(0x80_0000), true)
    } else {
        (U24::new(0x7F_FFFF), true)
    }
}

/// The 48-bit pair an accumulator shows on a long move, limited if it doesn't fit.
#[inline(always)]
pub fn limit_pair(value: U56, scaling: Scaling) -> (U48, bool) {
    let scaled = scaling.apply(value.signed());
    if fits_48(scaled) {
        (U48::from_signed(scaled), false)
    } else if scaled < 0 {
        (U48::new(0x8000_0000_0000), true)
    } else {
        (U48::new(0x7FFF_FFFF_FFFF), true)
    }
}

/// Whether an accumulator move sets the sticky S bit.
#[inline(always)]
pub fn scaling_bit(value: U56, scaling: Scaling) -> bool {
    let scaled = scaling.apply(value.signed());
    ((scaled >> 46) ^ (scaled >> 45)) & 1 != 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u8)]
pub enum Acc {
    A = 0,
    B = 1,
}

impl Acc {
    #[inline(always)]
    pub fn new(index: u32) -> Self {
        if index & 1 == 0 { Self::A } else { Self::B }
    }

    #[inline(always)]
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// A register as addressed by moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    X0,
    X1,
    Y0,
    Y1,
    A0,
    B0,
    A2,
    B2,
    A1,
    B1,
    A,
    B,
    R(u8),
    N(u8),
    M(u8),
    Ep,
    Vba,
    Sc,
    Sz,
    Sr,
    Omr,
    Sp,
    Ssh,
    Ssl,
    La,
    Lc,
}

impl Reg {
    /// The accumulator this register is a part of, if any.
    pub fn acc(self) -> Option<Acc> {
        match self {
            Self::A | Self::A0 | Self::A1 | Self::A2 => Some(Acc::A),
            Self::B | Self::B0 | Self::B1 | Self::B2 => Some(Acc::B),
            _ => None,
        }
    }

    /// Whether writing this register changes how the hardware loop or the AGU behaves.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            Self::M(_) | Self::Sr | Self::Omr | Self::Sp | Self::Ssh | Self::Ssl | Self::La | Self::Lc
        )
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::R(i) => write!(f, "r{i}"),
            Self::N(i) => write!(f, "n{i}"),
            Self::M(i) => write!(f, "m{i}"),
            other => {
                let name = format!("{other:?}");
                f.write_str(&name.to_ascii_lowercase())
            }
        }
    }
}

/// The register file of a DSP instance.
#[derive(Debug, Clone, IntoBytes, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Registers {
    pub a: U56,
    pub b: U56,
    pub x0: U24,
    pub x1: U24,
    pub y0: U24,
    pub y1: U24,
    pub r: [U24; 8],
    pub n: [U24; 8],
    pub m: [U24; 8],
    pub pc: U24,
    pub sr: U24,
    pub omr: U24,
    pub sp: U24,
    pub la: U24,
    pub lc: U24,
    pub vba: U24,
    pub sz: U24,
    pub sc: U24,
    pub ep: U24,
    pub ss_high: [U24; 16],
    pub ss_low: [U24; 16],
    /// LC as it was before the active REP started.
    pub rep_lc: U24,
    /// Non-zero while a REP is repeating its instruction.
    pub rep_active: u32,
}

const_assert_eq!(size_of::<Registers>(), 2 * 8 + 72 * 4);

impl Default for Registers {
    fn default() -> Self {
        Self {
            a: U56::ZERO,
            b: U56::ZERO,
            x0: U24::ZERO,
            x1: U24::ZERO,
            y0: U24::ZERO,
            y1: U24::ZERO,
            r: [U24::ZERO; 8],
            n: [U24::ZERO; 8],
            m: [U24::MAX; 8],
            pc: U24::ZERO,
            sr: U24::new(SR_RESET),
            omr: U24::ZERO,
            sp: U24::ZERO,
            la: U24::ZERO,
            lc: U24::ZERO,
            vba: U24::ZERO,
            sz: U24::ZERO,
            sc: U24::ZERO,
            ep: U24::ZERO,
            ss_high: [U24::ZERO; 16],
            ss_low: [U24::ZERO; 16],
            rep_lc: U24::ZERO,
            rep_active: 0,
        }
    }
}

/// Stack pointer error bits.
const SP_STACK_ERROR: u32 = 1 << 4;
const SP_UNDERFLOW: u32 = 1 << 5;

impl Registers {
    #[inline(always)]
    pub fn status(&self) -> Status {
        Status::from_bits(self.sr.value())
    }

    #[inline(always)]
    pub fn set_status(&mut self, status: Status) {
        self.sr = U24::new(status.to_bits() & SR_WRITE_MASK);
    }

    /// Applies `f` to a copy of the status register and stores it back.
    #[inline(always)]
    pub fn update_status(&mut self, f: impl FnOnce(&mut Status)) {
        let mut status = self.status();
        f(&mut status);
        self.set_status(status);
    }

    #[inline(always)]
    pub fn acc(&self, acc: Acc) -> U56 {
        match acc {
            Acc::A => self.a,
            Acc::B => self.b,
        }
    }

    #[inline(always)]
    pub fn set_acc(&mut self, acc: Acc, value: U56) {
        match acc {
            Acc::A => self.a = value,
            Acc::B => self.b = value,
        }
    }

    #[inline(always)]
    pub fn x(&self) -> U48 {
        U48::from_halves(self.x1, self.x0)
    }

    #[inline(always)]
    pub fn y(&self) -> U48 {
        U48::from_halves(self.y1, self.y0)
    }

    #[inline(always)]
    pub fn set_x(&mut self, value: U48) {
        self.x1 = value.high();
        self.x0 = value.low();
    }

    #[inline(always)]
    pub fn set_y(&mut self, value: U48) {
        self.y1 = value.high();
        self.y0 = value.low();
    }

    /// Current stack pointer index (0 means empty).
    #[inline(always)]
    pub fn stack_index(&self) -> usize {
        (self.sp.value() & 0xF) as usize
    }

    /// Pushes a pair of words into the system stack.
    pub fn push(&mut self, high: U24, low: U24) {
        let index = self.stack_index();
        let mut sp = self.sp.value() & !0xF;
        if index == 15 {
            tracing::warn!("system stack overflow");
            sp |= SP_STACK_ERROR;
        }

        let index = (index + 1) & 0xF;
        self.sp = U24::new(sp | index as u32);
        self.ss_high[index] = high;
        self.ss_low[index] = low;
    }

    /// Pops a pair of words from the system stack.
    pub fn pop(&mut self) -> (U24, U24) {
        let index = self.stack_index();
        let value = (self.ss_high[index], self.ss_low[index]);

        let mut sp = self.sp.value() & !0xF;
        if index == 0 {
            tracing::warn!("system stack underflow");
            sp |= SP_STACK_ERROR | SP_UNDERFLOW;
        }

        self.sp = U24::new(sp | (index.wrapping_sub(1) & 0xF) as u32);
        value
    }

    #[inline(always)]
    pub fn ssh(&self) -> U24 {
        self.ss_high[self.stack_index()]
    }

    #[inline(always)]
    pub fn ssl(&self) -> U24 {
        self.ss_low[self.stack_index()]
    }

    /// Reads a register without any side effects. Accumulators are limited but L is left alone.
    pub fn peek(&self, reg: Reg) -> U24 {
        match reg {
            Reg::X0 => self.x0,
            Reg::X1 => self.x1,
            Reg::Y0 => self.y0,
            Reg::Y1 => self.y1,
            Reg::A0 => self.a.low(),
            Reg::B0 => self.b.low(),
            Reg::A1 => self.a.high(),
            Reg::B1 => self.b.high(),
            Reg::A2 => U24::from_signed(self.a.ext().signed() as i32),
            Reg::B2 => U24::from_signed(self.b.ext().signed() as i32),
            Reg::A => limit_word(self.a, self.status().scaling()).0,
            Reg::B => limit_word(self.b, self.status().scaling()).0,
            Reg::R(i) => self.r[i as usize & 7],
            Reg::N(i) => self.n[i as usize & 7],
            Reg::M(i) => self.m[i as usize & 7],
            Reg::Ep => self.ep,
            Reg::Vba => self.vba,
            Reg::Sc => self.sc,
            Reg::Sz => self.sz,
            Reg::Sr => self.sr,
            Reg::Omr => self.omr,
            Reg::Sp => self.sp,
            Reg::Ssh => self.ssh(),
            Reg::Ssl => self.ssl(),
            Reg::La => self.la,
            Reg::Lc => self.lc,
        }
    }

    /// Reads an accumulator through the data bus: scaled, limited, updating L and S.
    pub fn read_acc(&mut self, acc: Acc) -> U24 {
        let value = self.acc(acc);
        let scaling = self.status().scaling();
        let (word, limited) = limit_word(value, scaling);
        let sticky = scaling_bit(value, scaling);

        self.update_status(|s| {
            s.set_limit(s.limit() || limited);
            s.set_scaling_bit(s.scaling_bit() || sticky);
        });

        word
    }

    /// Reads an accumulator through a long move, updating L and S.
    pub fn read_acc_pair(&mut self, acc: Acc) -> U48 {
        let value = self.acc(acc);
        let scaling = self.status().scaling();
        let (pair, limited) = limit_pair(value, scaling);
        let sticky = scaling_bit(value, scaling);

        self.update_status(|s| {
            s.set_limit(s.limit() || limited);
            s.set_scaling_bit(s.scaling_bit() || sticky);
        });

        pair
    }

    /// Reads a register as a move source would.
    pub fn read(&mut self, reg: Reg) -> U24 {
        match reg {
            Reg::A => self.read_acc(Acc::A),
            Reg::B => self.read_acc(Acc::B),
            Reg::Ssh => self.pop().0,
            _ => self.peek(reg),
        }
    }

    /// Writes a register as a move destination would.
    pub fn write(&mut self, reg: Reg, value: U24) {
        match reg {
            Reg::X0 => self.x0 = value,
            Reg::X1 => self.x1 = value,
            Reg::Y0 => self.y0 = value,
            Reg::Y1 => self.y1 = value,
            Reg::A0 => self.a = self.a.with_low(value),
            Reg::B0 => self.b = self.b.with_low(value),
            Reg::A1 => self.a = self.a.with_high(value),
            Reg::B1 => self.b = self.b.with_high(value),
            Reg::A2 => self.a = self.a.with_ext(U8::new(value.low_byte())),
            Reg::B2 => self.b = self.b.with_ext(U8::new(value.low_byte())),
            Reg::A => self.a = U56::from_word(value),
            Reg::B => self.b = U56::from_word(value),
            Reg::R(i) => self.r[i as usize & 7] = value,
            Reg::N(i) => self.n[i as usize & 7] = value,
            Reg::M(i) => self.m[i as usize & 7] = value,
            Reg::Ep => self.ep = value,
            Reg::Vba => self.vba = value,
            Reg::Sc => self.sc = U24::new(value.value() & 0x1F),
            Reg::Sz => self.sz = value,
            Reg::Sr => self.sr = U24::new(value.value() & SR_WRITE_MASK),
            Reg::Omr => self.omr = value,
            Reg::Sp => self.sp = U24::new(value.value() & 0x3F),
            Reg::Ssh => {
                let low = self.ss_low[(self.stack_index() + 1) & 0xF];
                self.push(value, low);
            }
            Reg::Ssl => {
                let index = self.stack_index();
                self.ss_low[index] = value;
            }
            Reg::La => self.la = value,
            Reg::Lc => self.lc = value,
        }
    }

    /// Masks every field back to its declared width. Used after loading raw bytes.
    pub fn normalize(&mut self) {
        macro_rules! renew {
            ($($field:expr),*) => {
                $($field = U24::new($field.value());)*
            };
        }

        self.a = U56::new(self.a.value());
        self.b = U56::new(self.b.value());
        renew!(
            self.x0, self.x1, self.y0, self.y1, self.pc, self.omr, self.la, self.lc, self.vba,
            self.sz, self.ep, self.rep_lc
        );

        for reg in self
            .r
            .iter_mut()
            .chain(&mut self.n)
            .chain(&mut self.m)
            .chain(&mut self.ss_high)
            .chain(&mut self.ss_low)
        {
            *reg = U24::new(reg.value());
        }

        self.sr = U24::new(self.sr.value() & SR_WRITE_MASK);
        self.sp = U24::new(self.sp.value() & 0x3F);
        self.sc = U24::new(self.sc.value() & 0x1F);
        self.rep_active = u32::from(self.rep_active != 0);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stack_push_pop() {
        let mut regs = Registers::default();
        regs.push(U24::new(0x10), U24::new(0x20));
        regs.push(U24::new(0x30), U24::new(0x40));
        assert_eq!(regs.stack_index(), 2);
        assert_eq!(regs.ssh(), U24::new(0x30));

        assert_eq!(regs.pop(), (U24::new(0x30), U24::new(0x40)));
        assert_eq!(regs.pop(), (U24::new(0x10), U24::new(0x20)));
        assert_eq!(regs.sp.value(), 0);

        regs.pop();
        assert_eq!(regs.sp.value() & 0x30, 0x30);
    }

    #[test]
    fn ssh_reads_pop_and_writes_push() {
        let mut regs = Registers::default();
        regs.write(Reg::Ssh, U24::new(0x123));
        regs.write(Reg::Ssl, U24::new(0x456));
        assert_eq!(regs.stack_index(), 1);
        assert_eq!(regs.read(Reg::Ssl), U24::new(0x456));
        assert_eq!(regs.read(Reg::Ssh), U24::new(0x123));
        assert_eq!(regs.stack_index(), 0);
    }

    #[test]
    fn accumulator_moves_limit() {
        let mut regs = Registers::default();
        regs.a = U56::new(0x01_000000_000000);
        assert_eq!(regs.read(Reg::A), U24::new(0x7F_FFFF));
        assert!(regs.status().limit());

        regs.b = U56::new(0x00_123456_789ABC);
        assert_eq!(regs.read(Reg::B), U24::new(0x12_3456));

        regs.write(Reg::A, U24::new(0x80_0000));
        assert_eq!(regs.a, U56::new(0xFF_800000_000000));
        assert_eq!(regs.peek(Reg::A2), U24::new(0xFF_FFFF));
    }

    #[test]
    fn scaled_reads() {
        let mut regs = Registers::default();
        regs.a = U56::new(0x00_400000_000000);
        regs.update_status(|s| s.set_scaling_mode(u2::new(0b10)));

        // scaling up overflows 48 bits
        assert_eq!(regs.read(Reg::A), U24::new(0x7F_FFFF));

        regs.update_status(|s| s.set_scaling_mode(u2::new(0b01)));
        assert_eq!(regs.read(Reg::A), U24::new(0x20_0000));
    }
}
