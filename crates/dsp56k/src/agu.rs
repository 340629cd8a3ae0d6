//! Address generation unit.
use crate::bounded::U24;
use crate::regs::Registers;

/// Smallest all-ones value greater or equal to `value`.
#[inline(always)]
pub fn fold(mut value: u32) -> u32 {
    value |= value >> 1;
    value |= value >> 2;
    value |= value >> 4;
    value |= value >> 8;
    value |= value >> 16;
    value
}

/// How an address register is updated, as selected by its modifier register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AddressingClass {
    Linear = 0,
    Modulo = 1,
    MultiWrap = 2,
    BitReverse = 3,
}

impl AddressingClass {
    #[inline(always)]
    pub fn of(m: U24) -> Self {
        let m = m.value();
        if m == U24::MASK {
            Self::Linear
        } else if m & 0xFFFF == 0 {
            Self::BitReverse
        } else if m & 0x8000 != 0 {
            Self::MultiWrap
        } else {
            Self::Modulo
        }
    }

    #[inline(always)]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Linear,
            1 => Self::Modulo,
            2 => Self::MultiWrap,
            _ => Self::BitReverse,
        }
    }
}

/// Updates address register `r` by `n` under modifier `m`.
pub fn update(r: U24, n: U24, m: U24, add: bool) -> U24 {
    match AddressingClass::of(m) {
        AddressingClass::Linear => {
            if add {
                r.wrapping_add(n)
            } else {
                r.wrapping_sub(n)
            }
        }
        AddressingClass::BitReverse => {
            let (r, n) = (r.reverse(), n.reverse());
            let result = if add {
                r.wrapping_add(n)
            } else {
                r.wrapping_sub(n)
            };

            result.reverse()
        }
        AddressingClass::MultiWrap => {
            let mask = fold(m.value());
            let r = r.value();
            let low = r & mask;
            let low = if add {
                low.wrapping_add(n.value())
            } else {
                low.wrapping_sub(n.value())
            };

            U24::new((r & !mask) | (low & mask))
        }
        AddressingClass::Modulo => modulo(r, n, m.value(), add),
    }
}

fn modulo(r: U24, n: U24, m: u32, add: bool) -> U24 {
    let mask = fold(m);
    let offset = if add {
        n.signed() as i64
    } else {
        -(n.signed() as i64)
    };

    // jumping by a multiple of the buffer's power of two size lands in another buffer
    if offset != 0 && offset.unsigned_abs() & mask as u64 == 0 {
        return U24::new((r.value() as i64 + offset) as u32);
    }

    let lower = (r.value() & !mask) as i64;
    let upper = lower + m as i64;
    let size = m as i64 + 1;

    let mut result = r.value() as i64 + offset;
    if result > upper {
        result -= size;
    } else if result < lower {
        result += size;
    }

    U24::new(result as u32)
}

/// Effective address addressing modes (`MMM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EaMode {
    /// `(Rn)-Nn`
    PostDecN,
    /// `(Rn)+Nn`
    PostIncN,
    /// `(Rn)-`
    PostDec,
    /// `(Rn)+`
    PostInc,
    /// `(Rn)`
    NoUpdate,
    /// `(Rn+Nn)`
    Indexed,
    /// Absolute address in the extension word.
    Absolute,
    /// Immediate data in the extension word.
    Immediate,
    /// `-(Rn)`
    PreDec,
}

/// An effective address: a mode and the address register it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ea {
    pub mode: EaMode,
    pub reg: u8,
}

impl Ea {
    /// Decodes a 6-bit `MMMRRR` field.
    pub fn decode(mmmrrr: u32) -> Option<Self> {
        let reg = (mmmrrr & 0b111) as u8;
        let mode = match (mmmrrr >> 3) & 0b111 {
            0b000 => EaMode::PostDecN,
            0b001 => EaMode::PostIncN,
            0b010 => EaMode::PostDec,
            0b011 => EaMode::PostInc,
            0b100 => EaMode::NoUpdate,
            0b101 => EaMode::Indexed,
            0b110 => match reg {
                0b000 => EaMode::Absolute,
                0b100 => EaMode::Immediate,
                _ => return None,
            },
            _ => EaMode::PreDec,
        };

        Some(Self { mode, reg })
    }

    /// Decodes the 2-bit `MM` subset used by XY moves.
    pub fn decode_xy(mm: u32, reg: u8) -> Self {
        let mode = match mm & 0b11 {
            0b00 => EaMode::NoUpdate,
            0b01 => EaMode::PostIncN,
            0b10 => EaMode::PostDec,
            _ => EaMode::PostInc,
        };

        Self { mode, reg: reg & 7 }
    }

    /// Decodes the 2-bit `MM` subset used by LUA and the update move.
    pub fn decode_update(mm: u32, reg: u8) -> Self {
        let mode = match mm & 0b11 {
            0b00 => EaMode::PostDecN,
            0b01 => EaMode::PostIncN,
            0b10 => EaMode::PostDec,
            _ => EaMode::PostInc,
        };

        Self { mode, reg: reg & 7 }
    }

    #[inline(always)]
    pub fn needs_ext(self) -> bool {
        matches!(self.mode, EaMode::Absolute | EaMode::Immediate)
    }

    /// Whether this effective address modifies its address register.
    #[inline(always)]
    pub fn updates_reg(self) -> bool {
        matches!(
            self.mode,
            EaMode::PostDecN | EaMode::PostIncN | EaMode::PostDec | EaMode::PostInc | EaMode::PreDec
        )
    }

    /// The value the address register would hold after this addressing mode's update.
    pub fn updated(self, regs: &Registers) -> U24 {
        let i = self.reg as usize;
        let (r, n, m) = (regs.r[i], regs.n[i], regs.m[i]);
        let one = U24::new(1);
        match self.mode {
            EaMode::PostDecN => update(r, n, m, false),
            EaMode::PostIncN => update(r, n, m, true),
            EaMode::PostDec | EaMode::PreDec => update(r, one, m, false),
            EaMode::PostInc => update(r, one, m, true),
            EaMode::NoUpdate | EaMode::Indexed | EaMode::Absolute | EaMode::Immediate => r,
        }
    }

    /// Computes the address this effective address refers to and applies its register update.
    /// Absolute and immediate modes return the extension word.
    pub fn resolve(self, regs: &mut Registers, ext: U24) -> U24 {
        let i = self.reg as usize;
        match self.mode {
            EaMode::Absolute | EaMode::Immediate => ext,
            EaMode::NoUpdate => regs.r[i],
            EaMode::Indexed => update(regs.r[i], regs.n[i], regs.m[i], true),
            EaMode::PreDec => {
                let updated = self.updated(regs);
                regs.r[i] = updated;
                updated
            }
            _ => {
                let address = regs.r[i];
                regs.r[i] = self.updated(regs);
                address
            }
        }
    }
}

impl std::fmt::Display for Ea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = self.reg;
        match self.mode {
            EaMode::PostDecN => write!(f, "(r{r})-n{r}"),
            EaMode::PostIncN => write!(f, "(r{r})+n{r}"),
            EaMode::PostDec => write!(f, "(r{r})-"),
            EaMode::PostInc => write!(f, "(r{r})+"),
            EaMode::NoUpdate => write!(f, "(r{r})"),
            EaMode::Indexed => write!(f, "(r{r}+n{r})"),
            EaMode::Absolute => f.write_str("abs"),
            EaMode::Immediate => f.write_str("#imm"),
            EaMode::PreDec => write!(f, "-(r{r})"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn w(value: u32) -> U24 {
        U24::new(value)
    }

    #[test]
    fn linear_round_trip() {
        let m = U24::MAX;
        for (r, n) in [(0, 1), (0xFF_FFFF, 1), (0x12_3456, 0x80_0000), (5, 0xFF_FFFF)] {
            let forward = update(w(r), w(n), m, true);
            assert_eq!(update(forward, w(n), m, false), w(r));

            let backward = update(w(r), w(n), m, false);
            assert_eq!(update(backward, w(n), m, true), w(r));
        }
    }

    #[test]
    fn modulo_period() {
        let m = 0x00_0009;
        let start = w(0x00_0103);

        let mut r = start;
        let mut seen = Vec::new();
        for _ in 0..=m {
            seen.push(r);
            r = update(r, w(1), w(m), true);
        }

        assert_eq!(r, start);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), m as usize + 1);
        assert!(seen.iter().all(|a| (0x100..=0x109).contains(&a.value())));
    }

    #[test]
    fn modulo_jump_to_next_buffer() {
        assert_eq!(
            update(w(0x09_C000), w(0x4000), w(0x3FFD), true),
            w(0x0A_0000)
        );
    }

    #[test]
    fn modulo_wraps_backwards() {
        assert_eq!(update(w(0x100), w(1), w(9), false), w(0x109));
        assert_eq!(update(w(0x109), w(2), w(9), true), w(0x101));
    }

    #[test]
    fn bit_reverse_is_an_involution() {
        for value in [0, 1, 0x80_0000, 0x12_3456, 0xFF_FFFF, 0xA5_5A5A] {
            assert_eq!(w(value).reverse().reverse(), w(value));
        }
    }

    #[test]
    fn bit_reverse_update() {
        // reverse carry with n = 4 steps through 0, 4, 2, 6, 1, 5, 3, 7 in the low bits when
        // seen through the reversed 24-bit order
        let m = U24::ZERO;
        let n = w(0x40_0000);
        let r = update(w(0), n, m, true);
        assert_eq!(r, w(2));
        assert_eq!(update(r, n, m, true), w(0));
    }

    #[test]
    fn multi_wrap_returns_after_256_steps() {
        let m = w(0x00_80FF);
        let start = w(0x12_3456);

        let mut r = start;
        for _ in 0..256 {
            r = update(r, w(1), m, true);
        }

        assert_eq!(r.value() & 0xFF, start.value() & 0xFF);
        assert_eq!(r, w(0x12_3556));
    }

    #[test]
    fn multi_wrap_masks_with_the_folded_modifier() {
        let m = w(0x00_80FF);
        assert_eq!(update(w(0x12_34FF), w(1), m, true), w(0x12_3500));
        assert_eq!(update(w(0x12_FFFF), w(1), m, true), w(0x12_0000));
        assert_eq!(update(w(0x12_0000), w(1), m, false), w(0x12_FFFF));
    }

    #[test]
    fn classes() {
        assert_eq!(AddressingClass::of(U24::MAX), AddressingClass::Linear);
        assert_eq!(AddressingClass::of(w(0)), AddressingClass::BitReverse);
        assert_eq!(AddressingClass::of(w(0x8003)), AddressingClass::MultiWrap);
        assert_eq!(AddressingClass::of(w(0x3FFD)), AddressingClass::Modulo);
    }

    #[test]
    fn effective_addresses() {
        let mut regs = Registers::default();
        regs.r[2] = w(0x100);
        regs.n[2] = w(0x10);

        let ea = Ea::decode(0b001_010).unwrap();
        assert_eq!(ea.resolve(&mut regs, U24::ZERO), w(0x100));
        assert_eq!(regs.r[2], w(0x110));

        let ea = Ea::decode(0b111_010).unwrap();
        assert_eq!(ea.resolve(&mut regs, U24::ZERO), w(0x10F));
        assert_eq!(regs.r[2], w(0x10F));

        let ea = Ea::decode(0b101_010).unwrap();
        assert_eq!(ea.resolve(&mut regs, U24::ZERO), w(0x11F));
        assert_eq!(regs.r[2], w(0x10F));

        assert!(Ea::decode(0b110_001).is_none());
        assert!(Ea::decode(0b110_000).unwrap().needs_ext());
    }
}
