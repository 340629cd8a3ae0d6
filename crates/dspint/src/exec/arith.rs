//! Accumulator arithmetic and condition code formulas.
use dsp56k::regs::{Scaling, Status, fits_48};
use dsp56k::{U24, U56};

const MASK: u64 = U56::MASK;

#[inline(always)]
fn bit55(value: u64) -> bool {
    (value >> 55) & 1 != 0
}

/// Sets E, U, N and Z from an accumulator result.
#[inline(always)]
pub fn result_flags(status: &mut Status, value: U56) {
    let scaled = status.scaling().apply(value.signed());
    status.set_extension(!fits_48(scaled));
    status.set_unnormalized(((scaled >> 47) ^ (scaled >> 46)) & 1 == 0);
    status.set_negative(value.is_negative());
    status.set_zero(value == U56::ZERO);
}

/// Sets C, V, L, E, U, N and Z after an arithmetic operation.
#[inline(always)]
pub fn arith_flags(status: &mut Status, value: U56, carry: bool, overflow: bool) {
    status.set_carry(carry);
    status.set_overflow(overflow);
    status.set_limit(status.limit() || overflow);
    result_flags(status, value);
}

/// Sets V, L, E, U, N and Z, leaving C alone.
#[inline(always)]
pub fn arith_flags_no_carry(status: &mut Status, value: U56, overflow: bool) {
    status.set_overflow(overflow);
    status.set_limit(status.limit() || overflow);
    result_flags(status, value);
}

/// Sets N, Z and clears V after a logical operation on the high word of an accumulator.
#[inline(always)]
pub fn logic_flags(status: &mut Status, high: U24) {
    status.set_negative(high.is_negative());
    status.set_zero(high == U24::ZERO);
    status.set_overflow(false);
}

/// `a + b + carry`, returning the result, the carry out and the overflow.
#[inline(always)]
pub fn add(a: U56, b: U56, carry: bool) -> (U56, bool, bool) {
    let sum = a.value() + b.value() + u64::from(carry);
    let result = sum & MASK;
    let overflow = bit55((a.value() ^ result) & (b.value() ^ result));

    (U56::new(result), (sum >> 56) & 1 != 0, overflow)
}

/// `a - b - borrow`, returning the result, the borrow out and the overflow.
#[inline(always)]
pub fn sub(a: U56, b: U56, borrow: bool) -> (U56, bool, bool) {
    let subtrahend = b.value() + u64::from(borrow);
    let result = a.value().wrapping_sub(subtrahend) & MASK;
    let overflow = bit55((a.value() ^ b.value()) & (a.value() ^ result));

    (U56::new(result), subtrahend > a.value(), overflow)
}

/// Shifts left by `amount`, returning the result, the last bit shifted out and whether the sign
/// changed at any point.
#[inline(always)]
pub fn shl(value: U56, amount: u32) -> (U56, bool, bool) {
    if amount == 0 {
        return (value, false, false);
    }

    let wide = (value.value() as u128) << amount.min(64);
    let carry = (wide >> 56) & 1 != 0;

    // bits 55..55-amount must all match for the sign to be stable
    let amount = amount.min(56);
    let top = value.signed() >> (55 - amount);
    let overflow = top != 0 && top != -1;

    (U56::new(wide as u64 & MASK), carry, overflow)
}

/// Arithmetic right shift by `amount`, returning the result and the last bit shifted out.
#[inline(always)]
pub fn asr(value: U56, amount: u32) -> (U56, bool) {
    if amount == 0 {
        return (value, false);
    }

    let signed = value.signed();
    let carry = (signed >> (amount - 1).min(63)) & 1 != 0;
    (U56::from_signed(signed >> amount.min(63)), carry)
}

/// Logical shift of a 24-bit word. Positive amounts shift left. Returns the word and the last
/// bit shifted out.
#[inline(always)]
pub fn lsh(word: U24, amount: i32) -> (U24, bool) {
    let value = word.value() as u64;
    match amount {
        0 => (word, false),
        1.. => {
            let amount = amount.unsigned_abs().min(40);
            let wide = value << amount;
            (U24::new(wide as u32), (wide >> 24) & 1 != 0)
        }
        _ => {
            let amount = amount.unsigned_abs().min(40);
            let carry = (value >> (amount - 1)) & 1 != 0;
            (U24::new((value >> amount) as u32), carry)
        }
    }
}

/// Rounds an accumulator at the position selected by the scaling mode.
///
/// Convergent rounding (round half to even) unless `twos_complement` is set. Returns the rounded
/// value and the overflow.
pub fn round(value: U56, scaling: Scaling, twos_complement: bool) -> (U56, bool) {
    let half = 1u64 << scaling.round_bit();
    let low = (half << 1) - 1;

    let (sum, _, overflow) = add(value, U56::new(half), false);
    let mut bits = sum.value();
    if !twos_complement && value.value() & low == half {
        bits &= !(half << 1);
    }

    (U56::new(bits & !low), overflow)
}

/// Signed fractional product of two words, aligned to the accumulator.
#[inline(always)]
pub fn product(s1: U24, s2: U24) -> U56 {
    U56::from_signed((s1.signed() as i64 * s2.signed() as i64) << 1)
}

/// How the operands of a mixed sign multiplication are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    SignedSigned,
    SignedUnsigned,
    UnsignedUnsigned,
}

/// Fractional product with explicit operand signedness.
#[inline(always)]
pub fn mixed_product(s1: U24, s2: U24, signedness: Signedness) -> U56 {
    let (a, b) = match signedness {
        Signedness::SignedSigned => (s1.signed() as i64, s2.signed() as i64),
        Signedness::SignedUnsigned => (s1.signed() as i64, s2.value() as i64),
        Signedness::UnsignedUnsigned => (s1.value() as i64, s2.value() as i64),
    };

    U56::from_signed(a.wrapping_mul(b) << 1)
}

/// Count of leading sign bits as used by CLB and NORMF.
pub fn leading_bits(value: U56) -> u32 {
    if value == U56::ZERO {
        return 0;
    }

    let shifted = (value.value() << 8) as i64;
    let leading = if shifted < 0 {
        shifted.leading_ones()
    } else {
        shifted.leading_zeros()
    };

    leading.min(56)
}

/// One step of non-restoring division.
pub fn div_step(dividend: U56, divisor: U24, carry: bool) -> (U56, bool, bool) {
    let d = dividend.value();
    let shifted = ((d << 1) | u64::from(carry)) & MASK;
    let overflow = bit55(d) != bit55(shifted);

    let divisor = U56::from_word(divisor);
    let result = if bit55(d) != divisor.is_negative() {
        shifted.wrapping_add(divisor.value())
    } else {
        shifted.wrapping_sub(divisor.value())
    } & MASK;

    (U56::new(result), !bit55(result), overflow)
}

/// The bit field selected by an EXTRACT/INSERT control word: (width, offset).
#[inline(always)]
pub fn field_control(control: U24) -> (u32, u32) {
    let control = control.value();
    (((control >> 12) & 0x3F).min(56), (control & 0x3F).min(56))
}

#[inline(always)]
fn field_mask(width: u32) -> u64 {
    if width >= 64 { u64::MAX } else { (1 << width) - 1 }
}

/// Extracts a field of an accumulator, sign extending it if `signed`.
pub fn extract(value: U56, control: U24, signed: bool) -> U56 {
    let (width, offset) = field_control(control);
    if width == 0 {
        return U56::ZERO;
    }

    let field = (value.value() >> offset) & field_mask(width);
    if signed {
        let shift = 64 - width;
        U56::from_signed(((field << shift) as i64) >> shift)
    } else {
        U56::new(field)
    }
}

/// Inserts the low bits of `source` into a field of an accumulator.
pub fn insert(value: U56, source: U24, control: U24) -> U56 {
    let (width, offset) = field_control(control);
    let mask = (field_mask(width) << offset) & MASK;
    let field = ((source.value() as u64) << offset) & mask;

    U56::new((value.value() & !mask) | field)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_and_sub() {
        let (r, c, v) = add(U56::new(0x7F_FFFF_FFFF_FFFF), U56::new(1), false);
        assert_eq!(r, U56::new(0x80_0000_0000_0000));
        assert!(!c && v);

        let (r, c, v) = sub(U56::ZERO, U56::new(1), false);
        assert_eq!(r, U56::MAX);
        assert!(c && !v);
    }

    #[test]
    fn shift_left_by_one() {
        let (r, c, v) = shl(U56::new(0xAA_ABCD_EF12_3456), 1);
        assert_eq!(r, U56::new(0x55_579B_DE24_68AC));
        assert!(c);
        assert!(v);
    }

    #[test]
    fn shift_right() {
        let (r, c) = asr(U56::new(0x80_0000_0000_0003), 1);
        assert_eq!(r, U56::new(0xC0_0000_0000_0001));
        assert!(c);

        assert_eq!(lsh(U24::new(0x80_0001), 1), (U24::new(0x00_0002), true));
        assert_eq!(lsh(U24::new(0x80_0001), -1), (U24::new(0x40_0000), true));
    }

    #[test]
    fn convergent_rounding() {
        // exactly half with an even high part rounds down
        let (r, _) = round(U56::new(0x00_0000_0280_0000), Scaling::None, false);
        assert_eq!(r, U56::new(0x00_0000_0200_0000));

        // exactly half with an odd high part rounds up
        let (r, _) = round(U56::new(0x00_0000_0380_0000), Scaling::None, false);
        assert_eq!(r, U56::new(0x00_0000_0400_0000));

        // two's complement rounding always rounds half up
        let (r, _) = round(U56::new(0x00_0000_0280_0000), Scaling::None, true);
        assert_eq!(r, U56::new(0x00_0000_0300_0000));
    }

    #[test]
    fn products() {
        // 0.5 * 0.5 = 0.25
        let p = product(U24::new(0x40_0000), U24::new(0x40_0000));
        assert_eq!(p, U56::new(0x00_2000_0000_0000));

        // -1 * -1 does not fit in 48 bits
        let p = product(U24::new(0x80_0000), U24::new(0x80_0000));
        assert_eq!(p, U56::new(0x00_8000_0000_0000));
    }

    #[test]
    fn fields() {
        let control = U24::new((8 << 12) | 4);
        let value = U56::new(0xF80);
        assert_eq!(extract(value, control, false), U56::new(0xF8));
        assert_eq!(extract(value, control, true), U56::new(0xFF_FFFF_FFFF_FFF8));
        assert_eq!(
            insert(U56::ZERO, U24::new(0xAB), control),
            U56::new(0xAB0)
        );
    }

    #[test]
    fn leading() {
        assert_eq!(leading_bits(U56::new(0x00_4000_0000_0000)), 9);
        assert_eq!(leading_bits(U56::new(0xFF_8000_0000_0000)), 9);
        assert_eq!(leading_bits(U56::ZERO), 0);
    }
}
