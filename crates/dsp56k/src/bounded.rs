//! Fixed width unsigned integers.
//!
//! Every constructor and arithmetic helper masks its result to the declared width, so a value of
//! one of these types is never observed with bits set above it. Signed views are explicit.
use std::fmt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

macro_rules! bounded {
    ($($(#[$meta:meta])* $name:ident($repr:ty, $signed:ty) = $bits:literal;)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
            #[derive(IntoBytes, FromBytes, Immutable, KnownLayout)]
            #[repr(transparent)]
            pub struct $name($repr);

            impl $name {
                pub const BITS: u32 = $bits;
                pub const MASK: $repr = ((1 as $repr) << $bits) - 1;
                pub const ZERO: Self = Self(0);
                pub const MAX: Self = Self(Self::MASK);

                /// Creates a new value, discarding any bits above the width.
                #[inline(always)]
                pub const fn new(value: $repr) -> Self {
                    Self(value & Self::MASK)
                }

                /// Creates a new value from a signed one, keeping its two's complement bits.
                #[inline(always)]
                pub const fn from_signed(value: $signed) -> Self {
                    Self::new(value as $repr)
                }

                #[inline(always)]
                pub const fn value(self) -> $repr {
                    self.0
                }

                /// The value sign extended from its top bit.
                #[inline(always)]
                pub const fn signed(self) -> $signed {
                    const SHIFT: u32 = <$signed>::BITS - $bits;
                    ((self.0 as $signed) << SHIFT) >> SHIFT
                }

                #[inline(always)]
                pub const fn is_negative(self) -> bool {
                    (self.0 >> ($bits - 1)) & 1 != 0
                }

                #[inline(always)]
                pub const fn bit(self, index: u32) -> bool {
                    (self.0 >> index) & 1 != 0
                }

                #[inline(always)]
                pub const fn with_bit(self, index: u32, set: bool) -> Self {
                    let cleared = self.0 & !((1 as $repr) << index);
                    Self::new(cleared | ((set as $repr) << index))
                }

                #[inline(always)]
                pub const fn wrapping_add(self, rhs: Self) -> Self {
                    Self::new(self.0.wrapping_add(rhs.0))
                }

                #[inline(always)]
                pub const fn wrapping_sub(self, rhs: Self) -> Self {
                    Self::new(self.0.wrapping_sub(rhs.0))
                }

                #[inline(always)]
                pub const fn wrapping_neg(self) -> Self {
                    Self::new(self.0.wrapping_neg())
                }

                #[inline(always)]
                pub const fn not(self) -> Self {
                    Self::new(!self.0)
                }
            }

            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "0x{:0width$X}", self.0, width = ($bits as usize).div_ceil(4))
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{:0width$X}", self.0, width = ($bits as usize).div_ceil(4))
                }
            }
        )*
    };
}

bounded! {
    /// Shift amounts and bit numbers.
    U5(u8, i8) = 5;
    /// Short immediates and accumulator extension bytes.
    U8(u8, i8) = 8;
    /// A data or address word.
    U24(u32, i32) = 24;
    /// A data register pair (X or Y).
    U48(u64, i64) = 48;
    /// An accumulator.
    U56(u64, i64) = 56;
}

impl U24 {
    /// Reverses the order of all 24 bits.
    #[inline(always)]
    pub const fn reverse(self) -> Self {
        Self(self.0.reverse_bits() >> 8)
    }

    #[inline(always)]
    pub const fn low_byte(self) -> u8 {
        self.0 as u8
    }
}

impl U48 {
    #[inline(always)]
    pub const fn from_halves(high: U24, low: U24) -> Self {
        Self(((high.0 as u64) << 24) | low.0 as u64)
    }

    #[inline(always)]
    pub const fn high(self) -> U24 {
        U24::new((self.0 >> 24) as u32)
    }

    #[inline(always)]
    pub const fn low(self) -> U24 {
        U24::new(self.0 as u32)
    }
}

impl U56 {
    /// Builds an accumulator from its extension (A2), high (A1) and low (A0) parts.
    #[inline(always)]
    pub const fn from_parts(ext: U8, high: U24, low: U24) -> Self {
        Self(((ext.0 as u64) << 48) | ((high.0 as u64) << 24) | low.0 as u64)
    }

    /// Sign extends a 24-bit word into the high part, clearing the low part.
    #[inline(always)]
    pub const fn from_word(word: U24) -> Self {
        Self::from_signed((word.signed() as i64) << 24)
    }

    /// Sign extends a 48-bit pair into the high and low parts.
    #[inline(always)]
    pub const fn from_pair(pair: U48) -> Self {
        Self::from_signed(pair.signed())
    }

    #[inline(always)]
    pub const fn ext(self) -> U8 {
        U8::new((self.0 >> 48) as u8)
    }

    #[inline(always)]
    pub const fn high(self) -> U24 {
        U24::new((self.0 >> 24) as u32)
    }

    #[inline(always)]
    pub const fn low(self) -> U24 {
        U24::new(self.0 as u32)
    }

    #[inline(always)]
    pub const fn with_ext(self, ext: U8) -> Self {
        Self::new((self.0 & 0x0000_FFFF_FFFF_FFFF) | ((ext.0 as u64) << 48))
    }

    #[inline(always)]
    pub const fn with_high(self, high: U24) -> Self {
        Self::new((self.0 & 0x00FF_0000_00FF_FFFF) | ((high.0 as u64) << 24))
    }

    #[inline(always)]
    pub const fn with_low(self, low: U24) -> Self {
        Self::new((self.0 & 0x00FF_FFFF_FF00_0000) | low.0 as u64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constructors_mask() {
        assert_eq!(U24::new(0x1234_5678).value(), 0x34_5678);
        assert_eq!(U5::new(0xFF).value(), 0x1F);
        assert_eq!(U56::from_signed(-1).value(), 0xFF_FFFF_FFFF_FFFF);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(U24::new(0x80_0000).signed(), -0x80_0000);
        assert_eq!(U24::new(0x7F_FFFF).signed(), 0x7F_FFFF);
        assert_eq!(U56::new(0x80_0000_0000_0000).signed(), -(1 << 55));
        assert_eq!(U8::new(0xFF).signed(), -1);
    }

    #[test]
    fn accumulator_parts() {
        let acc = U56::from_parts(U8::new(0xAA), U24::new(0xABCDEF), U24::new(0x123456));
        assert_eq!(acc.value(), 0xAA_ABCDEF_123456);
        assert_eq!(acc.ext().value(), 0xAA);
        assert_eq!(acc.high().value(), 0xABCDEF);
        assert_eq!(acc.low().value(), 0x123456);

        let acc = acc.with_high(U24::new(0x000001)).with_low(U24::ZERO);
        assert_eq!(acc.value(), 0xAA_000001_000000);

        assert_eq!(U56::from_word(U24::new(0x800000)).value(), 0xFF_800000_000000);
    }

    #[test]
    fn wrapping_arithmetic() {
        assert_eq!(U24::MAX.wrapping_add(U24::new(1)), U24::ZERO);
        assert_eq!(U24::ZERO.wrapping_sub(U24::new(1)), U24::MAX);
        assert_eq!(U24::new(1).reverse().value(), 0x80_0000);
    }
}
