use super::BlockBuilder;
use cranelift::{
    codegen::ir,
    prelude::{FunctionBuilder, InstBuilder, IntCC},
};

/// Mask of a 56-bit accumulator.
pub const MASK56: i64 = 0x00FF_FFFF_FFFF_FFFF;
/// Mask of a 24-bit word.
pub const MASK24: i64 = 0x00FF_FFFF;

/// Trait for transforming values into an IR value in a function.
pub trait IntoIrValue {
    fn into_value(self, bd: &mut FunctionBuilder<'_>) -> ir::Value;
}

impl IntoIrValue for ir::Value {
    fn into_value(self, _: &mut FunctionBuilder<'_>) -> ir::Value {
        self
    }
}

impl IntoIrValue for bool {
    fn into_value(self, bd: &mut FunctionBuilder<'_>) -> ir::Value {
        bd.ins().iconst(ir::types::I8, self as i64)
    }
}

impl IntoIrValue for u8 {
    fn into_value(self, bd: &mut FunctionBuilder<'_>) -> ir::Value {
        bd.ins().iconst(ir::types::I8, self as u64 as i64)
    }
}

impl IntoIrValue for i32 {
    fn into_value(self, bd: &mut FunctionBuilder<'_>) -> ir::Value {
        bd.ins().iconst(ir::types::I32, self as u32 as i64)
    }
}

impl IntoIrValue for u32 {
    fn into_value(self, bd: &mut FunctionBuilder<'_>) -> ir::Value {
        bd.ins().iconst(ir::types::I32, self as u64 as i64)
    }
}

impl IntoIrValue for i64 {
    fn into_value(self, bd: &mut FunctionBuilder<'_>) -> ir::Value {
        bd.ins().iconst(ir::types::I64, self)
    }
}

impl IntoIrValue for u64 {
    fn into_value(self, bd: &mut FunctionBuilder<'_>) -> ir::Value {
        bd.ins().iconst(ir::types::I64, self as i64)
    }
}

impl BlockBuilder<'_> {
    /// Creates an IR value from the given `value`.
    pub fn ir_value(&mut self, value: impl IntoIrValue) -> ir::Value {
        value.into_value(&mut self.bd)
    }

    /// Gets bit `index` of `value` as a boolean (I8).
    pub fn get_bit(&mut self, value: ir::Value, index: u32) -> ir::Value {
        let shifted = self.bd.ins().ushr_imm(value, index as i64);
        let bit = self.bd.ins().band_imm(shifted, 0b1);

        if self.bd.func.dfg.value_type(bit) == ir::types::I8 {
            bit
        } else {
            self.bd.ins().ireduce(ir::types::I8, bit)
        }
    }

    /// Sets bit `index` of `value` (an I32) to the boolean `set`.
    pub fn set_bit(&mut self, value: ir::Value, index: u32, set: impl IntoIrValue) -> ir::Value {
        let set = self.ir_value(set);
        let set = self.bd.ins().uextend(ir::types::I32, set);
        let bit = self.bd.ins().ishl_imm(set, index as i64);

        let cleared = self.bd.ins().band_imm(value, !(1i64 << index) & 0xFFFF_FFFF);
        self.bd.ins().bor(cleared, bit)
    }

    /// Whether the I8 boolean is zero.
    pub fn not(&mut self, value: ir::Value) -> ir::Value {
        self.bd.ins().bxor_imm(value, 1)
    }

    /// Sign extends a 56-bit accumulator value in an I64.
    pub fn sext56(&mut self, value: ir::Value) -> ir::Value {
        let shifted = self.bd.ins().ishl_imm(value, 8);
        self.bd.ins().sshr_imm(shifted, 8)
    }

    pub fn mask56(&mut self, value: ir::Value) -> ir::Value {
        self.bd.ins().band_imm(value, MASK56)
    }

    /// Sign extends a 24-bit word (I32) into an I64.
    pub fn sext24_i64(&mut self, word: ir::Value) -> ir::Value {
        let shifted = self.bd.ins().ishl_imm(word, 8);
        let signed = self.bd.ins().sshr_imm(shifted, 8);
        self.bd.ins().sextend(ir::types::I64, signed)
    }

    /// `U56::from_word`: a word in the high part, sign extended, low part cleared.
    pub fn acc_from_word(&mut self, word: ir::Value) -> ir::Value {
        let signed = self.sext24_i64(word);
        let shifted = self.bd.ins().ishl_imm(signed, 24);
        self.mask56(shifted)
    }

    /// `U56::from_pair`: two words as a 48-bit value, sign extended.
    pub fn acc_from_pair(&mut self, high: ir::Value, low: ir::Value) -> ir::Value {
        let high = self.bd.ins().uextend(ir::types::I64, high);
        let low = self.bd.ins().uextend(ir::types::I64, low);
        let high = self.bd.ins().ishl_imm(high, 24);
        let pair = self.bd.ins().bor(high, low);

        let shifted = self.bd.ins().ishl_imm(pair, 16);
        let signed = self.bd.ins().sshr_imm(shifted, 16);
        self.mask56(signed)
    }

    /// The high word (bits 24..48) of an accumulator as an I32.
    pub fn acc_high(&mut self, acc: ir::Value) -> ir::Value {
        let shifted = self.bd.ins().ushr_imm(acc, 24);
        let word = self.bd.ins().ireduce(ir::types::I32, shifted);
        self.bd.ins().band_imm(word, MASK24)
    }

    /// The low word (bits 0..24) of an accumulator as an I32.
    pub fn acc_low(&mut self, acc: ir::Value) -> ir::Value {
        let word = self.bd.ins().ireduce(ir::types::I32, acc);
        self.bd.ins().band_imm(word, MASK24)
    }

    /// The extension byte of an accumulator, sign extended to a word.
    pub fn acc_ext(&mut self, acc: ir::Value) -> ir::Value {
        let shifted = self.bd.ins().ushr_imm(acc, 48);
        let byte = self.bd.ins().ireduce(ir::types::I32, shifted);
        let byte = self.bd.ins().ishl_imm(byte, 24);
        let signed = self.bd.ins().sshr_imm(byte, 24);
        self.bd.ins().band_imm(signed, MASK24)
    }

    /// Replaces the bits of `acc` selected by `mask` with `word << shift`.
    pub fn acc_with(&mut self, acc: ir::Value, word: ir::Value, shift: i64, mask: i64) -> ir::Value {
        let word = self.bd.ins().uextend(ir::types::I64, word);
        let word = self.bd.ins().ishl_imm(word, shift);
        let word = self.bd.ins().band_imm(word, mask);
        let cleared = self.bd.ins().band_imm(acc, !mask & MASK56);
        self.bd.ins().bor(cleared, word)
    }

    /// `U56::with_high`.
    pub fn acc_with_high(&mut self, acc: ir::Value, high: ir::Value) -> ir::Value {
        self.acc_with(acc, high, 24, MASK24 << 24)
    }

    /// Bit 55 of an accumulator value as a boolean.
    pub fn bit55(&mut self, value: ir::Value) -> ir::Value {
        self.get_bit(value, 55)
    }

    /// Two's complement negation of a 56-bit value.
    pub fn neg56(&mut self, value: ir::Value) -> ir::Value {
        let negated = self.bd.ins().ineg(value);
        self.mask56(negated)
    }

    /// `|value|` of a 56-bit value.
    pub fn abs56(&mut self, value: ir::Value) -> ir::Value {
        let negative = self.bit55(value);
        let negated = self.neg56(value);
        self.bd.ins().select(negative, negated, value)
    }

    /// Whether `value` (an I32 or I64) is zero, as a boolean.
    pub fn is_zero(&mut self, value: ir::Value) -> ir::Value {
        self.bd.ins().icmp_imm(IntCC::Equal, value, 0)
    }
}
