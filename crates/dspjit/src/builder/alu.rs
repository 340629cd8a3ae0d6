use super::BlockBuilder;
use super::util::{MASK24, MASK56};
use crate::registers::RegId;
use cranelift::{codegen::ir, prelude::InstBuilder, prelude::IntCC};
use dsp56k::ins::{AluOp, AluSrc, Mul};
use dsp56k::regs::{Acc, Scaling};

/// Status register bits.
const C: u32 = 0;
const V: u32 = 1;
const Z: u32 = 2;
const N: u32 = 3;
const U: u32 = 4;
const E: u32 = 5;
const L: u32 = 6;

pub(super) fn acc_id(acc: Acc) -> RegId {
    match acc {
        Acc::A => RegId::A,
        Acc::B => RegId::B,
    }
}

/// What happens to the flags derived from the result (N, Z, E and U).
#[derive(Debug, Clone, Copy)]
pub(super) enum Pending {
    /// Left as they are.
    Keep,
    /// Derived from this 56-bit value.
    Set(ir::Value),
}

/// The effects of an ALU operation, applied after the data move of its instruction.
#[derive(Debug, Clone, Copy)]
pub(super) struct Outcome {
    pub acc: Option<(Acc, ir::Value)>,
    pub sr: Option<ir::Value>,
    pub pending: Pending,
}

impl Outcome {
    const NOTHING: Self = Self {
        acc: None,
        sr: None,
        pending: Pending::Keep,
    };
}

impl BlockBuilder<'_> {
    pub(super) fn is_native_alu(op: AluOp) -> bool {
        let native_reg = |reg| RegId::of(reg).is_some();
        let native_src = |src| match src {
            AluSrc::Reg(reg) => native_reg(reg),
            _ => true,
        };

        match op {
            AluOp::Addr(_)
            | AluOp::Addl(_)
            | AluOp::Subr(_)
            | AluOp::Subl(_)
            | AluOp::Max
            | AluOp::Maxm => false,
            AluOp::Add(src, _)
            | AluOp::Sub(src, _)
            | AluOp::Cmp(src, _)
            | AluOp::Cmpm(src, _)
            | AluOp::Tfr(src, _)
            | AluOp::Adc(src, _)
            | AluOp::Sbc(src, _) => native_src(src),
            AluOp::And(reg, _) | AluOp::Or(reg, _) | AluOp::Eor(reg, _) => native_reg(reg),
            AluOp::Mul(Mul { s1, s2, .. }) => native_reg(s1) && native_reg(s2),
            _ => true,
        }
    }

    /// Applies the scaling mode of the block to a 56-bit value, giving a signed I64.
    pub(super) fn scaled(&mut self, value: ir::Value) -> ir::Value {
        let signed = self.sext56(value);
        match self.mode.scaling() {
            Scaling::None => signed,
            Scaling::Down => self.bd.ins().sshr_imm(signed, 1),
            Scaling::Up => self.bd.ins().ishl_imm(signed, 1),
        }
    }

    /// Whether a scaled value fits in 48 signed bits, as a boolean.
    pub(super) fn fits_48(&mut self, scaled: ir::Value) -> ir::Value {
        let shifted = self.bd.ins().ishl_imm(scaled, 16);
        let back = self.bd.ins().sshr_imm(shifted, 16);
        self.bd.ins().icmp(IntCC::Equal, back, scaled)
    }

    /// N, Z, E and U of a 56-bit result, in their SR positions.
    pub(super) fn result_flags(&mut self, value: ir::Value) -> ir::Value {
        let scaled = self.scaled(value);

        let fits = self.fits_48(scaled);
        let e = self.not(fits);

        let bit47 = self.bd.ins().sshr_imm(scaled, 47);
        let bit46 = self.bd.ins().sshr_imm(scaled, 46);
        let differ = self.bd.ins().bxor(bit47, bit46);
        let differ = self.bd.ins().band_imm(differ, 1);
        let u = self.is_zero(differ);

        let n = self.bit55(value);
        let z = self.is_zero(value);

        let flags = self.ir_value(0u32);
        let flags = self.set_bit(flags, Z, z);
        let flags = self.set_bit(flags, N, n);
        let flags = self.set_bit(flags, U, u);
        self.set_bit(flags, E, e)
    }

    /// Operand of a two-operand ALU instruction as a 56-bit value.
    fn alu_operand(&mut self, src: AluSrc) -> ir::Value {
        match src {
            AluSrc::Acc(acc) => self.get(acc_id(acc)),
            AluSrc::X => {
                let high = self.get(RegId::X1);
                let low = self.get(RegId::X0);
                self.acc_from_pair(high, low)
            }
            AluSrc::Y => {
                let high = self.get(RegId::Y1);
                let low = self.get(RegId::Y0);
                self.acc_from_pair(high, low)
            }
            AluSrc::Reg(reg) => {
                let word = self.peek(reg);
                self.acc_from_word(word)
            }
        }
    }

    /// `a + b + carry` on 56 bits: (result, carry out, overflow).
    pub(super) fn add56(
        &mut self,
        a: ir::Value,
        b: ir::Value,
        carry: Option<ir::Value>,
    ) -> (ir::Value, ir::Value, ir::Value) {
        let mut sum = self.bd.ins().iadd(a, b);
        if let Some(carry) = carry {
            let carry = self.bd.ins().uextend(ir::types::I64, carry);
            sum = self.bd.ins().iadd(sum, carry);
        }

        let result = self.mask56(sum);
        let carry = self.get_bit(sum, 56);

        let a_r = self.bd.ins().bxor(a, result);
        let b_r = self.bd.ins().bxor(b, result);
        let both = self.bd.ins().band(a_r, b_r);
        let overflow = self.bit55(both);

        (result, carry, overflow)
    }

    /// `a - b - borrow` on 56 bits: (result, borrow out, overflow).
    pub(super) fn sub56(
        &mut self,
        a: ir::Value,
        b: ir::Value,
        borrow: Option<ir::Value>,
    ) -> (ir::Value, ir::Value, ir::Value) {
        let subtrahend = match borrow {
            Some(borrow) => {
                let borrow = self.bd.ins().uextend(ir::types::I64, borrow);
                self.bd.ins().iadd(b, borrow)
            }
            None => b,
        };

        let diff = self.bd.ins().isub(a, subtrahend);
        let result = self.mask56(diff);
        let carry = self
            .bd
            .ins()
            .icmp(IntCC::UnsignedGreaterThan, subtrahend, a);

        let a_b = self.bd.ins().bxor(a, b);
        let a_r = self.bd.ins().bxor(a, result);
        let both = self.bd.ins().band(a_b, a_r);
        let overflow = self.bit55(both);

        (result, carry, overflow)
    }

    /// Rounds at the bit selected by the scaling mode: (result, overflow).
    pub(super) fn round56(&mut self, value: ir::Value) -> (ir::Value, ir::Value) {
        let half = 1i64 << self.mode.scaling().round_bit();
        let low = (half << 1) - 1;

        let half_value = self.ir_value(half);
        let (sum, _, overflow) = self.add56(value, half_value, None);

        let sum = if self.mode.twos_complement_rounding() {
            sum
        } else {
            // ties go to even
            let low_bits = self.bd.ins().band_imm(value, low);
            let tie = self.bd.ins().icmp_imm(IntCC::Equal, low_bits, half);
            let even = self.bd.ins().band_imm(sum, !(half << 1) & MASK56);
            self.bd.ins().select(tie, even, sum)
        };

        let rounded = self.bd.ins().band_imm(sum, !low & MASK56);
        (rounded, overflow)
    }

    /// SR after an arithmetic operation: C (if given), V, and L if V is set.
    fn arith_sr(&mut self, carry: Option<ir::Value>, overflow: ir::Value) -> ir::Value {
        let sr = self.get(RegId::Sr);
        let sr = match carry {
            Some(carry) => self.set_bit(sr, C, carry),
            None => sr,
        };

        let sr = self.set_bit(sr, V, overflow);
        let limit = self.bd.ins().uextend(ir::types::I32, overflow);
        let limit = self.bd.ins().ishl_imm(limit, L as i64);
        self.bd.ins().bor(sr, limit)
    }

    /// SR after an operation on the high word of an accumulator. Expects no pending result.
    fn logic_sr(&mut self, high: ir::Value, carry: Option<ir::Value>) -> ir::Value {
        debug_assert!(self.pending.is_none());

        let sr = self.get(RegId::Sr);
        let sr = match carry {
            Some(carry) => self.set_bit(sr, C, carry),
            None => sr,
        };

        let negative = self.get_bit(high, 23);
        let zero = self.is_zero(high);
        let sr = self.set_bit(sr, N, negative);
        let sr = self.set_bit(sr, Z, zero);
        self.set_bit(sr, V, false)
    }

    fn carry_flag(&mut self) -> ir::Value {
        let sr = self.get(RegId::Sr);
        self.get_bit(sr, C)
    }

    /// Replaces the high word of an accumulator by `f(high)`, with logic flags.
    fn high_word_op(
        &mut self,
        d: Acc,
        f: impl FnOnce(&mut Self, ir::Value) -> (ir::Value, Option<ir::Value>),
    ) -> Outcome {
        self.materialize();

        let acc = self.get(acc_id(d));
        let high = self.acc_high(acc);
        let (high, carry) = f(self, high);
        let acc = self.acc_with_high(acc, high);
        let sr = self.logic_sr(high, carry);

        Outcome {
            acc: Some((d, acc)),
            sr: Some(sr),
            pending: Pending::Keep,
        }
    }

    fn arith(
        &mut self,
        d: Option<Acc>,
        (result, carry, overflow): (ir::Value, ir::Value, ir::Value),
    ) -> Outcome {
        let sr = self.arith_sr(Some(carry), overflow);
        Outcome {
            acc: d.map(|d| (d, result)),
            sr: Some(sr),
            pending: Pending::Set(result),
        }
    }

    fn arith_no_carry(&mut self, d: Acc, result: ir::Value, overflow: ir::Value) -> Outcome {
        let sr = self.arith_sr(None, overflow);
        Outcome {
            acc: Some((d, result)),
            sr: Some(sr),
            pending: Pending::Set(result),
        }
    }

    fn multiply(&mut self, mul: Mul) -> Outcome {
        let s1 = self.peek(mul.s1);
        let s2 = self.peek(mul.s2);
        let s1 = self.sext24_i64(s1);
        let s2 = self.sext24_i64(s2);

        let product = self.bd.ins().imul(s1, s2);
        let product = self.bd.ins().ishl_imm(product, 1);
        let mut product = self.mask56(product);
        if mul.negate {
            product = self.neg56(product);
        }

        let (mut result, mut overflow) = if mul.accumulate {
            let acc = self.get(acc_id(mul.dst));
            let (result, _, overflow) = self.add56(acc, product, None);
            (result, overflow)
        } else {
            (product, self.ir_value(false))
        };

        if mul.round {
            let (rounded, round_overflow) = self.round56(result);
            result = rounded;
            overflow = self.bd.ins().bor(overflow, round_overflow);
        }

        self.arith_no_carry(mul.dst, result, overflow)
    }

    /// Computes the ALU half of a parallel instruction from the registers as they were before
    /// the instruction.
    pub(super) fn alu(&mut self, op: AluOp) -> Outcome {
        match op {
            AluOp::None => Outcome::NOTHING,
            AluOp::Add(s, d) | AluOp::Adc(s, d) => {
                let s = self.alu_operand(s);
                let carry = matches!(op, AluOp::Adc(..)).then(|| self.carry_flag());
                let acc = self.get(acc_id(d));
                let result = self.add56(acc, s, carry);
                self.arith(Some(d), result)
            }
            AluOp::Sub(s, d) | AluOp::Sbc(s, d) => {
                let s = self.alu_operand(s);
                let borrow = matches!(op, AluOp::Sbc(..)).then(|| self.carry_flag());
                let acc = self.get(acc_id(d));
                let result = self.sub56(acc, s, borrow);
                self.arith(Some(d), result)
            }
            AluOp::Cmp(s, d) | AluOp::Cmpm(s, d) => {
                let mut s = self.alu_operand(s);
                let mut d = self.get(acc_id(d));
                if matches!(op, AluOp::Cmpm(..)) {
                    s = self.abs56(s);
                    d = self.abs56(d);
                }

                let result = self.sub56(d, s, None);
                self.arith(None, result)
            }
            AluOp::Tfr(s, d) => {
                let value = self.alu_operand(s);
                Outcome {
                    acc: Some((d, value)),
                    ..Outcome::NOTHING
                }
            }
            AluOp::And(s, d) | AluOp::Or(s, d) | AluOp::Eor(s, d) => {
                let s = self.peek(s);
                self.high_word_op(d, |this, high| {
                    let high = match op {
                        AluOp::And(..) => this.bd.ins().band(high, s),
                        AluOp::Or(..) => this.bd.ins().bor(high, s),
                        _ => this.bd.ins().bxor(high, s),
                    };

                    (high, None)
                })
            }
            AluOp::Rnd(d) => {
                let acc = self.get(acc_id(d));
                let (result, overflow) = self.round56(acc);
                self.arith_no_carry(d, result, overflow)
            }
            AluOp::Tst(d) => {
                let acc = self.get(acc_id(d));
                let sr = self.get(RegId::Sr);
                let sr = self.set_bit(sr, V, false);
                let sr = self.set_bit(sr, C, false);

                Outcome {
                    acc: None,
                    sr: Some(sr),
                    pending: Pending::Set(acc),
                }
            }
            AluOp::Clr(d) => {
                let zero = self.ir_value(0i64);
                let sr = self.get(RegId::Sr);
                let sr = self.set_bit(sr, V, false);

                Outcome {
                    acc: Some((d, zero)),
                    sr: Some(sr),
                    pending: Pending::Set(zero),
                }
            }
            AluOp::Asr(d) => {
                let acc = self.get(acc_id(d));
                let carry = self.get_bit(acc, 0);
                let signed = self.sext56(acc);
                let shifted = self.bd.ins().sshr_imm(signed, 1);
                let result = self.mask56(shifted);
                let overflow = self.ir_value(false);
                self.arith(Some(d), (result, carry, overflow))
            }
            AluOp::Asl(d) => {
                let acc = self.get(acc_id(d));
                let carry = self.bit55(acc);
                let shifted = self.bd.ins().ishl_imm(acc, 1);
                let result = self.mask56(shifted);

                // bits 55 and 54 must match for the sign to survive
                let signed = self.sext56(acc);
                let top = self.bd.ins().sshr_imm(signed, 54);
                let top = self.bd.ins().iadd_imm(top, 1);
                let overflow = self.bd.ins().icmp_imm(IntCC::UnsignedGreaterThan, top, 1);
                self.arith(Some(d), (result, carry, overflow))
            }
            AluOp::Lsr(d) => self.high_word_op(d, |this, high| {
                let carry = this.get_bit(high, 0);
                (this.bd.ins().ushr_imm(high, 1), Some(carry))
            }),
            AluOp::Lsl(d) => self.high_word_op(d, |this, high| {
                let carry = this.get_bit(high, 23);
                let shifted = this.bd.ins().ishl_imm(high, 1);
                (this.bd.ins().band_imm(shifted, MASK24), Some(carry))
            }),
            AluOp::Ror(d) | AluOp::Rol(d) => self.high_word_op(d, |this, high| {
                let carry_in = this.carry_flag();
                let carry_in = this.bd.ins().uextend(ir::types::I32, carry_in);
                if matches!(op, AluOp::Ror(_)) {
                    let carry = this.get_bit(high, 0);
                    let shifted = this.bd.ins().ushr_imm(high, 1);
                    let top = this.bd.ins().ishl_imm(carry_in, 23);
                    (this.bd.ins().bor(shifted, top), Some(carry))
                } else {
                    let carry = this.get_bit(high, 23);
                    let shifted = this.bd.ins().ishl_imm(high, 1);
                    let shifted = this.bd.ins().bor(shifted, carry_in);
                    (this.bd.ins().band_imm(shifted, MASK24), Some(carry))
                }
            }),
            AluOp::Abs(d) | AluOp::Neg(d) => {
                let acc = self.get(acc_id(d));
                let negated = self.neg56(acc);
                let result = if matches!(op, AluOp::Abs(_)) {
                    let negative = self.bit55(acc);
                    self.bd.ins().select(negative, negated, acc)
                } else {
                    negated
                };

                // 0 - acc overflows only for the most negative value
                let both = self.bd.ins().band(acc, result);
                let overflow = self.bit55(both);
                self.arith_no_carry(d, result, overflow)
            }
            AluOp::Not(d) => self.high_word_op(d, |this, high| {
                (this.bd.ins().bxor_imm(high, MASK24), None)
            }),
            AluOp::Mul(mul) => self.multiply(mul),
            AluOp::Addr(_)
            | AluOp::Addl(_)
            | AluOp::Subr(_)
            | AluOp::Subl(_)
            | AluOp::Max
            | AluOp::Maxm => unreachable!("{op:?} is executed by the interpreter"),
        }
    }

    /// Applies an ALU outcome after the data move of its instruction.
    pub(super) fn apply(&mut self, outcome: Outcome) {
        if let Some((acc, value)) = outcome.acc {
            self.set(acc_id(acc), value);
        }

        if let Some(sr) = outcome.sr {
            self.set(RegId::Sr, sr);
        }

        if let Pending::Set(value) = outcome.pending {
            self.pending = Some(value);
        }
    }
}
