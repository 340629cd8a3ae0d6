//! The data ALU.
use super::arith::{self, arith_flags, arith_flags_no_carry, logic_flags, result_flags};
use dsp56k::ins::{AluOp, AluSrc, Mul};
use dsp56k::regs::{Acc, Registers, Status};
use dsp56k::{U24, U56};

#[inline(always)]
fn operand(regs: &Registers, src: AluSrc) -> U56 {
    match src {
        AluSrc::Acc(acc) => regs.acc(acc),
        AluSrc::X => U56::from_pair(regs.x()),
        AluSrc::Y => U56::from_pair(regs.y()),
        AluSrc::Reg(reg) => U56::from_word(regs.peek(reg)),
    }
}

#[inline(always)]
pub(super) fn with_status(regs: &mut Registers, f: impl FnOnce(&mut Registers, &mut Status)) {
    let mut status = regs.status();
    f(regs, &mut status);
    regs.set_status(status);
}

#[inline(always)]
fn abs(value: U56) -> U56 {
    if value.is_negative() {
        value.wrapping_neg()
    } else {
        value
    }
}

/// `d + s`, plus C if `with_carry`.
pub fn add(regs: &mut Registers, d: Acc, s: U56, with_carry: bool) {
    with_status(regs, |regs, status| {
        let carry = with_carry && status.carry();
        let (r, c, v) = arith::add(regs.acc(d), s, carry);
        regs.set_acc(d, r);
        arith_flags(status, r, c, v);
    });
}

pub fn sub(regs: &mut Registers, d: Acc, s: U56, with_borrow: bool) {
    with_status(regs, |regs, status| {
        let borrow = with_borrow && status.carry();
        let (r, c, v) = arith::sub(regs.acc(d), s, borrow);
        regs.set_acc(d, r);
        arith_flags(status, r, c, v);
    });
}

pub fn cmp(regs: &mut Registers, d: U56, s: U56) {
    with_status(regs, |_, status| {
        let (r, c, v) = arith::sub(d, s, false);
        arith_flags(status, r, c, v);
    });
}

/// AND, OR or EOR on the high word of an accumulator.
pub fn logic(regs: &mut Registers, d: Acc, s: U24, f: impl FnOnce(u32, u32) -> u32) {
    with_status(regs, |regs, status| {
        let acc = regs.acc(d);
        let high = U24::new(f(acc.high().value(), s.value()));
        regs.set_acc(d, acc.with_high(high));
        logic_flags(status, high);
    });
}

/// Stores a product into an accumulator, optionally accumulating and rounding.
pub fn multiply(regs: &mut Registers, d: Acc, product: U56, accumulate: bool, round: bool) {
    with_status(regs, |regs, status| {
        let (mut r, mut v) = if accumulate {
            let (r, _, v) = arith::add(regs.acc(d), product, false);
            (r, v)
        } else {
            (product, false)
        };

        if round {
            let (rounded, overflow) = arith::round(r, status.scaling(), status.rounding());
            r = rounded;
            v |= overflow;
        }

        regs.set_acc(d, r);
        arith_flags_no_carry(status, r, v);
    });
}

fn mul(regs: &mut Registers, mul: Mul) {
    let mut p = arith::product(regs.peek(mul.s1), regs.peek(mul.s2));
    if mul.negate {
        p = p.wrapping_neg();
    }

    multiply(regs, mul.dst, p, mul.accumulate, mul.round);
}

/// Shifts an accumulator right by `amount`, setting C to the last bit out.
pub fn shift_right(regs: &mut Registers, d: Acc, value: U56, amount: u32) {
    with_status(regs, |regs, status| {
        let (r, c) = arith::asr(value, amount);
        regs.set_acc(d, r);
        arith_flags(status, r, c, false);
    });
}

/// Shifts an accumulator left by `amount`, setting C to the last bit out and V if the sign
/// changed.
pub fn shift_left(regs: &mut Registers, d: Acc, value: U56, amount: u32) {
    with_status(regs, |regs, status| {
        let (r, c, v) = arith::shl(value, amount);
        regs.set_acc(d, r);
        arith_flags(status, r, c, v);
    });
}

/// Logical shift of the high word of an accumulator. Positive amounts shift left.
pub fn shift_logical(regs: &mut Registers, d: Acc, amount: i32) {
    with_status(regs, |regs, status| {
        let acc = regs.acc(d);
        let (high, c) = arith::lsh(acc.high(), amount);
        regs.set_acc(d, acc.with_high(high));
        status.set_carry(c);
        logic_flags(status, high);
    });
}

/// Executes the ALU half of a parallel instruction.
pub fn execute(regs: &mut Registers, op: AluOp) {
    match op {
        AluOp::None => (),
        AluOp::Add(s, d) | AluOp::Sub(s, d) | AluOp::Adc(s, d) | AluOp::Sbc(s, d) => {
            let s = operand(regs, s);
            match op {
                AluOp::Add(..) => add(regs, d, s, false),
                AluOp::Sub(..) => sub(regs, d, s, false),
                AluOp::Adc(..) => add(regs, d, s, true),
                _ => sub(regs, d, s, true),
            }
        }
        AluOp::Cmp(s, d) => {
            let (d, s) = (regs.acc(d), operand(regs, s));
            cmp(regs, d, s);
        }
        AluOp::Cmpm(s, d) => {
            let (d, s) = (abs(regs.acc(d)), abs(operand(regs, s)));
            cmp(regs, d, s);
        }
        AluOp::Tfr(s, d) => {
            let value = operand(regs, s);
            regs.set_acc(d, value);
        }
        AluOp::And(s, d) | AluOp::Or(s, d) | AluOp::Eor(s, d) => {
            let s = regs.peek(s);
            match op {
                AluOp::And(..) => logic(regs, d, s, |a, b| a & b),
                AluOp::Or(..) => logic(regs, d, s, |a, b| a | b),
                _ => logic(regs, d, s, |a, b| a ^ b),
            }
        }
        AluOp::Addr(d) | AluOp::Subr(d) => with_status(regs, |regs, status| {
            let (half, _) = arith::asr(regs.acc(d), 1);
            let s = regs.acc(d.other());
            let (r, c, v) = if matches!(op, AluOp::Addr(_)) {
                arith::add(half, s, false)
            } else {
                arith::sub(half, s, false)
            };

            regs.set_acc(d, r);
            arith_flags(status, r, c, v);
        }),
        AluOp::Addl(d) | AluOp::Subl(d) => with_status(regs, |regs, status| {
            let (double, _, shifted_out) = arith::shl(regs.acc(d), 1);
            let s = regs.acc(d.other());
            let (r, c, v) = if matches!(op, AluOp::Addl(_)) {
                arith::add(double, s, false)
            } else {
                arith::sub(double, s, false)
            };

            regs.set_acc(d, r);
            arith_flags(status, r, c, v || shifted_out);
        }),
        AluOp::Max | AluOp::Maxm => with_status(regs, |regs, status| {
            let (a, b) = if op == AluOp::Max {
                (regs.a, regs.b)
            } else {
                (abs(regs.a), abs(regs.b))
            };

            let transfer = a.signed() > b.signed();
            if transfer {
                regs.b = regs.a;
            }

            status.set_carry(!transfer);
        }),
        AluOp::Rnd(d) => with_status(regs, |regs, status| {
            let (r, v) = arith::round(regs.acc(d), status.scaling(), status.rounding());
            regs.set_acc(d, r);
            arith_flags_no_carry(status, r, v);
        }),
        AluOp::Tst(d) => with_status(regs, |regs, status| {
            result_flags(status, regs.acc(d));
            status.set_overflow(false);
            status.set_carry(false);
        }),
        AluOp::Clr(d) => with_status(regs, |regs, status| {
            regs.set_acc(d, U56::ZERO);
            status.set_extension(false);
            status.set_unnormalized(true);
            status.set_negative(false);
            status.set_zero(true);
            status.set_overflow(false);
        }),
        AluOp::Asr(d) => {
            let value = regs.acc(d);
            shift_right(regs, d, value, 1);
        }
        AluOp::Asl(d) => {
            let value = regs.acc(d);
            shift_left(regs, d, value, 1);
        }
        AluOp::Lsr(d) => shift_logical(regs, d, -1),
        AluOp::Lsl(d) => shift_logical(regs, d, 1),
        AluOp::Ror(d) | AluOp::Rol(d) => with_status(regs, |regs, status| {
            let acc = regs.acc(d);
            let high = acc.high().value();
            let carry_in = u32::from(status.carry());
            let (high, carry) = if matches!(op, AluOp::Ror(_)) {
                ((high >> 1) | (carry_in << 23), high & 1 != 0)
            } else {
                ((high << 1) | carry_in, high & (1 << 23) != 0)
            };

            let high = U24::new(high);
            regs.set_acc(d, acc.with_high(high));
            status.set_carry(carry);
            logic_flags(status, high);
        }),
        AluOp::Abs(d) | AluOp::Neg(d) => with_status(regs, |regs, status| {
            let value = regs.acc(d);
            let (r, v) = if op == AluOp::Abs(d) && !value.is_negative() {
                (value, false)
            } else {
                let (r, _, v) = arith::sub(U56::ZERO, value, false);
                (r, v)
            };

            regs.set_acc(d, r);
            arith_flags_no_carry(status, r, v);
        }),
        AluOp::Not(d) => with_status(regs, |regs, status| {
            let acc = regs.acc(d);
            let high = acc.high().not();
            regs.set_acc(d, acc.with_high(high));
            logic_flags(status, high);
        }),
        AluOp::Mul(m) => mul(regs, m),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use dsp56k::regs::Reg;

    fn flags(regs: &Registers) -> (bool, bool, bool, bool, bool, bool, bool) {
        let s = regs.status();
        (
            s.carry(),
            s.overflow(),
            s.zero(),
            s.negative(),
            s.unnormalized(),
            s.extension(),
            s.limit(),
        )
    }

    #[test]
    fn asl_sets_carry_overflow_and_extension() {
        let mut regs = Registers::default();
        regs.a = U56::new(0xAA_ABCD_EF12_3456);
        execute(&mut regs, AluOp::Asl(Acc::A));

        assert_eq!(regs.a, U56::new(0x55_579B_DE24_68AC));
        let (c, v, z, n, _, e, l) = flags(&regs);
        assert!(c && v && e && l);
        assert!(!z && !n);
    }

    #[test]
    fn add_other_accumulator() {
        let mut regs = Registers::default();
        regs.a = U56::from_word(U24::new(0x40_0000));
        regs.b = U56::from_word(U24::new(0x40_0000));
        execute(&mut regs, AluOp::Add(AluSrc::Acc(Acc::B), Acc::A));

        assert_eq!(regs.a, U56::new(0x00_8000_0000_0000));
        let (c, v, z, n, u, e, _) = flags(&regs);
        assert!(!c && !v && !z && !n);
        assert!(e && !u);
    }

    #[test]
    fn clear_and_test() {
        let mut regs = Registers::default();
        regs.b = U56::new(0x12_3456_789A_BCDE);
        execute(&mut regs, AluOp::Clr(Acc::B));
        assert_eq!(regs.b, U56::ZERO);
        assert!(regs.status().zero() && regs.status().unnormalized());

        regs.a = U56::from_word(U24::new(0x80_0000));
        regs.update_status(|s| s.set_carry(true));
        execute(&mut regs, AluOp::Tst(Acc::A));
        assert!(regs.status().negative() && !regs.status().carry());
    }

    #[test]
    fn logic_ops_touch_only_the_high_word() {
        let mut regs = Registers::default();
        regs.a = U56::new(0xFF_F0F0_F0_123456);
        regs.x0 = U24::new(0x0F_FF00);
        execute(&mut regs, AluOp::And(Reg::X0, Acc::A));
        assert_eq!(regs.a, U56::new(0xFF_00F0_00_123456));
        assert!(!regs.status().negative());

        execute(&mut regs, AluOp::Not(Acc::A));
        assert_eq!(regs.a.high(), U24::new(0xFF_0FFF));
        assert!(regs.status().negative());
    }

    #[test]
    fn rotate_through_carry() {
        let mut regs = Registers::default();
        regs.a = U56::from_word(U24::new(0x00_0001));
        execute(&mut regs, AluOp::Ror(Acc::A));
        assert_eq!(regs.a.high(), U24::ZERO);
        assert!(regs.status().carry() && regs.status().zero());

        execute(&mut regs, AluOp::Ror(Acc::A));
        assert_eq!(regs.a.high(), U24::new(0x80_0000));
        assert!(!regs.status().carry());
    }

    #[test]
    fn max_transfers_greater() {
        let mut regs = Registers::default();
        regs.a = U56::from_word(U24::new(0x10_0000));
        regs.b = U56::from_word(U24::new(0x08_0000));
        execute(&mut regs, AluOp::Max);
        assert_eq!(regs.b, regs.a);
        assert!(!regs.status().carry());

        regs.a = U56::from_word(U24::new(0xF0_0000));
        execute(&mut regs, AluOp::Maxm);
        assert_eq!(regs.b, U56::from_word(U24::new(0x10_0000)));
        assert!(regs.status().carry());
    }

    #[test]
    fn multiply_accumulate() {
        let mut regs = Registers::default();
        regs.x0 = U24::new(0x40_0000);
        regs.y0 = U24::new(0x40_0000);
        regs.a = U56::new(0x00_1000_0000_0000);

        // mac x0,y0,a
        let Some(AluOp::Mul(m)) = AluOp::decode(0b1101_0010) else {
            panic!("not a multiplication");
        };
        assert_eq!((m.s1, m.s2), (Reg::Y0, Reg::X0));

        execute(&mut regs, AluOp::Mul(m));
        assert_eq!(regs.a, U56::new(0x00_3000_0000_0000));
    }

    #[test]
    fn negate_minimum() {
        let mut regs = Registers::default();
        regs.a = U56::new(0x80_0000_0000_0000);
        execute(&mut regs, AluOp::Neg(Acc::A));
        assert_eq!(regs.a, U56::new(0x80_0000_0000_0000));
        assert!(regs.status().overflow());
    }
}
