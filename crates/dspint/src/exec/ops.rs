//! Data ALU instructions that don't take a parallel move.
use super::alu::{self, with_status};
use super::arith::{self, Signedness, arith_flags_no_carry, logic_flags, result_flags};
use super::{reg3, reg5};
use crate::Interpreter;
use dsp56k::ins::{Cond, fields};
use dsp56k::regs::{Acc, Reg};
use dsp56k::{Dsp, Ins, Opcode, U24, U56};

const MASK_48: u64 = (1 << 48) - 1;

/// The immediate operand of an instruction: the extension word if it has one, the `i` field
/// otherwise.
#[inline(always)]
fn immediate(ins: &Ins) -> U24 {
    if ins.len() == 2 {
        ins.ext
    } else {
        U24::new(ins.field(b'i'))
    }
}

#[inline(always)]
fn dst(ins: &Ins, letter: u8) -> Acc {
    Acc::new(ins.field(letter))
}

impl Interpreter {
    pub(super) fn add_imm(&mut self, dsp: &mut Dsp, ins: Ins) {
        alu::add(&mut dsp.regs, dst(&ins, b'd'), U56::from_word(immediate(&ins)), false);
    }

    pub(super) fn sub_imm(&mut self, dsp: &mut Dsp, ins: Ins) {
        alu::sub(&mut dsp.regs, dst(&ins, b'd'), U56::from_word(immediate(&ins)), false);
    }

    pub(super) fn cmp_imm(&mut self, dsp: &mut Dsp, ins: Ins) {
        let d = dsp.regs.acc(dst(&ins, b'd'));
        alu::cmp(&mut dsp.regs, d, U56::from_word(immediate(&ins)));
    }

    pub(super) fn logic_imm(&mut self, dsp: &mut Dsp, ins: Ins, f: impl FnOnce(u32, u32) -> u32) {
        alu::logic(&mut dsp.regs, dst(&ins, b'd'), immediate(&ins), f);
    }

    pub(super) fn inc_dec(&mut self, dsp: &mut Dsp, ins: Ins, inc: bool) {
        let d = dst(&ins, b'd');
        if inc {
            alu::add(&mut dsp.regs, d, U56::new(1), false);
        } else {
            alu::sub(&mut dsp.regs, d, U56::new(1), false);
        }
    }

    /// ANDI and ORI on one byte of SR or OMR.
    pub(super) fn andi_ori(&mut self, dsp: &mut Dsp, ins: Ins, and: bool) {
        let (reg, shift) = match ins.field(b'E') {
            0b00 => (Reg::Sr, 8),
            0b01 => (Reg::Sr, 0),
            0b10 => (Reg::Omr, 0),
            _ => (Reg::Omr, 8),
        };

        let imm = ins.field(b'i') << shift;
        let value = dsp.regs.peek(reg).value();
        let value = if and {
            value & (imm | !(0xFF << shift))
        } else {
            value | imm
        };

        dsp.regs.write(reg, U24::new(value));
    }

    /// `mpy`/`mac` with a shifted operand: `±S * 2^-n`.
    pub(super) fn mul_shift(&mut self, dsp: &mut Dsp, ins: Ins) {
        let src = dsp.regs.peek(fields::mul_shift_src(ins.field(b'Q')));
        let (mut product, _) = arith::asr(U56::from_word(src), ins.field(b's'));
        if ins.field(b'k') != 0 {
            product = product.wrapping_neg();
        }

        let word = ins.word.value();
        alu::multiply(
            &mut dsp.regs,
            dst(&ins, b'd'),
            product,
            word & 0b10 != 0,
            word & 0b01 != 0,
        );
    }

    /// `mpyi`/`maci` and their rounding forms: `±#xxxx * S`.
    pub(super) fn mul_imm(&mut self, dsp: &mut Dsp, ins: Ins) {
        let src = dsp.regs.peek(fields::data2(ins.field(b'q')));
        let mut product = arith::product(ins.ext, src);
        if ins.field(b'k') != 0 {
            product = product.wrapping_neg();
        }

        let word = ins.word.value();
        alu::multiply(
            &mut dsp.regs,
            dst(&ins, b'd'),
            product,
            word & 0b10 != 0,
            word & 0b01 != 0,
        );
    }

    /// Double precision multiply-accumulate: `D >> 24 ± S1 * S2`.
    pub(super) fn dmac(&mut self, dsp: &mut Dsp, ins: Ins) {
        let signedness = match (ins.field(b's'), ins.field(b'S')) {
            (0, 0) => Signedness::SignedSigned,
            (1, 1) => Signedness::UnsignedUnsigned,
            _ => Signedness::SignedUnsigned,
        };

        let (s1, s2) = fields::mul_pair4(ins.field(b'Q'));
        let (s1, s2) = (dsp.regs.peek(s1), dsp.regs.peek(s2));
        let mut product = arith::mixed_product(s1, s2, signedness);
        if ins.field(b'k') != 0 {
            product = product.wrapping_neg();
        }

        let d = dst(&ins, b'd');
        with_status(&mut dsp.regs, |regs, status| {
            let (shifted, _) = arith::asr(regs.acc(d), 24);
            let (r, _, v) = arith::add(shifted, product, false);
            regs.set_acc(d, r);
            arith_flags_no_carry(status, r, v);
        });
    }

    /// `macsu`, `macuu`, `mpysu` and `mpyuu`.
    pub(super) fn mul_su(&mut self, dsp: &mut Dsp, ins: Ins, accumulate: bool) {
        let signedness = if ins.field(b's') == 0 {
            Signedness::SignedUnsigned
        } else {
            Signedness::UnsignedUnsigned
        };

        let (s1, s2) = fields::mul_pair4(ins.field(b'Q'));
        let (s1, s2) = (dsp.regs.peek(s1), dsp.regs.peek(s2));
        let mut product = arith::mixed_product(s1, s2, signedness);
        if ins.field(b'k') != 0 {
            product = product.wrapping_neg();
        }

        alu::multiply(&mut dsp.regs, dst(&ins, b'd'), product, accumulate, false);
    }

    pub(super) fn div(&mut self, dsp: &mut Dsp, ins: Ins) {
        let d = dst(&ins, b'd');
        let divisor = dsp.regs.peek(fields::data2(ins.field(b'J')));
        with_status(&mut dsp.regs, |regs, status| {
            let (r, c, v) = arith::div_step(regs.acc(d), divisor, status.carry());
            regs.set_acc(d, r);
            status.set_carry(c);
            status.set_overflow(v);
            status.set_limit(status.limit() || v);
        });
    }

    /// One normalization step, counting the shifts in Rn.
    pub(super) fn norm(&mut self, dsp: &mut Dsp, ins: Ins) {
        let d = dst(&ins, b'd');
        let index = ins.field(b'R') as usize;
        let status = dsp.regs.status();
        let value = dsp.regs.acc(d);
        let one = U24::new(1);

        if !status.extension() && status.unnormalized() && !status.zero() {
            alu::shift_left(&mut dsp.regs, d, value, 1);
            dsp.regs.r[index] = dsp.regs.r[index].wrapping_sub(one);
        } else if status.extension() {
            alu::shift_right(&mut dsp.regs, d, value, 1);
            dsp.regs.r[index] = dsp.regs.r[index].wrapping_add(one);
        } else {
            return;
        }

        let carry = status.carry();
        dsp.regs.update_status(|s| s.set_carry(carry));
    }

    /// Shifts by a signed amount: right if positive, left if negative.
    pub(super) fn normf(&mut self, dsp: &mut Dsp, ins: Ins) {
        let d = dst(&ins, b'D');
        let amount = dsp.regs.peek(reg3(ins.field(b'S'))).signed();
        let value = dsp.regs.acc(d);
        if amount >= 0 {
            alu::shift_right(&mut dsp.regs, d, value, amount.unsigned_abs());
        } else {
            alu::shift_left(&mut dsp.regs, d, value, amount.unsigned_abs());
        }
    }

    /// Count leading bits: the shift that would normalize S.
    pub(super) fn clb(&mut self, dsp: &mut Dsp, ins: Ins) {
        let value = dsp.regs.acc(dst(&ins, b'S'));
        let count = if value == U56::ZERO {
            0
        } else {
            9 - arith::leading_bits(value) as i32
        };

        let d = dst(&ins, b'D');
        let word = U24::from_signed(count);
        with_status(&mut dsp.regs, |regs, status| {
            regs.set_acc(d, U56::from_word(word));
            logic_flags(status, word);
        });
    }

    pub(super) fn merge(&mut self, dsp: &mut Dsp, ins: Ins) {
        let src = dsp.regs.peek(reg3(ins.field(b'S'))).value();
        let d = dst(&ins, b'D');
        with_status(&mut dsp.regs, |regs, status| {
            let acc = regs.acc(d);
            let high = U24::new(((src & 0xFFF) << 12) | (acc.high().value() & 0xFFF));
            regs.set_acc(d, acc.with_high(high));
            logic_flags(status, high);
        });
    }

    pub(super) fn extract(&mut self, dsp: &mut Dsp, ins: Ins, signed: bool) {
        let control = if ins.len() == 2 {
            ins.ext
        } else {
            dsp.regs.peek(reg3(ins.field(b'S')))
        };

        let source = dsp.regs.acc(dst(&ins, b's'));
        let d = dst(&ins, b'D');
        with_status(&mut dsp.regs, |regs, status| {
            let r = arith::extract(source, control, signed);
            regs.set_acc(d, r);
            result_flags(status, r);
            status.set_carry(false);
            status.set_overflow(false);
        });
    }

    pub(super) fn insert(&mut self, dsp: &mut Dsp, ins: Ins) {
        let control = if ins.len() == 2 {
            ins.ext
        } else {
            dsp.regs.peek(reg3(ins.field(b'S')))
        };

        let source = dsp.regs.peek(reg3(ins.field(b'q')));
        let d = dst(&ins, b'D');
        with_status(&mut dsp.regs, |regs, status| {
            let r = arith::insert(regs.acc(d), source, control);
            regs.set_acc(d, r);
            result_flags(status, r);
            status.set_carry(false);
            status.set_overflow(false);
        });
    }

    pub(super) fn shift_imm(&mut self, dsp: &mut Dsp, ins: Ins, left: bool) {
        let value = dsp.regs.acc(dst(&ins, b'S'));
        let amount = ins.field(b'i');
        let d = dst(&ins, b'D');
        if left {
            alu::shift_left(&mut dsp.regs, d, value, amount);
        } else {
            alu::shift_right(&mut dsp.regs, d, value, amount);
        }
    }

    pub(super) fn shift_reg(&mut self, dsp: &mut Dsp, ins: Ins, left: bool) {
        let value = dsp.regs.acc(dst(&ins, b's'));
        let amount = dsp.regs.peek(reg3(ins.field(b'S'))).value() & 0x3F;
        let d = dst(&ins, b'D');
        if left {
            alu::shift_left(&mut dsp.regs, d, value, amount);
        } else {
            alu::shift_right(&mut dsp.regs, d, value, amount);
        }
    }

    pub(super) fn logical_imm(&mut self, dsp: &mut Dsp, ins: Ins, left: bool) {
        let amount = ins.field(b'i') as i32;
        let amount = if left { amount } else { -amount };
        alu::shift_logical(&mut dsp.regs, dst(&ins, b'D'), amount);
    }

    pub(super) fn logical_reg(&mut self, dsp: &mut Dsp, ins: Ins, left: bool) {
        let amount = (dsp.regs.peek(reg3(ins.field(b'S'))).value() & 0x1F) as i32;
        let amount = if left { amount } else { -amount };
        alu::shift_logical(&mut dsp.regs, dst(&ins, b'D'), amount);
    }

    /// Unsigned compare of the low 48 bits.
    pub(super) fn cmpu(&mut self, dsp: &mut Dsp, ins: Ins) {
        let d = dst(&ins, b'd');
        let source = match ins.field(b'S') {
            0 => dsp.regs.acc(d.other()),
            ggg => U56::from_word(dsp.regs.peek(fields::data2(ggg))),
        };

        let a = dsp.regs.acc(d).value() & MASK_48;
        let b = source.value() & MASK_48;
        let diff = a.wrapping_sub(b) & MASK_48;
        dsp.regs.update_status(|s| {
            s.set_carry(b > a);
            s.set_zero(a == b);
            s.set_negative(diff >> 47 != 0);
            s.set_overflow(false);
        });
    }

    /// Conditional transfers between data ALU registers and address registers.
    pub(super) fn tcc(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        if !Cond::new(ins.field(b'C')).eval(dsp.regs.status()) {
            return;
        }

        if opcode != Opcode::TccR {
            let d = dst(&ins, b'd');
            let value = match fields::tcc_src(ins.field(b'J'), d) {
                Some(Reg::A) => dsp.regs.a,
                Some(Reg::B) => dsp.regs.b,
                Some(reg) => U56::from_word(dsp.regs.peek(reg)),
                None => unreachable!("reserved transfer source"),
            };

            dsp.regs.set_acc(d, value);
        }

        if opcode != Opcode::TccAcc {
            let src = dsp.regs.r[ins.field(b't') as usize];
            dsp.regs.r[ins.field(b'T') as usize] = src;
        }
    }

    /// LRA with a register or a displacement: `PC + offset -> D`.
    pub(super) fn lra(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        let offset = if opcode == Opcode::LraRn {
            dsp.regs.r[ins.field(b'R') as usize]
        } else {
            ins.ext
        };

        let value = self.relative(offset);
        dsp.regs.write(reg5(ins.field(b'd')), value);
    }
}

#[cfg(test)]
mod test {
    use crate::test::{dsp_with, run};
    use dsp56k::regs::Reg;
    use dsp56k::{U24, U56};

    #[test]
    fn add_short_immediate() {
        // add #$10,a
        let mut dsp = dsp_with(&[0x01_5080]);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.a, U56::new(0x00_000010_000000));
    }

    #[test]
    fn cmp_long_immediate_sets_zero() {
        // cmp #$123456,b
        let mut dsp = dsp_with(&[0x01_40CD, 0x12_3456]);
        dsp.regs.b = U56::from_word(U24::new(0x12_3456));
        run(&mut dsp, 1);
        assert!(dsp.regs.status().zero());
        assert_eq!(dsp.regs.pc, U24::new(2));
    }

    #[test]
    fn andi_and_ori_on_status_bytes() {
        // andi #$FE,ccr
        // andi #$FC,mr
        // ori #$02,mr
        let mut dsp = dsp_with(&[0x00_FEB9, 0x00_FCB8, 0x00_02F8]);
        dsp.regs.update_status(|s| s.set_carry(true));
        run(&mut dsp, 3);
        assert!(!dsp.regs.status().carry());
        assert_eq!(dsp.regs.status().interrupt_mask().value(), 2);
    }

    #[test]
    fn shift_immediate() {
        // asl #4,a,b
        let mut dsp = dsp_with(&[0x0C_1D09]);
        dsp.regs.a = U56::new(0x00_0123_4500_0000);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.b, U56::new(0x00_1234_5000_0000));
        assert!(!dsp.regs.status().carry());
    }

    #[test]
    fn normalization_steps() {
        // norm r0,a
        let mut dsp = dsp_with(&[0x01_D815, 0x01_D815]);
        dsp.regs.a = U56::new(0x00_1000_0000_0000);
        dsp.regs.update_status(|s| {
            s.set_unnormalized(true);
            s.set_extension(false);
            s.set_zero(false);
        });

        run(&mut dsp, 2);
        assert_eq!(dsp.regs.a, U56::new(0x00_4000_0000_0000));
        assert_eq!(dsp.regs.r[0], U24::new(0xFF_FFFE));
    }

    #[test]
    fn extract_and_insert_fields() {
        // extractu #$008010,a,b
        let mut dsp = dsp_with(&[0x0C_1881, 0x00_8010]);
        dsp.regs.a = U56::new(0x00_00AB_CD12_3456);
        run(&mut dsp, 1);
        // 8 bits at offset 16
        assert_eq!(dsp.regs.b, U56::new(0x12));

        // insert #$004008,x0,a
        let mut dsp = dsp_with(&[0x0C_1940, 0x00_4008]);
        dsp.regs.x0 = U24::new(0x00_000F);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.a, U56::new(0xF00));
    }

    #[test]
    fn division_step() {
        // div x0,a
        let mut dsp = dsp_with(&[0x01_8040]);
        dsp.regs.a = U56::new(0x00_1000_0000_0000);
        dsp.regs.x0 = U24::new(0x40_0000);
        run(&mut dsp, 1);
        // 2A - X0 is negative, so the quotient bit is clear
        assert_eq!(dsp.regs.a, U56::new(0xFF_E000_0000_0000));
        assert!(!dsp.regs.status().carry());
    }

    #[test]
    fn clb_counts_sign_bits() {
        // clb a,b
        let mut dsp = dsp_with(&[0x0C_1E01]);
        dsp.regs.a = U56::new(0x00_0800_0000_0000);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.b.high(), U24::from_signed(-3));
        assert_eq!(dsp.regs.peek(Reg::B2), U24::MAX);
    }
}
