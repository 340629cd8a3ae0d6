//! Bit manipulation and bit test branches.
use super::flow::Target;
use super::{io_high, io_low, reg6};
use crate::Interpreter;
use dsp56k::regs::Reg;
use dsp56k::{Decoded, Dsp, Ins, Space, U24};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BitOp {
    Clear,
    Set,
    Change,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BitTest {
    Clear,
    Set,
}

/// Where the tested word lives.
#[derive(Debug, Clone, Copy)]
enum Location {
    Mem(Space, U24),
    Reg(Reg),
}

impl Interpreter {
    fn bit_location(&self, dsp: &mut Dsp, ins: &Ins) -> Location {
        let Decoded::Single(opcode) = ins.decoded else {
            unreachable!("bit instructions are never parallel");
        };

        let info = opcode.info();
        let space = Space::data(ins.field(b'S'));
        if info.field_mask(b'D') != 0 {
            Location::Reg(reg6(ins.field(b'D')))
        } else if info.has_ea() {
            Location::Mem(space, self.ea_addr(dsp, ins))
        } else if info.field_mask(b'p') != 0 {
            Location::Mem(space, io_high(ins.field(b'p')))
        } else if info.field_mask(b'q') != 0 {
            Location::Mem(space, io_low(ins.field(b'q')))
        } else {
            Location::Mem(space, U24::new(ins.field(b'a')))
        }
    }

    fn bit_read(&self, dsp: &mut Dsp, location: Location) -> U24 {
        match location {
            Location::Mem(space, addr) => dsp.read(space, addr),
            Location::Reg(reg) => dsp.regs.read(reg),
        }
    }

    /// BCLR, BSET, BCHG and BTST. C receives the bit as it was before the operation.
    pub(super) fn bit_op(&mut self, dsp: &mut Dsp, ins: Ins, op: BitOp) {
        let bit = ins.field(b'b') & 0x1F;
        let location = self.bit_location(dsp, &ins);
        let value = self.bit_read(dsp, location);

        let old = value.bit(bit);
        dsp.regs.update_status(|s| s.set_carry(old));

        let value = match op {
            BitOp::Clear => value.with_bit(bit, false),
            BitOp::Set => value.with_bit(bit, true),
            BitOp::Change => value.with_bit(bit, !old),
            BitOp::Test => return,
        };

        match location {
            Location::Mem(space, addr) => dsp.write(space, addr, value),
            Location::Reg(reg) => dsp.regs.write(reg, value),
        }
    }

    /// JCLR, JSET, BRCLR and friends.
    pub(super) fn bit_branch(&mut self, dsp: &mut Dsp, ins: Ins, test: BitTest, target: Target) {
        let bit = ins.field(b'b') & 0x1F;
        let location = self.bit_location(dsp, &ins);
        let value = self.bit_read(dsp, location);

        if value.bit(bit) == (test == BitTest::Set) {
            self.transfer(dsp, target, ins.ext);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::test::{dsp_with, run};
    use dsp56k::{Space, U24};

    #[test]
    fn set_and_clear_memory_bits() {
        // bset #3,x:$10
        // bclr #0,y:$11
        let mut dsp = dsp_with(&[0x0A_1023, 0x0A_1140]);
        dsp.mem.write(Space::Y, U24::new(0x11), U24::new(0x01));
        run(&mut dsp, 2);

        assert_eq!(dsp.mem.read(Space::X, U24::new(0x10)), U24::new(0x08));
        assert_eq!(dsp.mem.read(Space::Y, U24::new(0x11)), U24::ZERO);
        assert!(dsp.regs.status().carry());
    }

    #[test]
    fn test_register_bit() {
        // btst #23,x0
        let mut dsp = dsp_with(&[0x0B_C477]);
        dsp.regs.x0 = U24::new(0x80_0000);
        run(&mut dsp, 1);
        assert!(dsp.regs.status().carry());
        assert_eq!(dsp.regs.x0, U24::new(0x80_0000));
    }

    #[test]
    fn jump_if_bit_set() {
        // jset #1,x0,$20
        let mut dsp = dsp_with(&[0x0A_C421, 0x00_0020]);
        dsp.regs.x0 = U24::new(0b10);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.pc, U24::new(0x20));

        let mut dsp = dsp_with(&[0x0A_C421, 0x00_0020]);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.pc, U24::new(2));
    }

    #[test]
    fn relative_branch_if_bit_clear() {
        // brclr #5,x:$ffffc4,*+$10
        let mut dsp = dsp_with(&[0x0C_C405, 0x00_0010]);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.pc, U24::new(0x10));
    }
}
