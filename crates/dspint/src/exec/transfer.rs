//! Moves that aren't part of a parallel instruction.
use super::moves::load;
use super::{ctrl5, io_high, io_low, reg4, reg6, sext};
use crate::Interpreter;
use dsp56k::agu::{self, Ea};
use dsp56k::ins::fields;
use dsp56k::regs::{Acc, Reg};
use dsp56k::{Dsp, Ins, Opcode, Space, U24};

impl Interpreter {
    /// Resolves the instruction's effective address, returning it with the address.
    fn operand(&self, dsp: &mut Dsp, ins: &Ins) -> (Ea, U24) {
        match ins.ea() {
            Some(ea) => (ea, ea.resolve(&mut dsp.regs, ins.ext)),
            None => unreachable!("decoder rejects reserved effective addresses"),
        }
    }

    /// Moves a register to or from memory. Registers are read before the effective address
    /// updates its address register.
    fn exchange(&self, dsp: &mut Dsp, ins: &Ins, space: Space, reg: Reg) {
        if ins.field(b'W') == 1 {
            let (ea, addr) = self.operand(dsp, ins);
            let value = load(dsp, space, ea, addr);
            dsp.regs.write(reg, value);
        } else {
            let value = dsp.regs.read(reg);
            let (_, addr) = self.operand(dsp, ins);
            dsp.write(space, addr, value);
        }
    }

    /// Moves a register to or from a fixed address.
    fn exchange_at(&self, dsp: &mut Dsp, load: bool, space: Space, addr: U24, reg: Reg) {
        if load {
            let value = dsp.read(space, addr);
            dsp.regs.write(reg, value);
        } else {
            let value = dsp.regs.read(reg);
            dsp.write(space, addr, value);
        }
    }

    /// `X:(Rn+xx)` and `Y:(Rn+xx)` with a short displacement.
    pub(super) fn move_short(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        let space = if opcode == Opcode::MovexShort { Space::X } else { Space::Y };
        let base = dsp.regs.r[ins.field(b'R') as usize];
        let addr = base.wrapping_add(sext(ins.field(b'a'), 7));
        let reg = reg4(ins.field(b'D'));
        self.exchange_at(dsp, ins.field(b'W') == 1, space, addr, reg);
    }

    /// `X:(Rn+xxxx)` and `Y:(Rn+xxxx)` with a long displacement.
    pub(super) fn move_long(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        let space = if opcode == Opcode::MovexLong { Space::X } else { Space::Y };
        let base = dsp.regs.r[ins.field(b'R') as usize];
        let addr = base.wrapping_add(ins.ext);
        let reg = reg6(ins.field(b'D'));
        self.exchange_at(dsp, ins.field(b'W') == 1, space, addr, reg);
    }

    /// LUA with a short displacement: `Rn + aa -> D`, with the addressing mode of `Mn`.
    pub(super) fn lua_rn(&mut self, dsp: &mut Dsp, ins: Ins) {
        let index = ins.field(b'R') as usize;
        let (r, m) = (dsp.regs.r[index], dsp.regs.m[index]);
        let value = agu::update(r, sext(ins.field(b'a'), 7), m, true);
        dsp.regs.write(fields::addr4(ins.field(b'd')), value);
    }

    /// LUA with an update mode: the updated address register goes to D, Rn is unchanged.
    pub(super) fn lua_ea(&mut self, dsp: &mut Dsp, ins: Ins) {
        let ea = Ea::decode_update(ins.field(b'M'), ins.field(b'R') as u8);
        let value = ea.updated(&dsp.regs);
        dsp.regs.write(fields::addr4(ins.field(b'd')), value);
    }

    pub(super) fn movec_reg(&mut self, dsp: &mut Dsp, ins: Ins) {
        let ctrl = ctrl5(ins.field(b'd'));
        let reg = reg6(ins.field(b'e'));
        let (src, dst) = if ins.field(b'W') == 1 {
            (reg, ctrl)
        } else {
            (ctrl, reg)
        };

        let value = dsp.regs.read(src);
        dsp.regs.write(dst, value);
    }

    pub(super) fn movec_mem(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        let ctrl = ctrl5(ins.field(b'd'));
        let space = Space::data(ins.field(b's'));
        if opcode == Opcode::MovecEa {
            self.exchange(dsp, &ins, space, ctrl);
        } else {
            let addr = U24::new(ins.field(b'a'));
            self.exchange_at(dsp, ins.field(b'W') == 1, space, addr, ctrl);
        }
    }

    pub(super) fn movec_imm(&mut self, dsp: &mut Dsp, ins: Ins) {
        let ctrl = ctrl5(ins.field(b'd'));
        dsp.regs.write(ctrl, U24::new(ins.field(b'i')));
    }

    pub(super) fn movem(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        let reg = reg6(ins.field(b'd'));
        if opcode == Opcode::MovemEa {
            self.exchange(dsp, &ins, Space::P, reg);
        } else {
            let addr = U24::new(ins.field(b'a'));
            self.exchange_at(dsp, ins.field(b'W') == 1, Space::P, addr, reg);
        }
    }

    /// The peripheral operand of a MOVEP.
    fn peripheral(&self, ins: &Ins, opcode: Opcode) -> (Space, U24) {
        match opcode {
            Opcode::MovepQqReg | Opcode::MovepQqEa => (Space::X, io_low(ins.field(b'q'))),
            Opcode::MovepQqRegY | Opcode::MovepQqEaY => (Space::Y, io_low(ins.field(b'q'))),
            _ => (Space::data(ins.field(b's')), io_high(ins.field(b'p'))),
        }
    }

    /// MOVEP between a register and a peripheral. `W` set writes the peripheral.
    pub(super) fn movep_reg(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        let (space, addr) = self.peripheral(&ins, opcode);
        let reg = reg6(ins.field(b'd'));
        self.exchange_at(dsp, ins.field(b'W') == 0, space, addr, reg);
    }

    /// MOVEP between memory and a peripheral. `W` set writes the peripheral.
    pub(super) fn movep_mem(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        let (periph_space, periph_addr) = self.peripheral(&ins, opcode);
        let space = if opcode == Opcode::MovepPpP {
            Space::P
        } else {
            Space::data(ins.field(b'S'))
        };

        if ins.field(b'W') == 1 {
            let (ea, addr) = self.operand(dsp, &ins);
            let value = load(dsp, space, ea, addr);
            dsp.write(periph_space, periph_addr, value);
        } else {
            let value = dsp.read(periph_space, periph_addr);
            let (_, addr) = self.operand(dsp, &ins);
            dsp.write(space, addr, value);
        }
    }

    /// Viterbi shift left: `S1 -> X:ea`, `S0 << 1 | i -> Y:ea`.
    pub(super) fn vsl(&mut self, dsp: &mut Dsp, ins: Ins) {
        let acc = dsp.regs.acc(Acc::new(ins.field(b'S')));
        let low = U24::new((acc.low().value() << 1) | ins.field(b'i'));
        let addr = self.ea_addr(dsp, &ins);
        dsp.write(Space::X, addr, acc.high());
        dsp.write(Space::Y, addr, low);
    }
}

#[cfg(test)]
mod test {
    use crate::test::{dsp_with, run};
    use dsp56k::{Space, U24, U56};

    #[test]
    fn movec_to_and_from_memory() {
        // movec x:(r0)+,m1
        // movec m1,y:(r0)+
        let mut dsp = dsp_with(&[0x05_D821, 0x05_5861]);
        dsp.mem.write(Space::X, U24::ZERO, U24::new(0x00_00FF));
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.m[1], U24::new(0xFF));
        assert_eq!(dsp.regs.r[0], U24::new(1));

        run(&mut dsp, 1);
        assert_eq!(dsp.mem.read(Space::Y, U24::new(1)), U24::new(0xFF));
    }

    #[test]
    fn movec_immediate_sets_loop_count() {
        // movec #$20,lc
        let mut dsp = dsp_with(&[0x05_20BF]);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.lc, U24::new(0x20));
    }

    #[test]
    fn movem_writes_program_memory() {
        // movem x0,p:$30
        let mut dsp = dsp_with(&[0x07_3004]);
        dsp.regs.x0 = U24::new(0x12_3456);
        run(&mut dsp, 1);
        assert_eq!(dsp.mem.read(Space::P, U24::new(0x30)), U24::new(0x12_3456));
        assert_eq!(dsp.mem.take_program_writes(), vec![0x30]);
    }

    #[test]
    fn movep_to_peripheral() {
        // movep x0,x:$ffffc5
        let mut dsp = dsp_with(&[0x08_C405]);
        dsp.regs.x0 = U24::new(0xAB_CDEF);
        run(&mut dsp, 1);
        assert_eq!(dsp.inspect(Space::X, U24::new(0xFF_FFC5)), U24::new(0xAB_CDEF));
    }

    #[test]
    fn short_displacement_moves() {
        // move x:(r2-1),a
        let mut dsp = dsp_with(&[0x03_FADE]);
        dsp.regs.r[2] = U24::new(0x10);
        dsp.mem.write(Space::X, U24::new(0x0F), U24::new(0x40_0000));
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.a, U56::new(0x00_4000_0000_0000));
        assert_eq!(dsp.regs.r[2], U24::new(0x10));
    }

    #[test]
    fn load_updated_address() {
        // lua (r1)+n1,r3
        let mut dsp = dsp_with(&[0x04_4913]);
        dsp.regs.r[1] = U24::new(0x100);
        dsp.regs.n[1] = U24::new(0x10);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.r[3], U24::new(0x110));
        assert_eq!(dsp.regs.r[1], U24::new(0x100));
    }
}
