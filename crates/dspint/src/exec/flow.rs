//! Jumps, branches, subroutines, hardware loops and exceptions.
use super::{reg6, sext};
use crate::{Interpreter, end_loop};
use dsp56k::ins::Flags;
use dsp56k::{Dsp, Ins, Opcode, RunState, Space, U24};
use tracing::debug;

/// How a taken branch reaches its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Target {
    /// Absolute destination.
    Jump,
    /// Absolute destination, pushing a return address.
    Call,
    /// Destination relative to the branch.
    Branch,
    /// Destination relative to the branch, pushing a return address.
    BranchCall,
}

impl Interpreter {
    /// Transfers control to `operand` as `target` describes.
    pub(super) fn transfer(&mut self, dsp: &mut Dsp, target: Target, operand: U24) {
        let destination = match target {
            Target::Jump | Target::Call => operand,
            Target::Branch | Target::BranchCall => self.relative(operand),
        };

        if matches!(target, Target::Call | Target::BranchCall) {
            let (next, sr) = (self.next, dsp.regs.sr);
            dsp.regs.push(next, sr);
        }

        self.next = destination;
    }

    #[inline(always)]
    fn condition_holds(&self, dsp: &Dsp, ins: &Ins, opcode: Opcode) -> bool {
        !opcode.info().flags.contains(Flags::COND) || ins.cond().eval(dsp.regs.status())
    }

    pub(super) fn jump_abs(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode, call: bool) {
        let destination = if opcode.info().field_mask(b'a') != 0 {
            U24::new(ins.field(b'a'))
        } else {
            self.ea_addr(dsp, &ins)
        };

        if self.condition_holds(dsp, &ins, opcode) {
            let target = if call { Target::Call } else { Target::Jump };
            self.transfer(dsp, target, destination);
        }
    }

    pub(super) fn branch(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode, target: Target) {
        let displacement = match opcode {
            Opcode::BraShort | Opcode::BccShort | Opcode::BsrShort | Opcode::BsccShort => {
                sext(ins.field(b'a'), 9)
            }
            Opcode::BraRn | Opcode::BccRn | Opcode::BsrRn | Opcode::BsccRn => {
                dsp.regs.r[ins.field(b'R') as usize]
            }
            _ => ins.ext,
        };

        if self.condition_holds(dsp, &ins, opcode) {
            self.transfer(dsp, target, displacement);
        }
    }

    pub(super) fn rts(&mut self, dsp: &mut Dsp) {
        let (pc, _) = dsp.regs.pop();
        self.next = pc;
    }

    pub(super) fn rti(&mut self, dsp: &mut Dsp) {
        let (pc, sr) = dsp.regs.pop();
        dsp.regs.write(dsp56k::regs::Reg::Sr, sr);
        self.next = pc;
    }

    /// Enters an exception handler as if it had been raised after this instruction.
    pub(super) fn exception(&mut self, dsp: &mut Dsp, vector: u32) {
        dsp.regs.pc = self.next;
        dsp.raise(vector, 3);
        self.next = dsp.regs.pc;
    }

    pub(super) fn trapcc(&mut self, dsp: &mut Dsp, ins: Ins) {
        if ins.cond().eval(dsp.regs.status()) {
            self.exception(dsp, dsp56k::TRAP_VECTOR);
        }
    }

    pub(super) fn reset(&mut self) {
        debug!("RESET at {}: peripherals are not modelled", self.pc);
    }

    pub(super) fn halt(&mut self, dsp: &mut Dsp, state: RunState) {
        debug!("{state:?} at {}", self.pc);
        dsp.state = state;
    }

    pub(super) fn debug(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        if self.condition_holds(dsp, &ins, opcode) {
            debug!("debug request at {}", self.pc);
        }
    }

    pub(super) fn plock(&mut self, dsp: &mut Dsp, ins: Ins, lock: bool) {
        let addr = self.ea_addr(dsp, &ins).value();
        self.lock_sector(dsp, addr, lock);
    }

    pub(super) fn plockr(&mut self, dsp: &mut Dsp, ins: Ins, lock: bool) {
        let addr = self.relative(ins.ext).value();
        self.lock_sector(dsp, addr, lock);
    }

    fn lock_sector(&self, dsp: &mut Dsp, addr: u32, lock: bool) {
        if !lock {
            dsp.icache.unlock(addr);
        } else if !dsp.icache.lock(addr) {
            debug!("no cache sector left to lock for {addr:06X}");
        }
    }

    /// Reads the count operand of DO, DOR and REP.
    fn loop_count(&mut self, dsp: &mut Dsp, ins: &Ins, opcode: Opcode) -> U24 {
        match opcode {
            Opcode::DoImm | Opcode::DorImm | Opcode::RepImm => {
                U24::new((ins.field(b'h') << 8) | ins.field(b'i'))
            }
            Opcode::DoReg | Opcode::DorReg | Opcode::RepReg => {
                dsp.regs.read(reg6(ins.field(b'D')))
            }
            Opcode::DoAa | Opcode::DorAa | Opcode::RepAa => {
                dsp.read(Space::data(ins.field(b'S')), U24::new(ins.field(b'a')))
            }
            _ => {
                let addr = self.ea_addr(dsp, ins);
                dsp.read(Space::data(ins.field(b'S')), addr)
            }
        }
    }

    /// Pushes a loop frame and arms the loop. A `None` count loops forever.
    fn start_loop(&mut self, dsp: &mut Dsp, count: Option<U24>, end: U24) {
        if count == Some(U24::ZERO) {
            debug!("loop at {} has a count of zero, skipping it", self.pc);
            self.next = end.wrapping_add(U24::new(1));
            return;
        }

        let regs = &mut dsp.regs;
        regs.push(regs.la, regs.lc);
        if let Some(count) = count {
            regs.lc = count;
        }

        regs.la = end;
        regs.push(self.next, regs.sr);
        regs.update_status(|s| {
            s.set_loop_flag(true);
            s.set_forever(count.is_none());
        });
    }

    pub(super) fn do_loop(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        let count = self.loop_count(dsp, &ins, opcode);
        let end = match opcode {
            Opcode::DorEa | Opcode::DorAa | Opcode::DorImm | Opcode::DorReg => {
                self.relative(ins.ext)
            }
            _ => ins.ext,
        };

        self.start_loop(dsp, Some(count), end);
    }

    pub(super) fn do_forever(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        let end = if opcode == Opcode::DorForever {
            self.relative(ins.ext)
        } else {
            ins.ext
        };

        self.start_loop(dsp, None, end);
    }

    pub(super) fn rep(&mut self, dsp: &mut Dsp, ins: Ins, opcode: Opcode) {
        let count = self.loop_count(dsp, &ins, opcode);
        if count == U24::ZERO {
            // the repeated instruction is skipped entirely
            let word = dsp.mem.read(Space::P, self.next);
            let len = dsp56k::ins::decode(word).map_or(1, |decoded| decoded.len(word));
            self.next = self.next.wrapping_add(U24::new(len));
            self.span += len;
            return;
        }

        let regs = &mut dsp.regs;
        regs.rep_lc = regs.lc;
        regs.lc = count;
        regs.rep_active = 1;
    }

    /// Exits the active hardware loop if the condition holds.
    pub(super) fn brk(&mut self, dsp: &mut Dsp, ins: Ins) {
        if ins.cond().eval(dsp.regs.status()) {
            self.next = dsp.regs.la.wrapping_add(U24::new(1));
            end_loop(&mut dsp.regs);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::test::{dsp_with, run};
    use dsp56k::{RunState, U24};

    #[test]
    fn subroutine_call_and_return() {
        // 0: jsr $10
        // 1: nop
        // 10: rts
        let mut program = vec![0x00_0000; 0x11];
        program[0] = 0x0D_0010;
        program[0x10] = 0x00_000C;
        let mut dsp = dsp_with(&program);

        run(&mut dsp, 1);
        assert_eq!(dsp.regs.pc, U24::new(0x10));
        assert_eq!(dsp.regs.stack_index(), 1);
        assert_eq!(dsp.regs.ssh(), U24::new(1));

        run(&mut dsp, 1);
        assert_eq!(dsp.regs.pc, U24::new(1));
        assert_eq!(dsp.regs.stack_index(), 0);
    }

    #[test]
    fn short_branch_backwards() {
        // 0: nop
        // 1: bra *-1
        let mut dsp = dsp_with(&[0x00_0000, 0x05_0FDF]);
        run(&mut dsp, 2);
        assert_eq!(dsp.regs.pc, U24::ZERO);
    }

    #[test]
    fn conditional_jump() {
        // jeq $100
        let mut dsp = dsp_with(&[0x0E_A100]);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.pc, U24::new(1));

        let mut dsp = dsp_with(&[0x0E_A100]);
        dsp.regs.update_status(|s| s.set_zero(true));
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.pc, U24::new(0x100));
    }

    #[test]
    fn hardware_loop() {
        // 0: do #3,$3
        // 2: inc a
        // 3: inc b
        // 4: nop
        let mut dsp = dsp_with(&[0x06_0380, 0x00_0003, 0x00_0008, 0x00_0009, 0x00_0000]);
        run(&mut dsp, 1 + 3 * 2);

        assert_eq!(dsp.regs.a.value(), 3);
        assert_eq!(dsp.regs.b.value(), 3);
        assert_eq!(dsp.regs.pc, U24::new(4));
        assert!(!dsp.regs.status().loop_flag());
        assert_eq!(dsp.regs.stack_index(), 0);
    }

    #[test]
    fn loop_with_zero_count_is_skipped() {
        // do #0,$3
        let mut dsp = dsp_with(&[0x06_0080, 0x00_0003, 0x00_0008, 0x00_0009]);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.pc, U24::new(4));
        assert_eq!(dsp.regs.stack_index(), 0);
    }

    #[test]
    fn repeat_next_instruction() {
        // rep #5
        // inc a
        // nop
        let mut dsp = dsp_with(&[0x06_05A0, 0x00_0008, 0x00_0000]);
        dsp.regs.lc = U24::new(0x77);
        run(&mut dsp, 6);

        assert_eq!(dsp.regs.a.value(), 5);
        assert_eq!(dsp.regs.pc, U24::new(2));
        assert_eq!(dsp.regs.lc, U24::new(0x77));
        assert_eq!(dsp.regs.rep_active, 0);
    }

    #[test]
    fn repeat_zero_skips() {
        // rep #0
        // inc a
        // nop
        let mut dsp = dsp_with(&[0x06_00A0, 0x00_0008, 0x00_0000]);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.pc, U24::new(2));
        assert_eq!(dsp.regs.a.value(), 0);
    }

    #[test]
    fn skipped_instruction_can_end_a_loop() {
        // 0: do #2,$3
        // 2: rep #0
        // 3: inc a
        // 4: nop
        let mut dsp = dsp_with(&[0x06_0280, 0x00_0003, 0x06_00A0, 0x00_0008, 0x00_0000]);
        run(&mut dsp, 2);
        assert_eq!(dsp.regs.pc, U24::new(2));
        assert_eq!(dsp.regs.lc, U24::new(1));

        run(&mut dsp, 1);
        assert_eq!(dsp.regs.pc, U24::new(4));
        assert_eq!(dsp.regs.a.value(), 0);
        assert!(!dsp.regs.status().loop_flag());
        assert_eq!(dsp.regs.stack_index(), 0);
    }

    #[test]
    fn break_out_of_loop() {
        // 0: do forever,$3
        // 2: inc a
        // 3: brkcc
        // 4: nop
        let mut dsp = dsp_with(&[0x00_0203, 0x00_0003, 0x00_0008, 0x00_0210, 0x00_0000]);
        run(&mut dsp, 3);
        assert_eq!(dsp.regs.pc, U24::new(4));
        assert!(!dsp.regs.status().loop_flag());
        assert_eq!(dsp.regs.stack_index(), 0);
    }

    #[test]
    fn wait_halts() {
        let mut dsp = dsp_with(&[0x00_0086, 0x00_0008]);
        run(&mut dsp, 4);
        assert_eq!(dsp.state, RunState::Wait);
        assert_eq!(dsp.regs.pc, U24::new(1));
        assert_eq!(dsp.regs.a.value(), 0);
    }

    #[test]
    fn trap_enters_vector() {
        let mut dsp = dsp_with(&[0x00_0006]);
        run(&mut dsp, 1);
        assert_eq!(dsp.regs.pc, U24::new(dsp56k::TRAP_VECTOR));
        assert_eq!(dsp.regs.ssh(), U24::new(1));
    }
}
