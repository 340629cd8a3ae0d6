//! Interpreter for the DSP56300 instruction set.
mod exec;

pub use exec::arith;

use dsp56k::ins::DecodeError;
use dsp56k::regs::{Reg, Registers, Status};
use dsp56k::{Dsp, Ins, RunState, U24};
use easyerr::{Error, ResultExt};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Decode { source: DecodeError },
    #[error("move and ALU operation write different values to {reg} at {pc}")]
    ParallelConflict { pc: U24, reg: Reg },
}

/// Executes instructions one at a time.
#[derive(Debug, Default)]
pub struct Interpreter {
    /// Address of the instruction being executed.
    pc: U24,
    /// Address execution continues at.
    next: U24,
    /// Words covered by the last instruction, including one skipped by a REP of zero.
    span: u32,
}

/// Pops a hardware loop frame, restoring LF, FV, LA and LC.
pub fn end_loop(regs: &mut Registers) {
    let (_, sr) = regs.pop();
    let saved = Status::from_bits(sr.value());
    regs.update_status(|s| {
        s.set_loop_flag(saved.loop_flag());
        s.set_forever(saved.forever());
    });

    let (la, lc) = regs.pop();
    regs.la = la;
    regs.lc = lc;
}

/// Whether the instruction at `pc` with length `len` ends the active hardware loop.
#[inline(always)]
pub fn is_loop_end(regs: &Registers, pc: U24, len: u32) -> bool {
    regs.status().loop_flag() && regs.la.wrapping_sub(pc).value() < len
}

/// Handles the end of an instruction at `pc` with length `len` that continued sequentially.
///
/// If it is the last instruction of the active hardware loop, either jumps back to the loop
/// start or, on the last iteration, tears the loop down. Returns whether the loop end was hit.
pub fn loop_end(regs: &mut Registers, pc: U24, len: u32) -> bool {
    if !is_loop_end(regs, pc, len) {
        return false;
    }

    if regs.status().forever() {
        regs.pc = regs.ssh();
    } else if regs.lc.value() <= 1 {
        tracing::debug!("hardware loop ending at {}", regs.la);
        end_loop(regs);
    } else {
        regs.lc = regs.lc.wrapping_sub(U24::new(1));
        regs.pc = regs.ssh();
    }

    true
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Words covered by the last executed instruction. Larger than its length when it was a REP
    /// that skipped the instruction after it.
    pub fn span(&self) -> u32 {
        self.span
    }

    /// Executes a single instruction at PC, leaving PC at the next instruction to execute.
    ///
    /// Hardware loop ends and repeats are not handled here.
    pub fn execute(&mut self, dsp: &mut Dsp, ins: Ins) -> Result<(), ExecError> {
        self.pc = dsp.regs.pc;
        self.next = self.pc.wrapping_add(U24::new(ins.len()));
        self.span = ins.len();

        match ins.decoded {
            dsp56k::Decoded::Parallel { alu, mv } => self.parallel(dsp, ins, alu, mv)?,
            dsp56k::Decoded::Single(opcode) => self.single(dsp, ins, opcode),
        }

        dsp.regs.pc = self.next;
        dsp.executed += 1;
        Ok(())
    }

    /// Runs one step: ticks the peripherals, services interrupts, executes the instruction at
    /// PC and handles repeats and hardware loops.
    pub fn step(&mut self, dsp: &mut Dsp) -> Result<(), ExecError> {
        dsp.periph.tick(1);
        dsp.check_interrupts();
        if dsp.state != RunState::Running {
            return Ok(());
        }

        let pc = dsp.regs.pc;
        let ins = dsp.fetch_ins(pc).context(ExecCtx::Decode)?;
        dsp.trace.instruction(pc, &ins);

        let repeating = dsp.regs.rep_active != 0;
        self.execute(dsp, ins)?;

        if repeating {
            if dsp.regs.lc.value() > 1 {
                dsp.regs.lc = dsp.regs.lc.wrapping_sub(U24::new(1));
                dsp.regs.pc = pc;
                return Ok(());
            }

            dsp.regs.rep_active = 0;
            dsp.regs.lc = dsp.regs.rep_lc;
        }

        let len = self.span;
        if dsp.regs.pc == pc.wrapping_add(U24::new(len)) {
            loop_end(&mut dsp.regs, pc, len);
        }

        Ok(())
    }

    /// Runs until `count` steps have been executed or the core halts.
    pub fn run(&mut self, dsp: &mut Dsp, count: u64) -> Result<u64, ExecError> {
        for done in 0..count {
            if dsp.state != RunState::Running && dsp.periph.pending_interrupt().is_none() {
                return Ok(done);
            }

            self.step(dsp)?;
        }

        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use dsp56k::{Config, Interrupt, NullPeripherals, Peripherals, ReadContext, Space};

    /// A core with `program` at P:0 and no peripherals.
    pub fn dsp_with(program: &[u32]) -> Dsp {
        dsp_with_periph(program, Box::new(NullPeripherals::new()))
    }

    pub fn dsp_with_periph(program: &[u32], periph: Box<dyn Peripherals>) -> Dsp {
        let mut dsp = Dsp::new(&Config::default(), periph);
        for (addr, &word) in program.iter().enumerate() {
            dsp.mem
                .write(Space::P, U24::new(addr as u32), U24::new(word));
        }

        dsp.mem.take_program_writes();
        dsp
    }

    /// Runs `steps` interpreter steps, panicking on errors.
    pub fn run(dsp: &mut Dsp, steps: usize) {
        let mut interpreter = Interpreter::new();
        for _ in 0..steps {
            interpreter.step(dsp).unwrap();
        }
    }

    struct OneShot(Option<Interrupt>);

    impl Peripherals for OneShot {
        fn is_valid_address(&self, _: Space, _: u32) -> bool {
            false
        }

        fn read(&mut self, _: Space, _: u32, _: ReadContext) -> U24 {
            U24::ZERO
        }

        fn write(&mut self, _: Space, _: u32, _: U24) {}

        fn pending_interrupt(&mut self) -> Option<Interrupt> {
            self.0
        }

        fn acknowledge(&mut self, _: Interrupt) {
            self.0 = None;
        }
    }

    #[test]
    fn illegal_words_are_decode_errors() {
        let mut dsp = dsp_with(&[0x00_0007]);
        let mut interpreter = Interpreter::new();
        assert!(matches!(
            interpreter.step(&mut dsp),
            Err(ExecError::Decode { .. })
        ));
    }

    #[test]
    fn interrupts_are_taken_between_instructions() {
        let interrupt = Interrupt {
            vector: 0x20,
            level: 3,
        };

        // 0: inc a
        // 20: inc b
        let mut program = vec![0x00_0000; 0x21];
        program[0] = 0x00_0008;
        program[0x20] = 0x00_0009;
        let mut dsp = dsp_with_periph(&program, Box::new(OneShot(Some(interrupt))));

        run(&mut dsp, 1);
        assert_eq!(dsp.regs.a.value(), 0);
        assert_eq!(dsp.regs.b.value(), 1);
        assert_eq!(dsp.regs.pc, U24::new(0x21));
        assert_eq!(dsp.regs.ssh(), U24::ZERO);
    }

    #[test]
    fn repeats_are_not_interrupted() {
        let interrupt = Interrupt {
            vector: 0x20,
            level: 3,
        };

        // rep #3
        // inc a
        let mut dsp = dsp_with_periph(
            &[0x06_03A0, 0x00_0008, 0x00_0000],
            Box::new(OneShot(None)),
        );

        run(&mut dsp, 2);
        dsp.periph = Box::new(OneShot(Some(interrupt)));
        run(&mut dsp, 2);
        assert_eq!(dsp.regs.a.value(), 3);
        assert_eq!(dsp.regs.pc, U24::new(2));
    }

    #[test]
    fn nested_loops() {
        // 0: do #2,$6
        // 2: do #3,$5
        // 4: inc a
        // 5: nop
        // 6: inc b
        // 7: nop
        let program = [
            0x06_0280, 0x00_0006, 0x06_0380, 0x00_0005, 0x00_0008, 0x00_0000, 0x00_0009,
            0x00_0000,
        ];

        let mut dsp = dsp_with(&program);
        let mut interpreter = Interpreter::new();
        while dsp.regs.pc != U24::new(7) {
            interpreter.step(&mut dsp).unwrap();
        }

        assert_eq!(dsp.regs.a.value(), 6);
        assert_eq!(dsp.regs.b.value(), 2);
        assert_eq!(dsp.regs.stack_index(), 0);
        assert!(!dsp.regs.status().loop_flag());
    }

    #[test]
    fn run_stops_when_halted() {
        // wait
        let mut dsp = dsp_with(&[0x00_0086]);
        let mut interpreter = Interpreter::new();
        assert_eq!(interpreter.run(&mut dsp, 10).unwrap(), 1);
        assert_eq!(dsp.executed, 1);
    }
}
