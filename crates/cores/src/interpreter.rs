use crate::{CoreError, CoreCtx, DspCore, Executed};
use dsp56k::Dsp;
use dspint::Interpreter;
use easyerr::ResultExt;

/// A core that runs everything through the interpreter.
#[derive(Debug, Default)]
pub struct Core {
    interpreter: Interpreter,
}

impl Core {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DspCore for Core {
    fn exec(&mut self, dsp: &mut Dsp, instructions: u64) -> Result<Executed, CoreError> {
        let before = dsp.executed;
        let result = self.interpreter.run(dsp, instructions);

        // nothing is compiled, so program writes need no invalidation
        dsp.mem.discard_program_writes();
        result.context(CoreCtx::Exec)?;

        Ok(Executed {
            instructions: dsp.executed - before,
        })
    }

    fn step(&mut self, dsp: &mut Dsp) -> Result<Executed, CoreError> {
        self.exec(dsp, 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use dsp56k::{Config, NullPeripherals, Space, U24};

    #[test]
    fn counts_executed_instructions() {
        let mut dsp = Dsp::new(&Config::default(), Box::new(NullPeripherals::new()));
        // inc a
        // inc a
        // wait
        for (addr, word) in [0x00_0008, 0x00_0008, 0x00_0086].into_iter().enumerate() {
            dsp.write(Space::P, U24::new(addr as u32), U24::new(word));
        }

        let mut core = Core::new();
        let executed = core.exec(&mut dsp, 100).unwrap();
        assert_eq!(executed.instructions, 3);
        assert_eq!(dsp.regs.a.value(), 2);

        // halted, nothing to do
        assert_eq!(core.step(&mut dsp).unwrap().instructions, 0);
    }

    #[test]
    fn program_writes_are_not_kept() {
        let mut dsp = Dsp::new(&Config::default(), Box::new(NullPeripherals::new()));
        // do #100,$2
        // movem x0,p:$30
        // wait
        let program = [0x06_6480, 0x00_0002, 0x07_3004, 0x00_0086];
        for (addr, word) in program.into_iter().enumerate() {
            dsp.write(Space::P, U24::new(addr as u32), U24::new(word));
        }

        dsp.regs.x0 = U24::new(0x12_3456);
        Core::new().exec(&mut dsp, 1000).unwrap();

        assert_eq!(dsp.mem.read(Space::P, U24::new(0x30)), U24::new(0x12_3456));
        assert!(!dsp.mem.has_program_writes());
    }
}
