//! Execution cores for DSP instances: a plain interpreter and a JIT backed by [`dspjit`].
pub mod interpreter;
pub mod jit;

use dsp56k::Dsp;
use dspint::ExecError;
use dspjit::BuildError;
use easyerr::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Exec { source: ExecError },
    #[error(transparent)]
    Build { source: BuildError },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Executed {
    /// How many instructions have been executed.
    pub instructions: u64,
}

/// Trait for DSP cores.
pub trait DspCore {
    /// Drives the DSP forward by approximately `instructions` instructions. Stops early if the
    /// core halts with no interrupt pending.
    fn exec(&mut self, dsp: &mut Dsp, instructions: u64) -> Result<Executed, CoreError>;
    /// Runs exactly one instruction, unless the core is halted.
    fn step(&mut self, dsp: &mut Dsp) -> Result<Executed, CoreError>;
}
