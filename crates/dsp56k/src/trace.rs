//! Diagnostics configuration.
use crate::bounded::U24;
use crate::ins::Ins;
use tracing::trace;

/// What the core reports while running.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceConfig {
    /// Log every executed instruction.
    pub instructions: bool,
    /// Track written memory and log reads of words never written.
    pub uninitialized_reads: bool,
    /// Assert (in debug builds) on accesses to unmapped memory.
    pub strict_memory: bool,
}

impl TraceConfig {
    #[inline(always)]
    pub fn instruction(&self, pc: U24, ins: &Ins) {
        if self.instructions {
            trace!(target: "dsp56k::exec", "{pc}: {ins}");
        }
    }
}
