//! Architecture model of a DSP56300 family core.
pub mod agu;
pub mod bounded;
pub mod icache;
pub mod ins;
pub mod loader;
pub mod mem;
pub mod periph;
pub mod persist;
pub mod regs;
mod trace;

pub use bounded::{U5, U8, U24, U48, U56};
pub use ins::{Decoded, Ins, Opcode};
pub use mem::{MemoryConfig, Space};
pub use periph::{Interrupt, NullPeripherals, Peripherals, ReadContext};
pub use regs::{Registers, Status};
pub use trace::TraceConfig;

use crate::icache::{ICache, Lookup};
use crate::mem::{IO_BASE, Memory};
use bitos::integer::u2;
use tracing::debug;

/// Interrupt vector of the illegal instruction exception.
pub const ILLEGAL_VECTOR: u32 = 0x3E;
/// Interrupt vector of the TRAP instruction.
pub const TRAP_VECTOR: u32 = 0x08;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub memory: MemoryConfig,
    pub trace: TraceConfig,
}

/// Whether the core is executing instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Running,
    /// Halted by WAIT until an interrupt arrives.
    Wait,
    /// Halted by STOP until an interrupt arrives.
    Stop,
}

/// A DSP instance: registers, memory, instruction cache and peripherals.
pub struct Dsp {
    pub regs: Registers,
    pub mem: Memory,
    pub icache: ICache,
    pub periph: Box<dyn Peripherals>,
    pub trace: TraceConfig,
    pub state: RunState,
    /// Amount of instructions executed.
    pub executed: u64,
}

impl Dsp {
    pub fn new(config: &Config, periph: Box<dyn Peripherals>) -> Self {
        Self {
            regs: Registers::default(),
            mem: Memory::new(&config.memory, &config.trace),
            icache: ICache::new(),
            periph,
            trace: config.trace,
            state: RunState::Running,
            executed: 0,
        }
    }

    /// Hardware reset. Memory contents are kept.
    pub fn reset(&mut self) {
        self.regs = Registers::default();
        self.icache = ICache::new();
        self.state = RunState::Running;
    }

    #[inline(always)]
    fn is_io(space: Space, addr: u32) -> bool {
        space != Space::P && addr >= IO_BASE
    }

    /// Reads a word as an executing instruction would.
    pub fn read(&mut self, space: Space, addr: U24) -> U24 {
        if Self::is_io(space, addr.value()) {
            return self
                .periph
                .read(space, addr.value(), ReadContext::Execute);
        }

        self.mem.read(space, addr)
    }

    /// Reads a word without side effects.
    pub fn inspect(&mut self, space: Space, addr: U24) -> U24 {
        if Self::is_io(space, addr.value()) {
            return self
                .periph
                .read(space, addr.value(), ReadContext::Inspect);
        }

        self.mem.read(space, addr)
    }

    pub fn write(&mut self, space: Space, addr: U24, value: U24) {
        if Self::is_io(space, addr.value()) {
            self.periph.write(space, addr.value(), value);
            return;
        }

        self.mem.write(space, addr, value);
    }

    /// Fetches an instruction word, going through the instruction cache model when enabled.
    pub fn fetch(&mut self, addr: U24) -> U24 {
        if self.regs.status().cache_enable() {
            let lookup = self.icache.fetch(addr.value());
            if lookup == Lookup::Bypass {
                debug!("instruction cache bypassed for {addr}");
            }
        }

        self.mem.read(Space::P, addr)
    }

    /// Fetches and decodes the instruction at `pc`.
    pub fn fetch_ins(&mut self, pc: U24) -> Result<Ins, ins::DecodeError> {
        let word = self.fetch(pc);
        let decoded = ins::decode(word)?;
        let ext = if decoded.len(word) == 2 {
            self.fetch(pc.wrapping_add(U24::new(1)))
        } else {
            U24::ZERO
        };

        Ok(Ins { word, ext, decoded })
    }

    /// Enters the exception handler at `VBA + vector` with the given priority level.
    pub fn raise(&mut self, vector: u32, level: u8) {
        debug!("entering exception vector {vector:02X} at level {level}");

        let (pc, sr) = (self.regs.pc, self.regs.sr);
        self.regs.push(pc, sr);
        self.regs.update_status(|s| {
            s.set_interrupt_mask(u2::new(level.min(3)));
            s.set_loop_flag(false);
        });

        self.regs.pc = self.regs.vba.wrapping_add(U24::new(vector));
        self.state = RunState::Running;
    }

    /// Services a pending interrupt if it is not masked. Returns whether one was taken.
    pub fn check_interrupts(&mut self) -> bool {
        if self.regs.rep_active != 0 {
            return false;
        }

        let Some(interrupt) = self.periph.pending_interrupt() else {
            return false;
        };

        let mask = self.regs.status().interrupt_mask().value();
        if interrupt.level < 3 && interrupt.level <= mask {
            return false;
        }

        self.periph.acknowledge(interrupt);
        self.raise(interrupt.vector, interrupt.level);
        true
    }

    pub fn save_state(&self) -> Vec<u8> {
        persist::save(&self.regs, &self.icache)
    }

    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), persist::PersistError> {
        let (regs, icache) = persist::load(bytes)?;
        self.regs = regs;
        self.icache = icache;
        Ok(())
    }

    /// Writes a program image into memory and moves PC to its entry point, if any.
    pub fn load_image(&mut self, image: &loader::Image) {
        image.for_each_word(|space, addr, word| self.write(space, addr, word));
        if let Some(entry) = image.entry {
            self.regs.pc = U24::new(entry);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Pending(Option<Interrupt>);

    impl Peripherals for Pending {
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
    fn io_window_goes_to_peripherals() {
        let mut dsp = Dsp::new(&Config::default(), Box::new(NullPeripherals::new()));
        dsp.write(Space::X, U24::new(0xFF_FFF0), U24::new(0x42));
        assert_eq!(dsp.read(Space::X, U24::new(0xFF_FFF0)), U24::new(0x42));
        assert!(!dsp.mem.has_program_writes());
    }

    #[test]
    fn masked_interrupts_wait() {
        let interrupt = Interrupt {
            vector: 0x10,
            level: 1,
        };

        let mut dsp = Dsp::new(&Config::default(), Box::new(Pending(Some(interrupt))));
        dsp.regs.pc = U24::new(0x40);

        // reset leaves the mask at 3
        assert!(!dsp.check_interrupts());

        dsp.regs
            .update_status(|s| s.set_interrupt_mask(u2::new(0)));
        dsp.state = RunState::Wait;
        assert!(dsp.check_interrupts());
        assert_eq!(dsp.regs.pc, U24::new(0x10));
        assert_eq!(dsp.regs.ssh(), U24::new(0x40));
        assert_eq!(dsp.regs.status().interrupt_mask().value(), 1);
        assert_eq!(dsp.state, RunState::Running);
        assert!(!dsp.check_interrupts());
    }

    #[test]
    fn state_round_trip() {
        let mut dsp = Dsp::new(&Config::default(), Box::new(NullPeripherals::new()));
        dsp.regs.x0 = U24::new(0x123);
        let state = dsp.save_state();

        dsp.reset();
        assert_eq!(dsp.regs.x0, U24::ZERO);
        dsp.load_state(&state).unwrap();
        assert_eq!(dsp.regs.x0, U24::new(0x123));
    }
}
