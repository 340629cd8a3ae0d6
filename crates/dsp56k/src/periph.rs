//! The contract between the core and peripheral device models.
use crate::bounded::U24;
use crate::mem::{IO_BASE, Space};

/// A pending interrupt request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt {
    /// Offset of the interrupt vector from VBA.
    pub vector: u32,
    /// Priority level, 0 to 3. Level 3 is not maskable.
    pub level: u8,
}

/// Why a peripheral register is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadContext {
    /// A read by an executing instruction. May have side effects.
    Execute,
    /// An inspection by a debugger or a test. Must not have side effects.
    Inspect,
}

/// Peripheral devices mapped into the I/O window of X and Y memory.
pub trait Peripherals {
    fn is_valid_address(&self, space: Space, addr: u32) -> bool;
    fn read(&mut self, space: Space, addr: u32, ctx: ReadContext) -> U24;
    fn write(&mut self, space: Space, addr: u32, value: U24);

    /// Advances the devices by `instructions` executed instructions. Returns how many
    /// instructions may execute before the next event.
    fn tick(&mut self, instructions: u32) -> u32 {
        let _ = instructions;
        u32::MAX
    }

    fn pending_interrupt(&mut self) -> Option<Interrupt> {
        None
    }

    /// Called when the core starts servicing `interrupt`.
    fn acknowledge(&mut self, interrupt: Interrupt) {
        let _ = interrupt;
    }
}

const IO_LEN: usize = (0x100_0000 - IO_BASE) as usize;

/// Peripherals with no devices: the I/O window behaves as plain latches.
pub struct NullPeripherals {
    latches: [[U24; IO_LEN]; 2],
}

impl Default for NullPeripherals {
    fn default() -> Self {
        Self::new()
    }
}

impl NullPeripherals {
    pub fn new() -> Self {
        Self {
            latches: [[U24::ZERO; IO_LEN]; 2],
        }
    }

    fn latch(&mut self, space: Space, addr: u32) -> Option<&mut U24> {
        let index = addr.checked_sub(IO_BASE)? as usize;
        match space {
            Space::X => self.latches[0].get_mut(index),
            Space::Y => self.latches[1].get_mut(index),
            Space::P => None,
        }
    }
}

impl Peripherals for NullPeripherals {
    fn is_valid_address(&self, space: Space, addr: u32) -> bool {
        space != Space::P && (IO_BASE..=0xFF_FFFF).contains(&addr)
    }

    fn read(&mut self, space: Space, addr: u32, _: ReadContext) -> U24 {
        self.latch(space, addr).map_or(U24::ZERO, |v| *v)
    }

    fn write(&mut self, space: Space, addr: u32, value: U24) {
        if let Some(latch) = self.latch(space, addr) {
            *latch = value;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn latches_hold_values() {
        let mut periph = NullPeripherals::new();
        periph.write(Space::X, 0xFF_FFC0, U24::new(0x1234));
        assert_eq!(
            periph.read(Space::X, 0xFF_FFC0, ReadContext::Execute),
            U24::new(0x1234)
        );
        assert_eq!(
            periph.read(Space::Y, 0xFF_FFC0, ReadContext::Inspect),
            U24::ZERO
        );
        assert!(!periph.is_valid_address(Space::X, 0x100));
        assert_eq!(periph.pending_interrupt(), None);
    }
}
