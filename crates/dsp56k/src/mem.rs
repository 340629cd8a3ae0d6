//! The X, Y and P memory spaces.
use crate::TraceConfig;
use crate::bounded::U24;
use bitvec::vec::BitVec;
use tracing::{debug, warn};

/// Start of the peripheral I/O window in X and Y memory.
pub const IO_BASE: u32 = 0xFF_FF80;
/// Value returned by reads from addresses with no backing storage.
pub const POISON: U24 = U24::new(0xBA_DBAD);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Space {
    X = 0,
    Y = 1,
    P = 2,
}

impl Space {
    /// The data space selected by a single `S` bit.
    #[inline(always)]
    pub fn data(bit: u32) -> Self {
        if bit & 1 == 0 { Self::X } else { Self::Y }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::P => "p",
        }
    }
}

impl std::fmt::Display for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub x_len: u32,
    pub y_len: u32,
    pub p_len: u32,
    /// X and Y addresses at or above this one access P storage.
    pub bridge: Option<u32>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            x_len: 0x1_0000,
            y_len: 0x1_0000,
            p_len: 0x1_0000,
            bridge: None,
        }
    }
}

/// Memory of a DSP instance. Peripheral accesses are not handled here.
pub struct Memory {
    spaces: [Box<[U24]>; 3],
    bridge: Option<u32>,
    initialized: Option<[BitVec; 3]>,
    strict: bool,
    program_writes: Vec<u32>,
}

impl Memory {
    pub fn new(config: &MemoryConfig, trace: &TraceConfig) -> Self {
        let lens = [config.x_len, config.y_len, config.p_len];
        let spaces = lens.map(|len| util::boxed_slice(U24::ZERO, len.min(1 << 24) as usize));
        let initialized = trace
            .uninitialized_reads
            .then(|| lens.map(|len| BitVec::repeat(false, len.min(1 << 24) as usize)));

        Self {
            spaces,
            bridge: config.bridge,
            initialized,
            strict: trace.strict_memory,
            program_writes: Vec::new(),
        }
    }

    #[inline(always)]
    pub fn len(&self, space: Space) -> u32 {
        self.spaces[space as usize].len() as u32
    }

    #[inline(always)]
    pub fn bridge(&self) -> Option<u32> {
        self.bridge
    }

    /// The storage an address lands in, after bridging.
    #[inline(always)]
    fn locate(&self, space: Space, addr: u32) -> Option<(Space, usize)> {
        let space = match self.bridge {
            Some(bridge) if space != Space::P && addr >= bridge => Space::P,
            _ => space,
        };

        let storage = &self.spaces[space as usize];
        ((addr as usize) < storage.len()).then_some((space, addr as usize))
    }

    /// Addresses below this limit map straight into the storage of `space`.
    pub fn fast_limit(&self, space: Space) -> u32 {
        let len = self.len(space);
        match space {
            Space::P => len,
            _ => len.min(self.bridge.unwrap_or(u32::MAX)).min(IO_BASE),
        }
    }

    /// Base pointer of the storage of `space`. Valid for `len(space)` words.
    pub fn base_ptr(&mut self, space: Space) -> *mut U24 {
        self.spaces[space as usize].as_mut_ptr()
    }

    pub fn words(&self, space: Space) -> &[U24] {
        &self.spaces[space as usize]
    }

    pub fn read(&self, space: Space, addr: U24) -> U24 {
        let Some((storage, index)) = self.locate(space, addr.value()) else {
            warn!("read from unmapped address {space}:{addr}");
            debug_assert!(!self.strict, "read from unmapped address {space}:{addr}");
            return POISON;
        };

        if let Some(initialized) = &self.initialized
            && !initialized[storage as usize][index]
        {
            debug!("read from uninitialized address {space}:{addr}");
        }

        self.spaces[storage as usize][index]
    }

    pub fn write(&mut self, space: Space, addr: U24, value: U24) {
        let Some((storage, index)) = self.locate(space, addr.value()) else {
            warn!("write of {value} to unmapped address {space}:{addr}");
            debug_assert!(!self.strict, "write to unmapped address {space}:{addr}");
            return;
        };

        self.spaces[storage as usize][index] = value;
        if let Some(initialized) = &mut self.initialized {
            initialized[storage as usize].set(index, true);
        }

        if storage == Space::P {
            self.program_writes.push(index as u32);
        }
    }

    /// Takes the list of program memory addresses written since the last call.
    pub fn take_program_writes(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.program_writes)
    }

    #[inline(always)]
    pub fn has_program_writes(&self) -> bool {
        !self.program_writes.is_empty()
    }

    /// Forgets every program memory write, keeping the log's storage.
    pub fn discard_program_writes(&mut self) {
        self.program_writes.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn memory(bridge: Option<u32>) -> Memory {
        let config = MemoryConfig {
            x_len: 0x100,
            y_len: 0x100,
            p_len: 0x1000,
            bridge,
        };

        Memory::new(&config, &TraceConfig::default())
    }

    #[test]
    fn spaces_are_independent() {
        let mut mem = memory(None);
        mem.write(Space::X, U24::new(0x10), U24::new(1));
        mem.write(Space::Y, U24::new(0x10), U24::new(2));
        mem.write(Space::P, U24::new(0x10), U24::new(3));

        assert_eq!(mem.read(Space::X, U24::new(0x10)), U24::new(1));
        assert_eq!(mem.read(Space::Y, U24::new(0x10)), U24::new(2));
        assert_eq!(mem.read(Space::P, U24::new(0x10)), U24::new(3));
        assert_eq!(mem.take_program_writes(), vec![0x10]);
        assert!(!mem.has_program_writes());
    }

    #[test]
    fn bridged_addresses_alias_program_memory() {
        let mut mem = memory(Some(0x800));
        mem.write(Space::X, U24::new(0x900), U24::new(0x12_3456));

        assert_eq!(mem.read(Space::P, U24::new(0x900)), U24::new(0x12_3456));
        assert_eq!(mem.read(Space::Y, U24::new(0x900)), U24::new(0x12_3456));
        assert_eq!(mem.take_program_writes(), vec![0x900]);
        assert_eq!(mem.fast_limit(Space::X), 0x100);
    }

    #[test]
    fn unmapped_reads_are_poisoned() {
        let mut mem = memory(None);
        assert_eq!(mem.read(Space::X, U24::new(0x5000)), POISON);

        mem.write(Space::Y, U24::new(0x5000), U24::new(1));
        assert!(!mem.has_program_writes());
    }
}
