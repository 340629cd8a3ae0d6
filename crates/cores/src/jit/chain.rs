//! Per mode tables of compiled blocks.
use super::arena::Handle;
use dsp56k::U24;
use rustc_hash::FxHashMap;
use util::{boxed_array, boxed_slice};

const PAGE_BITS: u32 = 12;
const PAGE_LEN: usize = 1 << PAGE_BITS;
const PAGE_MASK: u32 = PAGE_LEN as u32 - 1;
const PAGE_COUNT: usize = 1 << (24 - PAGE_BITS);

/// What the chain knows about a program address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Empty,
    /// A block starts here.
    Block(Handle),
    /// The address lies inside a block that starts before it.
    Covered(Handle),
}

impl Slot {
    #[inline(always)]
    pub fn handle(self) -> Option<Handle> {
        match self {
            Self::Empty => None,
            Self::Block(handle) | Self::Covered(handle) => Some(handle),
        }
    }
}

/// Identifies a block compiled at a volatile address by the program words it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MicroKey {
    pub addr: u32,
    pub words: [u32; 3],
}

type Page = Box<[Slot; PAGE_LEN]>;

/// The blocks compiled for one specialization mode.
pub struct Chain {
    pages: Box<[Option<Page>]>,
    /// Blocks evicted from volatile addresses, waiting for the same words to show up again.
    micro: FxHashMap<MicroKey, Handle>,
    mapped: usize,
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            pages: boxed_slice(None, PAGE_COUNT),
            micro: FxHashMap::default(),
            mapped: 0,
        }
    }
}

impl Chain {
    #[inline(always)]
    fn split(addr: U24) -> (usize, usize) {
        let addr = addr.value();
        ((addr >> PAGE_BITS) as usize, (addr & PAGE_MASK) as usize)
    }

    #[inline(always)]
    pub fn get(&self, addr: U24) -> Slot {
        let (page, offset) = Self::split(addr);
        self.pages[page]
            .as_ref()
            .map_or(Slot::Empty, |page| page[offset])
    }

    fn slot_mut(&mut self, addr: U24) -> &mut Slot {
        let (page, offset) = Self::split(addr);
        let page = self.pages[page].get_or_insert_with(|| boxed_array(Slot::Empty));
        &mut page[offset]
    }

    /// Maps a block to the `len` addresses starting at `start`.
    pub fn map(&mut self, start: U24, len: u32, handle: Handle) {
        for offset in 0..len.max(1) {
            let addr = start.wrapping_add(U24::new(offset));
            let slot = self.slot_mut(addr);
            debug_assert!(
                slot.handle().is_none_or(|other| other == handle),
                "{addr} is already owned by another block"
            );

            *slot = if offset == 0 {
                Slot::Block(handle)
            } else {
                Slot::Covered(handle)
            };
        }

        self.mapped += 1;
    }

    /// Removes the mapping of a block. Addresses owned by other blocks are left alone.
    pub fn unmap(&mut self, start: U24, len: u32, handle: Handle) {
        let mut found = false;
        for offset in 0..len.max(1) {
            let addr = start.wrapping_add(U24::new(offset));
            let (page, offset) = Self::split(addr);
            let Some(page) = &mut self.pages[page] else {
                continue;
            };

            if page[offset].handle() == Some(handle) {
                page[offset] = Slot::Empty;
                found = true;
            }
        }

        if found {
            self.mapped -= 1;
        }
    }

    /// Blocks owning any of the `len` addresses starting at `start`.
    pub fn occupants(&self, start: U24, len: u32) -> Vec<Handle> {
        let mut found = Vec::new();
        for offset in 0..len.max(1) {
            let addr = start.wrapping_add(U24::new(offset));
            if let Some(handle) = self.get(addr).handle()
                && !found.contains(&handle)
            {
                found.push(handle);
            }
        }

        found
    }

    /// Amount of blocks mapped in this chain.
    pub fn mapped(&self) -> usize {
        self.mapped
    }

    pub fn keep_micro(&mut self, key: MicroKey, handle: Handle) -> Option<Handle> {
        self.micro.insert(key, handle)
    }

    pub fn take_micro(&mut self, key: MicroKey) -> Option<Handle> {
        self.micro.remove(&key)
    }

    /// Drops the micro-block entry for `key` if it still refers to `handle`.
    pub fn forget_micro(&mut self, key: MicroKey, handle: Handle) {
        if self.micro.get(&key) == Some(&handle) {
            self.micro.remove(&key);
        }
    }

    pub fn micro_blocks(&self) -> usize {
        self.micro.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jit::arena::Arena;

    #[test]
    fn mapping() {
        let mut arena = Arena::default();
        let a = arena.insert(());
        let b = arena.insert(());

        let mut chain = Chain::default();
        chain.map(U24::new(0x10), 3, a);
        assert_eq!(chain.get(U24::new(0x10)), Slot::Block(a));
        assert_eq!(chain.get(U24::new(0x12)), Slot::Covered(a));
        assert_eq!(chain.get(U24::new(0x13)), Slot::Empty);

        chain.map(U24::new(0x13), 1, b);
        assert_eq!(chain.mapped(), 2);

        chain.unmap(U24::new(0x10), 3, a);
        assert_eq!(chain.get(U24::new(0x11)), Slot::Empty);
        assert_eq!(chain.get(U24::new(0x13)), Slot::Block(b));
        assert_eq!(chain.mapped(), 1);

        // unmapping twice does nothing
        chain.unmap(U24::new(0x10), 3, a);
        assert_eq!(chain.mapped(), 1);
    }

    #[test]
    fn mapping_wraps_around() {
        let mut arena = Arena::default();
        let a = arena.insert(());

        let mut chain = Chain::default();
        chain.map(U24::new(0xFF_FFFF), 2, a);
        assert_eq!(chain.get(U24::new(0)), Slot::Covered(a));
    }

    #[test]
    fn micro_blocks() {
        let mut arena = Arena::default();
        let a = arena.insert(());
        let b = arena.insert(());

        let key = MicroKey {
            addr: 4,
            words: [0x20_0013, 0, 0],
        };

        let mut chain = Chain::default();
        assert_eq!(chain.keep_micro(key, a), None);
        chain.forget_micro(key, b);
        assert_eq!(chain.micro_blocks(), 1);

        let other = MicroKey {
            words: [0x20_0040, 0, 0],
            ..key
        };
        assert_eq!(chain.take_micro(other), None);
        assert_eq!(chain.take_micro(key), Some(a));
        assert_eq!(chain.micro_blocks(), 0);
    }
}
