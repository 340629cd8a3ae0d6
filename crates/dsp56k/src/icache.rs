//! Instruction cache model.
//!
//! Tracks which program addresses the cache holds so that the cache control instructions and
//! state saves behave. Instruction words are always read from program memory.
use tracing::debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const SECTORS: usize = 8;
pub const SECTOR_LEN: u32 = 128;

/// What happened on a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    /// The sector was present but the word wasn't.
    Fill,
    /// A sector was (re)allocated.
    Miss,
    /// Every sector is locked to another address.
    Bypass,
}

#[derive(Debug, Clone, IntoBytes, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ICache {
    tags: [u32; SECTORS],
    /// One valid bit per word of each sector.
    valid: [[u32; 4]; SECTORS],
    /// Sector indices, most recently used first.
    lru: [u32; SECTORS],
    tag_valid: u32,
    locked: u32,
}

impl Default for ICache {
    fn default() -> Self {
        Self::new()
    }
}

impl ICache {
    pub fn new() -> Self {
        Self {
            tags: [0; SECTORS],
            valid: [[0; 4]; SECTORS],
            lru: std::array::from_fn(|i| i as u32),
            tag_valid: 0,
            locked: 0,
        }
    }

    #[inline(always)]
    fn tag(addr: u32) -> u32 {
        addr / SECTOR_LEN
    }

    fn find(&self, tag: u32) -> Option<usize> {
        (0..SECTORS).find(|&s| self.tag_valid & (1 << s) != 0 && self.tags[s] == tag)
    }

    fn touch(&mut self, sector: usize) {
        let sector = sector as u32;
        let Some(position) = self.lru.iter().position(|&s| s == sector) else {
            return;
        };

        self.lru.copy_within(0..position, 1);
        self.lru[0] = sector;
    }

    /// Allocates the least recently used unlocked sector to `tag`.
    fn allocate(&mut self, tag: u32) -> Option<usize> {
        let victim = self
            .lru
            .iter()
            .rev()
            .map(|&s| s as usize)
            .find(|&s| self.locked & (1 << s) == 0)?;

        self.tags[victim] = tag;
        self.tag_valid |= 1 << victim;
        self.valid[victim] = [0; 4];
        self.touch(victim);

        Some(victim)
    }

    /// Updates the cache state for an instruction fetch from `addr`.
    pub fn fetch(&mut self, addr: u32) -> Lookup {
        let tag = Self::tag(addr);
        let offset = (addr % SECTOR_LEN) as usize;
        let (word, bit) = (offset / 32, 1 << (offset % 32));

        let (sector, lookup) = match self.find(tag) {
            Some(sector) => {
                self.touch(sector);
                if self.valid[sector][word] & bit != 0 {
                    return Lookup::Hit;
                }

                (sector, Lookup::Fill)
            }
            None => match self.allocate(tag) {
                Some(sector) => (sector, Lookup::Miss),
                None => return Lookup::Bypass,
            },
        };

        self.valid[sector][word] |= bit;
        lookup
    }

    /// Invalidates every sector and unlocks them (`pflush`).
    pub fn flush(&mut self) {
        debug!("flushing instruction cache");
        *self = Self::new();
    }

    /// Invalidates every unlocked sector (`pflushun`).
    pub fn flush_unlocked(&mut self) {
        for sector in 0..SECTORS {
            if self.locked & (1 << sector) == 0 {
                self.tag_valid &= !(1 << sector);
                self.valid[sector] = [0; 4];
            }
        }
    }

    /// Unlocks every sector (`pfree`).
    pub fn free(&mut self) {
        self.locked = 0;
    }

    /// Locks the sector holding `addr`, allocating it if needed (`plock`).
    pub fn lock(&mut self, addr: u32) -> bool {
        let tag = Self::tag(addr);
        let sector = match self.find(tag) {
            Some(sector) => sector,
            None => match self.allocate(tag) {
                Some(sector) => sector,
                None => return false,
            },
        };

        self.locked |= 1 << sector;
        true
    }

    /// Unlocks the sector holding `addr`, if any (`punlock`).
    pub fn unlock(&mut self, addr: u32) {
        if let Some(sector) = self.find(Self::tag(addr)) {
            self.locked &= !(1 << sector);
        }
    }

    pub fn is_locked(&self, addr: u32) -> bool {
        self.find(Self::tag(addr))
            .is_some_and(|sector| self.locked & (1 << sector) != 0)
    }

    pub fn contains(&self, addr: u32) -> bool {
        let offset = (addr % SECTOR_LEN) as usize;
        self.find(Self::tag(addr))
            .is_some_and(|s| self.valid[s][offset / 32] & (1 << (offset % 32)) != 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let mut cache = ICache::new();
        assert_eq!(cache.fetch(0x100), Lookup::Miss);
        assert_eq!(cache.fetch(0x100), Lookup::Hit);
        assert_eq!(cache.fetch(0x101), Lookup::Fill);
        assert!(cache.contains(0x101));
        assert!(!cache.contains(0x102));
    }

    #[test]
    fn least_recently_used_sector_is_evicted() {
        let mut cache = ICache::new();
        for sector in 0..SECTORS as u32 {
            cache.fetch(sector * SECTOR_LEN);
        }

        // refresh the first sector, the second one is now the oldest
        cache.fetch(0);
        assert_eq!(cache.fetch(8 * SECTOR_LEN), Lookup::Miss);

        assert!(cache.contains(0));
        assert!(!cache.contains(SECTOR_LEN));
    }

    #[test]
    fn locked_sectors_survive() {
        let mut cache = ICache::new();
        for sector in 0..SECTORS as u32 {
            assert!(cache.lock(sector * SECTOR_LEN));
        }

        assert!(cache.is_locked(0x80));
        assert_eq!(cache.fetch(0x1000), Lookup::Bypass);

        cache.flush_unlocked();
        assert_eq!(cache.fetch(0x00), Lookup::Fill);

        cache.unlock(0x00);
        assert_eq!(cache.fetch(0x1000), Lookup::Miss);
        assert!(!cache.contains(0x00));

        cache.free();
        assert!(!cache.is_locked(0x80));

        cache.flush();
        assert!(!cache.contains(0x1000));
    }
}
