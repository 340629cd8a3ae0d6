//! Generation counted storage for compiled blocks.

/// Identifier for a value in an [`Arena`]. Goes stale once the value is removed, even if the
/// entry is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Packs the handle into a single integer, as stored in link slots.
    #[inline(always)]
    pub fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[inline(always)]
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn insert(&mut self, value: T) -> Handle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.value = Some(value);
            return Handle {
                index,
                generation: entry.generation,
            };
        }

        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            // generation 0 is never handed out, so zeroed link slots never resolve
            generation: 1,
            value: Some(value),
        });

        Handle {
            index,
            generation: 1,
        }
    }

    #[inline(always)]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.entries
            .get(handle.index as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.value.as_ref())
    }

    #[inline(always)]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.entries
            .get_mut(handle.index as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.value.as_mut())
    }

    #[inline(always)]
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let entry = self.entries.get_mut(handle.index as usize)?;
        if entry.generation != handle.generation {
            return None;
        }

        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1).max(1);
        self.free.push(handle.index);
        self.len -= 1;

        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            let value = entry.value.as_ref()?;
            Some((
                Handle {
                    index: index as u32,
                    generation: entry.generation,
                },
                value,
            ))
        })
    }

    pub fn clear(&mut self) -> Vec<T> {
        let mut removed = Vec::with_capacity(self.len);
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if let Some(value) = entry.value.take() {
                entry.generation = entry.generation.wrapping_add(1).max(1);
                self.free.push(index as u32);
                removed.push(value);
            }
        }

        self.len = 0;
        removed
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stale_handles() {
        let mut arena = Arena::default();
        let a = arena.insert("a");
        assert_eq!(arena.get(a), Some(&"a"));

        assert_eq!(arena.remove(a), Some("a"));
        assert!(!arena.contains(a));
        assert_eq!(arena.remove(a), None);

        // the entry is reused with a new generation
        let b = arena.insert("b");
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn bits_round_trip() {
        let mut arena = Arena::default();
        let handle = arena.insert(0u8);
        assert_eq!(Handle::from_bits(handle.to_bits()), handle);

        // zero never resolves
        assert!(!arena.contains(Handle::from_bits(0)));
    }

    #[test]
    fn clear_removes_everything() {
        let mut arena = Arena::default();
        let a = arena.insert(1);
        arena.insert(2);
        let mut removed = arena.clear();
        removed.sort();
        assert_eq!(removed, vec![1, 2]);
        assert!(!arena.contains(a));
        assert_eq!(arena.iter().count(), 0);
    }
}
