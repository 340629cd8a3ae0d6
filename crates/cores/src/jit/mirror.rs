//! A read-only view of the block cache for debuggers, fed from the executing thread.
use super::arena::Handle;
use dsp56k::U24;
use dspjit::{Meta, Mode, Termination};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A compiled block, as seen by the mirror.
#[derive(Debug, Clone)]
pub struct BlockInfo {
    pub start: U24,
    pub len: u32,
    pub instructions: u32,
    pub mode: Mode,
    pub termination: Termination,
    pub code_size: usize,
}

impl BlockInfo {
    pub(super) fn new(meta: &Meta) -> Self {
        Self {
            start: meta.start,
            len: meta.len,
            instructions: meta.instructions,
            mode: meta.mode,
            termination: meta.termination,
            code_size: meta.code_size,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Created(Handle, BlockInfo),
    Destroyed(Handle),
}

/// The sending side of the mirror. Cheap to clone, every clone feeds the same views.
#[derive(Clone, Default)]
pub struct Mirror {
    pending: Arc<Mutex<Vec<Event>>>,
}

impl Mirror {
    /// Moves buffered events into the shared queue.
    pub(super) fn publish(&self, events: &mut Vec<Event>) {
        if events.is_empty() {
            return;
        }

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.append(events);
    }

    /// Creates a view that starts out empty and catches up on [`View::refresh`].
    pub fn view(&self) -> View {
        View {
            mirror: self.clone(),
            blocks: FxHashMap::default(),
            scratch: Vec::new(),
        }
    }
}

/// The blocks alive as of the last refresh.
pub struct View {
    mirror: Mirror,
    blocks: FxHashMap<Handle, BlockInfo>,
    scratch: Vec<Event>,
}

impl View {
    /// Applies the events published since the last refresh. Returns how many were applied.
    pub fn refresh(&mut self) -> usize {
        {
            let mut pending = self
                .mirror
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::swap(&mut *pending, &mut self.scratch);
        }

        let count = self.scratch.len();
        for event in self.scratch.drain(..) {
            match event {
                Event::Created(handle, info) => {
                    self.blocks.insert(handle, info);
                }
                Event::Destroyed(handle) => {
                    self.blocks.remove(&handle);
                }
            }
        }

        count
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks that cover `addr`, in any mode.
    pub fn covering(&self, addr: U24) -> impl Iterator<Item = &BlockInfo> {
        self.blocks
            .values()
            .filter(move |info| addr.wrapping_sub(info.start).value() < info.len)
    }

    /// All blocks, sorted by start address.
    pub fn blocks(&self) -> Vec<&BlockInfo> {
        let mut blocks = self.blocks.values().collect::<Vec<_>>();
        blocks.sort_by_key(|info| (info.start, info.mode));
        blocks
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jit::arena::Arena;

    fn info(start: u32, len: u32) -> BlockInfo {
        BlockInfo {
            start: U24::new(start),
            len,
            instructions: len,
            mode: Mode::default(),
            termination: Termination::Branch,
            code_size: 0,
        }
    }

    #[test]
    fn events_show_up_after_refresh() {
        let mut arena = Arena::default();
        let a = arena.insert(());
        let b = arena.insert(());

        let mirror = Mirror::default();
        let mut view = mirror.view();

        let mut events = vec![
            Event::Created(a, info(0x10, 4)),
            Event::Created(b, info(0x20, 2)),
        ];
        mirror.publish(&mut events);
        assert!(events.is_empty());
        assert_eq!(view.len(), 0);

        assert_eq!(view.refresh(), 2);
        assert_eq!(view.len(), 2);
        assert_eq!(view.covering(U24::new(0x13)).count(), 1);
        assert_eq!(view.blocks()[1].start, U24::new(0x20));

        mirror.publish(&mut vec![Event::Destroyed(a)]);
        view.refresh();
        assert_eq!(view.len(), 1);
        assert_eq!(view.covering(U24::new(0x13)).count(), 0);
    }

    #[test]
    fn views_update_from_other_threads() {
        let mut arena = Arena::default();
        let a = arena.insert(());

        let mirror = Mirror::default();
        let view = mirror.view();
        let handle = std::thread::spawn(move || {
            let mut view = view;
            while view.len() == 0 {
                view.refresh();
                std::thread::yield_now();
            }

            view.len()
        });

        mirror.publish(&mut vec![Event::Created(a, info(0, 1))]);
        assert_eq!(handle.join().unwrap(), 1);
    }
}
