//! Shared per-resource watch bookkeeping.
//!
//! The table is the only state shared between the control surface and the
//! workers. Every watch carries a generation; a worker may only touch the
//! entry whose generation it was started with.

use std::collections::HashMap;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::snapshot::{ResourceId, Snapshot};

pub(crate) struct WatchEntry {
    pub(crate) generation: u64,
    pub(crate) period: Duration,
    pub(crate) last: Option<Snapshot>,
    /// Never sent on; dropping it with the entry wakes and ends the worker.
    #[allow(dead_code)]
    pub(crate) cancel: Sender<()>,
}

#[derive(Default)]
pub(crate) struct WatchTable {
    entries: HashMap<ResourceId, WatchEntry>,
    next_generation: u64,
    closed: bool,
}

impl WatchTable {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    pub(crate) fn insert(&mut self, id: ResourceId, entry: WatchEntry) -> Option<WatchEntry> {
        self.entries.insert(id, entry)
    }

    pub(crate) fn remove(&mut self, id: ResourceId) -> Option<WatchEntry> {
        self.entries.remove(&id)
    }

    /// Mark closed and hand back every live entry.
    pub(crate) fn close(&mut self) -> Vec<(ResourceId, WatchEntry)> {
        self.closed = true;
        self.entries.drain().collect()
    }

    pub(crate) fn get(&self, id: ResourceId) -> Option<&WatchEntry> {
        self.entries.get(&id)
    }

    /// The entry for `id` if it still belongs to `generation`.
    pub(crate) fn current_mut(&mut self, id: ResourceId, generation: u64) -> Option<&mut WatchEntry> {
        self.entries
            .get_mut(&id)
            .filter(|entry| entry.generation == generation)
    }

    pub(crate) fn is_current(&self, id: ResourceId, generation: u64) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|entry| entry.generation == generation)
    }

    pub(crate) fn ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
