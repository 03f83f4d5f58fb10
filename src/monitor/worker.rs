//! Per-resource polling worker.
//!
//! Each watch runs on its own thread, so a fetch that blocks only delays its
//! own resource. Ticks for one resource are strictly sequential. The worker
//! waits on a cancel channel between ticks; the sender lives in the watch
//! table and dropping it ends the worker without anyone joining it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, TryRecvError};

use crate::error::{lock_err, panic_message, FetchError, VastError};
use crate::event::{ErrorContext, ErrorSink, EventBus};
use crate::snapshot::{diff, ResourceId, ResourceInspector, Snapshot};

use super::watch::WatchTable;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// Snapshot stored; this many events published.
    Published(usize),
    /// Fetch failed; state retained.
    Skipped,
    /// The watch was stopped or replaced; nothing stored or published.
    Superseded,
}

pub(crate) struct Worker {
    pub(crate) id: ResourceId,
    pub(crate) generation: u64,
    pub(crate) period: Duration,
    pub(crate) initial_delay: Duration,
    pub(crate) table: Arc<Mutex<WatchTable>>,
    pub(crate) inspector: Arc<dyn ResourceInspector>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) sink: Arc<dyn ErrorSink>,
    pub(crate) cancel: Receiver<()>,
}

impl Worker {
    pub(crate) fn run(self) {
        if self.wait(self.initial_delay) {
            loop {
                if self.tick() == TickOutcome::Superseded || !self.wait(self.period) {
                    break;
                }
            }
        }
        tracing::debug!(resource_id = %self.id, generation = self.generation, "watch worker exited");
    }

    /// Sleep for `timeout` unless cancelled first. Returns false once cancelled.
    fn wait(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return matches!(self.cancel.try_recv(), Err(TryRecvError::Empty));
        }
        select! {
            recv(self.cancel) -> _ => false,
            default(timeout) => true,
        }
    }

    pub(crate) fn tick(&self) -> TickOutcome {
        match self.table.lock() {
            Ok(table) if table.is_current(self.id, self.generation) => {}
            Ok(_) => return TickOutcome::Superseded,
            Err(_) => {
                self.report_internal(lock_err("monitor.tick"));
                return TickOutcome::Skipped;
            }
        }

        let mut snapshot = match self.fetch() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.sink
                    .report(&ErrorContext::Fetch { resource_id: self.id }, &VastError::Fetch(err));
                return TickOutcome::Skipped;
            }
        };
        snapshot.resource_id = self.id;

        let events = {
            let Ok(mut table) = self.table.lock() else {
                self.report_internal(lock_err("monitor.tick"));
                return TickOutcome::Skipped;
            };
            let Some(entry) = table.current_mut(self.id, self.generation) else {
                return TickOutcome::Superseded;
            };
            let events = diff(entry.last.as_ref(), &snapshot);
            entry.last = Some(snapshot);
            events
        };

        for event in &events {
            self.bus.publish(event);
        }
        tracing::trace!(resource_id = %self.id, events = events.len(), "tick complete");
        TickOutcome::Published(events.len())
    }

    fn fetch(&self) -> Result<Snapshot, FetchError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.inspector.fetch(self.id))) {
            Ok(result) => result,
            Err(payload) => Err(FetchError::transport(format!(
                "inspector panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    fn report_internal(&self, err: VastError) {
        self.sink.report(&ErrorContext::Fetch { resource_id: self.id }, &err);
    }
}
