//! Monitor control surface: watch, stop, close.
//!
//! The monitor owns one worker thread per watched resource. Stopping a watch
//! removes its table entry, which disconnects the worker's cancel channel; the
//! worker notices on its next wait and exits. Nobody waits for an in-flight
//! tick, and the generation check keeps a late tick from storing a snapshot or
//! publishing after its watch is gone.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;

use crate::error::{lock_err, LifecycleError, VastResult};
use crate::event::{ErrorSink, EventBus, TracingErrorSink};
use crate::snapshot::{ResourceId, ResourceInspector, Snapshot};

use super::config::MonitorConfig;
use super::watch::{WatchEntry, WatchTable};
use super::worker::Worker;

/// Polls watched resources and publishes their transitions on an [`EventBus`].
pub struct ResourceMonitor {
    config: MonitorConfig,
    inspector: Arc<dyn ResourceInspector>,
    bus: Arc<EventBus>,
    sink: Arc<dyn ErrorSink>,
    table: Arc<Mutex<WatchTable>>,
}

impl fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("config", &self.config)
            .field("watched", &self.watched())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ResourceMonitor {
    /// Monitor reporting fetch failures through [`TracingErrorSink`].
    #[must_use]
    pub fn new(config: MonitorConfig, inspector: Arc<dyn ResourceInspector>, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            inspector,
            bus,
            sink: Arc::new(TracingErrorSink),
            table: Arc::new(Mutex::new(WatchTable::default())),
        }
    }

    /// Replace the sink receiving fetch failures.
    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Start polling `resource_id` every `period` (at least `min_period`).
    ///
    /// Any existing watch for the same id is cancelled first and its last
    /// snapshot discarded, so the new watch starts from a first observation.
    /// Fails with [`LifecycleError::Closed`] after [`close`](Self::close).
    pub fn watch(&self, resource_id: ResourceId, period: Duration) -> VastResult<()> {
        let period = self.config.effective_period(period);

        let mut table = self.table.lock().map_err(|_| lock_err("monitor.watch"))?;
        if table.is_closed() {
            return Err(LifecycleError::Closed.into());
        }
        let replaced = table.remove(resource_id).is_some();

        let generation = table.next_generation();
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let worker = Worker {
            id: resource_id,
            generation,
            period,
            initial_delay: self.config.initial_delay,
            table: Arc::clone(&self.table),
            inspector: Arc::clone(&self.inspector),
            bus: Arc::clone(&self.bus),
            sink: Arc::clone(&self.sink),
            cancel: cancel_rx,
        };

        thread::Builder::new()
            .name(format!("{}-{resource_id}", self.config.thread_name))
            .spawn(move || worker.run())
            .map_err(|e| LifecycleError::Spawn {
                resource_id,
                message: e.to_string(),
            })?;

        table.insert(
            resource_id,
            WatchEntry {
                generation,
                period,
                last: None,
                cancel: cancel_tx,
            },
        );
        drop(table);

        tracing::debug!(
            resource_id = %resource_id,
            period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            replaced,
            "watching resource"
        );
        Ok(())
    }

    /// Stop polling `resource_id` and discard its last snapshot.
    ///
    /// Returns whether a watch existed. Does not wait for an in-flight tick.
    pub fn stop(&self, resource_id: ResourceId) -> VastResult<bool> {
        let removed = self
            .table
            .lock()
            .map_err(|_| lock_err("monitor.stop"))?
            .remove(resource_id);

        let existed = removed.is_some();
        drop(removed);
        if existed {
            tracing::debug!(resource_id = %resource_id, "stopped watching resource");
        }
        Ok(existed)
    }

    /// Stop every watch and refuse further ones. Idempotent.
    pub fn close(&self) -> VastResult<()> {
        let drained = self.table.lock().map_err(|_| lock_err("monitor.close"))?.close();
        if !drained.is_empty() {
            tracing::debug!(stopped = drained.len(), "monitor closed");
        }
        Ok(())
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.table.lock().map_or(true, |table| table.is_closed())
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_watching(&self, resource_id: ResourceId) -> bool {
        self.table
            .lock()
            .is_ok_and(|table| table.get(resource_id).is_some())
    }

    /// Currently watched ids, ascending.
    #[must_use]
    pub fn watched(&self) -> Vec<ResourceId> {
        self.table.lock().map_or_else(|_| Vec::new(), |table| table.ids())
    }

    /// Effective period of the watch on `resource_id`.
    #[must_use]
    pub fn period(&self, resource_id: ResourceId) -> Option<Duration> {
        self.table
            .lock()
            .ok()
            .and_then(|table| table.get(resource_id).map(|entry| entry.period))
    }

    /// Last snapshot observed for `resource_id` by its current watch.
    #[must_use]
    pub fn last_snapshot(&self, resource_id: ResourceId) -> Option<Snapshot> {
        self.table
            .lock()
            .ok()
            .and_then(|table| table.get(resource_id).and_then(|entry| entry.last.clone()))
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        // Workers hold the table, not the monitor; closing drops their cancel senders.
        let _ = self.close();
    }
}
