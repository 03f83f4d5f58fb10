//! Snapshot differ: turns two consecutive snapshots into edge-triggered events.
//!
//! Rules are independent and evaluated every tick. When several fire together
//! they are emitted as state change, then connectivity, then port mapping.
//! Without a previous snapshot no state change is emitted, but readiness and
//! mapping fire if already true on first observation.

use crate::event::Event;

use super::record::Snapshot;

/// Events describing the transition from `previous` to `current`.
#[must_use]
pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<Event> {
    let mut events = Vec::new();
    let id = current.resource_id;

    if let Some(prev) = previous {
        if prev.state != current.state || prev.status != current.status {
            events.push(Event::state_changed(
                id,
                prev.state.clone(),
                current.state.clone(),
                prev.status.clone(),
                current.status.clone(),
            ));
        }
    }

    let was_ready = previous.is_some_and(Snapshot::is_connectivity_ready);
    if !was_ready && current.is_connectivity_ready() {
        events.push(Event::connectivity_ready(id, current.host.clone(), current.port));
    }

    let was_mapped = previous.is_some_and(Snapshot::is_port_mapped);
    if !was_mapped {
        if let Some(mapping) = current.port_mapping.as_ref().filter(|m| !m.is_empty()) {
            events.push(Event::port_mapping_observed(
                id,
                mapping.clone(),
                current.public_address_or_host(),
            ));
        }
    }

    events
}
