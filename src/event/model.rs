//! Event, kind and priority types.
//!
//! Events are immutable once built. The only mutable part is the optional
//! cancellation flag, which is atomic so every handler invoked later in the
//! same publish observes it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::snapshot::{PortMapping, ResourceId};

/// Kind-specific event data.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Lifecycle state or secondary status changed between two ticks.
    StateChanged {
        previous_state: String,
        state: String,
        previous_status: String,
        status: String,
    },

    /// Connectivity host and port became valid.
    ConnectivityReady {
        host: String,
        port: u16,
    },

    /// A structured port table appeared.
    PortMappingObserved {
        mapping: PortMapping,
        public_address: String,
    },

    /// Caller-defined event published through the same bus.
    Custom {
        name: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

/// A published event.
#[derive(Debug)]
pub struct Event {
    id: Uuid,
    resource_id: ResourceId,
    created_at: DateTime<Utc>,
    payload: EventPayload,
    cancellation: Option<AtomicBool>,
}

impl Event {
    /// Create a non-cancellable event stamped with the current time.
    #[must_use]
    pub fn new(resource_id: ResourceId, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id,
            created_at: Utc::now(),
            payload,
            cancellation: None,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn state_changed(
        resource_id: ResourceId,
        previous_state: impl Into<String>,
        state: impl Into<String>,
        previous_status: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self::new(
            resource_id,
            EventPayload::StateChanged {
                previous_state: previous_state.into(),
                state: state.into(),
                previous_status: previous_status.into(),
                status: status.into(),
            },
        )
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn connectivity_ready(resource_id: ResourceId, host: impl Into<String>, port: u16) -> Self {
        Self::new(
            resource_id,
            EventPayload::ConnectivityReady {
                host: host.into(),
                port,
            },
        )
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn port_mapping_observed(
        resource_id: ResourceId,
        mapping: PortMapping,
        public_address: impl Into<String>,
    ) -> Self {
        Self::new(
            resource_id,
            EventPayload::PortMappingObserved {
                mapping,
                public_address: public_address.into(),
            },
        )
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn custom(resource_id: ResourceId, name: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(
            resource_id,
            EventPayload::Custom {
                name: name.into(),
                data,
            },
        )
    }

    /// Give this event the cancellable capability (initially not cancelled).
    #[must_use]
    pub fn cancellable(mut self) -> Self {
        self.cancellation = Some(AtomicBool::new(false));
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// The concrete kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::StateChanged { .. } => EventKind::StateChanged,
            EventPayload::ConnectivityReady { .. } => EventKind::ConnectivityReady,
            EventPayload::PortMappingObserved { .. } => EventKind::PortMappingObserved,
            EventPayload::Custom { name, .. } => EventKind::Custom(name.clone()),
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        self.cancellation.is_some()
    }

    /// Always false for non-cancellable events.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Set the cancelled flag. Returns false (and does nothing) if the event
    /// is not cancellable.
    pub fn set_cancelled(&self, cancelled: bool) -> bool {
        match &self.cancellation {
            Some(flag) => {
                flag.store(cancelled, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

impl Clone for Event {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            resource_id: self.resource_id,
            created_at: self.created_at,
            payload: self.payload.clone(),
            cancellation: self
                .cancellation
                .as_ref()
                .map(|flag| AtomicBool::new(flag.load(Ordering::SeqCst))),
        }
    }
}

/// Declared event kinds, including the two abstract ones every handler may bind to.
///
/// `Any` is the ancestor of every event and `Cancellable` matches every event
/// carrying the cancellable capability.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum EventKind {
    Any,
    Cancellable,
    StateChanged,
    ConnectivityReady,
    PortMappingObserved,
    Custom(String),
}

const RESERVED_NAMES: [&str; 5] = [
    "any",
    "cancellable",
    "state_changed",
    "connectivity_ready",
    "port_mapping_observed",
];

impl EventKind {
    #[allow(missing_docs)]
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// True if `event` is of this kind or this kind is one of its ancestors or capabilities.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        match (self, event.payload()) {
            (Self::Any, _) => true,
            (Self::Cancellable, _) => event.is_cancellable(),
            (Self::StateChanged, EventPayload::StateChanged { .. })
            | (Self::ConnectivityReady, EventPayload::ConnectivityReady { .. })
            | (Self::PortMappingObserved, EventPayload::PortMappingObserved { .. }) => true,
            (Self::Custom(expected), EventPayload::Custom { name, .. }) => expected == name,
            _ => false,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Any => "any",
            Self::Cancellable => "cancellable",
            Self::StateChanged => "state_changed",
            Self::ConnectivityReady => "connectivity_ready",
            Self::PortMappingObserved => "port_mapping_observed",
            Self::Custom(name) => name,
        }
    }

    /// Reject kinds a handler cannot meaningfully bind to.
    pub(crate) fn validate(&self) -> Result<(), String> {
        let Self::Custom(name) = self else {
            return Ok(());
        };
        if name.trim().is_empty() {
            return Err("custom event name cannot be empty".to_string());
        }
        if name.trim() != name {
            return Err(format!("custom event name '{name}' has surrounding whitespace"));
        }
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(format!("custom event name '{name}' shadows a built-in kind"));
        }
        Ok(())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handler priority. Handlers run from `Lowest` to `Monitor`.
///
/// `Monitor` handlers should observe the outcome, not change it.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
    Monitor,
}

impl Priority {
    /// All levels in execution order.
    pub const ALL: [Self; 6] = [
        Self::Lowest,
        Self::Low,
        Self::Normal,
        Self::High,
        Self::Highest,
        Self::Monitor,
    ];
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn id() -> ResourceId {
        ResourceId::new(11)
    }

    #[test]
    fn priority_scale_is_ordered() {
        for pair in Priority::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn kind_hierarchy_matching() {
        let ready = Event::connectivity_ready(id(), "h", 22);
        assert!(EventKind::Any.matches(&ready));
        assert!(EventKind::ConnectivityReady.matches(&ready));
        assert!(!EventKind::StateChanged.matches(&ready));
        assert!(!EventKind::Cancellable.matches(&ready));

        let custom = Event::custom(id(), "billing", json!({"usd": 1.5})).cancellable();
        assert!(EventKind::Cancellable.matches(&custom));
        assert!(EventKind::custom("billing").matches(&custom));
        assert!(!EventKind::custom("other").matches(&custom));
        assert_eq!(custom.kind(), EventKind::custom("billing"));
    }

    #[test]
    fn cancellation_only_on_cancellable_events() {
        let plain = Event::state_changed(id(), "a", "b", "c", "d");
        assert!(!plain.set_cancelled(true));
        assert!(!plain.is_cancelled());

        let ev = Event::custom(id(), "x", serde_json::Value::Null).cancellable();
        assert!(!ev.is_cancelled());
        assert!(ev.set_cancelled(true));
        assert!(ev.is_cancelled());

        let cloned = ev.clone();
        assert!(cloned.is_cancelled());
        assert_eq!(cloned.id(), ev.id());
        ev.set_cancelled(false);
        assert!(cloned.is_cancelled());
    }

    #[test]
    fn custom_kind_validation() {
        assert!(EventKind::StateChanged.validate().is_ok());
        assert!(EventKind::custom("billing").validate().is_ok());
        assert!(EventKind::custom("").validate().is_err());
        assert!(EventKind::custom(" x ").validate().is_err());
        assert!(EventKind::custom("state_changed").validate().is_err());
    }

    #[test]
    fn payload_serializes_tagged() {
        let ev = Event::state_changed(id(), "loading", "running", "created", "running");
        let v = serde_json::to_value(ev.payload()).unwrap();
        assert_eq!(v["type"], "state_changed");
        assert_eq!(v["previous_state"], "loading");
        assert_eq!(v["status"], "running");
    }
}
