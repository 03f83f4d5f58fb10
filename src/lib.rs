//! # vastwatch - state monitoring for remotely managed compute instances
//!
//! Rented GPU instances expose their state only through a REST endpoint. This
//! crate polls that endpoint per instance, turns consecutive snapshots into
//! edge-triggered events and delivers them through an in-process,
//! priority-ordered event bus.
//!
//! ## Core Concepts
//!
//! - **Snapshot**: everything observable about an instance at one instant
//! - **Event**: a state change, connectivity becoming ready, or a port table appearing
//! - **EventBus**: explicitly constructed dispatcher; subscribers declare their handlers
//! - **ResourceMonitor**: one polling worker per watched instance
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use vastwatch::{
//!     EventBus, EventKind, HandlerBinding, MonitorConfig, Priority, ResourceId,
//!     ResourceMonitor, Subscriber,
//! };
//!
//! struct SshNotifier;
//!
//! impl Subscriber for SshNotifier {
//!     fn bindings(&self) -> Vec<HandlerBinding<Self>> {
//!         vec![HandlerBinding::new(EventKind::ConnectivityReady, |_, ev| {
//!             tracing::info!(resource_id = %ev.resource_id(), "ssh ready");
//!             Ok(())
//!         })
//!         .priority(Priority::Monitor)]
//!     }
//! }
//!
//! let bus = Arc::new(EventBus::new());
//! let notifier = Arc::new(SshNotifier);
//! bus.register(&notifier)?;
//!
//! let monitor = ResourceMonitor::new(MonitorConfig::default(), inspector, Arc::clone(&bus));
//! monitor.watch(ResourceId::new(7), Duration::from_secs(2))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod event;
pub mod monitor;
pub mod snapshot;

// Re-export primary types at crate root for convenience
pub use error::{
	FetchError, HandlerError, LifecycleError, RegistrationError, VastError, VastResult,
};
pub use event::{
	ErrorContext, ErrorSink, Event, EventBus, EventKind, EventPayload, HandlerBinding,
	NoopErrorSink, Priority, PublishReport, Subscriber, SubscriberId, TracingErrorSink,
};
pub use monitor::{MonitorConfig, ResourceMonitor};
pub use snapshot::{diff, HostBinding, PortMapping, ResourceId, ResourceInspector, Snapshot};
