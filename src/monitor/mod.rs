//! Resource monitor.
//!
//! Watches resources that offer no push notifications by polling them through
//! a [`ResourceInspector`](crate::snapshot::ResourceInspector) and publishing
//! the edge-triggered transitions on an [`EventBus`](crate::event::EventBus).

/// Monitor configuration.
pub mod config;
/// Watch / stop / close.
pub mod control;
mod watch;
mod worker;

pub use config::MonitorConfig;
pub use control::ResourceMonitor;
