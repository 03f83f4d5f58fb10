//! Resource snapshots and the transitions between them.
//!
//! A [`ResourceInspector`] produces [`Snapshot`]s; [`diff`] compares two of
//! them and yields the events a tick should publish.

/// Snapshot differ.
pub mod diff;
/// External snapshot source.
pub mod inspector;
/// Payload normalization.
pub mod normalize;
/// Snapshot record types.
pub mod record;

pub use diff::diff;
pub use inspector::ResourceInspector;
pub use record::{HostBinding, PortMapping, ResourceId, Snapshot};
