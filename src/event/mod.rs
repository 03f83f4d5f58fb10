//! Event model and the in-process event bus.
//!
//! Subscribers declare their handlers explicitly through [`Subscriber::bindings`];
//! the bus orders them by [`Priority`] and honours the cancellable capability
//! of events that carry it.

/// Priority-ordered dispatcher.
pub mod bus;
/// Event, kind and priority types.
pub mod model;
/// Error reporting hooks.
pub mod sink;
/// Subscriber capability and handler bindings.
pub mod subscriber;

pub use bus::{EventBus, PublishReport, SubscriberId};
pub use model::{Event, EventKind, EventPayload, Priority};
pub use sink::{ErrorContext, ErrorSink, NoopErrorSink, TracingErrorSink};
pub use subscriber::{HandlerBinding, HandlerFn, Subscriber};
