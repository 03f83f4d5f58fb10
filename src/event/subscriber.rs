use std::fmt;

use crate::error::HandlerError;

use super::model::{Event, EventKind, Priority};

/// Callback bound by a subscriber for one event kind.
pub type HandlerFn<S> = dyn Fn(&S, &Event) -> Result<(), HandlerError> + Send + Sync;

/// One declared handler: kind, priority, cancellation policy and callback.
pub struct HandlerBinding<S> {
    pub(crate) kind: EventKind,
    pub(crate) priority: Priority,
    pub(crate) ignore_cancelled: bool,
    pub(crate) callback: Box<HandlerFn<S>>,
}

impl<S> HandlerBinding<S> {
    /// Bind `callback` to `kind` at `Normal` priority, skipping cancelled events.
    #[must_use]
    pub fn new<F>(kind: EventKind, callback: F) -> Self
    where
        F: Fn(&S, &Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            kind,
            priority: Priority::Normal,
            ignore_cancelled: true,
            callback: Box::new(callback),
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// When false the handler also runs for events already marked cancelled.
    #[must_use]
    pub fn ignore_cancelled(mut self, ignore: bool) -> Self {
        self.ignore_cancelled = ignore;
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn kind(&self) -> &EventKind {
        &self.kind
    }
}

impl<S> fmt::Debug for HandlerBinding<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("ignore_cancelled", &self.ignore_cancelled)
            .finish_non_exhaustive()
    }
}

/// An object that declares the handlers it wants invoked.
///
/// Bindings are read once at registration time.
///
/// ```rust,ignore
/// struct Notifier;
///
/// impl Subscriber for Notifier {
///     fn bindings(&self) -> Vec<HandlerBinding<Self>> {
///         vec![HandlerBinding::new(EventKind::ConnectivityReady, |_, ev| {
///             println!("{} ready", ev.resource_id());
///             Ok(())
///         })
///         .priority(Priority::Monitor)]
///     }
/// }
/// ```
pub trait Subscriber: Send + Sync + 'static {
    /// Handlers to register, in declaration order.
    fn bindings(&self) -> Vec<HandlerBinding<Self>>
    where
        Self: Sized;

    /// Name used in error reports.
    fn subscriber_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
