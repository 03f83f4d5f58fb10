//! Error sinks for failures that never propagate to a caller.

use std::fmt;

use crate::error::VastError;
use crate::snapshot::ResourceId;

use super::model::EventKind;

/// Where a reported failure happened.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorContext {
    /// A scheduled fetch failed; the tick was skipped.
    Fetch { resource_id: ResourceId },

    /// A subscriber callback failed or panicked during publish.
    Handler {
        subscriber: String,
        bound_kind: EventKind,
        event_kind: EventKind,
        resource_id: ResourceId,
    },

    /// The bus could not read its registrations.
    Dispatch { event_kind: EventKind },
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch { resource_id } => write!(f, "fetch of resource {resource_id}"),
            Self::Handler {
                subscriber,
                bound_kind,
                event_kind,
                resource_id,
            } => write!(
                f,
                "handler {subscriber} ({bound_kind}) for {event_kind} on resource {resource_id}"
            ),
            Self::Dispatch { event_kind } => write!(f, "dispatch of {event_kind}"),
        }
    }
}

/// Receives `(context, error)` pairs for fetch and handler failures.
pub trait ErrorSink: Send + Sync {
    #[allow(missing_docs)]
    fn report(&self, context: &ErrorContext, error: &VastError);
}

/// Default sink: logs at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, context: &ErrorContext, error: &VastError) {
        tracing::warn!(context = %context, error = %error, "vastwatch failure");
    }
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopErrorSink;

impl ErrorSink for NoopErrorSink {
    fn report(&self, _context: &ErrorContext, _error: &VastError) {}
}

impl<F> ErrorSink for F
where
    F: Fn(&ErrorContext, &VastError) + Send + Sync,
{
    fn report(&self, context: &ErrorContext, error: &VastError) {
        self(context, error);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::FetchError;

    #[test]
    fn context_display() {
        let ctx = ErrorContext::Handler {
            subscriber: "Audit".to_string(),
            bound_kind: EventKind::Any,
            event_kind: EventKind::StateChanged,
            resource_id: ResourceId::new(9),
        };
        assert_eq!(
            ctx.to_string(),
            "handler Audit (any) for state_changed on resource 9"
        );
        assert_eq!(
            ErrorContext::Fetch { resource_id: ResourceId::new(3) }.to_string(),
            "fetch of resource 3"
        );
    }

    #[test]
    fn closure_sink_receives_reports() {
        let seen = Mutex::new(Vec::new());
        let sink = |ctx: &ErrorContext, err: &VastError| {
            seen.lock().unwrap().push((ctx.clone(), err.clone()));
        };

        let err: VastError = FetchError::transport("timeout").into();
        sink.report(&ErrorContext::Fetch { resource_id: ResourceId::new(1) }, &err);
        NoopErrorSink.report(&ErrorContext::Fetch { resource_id: ResourceId::new(1) }, &err);
        TracingErrorSink.report(&ErrorContext::Fetch { resource_id: ResourceId::new(1) }, &err);

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].1.is_fetch());
    }
}
