//! Error types for vastwatch.
//!
//! All errors are strongly typed using thiserror. Fetch and handler failures
//! are recoverable and only ever reach an [`ErrorSink`](crate::event::ErrorSink);
//! registration and lifecycle failures are returned to the caller.

use std::any::Any;

use thiserror::Error;

use crate::snapshot::ResourceId;

/// Failures raised by a [`ResourceInspector`](crate::snapshot::ResourceInspector).
///
/// A fetch failure only ever skips one tick.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transport failure: {message}")]
    Transport {
        message: String,
    },

    #[error("Resource not found: {resource_id}")]
    NotFound {
        resource_id: ResourceId,
    },

    #[error("Failed to decode resource payload: {message}")]
    Decode {
        message: String,
    },
}

impl FetchError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns true if a later fetch may succeed without intervention.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Errors raised while registering a subscriber on the event bus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Invalid handler on subscriber '{subscriber}': {reason}")]
    InvalidHandler {
        subscriber: String,
        reason: String,
    },
}

/// A failure raised by a subscriber callback during publish.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Handler failed: {message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error from any displayable cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::new(format!("handler panicked: {}", panic_message(payload)))
    }
}

/// Errors in the monitor lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Monitor is closed")]
    Closed,

    #[error("Failed to schedule watch for resource {resource_id}: {message}")]
    Spawn {
        resource_id: ResourceId,
        message: String,
    },
}

/// Top-level error type for vastwatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VastError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("{0}")]
    Handler(#[from] HandlerError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl VastError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a fetch error.
    #[must_use]
    pub const fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }

    /// Returns true if this is a registration error.
    #[must_use]
    pub const fn is_registration(&self) -> bool {
        matches!(self, Self::Registration(_))
    }

    /// Returns true if this is a handler error.
    #[must_use]
    pub const fn is_handler(&self) -> bool {
        matches!(self, Self::Handler(_))
    }

    /// Returns true if this is a lifecycle error.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

pub(crate) fn lock_err(context: &'static str) -> VastError {
    VastError::internal(format!("poisoned lock: {context}"))
}

/// Result type alias for vastwatch operations.
pub type VastResult<T> = Result<T, VastError>;
