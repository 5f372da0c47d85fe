//! Error types for the amber framework.

use thiserror::Error;

/// Returned by [`HandlerService`](crate::service::HandlerService) when the
/// wrapped handler's verification does **not** match.
///
/// Callers should treat this as "not for me" rather than a failure.
#[derive(Debug, Clone, Error)]
#[error("message skipped by handler verification")]
pub struct MessageSkipped;

/// Errors raised synchronously while registering handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A second overspeed handler was registered.
    #[error("only one overspeed handler can exist")]
    OverspeedHandlerExists,

    /// A second message middleware was registered.
    #[error("only one message middleware can exist")]
    MessageMiddlewareExists,

    /// The event name does not name anything.
    #[error("invalid event name {0:?}: expected an event kind or a non-empty event name")]
    InvalidEventName(String),
}

/// Result type for registration operations.
pub type RegistrationResult<T> = Result<T, RegistrationError>;
