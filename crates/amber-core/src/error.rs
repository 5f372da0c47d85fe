//! Error aliases shared by user callbacks.

use crate::chain::Chain;

/// A type-erased error raised by a user callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The normalized outcome of running a handler or event callback.
///
/// `Ok(None)` means the callback ran but has nothing to send back.
pub type ActionResult = Result<Option<Chain>, BoxError>;
