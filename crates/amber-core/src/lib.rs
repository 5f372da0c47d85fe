//! # Amber Core
//!
//! Foundation types shared by every layer of the amber bot framework.
//!
//! - [`Message`] / [`MessageKind`]: an inbound chat message and the kind of
//!   conversation it came from (private, group, temporary chat).
//! - [`Event`] / [`EventKind`]: generic platform events addressed by name.
//! - [`Chain`] / [`Segment`]: an outbound reply built from ordered segments.
//! - [`BoxError`] / [`ActionResult`]: what user callbacks may fail with.
//!
//! ```text
//! ┌─────────────┐     ┌────────────┐     ┌───────────┐     ┌──────────┐
//! │  Platform   │────▶│  Message   │────▶│  Handler  │────▶│  Chain   │
//! │ (external)  │     │  / Event   │     │ (matched) │     │ (reply)  │
//! └─────────────┘     └────────────┘     └───────────┘     └──────────┘
//! ```

pub mod chain;
pub mod error;
pub mod event;
pub mod message;

pub use chain::{Chain, Segment};
pub use error::{ActionResult, BoxError};
pub use event::{Event, EventKind};
pub use message::{Message, MessageKind, Outbound, ReplyTarget};
