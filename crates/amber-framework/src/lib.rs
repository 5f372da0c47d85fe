//! # Amber Framework
//!
//! Handler registration and dispatch for amber bots.
//!
//! This layer provides:
//! - Keyword [`Matcher`]s (literal, exact, regex, lists)
//! - [`Handler`]s with the prefix gate, custom predicates and async actions
//! - The [`BotHandlers`] registry with per-kind handler lists, event
//!   callbacks, overspeed handler, message middleware and timed tasks
//! - The [`Dispatcher`] that routes messages and events to the registry
//! - A tower [`HandlerService`] adapter
//!
//! The framework is transport-agnostic: it consumes
//! [`amber_core::Message`]s and [`amber_core::Event`]s and produces
//! [`amber_core::Chain`] replies. Wiring it to a platform is the runtime's job.

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod matcher;
pub mod registry;
pub mod reply;
pub mod service;
pub mod tasks;
pub mod verify;

pub use dispatcher::{Dispatched, Dispatcher, SelectionPolicy, SpeedLimit};
pub use error::{MessageSkipped, RegistrationError, RegistrationResult};
pub use handler::{Handler, Prefix, PrefixKeywords, VerifyFn};
pub use matcher::{Matcher, equal};
pub use registry::{BotHandlers, EventName, HandlerRegistration, IntoWords, MiddlewareFn, RegistryStats};
pub use reply::{BoxFuture, Callback, IntoReply, callback};
pub use service::{BoxedHandlerService, HandlerService};
pub use tasks::{TaskFn, TaskOutcome, TimedTask};
pub use verify::Verify;
