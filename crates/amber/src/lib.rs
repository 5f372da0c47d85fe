//! # amber
//!
//! A keyword-driven chat bot framework for Rust.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐ Incoming ┌──────────────┐     ┌────────────┐     ┌──────────────────────┐
//! │ Transport │─────────▶│ AmberRuntime │────▶│ Dispatcher │────▶│ BotHandlers          │
//! │ (yours)   │◀─────────│              │     │            │     │  private / group /   │
//! └───────────┘ Outbound └──────────────┘     └────────────┘     │  temp / events       │
//!                              │                                 └──────────────────────┘
//!                              ▼
//!                         MessageStack ──▶ SQLite
//! ```
//!
//! - **Handlers**: an async action guarded by a prefix gate, keywords or a
//!   custom predicate
//! - **Registry**: ordered handler lists per conversation kind, event
//!   callbacks, overspeed handler, message middleware, timed tasks
//! - **Dispatcher**: picks the handler for each message and isolates failures
//! - **Runtime**: configuration, logging, recording and the event loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use amber::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut bot = BotHandlers::new();
//!     bot.add_prefix(["兔兔", "/"]);
//!
//!     bot.on_group_message("hello")
//!         .keywords(vec![equal("hi"), "hello".into()])
//!         .handler(|msg| async move { Chain::new().at(msg.user_id).text(" hello!") });
//!
//!     let runtime = AmberRuntime::builder().build(bot)?;
//!     let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(256);
//!     let (outbound_tx, outbound_rx) = tokio::sync::mpsc::channel(256);
//!     // connect inbound_tx / outbound_rx to your platform here
//!
//!     runtime.run(inbound_rx, outbound_tx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use amber_core as core;
pub use amber_framework as framework;
pub use amber_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use amber::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use amber_runtime::{AmberConfig, AmberRuntime, Incoming};

    // Registration
    pub use amber_framework::{
        BotHandlers, EventName, Handler, Matcher, Prefix, RegistrationError, SelectionPolicy,
        SpeedLimit, Verify, equal,
    };

    // Data model
    pub use amber_core::{
        BoxError, Chain, Event, EventKind, Message, MessageKind, Outbound, ReplyTarget, Segment,
    };
}
