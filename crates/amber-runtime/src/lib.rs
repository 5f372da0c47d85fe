//! amber runtime - orchestration layer for the amber bot framework.
//!
//! This crate provides:
//! - Layered configuration (`ConfigLoader`, `AmberConfig`)
//! - Logging setup (`LoggingBuilder`)
//! - Buffered message persistence (`MessageStack`, `SqliteSink`)
//! - The event loop (`AmberRuntime`) with timed tasks and graceful shutdown
//!
//! ```ignore
//! use amber_runtime::AmberRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut bot = BotHandlers::new();
//!     bot.on_private_message("ping").keywords("ping").handler(|_| async { "pong" });
//!
//!     let runtime = AmberRuntime::builder().build(bot)?;
//!     let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(256);
//!     let (outbound_tx, outbound_rx) = tokio::sync::mpsc::channel(256);
//!     spawn_transport(inbound_tx, outbound_rx);
//!
//!     runtime.run(inbound_rx, outbound_tx).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod recorder;
pub mod runtime;

// Re-exports
pub use config::{AmberConfig, BotConfig, ConfigError, ConfigLoader, ConfigResult, RecorderConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use recorder::{
    MemorySink, MessageRecord, MessageStack, RecordSink, RecorderError, RecorderResult, SqliteSink,
};
pub use runtime::{AmberRuntime, Incoming, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
