//! Main runtime orchestration.
//!
//! [`AmberRuntime`] owns a [`Dispatcher`] over the application's
//! [`BotHandlers`], the optional message recorder, and the background jobs.
//! It does not speak any chat protocol: inbound traffic arrives as
//! [`Incoming`] values on a channel, and replies leave as [`Outbound`]
//! values on another, so any transport can be plugged in front.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use amber_runtime::AmberRuntime;
//!
//! let runtime = AmberRuntime::builder()
//!     .config_file("amber.toml")
//!     .build(handlers)?;
//!
//! let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(256);
//! let (outbound_tx, outbound_rx) = tokio::sync::mpsc::channel(256);
//! // ...hand inbound_tx / outbound_rx to the transport...
//!
//! runtime.run(inbound_rx, outbound_tx).await?;
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::join_all;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use amber_core::{Event, Message, Outbound};
use amber_framework::{BotHandlers, Dispatcher, SpeedLimit, TimedTask};

use crate::config::{AmberConfig, ConfigLoader, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::recorder::{MessageStack, RecordSink, SqliteSink};

/// Inbound traffic handed to the runtime by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Message(Message),
    Event(Event),
}

impl From<Message> for Incoming {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<Event> for Incoming {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

/// The amber runtime.
pub struct AmberRuntime {
    config: AmberConfig,
    dispatcher: Arc<Dispatcher>,
    recorder: Option<Arc<MessageStack>>,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl AmberRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Validates the configuration, initializes logging and opens the
    /// configured message database.
    pub fn from_config(config: AmberConfig, handlers: BotHandlers) -> RuntimeResult<Self> {
        RuntimeBuilder::new().config(config).build(handlers)
    }

    fn assemble(
        config: AmberConfig,
        mut handlers: BotHandlers,
        speed_limit: Option<Arc<dyn SpeedLimit>>,
        record_sink: Option<Arc<dyn RecordSink>>,
    ) -> RuntimeResult<Self> {
        handlers.add_prefix(config.bot.prefix_keywords.clone());

        for line in handlers.detail() {
            info!("{line}");
        }

        let mut dispatcher = Dispatcher::new(Arc::new(handlers)).with_policy(config.bot.selection);
        if let Some(limit) = speed_limit {
            dispatcher = dispatcher.with_shared_speed_limit(limit);
        }

        let recorder = if config.recorder.enabled {
            let sink = match record_sink {
                Some(sink) => sink,
                None => Arc::new(SqliteSink::open(&config.recorder.database)?),
            };
            Some(Arc::new(MessageStack::new(sink)))
        } else {
            None
        };

        info!(
            selection = ?config.bot.selection,
            recorder = recorder.is_some(),
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            recorder,
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AmberConfig {
        &self.config
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns the message recorder, when enabled.
    pub fn recorder(&self) -> Option<&Arc<MessageStack>> {
        self.recorder.as_ref()
    }

    /// Returns whether a run loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the active run loop. Runs started afterwards end immediately.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs until Ctrl+C, SIGTERM, [`shutdown`](Self::shutdown), or the
    /// inbound channel closing.
    pub async fn run(
        &self,
        inbound: mpsc::Receiver<Incoming>,
        outbound: mpsc::Sender<Outbound>,
    ) -> RuntimeResult<()> {
        info!("amber runtime is now running. Press Ctrl+C to stop.");
        self.run_until(inbound, outbound, wait_for_shutdown()).await
    }

    /// Runs until `shutdown` resolves, [`shutdown`](Self::shutdown) is
    /// called, or the inbound channel closes.
    ///
    /// Each inbound item is dispatched on its own task. On the way out the
    /// runtime waits for in-flight dispatches, stops the timed tasks, and
    /// flushes the recorder one last time.
    pub async fn run_until<F>(
        &self,
        mut inbound: mpsc::Receiver<Incoming>,
        outbound: mpsc::Sender<Outbound>,
        shutdown: F,
    ) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        // Dropping this future mid-run still stops the background jobs, which
        // lets the recorder perform its final flush.
        let token = self.cancel.child_token();
        let _stop_background = token.clone().drop_guard();
        let mut background = Vec::new();

        if let Some(stack) = &self.recorder {
            let period = self.config.recorder.interval();
            background.push(tokio::spawn(Arc::clone(stack).run(period, token.clone())));
        }

        for task in self.dispatcher.handlers().timed_tasks() {
            background.push(tokio::spawn(run_timed_task(task.clone(), token.clone())));
        }

        info!("Runtime started");

        let tracker = TaskTracker::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = token.cancelled() => {
                    info!("Runtime cancelled");
                    break;
                }
                incoming = inbound.recv() => match incoming {
                    Some(incoming) => {
                        tracker.spawn(handle_incoming(
                            Arc::clone(&self.dispatcher),
                            self.recorder.clone(),
                            outbound.clone(),
                            incoming,
                        ));
                    }
                    None => {
                        info!("Inbound channel closed");
                        break;
                    }
                },
            }
        }

        tracker.close();
        tracker.wait().await;
        debug!("In-flight dispatches finished");

        token.cancel();
        for result in join_all(background).await {
            if let Err(e) = result {
                error!(error = %e, "Background task failed");
            }
        }

        info!("Runtime stopped");
        Ok(())
    }
}

/// Clears the running flag when `run_until` returns or is dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for AmberRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmberRuntime")
            .field("dispatcher", &self.dispatcher)
            .field("recorder", &self.recorder)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn handle_incoming(
    dispatcher: Arc<Dispatcher>,
    recorder: Option<Arc<MessageStack>>,
    outbound: mpsc::Sender<Outbound>,
    incoming: Incoming,
) {
    match incoming {
        Incoming::Message(message) => {
            let target = message.reply_target();
            let original = recorder.as_ref().map(|_| message.clone());

            let outcome = dispatcher.handle_message(message).await;

            if let (Some(stack), Some(original)) = (&recorder, original) {
                stack.insert(&original, outcome.is_handled());
            }
            if let Some(chain) = outcome.reply {
                deliver(&outbound, Outbound {
                    target: Some(target),
                    chain,
                })
                .await;
            }
        }
        Incoming::Event(event) => {
            for chain in dispatcher.handle_event(event).await {
                deliver(&outbound, Outbound {
                    target: None,
                    chain,
                })
                .await;
            }
        }
    }
}

async fn deliver(outbound: &mpsc::Sender<Outbound>, reply: Outbound) {
    if outbound.send(reply).await.is_err() {
        warn!("Outbound channel closed, dropping reply");
    }
}

async fn run_timed_task(task: TimedTask, cancel: CancellationToken) {
    let period = task.interval();
    if period.is_zero() {
        warn!(task = task.name(), "Timed task has a zero interval, not scheduling it");
        return;
    }

    let span = info_span!("timed_task", name = task.name());
    async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match AssertUnwindSafe(task.run_once()).catch_unwind().await {
                        Ok(Ok(())) => debug!("Timed task finished"),
                        Ok(Err(e)) => warn!(error = %e, "Timed task failed"),
                        Err(_) => error!("Timed task panicked"),
                    }
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, waiting for Ctrl+C only");
                if let Err(e) = signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for an [`AmberRuntime`].
///
/// ```rust,ignore
/// let runtime = AmberRuntime::builder()
///     .config_file("config/amber.toml")
///     .profile("production")
///     .speed_limit(my_limiter)
///     .build(handlers)?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<AmberConfig>,
    speed_limit: Option<Arc<dyn SpeedLimit>>,
    record_sink: Option<Arc<dyn RecordSink>>,
    init_logging: bool,
}

impl RuntimeBuilder {
    /// Creates a builder searching the current directory for configuration.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            speed_limit: None,
            record_sink: None,
            init_logging: true,
        }
    }

    /// Loads exactly this configuration file.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: AmberConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as-is instead of loading from files and environment.
    pub fn config(mut self, config: AmberConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Installs a speed-limit hook on the dispatcher.
    pub fn speed_limit(mut self, limit: impl SpeedLimit) -> Self {
        self.speed_limit = Some(Arc::new(limit));
        self
    }

    /// Writes recorded messages to `sink` instead of the configured database.
    pub fn record_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.record_sink = Some(sink);
        self
    }

    /// Whether `build` installs the global logging subscriber (default: true).
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Loads and validates the configuration, then builds the runtime.
    pub fn build(self, handlers: BotHandlers) -> RuntimeResult<AmberRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging && !logging::init_from_config(&config.logging) {
            debug!("Logging already initialized");
        }

        AmberRuntime::assemble(config, handlers, self.speed_limit, self.record_sink)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::recorder::MemorySink;
    use amber_core::{MessageKind, ReplyTarget};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn test_config() -> AmberConfig {
        let mut config = AmberConfig::default();
        config.bot.prefix_keywords = vec!["/".to_string()];
        config
    }

    fn echo_bot() -> BotHandlers {
        let mut bot = BotHandlers::new();
        bot.on_group_message("echo")
            .keywords("echo")
            .handler(|msg: Arc<Message>| async move { format!("you said {}", msg.text) });
        bot.on_event("MemberJoin", |_e| async { "welcome" }).unwrap();
        bot
    }

    #[tokio::test]
    async fn test_round_trip_with_recording() {
        let sink = Arc::new(MemorySink::new());
        let runtime = Arc::new(
            AmberRuntime::builder()
                .config(test_config())
                .record_sink(sink.clone())
                .init_logging(false)
                .build(echo_bot())
                .unwrap(),
        );
        assert_eq!(runtime.dispatcher().handlers().prefix_keywords(), vec!["/"]);

        let (in_tx, in_rx) = mpsc::channel::<Incoming>(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let handle = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move {
                runtime
                    .run_until(in_rx, out_tx, std::future::pending())
                    .await
            }
        });

        in_tx.send(Message::group(1, 2, "/echo hi").into()).await.unwrap();
        let reply = out_rx.recv().await.unwrap();
        assert_eq!(
            reply.target,
            Some(ReplyTarget {
                kind: MessageKind::Group,
                user_id: 2,
                group_id: Some(1),
            })
        );
        assert_eq!(reply.chain.plain_text(), "you said /echo hi");

        in_tx
            .send(Event::new("MemberJoin", serde_json::Value::Null).into())
            .await
            .unwrap();
        let welcome = out_rx.recv().await.unwrap();
        assert_eq!(welcome.target, None);
        assert_eq!(welcome.chain.plain_text(), "welcome");

        // No prefix: ignored, but still recorded.
        in_tx.send(Message::group(1, 3, "echo").into()).await.unwrap();

        drop(in_tx);
        handle.await.unwrap().unwrap();
        assert!(!runtime.is_running());

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].classify, "call");
        assert_eq!(records[0].user_id, 2);
        assert_eq!(records[1].classify, "");
        assert_eq!(records[1].user_id, 3);
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_tasks_run_until_shutdown() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let mut bot = BotHandlers::new();
        bot.timed_task("tick", Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut config = AmberConfig::default();
        config.recorder.enabled = false;
        let runtime = AmberRuntime::builder()
            .config(config)
            .init_logging(false)
            .build(bot)
            .unwrap();

        let (_in_tx, in_rx) = mpsc::channel(1);
        let (out_tx, _out_rx) = mpsc::channel(1);
        runtime
            .run_until(in_rx, out_tx, tokio::time::sleep(Duration::from_secs(35)))
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_stops_background_and_can_restart() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let mut bot = echo_bot();
        bot.timed_task("tick", Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let sink = Arc::new(MemorySink::new());
        let runtime = AmberRuntime::builder()
            .config(test_config())
            .record_sink(sink.clone())
            .init_logging(false)
            .build(bot)
            .unwrap();

        let (in_tx, in_rx) = mpsc::channel::<Incoming>(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        in_tx.send(Message::group(1, 2, "/echo hi").into()).await.unwrap();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            runtime.run_until(in_rx, out_tx, std::future::pending()),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(!runtime.is_running());
        assert_eq!(out_rx.recv().await.unwrap().chain.plain_text(), "you said /echo hi");

        // The recorder flushes on cancellation and the timed task never fires.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sink.records().len(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let (_in_tx, in_rx) = mpsc::channel::<Incoming>(1);
        let (out_tx, _out_rx) = mpsc::channel(1);
        runtime.run_until(in_rx, out_tx, async {}).await.unwrap();
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let mut config = AmberConfig::default();
        config.recorder.enabled = false;
        let runtime = Arc::new(
            AmberRuntime::builder()
                .config(config)
                .init_logging(false)
                .build(BotHandlers::new())
                .unwrap(),
        );

        let (_in_tx, in_rx) = mpsc::channel(1);
        let (out_tx, _out_rx) = mpsc::channel(1);
        runtime.shutdown();
        runtime
            .run_until(in_rx, out_tx, std::future::pending())
            .await
            .unwrap();
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_speed_limit_from_builder() {
        let mut bot = echo_bot();
        bot.on_overspeed(|_m| async { "too fast" }).unwrap();

        let mut config = test_config();
        config.recorder.enabled = false;
        let runtime = AmberRuntime::builder()
            .config(config)
            .speed_limit(|_msg: &Message| false)
            .init_logging(false)
            .build(bot)
            .unwrap();

        let outcome = runtime
            .dispatcher()
            .handle_message(Message::group(1, 2, "/echo"))
            .await;
        assert_eq!(outcome.reply.map(|c| c.plain_text()).as_deref(), Some("too fast"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AmberConfig::default();
        config.recorder.interval_secs = 0;
        let err = AmberRuntime::builder()
            .config(config)
            .init_logging(false)
            .build(BotHandlers::new())
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::ValidationError { .. })
        ));
    }
}
