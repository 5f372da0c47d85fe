//! The handler registry.
//!
//! [`BotHandlers`] collects everything feature code registers during startup:
//!
//! - one ordered handler list per [`MessageKind`]; order is evaluation order
//! - event callbacks keyed by event name; several per name are allowed
//! - the shared prefix list used by [`Prefix::Global`] handlers
//! - two write-once hooks: the overspeed handler and the message middleware
//! - periodic [`TimedTask`]s
//!
//! The registry is an ordinary value. Build it, then hand it to a
//! [`Dispatcher`](crate::dispatcher::Dispatcher) (or the runtime) behind an
//! `Arc`:
//!
//! ```rust,ignore
//! let mut bot = BotHandlers::new();
//! bot.add_prefix(["兔兔", "/"]);
//!
//! bot.on_group_message("hello")
//!     .keywords(vec![equal("hi"), "hello".into()])
//!     .handler(|msg| async move { Chain::new().at(msg.user_id).text(" hello") });
//!
//! bot.on_private_message("dice")
//!     .verify(|msg| async move { msg.text.starts_with("roll") })
//!     .handler(|_msg| async { "4" });
//!
//! bot.on_event(EventName::of::<MemberJoinEvent>(), |_event| async { "welcome" })?;
//! bot.on_overspeed(|_msg| async { "slow down" })?;
//!
//! let dispatcher = Dispatcher::new(Arc::new(bot));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use amber_core::{Event, EventKind, Message, MessageKind};

use crate::error::{RegistrationError, RegistrationResult};
use crate::handler::{Handler, Prefix, PrefixKeywords, VerifyFn};
use crate::matcher::Matcher;
use crate::reply::{BoxFuture, Callback, IntoReply, callback};
use crate::tasks::{TaskOutcome, TimedTask};
use crate::verify::Verify;

/// A type-erased message middleware.
///
/// Receives every message before dispatch and returns the (possibly
/// rewritten) message, or `None` to drop it.
pub type MiddlewareFn = Arc<dyn Fn(Message) -> BoxFuture<'static, Option<Message>> + Send + Sync>;

/// Values accepted by [`BotHandlers::add_prefix`]: one word or several.
pub trait IntoWords {
    /// Converts into an ordered list of words.
    fn into_words(self) -> Vec<String>;
}

impl IntoWords for &str {
    fn into_words(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoWords for String {
    fn into_words(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoWords for Vec<String> {
    fn into_words(self) -> Vec<String> {
        self
    }
}

impl IntoWords for Vec<&str> {
    fn into_words(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl<const N: usize> IntoWords for [&str; N] {
    fn into_words(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

/// A resolved event name.
///
/// Built from a typed [`EventKind`] via [`EventName::of`] or from the raw
/// name string; both resolve to the same list in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName(String);

impl EventName {
    /// The name of a typed event.
    pub fn of<T: EventKind>() -> Self {
        Self(T::event_name().to_string())
    }

    /// Returns the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Sizes of the registry's collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub private_message_handlers: usize,
    pub group_message_handlers: usize,
    pub temp_message_handlers: usize,
    pub event_handlers: usize,
    pub timed_tasks: usize,
}

/// The collection of every registered handler, event callback and hook.
#[derive(Default)]
pub struct BotHandlers {
    prefix_keywords: PrefixKeywords,

    private_message_handlers: Vec<Handler>,
    group_message_handlers: Vec<Handler>,
    temp_message_handlers: Vec<Handler>,
    event_handlers: HashMap<String, Vec<Callback<Event>>>,

    overspeed_handler: Option<Callback<Message>>,
    message_middleware: Option<MiddlewareFn>,

    timed_tasks: Vec<TimedTask>,
}

impl BotHandlers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Prefixes
    // =========================================================================

    /// Appends words to the shared prefix list.
    ///
    /// Order is kept and duplicates are not removed.
    pub fn add_prefix(&mut self, words: impl IntoWords) {
        self.prefix_keywords.extend(words.into_words());
    }

    /// Returns a copy of the shared prefix list.
    pub fn prefix_keywords(&self) -> Vec<String> {
        self.prefix_keywords.to_vec()
    }

    // =========================================================================
    // Message handlers
    // =========================================================================

    /// Starts registering a private-message handler.
    ///
    /// Prefix checking defaults to off.
    pub fn on_private_message(&mut self, function_id: impl Into<String>) -> HandlerRegistration<'_> {
        HandlerRegistration::new(
            &mut self.private_message_handlers,
            &self.prefix_keywords,
            function_id.into(),
            Prefix::Disabled,
        )
    }

    /// Starts registering a group-message handler.
    ///
    /// Prefix checking defaults to the shared prefix list.
    pub fn on_group_message(&mut self, function_id: impl Into<String>) -> HandlerRegistration<'_> {
        HandlerRegistration::new(
            &mut self.group_message_handlers,
            &self.prefix_keywords,
            function_id.into(),
            Prefix::Global,
        )
    }

    /// Starts registering a temporary-chat handler.
    ///
    /// Prefix checking defaults to off.
    pub fn on_temp_message(&mut self, function_id: impl Into<String>) -> HandlerRegistration<'_> {
        HandlerRegistration::new(
            &mut self.temp_message_handlers,
            &self.prefix_keywords,
            function_id.into(),
            Prefix::Disabled,
        )
    }

    /// Returns the handlers for `kind` in evaluation order.
    pub fn handlers(&self, kind: MessageKind) -> &[Handler] {
        match kind {
            MessageKind::Private => &self.private_message_handlers,
            MessageKind::Group => &self.group_message_handlers,
            MessageKind::Temp => &self.temp_message_handlers,
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Registers a callback for an event.
    ///
    /// Callbacks accumulate: registering twice for the same name keeps both,
    /// and both run for that event.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::InvalidEventName`] if the name is blank.
    pub fn on_event<F, Fut, R>(&mut self, event: impl Into<EventName>, f: F) -> RegistrationResult<()>
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply,
    {
        let EventName(name) = event.into();
        if name.trim().is_empty() {
            return Err(RegistrationError::InvalidEventName(name));
        }

        debug!(event = %name, "Registered event handler");
        self.event_handlers.entry(name).or_default().push(callback(f));
        Ok(())
    }

    /// Returns the callbacks registered for `name` in registration order.
    pub fn event_handlers(&self, name: &str) -> &[Callback<Event>] {
        self.event_handlers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    // =========================================================================
    // Write-once hooks
    // =========================================================================

    /// Sets the handler invoked when a message trips the speed limit.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::OverspeedHandlerExists`] if one is already set;
    /// the first one stays bound.
    pub fn on_overspeed<F, Fut, R>(&mut self, f: F) -> RegistrationResult<()>
    where
        F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply,
    {
        if self.overspeed_handler.is_some() {
            return Err(RegistrationError::OverspeedHandlerExists);
        }
        self.overspeed_handler = Some(callback(f));
        Ok(())
    }

    /// Returns the overspeed handler.
    pub fn overspeed_handler(&self) -> Option<&Callback<Message>> {
        self.overspeed_handler.as_ref()
    }

    /// Sets the middleware applied to every message before dispatch.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::MessageMiddlewareExists`] if one is already set;
    /// the first one stays bound.
    pub fn handle_message<F, Fut>(&mut self, f: F) -> RegistrationResult<()>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Message>> + Send + 'static,
    {
        if self.message_middleware.is_some() {
            return Err(RegistrationError::MessageMiddlewareExists);
        }
        self.message_middleware = Some(Arc::new(move |msg: Message| Box::pin(f(msg))));
        Ok(())
    }

    /// Returns the message middleware.
    pub fn message_middleware(&self) -> Option<&MiddlewareFn> {
        self.message_middleware.as_ref()
    }

    // =========================================================================
    // Timed tasks
    // =========================================================================

    /// Registers a task run every `interval` by the runtime.
    pub fn timed_task<F, Fut, R>(&mut self, name: impl Into<String>, interval: Duration, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: TaskOutcome,
    {
        self.timed_tasks.push(TimedTask::new(name, interval, f));
    }

    /// Returns the registered tasks.
    pub fn timed_tasks(&self) -> &[TimedTask] {
        &self.timed_tasks
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Returns the sizes of every collection.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            private_message_handlers: self.private_message_handlers.len(),
            group_message_handlers: self.group_message_handlers.len(),
            temp_message_handlers: self.temp_message_handlers.len(),
            event_handlers: self.event_handlers.len(),
            timed_tasks: self.timed_tasks.len(),
        }
    }

    /// Returns a human-readable summary, one line per collection.
    pub fn detail(&self) -> Vec<String> {
        let stats = self.stats();
        vec![
            format!("- private_message_handlers ({})", stats.private_message_handlers),
            format!("- group_message_handlers ({})", stats.group_message_handlers),
            format!("- temp_message_handlers ({})", stats.temp_message_handlers),
            format!("- event_handlers ({})", stats.event_handlers),
            format!("- timed_tasks ({})", stats.timed_tasks),
        ]
    }
}

impl fmt::Debug for BotHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotHandlers")
            .field("prefix_keywords", &self.prefix_keywords)
            .field("stats", &self.stats())
            .field("overspeed_handler", &self.overspeed_handler.is_some())
            .field("message_middleware", &self.message_middleware.is_some())
            .finish()
    }
}

// =============================================================================
// HandlerRegistration
// =============================================================================

/// Builder returned by the `on_*_message` methods.
///
/// Nothing is registered until [`handler`](Self::handler) is called.
#[must_use = "call `.handler(..)` to register the handler"]
pub struct HandlerRegistration<'a> {
    target: &'a mut Vec<Handler>,
    prefix_keywords: PrefixKeywords,
    function_id: String,
    keywords: Option<Matcher>,
    verify: Option<VerifyFn>,
    check_prefix: Prefix,
}

impl<'a> HandlerRegistration<'a> {
    fn new(
        target: &'a mut Vec<Handler>,
        prefix_keywords: &PrefixKeywords,
        function_id: String,
        check_prefix: Prefix,
    ) -> Self {
        Self {
            target,
            prefix_keywords: prefix_keywords.clone(),
            function_id,
            keywords: None,
            verify: None,
            check_prefix,
        }
    }

    /// Sets the trigger keywords. Ignored when a custom predicate is set.
    pub fn keywords(mut self, keywords: impl Into<Matcher>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    /// Sets a custom async predicate replacing keyword matching.
    pub fn verify<F, Fut, R>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<Verify>,
    {
        self.verify = Some(Arc::new(move |msg: Arc<Message>| {
            let fut = f(msg);
            Box::pin(async move { fut.await.into() })
        }));
        self
    }

    /// Overrides the default prefix-check policy.
    pub fn check_prefix(mut self, prefix: impl Into<Prefix>) -> Self {
        self.check_prefix = prefix.into();
        self
    }

    /// Binds the callback and appends the handler to its list.
    pub fn handler<F, Fut, R>(self, f: F)
    where
        F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply,
    {
        let mut handler = Handler::new(self.function_id, f)
            .check_prefix(self.check_prefix)
            .prefix_keywords(self.prefix_keywords);

        handler = match (self.verify, self.keywords) {
            (Some(verify), _) => handler.custom_verify_boxed(verify),
            (None, Some(keywords)) => handler.keywords(keywords),
            (None, None) => handler,
        };

        debug!(function_id = %handler.function_id(), "Registered message handler");
        self.target.push(handler);
    }
}
