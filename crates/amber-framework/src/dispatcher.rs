//! Message and event dispatch.
//!
//! The [`Dispatcher`] drives a [`BotHandlers`] registry. For every message it:
//!
//! 1. Runs the message middleware, if any. `None` or a panic drops the
//!    message.
//! 2. Asks the [`SpeedLimit`] hook, if any. A denied message goes to the
//!    overspeed handler instead of normal dispatch. A panicking hook lets
//!    the message through.
//! 3. Walks the handler list for the message kind in registration order,
//!    calling [`Handler::verify`] and choosing a handler according to the
//!    [`SelectionPolicy`].
//! 4. Runs the chosen handler's action. Errors and panics are logged and
//!    never escape the dispatcher.
//!
//! Events are simpler: every callback registered under the event name runs,
//! in registration order, each isolated from the others.
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::new(Arc::new(bot))
//!     .with_policy(SelectionPolicy::HighestPriority);
//!
//! let outcome = dispatcher.handle_message(Message::group(1, 2, "兔兔hello")).await;
//! if let Some(reply) = outcome.reply {
//!     send(reply).await;
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info_span, trace, warn};

use amber_core::{ActionResult, Chain, Event, Message};

use crate::handler::Handler;
use crate::registry::BotHandlers;
use crate::verify::Verify;

/// How a handler is chosen when several verify positively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Stop at the first positive handler.
    #[default]
    FirstMatch,
    /// Verify every handler and take the highest priority. Ties go to the
    /// handler registered first.
    HighestPriority,
}

/// Rate-limit hook consulted before normal dispatch.
///
/// Returning `false` routes the message to the overspeed handler.
pub trait SpeedLimit: Send + Sync + 'static {
    fn allow(&self, message: &Message) -> bool;
}

impl<F> SpeedLimit for F
where
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    fn allow(&self, message: &Message) -> bool {
        self(message)
    }
}

/// The outcome of dispatching one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatched {
    /// The handler whose action ran, if any.
    pub function_id: Option<String>,
    /// The reply to deliver, if any.
    pub reply: Option<Chain>,
}

impl Dispatched {
    /// Nothing ran and there is nothing to send.
    pub fn skipped() -> Self {
        Self::default()
    }

    /// Returns `true` if a handler action ran for the message.
    pub fn is_handled(&self) -> bool {
        self.function_id.is_some()
    }
}

/// Routes messages and events to the handlers of a registry.
pub struct Dispatcher {
    handlers: Arc<BotHandlers>,
    policy: SelectionPolicy,
    speed_limit: Option<Arc<dyn SpeedLimit>>,
    usage: Mutex<HashMap<String, u64>>,
}

impl Dispatcher {
    /// Creates a first-match dispatcher with no speed limit.
    pub fn new(handlers: Arc<BotHandlers>) -> Self {
        Self {
            handlers,
            policy: SelectionPolicy::default(),
            speed_limit: None,
            usage: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the selection policy.
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Installs a speed-limit hook.
    pub fn with_speed_limit(self, limit: impl SpeedLimit) -> Self {
        self.with_shared_speed_limit(Arc::new(limit))
    }

    /// Installs an already shared speed-limit hook.
    pub fn with_shared_speed_limit(mut self, limit: Arc<dyn SpeedLimit>) -> Self {
        self.speed_limit = Some(limit);
        self
    }

    /// Returns the registry.
    pub fn handlers(&self) -> &Arc<BotHandlers> {
        &self.handlers
    }

    /// Returns the selection policy.
    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Returns how many times the action of `function_id` has run.
    pub fn usage(&self, function_id: &str) -> u64 {
        self.usage.lock().get(function_id).copied().unwrap_or(0)
    }

    /// Dispatches one message.
    pub async fn handle_message(&self, message: Message) -> Dispatched {
        let span = info_span!(
            "dispatch",
            kind = %message.kind,
            user_id = message.user_id,
            group_id = message.group_id,
        );
        self.dispatch_message(message).instrument(span).await
    }

    async fn dispatch_message(&self, message: Message) -> Dispatched {
        let message = match self.handlers.message_middleware() {
            Some(middleware) => match AssertUnwindSafe(async { middleware(message).await })
                .catch_unwind()
                .await
            {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!("Message dropped by middleware");
                    return Dispatched::skipped();
                }
                Err(_) => {
                    error!("Message middleware panicked, dropping message");
                    return Dispatched::skipped();
                }
            },
            None => message,
        };
        let message = Arc::new(message);

        if let Some(limit) = &self.speed_limit {
            if !self.within_limit(limit.as_ref(), &message) {
                debug!("Speed limit exceeded");
                let reply = match self.handlers.overspeed_handler() {
                    Some(overspeed) => isolate("overspeed", overspeed(message)).await,
                    None => None,
                };
                return Dispatched {
                    function_id: None,
                    reply,
                };
            }
        }

        let Some(handler) = self.select(&message).await else {
            trace!("No handler matched");
            return Dispatched::skipped();
        };

        let function_id = handler.function_id().to_string();
        *self.usage.lock().entry(function_id.clone()).or_default() += 1;
        debug!(function_id = %function_id, "Running handler");

        let reply = isolate(&function_id, handler.action(message)).await;
        Dispatched {
            function_id: Some(function_id),
            reply,
        }
    }

    /// A panicking hook lets the message through.
    fn within_limit(&self, limit: &dyn SpeedLimit, message: &Message) -> bool {
        match std::panic::catch_unwind(AssertUnwindSafe(|| limit.allow(message))) {
            Ok(allowed) => allowed,
            Err(_) => {
                error!("Speed limit hook panicked, allowing message");
                true
            }
        }
    }

    async fn select(&self, message: &Arc<Message>) -> Option<&Handler> {
        let mut best: Option<(&Handler, i64)> = None;

        for handler in self.handlers.handlers(message.kind) {
            let verify = AssertUnwindSafe(handler.verify(message)).catch_unwind().await;
            let Verify {
                matched, priority, ..
            } = match verify {
                Ok(verify) => verify,
                Err(_) => {
                    error!(function_id = %handler.function_id(), "Handler verification panicked");
                    continue;
                }
            };
            if !matched {
                continue;
            }

            match self.policy {
                SelectionPolicy::FirstMatch => return Some(handler),
                SelectionPolicy::HighestPriority => {
                    if best.is_none_or(|(_, top)| priority > top) {
                        best = Some((handler, priority));
                    }
                }
            }
        }

        best.map(|(handler, _)| handler)
    }

    /// Runs every callback registered for the event and collects their
    /// replies in registration order.
    pub async fn handle_event(&self, event: Event) -> Vec<Chain> {
        let span = info_span!("event", name = %event.name);
        async move {
            let callbacks = self.handlers.event_handlers(&event.name);
            if callbacks.is_empty() {
                trace!("No event handler registered");
                return Vec::new();
            }

            let event = Arc::new(event);
            let mut replies = Vec::new();
            for callback in callbacks {
                if let Some(reply) = isolate(&event.name, callback(Arc::clone(&event))).await {
                    replies.push(reply);
                }
            }
            replies
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.stats())
            .field("policy", &self.policy)
            .field("speed_limit", &self.speed_limit.is_some())
            .finish()
    }
}

/// Awaits a callback, logging failures and panics instead of propagating them.
async fn isolate(name: &str, fut: impl Future<Output = ActionResult>) -> Option<Chain> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            warn!(handler = name, error = %e, "Handler failed");
            None
        }
        Err(_) => {
            error!(handler = name, "Handler panicked");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::equal;

    fn dispatcher(bot: BotHandlers) -> Dispatcher {
        Dispatcher::new(Arc::new(bot))
    }

    fn reply_text(outcome: &Dispatched) -> Option<String> {
        outcome.reply.as_ref().map(Chain::plain_text)
    }

    #[tokio::test]
    async fn test_first_match_in_registration_order() {
        let mut bot = BotHandlers::new();
        bot.on_private_message("first").keywords("hi").handler(|_m| async { "first" });
        bot.on_private_message("second").keywords("hi").handler(|_m| async { "second" });
        let d = dispatcher(bot);

        let outcome = d.handle_message(Message::private(1, "hi")).await;
        assert_eq!(outcome.function_id.as_deref(), Some("first"));
        assert_eq!(reply_text(&outcome).as_deref(), Some("first"));
        assert_eq!(d.usage("first"), 1);
        assert_eq!(d.usage("second"), 0);
    }

    #[tokio::test]
    async fn test_highest_priority_wins() {
        let mut bot = BotHandlers::new();
        bot.on_private_message("low").keywords("roll").handler(|_m| async { "low" });
        bot.on_private_message("high")
            .verify(|_m| async { (true, 10_i64) })
            .handler(|_m| async { "high" });
        bot.on_private_message("tie")
            .verify(|_m| async { (true, 10_i64) })
            .handler(|_m| async { "tie" });
        let d = dispatcher(bot).with_policy(SelectionPolicy::HighestPriority);

        let outcome = d.handle_message(Message::private(1, "roll")).await;
        assert_eq!(outcome.function_id.as_deref(), Some("high"));
    }

    #[tokio::test]
    async fn test_kind_selects_list() {
        let mut bot = BotHandlers::new();
        bot.on_private_message("p").keywords("x").handler(|_m| async { "private" });
        bot.on_temp_message("t").keywords("x").handler(|_m| async { "temp" });
        let d = dispatcher(bot);

        let temp = d.handle_message(Message::temp(5, 1, "x")).await;
        assert_eq!(reply_text(&temp).as_deref(), Some("temp"));

        let group = d.handle_message(Message::group(5, 1, "x")).await;
        assert_eq!(group, Dispatched::skipped());
    }

    #[tokio::test]
    async fn test_no_match() {
        let mut bot = BotHandlers::new();
        bot.on_group_message("hello").keywords("hello").handler(|_m| async { "hi" });
        bot.add_prefix("/");
        let d = dispatcher(bot);

        let outcome = d.handle_message(Message::group(1, 2, "hello")).await;
        assert!(!outcome.is_handled());
        assert!(outcome.reply.is_none());
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let mut bot = BotHandlers::new();
        bot.on_private_message("boom")
            .keywords("boom")
            .handler(|_m| async { Err::<(), _>("exploded") });
        bot.on_private_message("ok").keywords("ok").handler(|_m| async { "fine" });
        let d = dispatcher(bot);

        let failed = d.handle_message(Message::private(1, "boom")).await;
        assert_eq!(failed.function_id.as_deref(), Some("boom"));
        assert!(failed.reply.is_none());

        let ok = d.handle_message(Message::private(1, "ok")).await;
        assert_eq!(reply_text(&ok).as_deref(), Some("fine"));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let mut bot = BotHandlers::new();
        bot.on_private_message("panic").keywords("panic").handler(|_m| async {
            let fail = true;
            if fail {
                panic!("handler bug");
            }
        });
        let d = dispatcher(bot);

        let outcome = d.handle_message(Message::private(1, "panic")).await;
        assert_eq!(outcome.function_id.as_deref(), Some("panic"));
        assert!(outcome.reply.is_none());
        assert_eq!(d.usage("panic"), 1);
    }

    #[tokio::test]
    async fn test_panicking_predicate_is_skipped() {
        let mut bot = BotHandlers::new();
        bot.on_private_message("bad")
            .verify(|_m| async {
                let fail = true;
                if fail {
                    panic!("predicate bug");
                }
                false
            })
            .handler(|_m| async { "bad" });
        bot.on_private_message("good").keywords("x").handler(|_m| async { "good" });
        let d = dispatcher(bot);

        let outcome = d.handle_message(Message::private(1, "x")).await;
        assert_eq!(outcome.function_id.as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn test_middleware_rewrites_and_drops() {
        let mut bot = BotHandlers::new();
        bot.handle_message(|msg: Message| async move {
            if msg.user_id == 0 {
                None
            } else {
                let text = msg.text.trim().to_lowercase();
                Some(msg.with_text(text))
            }
        })
        .unwrap();
        bot.on_private_message("hello")
            .keywords(equal("hello"))
            .handler(|_m| async { "hi" });
        let d = dispatcher(bot);

        let outcome = d.handle_message(Message::private(1, "  HELLO ")).await;
        assert_eq!(reply_text(&outcome).as_deref(), Some("hi"));

        let dropped = d.handle_message(Message::private(0, "hello")).await;
        assert_eq!(dropped, Dispatched::skipped());
        assert_eq!(d.usage("hello"), 1);
    }

    #[tokio::test]
    async fn test_speed_limit_routes_to_overspeed() {
        let mut bot = BotHandlers::new();
        bot.on_overspeed(|_m| async { "slow down" }).unwrap();
        bot.on_private_message("hello").keywords("hello").handler(|_m| async { "hi" });
        let d = dispatcher(bot).with_speed_limit(|msg: &Message| msg.user_id != 42);

        let limited = d.handle_message(Message::private(42, "hello")).await;
        assert!(!limited.is_handled());
        assert_eq!(reply_text(&limited).as_deref(), Some("slow down"));

        let allowed = d.handle_message(Message::private(1, "hello")).await;
        assert_eq!(reply_text(&allowed).as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_panicking_middleware_is_isolated() {
        let mut bot = BotHandlers::new();
        bot.handle_message(|msg: Message| async move {
            if msg.user_id == 13 {
                panic!("middleware bug");
            }
            Some(msg)
        })
        .unwrap();
        bot.on_private_message("x").keywords("x").handler(|_m| async { "ok" });
        let d = Arc::new(dispatcher(bot));

        let task = tokio::spawn({
            let d = Arc::clone(&d);
            async move { d.handle_message(Message::private(13, "x")).await }
        });
        assert_eq!(task.await.unwrap(), Dispatched::skipped());

        let ok = d.handle_message(Message::private(1, "x")).await;
        assert_eq!(reply_text(&ok).as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_panicking_speed_limit_allows_message() {
        let mut bot = BotHandlers::new();
        bot.on_overspeed(|_m| async { "slow down" }).unwrap();
        bot.on_private_message("x").keywords("x").handler(|_m| async { "ok" });
        let d = dispatcher(bot).with_speed_limit(|msg: &Message| {
            if msg.user_id == 13 {
                panic!("limiter bug");
            }
            true
        });

        let outcome = d.handle_message(Message::private(13, "x")).await;
        assert_eq!(outcome.function_id.as_deref(), Some("x"));
        assert_eq!(reply_text(&outcome).as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_speed_limit_without_overspeed_handler() {
        let mut bot = BotHandlers::new();
        bot.on_private_message("hello").keywords("hello").handler(|_m| async { "hi" });
        let d = dispatcher(bot).with_speed_limit(|_msg: &Message| false);

        assert_eq!(
            d.handle_message(Message::private(1, "hello")).await,
            Dispatched::skipped()
        );
    }

    #[tokio::test]
    async fn test_handle_event_runs_all_callbacks() {
        let mut bot = BotHandlers::new();
        bot.on_event("MemberJoin", |_e| async { "welcome" }).unwrap();
        bot.on_event("MemberJoin", |_e| async { Err::<(), _>("broken") }).unwrap();
        bot.on_event("MemberJoin", |e: Arc<Event>| async move {
            format!("hello {}", e.payload["user_id"])
        })
        .unwrap();
        let d = dispatcher(bot);

        let event = Event::new("MemberJoin", serde_json::json!({ "user_id": 7 }));
        let replies: Vec<String> = d
            .handle_event(event)
            .await
            .iter()
            .map(Chain::plain_text)
            .collect();
        assert_eq!(replies, vec!["welcome", "hello 7"]);

        assert!(d.handle_event(Event::new("Unknown", serde_json::Value::Null)).await.is_empty());
    }

    #[test]
    fn test_selection_policy_serde() {
        let policy: SelectionPolicy = serde_json::from_str("\"highest-priority\"").unwrap();
        assert_eq!(policy, SelectionPolicy::HighestPriority);
        assert_eq!(
            serde_json::to_string(&SelectionPolicy::FirstMatch).unwrap(),
            "\"first-match\""
        );
    }

    #[test]
    fn test_dispatcher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Dispatcher>();
    }
}
