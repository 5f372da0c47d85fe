//! Message handlers.
//!
//! A [`Handler`] binds a callback to the rule deciding whether it should
//! process a message. The rule has up to three parts, applied in this order:
//!
//! 1. **Prefix gate** ([`Prefix`]): the raw text must start with one of the
//!    active prefixes. A handler that misses the gate may still be reached
//!    through its exact-equality keywords.
//! 2. **Custom predicate**: an async function returning a [`Verify`]. When
//!    present it replaces keyword matching entirely.
//! 3. **Keywords** ([`Matcher`]): literal, exact, pattern, or a list of them.
//!
//! Handlers are normally created through
//! [`BotHandlers`](crate::registry::BotHandlers), which also shares its
//! prefix list with every handler it registers.
//!
//! ```rust,ignore
//! let handler = Handler::new("hello", |_msg| async { "hi!" })
//!     .keywords(vec![equal("hi"), "hello".into()])
//!     .check_prefix(true);
//!
//! let result = handler.verify(&Arc::new(Message::group(1, 2, "hello"))).await;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use amber_core::{ActionResult, Message};

use crate::matcher::Matcher;
use crate::reply::{BoxFuture, Callback, IntoReply, callback};
use crate::verify::Verify;

/// A type-erased custom verification predicate.
pub type VerifyFn = Arc<dyn Fn(Arc<Message>) -> BoxFuture<'static, Verify> + Send + Sync>;

/// Prefix-check policy of a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Prefix {
    /// No prefix check.
    #[default]
    Disabled,
    /// Check against the registry's shared prefix list.
    Global,
    /// Check against the handler's own list.
    Explicit(Vec<String>),
}

impl Prefix {
    /// Creates an explicit policy. An empty list disables the check.
    pub fn explicit<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        if words.is_empty() {
            Self::Disabled
        } else {
            Self::Explicit(words)
        }
    }

    /// Returns `true` unless the check is disabled.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl From<bool> for Prefix {
    fn from(enabled: bool) -> Self {
        if enabled { Self::Global } else { Self::Disabled }
    }
}

impl From<Vec<String>> for Prefix {
    fn from(words: Vec<String>) -> Self {
        Self::explicit(words)
    }
}

impl From<Vec<&str>> for Prefix {
    fn from(words: Vec<&str>) -> Self {
        Self::explicit(words)
    }
}

/// The prefix list shared between a registry and its handlers.
///
/// Cloning yields another handle to the same list, so prefixes added after a
/// handler was registered are still seen by it.
#[derive(Debug, Clone, Default)]
pub struct PrefixKeywords {
    words: Arc<RwLock<Vec<String>>>,
}

impl PrefixKeywords {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends words in order. Duplicates are kept.
    pub fn extend<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.words.write().extend(words.into_iter().map(Into::into));
    }

    /// Returns a copy of the current list.
    pub fn to_vec(&self) -> Vec<String> {
        self.words.read().clone()
    }

    /// Returns the number of words.
    pub fn len(&self) -> usize {
        self.words.read().len()
    }

    /// Returns `true` if there are no words.
    pub fn is_empty(&self) -> bool {
        self.words.read().is_empty()
    }

    /// Returns `true` if `text` starts with any word.
    pub fn starts(&self, text: &str) -> bool {
        self.words.read().iter().any(|w| text.starts_with(w.as_str()))
    }
}

/// A registered rule and action pair.
pub struct Handler {
    function_id: String,
    action: Callback<Message>,
    keywords: RwLock<Option<Matcher>>,
    custom_verify: Option<VerifyFn>,
    check_prefix: Prefix,
    prefix_keywords: PrefixKeywords,
}

impl Handler {
    /// Creates a handler around an async callback.
    ///
    /// The new handler has no keywords, no predicate and no prefix check; use
    /// the builder methods to configure it.
    pub fn new<F, Fut, R>(function_id: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply,
    {
        Self::from_callback(function_id, callback(f))
    }

    /// Creates a handler around a pre-built callback.
    pub fn from_callback(function_id: impl Into<String>, action: Callback<Message>) -> Self {
        Self {
            function_id: function_id.into(),
            action,
            keywords: RwLock::new(None),
            custom_verify: None,
            check_prefix: Prefix::Disabled,
            prefix_keywords: PrefixKeywords::new(),
        }
    }

    /// Sets the keyword matcher.
    pub fn keywords(self, keywords: impl Into<Matcher>) -> Self {
        *self.keywords.write() = Some(keywords.into());
        self
    }

    /// Sets a custom async predicate. It takes precedence over keywords.
    ///
    /// The predicate may return a `bool`, `(bool, i64)`,
    /// `(bool, i64, Vec<String>)` or a [`Verify`].
    pub fn custom_verify<F, Fut, R>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<Verify>,
    {
        self.custom_verify = Some(Arc::new(move |msg: Arc<Message>| {
            let fut = f(msg);
            Box::pin(async move { fut.await.into() })
        }));
        self
    }

    /// Sets a pre-built custom predicate.
    pub fn custom_verify_boxed(mut self, verify: VerifyFn) -> Self {
        self.custom_verify = Some(verify);
        self
    }

    /// Sets the prefix-check policy.
    pub fn check_prefix(mut self, prefix: impl Into<Prefix>) -> Self {
        self.check_prefix = prefix.into();
        self
    }

    /// Shares a prefix list used by [`Prefix::Global`].
    pub fn prefix_keywords(mut self, prefix_keywords: PrefixKeywords) -> Self {
        self.prefix_keywords = prefix_keywords;
        self
    }

    /// Returns the function id.
    pub fn function_id(&self) -> &str {
        &self.function_id
    }

    /// Returns a copy of the current keyword matcher.
    pub fn get_keywords(&self) -> Option<Matcher> {
        self.keywords.read().clone()
    }

    /// Returns the prefix-check policy.
    pub fn get_prefix(&self) -> &Prefix {
        &self.check_prefix
    }

    /// Returns `true` if a custom predicate is configured.
    pub fn has_custom_verify(&self) -> bool {
        self.custom_verify.is_some()
    }

    /// Decides whether this handler should process `message`.
    pub async fn verify(&self, message: &Arc<Message>) -> Verify {
        if self.check_prefix.is_enabled() && !self.prefix_hit(&message.text_origin) {
            let bare_equal = self.keywords.read().as_ref().is_some_and(Matcher::is_equal);
            if !bare_equal && !self.narrow_to_equal_keywords() {
                trace!(
                    function_id = %self.function_id,
                    "Prefix check failed, skipping"
                );
                return Verify::miss();
            }
        }

        if let Some(verify) = &self.custom_verify {
            return verify(Arc::clone(message)).await;
        }

        let matched = self
            .keywords
            .read()
            .as_ref()
            .is_some_and(|keywords| keywords.check(&message.text));
        Verify::new(matched)
    }

    /// Runs the bound callback. Failures are returned to the caller as-is.
    pub async fn action(&self, message: Arc<Message>) -> ActionResult {
        (self.action)(message).await
    }

    fn prefix_hit(&self, text: &str) -> bool {
        match &self.check_prefix {
            Prefix::Disabled => true,
            Prefix::Global => self.prefix_keywords.starts(text),
            Prefix::Explicit(words) => words.iter().any(|w| text.starts_with(w.as_str())),
        }
    }

    /// Replaces the stored keywords with their top-level exact-equality
    /// entries, returning `false` when there are none.
    ///
    /// The replacement persists: every later verification sees only the
    /// narrowed set, including ones whose prefix check passes.
    fn narrow_to_equal_keywords(&self) -> bool {
        let mut keywords = self.keywords.write();
        let narrowed = keywords.as_ref().and_then(Matcher::equal_entries);
        match narrowed {
            Some(narrowed) => {
                *keywords = Some(narrowed);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("function_id", &self.function_id)
            .field("keywords", &*self.keywords.read())
            .field("custom_verify", &self.custom_verify.is_some())
            .field("check_prefix", &self.check_prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::equal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn group(text: &str) -> Arc<Message> {
        Arc::new(Message::group(100, 200, text))
    }

    fn noop(id: &str) -> Handler {
        Handler::new(id, |_msg| async {})
    }

    fn shared(words: &[&str]) -> PrefixKeywords {
        let prefixes = PrefixKeywords::new();
        prefixes.extend(words.iter().copied());
        prefixes
    }

    #[tokio::test]
    async fn test_prefix_miss_without_equal_fails() {
        let handler = noop("hello")
            .keywords(vec!["hello", "hey"])
            .check_prefix(true)
            .prefix_keywords(shared(&["兔兔", "/"]));

        assert_eq!(handler.verify(&group("hello there")).await, Verify::miss());
    }

    #[tokio::test]
    async fn test_prefix_hit_with_literal() {
        let handler = noop("hello")
            .keywords("hello")
            .check_prefix(true)
            .prefix_keywords(shared(&["兔兔"]));

        let result = handler.verify(&group("兔兔hello")).await;
        assert_eq!(result, Verify::new(true));
    }

    #[tokio::test]
    async fn test_global_prefix_with_empty_list_fails() {
        let handler = noop("hello").keywords("hello").check_prefix(true);
        assert!(!handler.verify(&group("hello")).await.matched);
    }

    #[tokio::test]
    async fn test_explicit_prefix_ignores_shared_list() {
        let handler = noop("cmd")
            .keywords("help")
            .check_prefix(vec!["!"])
            .prefix_keywords(shared(&["/"]));

        assert!(handler.verify(&group("!help")).await.matched);
        assert!(!handler.verify(&group("/help")).await.matched);
    }

    #[tokio::test]
    async fn test_explicit_empty_prefix_is_disabled() {
        let handler = noop("cmd").keywords("help").check_prefix(Vec::<String>::new());
        assert_eq!(handler.get_prefix(), &Prefix::Disabled);
        assert!(handler.verify(&group("help")).await.matched);
    }

    #[tokio::test]
    async fn test_prefix_added_after_registration_is_seen() {
        let prefixes = PrefixKeywords::new();
        let handler = noop("hello")
            .keywords("hello")
            .check_prefix(true)
            .prefix_keywords(prefixes.clone());

        assert!(!handler.verify(&group("#hello")).await.matched);
        prefixes.extend(["#"]);
        assert!(handler.verify(&group("#hello")).await.matched);
    }

    #[tokio::test]
    async fn test_prefix_miss_narrows_to_equal_entries() {
        let handler = noop("greet")
            .keywords(vec![equal("hi"), "hello".into()])
            .check_prefix(true)
            .prefix_keywords(shared(&["兔兔"]));

        // Exact text still reaches the handler without a prefix.
        assert!(handler.verify(&group("hi")).await.matched);
        assert_eq!(handler.get_keywords(), Some(Matcher::List(vec![equal("hi")])));

        // The literal entry is gone for good, even behind a valid prefix.
        assert!(!handler.verify(&group("兔兔hello")).await.matched);
    }

    #[tokio::test]
    async fn test_bare_equal_skips_prefix_gate() {
        let handler = noop("menu")
            .keywords(equal("menu"))
            .check_prefix(true)
            .prefix_keywords(shared(&["兔兔"]));

        assert!(handler.verify(&group("menu")).await.matched);
        assert!(!handler.verify(&group("menus")).await.matched);
        assert_eq!(handler.get_keywords(), Some(equal("menu")));
    }

    #[tokio::test]
    async fn test_custom_verify_shapes() {
        let plain = noop("a").custom_verify(|_msg| async { true });
        assert_eq!(plain.verify(&group("x")).await, Verify::new(true));

        let pair = noop("b").custom_verify(|_msg| async { (true, 5_i64) });
        assert_eq!(pair.verify(&group("x")).await, Verify::new(true).with_priority(5));

        let triple = noop("c").custom_verify(|_msg| async { (false, 0_i64, vec!["x".to_string()]) });
        assert_eq!(
            triple.verify(&group("x")).await,
            Verify::from((false, 0_i64, vec!["x".to_string()]))
        );
    }

    #[tokio::test]
    async fn test_custom_verify_overrides_keywords() {
        let handler = noop("a")
            .keywords("never")
            .custom_verify(|msg: Arc<Message>| async move { msg.text.len() > 3 });

        assert!(handler.verify(&group("long text")).await.matched);
        assert!(!handler.verify(&group("no")).await.matched);
    }

    #[tokio::test]
    async fn test_custom_verify_still_gated_by_prefix() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = noop("a")
            .custom_verify(move |_msg| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    true
                }
            })
            .check_prefix(vec!["/"]);

        assert!(!handler.verify(&group("hello")).await.matched);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(handler.verify(&group("/hello")).await.matched);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_rule_never_matches() {
        assert!(!noop("empty").verify(&group("anything")).await.matched);
    }

    #[tokio::test]
    async fn test_keywords_use_normalized_text() {
        let handler = noop("a").keywords(equal("hello"));
        let msg = Arc::new(Message::private(1, "  HELLO ").with_text("hello"));
        assert!(handler.verify(&msg).await.matched);
    }

    #[tokio::test]
    async fn test_action_returns_reply() {
        let handler = Handler::new("echo", |msg: Arc<Message>| async move {
            format!("echo: {}", msg.text)
        });
        let reply = handler.action(group("hi")).await.unwrap().unwrap();
        assert_eq!(reply.plain_text(), "echo: hi");
    }

    #[tokio::test]
    async fn test_action_error_propagates() {
        let handler = Handler::new("fail", |_msg| async { Err::<(), _>("broken") });
        let err = handler.action(group("hi")).await.unwrap_err();
        assert_eq!(err.to_string(), "broken");
    }
}
