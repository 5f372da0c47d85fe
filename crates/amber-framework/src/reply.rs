//! Callback plumbing.
//!
//! User code registers plain async closures. This module erases them into
//! [`Callback`]s that can be stored in the registry, and normalizes whatever
//! they return into an [`ActionResult`] through [`IntoReply`].
//!
//! ```rust,ignore
//! // All of these are valid handler callbacks:
//! |_msg| async {}                                   // no reply
//! |_msg| async { "pong" }                           // text reply
//! |msg| async move { Chain::new().at(msg.user_id) } // chain reply
//! |_msg| async { Ok::<_, BoxError>(Some("maybe")) } // fallible, optional
//! ```

use std::future::Future;
use std::sync::Arc;

use amber_core::{ActionResult, BoxError, Chain};

pub use futures::future::BoxFuture;

/// A type-erased async callback taking a shared input and producing a reply.
pub type Callback<I> = Arc<dyn Fn(Arc<I>) -> BoxFuture<'static, ActionResult> + Send + Sync>;

/// Types that can be returned from a callback.
pub trait IntoReply: Send + 'static {
    /// Converts the value into the normalized callback outcome.
    fn into_reply(self) -> ActionResult;
}

impl IntoReply for () {
    fn into_reply(self) -> ActionResult {
        Ok(None)
    }
}

impl IntoReply for Chain {
    fn into_reply(self) -> ActionResult {
        Ok(Some(self))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> ActionResult {
        Ok(Some(Chain::from(self)))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> ActionResult {
        Ok(Some(Chain::from(self)))
    }
}

/// `None` means "nothing to send".
impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> ActionResult {
        match self {
            Some(inner) => inner.into_reply(),
            None => Ok(None),
        }
    }
}

/// `Err` is surfaced as a callback failure.
impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<BoxError> + Send + 'static,
{
    fn into_reply(self) -> ActionResult {
        match self {
            Ok(inner) => inner.into_reply(),
            Err(e) => Err(e.into()),
        }
    }
}

/// Erases an async closure into a [`Callback`].
pub fn callback<I, F, Fut, R>(f: F) -> Callback<I>
where
    I: Send + Sync + 'static,
    F: Fn(Arc<I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply,
{
    Arc::new(move |input: Arc<I>| {
        let fut = f(input);
        Box::pin(async move { fut.await.into_reply() })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use amber_core::Message;

    #[test]
    fn test_unit_is_no_reply() {
        assert!(matches!(().into_reply(), Ok(None)));
    }

    #[test]
    fn test_text_becomes_chain() {
        let reply = "pong".into_reply().unwrap().unwrap();
        assert_eq!(reply.plain_text(), "pong");
    }

    #[test]
    fn test_result_error_surfaces() {
        let result: Result<Chain, String> = Err("boom".to_string());
        let err = result.into_reply().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_option_none() {
        let reply: Option<String> = None;
        assert!(matches!(reply.into_reply(), Ok(None)));
    }

    #[test]
    fn test_callback_erases_closure() {
        let cb: Callback<Message> =
            callback(|msg: Arc<Message>| async move { format!("echo {}", msg.text) });
        let reply = tokio_test::block_on(cb(Arc::new(Message::private(1, "hi"))))
            .unwrap()
            .unwrap();
        assert_eq!(reply.plain_text(), "echo hi");
    }

    #[test]
    fn test_box_future_accepts_futures_boxed() {
        use futures::FutureExt;

        let fut: BoxFuture<'static, ActionResult> = async { "boxed".into_reply() }.boxed();
        let reply = tokio_test::block_on(fut).unwrap().unwrap();
        assert_eq!(reply.plain_text(), "boxed");
    }
}
