//! Tower integration.
//!
//! [`HandlerService`] exposes a single [`Handler`] as a
//! `tower::Service<Arc<Message>>`, so a handler can be stacked with ordinary
//! tower layers (timeouts, concurrency limits, buffering) outside the
//! registry. Verification runs first; a miss resolves to [`MessageSkipped`],
//! which callers should read as "not for me" rather than a failure.
//!
//! ```rust,ignore
//! use tower::ServiceExt;
//!
//! let svc = HandlerService::new(handler);
//! match svc.oneshot(Arc::new(message)).await {
//!     Ok(reply) => { /* handler ran */ }
//!     Err(e) if e.is::<MessageSkipped>() => { /* not for this handler */ }
//!     Err(e) => { /* handler failed */ }
//! }
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tower::util::BoxCloneSyncService;

use amber_core::{BoxError, Chain, Message};

use crate::error::MessageSkipped;
use crate::handler::Handler;
use crate::reply::BoxFuture;

/// A type-erased, `Clone + Send + Sync` handler service.
pub type BoxedHandlerService = BoxCloneSyncService<Arc<Message>, Option<Chain>, BoxError>;

/// A tower [`Service`] that verifies and runs one handler.
#[derive(Debug, Clone)]
pub struct HandlerService {
    handler: Arc<Handler>,
}

impl HandlerService {
    /// Wraps `handler`.
    pub fn new(handler: impl Into<Arc<Handler>>) -> Self {
        Self {
            handler: handler.into(),
        }
    }

    /// Returns the wrapped handler.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Erases the service type.
    pub fn boxed(self) -> BoxedHandlerService {
        BoxCloneSyncService::new(self)
    }
}

impl Service<Arc<Message>> for HandlerService {
    type Response = Option<Chain>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: Arc<Message>) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        Box::pin(async move {
            if !handler.verify(&message).await.matched {
                return Err(Box::new(MessageSkipped) as BoxError);
            }
            handler.action(message).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn echo() -> HandlerService {
        HandlerService::new(
            Handler::new("echo", |msg: Arc<Message>| async move { format!("echo {}", msg.text) })
                .keywords("echo"),
        )
    }

    #[tokio::test]
    async fn test_matching_message_runs_handler() {
        let reply = echo()
            .oneshot(Arc::new(Message::private(1, "echo hi")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.plain_text(), "echo echo hi");
    }

    #[tokio::test]
    async fn test_miss_is_message_skipped() {
        let err = echo()
            .oneshot(Arc::new(Message::private(1, "hello")))
            .await
            .unwrap_err();
        assert!(err.is::<MessageSkipped>());
    }

    #[tokio::test]
    async fn test_handler_error_passes_through() {
        let svc = HandlerService::new(
            Handler::new("fail", |_msg| async { Err::<(), _>("nope") }).keywords("x"),
        );
        let err = svc.oneshot(Arc::new(Message::private(1, "x"))).await.unwrap_err();
        assert!(!err.is::<MessageSkipped>());
        assert_eq!(err.to_string(), "nope");
    }

    #[tokio::test]
    async fn test_boxed_service_is_cloneable() {
        let boxed = echo().boxed();
        let first = boxed.clone().oneshot(Arc::new(Message::private(1, "echo"))).await;
        let second = boxed.oneshot(Arc::new(Message::private(1, "nope"))).await;
        assert!(first.is_ok());
        assert!(second.is_err());
    }
}
