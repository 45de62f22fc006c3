//! Handler plumbing.
//!
//! A handler is any async function taking the event-bound [`Bot`] and the
//! [`Event`] as seen after trigger matching:
//!
//! ```rust,ignore
//! async fn roll(bot: Bot, event: Event) -> anyhow::Result<String> {
//!     let sides: u32 = event.text.trim().parse()?;
//!     Ok(format!("rolled a d{sides}"))
//! }
//! ```
//!
//! [`HandlerService`] wraps such a function into a `tower::Service<Bot>` so
//! that middleware can be layered on top before the handler is stored in a
//! trigger.

use std::fmt::Display;
use std::marker::PhantomData;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Service};
use tracing::error;

use crate::session::Bot;
use gscore_core::{Event, Payload, Segment};

// ============================================================================
// HandlerResponse
// ============================================================================

/// A trait for types that can be returned from handlers.
#[async_trait]
pub trait HandlerResponse: Send + 'static {
    /// Acts on the value, typically by replying to the originating event.
    async fn process_response(self, bot: &Bot);
}

/// Implementation for `()` - no response needed.
#[async_trait]
impl HandlerResponse for () {
    async fn process_response(self, _bot: &Bot) {}
}

async fn reply(bot: &Bot, payload: impl Into<Payload> + Send) {
    if let Err(e) = bot.send(payload, false).await {
        error!(bot_id = %bot.bot_id(), error = %e, "Failed to send reply");
    }
}

/// Implementation for `String` - sent back as a reply.
#[async_trait]
impl HandlerResponse for String {
    async fn process_response(self, bot: &Bot) {
        reply(bot, self).await;
    }
}

#[async_trait]
impl HandlerResponse for &'static str {
    async fn process_response(self, bot: &Bot) {
        reply(bot, self).await;
    }
}

#[async_trait]
impl HandlerResponse for Payload {
    async fn process_response(self, bot: &Bot) {
        reply(bot, self).await;
    }
}

#[async_trait]
impl HandlerResponse for Segment {
    async fn process_response(self, bot: &Bot) {
        reply(bot, self).await;
    }
}

#[async_trait]
impl HandlerResponse for Vec<Segment> {
    async fn process_response(self, bot: &Bot) {
        reply(bot, self).await;
    }
}

/// Implementation for `Option<T>` where T implements HandlerResponse.
///
/// On Some, the inner value's response is handled. On None, no action is taken.
#[async_trait]
impl<T: HandlerResponse> HandlerResponse for Option<T> {
    async fn process_response(self, bot: &Bot) {
        if let Some(t) = self {
            t.process_response(bot).await;
        }
    }
}

/// Implementation for `Result<T, E>` where T implements HandlerResponse.
///
/// On Ok, the inner value's response is handled. On Err, the error is logged
/// and no reply is sent.
#[async_trait]
impl<T: HandlerResponse, E: Display + Send + 'static> HandlerResponse for Result<T, E> {
    async fn process_response(self, bot: &Bot) {
        match self {
            Ok(t) => t.process_response(bot).await,
            Err(e) => {
                let event = bot.event();
                error!(
                    command = %event.command,
                    user_id = %event.user_id,
                    error = %e,
                    "Handler error"
                );
            }
        }
    }
}

// ============================================================================
// HandlerService
// ============================================================================

/// A tower [`Service`] that calls a single handler function.
///
/// # Example
///
/// ```rust,ignore
/// let svc = ServiceBuilder::new()
///     .layer(TimeoutLayer::new(Duration::from_secs(10)))
///     .service(HandlerService::new(roll));
/// sv.on_service(TriggerKind::Prefix, "!roll ", svc);
/// ```
pub struct HandlerService<F, R> {
    handler: F,
    _marker: PhantomData<fn() -> R>,
}

impl<F, R> HandlerService<F, R> {
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<F: Clone, R> Clone for HandlerService<F, R> {
    fn clone(&self) -> Self {
        HandlerService {
            handler: self.handler.clone(),
            _marker: PhantomData,
        }
    }
}

impl<F, Fut, R> Service<Bot> for HandlerService<F, R>
where
    F: Fn(Bot, Event) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerResponse,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, bot: Bot) -> Self::Future {
        let handler = self.handler.clone();
        async move {
            let event = bot.event().clone();
            let response = handler(bot.clone(), event).await;
            response.process_response(&bot).await;
            Ok(())
        }
        .boxed()
    }
}
