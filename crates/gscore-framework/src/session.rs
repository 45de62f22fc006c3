//! Per-connection sessions.
//!
//! A [`Session`] owns the outbound side of one backend connection and the set
//! of tasks running on its behalf. Handlers never see it directly; they get a
//! [`Bot`], which binds the session to the event being handled.
//!
//! # Lifecycle
//!
//! A session is open until [`Session::close`] is called or the transport
//! drops the receiving end. Closing is terminal: every later send fails with
//! [`SendError::ConnectionClosed`] without writing anything. Tasks already
//! running keep going until [`Session::drain`] gives up on them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use gscore_core::{
    ConnectionHandle, Event, MessageSend, Payload, Route, Segment, SendError, SendResult,
    TargetType,
};

// =============================================================================
// Session
// =============================================================================

/// The live handle of one backend connection.
#[derive(Debug)]
pub struct Session {
    connection: ConnectionHandle,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl Session {
    /// Creates a session writing to `connection`.
    pub fn new(connection: ConnectionHandle) -> Self {
        Self {
            connection,
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Backend id of the underlying connection.
    pub fn bot_id(&self) -> &str {
        &self.connection.id
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Number of tasks still running on this session.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Normalizes `payload`, wraps it in an envelope for `route` and writes it.
    ///
    /// When `at_sender` is set and `sender_id` is non-empty a mention of the
    /// sender is appended after the content.
    pub async fn send(
        &self,
        payload: impl Into<Payload>,
        route: &Route,
        at_sender: bool,
        sender_id: &str,
    ) -> SendResult<()> {
        if self.is_closed() {
            return Err(SendError::closed(self.bot_id()));
        }

        let mut content = payload.into().into_segments()?;
        if at_sender && !sender_id.is_empty() {
            content.push(Segment::mention(sender_id));
        }

        let frame = MessageSend::new(content, route).encode()?;
        info!(
            bot_id = %route.bot_id,
            target_type = %route.target_type,
            target_id = route.target_id.as_deref().unwrap_or(""),
            "Sending message"
        );
        self.connection.send(frame).await
    }

    /// Runs `task` on this session's task set.
    ///
    /// The task is cancelled if it is still running when a drain times out.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!("Session task cancelled"),
                _ = task => {}
            }
        })
    }

    /// Sends without waiting; failures are logged.
    pub fn send_background(
        self: &Arc<Self>,
        payload: impl Into<Payload>,
        route: Route,
        at_sender: bool,
        sender_id: impl Into<String>,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        let payload = payload.into();
        let sender_id = sender_id.into();
        self.spawn(async move {
            if let Err(e) = session.send(payload, &route, at_sender, &sender_id).await {
                error!(bot_id = %session.bot_id(), error = %e, "Background send failed");
            }
        })
    }

    /// Marks the session closed. In-flight tasks are not interrupted.
    pub fn close(&self) {
        if !self.connection.is_closed() {
            info!(bot_id = %self.bot_id(), "Session closed");
        }
        self.connection.close();
        self.tasks.close();
    }

    /// Waits up to `grace` for in-flight tasks, then cancels the rest.
    ///
    /// Returns `true` if every task finished on its own.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tasks.close();
        if tokio::time::timeout(grace, self.tasks.wait()).await.is_ok() {
            return true;
        }

        warn!(
            bot_id = %self.bot_id(),
            remaining = self.tasks.len(),
            "Drain timed out, cancelling session tasks"
        );
        self.cancel.cancel();
        self.tasks.wait().await;
        false
    }
}

// =============================================================================
// Bot
// =============================================================================

/// A session bound to the event being handled.
///
/// Replies go back to the scope and target the event came from.
#[derive(Debug, Clone)]
pub struct Bot {
    session: Arc<Session>,
    event: Arc<Event>,
}

impl Bot {
    pub fn new(session: Arc<Session>, event: Event) -> Self {
        Self {
            session,
            event: Arc::new(event),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// The event as seen by the handler.
    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn bot_id(&self) -> &str {
        &self.event.bot_id
    }

    pub fn bot_self_id(&self) -> &str {
        &self.event.bot_self_id
    }

    /// Replies to the event, optionally mentioning its sender.
    pub async fn send(&self, payload: impl Into<Payload>, at_sender: bool) -> SendResult<()> {
        self.session
            .send(
                payload,
                &self.event.reply_route(),
                at_sender,
                &self.event.user_id,
            )
            .await
    }

    /// Sends to an explicit target, keeping the event's origin ids.
    pub async fn target_send(
        &self,
        payload: impl Into<Payload>,
        target_type: TargetType,
        target_id: Option<String>,
        at_sender: bool,
        sender_id: &str,
    ) -> SendResult<()> {
        let route = Route::new(
            target_type,
            target_id,
            self.event.bot_id.clone(),
            self.event.bot_self_id.clone(),
        )
        .with_msg_id(self.event.msg_id.clone());
        self.session
            .send(payload, &route, at_sender, sender_id)
            .await
    }

    /// Replies without waiting for the write.
    pub fn send_background(&self, payload: impl Into<Payload>, at_sender: bool) -> JoinHandle<()> {
        self.session.send_background(
            payload,
            self.event.reply_route(),
            at_sender,
            self.event.user_id.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    fn session() -> (Arc<Session>, mpsc::Receiver<Vec<u8>>) {
        let (handle, rx) = ConnectionHandle::channel("onebot", 8);
        (Arc::new(Session::new(handle)), rx)
    }

    fn route() -> Route {
        Route::new(TargetType::Group, Some("g1".into()), "onebot", "10000").with_msg_id("m1")
    }

    async fn next_frame(rx: &mut mpsc::Receiver<Vec<u8>>) -> Value {
        serde_json::from_slice(&rx.recv().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_send_text() {
        let (session, mut rx) = session();
        session.send("hello", &route(), false, "u1").await.unwrap();

        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["content"], json!([{"type": "text", "data": "hello"}]));
        assert_eq!(frame["target_type"], "group");
        assert_eq!(frame["target_id"], "g1");
        assert_eq!(frame["msg_id"], "m1");
    }

    #[tokio::test]
    async fn test_send_bytes_as_single_image() {
        let (session, mut rx) = session();
        session
            .send(vec![0x89u8, 0x50, 0x4e, 0x47], &route(), false, "")
            .await
            .unwrap();

        let frame = next_frame(&mut rx).await;
        let content = frame["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["type"], "image");
        assert!(content[0]["data"].as_str().unwrap().starts_with("base64://"));
    }

    #[tokio::test]
    async fn test_mention_appended_last() {
        let (session, mut rx) = session();
        session.send("hi", &route(), true, "u1").await.unwrap();
        session.send("hi", &route(), true, "").await.unwrap();

        let frame = next_frame(&mut rx).await;
        assert_eq!(
            frame["content"],
            json!([
                {"type": "text", "data": "hi"},
                {"type": "at", "data": "u1"},
            ])
        );
        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["content"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_payload_writes_nothing() {
        let (session, mut rx) = session();
        let err = session.send("", &route(), true, "u1").await.unwrap_err();
        assert!(matches!(err, SendError::InvalidPayload(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_after_close_fails_without_write() {
        let (session, mut rx) = session();
        session.close();
        assert!(session.is_closed());

        let err = session.send("late", &route(), false, "").await.unwrap_err();
        assert!(matches!(err, SendError::ConnectionClosed { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bot_replies_to_origin() {
        let (session, mut rx) = session();
        let event = Event::new(TargetType::Direct, "u9", "hi")
            .with_bot("onebot", "10000")
            .with_msg_id("m5");
        let bot = Bot::new(session, event);

        bot.send("pong", true).await.unwrap();
        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["target_type"], "direct");
        assert_eq!(frame["target_id"], "u9");
        assert_eq!(frame["bot_self_id"], "10000");
        assert_eq!(frame["content"][1], json!({"type": "at", "data": "u9"}));

        bot.target_send("notice", TargetType::Channel, Some("c1".into()), false, "")
            .await
            .unwrap();
        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["target_type"], "channel");
        assert_eq!(frame["target_id"], "c1");
        assert_eq!(frame["msg_id"], "m5");
    }

    #[tokio::test]
    async fn test_background_send_is_tracked() {
        let (session, mut rx) = session();
        session.send_background("bg", route(), false, "");
        assert!(session.drain(Duration::from_secs(1)).await);
        assert_eq!(next_frame(&mut rx).await["content"][0]["data"], "bg");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_cancels_stragglers() {
        let (session, _rx) = session();
        session.spawn(std::future::pending());
        session.close();

        assert!(!session.drain(Duration::from_millis(50)).await);
        assert_eq!(session.in_flight(), 0);
    }
}
