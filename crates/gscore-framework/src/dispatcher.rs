//! Event dispatcher.
//!
//! For each inbound [`Event`] the [`Dispatcher`]:
//!
//! 1. Takes a snapshot of the registry ordered by priority (ties by registration order)
//! 2. Skips modules whose policy rejects the event (enabled, scope, blacklist, permission)
//! 3. Scans the first admitting module's triggers in registration order
//! 4. Runs the first matching trigger's handler as its own task on the session
//!
//! A module that admits the event but has no matching trigger does not stop
//! the scan. An event nothing matches is dropped silently.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, error, trace};

use crate::registry::SvRegistry;
use crate::session::{Bot, Session};
use crate::sv::Sv;
use crate::trigger::Trigger;
use gscore_core::Event;

/// The outcome of matching one event.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub sv: Arc<Sv>,
    pub trigger: Arc<Trigger>,
    /// The event text after the trigger's pattern was stripped.
    pub text: String,
}

/// Routes events to the first matching trigger.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<SvRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SvRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SvRegistry> {
        &self.registry
    }

    /// Finds the trigger `event` should run, without running it.
    pub fn resolve(&self, event: &Event) -> Option<Resolved> {
        for sv in self.registry.list() {
            let config = sv.config();
            if let Some(reason) = config.rejection(event) {
                trace!(sv = %sv.name(), reason, "Module skipped");
                continue;
            }

            if let Some((trigger, text)) = sv.find_trigger(&event.text) {
                return Some(Resolved { sv, trigger, text });
            }
        }
        None
    }

    /// Dispatches `event`, spawning the matched handler on `session`.
    ///
    /// Returns immediately; the handle resolves when the handler finishes.
    /// Handler errors and panics are logged and stay inside the task.
    pub fn dispatch(&self, session: &Arc<Session>, mut event: Event) -> Option<JoinHandle<()>> {
        let span = debug_span!(
            "dispatch",
            bot_id = %event.bot_id,
            msg_id = %event.msg_id,
            user_id = %event.user_id
        );

        let resolved = span.in_scope(|| self.resolve(&event));
        let Some(Resolved { sv, trigger, text }) = resolved else {
            span.in_scope(|| trace!("No trigger matched"));
            return None;
        };

        span.in_scope(|| {
            debug!(
                sv = %sv.name(),
                kind = %trigger.kind(),
                pattern = %trigger.pattern(),
                "Trigger matched"
            );
        });

        event.command = trigger.pattern().to_string();
        event.text = text;
        let bot = Bot::new(Arc::clone(session), event);
        let sv_name = sv.name().to_string();

        let task = async move {
            match AssertUnwindSafe(trigger.call(bot)).catch_unwind().await {
                Ok(Ok(())) => debug!(sv = %sv_name, "Handler finished"),
                Ok(Err(e)) => error!(sv = %sv_name, error = %e, "Handler failed"),
                Err(_) => error!(sv = %sv_name, "Handler panicked"),
            }
        };
        Some(session.spawn(task.instrument(span)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv::{Area, SvConfig, SvUpdate};
    use gscore_core::{ConnectionHandle, MemoryStore, TargetType};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;
    use tokio_test::assert_ok;

    type Calls = Arc<Mutex<Vec<(String, String)>>>;

    struct Fixture {
        dispatcher: Dispatcher,
        session: Arc<Session>,
        _rx: mpsc::Receiver<Vec<u8>>,
        calls: Calls,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(SvRegistry::new(Arc::new(MemoryStore::new())));
            let (handle, rx) = ConnectionHandle::channel("onebot", 16);
            Self {
                dispatcher: Dispatcher::new(registry),
                session: Arc::new(Session::new(handle)),
                _rx: rx,
                calls: Arc::default(),
            }
        }

        async fn module(&self, name: &str, config: SvConfig) -> Arc<Sv> {
            self.dispatcher
                .registry()
                .get_or_create(name, config)
                .await
                .unwrap()
        }

        /// A handler recording `(tag, text seen)`.
        fn recorder(
            &self,
            tag: &'static str,
        ) -> impl Fn(Bot, Event) -> futures::future::Ready<()> + Clone + Send + Sync + 'static
        {
            let calls = Arc::clone(&self.calls);
            move |_bot: Bot, event: Event| {
                calls
                    .lock()
                    .unwrap()
                    .push((tag.to_string(), event.text.clone()));
                futures::future::ready(())
            }
        }

        async fn run(&self, event: Event) -> bool {
            match self.dispatcher.dispatch(&self.session, event) {
                Some(handle) => {
                    handle.await.unwrap();
                    true
                }
                None => false,
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn group(text: &str) -> Event {
        Event::new(TargetType::Group, "u1", text).with_group("g1")
    }

    #[tokio::test]
    async fn test_lower_priority_value_wins() {
        let fx = Fixture::new();
        let b = fx.module("b", SvConfig::default().with_priority(5)).await;
        let a = fx.module("a", SvConfig::default().with_priority(1)).await;
        b.on_fullmatch("ping", fx.recorder("b"));
        a.on_fullmatch("ping", fx.recorder("a"));

        assert!(fx.run(group("ping")).await);
        assert_eq!(fx.calls(), vec![("a".to_string(), "ping".to_string())]);
    }

    #[tokio::test]
    async fn test_priority_tie_goes_to_first_registered() {
        let fx = Fixture::new();
        let first = fx.module("first", SvConfig::default()).await;
        let second = fx.module("second", SvConfig::default()).await;
        second.on_keyword("hi", fx.recorder("second"));
        first.on_keyword("hi", fx.recorder("first"));

        fx.run(group("oh hi")).await;
        assert_eq!(fx.calls()[0].0, "first");
    }

    #[tokio::test]
    async fn test_scope_filtering() {
        let fx = Fixture::new();
        let sv = fx
            .module("groups", SvConfig::default().with_area(Area::Group))
            .await;
        sv.on_fullmatch("ping", fx.recorder("groups"));

        assert!(!fx.run(Event::new(TargetType::Direct, "u1", "ping")).await);
        assert!(!fx.run(Event::new(TargetType::Channel, "u1", "ping")).await);
        assert!(fx.run(group("ping")).await);
    }

    #[tokio::test]
    async fn test_permission_filtering() {
        let fx = Fixture::new();
        let sv = fx
            .module("admin", SvConfig::default().with_permission(1))
            .await;
        sv.on_fullmatch("shutdown", fx.recorder("admin"));

        assert!(!fx.run(group("shutdown").with_pm(3)).await);
        assert!(fx.run(group("shutdown").with_pm(1)).await);
        assert!(fx.run(group("shutdown").with_pm(0)).await);
        assert_eq!(fx.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_blacklisted_target_is_ignored() {
        let fx = Fixture::new();
        let sv = fx
            .module("quiet", SvConfig::default().with_black_list(["g1"]))
            .await;
        sv.on_keyword("", fx.recorder("quiet"));

        assert!(!fx.run(group("anything")).await);
        assert!(fx.run(Event::new(TargetType::Group, "u1", "x").with_group("g2")).await);
    }

    #[tokio::test]
    async fn test_disabled_module_falls_through() {
        let fx = Fixture::new();
        let high = fx.module("high", SvConfig::default().with_priority(0)).await;
        let low = fx.module("low", SvConfig::default().with_priority(9)).await;
        high.on_fullmatch("ping", fx.recorder("high"));
        low.on_fullmatch("ping", fx.recorder("low"));

        high.set(SvUpdate::new().enabled(false)).await.unwrap();
        fx.run(group("ping")).await;
        assert_eq!(fx.calls()[0].0, "low");
    }

    #[tokio::test]
    async fn test_prefix_and_suffix_are_stripped() {
        let fx = Fixture::new();
        let sv = fx.module("dice", SvConfig::default()).await;
        sv.on_prefix("!roll ", fx.recorder("roll"));
        sv.on_suffix(" pls", fx.recorder("pls"));

        fx.run(group("!roll 20")).await;
        fx.run(group("help pls")).await;
        assert_eq!(
            fx.calls(),
            vec![
                ("roll".to_string(), "20".to_string()),
                ("pls".to_string(), "help".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_handler_sees_matched_command() {
        let fx = Fixture::new();
        let sv = fx.module("cmd", SvConfig::default()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        sv.on_prefix("/echo ", move |_bot: Bot, event: Event| {
            let tx = tx.clone();
            async move {
                tx.send((event.command, event.raw_text)).unwrap();
            }
        });

        fx.run(group("/echo hi")).await;
        assert_eq!(
            rx.recv().await.unwrap(),
            ("/echo ".to_string(), "/echo hi".to_string())
        );
    }

    #[tokio::test]
    async fn test_no_match_returns_none() {
        let fx = Fixture::new();
        fx.module("empty", SvConfig::default()).await;
        assert!(!fx.run(group("hello")).await);
    }

    #[tokio::test]
    async fn test_failing_handlers_do_not_poison_dispatch() {
        let fx = Fixture::new();
        let sv = fx.module("flaky", SvConfig::default()).await;
        sv.on_fullmatch("err", |_bot: Bot, _event: Event| async {
            Err::<(), _>(anyhow::anyhow!("boom"))
        });
        sv.on_fullmatch("panic", |_bot: Bot, _event: Event| async {
            let broken = true;
            if broken {
                panic!("handler bug");
            }
        });
        sv.on_fullmatch("ok", fx.recorder("ok"));

        assert!(fx.run(group("err")).await);
        assert!(fx.run(group("panic")).await);
        assert!(fx.run(group("ok")).await);
        assert_eq!(fx.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_does_not_wait_for_handler() {
        let fx = Fixture::new();
        let sv = fx.module("slow", SvConfig::default()).await;
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));
        sv.on_fullmatch("wait", move |_bot: Bot, _event: Event| {
            let release_rx = Arc::clone(&release_rx);
            async move {
                if let Some(rx) = release_rx.lock().await.take() {
                    let _ = rx.await;
                }
            }
        });
        sv.on_fullmatch("fast", fx.recorder("fast"));

        let slow = fx.dispatcher.dispatch(&fx.session, group("wait")).unwrap();
        assert!(fx.run(group("fast")).await);
        assert!(!slow.is_finished());

        release_tx.send(()).unwrap();
        assert_ok!(slow.await);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_handlers_share_the_scheduler_cooperatively() {
        let fx = Fixture::new();
        let sv = fx.module("coop", SvConfig::default()).await;
        let released = Arc::new(AtomicBool::new(false));
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        // Busy-waits without yielding, giving up after a deadline.
        let (flag, tx) = (Arc::clone(&released), seen_tx.clone());
        sv.on_fullmatch("spin", move |_bot: Bot, _event: Event| {
            let (flag, tx) = (Arc::clone(&flag), tx.clone());
            async move {
                let deadline = Instant::now() + Duration::from_millis(100);
                while !flag.load(Ordering::SeqCst) && Instant::now() < deadline {
                    std::hint::spin_loop();
                }
                let _ = tx.send(("spin", flag.load(Ordering::SeqCst)));
            }
        });

        // Waits for the same flag but yields between checks.
        let (flag, tx) = (Arc::clone(&released), seen_tx.clone());
        sv.on_fullmatch("yield", move |_bot: Bot, _event: Event| {
            let (flag, tx) = (Arc::clone(&flag), tx.clone());
            async move {
                while !flag.load(Ordering::SeqCst) {
                    tokio::task::yield_now().await;
                }
                let _ = tx.send(("yield", true));
            }
        });

        let flag = Arc::clone(&released);
        sv.on_fullmatch("release", move |_bot: Bot, _event: Event| {
            let flag = Arc::clone(&flag);
            async move { flag.store(true, Ordering::SeqCst) }
        });

        // The spinning handler holds the only worker, so "release" never runs
        // before its deadline.
        let spin = fx.dispatcher.dispatch(&fx.session, group("spin")).unwrap();
        let release = fx.dispatcher.dispatch(&fx.session, group("release")).unwrap();
        assert_ok!(spin.await);
        assert_ok!(release.await);
        assert_eq!(seen_rx.recv().await, Some(("spin", false)));

        released.store(false, Ordering::SeqCst);
        let waiting = fx.dispatcher.dispatch(&fx.session, group("yield")).unwrap();
        let release = fx.dispatcher.dispatch(&fx.session, group("release")).unwrap();
        assert_ok!(waiting.await);
        assert_ok!(release.await);
        assert_eq!(seen_rx.recv().await, Some(("yield", true)));
    }
}
