//! Handlers wrapped in tower middleware before registration.

use std::sync::Arc;
use std::time::Duration;

use gscore_core::{ConnectionHandle, Event, MemoryStore, TargetType};
use gscore_framework::{
    Bot, Dispatcher, HandlerService, ServiceBuilder, Session, SvConfig, SvRegistry, TriggerKind,
};
use tower::timeout::TimeoutLayer;

async fn slow(_bot: Bot, _event: Event) -> &'static str {
    tokio::time::sleep(Duration::from_secs(60)).await;
    "too late"
}

async fn quick(_bot: Bot, event: Event) -> String {
    format!("you said {}", event.text)
}

#[tokio::test(start_paused = true)]
async fn timeout_layer_cuts_off_slow_handler() {
    let registry = Arc::new(SvRegistry::new(Arc::new(MemoryStore::new())));
    let sv = registry
        .get_or_create("layered", SvConfig::default())
        .await
        .unwrap();

    let timed = ServiceBuilder::new()
        .layer(TimeoutLayer::new(Duration::from_secs(1)))
        .service(HandlerService::new(slow));
    let report = sv.on_service(TriggerKind::FullMatch, "slow", timed);
    assert_eq!(report.added, vec!["slow"]);
    sv.on_prefix("say ", quick);

    let (handle, mut rx) = ConnectionHandle::channel("onebot", 4);
    let session = Arc::new(Session::new(handle));
    let dispatcher = Dispatcher::new(registry);

    let event = Event::new(TargetType::Group, "u1", "slow").with_group("g1");
    dispatcher
        .dispatch(&session, event)
        .expect("slow trigger should match")
        .await
        .unwrap();
    assert!(rx.try_recv().is_err());

    let event = Event::new(TargetType::Group, "u1", "say hello").with_group("g1");
    dispatcher.dispatch(&session, event).unwrap().await.unwrap();

    let frame: serde_json::Value = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(frame["content"][0]["data"], "you said hello");
    assert_eq!(frame["target_id"], "g1");
}
