//! Outbound dispatch and inbound routing through a running client

mod common;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use common::{eventually, settle, Harness, PEER};
use parley_core::{
    DisconnectReason, InboundMessage, MessageId, OutboundRequest, SendOutcome, Timestamp,
};
use parley_protocol::handlers::echo;
use parley_protocol::{
    ClientConfig, DispatchPolicy, HandlerContext, Matcher, MessageHandler, SentMessage,
    StaticReply, TransportError,
};

#[tokio::test]
async fn test_send_to_registered_destination() {
    let harness = Harness::new(ClientConfig::default());
    harness.start().await;
    harness.network.script_send(Ok(SentMessage {
        id: MessageId::from("ABC123"),
        timestamp: Timestamp::from_secs(1_700_000_000),
    }));

    let outcome = harness.client.send_message("79123456789", "hello").await;

    assert_eq!(
        serde_json::to_value(outcome.to_record()).unwrap(),
        serde_json::json!({"success": true, "messageId": "ABC123", "timestamp": 1_700_000_000})
    );
}

#[tokio::test]
async fn test_send_to_unregistered_destination() {
    let harness = Harness::new(ClientConfig::default());
    harness.start().await;

    let outcome = harness.client.send_message("71111111111", "hello").await;

    assert_eq!(
        serde_json::to_value(outcome.to_record()).unwrap(),
        serde_json::json!({"success": false, "error": "destination not registered"})
    );
    assert!(harness.network.sent().is_empty());
}

#[tokio::test]
async fn test_bare_and_qualified_destinations_agree() {
    let harness = Harness::new(ClientConfig::default());
    harness.start().await;

    let bare = harness.client.send_message("79123456789", "one").await;
    let qualified = harness
        .client
        .send_message("79123456789@s.whatsapp.net", "two")
        .await;

    assert!(bare.is_success());
    assert!(qualified.is_success());
    assert_eq!(harness.network.lookups(), vec!["79123456789", "79123456789"]);
    let sent: Vec<String> = harness.network.sent().into_iter().map(|s| s.to).collect();
    assert_eq!(sent, vec!["79123456789@s.whatsapp.net", "79123456789@s.whatsapp.net"]);
}

#[tokio::test]
async fn test_send_error_surfaces_verbatim() {
    let harness = Harness::new(ClientConfig::default());
    harness.start().await;
    harness
        .network
        .script_send(Err(TransportError::Rejected("not-acceptable".to_string())));

    let outcome = harness.client.send_message(PEER, "hello").await;

    assert_eq!(outcome, SendOutcome::failed("not-acceptable"));
}

#[tokio::test]
async fn test_send_request_on_current_session() {
    let harness = Harness::new(ClientConfig::default());
    harness.start().await;
    let session = harness.client.sessions().current().unwrap();

    let outcome = harness
        .client
        .dispatcher()
        .send_request(&session, &OutboundRequest::new(PEER, "queued"))
        .await;

    assert!(outcome.is_success());
    let sent = harness.network.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "79123456789@s.whatsapp.net");
    assert_eq!(sent[0].body, "queued");
}

#[tokio::test]
async fn test_send_uses_reconnected_session() {
    let harness = Harness::new(ClientConfig::default());
    harness.start().await;

    harness.network.disconnect(DisconnectReason::ConnectionLost).await;
    harness.wait_generation_open(2).await;

    let outcome = harness.client.send_message(PEER, "after reconnect").await;
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_concurrent_sends_each_get_an_outcome() {
    let harness = Harness::new(ClientConfig::default());
    harness.start().await;

    let bodies: Vec<String> = (0..5).map(|i| format!("message {}", i)).collect();
    let outcomes = futures::future::join_all(
        bodies.iter().map(|body| harness.client.send_message(PEER, body)),
    )
    .await;

    assert!(outcomes.iter().all(SendOutcome::is_success));
    // One lookup and one send per call, no retries
    assert_eq!(harness.network.lookups().len(), 5);
    assert_eq!(harness.network.sent().len(), 5);
}

/// Records `start:<text>` and `end:<text>` around a few yields
struct Traced {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MessageHandler for Traced {
    async fn handle(&self, ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
        self.log.lock().push(format!("start:{}", ctx.text));
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.log.lock().push(format!("end:{}", ctx.text));
        Ok(())
    }
}

#[tokio::test]
async fn test_batches_processed_in_order() {
    let harness = Harness::new(ClientConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    harness
        .client
        .router()
        .register("traced", Matcher::Any, Traced { log: log.clone() });
    harness.start().await;

    let from = format!("{}@s.whatsapp.net", PEER);
    harness
        .network
        .deliver(vec![
            InboundMessage::text(&from, "a"),
            InboundMessage::text(&from, "b"),
        ])
        .await;
    harness.network.deliver(vec![InboundMessage::text(&from, "c")]).await;

    eventually(|| log.lock().len() == 6).await;
    assert_eq!(
        *log.lock(),
        vec!["start:a", "end:a", "start:b", "end:b", "start:c", "end:c"]
    );
}

#[tokio::test]
async fn test_backlog_never_reaches_handlers() {
    let harness = Harness::new(ClientConfig::default());
    harness
        .client
        .router()
        .register("ping", Matcher::exact("/ping"), StaticReply::new("pong"));
    harness.start().await;

    let from = format!("{}@s.whatsapp.net", PEER);
    harness.network.replay(vec![InboundMessage::text(&from, "/ping")]).await;
    settle().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(harness.network.sent().is_empty());
}

#[tokio::test]
async fn test_own_replies_are_not_reprocessed() {
    let harness = Harness::new(ClientConfig::default());
    harness
        .client
        .router()
        .register("all", Matcher::Any, StaticReply::new("auto-reply"));
    harness.start().await;

    let from = format!("{}@s.whatsapp.net", PEER);
    harness.network.deliver(vec![InboundMessage::text(&from, "hi")]).await;

    eventually(|| harness.network.sent().len() == 1).await;
    // The echoed reply comes back flagged as ours and must not trigger another
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.network.sent().len(), 1);
}

#[tokio::test]
async fn test_bot_commands_first_match() {
    let harness = Harness::new(ClientConfig::default());
    let router = harness.client.router();
    router.register("help", Matcher::exact("/help"), StaticReply::new("commands: /ping, /echo"));
    router.register("echo", Matcher::prefix("/echo "), echo("/echo "));
    router.register("greet", Matcher::contains("hello"), StaticReply::new("hi!"));
    harness.start().await;

    let from = format!("{}@s.whatsapp.net", PEER);
    harness
        .network
        .deliver(vec![
            InboundMessage::text(&from, "/help"),
            InboundMessage::text(&from, "/echo hello"),
            InboundMessage::text(&from, "well hello"),
        ])
        .await;

    eventually(|| harness.network.sent().len() == 3).await;
    let bodies: Vec<String> = harness.network.sent().into_iter().map(|s| s.body).collect();
    assert_eq!(bodies, vec!["commands: /ping, /echo", "hello", "hi!"]);
}

#[tokio::test]
async fn test_all_matches_policy_fires_every_handler() {
    let mut config = ClientConfig::default();
    config.routing.policy = DispatchPolicy::AllMatches;
    let harness = Harness::new(config);
    let router = harness.client.router();
    router.register("echo", Matcher::prefix("/echo "), echo("/echo "));
    router.register("greet", Matcher::contains("hello"), StaticReply::new("hi!"));
    harness.start().await;

    let from = format!("{}@s.whatsapp.net", PEER);
    harness
        .network
        .deliver(vec![InboundMessage::text(&from, "/echo hello")])
        .await;

    eventually(|| harness.network.sent().len() == 2).await;
    let bodies: Vec<String> = harness.network.sent().into_iter().map(|s| s.body).collect();
    assert_eq!(bodies, vec!["hello", "hi!"]);
}
