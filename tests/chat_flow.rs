//! End-to-end tests of the credential refresh and resubscribe protocol.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use topic_chat::common::{ChatEvent, RoomCommand, RoomEvent};
use topic_chat::error::{ChatError, CredentialFetchError, ErrorCode, TransportError};
use topic_chat::network::{
    CacheClient, ChatRoom, ClientFactory, Credential, Publisher, Subscription,
    SubscriptionCallbacks, SubscriptionController, TopicClient, TransportConfig,
};

use support::{CACHE, Harness, TOPIC};

type Received = Arc<Mutex<Vec<String>>>;
type Errors = mpsc::UnboundedReceiver<(TransportError, Subscription)>;

fn recording_callbacks() -> (SubscriptionCallbacks, Received, Errors) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let (error_tx, error_rx) = mpsc::unbounded_channel();
    let sink = received.clone();
    let callbacks = SubscriptionCallbacks::new(
        move |item| sink.lock().unwrap().push(item.value_string().to_string()),
        move |err, subscription| {
            let _ = error_tx.send((err, subscription));
        },
    );
    (callbacks, received, error_rx)
}

#[tokio::test]
async fn message_is_published_and_delivered_back() {
    let harness = Harness::start().await;
    let controller = harness.controller(5);
    let publisher = Publisher::new(controller.clone());
    let (callbacks, received, _errors) = recording_callbacks();

    controller.subscribe(CACHE, TOPIC, callbacks).await.unwrap();
    assert_eq!(harness.issued(), 1);
    assert!(harness.service.is_token_valid("tok1"));

    publisher
        .send_chat_message(CACHE, TOPIC, "alice", "hi")
        .await
        .unwrap();

    let payloads = received.lock().unwrap().clone();
    assert_eq!(payloads.len(), 1);
    let ChatEvent::Message { timestamp, .. } = ChatEvent::from_payload(&payloads[0]).unwrap()
    else {
        panic!("expected a message event, got {}", payloads[0]);
    };
    assert_eq!(
        payloads[0],
        format!(r#"{{"event":"message","username":"alice","text":"hi","timestamp":{timestamp}}}"#)
    );
}

#[tokio::test]
async fn expired_publish_refreshes_session_and_retries_once() {
    let harness = Harness::start().await;
    let controller = harness.controller(5);
    let publisher = Publisher::new(controller.clone());
    let (callbacks, received, _errors) = recording_callbacks();

    let first = controller.subscribe(CACHE, TOPIC, callbacks).await.unwrap();
    harness.service.revoke_token("tok1");

    publisher
        .send_chat_message(CACHE, TOPIC, "alice", "after expiry")
        .await
        .unwrap();

    assert_eq!(harness.issued(), 2);
    assert!(!first.is_active());
    assert_eq!(harness.service.subscriber_count(CACHE, TOPIC), 1);
    let payloads = received.lock().unwrap().clone();
    assert_eq!(payloads.len(), 1);
    assert!(payloads[0].contains("after expiry"));
}

#[tokio::test]
async fn subscription_auth_error_resubscribes_with_same_callbacks() {
    let harness = Harness::start().await;
    let controller = harness.controller(5);
    let (callbacks, received, mut errors) = recording_callbacks();

    let first = controller.subscribe(CACHE, TOPIC, callbacks).await.unwrap();
    harness.service.revoke_token("tok1");
    assert_eq!(harness.service.sweep_expired(), 1);

    let (err, failed) = errors.recv().await.unwrap();
    assert!(err.is_authentication());
    assert_eq!(failed.id(), first.id());

    let replacement = controller
        .handle_error(err, failed)
        .await
        .unwrap()
        .expect("authentication errors resubscribe");

    assert!(!first.is_active());
    assert!(replacement.is_active());
    assert_ne!(replacement.id(), first.id());
    assert_eq!(harness.issued(), 2);
    assert_eq!(harness.service.subscriber_count(CACHE, TOPIC), 1);

    harness
        .service
        .admit_token("other-client", Duration::from_secs(60));
    harness
        .service
        .publish("other-client", CACHE, TOPIC, "still listening")
        .unwrap();
    assert_eq!(*received.lock().unwrap(), vec!["still listening"]);
}

#[tokio::test]
async fn idle_subscription_survives_more_expiries_than_the_retry_cap() {
    let harness = Harness::start().await;
    let controller = harness.controller(5);
    let (callbacks, _received, mut errors) = recording_callbacks();

    let mut current = controller.subscribe(CACHE, TOPIC, callbacks).await.unwrap();
    for expiry in 1..=7 {
        harness.service.revoke_token(&format!("tok{expiry}"));
        assert_eq!(harness.service.sweep_expired(), 1);
        let (err, failed) = errors.recv().await.unwrap();
        assert_eq!(failed.id(), current.id());

        current = controller
            .handle_error(err, failed)
            .await
            .unwrap()
            .expect("every expiry resubscribes");
        assert_eq!(harness.issued(), expiry + 1);
    }

    assert!(current.is_active());
    assert_eq!(harness.service.subscriber_count(CACHE, TOPIC), 1);
}

#[tokio::test]
async fn error_from_replaced_subscription_keeps_fresh_session() {
    let harness = Harness::start().await;
    let controller = harness.controller(5);
    let publisher = Publisher::new(controller.clone());
    let (callbacks, received, mut errors) = recording_callbacks();

    let first = controller.subscribe(CACHE, TOPIC, callbacks).await.unwrap();
    harness.service.revoke_token("tok1");
    harness.service.sweep_expired();
    let (err, stale) = errors.recv().await.unwrap();

    // The publish notices the expiry first and rebuilds the session.
    publisher
        .send_chat_message(CACHE, TOPIC, "alice", "hi")
        .await
        .unwrap();
    assert_eq!(harness.issued(), 2);
    let fresh = controller
        .sessions()
        .current_subscription()
        .await
        .expect("publish refresh resubscribed");
    assert_ne!(fresh.id(), first.id());

    let outcome = controller.handle_error(err, stale).await.unwrap();

    assert!(outcome.is_none());
    assert_eq!(harness.issued(), 2);
    assert!(fresh.is_active());
    assert!(controller.sessions().is_ready().await);
    assert_eq!(harness.service.subscriber_count(CACHE, TOPIC), 1);
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn non_auth_subscription_error_is_not_retried() {
    let harness = Harness::start().await;
    let controller = harness.controller(5);
    let (callbacks, _received, _errors) = recording_callbacks();

    let subscription = controller.subscribe(CACHE, TOPIC, callbacks).await.unwrap();
    let outcome = controller
        .handle_error(
            TransportError::new(ErrorCode::Unavailable, "stream reset"),
            subscription.clone(),
        )
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert!(subscription.is_active());
    assert_eq!(harness.issued(), 1);
}

#[tokio::test]
async fn resubscribe_gives_up_after_bounded_attempts() {
    // Only tok1 is known to the service; every refreshed token is rejected.
    let harness = Harness::start_with(1, false).await;
    let controller = harness.controller(3);
    let (callbacks, _received, mut errors) = recording_callbacks();

    controller.subscribe(CACHE, TOPIC, callbacks).await.unwrap();
    harness.service.revoke_token("tok1");
    harness.service.sweep_expired();
    let (err, failed) = errors.recv().await.unwrap();

    let result = controller.handle_error(err, failed).await;

    assert!(matches!(
        result,
        Err(ChatError::ReauthExhausted { attempts: 3 })
    ));
    assert_eq!(harness.issued(), 4);
    assert_eq!(harness.service.subscriber_count(CACHE, TOPIC), 0);
}

#[tokio::test]
async fn credential_endpoint_failure_surfaces_on_subscribe() {
    let harness = Harness::start_with(usize::MAX, true).await;
    let controller = harness.controller(5);
    let (callbacks, _received, _errors) = recording_callbacks();

    let result = controller.subscribe(CACHE, TOPIC, callbacks).await;

    assert!(matches!(
        result,
        Err(ChatError::CredentialFetch(CredentialFetchError::Status { status: 500, .. }))
    ));
    assert!(!controller.sessions().is_ready().await);
}

#[tokio::test]
async fn rejected_subscribe_is_surfaced_without_retry() {
    let harness = Harness::start().await;
    let controller = harness.controller(5);
    let (callbacks, _received, _errors) = recording_callbacks();

    let result = controller.subscribe("missing", TOPIC, callbacks).await;

    assert!(matches!(
        result,
        Err(ChatError::Subscribe(TransportError {
            code: ErrorCode::NotFound,
            ..
        }))
    ));
    assert_eq!(harness.issued(), 1);
}

async fn next_event(events: &mut mpsc::Receiver<RoomEvent>) -> RoomEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("room event within timeout")
        .expect("room still running")
}

#[tokio::test]
async fn chat_room_skips_malformed_items_and_announces_once() {
    let harness = Harness::start().await;
    let controller = harness.controller(5);
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut event_rx) = mpsc::channel(16);

    let room = ChatRoom::new(CACHE, TOPIC, "alice", controller, event_tx, cmd_rx);
    let room_task = tokio::spawn(room.run());

    assert!(matches!(
        next_event(&mut event_rx).await,
        RoomEvent::Subscribed { ref topic } if topic == TOPIC
    ));
    assert!(matches!(
        next_event(&mut event_rx).await,
        RoomEvent::EventReceived(ChatEvent::UserJoined { ref username, .. }) if username == "alice"
    ));

    harness
        .service
        .admit_token("other-client", Duration::from_secs(60));
    harness
        .service
        .publish("other-client", CACHE, TOPIC, "{not json")
        .unwrap();
    harness
        .service
        .publish(
            "other-client",
            CACHE,
            TOPIC,
            r#"{"event":"message","username":"bob","text":"hello","timestamp":1}"#,
        )
        .unwrap();
    assert!(matches!(
        next_event(&mut event_rx).await,
        RoomEvent::EventReceived(ChatEvent::Message { ref username, .. }) if username == "bob"
    ));

    harness.service.revoke_token("tok1");
    harness.service.sweep_expired();
    assert!(matches!(
        next_event(&mut event_rx).await,
        RoomEvent::Resubscribed
    ));
    assert_eq!(harness.issued(), 2);

    cmd_tx
        .send(RoomCommand::SendMessage("back again".to_string()))
        .await
        .unwrap();
    // No second join announcement precedes the message.
    assert!(matches!(
        next_event(&mut event_rx).await,
        RoomEvent::EventReceived(ChatEvent::Message { ref text, .. }) if text == "back again"
    ));

    cmd_tx.send(RoomCommand::Leave).await.unwrap();
    let result = timeout(Duration::from_secs(5), room_task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(harness.service.subscriber_count(CACHE, TOPIC), 0);
}

#[tokio::test]
async fn chat_room_reports_failed_subscribe() {
    let harness = Harness::start_with(usize::MAX, true).await;
    let controller = harness.controller(5);
    let (_cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut event_rx) = mpsc::channel(16);

    let room = ChatRoom::new(CACHE, TOPIC, "alice", controller, event_tx, cmd_rx);
    let result = room.run().await;

    assert!(matches!(result, Err(ChatError::CredentialFetch(_))));
    assert!(matches!(
        next_event(&mut event_rx).await,
        RoomEvent::SubscribeFailed(_)
    ));
}

type RoomTask = JoinHandle<Result<(), ChatError>>;

/// Starts a room and waits for its subscribe and join announcement.
async fn joined_room(
    harness: &Harness,
    subscriptions: Arc<SubscriptionController>,
) -> (mpsc::Sender<RoomCommand>, mpsc::Receiver<RoomEvent>, RoomTask) {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut event_rx) = mpsc::channel(16);
    let room = ChatRoom::new(CACHE, TOPIC, "alice", subscriptions, event_tx, cmd_rx);
    let task = tokio::spawn(room.run());

    assert!(matches!(
        next_event(&mut event_rx).await,
        RoomEvent::Subscribed { .. }
    ));
    assert!(matches!(
        next_event(&mut event_rx).await,
        RoomEvent::EventReceived(ChatEvent::UserJoined { .. })
    ));
    assert_eq!(harness.issued(), 1);
    (cmd_tx, event_rx, task)
}

async fn leave(cmd_tx: mpsc::Sender<RoomCommand>, task: RoomTask) {
    cmd_tx.send(RoomCommand::Leave).await.unwrap();
    let result = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn chat_room_stays_connected_across_repeated_expiries() {
    let harness = Harness::start().await;
    let (cmd_tx, mut event_rx, task) = joined_room(&harness, harness.controller(5)).await;

    for expiry in 1..=7 {
        harness.service.revoke_token(&format!("tok{expiry}"));
        harness.service.sweep_expired();
        assert!(matches!(
            next_event(&mut event_rx).await,
            RoomEvent::Resubscribed
        ));
    }
    assert_eq!(harness.issued(), 8);

    cmd_tx
        .send(RoomCommand::SendMessage("still here".to_string()))
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut event_rx).await,
        RoomEvent::EventReceived(ChatEvent::Message { ref text, .. }) if text == "still here"
    ));

    leave(cmd_tx, task).await;
}

#[tokio::test]
async fn chat_room_refreshes_once_when_publish_and_subscription_both_see_expiry() {
    let harness = Harness::start().await;
    let (cmd_tx, mut event_rx, task) = joined_room(&harness, harness.controller(5)).await;

    harness.service.revoke_token("tok1");
    cmd_tx
        .send(RoomCommand::SendMessage("racing".to_string()))
        .await
        .unwrap();
    harness.service.sweep_expired();

    // Whichever path handles the expiry first, the other must not rebuild again.
    loop {
        match next_event(&mut event_rx).await {
            RoomEvent::Resubscribed => continue,
            RoomEvent::EventReceived(ChatEvent::Message { ref text, .. }) if text == "racing" => {
                break;
            }
            other => panic!("unexpected room event: {other:?}"),
        }
    }
    assert_eq!(harness.issued(), 2);
    assert_eq!(harness.service.subscriber_count(CACHE, TOPIC), 1);

    cmd_tx
        .send(RoomCommand::SendMessage("after".to_string()))
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut event_rx).await,
        RoomEvent::EventReceived(ChatEvent::Message { ref text, .. }) if text == "after"
    ));
    assert_eq!(harness.issued(), 2);

    leave(cmd_tx, task).await;
}

/// Loopback clients whose publishes can be switched to fail authentication
/// while subscribes keep working.
struct PublishGate {
    inner: Arc<dyn ClientFactory>,
    reject: Arc<AtomicBool>,
}

struct GatedTopicClient {
    inner: Arc<dyn TopicClient>,
    reject: Arc<AtomicBool>,
}

#[async_trait]
impl TopicClient for GatedTopicClient {
    async fn subscribe(
        &self,
        cache_name: &str,
        topic_name: &str,
        callbacks: SubscriptionCallbacks,
    ) -> Result<Subscription, TransportError> {
        self.inner.subscribe(cache_name, topic_name, callbacks).await
    }

    async fn publish(
        &self,
        cache_name: &str,
        topic_name: &str,
        payload: &str,
    ) -> Result<(), TransportError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(TransportError::authentication("publish rejected"));
        }
        self.inner.publish(cache_name, topic_name, payload).await
    }
}

impl ClientFactory for PublishGate {
    fn topic_client(
        &self,
        credential: &Credential,
        config: &TransportConfig,
    ) -> Result<Arc<dyn TopicClient>, TransportError> {
        Ok(Arc::new(GatedTopicClient {
            inner: self.inner.topic_client(credential, config)?,
            reject: self.reject.clone(),
        }))
    }

    fn cache_client(
        &self,
        credential: &Credential,
        config: &TransportConfig,
    ) -> Result<Arc<dyn CacheClient>, TransportError> {
        self.inner.cache_client(credential, config)
    }
}

#[tokio::test]
async fn chat_room_reports_message_lost_after_retried_publish_fails() {
    let harness = Harness::start().await;
    let reject = Arc::new(AtomicBool::new(false));
    let gate = PublishGate {
        inner: Arc::new(harness.loopback_factory()),
        reject: reject.clone(),
    };
    let (cmd_tx, mut event_rx, task) =
        joined_room(&harness, harness.controller_with(5, Arc::new(gate))).await;

    reject.store(true, Ordering::SeqCst);
    cmd_tx
        .send(RoomCommand::SendMessage("lost".to_string()))
        .await
        .unwrap();
    match next_event(&mut event_rx).await {
        RoomEvent::DeliveryFailed(reason) => assert!(reason.contains("publish rejected")),
        other => panic!("expected a delivery failure, got {other:?}"),
    }
    // One refresh for the failed publish, no second one for the retry.
    assert_eq!(harness.issued(), 2);

    reject.store(false, Ordering::SeqCst);
    cmd_tx
        .send(RoomCommand::SendMessage("delivered".to_string()))
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut event_rx).await,
        RoomEvent::EventReceived(ChatEvent::Message { ref text, .. }) if text == "delivered"
    ));
    assert_eq!(harness.issued(), 2);

    leave(cmd_tx, task).await;
}
