//! Update intake: events are routed per user, so one slow conversation
//! does not hold up the others.

mod common;

use async_trait::async_trait;
use common::{HeldGateway, RecordingMessenger, StaticRateProvider, OPERATOR_CHAT};
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subpay_bot::handlers::Dispatcher;
use subpay_bot::messaging::{
    ChatId, IncomingUpdate, InboundEvent, InboundKind, MessagingResult, UpdateSource, UserRef,
};
use subpay_bot::services::exchange_rate::RateFetcher;
use subpay_bot::services::notification::OperatorRelay;
use subpay_bot::services::order_form::{FormRules, FormStep};
use subpay_bot::services::payment_orchestrator::{PaymentOrchestrator, PaymentRegistry};
use subpay_bot::services::pricing::PricingEngine;
use subpay_bot::services::session_store::SessionStore;
use subpay_bot::workers::payment_monitor::PaymentMonitorConfig;
use subpay_bot::workers::update_poller::{UpdatePoller, UpdatePollerConfig};
use tokio::sync::watch;

const SLOW_USER: i64 = 42;
const OTHER_USER: i64 = 43;

/// Hands out scripted batches, then long-polls forever.
struct ScriptedUpdates {
    batches: Mutex<VecDeque<Vec<IncomingUpdate>>>,
}

impl ScriptedUpdates {
    fn new(events: Vec<InboundEvent>) -> Arc<Self> {
        let batch = events
            .into_iter()
            .enumerate()
            .map(|(i, event)| IncomingUpdate {
                update_id: i as i64 + 1,
                event: Some(event),
            })
            .collect();
        Arc::new(Self {
            batches: Mutex::new(VecDeque::from(vec![batch])),
        })
    }
}

#[async_trait]
impl UpdateSource for ScriptedUpdates {
    async fn poll_updates(&self, _offset: Option<i64>) -> MessagingResult<Vec<IncomingUpdate>> {
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => Ok(batch),
            None => std::future::pending().await,
        }
    }
}

fn event(user_id: i64, kind: InboundKind) -> InboundEvent {
    InboundEvent {
        user: UserRef::new(user_id),
        chat_id: ChatId::from(user_id),
        kind,
    }
}

fn command(user_id: i64, name: &str) -> InboundEvent {
    event(
        user_id,
        InboundKind::Command {
            name: name.to_string(),
            args: String::new(),
        },
    )
}

fn text(user_id: i64, value: &str) -> InboundEvent {
    event(user_id, InboundKind::Text(value.to_string()))
}

fn press(user_id: i64, payload: &str) -> InboundEvent {
    event(
        user_id,
        InboundKind::Action {
            action_id: format!("cb-{}-{}", user_id, payload),
            payload: payload.to_string(),
            message: None,
            message_text: None,
        },
    )
}

struct Harness {
    dispatcher: Arc<Dispatcher>,
    messenger: Arc<RecordingMessenger>,
    gateway: Arc<HeldGateway>,
    _monitor_shutdown: watch::Sender<bool>,
}

fn harness() -> Harness {
    let messenger = RecordingMessenger::new();
    let gateway = HeldGateway::new();
    let relay = Arc::new(OperatorRelay::new(
        messenger.clone(),
        ChatId::new(OPERATOR_CHAT),
        "@support",
    ));
    let (monitor_shutdown, monitor_rx) = watch::channel(false);
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        gateway.clone(),
        messenger.clone(),
        relay.clone(),
        Arc::new(PaymentRegistry::new()),
        PaymentMonitorConfig {
            poll_interval: Duration::from_secs(3600),
            max_attempts: 24,
        },
        monitor_rx,
    ));
    let rates = Arc::new(
        RateFetcher::new(Duration::from_secs(3))
            .add_provider(StaticRateProvider::new("static", dec!(90))),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        messenger.clone(),
        Arc::new(SessionStore::new()),
        FormRules::default(),
        rates,
        PricingEngine::default(),
        relay,
        orchestrator,
        "@support",
    ));
    Harness {
        dispatcher,
        messenger,
        gateway,
        _monitor_shutdown: monitor_shutdown,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn slow_checkout_does_not_block_other_users() {
    let h = harness();

    // Bring the slow user up to the payment method step.
    for e in [
        command(SLOW_USER, "start"),
        text(SLOW_USER, "Netflix"),
        text(SLOW_USER, "user@example.com"),
        text(SLOW_USER, "hunter2"),
        text(SLOW_USER, "https://example.com/creator"),
        press(SLOW_USER, "plan:1m"),
        text(SLOW_USER, "$30"),
        text(SLOW_USER, "-"),
        press(SLOW_USER, "confirm:accept"),
    ] {
        h.dispatcher.dispatch(e).await;
    }
    let slow_chat = ChatId::from(SLOW_USER);
    let before = h.messenger.texts_to(&slow_chat).len();

    let source = ScriptedUpdates::new(vec![
        press(SLOW_USER, "pay:card"),
        command(OTHER_USER, "start"),
    ]);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = tokio::spawn(
        UpdatePoller::new(source, h.dispatcher.clone(), UpdatePollerConfig::default())
            .run(shutdown_rx),
    );

    let other_chat = ChatId::from(OTHER_USER);
    assert!(wait_until(|| !h.messenger.texts_to(&other_chat).is_empty()).await);
    // The slow user's gateway call is still open.
    assert_eq!(h.gateway.creates_started(), 1);
    assert_eq!(h.messenger.texts_to(&slow_chat).len(), before);

    h.gateway.release();
    assert!(wait_until(|| h.messenger.texts_to(&slow_chat).len() > before).await);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), poller)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn one_users_events_keep_their_order() {
    let h = harness();
    let source = ScriptedUpdates::new(vec![
        command(SLOW_USER, "start"),
        text(SLOW_USER, "Netflix"),
        text(SLOW_USER, "user@example.com"),
        command(OTHER_USER, "start"),
        text(SLOW_USER, "hunter2"),
    ]);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = tokio::spawn(
        UpdatePoller::new(source, h.dispatcher.clone(), UpdatePollerConfig::default())
            .run(shutdown_rx),
    );

    let sessions = h.dispatcher.sessions().clone();
    let mut reached = false;
    for _ in 0..500 {
        let step = sessions.get(SLOW_USER).await.map(|s| s.state.step());
        if step == Some(FormStep::Source) {
            reached = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reached);
    assert_eq!(
        sessions.get(OTHER_USER).await.map(|s| s.state.step()),
        Some(FormStep::Service)
    );

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), poller)
        .await
        .unwrap()
        .unwrap();
}
