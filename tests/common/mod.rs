//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subpay_bot::messaging::{
    ChatId, Keyboard, MessageRef, Messenger, MessagingError, MessagingResult, OutboundMessage,
};
use subpay_bot::payments::{
    CreatePaymentRequest, GatewayStatus, PaymentError, PaymentGateway, PaymentHandle,
    PaymentResult, StatusResponse,
};
use subpay_bot::services::exchange_rate::{RateData, RateError, RateProvider, RateResult};
use subpay_bot::services::order::{Account, Order, OrderDetails, PaymentMethod, Plan};
use subpay_bot::services::pricing::{PricingBreakdown, PricingEngine};
use tokio::sync::Notify;

pub const OPERATOR_CHAT: &str = "-100200";
pub const CUSTOMER_ID: i64 = 42;

// ----------------------------------------------------------------------------
// Messenger
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub target: MessageRef,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(ChatId, OutboundMessage)>>,
    edits: Mutex<Vec<Edit>>,
    acks: Mutex<Vec<(String, Option<String>)>>,
    unreachable: Mutex<HashSet<ChatId>>,
    next_id: AtomicI64,
}

impl RecordingMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn block(&self, chat: ChatId) {
        self.unreachable.lock().unwrap().insert(chat);
    }

    pub fn sent(&self) -> Vec<(ChatId, OutboundMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages_to(&self, chat: &ChatId) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| to == chat)
            .map(|(_, message)| message)
            .collect()
    }

    pub fn texts_to(&self, chat: &ChatId) -> Vec<String> {
        self.messages_to(chat).into_iter().map(|m| m.text).collect()
    }

    pub fn last_to(&self, chat: &ChatId) -> Option<OutboundMessage> {
        self.messages_to(chat).pop()
    }

    pub fn edits(&self) -> Vec<Edit> {
        self.edits.lock().unwrap().clone()
    }

    pub fn acks(&self) -> Vec<(String, Option<String>)> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, chat: &ChatId, message: OutboundMessage) -> MessagingResult<MessageRef> {
        if self.unreachable.lock().unwrap().contains(chat) {
            return Err(MessagingError::RecipientUnreachable {
                chat_id: chat.to_string(),
                reason: "Forbidden: bot can't initiate conversation with a user".to_string(),
            });
        }
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push((chat.clone(), message));
        Ok(MessageRef {
            chat_id: chat.clone(),
            message_id,
        })
    }

    async fn edit(
        &self,
        target: &MessageRef,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> MessagingResult<()> {
        self.edits.lock().unwrap().push(Edit {
            target: target.clone(),
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn acknowledge(&self, action_id: &str, notice: Option<&str>) -> MessagingResult<()> {
        self.acks
            .lock()
            .unwrap()
            .push((action_id.to_string(), notice.map(str::to_string)));
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Payment gateway
// ----------------------------------------------------------------------------

/// Replays scripted status answers; `Pending` once the script runs out.
pub struct ScriptedGateway {
    create_error: Option<PaymentError>,
    statuses: Mutex<VecDeque<PaymentResult<GatewayStatus>>>,
    created: Mutex<Vec<CreatePaymentRequest>>,
    status_calls: AtomicU32,
}

impl ScriptedGateway {
    pub fn new(statuses: Vec<PaymentResult<GatewayStatus>>) -> Arc<Self> {
        Arc::new(Self {
            create_error: None,
            statuses: Mutex::new(statuses.into()),
            created: Mutex::new(Vec::new()),
            status_calls: AtomicU32::new(0),
        })
    }

    pub fn failing_create(error: PaymentError) -> Arc<Self> {
        Arc::new(Self {
            create_error: Some(error),
            statuses: Mutex::new(VecDeque::new()),
            created: Mutex::new(Vec::new()),
            status_calls: AtomicU32::new(0),
        })
    }

    pub fn created(&self) -> Vec<CreatePaymentRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_payment(&self, request: CreatePaymentRequest) -> PaymentResult<PaymentHandle> {
        if let Some(error) = &self.create_error {
            return Err(error.clone());
        }
        let mut created = self.created.lock().unwrap();
        created.push(request);
        Ok(PaymentHandle {
            attempt_id: format!("pay-{}", created.len()),
            confirmation_url: format!("https://pay.example/{}", created.len()),
            status: GatewayStatus::Pending,
        })
    }

    async fn payment_status(&self, attempt_id: &str) -> PaymentResult<StatusResponse> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(GatewayStatus::Pending));
        next.map(|status| StatusResponse {
            attempt_id: attempt_id.to_string(),
            status,
            paid: status.is_settled(),
            amount: None,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Holds every `create_payment` call open until `release` is called.
#[derive(Default)]
pub struct HeldGateway {
    release: Notify,
    creates_started: AtomicU32,
}

impl HeldGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn creates_started(&self) -> u32 {
        self.creates_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for HeldGateway {
    async fn create_payment(&self, _request: CreatePaymentRequest) -> PaymentResult<PaymentHandle> {
        self.creates_started.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(PaymentHandle {
            attempt_id: "held-1".to_string(),
            confirmation_url: "https://pay.example/held".to_string(),
            status: GatewayStatus::Pending,
        })
    }

    async fn payment_status(&self, attempt_id: &str) -> PaymentResult<StatusResponse> {
        Ok(StatusResponse {
            attempt_id: attempt_id.to_string(),
            status: GatewayStatus::Pending,
            paid: false,
            amount: None,
        })
    }

    fn name(&self) -> &'static str {
        "held"
    }
}

// ----------------------------------------------------------------------------
// Rate providers
// ----------------------------------------------------------------------------

pub struct StaticRateProvider {
    name: String,
    rate: Decimal,
}

impl StaticRateProvider {
    pub fn new(name: &str, rate: Decimal) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            rate,
        })
    }
}

#[async_trait]
impl RateProvider for StaticRateProvider {
    async fn fetch_rate(&self, from: &str, to: &str) -> RateResult<RateData> {
        Ok(RateData::new(from, to, self.rate, &self.name))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub struct FailingRateProvider {
    name: String,
}

impl FailingRateProvider {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl RateProvider for FailingRateProvider {
    async fn fetch_rate(&self, _from: &str, _to: &str) -> RateResult<RateData> {
        Err(RateError::Provider {
            provider: self.name.clone(),
            message: "connection refused".to_string(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Never answers; only useful under a source timeout.
pub struct HangingRateProvider;

#[async_trait]
impl RateProvider for HangingRateProvider {
    async fn fetch_rate(&self, _from: &str, _to: &str) -> RateResult<RateData> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(RateError::NoProviders)
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

pub fn order(method: PaymentMethod) -> Order {
    Order {
        details: OrderDetails {
            account: Account {
                service: "Netflix".to_string(),
                login: "user@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            source: "https://example.com/creator".to_string(),
            plan: Plan::OneMonth,
            monthly_price: dec!(30),
            notes: String::new(),
        },
        payment_method: method,
    }
}

/// 30 USD for one month at 90: 3740 RUB.
pub fn breakdown() -> PricingBreakdown {
    PricingEngine::default()
        .quote(dec!(30), Plan::OneMonth, dec!(90))
        .unwrap()
}
