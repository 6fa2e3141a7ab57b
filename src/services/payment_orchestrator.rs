//! Payment Orchestrator Service
//!
//! Creates a gateway payment for a confirmed card order, hands the customer
//! the confirmation link and spawns a [`PaymentMonitor`] that polls the
//! attempt to a terminal state. Live attempts are kept in an in-memory
//! [`PaymentRegistry`] and leave it once terminal.

use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};
use crate::messaging::{ActionButton, ChatId, Keyboard, Messenger, OutboundMessage, UserRef};
use crate::payments::{CreatePaymentRequest, Money, PaymentError, PaymentGateway};
use crate::services::exchange_rate::SETTLEMENT_CURRENCY;
use crate::services::notification::OperatorRelay;
use crate::services::order::Order;
use crate::services::pricing::{format_amount, PricingBreakdown};
use crate::workers::payment_monitor::{PaymentMonitor, PaymentMonitorConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Attempt State
// ============================================================================

/// Lifecycle of one payment attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Gateway accepted the payment, link not yet handed out
    Created,
    /// Customer holds the link, monitor is polling
    Pending,
    Succeeded,
    Canceled,
    /// Polling budget exhausted; resolved out-of-band
    TimedOut,
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptStatus::Created => write!(f, "created"),
            AttemptStatus::Pending => write!(f, "pending"),
            AttemptStatus::Succeeded => write!(f, "succeeded"),
            AttemptStatus::Canceled => write!(f, "canceled"),
            AttemptStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl AttemptStatus {
    pub fn valid_transitions(&self) -> Vec<AttemptStatus> {
        match self {
            AttemptStatus::Created => vec![AttemptStatus::Pending],
            AttemptStatus::Pending => vec![
                AttemptStatus::Succeeded,
                AttemptStatus::Canceled,
                AttemptStatus::TimedOut,
            ],
            // Terminal states - no valid transitions
            AttemptStatus::Succeeded | AttemptStatus::Canceled | AttemptStatus::TimedOut => {
                vec![]
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Succeeded | AttemptStatus::Canceled | AttemptStatus::TimedOut
        )
    }

    pub fn can_transition_to(&self, target: AttemptStatus) -> bool {
        self.valid_transitions().contains(&target)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("order is not valid for checkout: {0}")]
    InvalidOrder(#[from] ValidationError),

    #[error("payment method '{method}' does not go through the gateway")]
    NotGatewayMethod { method: String },

    #[error("invalid state transition from {current} to {target}")]
    InvalidStateTransition {
        current: AttemptStatus,
        target: AttemptStatus,
    },

    #[error(transparent)]
    Gateway(#[from] PaymentError),
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::InvalidOrder(e) => AppError::from(e),
            OrchestratorError::Gateway(e) => AppError::from(e),
            other => AppError::new(AppErrorKind::External(ExternalError::PaymentGateway {
                provider: "orchestrator".to_string(),
                message: other.to_string(),
                is_retryable: false,
            })),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

// ============================================================================
// Attempt Registry
// ============================================================================

#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    pub attempt_id: String,
    pub confirmation_url: String,
    pub customer: UserRef,
    pub customer_chat: ChatId,
    pub order: Order,
    pub breakdown: PricingBreakdown,
    pub status: AttemptStatus,
    pub poll_count: u32,
    pub created_at: DateTime<Utc>,
}

impl PaymentAttempt {
    pub fn transition(&mut self, target: AttemptStatus) -> OrchestratorResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(OrchestratorError::InvalidStateTransition {
                current: self.status,
                target,
            });
        }
        self.status = target;
        Ok(())
    }
}

/// Live attempts keyed by gateway attempt id.
#[derive(Debug, Default)]
pub struct PaymentRegistry {
    attempts: RwLock<HashMap<String, PaymentAttempt>>,
}

impl PaymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, attempt: PaymentAttempt) {
        self.attempts
            .write()
            .await
            .insert(attempt.attempt_id.clone(), attempt);
    }

    pub async fn get(&self, attempt_id: &str) -> Option<PaymentAttempt> {
        self.attempts.read().await.get(attempt_id).cloned()
    }

    pub async fn contains(&self, attempt_id: &str) -> bool {
        self.attempts.read().await.contains_key(attempt_id)
    }

    /// Count one more status query; returns the new count.
    pub async fn record_poll(&self, attempt_id: &str) -> Option<u32> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts.get_mut(attempt_id)?;
        attempt.poll_count += 1;
        Some(attempt.poll_count)
    }

    pub async fn remove(&self, attempt_id: &str) -> Option<PaymentAttempt> {
        self.attempts.write().await.remove(attempt_id)
    }

    pub async fn len(&self) -> usize {
        self.attempts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.attempts.read().await.is_empty()
    }
}

// ============================================================================
// Customer Notices
// ============================================================================

pub mod notices {
    use super::*;

    pub fn payment_link(total: &str) -> String {
        format!(
            "💳 Your order is ready. Amount to pay: <b>{} ₽</b>\n\
             Tap the button below to pay. We will confirm here as soon as the payment arrives.",
            total
        )
    }

    pub fn pay_button(total: &str, url: &str) -> Keyboard {
        Keyboard::new().row(vec![ActionButton::link(format!("Pay {} ₽", total), url)])
    }

    pub fn payment_succeeded() -> String {
        "✅ Payment received! Your subscription will be activated within 15–60 minutes."
            .to_string()
    }

    pub fn payment_canceled() -> String {
        "❌ The payment was canceled. Start over with /start whenever you are ready.".to_string()
    }

    pub fn payment_timed_out() -> String {
        "⏳ We have not seen the payment yet. If you have paid, no action is needed: \
         the operator will confirm it shortly."
            .to_string()
    }
}

// ============================================================================
// Main Payment Orchestrator
// ============================================================================

/// A checkout that reached the gateway.
#[derive(Debug)]
pub struct CheckoutStarted {
    pub attempt_id: String,
    pub confirmation_url: String,
    /// Resolves to the terminal status, or `None` on shutdown.
    pub monitor: JoinHandle<Option<AttemptStatus>>,
}

pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    messenger: Arc<dyn Messenger>,
    relay: Arc<OperatorRelay>,
    registry: Arc<PaymentRegistry>,
    monitor_config: PaymentMonitorConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        messenger: Arc<dyn Messenger>,
        relay: Arc<OperatorRelay>,
        registry: Arc<PaymentRegistry>,
        monitor_config: PaymentMonitorConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            gateway,
            messenger,
            relay,
            registry,
            monitor_config,
            shutdown_rx,
        }
    }

    pub fn registry(&self) -> &Arc<PaymentRegistry> {
        &self.registry
    }

    /// Create the gateway payment, send the link and start monitoring.
    ///
    /// A creation failure is reported to the customer and leaves no attempt
    /// behind. It is never retried here.
    pub async fn start_checkout(
        &self,
        customer: &UserRef,
        order: Order,
        breakdown: PricingBreakdown,
    ) -> OrchestratorResult<CheckoutStarted> {
        order.validate()?;
        if !order.payment_method.is_gateway() {
            return Err(OrchestratorError::NotGatewayMethod {
                method: order.payment_method.code().to_string(),
            });
        }

        let customer_chat = ChatId::from(customer.id);
        let request = build_payment_request(customer, &order, &breakdown);
        let reference = request.reference;

        let handle = match self.gateway.create_payment(request).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    user_id = customer.id,
                    reference = %reference,
                    provider = self.gateway.name(),
                    error = %e,
                    "payment creation failed"
                );
                let text = AppError::from(e.clone()).user_message();
                if let Err(send_err) = self
                    .messenger
                    .send(&customer_chat, OutboundMessage::text(text))
                    .await
                {
                    warn!(user_id = customer.id, error = %send_err, "failed to report payment error");
                }
                return Err(OrchestratorError::Gateway(e));
            }
        };

        let mut attempt = PaymentAttempt {
            attempt_id: handle.attempt_id.clone(),
            confirmation_url: handle.confirmation_url.clone(),
            customer: customer.clone(),
            customer_chat: customer_chat.clone(),
            order,
            breakdown,
            status: AttemptStatus::Created,
            poll_count: 0,
            created_at: Utc::now(),
        };
        attempt.transition(AttemptStatus::Pending)?;
        let total = format_amount(attempt.breakdown.final_total);
        self.registry.insert(attempt).await;

        info!(
            user_id = customer.id,
            attempt_id = %handle.attempt_id,
            reference = %reference,
            gateway_status = %handle.status,
            total = %total,
            "payment attempt created"
        );

        let link = OutboundMessage::text(notices::payment_link(&total))
            .with_keyboard(notices::pay_button(&total, &handle.confirmation_url));
        if let Err(e) = self.messenger.send(&customer_chat, link).await {
            // The monitor still runs so a payment made some other way is seen.
            warn!(attempt_id = %handle.attempt_id, error = %e, "failed to send payment link");
        }

        let monitor = PaymentMonitor::new(
            handle.attempt_id.clone(),
            self.gateway.clone(),
            self.messenger.clone(),
            self.relay.clone(),
            self.registry.clone(),
            self.monitor_config.clone(),
        );
        let task = tokio::spawn(monitor.run(self.shutdown_rx.clone()));

        Ok(CheckoutStarted {
            attempt_id: handle.attempt_id,
            confirmation_url: handle.confirmation_url,
            monitor: task,
        })
    }
}

/// Gateway request for an order. Credentials never leave the bot.
fn build_payment_request(
    customer: &UserRef,
    order: &Order,
    breakdown: &PricingBreakdown,
) -> CreatePaymentRequest {
    let details = &order.details;
    let reference = Uuid::new_v4();
    CreatePaymentRequest {
        reference,
        amount: Money::new(breakdown.final_total, SETTLEMENT_CURRENCY),
        description: format!(
            "Subscription {} ({} mo.)",
            details.account.service,
            details.plan.months()
        ),
        metadata: json!({
            "reference": reference.to_string(),
            "user_id": customer.id,
            "service": details.account.service,
            "plan": details.plan.code(),
        }),
    }
}
