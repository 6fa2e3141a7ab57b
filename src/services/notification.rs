//! Operator notification relay
//!
//! Sends order summaries to the operator chat and carries the operator's
//! decision ("activated" / "problem") back to the customer. Reaching the
//! customer and updating the operator's message are independent: a customer
//! who cannot be reached only produces a warning on the operator side.

use crate::error::AppError;
use crate::messaging::{
    escape_html, ActionButton, ChatId, Keyboard, MessageRef, Messenger, MessagingError,
    MessagingResult, OutboundMessage, UserRef,
};
use crate::services::order::Order;
use crate::services::pricing::{format_amount, PricingBreakdown};
use rust_decimal::Decimal;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorDecision {
    Activated,
    Problem,
}

impl OperatorDecision {
    fn prefix(&self) -> &'static str {
        match self {
            OperatorDecision::Activated => "subscribed",
            OperatorDecision::Problem => "issue",
        }
    }

    fn status_line(&self) -> &'static str {
        match self {
            OperatorDecision::Activated => "✅ Marked as activated",
            OperatorDecision::Problem => "⚠️ Marked as a problem",
        }
    }
}

/// Decision payload carried by the operator's buttons:
/// `<subscribed|issue>:<user id>:<settled total>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorAction {
    pub decision: OperatorDecision,
    pub user_id: i64,
    pub settled_total: Decimal,
}

impl OperatorAction {
    pub fn new(decision: OperatorDecision, user_id: i64, settled_total: Decimal) -> Self {
        Self {
            decision,
            user_id,
            settled_total,
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}",
            self.decision.prefix(),
            self.user_id,
            format_amount(self.settled_total)
        )
    }

    /// `None` when the payload is not an operator action.
    pub fn parse(payload: &str) -> Option<Self> {
        let mut parts = payload.splitn(3, ':');
        let decision = match parts.next()? {
            "subscribed" => OperatorDecision::Activated,
            "issue" => OperatorDecision::Problem,
            _ => return None,
        };
        let user_id = parts.next()?.parse().ok()?;
        let settled_total = Decimal::from_str(parts.next()?).ok()?;
        Some(Self {
            decision,
            user_id,
            settled_total,
        })
    }
}

impl fmt::Display for OperatorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// What happened when an operator decision was relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    /// The operator side was updated but the customer was not reached.
    CustomerUnreachable { warning: String },
    /// The notification was already handled earlier.
    AlreadyHandled,
}

/// Fixed-layout order summary for the operator chat. All user content is escaped.
pub fn format_order_summary(
    title: &str,
    customer: &UserRef,
    order: &Order,
    breakdown: &PricingBreakdown,
    attempt_id: Option<&str>,
) -> String {
    let d = &order.details;
    let mut lines = vec![
        format!("🧾 <b>{}</b>", escape_html(title)),
        format!(
            "Customer: {} (id <code>{}</code>)",
            escape_html(&customer.display_name()),
            customer.id
        ),
        format!("Service: {}", escape_html(&d.account.service)),
        format!("Login: <code>{}</code>", escape_html(&d.account.login)),
        format!("Password: <code>{}</code>", escape_html(&d.account.password)),
        format!("Source: {}", escape_html(&d.source)),
        format!("Plan: {}", d.plan.label()),
        format!(
            "Price: ${} × {} = ${}",
            format_amount(d.monthly_price),
            breakdown.months,
            format_amount(breakdown.total_foreign)
        ),
        format!("Rate: {}", format_amount(breakdown.rate)),
        format!("Base: {} ₽", format_amount(breakdown.base_settlement)),
        format!("Fee: {} ₽", format_amount(breakdown.fee_amount)),
        format!("Total: <b>{} ₽</b>", format_amount(breakdown.final_total)),
        format!("Payment: {}", order.payment_method.label()),
    ];
    if let Some(id) = attempt_id {
        lines.push(format!("Payment id: <code>{}</code>", escape_html(id)));
    }
    lines.push(format!(
        "Notes: {}",
        if d.notes.is_empty() {
            "—".to_string()
        } else {
            escape_html(&d.notes)
        }
    ));
    lines.join("\n")
}

/// Operator messages remembered as already answered.
pub const HANDLED_CAPACITY: usize = 1024;

/// Bounded set of handled operator messages; the oldest entry is evicted
/// first.
#[derive(Debug, Default)]
struct HandledMessages {
    seen: HashSet<(ChatId, i64)>,
    order: VecDeque<(ChatId, i64)>,
}

impl HandledMessages {
    /// `false` when the key was already present.
    fn insert(&mut self, key: (ChatId, i64)) -> bool {
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > HANDLED_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

pub struct OperatorRelay {
    messenger: Arc<dyn Messenger>,
    operator_chat: ChatId,
    support_contact: String,
    handled: Mutex<HandledMessages>,
}

impl OperatorRelay {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        operator_chat: ChatId,
        support_contact: impl Into<String>,
    ) -> Self {
        Self {
            messenger,
            operator_chat,
            support_contact: support_contact.into(),
            handled: Mutex::new(HandledMessages::default()),
        }
    }

    pub fn operator_chat(&self) -> &ChatId {
        &self.operator_chat
    }

    /// Whether an inbound event from `chat` may carry operator decisions.
    /// Only a numeric operator chat can be matched; a `@channel` operator
    /// chat accepts no decisions at all.
    pub fn is_operator_chat(&self, chat: &ChatId) -> bool {
        match self.operator_chat.numeric() {
            Some(id) => chat.numeric() == Some(id),
            None => false,
        }
    }

    /// Whether decision controls can be attached to operator messages.
    pub fn accepts_decisions(&self) -> bool {
        self.operator_chat.numeric().is_some()
    }

    /// Paid order: summary plus "activated" / "problem" controls.
    pub async fn notify_settlement(
        &self,
        customer: &UserRef,
        order: &Order,
        breakdown: &PricingBreakdown,
        attempt_id: &str,
    ) -> MessagingResult<MessageRef> {
        let text = format_order_summary(
            "Payment received",
            customer,
            order,
            breakdown,
            Some(attempt_id),
        );
        let activated = OperatorAction::new(
            OperatorDecision::Activated,
            customer.id,
            breakdown.final_total,
        );
        let problem = OperatorAction::new(
            OperatorDecision::Problem,
            customer.id,
            breakdown.final_total,
        );
        let mut message = OutboundMessage::text(text);
        if self.accepts_decisions() {
            message = message.with_keyboard(Keyboard::new().row(vec![
                ActionButton::payload("✅ Activated", activated.encode()),
                ActionButton::payload("⚠️ Problem", problem.encode()),
            ]));
        }

        let sent = self.messenger.send(&self.operator_chat, message).await?;
        info!(
            user_id = customer.id,
            attempt_id = attempt_id,
            total = %breakdown.final_total,
            "operator notified of settled payment"
        );
        Ok(sent)
    }

    /// Order settled outside the gateway; no controls.
    pub async fn notify_new_order(
        &self,
        customer: &UserRef,
        order: &Order,
        breakdown: &PricingBreakdown,
    ) -> MessagingResult<MessageRef> {
        let text = format_order_summary("New order", customer, order, breakdown, None);
        let sent = self
            .messenger
            .send(&self.operator_chat, OutboundMessage::text(text))
            .await?;
        info!(
            user_id = customer.id,
            method = order.payment_method.code(),
            "operator notified of new order"
        );
        Ok(sent)
    }

    /// Deliver the operator's decision to the customer, then mark the
    /// operator's message as handled.
    pub async fn relay_action(
        &self,
        action: &OperatorAction,
        notification: Option<&MessageRef>,
        original_text: Option<&str>,
        operator: &UserRef,
    ) -> RelayOutcome {
        if let Some(target) = notification {
            let key = (target.chat_id.clone(), target.message_id);
            if !self.handled.lock().await.insert(key) {
                debug!(message_id = target.message_id, "operator action already relayed");
                return RelayOutcome::AlreadyHandled;
            }
        }

        let delivery = self
            .messenger
            .send(
                &ChatId::from(action.user_id),
                OutboundMessage::text(self.customer_message(action.decision)),
            )
            .await;

        let warning = match delivery {
            Ok(_) => {
                info!(
                    user_id = action.user_id,
                    decision = action.decision.prefix(),
                    "operator decision relayed to customer"
                );
                None
            }
            Err(e) => {
                warn!(user_id = action.user_id, error = %e, "could not relay operator decision");
                Some(format!(
                    "Customer {} was not notified: {}",
                    action.user_id,
                    AppError::from(e).user_message()
                ))
            }
        };

        let status = format!(
            "{} by {}",
            action.decision.status_line(),
            escape_html(&operator.display_name())
        );
        match notification {
            Some(target) => {
                let mut text = original_text.map(escape_html).unwrap_or_default();
                text.push_str("\n\n");
                text.push_str(&status);
                if let Some(warning) = &warning {
                    text.push_str(&format!("\n⚠️ {}", escape_html(warning)));
                }
                match self.messenger.edit(target, &text, None).await {
                    Ok(()) => {}
                    Err(MessagingError::NotModified) => {
                        debug!(message_id = target.message_id, "operator message already edited")
                    }
                    Err(e) => {
                        warn!(message_id = target.message_id, error = %e, "failed to update operator message")
                    }
                }
            }
            None => {
                if let Some(warning) = &warning {
                    let text = format!("{}\n⚠️ {}", status, escape_html(warning));
                    if let Err(e) = self
                        .messenger
                        .send(&self.operator_chat, OutboundMessage::text(text))
                        .await
                    {
                        warn!(error = %e, "failed to warn operator");
                    }
                }
            }
        }

        match warning {
            Some(warning) => RelayOutcome::CustomerUnreachable { warning },
            None => RelayOutcome::Delivered,
        }
    }

    fn customer_message(&self, decision: OperatorDecision) -> String {
        match decision {
            OperatorDecision::Activated => {
                "🎉 Your subscription has been activated. Thank you for your order!".to_string()
            }
            OperatorDecision::Problem => format!(
                "There was a problem activating your subscription. Please contact {}.",
                escape_html(&self.support_contact)
            ),
        }
    }
}
