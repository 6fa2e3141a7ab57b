//! Inbound event handling
//!
//! The [`Dispatcher`] routes every inbound chat event: commands, free text
//! answers and button presses. It owns no state of its own beyond the shared
//! services; form progress lives in the [`SessionStore`]. No error escapes
//! `dispatch`; each failure is logged and, where it matters, turned into a
//! customer message.

pub mod operator;
pub mod order_flow;

use crate::error::AppError;
use crate::messaging::{ChatId, InboundEvent, InboundKind, Messenger, OutboundMessage, UserRef};
use crate::services::exchange_rate::RateFetcher;
use crate::services::notification::{OperatorAction, OperatorRelay};
use crate::services::order::Order;
use crate::services::order_form::{FormInput, FormRules, FormState, Transition};
use crate::services::payment_orchestrator::{OrchestratorError, PaymentOrchestrator};
use crate::services::pricing::{PricingBreakdown, PricingEngine};
use crate::services::session_store::SessionStore;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct Dispatcher {
    messenger: Arc<dyn Messenger>,
    sessions: Arc<SessionStore>,
    rules: FormRules,
    rates: Arc<RateFetcher>,
    pricing: PricingEngine,
    relay: Arc<OperatorRelay>,
    orchestrator: Arc<PaymentOrchestrator>,
    support_contact: String,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        messenger: Arc<dyn Messenger>,
        sessions: Arc<SessionStore>,
        rules: FormRules,
        rates: Arc<RateFetcher>,
        pricing: PricingEngine,
        relay: Arc<OperatorRelay>,
        orchestrator: Arc<PaymentOrchestrator>,
        support_contact: impl Into<String>,
    ) -> Self {
        Self {
            messenger,
            sessions,
            rules,
            rates,
            pricing,
            relay,
            orchestrator,
            support_contact: support_contact.into(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub async fn dispatch(&self, event: InboundEvent) {
        let InboundEvent {
            user,
            chat_id,
            kind,
        } = event;

        match kind {
            InboundKind::Command { name, .. } => match name.as_str() {
                "start" | "restart" => self.start_form(&user, &chat_id, true).await,
                "cancel" => self.cancel_form(&user, &chat_id).await,
                "help" => self.reply(&chat_id, order_flow::help(&self.support_contact)).await,
                other => {
                    debug!(user_id = user.id, command = other, "unknown command");
                    self.reply(&chat_id, order_flow::help(&self.support_contact))
                        .await
                }
            },
            InboundKind::Text(text) => {
                self.handle_input(&user, &chat_id, FormInput::Text(text))
                    .await
            }
            InboundKind::Action {
                action_id,
                payload,
                message,
                message_text,
            } => {
                if let Some(action) = OperatorAction::parse(&payload) {
                    self.handle_operator_action(
                        &user,
                        &chat_id,
                        &action_id,
                        &action,
                        message.as_ref(),
                        message_text.as_deref(),
                    )
                    .await;
                    return;
                }

                self.acknowledge(&action_id, None).await;
                self.handle_input(&user, &chat_id, FormInput::Choice(payload))
                    .await
            }
        }
    }

    // ------------------------------------------------------------------------
    // Form flow
    // ------------------------------------------------------------------------

    async fn start_form(&self, user: &UserRef, chat_id: &ChatId, greet: bool) {
        let session = self.sessions.start(user.id).await;
        info!(user_id = user.id, session_id = %session.id, "order form started");
        if greet {
            self.reply(chat_id, order_flow::welcome()).await;
        }
        self.send(chat_id, order_flow::prompt(&session.state)).await;
    }

    async fn cancel_form(&self, user: &UserRef, chat_id: &ChatId) {
        match self.sessions.remove(user.id).await {
            Some(session) => {
                info!(user_id = user.id, session_id = %session.id, step = %session.state.step(), "order form cancelled");
                self.reply(chat_id, order_flow::cancelled()).await;
            }
            None => self.reply(chat_id, order_flow::no_active_order()).await,
        }
    }

    async fn handle_input(&self, user: &UserRef, chat_id: &ChatId, input: FormInput) {
        let Some(session) = self.sessions.get(user.id).await else {
            self.reply(chat_id, order_flow::no_active_order()).await;
            return;
        };

        match session.state.advance(input, &self.rules) {
            Transition::Advance(state) => {
                debug!(user_id = user.id, step = %state.step(), "form advanced");
                if self.sessions.replace(user.id, session.id, state.clone()).await {
                    self.send(chat_id, order_flow::prompt(&state)).await;
                }
            }
            Transition::Retry { state, error } => {
                if let Some(error) = error {
                    debug!(user_id = user.id, step = %state.step(), error = %error, "form input rejected");
                    self.reply(chat_id, AppError::from(error).user_message())
                        .await;
                }
                self.send(chat_id, order_flow::prompt(&state)).await;
            }
            Transition::Quote(details) => {
                let rate = match self.rates.fetch_rate().await {
                    Ok(rate) => rate,
                    Err(e) => {
                        warn!(user_id = user.id, error = %e, "no exchange rate, aborting form");
                        self.abort_form(user, chat_id, session.id, AppError::from(e))
                            .await;
                        return;
                    }
                };
                let breakdown =
                    match self
                        .pricing
                        .quote(details.monthly_price, details.plan, rate.rate)
                    {
                        Ok(breakdown) => breakdown,
                        Err(e) => {
                            error!(user_id = user.id, error = %e, "pricing failed, aborting form");
                            self.abort_form(user, chat_id, session.id, AppError::from(e))
                                .await;
                            return;
                        }
                    };

                info!(
                    user_id = user.id,
                    plan = details.plan.code(),
                    rate = %rate.rate,
                    rate_source = %rate.source,
                    total = %breakdown.final_total,
                    "order priced"
                );
                let state = FormState::confirm(details, breakdown);
                if self.sessions.replace(user.id, session.id, state.clone()).await {
                    self.send(chat_id, order_flow::prompt(&state)).await;
                } else {
                    debug!(user_id = user.id, "session changed during rate lookup, quote dropped");
                }
            }
            Transition::Restart => self.start_form(user, chat_id, false).await,
            Transition::Cancelled => {
                self.sessions.remove_if(user.id, session.id).await;
                info!(user_id = user.id, session_id = %session.id, "order form cancelled");
                self.reply(chat_id, order_flow::cancelled()).await;
            }
            Transition::Submitted { order, breakdown } => {
                if !self.sessions.remove_if(user.id, session.id).await {
                    debug!(user_id = user.id, "session changed before submit, ignoring");
                    return;
                }
                self.submit(user, chat_id, order, breakdown).await;
            }
        }
    }

    async fn abort_form(&self, user: &UserRef, chat_id: &ChatId, session_id: Uuid, err: AppError) {
        if self.sessions.remove_if(user.id, session_id).await {
            self.reply(chat_id, err.user_message()).await;
        }
    }

    async fn submit(
        &self,
        user: &UserRef,
        chat_id: &ChatId,
        order: Order,
        breakdown: PricingBreakdown,
    ) {
        info!(
            user_id = user.id,
            method = order.payment_method.code(),
            total = %breakdown.final_total,
            "order submitted"
        );

        if order.payment_method.is_gateway() {
            match self.orchestrator.start_checkout(user, order, breakdown).await {
                Ok(started) => {
                    debug!(user_id = user.id, attempt_id = %started.attempt_id, "checkout started");
                }
                // Already reported to the customer by the orchestrator.
                Err(OrchestratorError::Gateway(_)) => {}
                Err(e) => {
                    error!(user_id = user.id, error = %e, "checkout rejected");
                    self.reply(chat_id, AppError::from(e).user_message()).await;
                }
            }
            return;
        }

        if let Err(e) = self.relay.notify_new_order(user, &order, &breakdown).await {
            error!(user_id = user.id, error = %e, "failed to notify operator of new order");
        }
        self.reply(chat_id, order_flow::offline_submitted(order.payment_method))
            .await;
    }

    // ------------------------------------------------------------------------
    // Transport helpers
    // ------------------------------------------------------------------------

    async fn reply(&self, chat_id: &ChatId, text: String) {
        self.send(chat_id, OutboundMessage::text(text)).await;
    }

    async fn send(&self, chat_id: &ChatId, message: OutboundMessage) {
        if let Err(e) = self.messenger.send(chat_id, message).await {
            warn!(chat_id = %chat_id, error = %e, "failed to send message");
        }
    }

    async fn acknowledge(&self, action_id: &str, notice: Option<&str>) {
        if let Err(e) = self.messenger.acknowledge(action_id, notice).await {
            debug!(action_id = action_id, error = %e, "failed to acknowledge action");
        }
    }
}
