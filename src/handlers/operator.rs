//! Operator decisions arriving as button presses in the operator chat.

use super::Dispatcher;
use crate::messaging::{ChatId, MessageRef, UserRef};
use crate::services::notification::{OperatorAction, RelayOutcome};
use tracing::{info, warn};

impl Dispatcher {
    pub(super) async fn handle_operator_action(
        &self,
        operator: &UserRef,
        chat_id: &ChatId,
        action_id: &str,
        action: &OperatorAction,
        message: Option<&MessageRef>,
        message_text: Option<&str>,
    ) {
        if !self.relay.is_operator_chat(chat_id) {
            warn!(
                user_id = operator.id,
                chat_id = %chat_id,
                action = %action,
                "operator action from outside the operator chat"
            );
            self.acknowledge(action_id, Some("Not allowed")).await;
            return;
        }

        let outcome = self
            .relay
            .relay_action(action, message, message_text, operator)
            .await;
        info!(
            operator_id = operator.id,
            customer_id = action.user_id,
            action = %action,
            outcome = ?outcome,
            "operator action handled"
        );

        let notice = match outcome {
            RelayOutcome::Delivered => "Customer notified",
            RelayOutcome::CustomerUnreachable { .. } => "Customer could not be reached",
            RelayOutcome::AlreadyHandled => "Already handled",
        };
        self.acknowledge(action_id, Some(notice)).await;
    }
}
