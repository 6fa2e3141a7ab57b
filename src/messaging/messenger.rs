use crate::messaging::error::MessagingResult;
use crate::messaging::types::{ChatId, InboundEvent, Keyboard, MessageRef, OutboundMessage};
use async_trait::async_trait;

/// Outbound side of the chat transport.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, chat: &ChatId, message: OutboundMessage) -> MessagingResult<MessageRef>;

    /// Replace the text of a delivered message. `None` removes its buttons.
    async fn edit(
        &self,
        target: &MessageRef,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> MessagingResult<()>;

    /// Confirm receipt of a button press, optionally with a short notice.
    async fn acknowledge(&self, action_id: &str, notice: Option<&str>) -> MessagingResult<()>;
}

/// One transport update. `event` is `None` for updates the bot ignores.
#[derive(Debug, Clone)]
pub struct IncomingUpdate {
    pub update_id: i64,
    pub event: Option<InboundEvent>,
}

/// Inbound side of the chat transport.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Wait for updates with id >= `offset`.
    async fn poll_updates(&self, offset: Option<i64>) -> MessagingResult<Vec<IncomingUpdate>>;
}
