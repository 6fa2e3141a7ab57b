use thiserror::Error;

pub type MessagingResult<T> = Result<T, MessagingError>;

#[derive(Debug, Clone, Error)]
pub enum MessagingError {
    /// The user never opened a chat with the bot, or blocked it.
    #[error("Recipient {chat_id} is unreachable: {reason}")]
    RecipientUnreachable { chat_id: String, reason: String },

    /// Edit produced identical content; the message is already in that state.
    #[error("Message is not modified")]
    NotModified,

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Messaging API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Invalid messaging API response: {message}")]
    InvalidResponse { message: String },
}

impl MessagingError {
    pub fn is_recipient_unreachable(&self) -> bool {
        matches!(self, MessagingError::RecipientUnreachable { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            MessagingError::Network { .. } => true,
            MessagingError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}
