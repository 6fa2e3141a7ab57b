//! Chat transport: the `Messenger`/`UpdateSource` seams and the Telegram client.

pub mod error;
pub mod messenger;
pub mod telegram;
pub mod types;

pub use error::{MessagingError, MessagingResult};
pub use messenger::{IncomingUpdate, Messenger, UpdateSource};
pub use types::{
    escape_html, ActionButton, ButtonAction, ChatId, InboundEvent, InboundKind, Keyboard,
    MessageRef, OutboundMessage, UserRef,
};
