//! Telegram Bot API client
//!
//! Implements `Messenger` and `UpdateSource` over plain HTTPS calls to
//! `https://api.telegram.org/bot<token>/<method>`. Long polling only; no
//! webhook mode.

use crate::config::TelegramConfig;
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::messenger::{IncomingUpdate, Messenger, UpdateSource};
use crate::messaging::types::{
    parse_command, ButtonAction, ChatId, InboundEvent, InboundKind, Keyboard, MessageRef,
    OutboundMessage, UserRef,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

pub struct TelegramClient {
    client: Client,
    api_base: String,
    long_poll_timeout_secs: u64,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> MessagingResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| MessagingError::Network {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_base: format!(
                "{}/bot{}",
                config.api_base_url.trim_end_matches('/'),
                config.bot_token
            ),
            long_poll_timeout_secs: config.long_poll_timeout_secs,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &JsonValue,
        chat_hint: Option<&ChatId>,
    ) -> MessagingResult<T> {
        let url = format!("{}/{}", self.api_base, method);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MessagingError::Network {
                // reqwest errors embed the URL, which carries the token.
                message: format!("{} request failed: {}", method, e.without_url()),
            })?;

        let envelope: TelegramEnvelope<T> =
            response
                .json()
                .await
                .map_err(|e| MessagingError::InvalidResponse {
                    message: format!("{}: {}", method, e.without_url()),
                })?;

        if envelope.ok {
            return envelope.result.ok_or_else(|| MessagingError::InvalidResponse {
                message: format!("{} returned ok without a result", method),
            });
        }

        let code = envelope.error_code.unwrap_or_default();
        let description = envelope.description.unwrap_or_default();
        debug!(method = method, code = code, description = %description, "telegram call failed");
        Err(classify_error(code, description, chat_hint))
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send(&self, chat: &ChatId, message: OutboundMessage) -> MessagingResult<MessageRef> {
        let (method, mut body) = match &message.photo_url {
            Some(photo) => (
                "sendPhoto",
                serde_json::json!({
                    "chat_id": chat_id_value(chat),
                    "photo": photo,
                    "caption": message.text,
                    "parse_mode": "HTML",
                }),
            ),
            None => (
                "sendMessage",
                serde_json::json!({
                    "chat_id": chat_id_value(chat),
                    "text": message.text,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }),
            ),
        };
        if let Some(keyboard) = &message.keyboard {
            body["reply_markup"] = reply_markup(keyboard);
        }

        let sent: TgMessage = self.call(method, &body, Some(chat)).await?;
        Ok(MessageRef {
            chat_id: ChatId::from(sent.chat.id),
            message_id: sent.message_id,
        })
    }

    async fn edit(
        &self,
        target: &MessageRef,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> MessagingResult<()> {
        let mut body = serde_json::json!({
            "chat_id": chat_id_value(&target.chat_id),
            "message_id": target.message_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(keyboard) = &keyboard {
            body["reply_markup"] = reply_markup(keyboard);
        }
        // editMessageText answers with the message or `true`.
        let _: JsonValue = self
            .call("editMessageText", &body, Some(&target.chat_id))
            .await?;
        Ok(())
    }

    async fn acknowledge(&self, action_id: &str, notice: Option<&str>) -> MessagingResult<()> {
        let mut body = serde_json::json!({ "callback_query_id": action_id });
        if let Some(text) = notice {
            body["text"] = JsonValue::String(text.to_string());
        }
        let _: bool = self.call("answerCallbackQuery", &body, None).await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn poll_updates(&self, offset: Option<i64>) -> MessagingResult<Vec<IncomingUpdate>> {
        let mut body = serde_json::json!({
            "timeout": self.long_poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = JsonValue::from(offset);
        }

        let updates: Vec<TgUpdate> = self.call("getUpdates", &body, None).await?;
        Ok(updates
            .into_iter()
            .map(|update| IncomingUpdate {
                update_id: update.update_id,
                event: into_event(update),
            })
            .collect())
    }
}

fn chat_id_value(chat: &ChatId) -> JsonValue {
    match chat.numeric() {
        Some(id) => JsonValue::from(id),
        None => JsonValue::String(chat.0.clone()),
    }
}

fn reply_markup(keyboard: &Keyboard) -> JsonValue {
    let rows: Vec<Vec<JsonValue>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| match &button.action {
                    ButtonAction::Payload(payload) => {
                        serde_json::json!({ "text": button.label, "callback_data": payload })
                    }
                    ButtonAction::Url(url) => {
                        serde_json::json!({ "text": button.label, "url": url })
                    }
                })
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

fn classify_error(code: i64, description: String, chat: Option<&ChatId>) -> MessagingError {
    let lowered = description.to_lowercase();
    if lowered.contains("message is not modified") {
        return MessagingError::NotModified;
    }
    if code == 403 || lowered.contains("chat not found") || lowered.contains("user is deactivated")
    {
        return MessagingError::RecipientUnreachable {
            chat_id: chat.map(|c| c.to_string()).unwrap_or_default(),
            reason: description,
        };
    }
    if code == 429 {
        warn!(description = %description, "telegram rate limit hit");
    }
    MessagingError::Api { code, description }
}

/// Translate a raw update into the bot's event model.
fn into_event(update: TgUpdate) -> Option<InboundEvent> {
    if let Some(query) = update.callback_query {
        let message = query.message.as_ref().map(|m| MessageRef {
            chat_id: ChatId::from(m.chat.id),
            message_id: m.message_id,
        });
        let message_text = query
            .message
            .as_ref()
            .and_then(|m| m.text.clone().or_else(|| m.caption.clone()));
        let chat_id = query
            .message
            .as_ref()
            .map(|m| ChatId::from(m.chat.id))
            .unwrap_or_else(|| ChatId::from(query.from.id));
        return Some(InboundEvent {
            user: query.from.into(),
            chat_id,
            kind: InboundKind::Action {
                action_id: query.id,
                payload: query.data.unwrap_or_default(),
                message,
                message_text,
            },
        });
    }

    let message = update.message?;
    let user: UserRef = message.from?.into();
    let text = message.text?;
    let kind = match parse_command(&text) {
        Some((name, args)) => InboundKind::Command { name, args },
        None => InboundKind::Text(text),
    };
    Some(InboundEvent {
        user,
        chat_id: ChatId::from(message.chat.id),
        kind,
    })
}

#[derive(Debug, Deserialize)]
struct TelegramEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    from: Option<TgUser>,
    chat: TgChat,
    text: Option<String>,
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
}

impl From<TgUser> for UserRef {
    fn from(user: TgUser) -> Self {
        UserRef {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    message: Option<TgMessage>,
    data: Option<String>,
}
