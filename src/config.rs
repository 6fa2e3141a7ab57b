//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;

use crate::payments::providers::yookassa::YooKassaConfig;
use crate::services::pricing::PricingConfig;
use crate::services::rate_providers::RateSourceConfig;
use crate::workers::payment_monitor::PaymentMonitorConfig;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub logging: LoggingConfig,
    pub form: FormConfig,
    pub yookassa: YooKassaConfig,
    pub rates: RateSourceConfig,
    pub pricing: PricingConfig,
    pub payment_monitor: PaymentMonitorConfig,
}

/// Chat transport configuration
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Numeric chat id or `@channel` username.
    pub operator_chat_id: String,
    pub api_base_url: String,
    pub long_poll_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Order form behaviour
#[derive(Debug, Clone)]
pub struct FormConfig {
    /// Lower-cased answers that mean "no notes".
    pub none_tokens: Vec<String>,
    pub support_contact: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            telegram: TelegramConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            form: FormConfig::from_env()?,
            yookassa: YooKassaConfig::from_env()?,
            rates: RateSourceConfig::from_env()?,
            pricing: PricingConfig::from_env()?,
            payment_monitor: PaymentMonitorConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.telegram.validate()?;
        self.logging.validate()?;
        self.form.validate()?;
        self.yookassa.validate()?;
        self.rates.validate()?;
        self.pricing.validate()?;
        self.payment_monitor.validate()?;

        Ok(())
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &crate::logging::mask_secret(&self.bot_token))
            .field("operator_chat_id", &self.operator_chat_id)
            .field("api_base_url", &self.api_base_url)
            .field("long_poll_timeout_secs", &self.long_poll_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl TelegramConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(TelegramConfig {
            bot_token: env::var("BOT_TOKEN")
                .map_err(|_| ConfigError::MissingVariable("BOT_TOKEN".to_string()))?,
            operator_chat_id: env::var("OPERATOR_CHAT_ID")
                .or_else(|_| env::var("ADMIN_CHAT_ID"))
                .map_err(|_| ConfigError::MissingVariable("OPERATOR_CHAT_ID".to_string()))?
                .trim()
                .to_string(),
            api_base_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            long_poll_timeout_secs: env::var("TELEGRAM_LONG_POLL_SECS")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("TELEGRAM_LONG_POLL_SECS".to_string()))?,
            request_timeout_secs: env::var("TELEGRAM_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "35".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("TELEGRAM_REQUEST_TIMEOUT_SECS".to_string())
                })?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::InvalidValue("BOT_TOKEN".to_string()));
        }

        let chat = self.operator_chat_id.as_str();
        let is_channel = chat.len() > 1 && chat.starts_with('@');
        if !is_channel && chat.parse::<i64>().is_err() {
            return Err(ConfigError::InvalidValue(
                "OPERATOR_CHAT_ID must be a numeric id or @channel".to_string(),
            ));
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue(
                "TELEGRAM_API_URL must be a valid URL".to_string(),
            ));
        }

        // The HTTP timeout has to outlive the server-side long poll.
        if self.request_timeout_secs <= self.long_poll_timeout_secs {
            return Err(ConfigError::ValidationFailed(
                "TELEGRAM_REQUEST_TIMEOUT_SECS must exceed TELEGRAM_LONG_POLL_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Plain,
        }
    }
}

pub const DEFAULT_NONE_TOKENS: [&str; 4] = ["-", "no", "none", "нет"];

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            none_tokens: DEFAULT_NONE_TOKENS.iter().map(|t| t.to_string()).collect(),
            support_contact: "the operator".to_string(),
        }
    }
}

impl FormConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(FormConfig {
            none_tokens: match env::var("NOTES_NONE_TOKENS") {
                Ok(raw) => raw
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
                Err(_) => defaults.none_tokens,
            },
            support_contact: env::var("SUPPORT_CONTACT").unwrap_or(defaults.support_contact),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.none_tokens.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "NOTES_NONE_TOKENS must list at least one token".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telegram() -> TelegramConfig {
        TelegramConfig {
            bot_token: "123456:ABC".to_string(),
            operator_chat_id: "-1001234567890".to_string(),
            api_base_url: "https://api.telegram.org".to_string(),
            long_poll_timeout_secs: 25,
            request_timeout_secs: 35,
        }
    }

    #[test]
    fn test_telegram_config_validation() {
        assert!(telegram().validate().is_ok());
    }

    #[test]
    fn test_channel_operator_chat_is_accepted() {
        let config = TelegramConfig {
            operator_chat_id: "@orders_channel".to_string(),
            ..telegram()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_operator_chat() {
        for chat in ["", "@", "orders"] {
            let config = TelegramConfig {
                operator_chat_id: chat.to_string(),
                ..telegram()
            };
            assert!(config.validate().is_err(), "accepted {:?}", chat);
        }
    }

    #[test]
    fn test_request_timeout_must_exceed_long_poll() {
        let config = TelegramConfig {
            request_timeout_secs: 25,
            ..telegram()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_debug_masks_token() {
        let rendered = format!("{:?}", telegram());
        assert!(!rendered.contains("123456:ABC"));
    }

    #[test]
    fn test_log_level_validation() {
        assert!(LoggingConfig::default().validate().is_ok());
        let config = LoggingConfig {
            level: "verbose".to_string(),
            format: LogFormat::Json,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_form_defaults_include_none_tokens() {
        let config = FormConfig::default();
        assert!(config.none_tokens.contains(&"none".to_string()));
        assert!(config.validate().is_ok());
        let empty = FormConfig {
            none_tokens: vec![],
            ..FormConfig::default()
        };
        assert!(empty.validate().is_err());
    }
}
