//! Error handling for the order bot
//!
//! Every failure at an I/O boundary maps onto one `AppErrorKind`, which
//! decides the text the customer sees and whether the operation may be
//! retried. Nothing in the bot lets an error escape to the runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigError;
use crate::messaging::MessagingError;
use crate::payments::PaymentError;
use crate::services::exchange_rate::RateError;
use crate::services::pricing::PricingError;

/// Stable error codes used in logs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "RATE_UNAVAILABLE")]
    RateUnavailable,
    #[serde(rename = "GATEWAY_ERROR")]
    GatewayError,
    #[serde(rename = "DELIVERY_FAILED")]
    DeliveryFailed,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::RateUnavailable => "RATE_UNAVAILABLE",
            ErrorCode::GatewayError => "GATEWAY_ERROR",
            ErrorCode::DeliveryFailed => "DELIVERY_FAILED",
            ErrorCode::ExternalServiceTimeout => "EXTERNAL_SERVICE_TIMEOUT",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }
}

/// Customer input that does not fit the current form step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("The {field} cannot be empty")]
    EmptyField { field: String },

    #[error("'{input}' is not a valid price: {reason}")]
    InvalidPrice { input: String, reason: String },

    #[error("Unknown plan '{value}'")]
    UnknownPlan { value: String },

    #[error("Please choose {expected} using the buttons")]
    UnexpectedInput { expected: String },
}

/// Failures of remote collaborators
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Every exchange rate source failed
    RateSource { message: String },
    /// Payment gateway rejected or failed a request
    PaymentGateway {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    /// Chat message could not be delivered
    Messaging {
        message: String,
        recipient_unreachable: bool,
    },
    Timeout { service: String, timeout_secs: u64 },
}

#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Validation(ValidationError),
    External(ExternalError),
    Infrastructure(InfrastructureError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
            AppErrorKind::External(err) => match err {
                ExternalError::RateSource { .. } => ErrorCode::RateUnavailable,
                ExternalError::PaymentGateway { .. } => ErrorCode::GatewayError,
                ExternalError::Messaging { .. } => ErrorCode::DeliveryFailed,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Infrastructure(_) => ErrorCode::ConfigurationError,
        }
    }

    /// Text that can be shown to the customer as is.
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Validation(err) => err.to_string(),
            AppErrorKind::External(err) => match err {
                ExternalError::RateSource { .. } => {
                    "Could not get the current exchange rate. Please try again later with /start"
                        .to_string()
                }
                ExternalError::PaymentGateway {
                    message,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!("The payment service is temporarily unavailable ({}). Please try again later", message)
                    } else {
                        format!("Could not create the payment: {}", message)
                    }
                }
                ExternalError::Messaging {
                    recipient_unreachable,
                    ..
                } => {
                    if *recipient_unreachable {
                        "The customer has not started a chat with the bot".to_string()
                    } else {
                        "The message could not be delivered".to_string()
                    }
                }
                ExternalError::Timeout { service, .. } => {
                    format!("{} did not respond in time. Please try again later", service)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Validation(_) => false,
            AppErrorKind::External(err) => match err {
                ExternalError::RateSource { .. } => true,
                ExternalError::PaymentGateway { is_retryable, .. } => *is_retryable,
                ExternalError::Messaging {
                    recipient_unreachable,
                    ..
                } => !recipient_unreachable,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Infrastructure(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_code().as_str(), self.user_message())?;
        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

// ============================================================================
// Conversions
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::new(AppErrorKind::Validation(err))
    }
}

impl From<RateError> for AppError {
    fn from(err: RateError) -> Self {
        AppError::new(AppErrorKind::External(ExternalError::RateSource {
            message: err.to_string(),
        }))
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        let kind = match &err {
            PaymentError::TimeoutError { timeout_secs } => ExternalError::Timeout {
                service: "Payment service".to_string(),
                timeout_secs: *timeout_secs,
            },
            PaymentError::ProviderError {
                provider, message, ..
            } => ExternalError::PaymentGateway {
                provider: provider.clone(),
                message: message.clone(),
                is_retryable: err.is_retryable(),
            },
            _ => ExternalError::PaymentGateway {
                provider: "payments".to_string(),
                message: err.user_message(),
                is_retryable: err.is_retryable(),
            },
        };
        AppError::new(AppErrorKind::External(kind))
    }
}

impl From<MessagingError> for AppError {
    fn from(err: MessagingError) -> Self {
        AppError::new(AppErrorKind::External(ExternalError::Messaging {
            recipient_unreachable: err.is_recipient_unreachable(),
            message: err.to_string(),
        }))
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        let kind = match &err {
            PricingError::NonPositivePrice(value) => {
                AppErrorKind::Validation(ValidationError::InvalidPrice {
                    input: value.to_string(),
                    reason: "must be greater than zero".to_string(),
                })
            }
            PricingError::Overflow(value) => {
                AppErrorKind::Validation(ValidationError::InvalidPrice {
                    input: value.to_string(),
                    reason: "too large".to_string(),
                })
            }
            PricingError::NonPositiveRate(_) => {
                AppErrorKind::External(ExternalError::RateSource {
                    message: err.to_string(),
                })
            }
            PricingError::InvalidDenomination(_) => {
                AppErrorKind::Infrastructure(InfrastructureError::Configuration {
                    message: err.to_string(),
                })
            }
        };
        AppError::new(kind)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_message() {
        let err = AppError::from(ValidationError::EmptyField {
            field: "login".to_string(),
        });
        assert_eq!(err.error_code(), ErrorCode::ValidationError);
        assert_eq!(err.user_message(), "The login cannot be empty");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rate_error_mapping() {
        let err = AppError::from(RateError::NoProviders);
        assert_eq!(err.error_code(), ErrorCode::RateUnavailable);
        assert!(err.user_message().contains("exchange rate"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_pricing_overflow_is_a_validation_error() {
        let err = AppError::from(PricingError::Overflow(rust_decimal::Decimal::MAX));
        assert_eq!(err.error_code(), ErrorCode::ValidationError);
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("too large"));
    }

    #[test]
    fn test_gateway_error_carries_provider_text() {
        let err = AppError::from(PaymentError::ProviderError {
            provider: "yookassa".to_string(),
            message: "Receipt is invalid".to_string(),
            provider_code: Some("400".to_string()),
            retryable: false,
        });
        assert_eq!(err.error_code(), ErrorCode::GatewayError);
        assert_eq!(
            err.user_message(),
            "Could not create the payment: Receipt is invalid"
        );
    }

    #[test]
    fn test_gateway_timeout_mapping() {
        let err = AppError::from(PaymentError::TimeoutError { timeout_secs: 20 });
        assert_eq!(err.error_code(), ErrorCode::ExternalServiceTimeout);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unreachable_recipient_is_not_retryable() {
        let err = AppError::from(MessagingError::RecipientUnreachable {
            chat_id: "42".to_string(),
            reason: "bot was blocked by the user".to_string(),
        });
        assert_eq!(err.error_code(), ErrorCode::DeliveryFailed);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = AppError::from(ConfigError::MissingVariable("BOT_TOKEN".to_string()))
            .with_context("startup");
        let rendered = err.to_string();
        assert!(rendered.starts_with("[CONFIGURATION_ERROR]"));
        assert!(rendered.ends_with("(startup)"));
    }
}
