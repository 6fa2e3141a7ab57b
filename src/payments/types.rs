use crate::payments::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Status vocabulary reported by the gateway for a single payment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Pending,
    WaitingForCapture,
    Succeeded,
    Canceled,
    Unknown,
}

impl GatewayStatus {
    pub fn from_provider(value: &str) -> Self {
        match value {
            "pending" => GatewayStatus::Pending,
            "waiting_for_capture" => GatewayStatus::WaitingForCapture,
            "succeeded" => GatewayStatus::Succeeded,
            "canceled" => GatewayStatus::Canceled,
            _ => GatewayStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayStatus::Pending => "pending",
            GatewayStatus::WaitingForCapture => "waiting_for_capture",
            GatewayStatus::Succeeded => "succeeded",
            GatewayStatus::Canceled => "canceled",
            GatewayStatus::Unknown => "unknown",
        }
    }

    /// Money has reached the merchant, or is held and only awaits capture.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            GatewayStatus::Succeeded | GatewayStatus::WaitingForCapture
        )
    }
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        Self {
            amount,
            currency: currency.to_string(),
        }
    }

    pub fn validate_positive(&self, field: &str) -> Result<(), PaymentError> {
        if self.amount <= Decimal::ZERO {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some(field.to_string()),
            });
        }
        if self.currency.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "currency is required".to_string(),
                field: Some("currency".to_string()),
            });
        }
        Ok(())
    }

    /// Amount with exactly two fractional digits, as gateways expect it.
    pub fn value_string(&self) -> String {
        format!("{:.2}", self.amount.round_dp(2))
    }
}

#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    /// Doubles as the gateway idempotence key.
    pub reference: Uuid,
    pub amount: Money,
    pub description: String,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHandle {
    pub attempt_id: String,
    pub confirmation_url: String,
    pub status: GatewayStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub attempt_id: String,
    pub status: GatewayStatus,
    pub paid: bool,
    pub amount: Option<Money>,
}
