//! Order domain types
//!
//! Plans, payment methods and the finalized order record produced by the
//! order form.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Subscription duration offered to customers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Plan {
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "9m")]
    NineMonths,
    #[serde(rename = "12m")]
    TwelveMonths,
}

impl Plan {
    pub const ALL: [Plan; 4] = [
        Plan::OneMonth,
        Plan::ThreeMonths,
        Plan::NineMonths,
        Plan::TwelveMonths,
    ];

    pub fn months(&self) -> u32 {
        match self {
            Plan::OneMonth => 1,
            Plan::ThreeMonths => 3,
            Plan::NineMonths => 9,
            Plan::TwelveMonths => 12,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Plan::OneMonth => "1m",
            Plan::ThreeMonths => "3m",
            Plan::NineMonths => "9m",
            Plan::TwelveMonths => "12m",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Plan::OneMonth => "1 month",
            Plan::ThreeMonths => "3 months",
            Plan::NineMonths => "9 months",
            Plan::TwelveMonths => "12 months",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Plan {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "1m" => Ok(Plan::OneMonth),
            "3m" => Ok(Plan::ThreeMonths),
            "9m" => Ok(Plan::NineMonths),
            "12m" => Ok(Plan::TwelveMonths),
            other => Err(ValidationError::UnknownPlan {
                value: other.to_string(),
            }),
        }
    }
}

/// How the customer settles the order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Bank card through the payment gateway.
    Card,
    /// Telegram Stars, settled with the operator.
    Stars,
    /// Manual arrangement with a manager.
    Manager,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::Card,
        PaymentMethod::Stars,
        PaymentMethod::Manager,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Stars => "stars",
            PaymentMethod::Manager => "manager",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "Bank card",
            PaymentMethod::Stars => "Telegram Stars",
            PaymentMethod::Manager => "Other (via manager)",
        }
    }

    /// Whether this method hands off to the payment gateway.
    pub fn is_gateway(&self) -> bool {
        matches!(self, PaymentMethod::Card)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "card" => Ok(PaymentMethod::Card),
            "stars" => Ok(PaymentMethod::Stars),
            "manager" => Ok(PaymentMethod::Manager),
            _ => Err(ValidationError::UnexpectedInput {
                expected: "a payment method".to_string(),
            }),
        }
    }
}

/// Credentials of the account the subscription is bought for.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub service: String,
    pub login: String,
    /// Lives only as long as the form session and the attempt snapshot.
    pub password: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("service", &self.service)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything collected before the payment method is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetails {
    pub account: Account,
    pub source: String,
    pub plan: Plan,
    /// Monthly base price in the foreign currency.
    pub monthly_price: Decimal,
    /// Empty when the customer declined to leave notes.
    pub notes: String,
}

/// A finalized order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub details: OrderDetails,
    pub payment_method: PaymentMethod,
}

impl Order {
    /// Check that every required field is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let d = &self.details;
        for (field, value) in [
            ("service", &d.account.service),
            ("login", &d.account.login),
            ("password", &d.account.password),
            ("source", &d.source),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyField {
                    field: field.to_string(),
                });
            }
        }
        if d.monthly_price <= Decimal::ZERO {
            return Err(ValidationError::InvalidPrice {
                input: d.monthly_price.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn has_notes(&self) -> bool {
        !self.details.notes.is_empty()
    }
}
