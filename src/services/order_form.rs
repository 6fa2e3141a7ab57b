//! Order form state machine
//!
//! Collects one field per turn in a fixed order:
//!
//! `service -> login -> secret -> source -> plan -> price -> notes -> confirm -> payment_method`
//!
//! Each `FormState` variant carries exactly the fields gathered so far, so a
//! state that skips a step cannot be built. `FormState::advance` is pure; the
//! exchange rate lookup that precedes `confirm` is requested through
//! `Transition::Quote` and resolved by the caller.

use crate::config::FormConfig;
use crate::error::ValidationError;
use crate::services::order::{Account, Order, OrderDetails, PaymentMethod, Plan};
use crate::services::pricing::PricingBreakdown;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use std::str::FromStr;

/// Largest monthly price accepted from a customer, in the foreign currency.
pub const MAX_MONTHLY_PRICE: Decimal = dec!(100000);

/// Button payloads understood by the form.
pub mod payloads {
    use crate::services::order::{PaymentMethod, Plan};

    pub const CANCEL: &str = "cancel";
    pub const CONFIRM_ACCEPT: &str = "confirm:accept";
    pub const CONFIRM_EDIT: &str = "confirm:edit";
    pub const NOTES_SKIP: &str = "notes:skip";
    pub const PLAN_PREFIX: &str = "plan:";
    pub const PAY_PREFIX: &str = "pay:";

    pub fn plan(plan: Plan) -> String {
        format!("{}{}", PLAN_PREFIX, plan.code())
    }

    pub fn pay(method: PaymentMethod) -> String {
        format!("{}{}", PAY_PREFIX, method.code())
    }
}

/// Step names in their fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormStep {
    Service,
    Login,
    Secret,
    Source,
    Plan,
    Price,
    Notes,
    Confirm,
    PaymentMethod,
}

impl FormStep {
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for FormStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormStep::Service => "service",
            FormStep::Login => "login",
            FormStep::Secret => "secret",
            FormStep::Source => "source",
            FormStep::Plan => "plan",
            FormStep::Price => "price",
            FormStep::Notes => "notes",
            FormStep::Confirm => "confirm",
            FormStep::PaymentMethod => "payment_method",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormState {
    Service,
    Login {
        service: String,
    },
    Secret {
        service: String,
        login: String,
    },
    Source {
        account: Account,
    },
    Plan {
        account: Account,
        source: String,
    },
    Price {
        account: Account,
        source: String,
        plan: Plan,
    },
    Notes {
        account: Account,
        source: String,
        plan: Plan,
        monthly_price: Decimal,
    },
    Confirm {
        details: OrderDetails,
        breakdown: PricingBreakdown,
    },
    PaymentMethod {
        details: OrderDetails,
        breakdown: PricingBreakdown,
    },
}

/// One unit of customer input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormInput {
    Text(String),
    /// A button payload.
    Choice(String),
    Cancel,
}

/// Outcome of feeding one input to the form.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Moved exactly one step forward.
    Advance(FormState),
    /// Input did not fit; ask again for the same step.
    Retry {
        state: FormState,
        error: Option<ValidationError>,
    },
    /// Notes collected; price the order and enter `confirm`.
    Quote(OrderDetails),
    /// Discard everything and start again at `service`.
    Restart,
    Cancelled,
    Submitted {
        order: Order,
        breakdown: PricingBreakdown,
    },
}

/// Input rules that come from configuration.
#[derive(Debug, Clone)]
pub struct FormRules {
    none_tokens: Vec<String>,
}

impl FormRules {
    pub fn new<I, S>(none_tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            none_tokens: none_tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    /// "No notes" tokens become an empty note; anything else is kept trimmed.
    pub fn normalize_notes(&self, text: &str) -> String {
        let trimmed = text.trim();
        let lowered = trimmed.to_lowercase();
        if trimmed.is_empty() || self.none_tokens.iter().any(|t| *t == lowered) {
            String::new()
        } else {
            trimmed.to_string()
        }
    }
}

impl From<&FormConfig> for FormRules {
    fn from(config: &FormConfig) -> Self {
        FormRules::new(&config.none_tokens)
    }
}

impl Default for FormRules {
    fn default() -> Self {
        FormRules::from(&FormConfig::default())
    }
}

/// Parse a monthly price. Accepts `9.99`, `9,99`, `$9.99`.
pub fn parse_price(input: &str) -> Result<Decimal, ValidationError> {
    let cleaned = input.trim().trim_start_matches('$').trim().replace(',', ".");
    let invalid = |reason: &str| ValidationError::InvalidPrice {
        input: input.trim().to_string(),
        reason: reason.to_string(),
    };

    let price = Decimal::from_str(&cleaned).map_err(|_| invalid("not a number"))?;
    if price <= Decimal::ZERO {
        return Err(invalid("must be greater than zero"));
    }
    if price > MAX_MONTHLY_PRICE {
        return Err(invalid("too large"));
    }
    Ok(price)
}

fn required_text(input: &str, field: &str) -> Result<String, ValidationError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(ValidationError::EmptyField {
            field: field.to_string(),
        });
    }
    Ok(value.to_string())
}

impl FormState {
    pub fn step(&self) -> FormStep {
        match self {
            FormState::Service => FormStep::Service,
            FormState::Login { .. } => FormStep::Login,
            FormState::Secret { .. } => FormStep::Secret,
            FormState::Source { .. } => FormStep::Source,
            FormState::Plan { .. } => FormStep::Plan,
            FormState::Price { .. } => FormStep::Price,
            FormState::Notes { .. } => FormStep::Notes,
            FormState::Confirm { .. } => FormStep::Confirm,
            FormState::PaymentMethod { .. } => FormStep::PaymentMethod,
        }
    }

    /// The `confirm` state, once the order has been priced.
    pub fn confirm(details: OrderDetails, breakdown: PricingBreakdown) -> Self {
        FormState::Confirm { details, breakdown }
    }

    pub fn advance(self, input: FormInput, rules: &FormRules) -> Transition {
        let text = match input {
            FormInput::Cancel => return Transition::Cancelled,
            FormInput::Choice(ref payload) if payload == payloads::CANCEL => {
                return Transition::Cancelled
            }
            FormInput::Choice(payload) => return self.choose(&payload),
            FormInput::Text(text) => text,
        };

        match self {
            FormState::Service => match required_text(&text, "service") {
                Ok(service) => Transition::Advance(FormState::Login { service }),
                Err(e) => FormState::Service.retry(e),
            },
            FormState::Login { service } => match required_text(&text, "login") {
                Ok(login) => Transition::Advance(FormState::Secret { service, login }),
                Err(e) => FormState::Login { service }.retry(e),
            },
            FormState::Secret { service, login } => match required_text(&text, "password") {
                Ok(password) => Transition::Advance(FormState::Source {
                    account: Account {
                        service,
                        login,
                        password,
                    },
                }),
                Err(e) => FormState::Secret { service, login }.retry(e),
            },
            FormState::Source { account } => match required_text(&text, "source") {
                Ok(source) => Transition::Advance(FormState::Plan { account, source }),
                Err(e) => FormState::Source { account }.retry(e),
            },
            FormState::Price {
                account,
                source,
                plan,
            } => match parse_price(&text) {
                Ok(monthly_price) => Transition::Advance(FormState::Notes {
                    account,
                    source,
                    plan,
                    monthly_price,
                }),
                Err(e) => FormState::Price {
                    account,
                    source,
                    plan,
                }
                .retry(e),
            },
            FormState::Notes {
                account,
                source,
                plan,
                monthly_price,
            } => Transition::Quote(OrderDetails {
                account,
                source,
                plan,
                monthly_price,
                notes: rules.normalize_notes(&text),
            }),
            // Button-only steps: free text just repeats the prompt.
            state @ (FormState::Plan { .. }
            | FormState::Confirm { .. }
            | FormState::PaymentMethod { .. }) => Transition::Retry { state, error: None },
        }
    }

    fn choose(self, payload: &str) -> Transition {
        match self {
            FormState::Plan { account, source } => {
                let Some(code) = payload.strip_prefix(payloads::PLAN_PREFIX) else {
                    return FormState::Plan { account, source }.stay();
                };
                match code.parse::<Plan>() {
                    Ok(plan) => Transition::Advance(FormState::Price {
                        account,
                        source,
                        plan,
                    }),
                    Err(e) => FormState::Plan { account, source }.retry(e),
                }
            }
            FormState::Notes {
                account,
                source,
                plan,
                monthly_price,
            } if payload == payloads::NOTES_SKIP => Transition::Quote(OrderDetails {
                account,
                source,
                plan,
                monthly_price,
                notes: String::new(),
            }),
            FormState::Confirm { details, breakdown } => match payload {
                payloads::CONFIRM_ACCEPT => {
                    Transition::Advance(FormState::PaymentMethod { details, breakdown })
                }
                payloads::CONFIRM_EDIT => Transition::Restart,
                _ => FormState::Confirm { details, breakdown }.stay(),
            },
            FormState::PaymentMethod { details, breakdown } => {
                let method = payload
                    .strip_prefix(payloads::PAY_PREFIX)
                    .map(PaymentMethod::from_str);
                match method {
                    Some(Ok(payment_method)) => Transition::Submitted {
                        order: Order {
                            details,
                            payment_method,
                        },
                        breakdown,
                    },
                    Some(Err(e)) => FormState::PaymentMethod { details, breakdown }.retry(e),
                    None => FormState::PaymentMethod { details, breakdown }.stay(),
                }
            }
            // A stale button from an earlier prompt.
            state => state.stay(),
        }
    }

    fn retry(self, error: ValidationError) -> Transition {
        Transition::Retry {
            state: self,
            error: Some(error),
        }
    }

    fn stay(self) -> Transition {
        Transition::Retry {
            state: self,
            error: None,
        }
    }
}
