//! Pricing engine
//!
//! Converts a foreign monthly price into the settlement total:
//!
//! ```text
//! total_foreign   = price * months
//! commission_rate = base_commission + commission_per_unit * total_foreign
//! base_settlement = total_foreign * (rate + rate_markup)
//! gross           = base_settlement * (1 + commission_rate)
//! final_total     = ceil((gross + fixed_fee) / denomination) * denomination
//! fee_amount      = max(0, final_total - base_settlement)
//! ```
//!
//! Pure and deterministic: no I/O, no hidden state.

use crate::config::ConfigError;
use crate::services::order::Plan;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

pub const DEFAULT_RATE_MARKUP: Decimal = dec!(4);
pub const DEFAULT_FIXED_FEE: Decimal = dec!(750);
pub const DEFAULT_BASE_COMMISSION: Decimal = dec!(0.03);
pub const DEFAULT_COMMISSION_PER_UNIT: Decimal = dec!(0.001);
pub const DEFAULT_DENOMINATION: Decimal = dec!(10);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Price must be greater than zero, got {0}")]
    NonPositivePrice(Decimal),

    #[error("Exchange rate must be greater than zero, got {0}")]
    NonPositiveRate(Decimal),

    #[error("Rounding denomination must be greater than zero, got {0}")]
    InvalidDenomination(Decimal),

    #[error("Price {0} is too large to quote")]
    Overflow(Decimal),
}

/// Business constants of the pricing formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingConfig {
    /// Added to the market rate before conversion.
    pub rate_markup: Decimal,
    /// Flat fee in settlement currency.
    pub fixed_fee: Decimal,
    pub base_commission: Decimal,
    /// Commission growth per unit of foreign total.
    pub commission_per_unit: Decimal,
    /// Final totals are rounded up to a multiple of this.
    pub denomination: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            rate_markup: DEFAULT_RATE_MARKUP,
            fixed_fee: DEFAULT_FIXED_FEE,
            base_commission: DEFAULT_BASE_COMMISSION,
            commission_per_unit: DEFAULT_COMMISSION_PER_UNIT,
            denomination: DEFAULT_DENOMINATION,
        }
    }
}

impl PricingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            rate_markup: decimal_var("PRICING_RATE_MARKUP", defaults.rate_markup)?,
            fixed_fee: decimal_var("PRICING_FIXED_FEE", defaults.fixed_fee)?,
            base_commission: decimal_var("PRICING_BASE_COMMISSION", defaults.base_commission)?,
            commission_per_unit: decimal_var(
                "PRICING_COMMISSION_PER_UNIT",
                defaults.commission_per_unit,
            )?,
            denomination: decimal_var("PRICING_DENOMINATION", defaults.denomination)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.denomination <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue(
                "PRICING_DENOMINATION must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("PRICING_RATE_MARKUP", self.rate_markup),
            ("PRICING_FIXED_FEE", self.fixed_fee),
            ("PRICING_BASE_COMMISSION", self.base_commission),
            ("PRICING_COMMISSION_PER_UNIT", self.commission_per_unit),
        ] {
            if value < Decimal::ZERO {
                return Err(ConfigError::InvalidValue(format!(
                    "{} cannot be negative",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn decimal_var(name: &str, default: Decimal) -> Result<Decimal, ConfigError> {
    match env::var(name) {
        Ok(raw) => {
            Decimal::from_str(raw.trim()).map_err(|_| ConfigError::InvalidValue(name.to_string()))
        }
        Err(_) => Ok(default),
    }
}

/// Result of pricing one order. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub months: u32,
    pub rate: Decimal,
    pub total_foreign: Decimal,
    pub commission_rate: Decimal,
    pub base_settlement: Decimal,
    pub fee_amount: Decimal,
    pub final_total: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn quote(
        &self,
        monthly_price: Decimal,
        plan: Plan,
        rate: Decimal,
    ) -> Result<PricingBreakdown, PricingError> {
        if monthly_price <= Decimal::ZERO {
            return Err(PricingError::NonPositivePrice(monthly_price));
        }
        if rate <= Decimal::ZERO {
            return Err(PricingError::NonPositiveRate(rate));
        }

        let c = &self.config;
        let months = plan.months();
        let overflow = || PricingError::Overflow(monthly_price);

        let total_foreign = monthly_price
            .checked_mul(Decimal::from(months))
            .ok_or_else(overflow)?;
        let commission_rate = c
            .commission_per_unit
            .checked_mul(total_foreign)
            .and_then(|v| v.checked_add(c.base_commission))
            .ok_or_else(overflow)?;
        let base_settlement = rate
            .checked_add(c.rate_markup)
            .and_then(|r| total_foreign.checked_mul(r))
            .ok_or_else(overflow)?;
        let gross = Decimal::ONE
            .checked_add(commission_rate)
            .and_then(|m| base_settlement.checked_mul(m))
            .and_then(|g| g.checked_add(c.fixed_fee))
            .ok_or_else(overflow)?;
        let final_total = round_up_to_denomination(gross, c.denomination)?;
        let fee_amount = final_total
            .checked_sub(base_settlement)
            .ok_or_else(overflow)?
            .max(Decimal::ZERO);

        Ok(PricingBreakdown {
            months,
            rate,
            total_foreign,
            commission_rate,
            base_settlement,
            fee_amount,
            final_total,
        })
    }
}

/// Smallest multiple of `denomination` that is >= `value`.
pub fn round_up_to_denomination(
    value: Decimal,
    denomination: Decimal,
) -> Result<Decimal, PricingError> {
    if denomination <= Decimal::ZERO {
        return Err(PricingError::InvalidDenomination(denomination));
    }
    value
        .checked_div(denomination)
        .and_then(|units| units.ceil().checked_mul(denomination))
        .ok_or(PricingError::Overflow(value))
}

/// Human-readable amount: at most two decimals, no trailing zeros.
pub fn format_amount(value: Decimal) -> String {
    value.round_dp(2).normalize().to_string()
}
