//! Rate providers for fetching exchange rates
//!
//! - ExchangeRateHostProvider: exchangerate.host `latest` endpoint
//! - OpenErApiProvider: open.er-api.com `v6/latest` endpoint
//! - FixedRateProvider: operator-pinned rate, also used in tests

use super::exchange_rate::{RateData, RateError, RateFetcher, RateProvider, RateResult};
use crate::config::ConfigError;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Rate source configuration
#[derive(Debug, Clone)]
pub struct RateSourceConfig {
    pub timeout_ms: u64,
    pub exchangerate_host_url: String,
    pub open_er_api_url: String,
    /// When set, this rate is tried before any remote source.
    pub fixed_override: Option<Decimal>,
}

impl Default for RateSourceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            exchangerate_host_url: "https://api.exchangerate.host".to_string(),
            open_er_api_url: "https://open.er-api.com".to_string(),
            fixed_override: None,
        }
    }
}

impl RateSourceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            timeout_ms: env::var("RATE_SOURCE_TIMEOUT_MS")
                .unwrap_or_else(|_| defaults.timeout_ms.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("RATE_SOURCE_TIMEOUT_MS".to_string()))?,
            exchangerate_host_url: env::var("RATE_EXCHANGERATE_HOST_URL")
                .unwrap_or(defaults.exchangerate_host_url),
            open_er_api_url: env::var("RATE_OPEN_ER_API_URL").unwrap_or(defaults.open_er_api_url),
            fixed_override: match env::var("RATE_FIXED_OVERRIDE") {
                Ok(raw) if !raw.trim().is_empty() => Some(
                    Decimal::from_str(raw.trim())
                        .map_err(|_| ConfigError::InvalidValue("RATE_FIXED_OVERRIDE".to_string()))?,
                ),
                _ => None,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_SOURCE_TIMEOUT_MS".to_string(),
            ));
        }
        for (name, url) in [
            ("RATE_EXCHANGERATE_HOST_URL", &self.exchangerate_host_url),
            ("RATE_OPEN_ER_API_URL", &self.open_er_api_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be a valid URL",
                    name
                )));
            }
        }
        if let Some(rate) = self.fixed_override {
            if rate <= Decimal::ZERO {
                return Err(ConfigError::ValidationFailed(
                    "RATE_FIXED_OVERRIDE must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Assemble the fetcher: fixed override first, then the two public sources.
    pub fn build_fetcher(&self) -> RateResult<RateFetcher> {
        let client = Client::builder()
            .timeout(Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| RateError::Provider {
                provider: "http".to_string(),
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        let mut fetcher = RateFetcher::new(Duration::from_millis(self.timeout_ms));
        if let Some(rate) = self.fixed_override {
            fetcher = fetcher.add_provider(Arc::new(FixedRateProvider::new(rate)));
        }
        Ok(fetcher
            .add_provider(Arc::new(ExchangeRateHostProvider::new(
                client.clone(),
                self.exchangerate_host_url.clone(),
            )))
            .add_provider(Arc::new(OpenErApiProvider::new(
                client,
                self.open_er_api_url.clone(),
            ))))
    }
}

/// Fixed rate provider
pub struct FixedRateProvider {
    rate: Decimal,
}

impl FixedRateProvider {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }
}

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn fetch_rate(&self, from: &str, to: &str) -> RateResult<RateData> {
        Ok(RateData::new(from, to, self.rate, "fixed_override"))
    }

    fn name(&self) -> &str {
        "FixedRateProvider"
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeRateHostResponse {
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// exchangerate.host
pub struct ExchangeRateHostProvider {
    client: Client,
    base_url: String,
}

impl ExchangeRateHostProvider {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl RateProvider for ExchangeRateHostProvider {
    async fn fetch_rate(&self, from: &str, to: &str) -> RateResult<RateData> {
        let url = format!(
            "{}/latest?base={}&symbols={}",
            self.base_url.trim_end_matches('/'),
            from,
            to
        );
        debug!(url = %url, "fetching exchangerate.host rate");

        let body: ExchangeRateHostResponse = get_json(&self.client, &url, self.name()).await?;
        let rate = quote_from(&body.rates, to, self.name())?;
        Ok(RateData::new(from, to, rate, "exchangerate.host"))
    }

    fn name(&self) -> &str {
        "ExchangeRateHostProvider"
    }
}

#[derive(Debug, Deserialize)]
struct OpenErApiResponse {
    result: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// open.er-api.com
pub struct OpenErApiProvider {
    client: Client,
    base_url: String,
}

impl OpenErApiProvider {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl RateProvider for OpenErApiProvider {
    async fn fetch_rate(&self, from: &str, to: &str) -> RateResult<RateData> {
        let url = format!("{}/v6/latest/{}", self.base_url.trim_end_matches('/'), from);
        debug!(url = %url, "fetching open.er-api rate");

        let body: OpenErApiResponse = get_json(&self.client, &url, self.name()).await?;
        if let Some(result) = body.result.as_deref() {
            if result != "success" {
                return Err(RateError::Provider {
                    provider: self.name().to_string(),
                    message: format!("result={}", result),
                });
            }
        }
        let rate = quote_from(&body.rates, to, self.name())?;
        Ok(RateData::new(from, to, rate, "open.er-api.com"))
    }

    fn name(&self) -> &str {
        "OpenErApiProvider"
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    url: &str,
    provider: &str,
) -> RateResult<T> {
    let provider_error = |message: String| RateError::Provider {
        provider: provider.to_string(),
        message,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| provider_error(format!("request failed: {}", e)))?;
    if !response.status().is_success() {
        return Err(provider_error(format!("bad status {}", response.status())));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| provider_error(format!("invalid JSON: {}", e)))
}

/// Extract the quote currency from a `rates` map as an exact decimal.
fn quote_from(rates: &HashMap<String, f64>, quote: &str, provider: &str) -> RateResult<Decimal> {
    let raw = rates.get(quote).copied().ok_or_else(|| RateError::Provider {
        provider: provider.to_string(),
        message: format!("no {} rate in response", quote),
    })?;
    if !raw.is_finite() {
        return Err(RateError::InvalidRate {
            provider: provider.to_string(),
            rate: raw.to_string(),
        });
    }
    Decimal::from_f64(raw).ok_or_else(|| RateError::InvalidRate {
        provider: provider.to_string(),
        rate: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_fixed_rate_provider() {
        let provider = FixedRateProvider::new(dec!(95.25));
        let rate = provider.fetch_rate("USD", "RUB").await.unwrap();
        assert_eq!(rate.rate, dec!(95.25));
        assert_eq!(rate.currency_pair, "USD/RUB");
        assert_eq!(rate.source, "fixed_override");
    }

    #[test]
    fn exchangerate_host_shape_parses() {
        let body: ExchangeRateHostResponse =
            serde_json::from_str(r#"{"success":true,"base":"USD","rates":{"RUB":92.5}}"#)
                .unwrap();
        assert_eq!(quote_from(&body.rates, "RUB", "x").unwrap(), dec!(92.5));
    }

    #[test]
    fn open_er_api_shape_parses() {
        let body: OpenErApiResponse = serde_json::from_str(
            r#"{"result":"success","base_code":"USD","rates":{"USD":1,"RUB":81.25}}"#,
        )
        .unwrap();
        assert_eq!(body.result.as_deref(), Some("success"));
        assert_eq!(quote_from(&body.rates, "RUB", "x").unwrap(), dec!(81.25));
    }

    #[test]
    fn missing_quote_is_a_provider_error() {
        let body: ExchangeRateHostResponse =
            serde_json::from_str(r#"{"success":false,"error":{"code":101}}"#).unwrap();
        assert!(matches!(
            quote_from(&body.rates, "RUB", "x"),
            Err(RateError::Provider { .. })
        ));
    }

    #[test]
    fn fixed_override_is_tried_first() {
        let config = RateSourceConfig {
            fixed_override: Some(dec!(90)),
            ..RateSourceConfig::default()
        };
        let fetcher = config.build_fetcher().unwrap();
        assert_eq!(
            fetcher.provider_names(),
            vec![
                "FixedRateProvider",
                "ExchangeRateHostProvider",
                "OpenErApiProvider"
            ]
        );
    }

    #[test]
    fn config_validation() {
        assert!(RateSourceConfig::default().validate().is_ok());
        let zero_timeout = RateSourceConfig {
            timeout_ms: 0,
            ..RateSourceConfig::default()
        };
        assert!(zero_timeout.validate().is_err());
        let negative_override = RateSourceConfig {
            fixed_override: Some(dec!(-5)),
            ..RateSourceConfig::default()
        };
        assert!(negative_override.validate().is_err());
    }
}
