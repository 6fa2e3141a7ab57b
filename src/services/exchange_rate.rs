//! Exchange rate lookup
//!
//! Resolves the USD -> RUB conversion rate from an ordered list of
//! independent sources. The first source that answers with a strictly
//! positive rate wins; redundancy comes from falling through to the next
//! source, never from retrying the same one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Currency the customer's base price is quoted in.
pub const FOREIGN_CURRENCY: &str = "USD";
/// Currency the order is charged in.
pub const SETTLEMENT_CURRENCY: &str = "RUB";

/// Exchange rate error
#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("Rate provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Rate provider {provider} returned a non-positive rate: {rate}")]
    InvalidRate { provider: String, rate: String },

    #[error("Rate provider {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("No rate providers configured")]
    NoProviders,

    #[error("Exchange rate unavailable: {last_error}")]
    Unavailable {
        #[source]
        last_error: Box<RateError>,
    },
}

pub type RateResult<T> = Result<T, RateError>;

/// Rate provider trait for fetching exchange rates
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Fetch the current rate between two currencies.
    async fn fetch_rate(&self, from: &str, to: &str) -> RateResult<RateData>;

    fn name(&self) -> &str;
}

/// Rate data structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateData {
    pub currency_pair: String,
    pub rate: Decimal,
    pub source: String,
    pub last_updated: DateTime<Utc>,
}

impl RateData {
    pub fn new(from: &str, to: &str, rate: Decimal, source: &str) -> Self {
        Self {
            currency_pair: format!("{}/{}", from, to),
            rate,
            source: source.to_string(),
            last_updated: Utc::now(),
        }
    }
}

/// Tries each configured provider in order under a per-call timeout.
#[derive(Clone)]
pub struct RateFetcher {
    providers: Vec<Arc<dyn RateProvider>>,
    source_timeout: Duration,
}

impl RateFetcher {
    pub fn new(source_timeout: Duration) -> Self {
        Self {
            providers: Vec::new(),
            source_timeout,
        }
    }

    /// Add rate provider
    pub fn add_provider(mut self, provider: Arc<dyn RateProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Current USD -> RUB rate, or `RateError::Unavailable` carrying the
    /// failure of the last source tried.
    pub async fn fetch_rate(&self) -> RateResult<RateData> {
        self.fetch_pair(FOREIGN_CURRENCY, SETTLEMENT_CURRENCY).await
    }

    pub async fn fetch_pair(&self, from: &str, to: &str) -> RateResult<RateData> {
        let mut last_error = None;

        for provider in &self.providers {
            match self.fetch_from(provider.as_ref(), from, to).await {
                Ok(rate_data) => {
                    info!(
                        source = %rate_data.source,
                        rate = %rate_data.rate,
                        pair = %rate_data.currency_pair,
                        "exchange rate resolved"
                    );
                    return Ok(rate_data);
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "rate source failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(RateError::Unavailable {
                last_error: Box::new(e),
            }),
            None => Err(RateError::NoProviders),
        }
    }

    async fn fetch_from(
        &self,
        provider: &dyn RateProvider,
        from: &str,
        to: &str,
    ) -> RateResult<RateData> {
        debug!(provider = provider.name(), from = from, to = to, "querying rate source");

        let rate_data = tokio::time::timeout(self.source_timeout, provider.fetch_rate(from, to))
            .await
            .map_err(|_| RateError::Timeout {
                provider: provider.name().to_string(),
                timeout_ms: self.source_timeout.as_millis() as u64,
            })??;

        if rate_data.rate <= Decimal::ZERO {
            return Err(RateError::InvalidRate {
                provider: provider.name().to_string(),
                rate: rate_data.rate.to_string(),
            });
        }

        Ok(rate_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider {
        name: &'static str,
        rate: Decimal,
        calls: AtomicUsize,
    }

    impl StaticProvider {
        fn new(name: &'static str, rate: Decimal) -> Arc<Self> {
            Arc::new(Self {
                name,
                rate,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RateProvider for StaticProvider {
        async fn fetch_rate(&self, from: &str, to: &str) -> RateResult<RateData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RateData::new(from, to, self.rate, self.name))
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl RateProvider for FailingProvider {
        async fn fetch_rate(&self, _from: &str, _to: &str) -> RateResult<RateData> {
            Err(RateError::Provider {
                provider: "failing".to_string(),
                message: "bad status".to_string(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl RateProvider for SlowProvider {
        async fn fetch_rate(&self, from: &str, to: &str) -> RateResult<RateData> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(RateData::new(from, to, dec!(1), "slow"))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn fetcher() -> RateFetcher {
        RateFetcher::new(Duration::from_millis(3000))
    }

    #[tokio::test]
    async fn fetch_from_passes_a_positive_rate_through() {
        let provider = StaticProvider::new("static", dec!(91.5));
        let rate = fetcher()
            .fetch_from(provider.as_ref(), "USD", "RUB")
            .await
            .unwrap();

        assert_eq!(rate.rate, dec!(91.5));
        assert_eq!(rate.currency_pair, "USD/RUB");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_from_rejects_non_positive_rates() {
        for value in [dec!(0), dec!(-1)] {
            let provider = StaticProvider::new("broken", value);
            match fetcher().fetch_from(provider.as_ref(), "USD", "RUB").await {
                Err(RateError::InvalidRate { provider, rate }) => {
                    assert_eq!(provider, "broken");
                    assert_eq!(rate, value.to_string());
                }
                other => panic!("expected InvalidRate, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn fetch_from_keeps_the_provider_error() {
        assert!(matches!(
            fetcher().fetch_from(&FailingProvider, "USD", "RUB").await,
            Err(RateError::Provider { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_from_times_out_slow_sources() {
        match fetcher().fetch_from(&SlowProvider, "USD", "RUB").await {
            Err(RateError::Timeout {
                provider,
                timeout_ms,
            }) => {
                assert_eq!(provider, "slow");
                assert_eq!(timeout_ms, 3000);
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
    }
}
