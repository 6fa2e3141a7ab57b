use crate::config::ConfigError;
use crate::messaging::{Messenger, OutboundMessage};
use crate::payments::{GatewayStatus, PaymentGateway};
use crate::services::notification::OperatorRelay;
use crate::services::payment_orchestrator::{notices, AttemptStatus, PaymentRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Custom error type
// ---------------------------------------------------------------------------

/// Gateway failures are transient and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The attempt left the registry while the monitor was still running.
    #[error("payment attempt {attempt_id} is no longer registered")]
    AttemptMissing { attempt_id: String },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PaymentMonitorConfig {
    /// Pause before every status query.
    pub poll_interval: Duration,
    /// Status queries allowed before the attempt times out.
    pub max_attempts: u32,
}

impl Default for PaymentMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(4),
            max_attempts: 24,
        }
    }
}

impl PaymentMonitorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            poll_interval: Duration::from_secs(
                std::env::var("PAYMENT_POLL_INTERVAL_SECS")
                    .unwrap_or_else(|_| defaults.poll_interval.as_secs().to_string())
                    .parse()
                    .map_err(|_| {
                        ConfigError::InvalidValue("PAYMENT_POLL_INTERVAL_SECS".to_string())
                    })?,
            ),
            max_attempts: std::env::var("PAYMENT_POLL_MAX_ATTEMPTS")
                .unwrap_or_else(|_| defaults.max_attempts.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAYMENT_POLL_MAX_ATTEMPTS".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_POLL_INTERVAL_SECS".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_POLL_MAX_ATTEMPTS".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Outcome of one poll.
enum PollOutcome {
    Continue,
    Finished(AttemptStatus),
}

/// Polls one payment attempt until it settles, is canceled or runs out of
/// attempts. Spawned per attempt by the orchestrator.
pub struct PaymentMonitor {
    attempt_id: String,
    gateway: Arc<dyn PaymentGateway>,
    messenger: Arc<dyn Messenger>,
    relay: Arc<OperatorRelay>,
    registry: Arc<PaymentRegistry>,
    config: PaymentMonitorConfig,
}

impl PaymentMonitor {
    pub fn new(
        attempt_id: String,
        gateway: Arc<dyn PaymentGateway>,
        messenger: Arc<dyn Messenger>,
        relay: Arc<OperatorRelay>,
        registry: Arc<PaymentRegistry>,
        config: PaymentMonitorConfig,
    ) -> Self {
        Self {
            attempt_id,
            gateway,
            messenger,
            relay,
            registry,
            config,
        }
    }

    /// Returns the terminal status, or `None` when stopped by shutdown or
    /// when the attempt vanished from the registry.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Option<AttemptStatus> {
        info!(
            attempt_id = %self.attempt_id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_attempts = self.config.max_attempts,
            "payment monitor started"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(attempt_id = %self.attempt_id, "payment monitor stopping, attempt resolves out-of-band");
                        return None;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    match self.poll_once().await {
                        Ok(PollOutcome::Continue) => {}
                        Ok(PollOutcome::Finished(status)) => {
                            self.finish(status).await;
                            return Some(status);
                        }
                        Err(e @ MonitorError::AttemptMissing { .. }) => {
                            warn!(error = %e, "monitor exiting");
                            return None;
                        }
                    }
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<PollOutcome, MonitorError> {
        let polls = self
            .registry
            .record_poll(&self.attempt_id)
            .await
            .ok_or_else(|| MonitorError::AttemptMissing {
                attempt_id: self.attempt_id.clone(),
            })?;

        match self.gateway.payment_status(&self.attempt_id).await {
            Ok(response) if response.status.is_settled() => {
                return Ok(PollOutcome::Finished(AttemptStatus::Succeeded));
            }
            Ok(response) if response.status == GatewayStatus::Canceled => {
                return Ok(PollOutcome::Finished(AttemptStatus::Canceled));
            }
            Ok(response) => {
                debug!(
                    attempt_id = %self.attempt_id,
                    poll = polls,
                    status = %response.status,
                    "payment still pending"
                );
            }
            Err(e) => {
                // Transient: no transition, keep polling.
                warn!(
                    attempt_id = %self.attempt_id,
                    poll = polls,
                    error = %e,
                    retryable = e.is_retryable(),
                    "payment status query failed"
                );
            }
        }

        if polls >= self.config.max_attempts {
            return Ok(PollOutcome::Finished(AttemptStatus::TimedOut));
        }
        Ok(PollOutcome::Continue)
    }

    /// Leave the registry and tell everyone who needs to know.
    async fn finish(&self, status: AttemptStatus) {
        let Some(mut attempt) = self.registry.remove(&self.attempt_id).await else {
            warn!(attempt_id = %self.attempt_id, "attempt removed before completion");
            return;
        };
        if let Err(e) = attempt.transition(status) {
            error!(attempt_id = %self.attempt_id, error = %e, "invalid attempt transition");
        }

        info!(
            attempt_id = %attempt.attempt_id,
            user_id = attempt.customer.id,
            status = %status,
            polls = attempt.poll_count,
            "payment attempt finished"
        );

        let customer_text = match status {
            AttemptStatus::Succeeded => {
                if let Err(e) = self
                    .relay
                    .notify_settlement(
                        &attempt.customer,
                        &attempt.order,
                        &attempt.breakdown,
                        &attempt.attempt_id,
                    )
                    .await
                {
                    error!(attempt_id = %attempt.attempt_id, error = %e, "failed to notify operator of settled payment");
                }
                notices::payment_succeeded()
            }
            AttemptStatus::Canceled => notices::payment_canceled(),
            AttemptStatus::TimedOut => notices::payment_timed_out(),
            AttemptStatus::Created | AttemptStatus::Pending => return,
        };

        if let Err(e) = self
            .messenger
            .send(&attempt.customer_chat, OutboundMessage::text(customer_text))
            .await
        {
            warn!(attempt_id = %attempt.attempt_id, error = %e, "failed to notify customer");
        }
    }
}
