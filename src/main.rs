use std::sync::Arc;

use subpay_bot::config::AppConfig;
use subpay_bot::handlers::Dispatcher;
use subpay_bot::logging::init_tracing;
use subpay_bot::messaging::telegram::TelegramClient;
use subpay_bot::messaging::{ChatId, Messenger, UpdateSource};
use subpay_bot::payments::providers::YooKassaGateway;
use subpay_bot::payments::PaymentGateway;
use subpay_bot::services::notification::OperatorRelay;
use subpay_bot::services::order_form::FormRules;
use subpay_bot::services::payment_orchestrator::{PaymentOrchestrator, PaymentRegistry};
use subpay_bot::services::pricing::PricingEngine;
use subpay_bot::services::session_store::SessionStore;
use subpay_bot::workers::update_poller::{UpdatePoller, UpdatePollerConfig};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging).map_err(|e| anyhow::anyhow!("failed to init tracing: {}", e))?;
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        operator_chat = %config.telegram.operator_chat_id,
        test_mode = config.yookassa.test_mode,
        "🚀 Starting subscription order bot"
    );

    let telegram = Arc::new(TelegramClient::new(&config.telegram)?);
    let messenger: Arc<dyn Messenger> = telegram.clone();
    let updates: Arc<dyn UpdateSource> = telegram;

    let gateway: Arc<dyn PaymentGateway> = Arc::new(YooKassaGateway::new(config.yookassa.clone())?);
    info!(provider = gateway.name(), "✅ Payment gateway initialized");

    let rates = Arc::new(config.rates.build_fetcher()?);
    info!(sources = ?rates.provider_names(), "✅ Exchange rate sources initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let relay = Arc::new(OperatorRelay::new(
        messenger.clone(),
        ChatId::new(config.telegram.operator_chat_id.clone()),
        config.form.support_contact.clone(),
    ));
    if !relay.accepts_decisions() {
        warn!(
            operator_chat = %config.telegram.operator_chat_id,
            "operator chat is not numeric; activation buttons are disabled"
        );
    }
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        gateway,
        messenger.clone(),
        relay.clone(),
        Arc::new(PaymentRegistry::new()),
        config.payment_monitor.clone(),
        shutdown_rx.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        messenger,
        Arc::new(SessionStore::new()),
        FormRules::from(&config.form),
        rates,
        PricingEngine::new(config.pricing.clone()),
        relay,
        orchestrator.clone(),
        config.form.support_contact.clone(),
    ));

    let poller = UpdatePoller::new(updates, dispatcher, UpdatePollerConfig::default());
    let poller_handle = tokio::spawn(poller.run(shutdown_rx));
    info!("✅ Update poller started");

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    if let Err(e) = poller_handle.await {
        error!(error = %e, "update poller task failed");
    }

    let pending = orchestrator.registry().len().await;
    if pending > 0 {
        warn!(pending_attempts = pending, "shutting down with unresolved payment attempts");
    }

    info!("Shutdown complete");
    Ok(())
}
