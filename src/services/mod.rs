//! Services module for business logic and integrations

pub mod exchange_rate;
pub mod notification;
pub mod order;
pub mod order_form;
pub mod payment_orchestrator;
pub mod pricing;
pub mod rate_providers;
pub mod session_store;
