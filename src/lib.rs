//! Order-intake and pricing bot for foreign subscriptions.
//!
//! Customers fill a short form in chat, get a quote in rubles and pay through
//! the card gateway or arrange payment with a manager. Operators receive each
//! paid or accepted order in a dedicated chat and report activation back.

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod messaging;
pub mod payments;
pub mod services;
pub mod workers;
