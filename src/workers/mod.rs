pub mod payment_monitor;
pub mod update_poller;
