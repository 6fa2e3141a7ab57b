pub mod yookassa;

pub use yookassa::{YooKassaConfig, YooKassaGateway};
