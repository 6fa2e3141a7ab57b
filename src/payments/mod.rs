//! Payment gateway integration: the `PaymentGateway` seam and its adapters.

pub mod error;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use provider::PaymentGateway;
pub use types::{CreatePaymentRequest, GatewayStatus, Money, PaymentHandle, StatusResponse};
