use crate::payments::error::PaymentResult;
use crate::payments::types::{CreatePaymentRequest, PaymentHandle, StatusResponse};
use async_trait::async_trait;

/// Remote payment gateway as seen by the checkout flow.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register a payment and obtain the link the customer pays through.
    async fn create_payment(&self, request: CreatePaymentRequest) -> PaymentResult<PaymentHandle>;

    /// Current status of a previously created payment.
    async fn payment_status(&self, attempt_id: &str) -> PaymentResult<StatusResponse>;

    fn name(&self) -> &'static str;
}
