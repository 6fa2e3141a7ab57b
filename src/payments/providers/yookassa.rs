use crate::config::ConfigError;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    CreatePaymentRequest, GatewayStatus, Money, PaymentHandle, StatusResponse,
};
use crate::payments::utils::{HttpAuth, PaymentHttpClient};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const PROVIDER: &str = "yookassa";
const MAX_DESCRIPTION_CHARS: usize = 128;

#[derive(Clone)]
pub struct YooKassaConfig {
    pub shop_id: String,
    pub secret_key: String,
    pub base_url: String,
    pub return_url: String,
    pub receipt_email: String,
    pub receipt_phone: Option<String>,
    pub tax_system_code: u8,
    pub vat_code: u8,
    pub test_mode: bool,
    pub create_timeout_secs: u64,
    pub status_timeout_secs: u64,
}

impl std::fmt::Debug for YooKassaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YooKassaConfig")
            .field("shop_id", &self.shop_id)
            .field("secret_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("return_url", &self.return_url)
            .field("test_mode", &self.test_mode)
            .finish()
    }
}

impl Default for YooKassaConfig {
    fn default() -> Self {
        Self {
            shop_id: String::new(),
            secret_key: String::new(),
            base_url: "https://api.yookassa.ru".to_string(),
            return_url: "https://t.me".to_string(),
            receipt_email: "receipts@example.com".to_string(),
            receipt_phone: None,
            tax_system_code: 1,
            vat_code: 6,
            test_mode: false,
            create_timeout_secs: 20,
            status_timeout_secs: 15,
        }
    }
}

impl YooKassaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            shop_id: env::var("YOOKASSA_SHOP_ID")
                .map_err(|_| ConfigError::MissingVariable("YOOKASSA_SHOP_ID".to_string()))?,
            secret_key: env::var("YOOKASSA_SECRET_KEY")
                .map_err(|_| ConfigError::MissingVariable("YOOKASSA_SECRET_KEY".to_string()))?,
            base_url: env::var("YOOKASSA_BASE_URL").unwrap_or(defaults.base_url),
            return_url: env::var("YOOKASSA_RETURN_URL").unwrap_or(defaults.return_url),
            receipt_email: env::var("YOOKASSA_RECEIPT_EMAIL").unwrap_or(defaults.receipt_email),
            receipt_phone: env::var("YOOKASSA_RECEIPT_PHONE")
                .ok()
                .map(|raw| raw.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
                .filter(|digits| !digits.is_empty()),
            tax_system_code: env::var("YOOKASSA_TAX_SYSTEM_CODE")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("YOOKASSA_TAX_SYSTEM_CODE".to_string()))?,
            vat_code: env::var("YOOKASSA_VAT_CODE")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("YOOKASSA_VAT_CODE".to_string()))?,
            test_mode: matches!(
                env::var("YOOKASSA_TEST_MODE").as_deref(),
                Ok("1") | Ok("true")
            ),
            create_timeout_secs: env::var("YOOKASSA_TIMEOUT_SECS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("YOOKASSA_TIMEOUT_SECS".to_string()))?,
            status_timeout_secs: defaults.status_timeout_secs,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shop_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue("YOOKASSA_SHOP_ID".to_string()));
        }
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue("YOOKASSA_SECRET_KEY".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "YOOKASSA_BASE_URL must be a valid URL".to_string(),
            ));
        }
        if self.create_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("YOOKASSA_TIMEOUT_SECS".to_string()));
        }
        Ok(())
    }
}

pub struct YooKassaGateway {
    config: YooKassaConfig,
    http: PaymentHttpClient,
}

impl YooKassaGateway {
    pub fn new(config: YooKassaConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            PROVIDER,
            Duration::from_secs(config.create_timeout_secs),
        )?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn auth(&self) -> HttpAuth<'_> {
        HttpAuth::Basic {
            username: &self.config.shop_id,
            password: &self.config.secret_key,
        }
    }

    fn build_create_payload(&self, request: &CreatePaymentRequest) -> JsonValue {
        let description = truncate_description(&request.description);
        let amount = serde_json::json!({
            "value": request.amount.value_string(),
            "currency": request.amount.currency,
        });

        let mut customer = serde_json::json!({ "email": self.config.receipt_email });
        if let Some(phone) = &self.config.receipt_phone {
            customer["phone"] = JsonValue::String(phone.clone());
        }

        let mut payload = serde_json::json!({
            "amount": amount,
            "capture": true,
            "description": description,
            "metadata": request.metadata,
            "confirmation": {
                "type": "redirect",
                "return_url": self.config.return_url,
            },
            "receipt": {
                "customer": customer,
                "tax_system_code": self.config.tax_system_code,
                "items": [{
                    "description": description,
                    "amount": amount,
                    "quantity": "1.00",
                    "vat_code": self.config.vat_code,
                    "payment_mode": "full_prepayment",
                    "payment_subject": "service",
                }],
            },
        });
        if self.config.test_mode {
            payload["test"] = JsonValue::Bool(true);
        }
        payload
    }

    /// Confirm a held payment. Returns the status reported after capture.
    async fn capture(&self, payment: &YooPayment) -> PaymentResult<GatewayStatus> {
        let idempotence_key = Uuid::new_v4().to_string();
        let body = serde_json::json!({ "amount": payment.amount });
        let captured: YooPayment = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(&format!("/v3/payments/{}/capture", payment.id)),
                Some(self.auth()),
                Some(&body),
                &[("Idempotence-Key", idempotence_key.as_str())],
                None,
            )
            .await?;
        Ok(GatewayStatus::from_provider(&captured.status))
    }
}

#[async_trait]
impl PaymentGateway for YooKassaGateway {
    async fn create_payment(&self, request: CreatePaymentRequest) -> PaymentResult<PaymentHandle> {
        request.amount.validate_positive("amount")?;

        let payload = self.build_create_payload(&request);
        let idempotence_key = request.reference.to_string();

        let raw: YooPayment = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v3/payments"),
                Some(self.auth()),
                Some(&payload),
                &[("Idempotence-Key", idempotence_key.as_str())],
                Some(Duration::from_secs(self.config.create_timeout_secs)),
            )
            .await?;

        let confirmation_url = raw
            .confirmation
            .and_then(|c| c.confirmation_url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| PaymentError::ProviderError {
                provider: PROVIDER.to_string(),
                message: "payment created without a confirmation URL".to_string(),
                provider_code: None,
                retryable: false,
            })?;

        info!(attempt_id = %raw.id, reference = %request.reference, "yookassa payment created");

        Ok(PaymentHandle {
            attempt_id: raw.id,
            confirmation_url,
            status: GatewayStatus::from_provider(&raw.status),
        })
    }

    async fn payment_status(&self, attempt_id: &str) -> PaymentResult<StatusResponse> {
        if attempt_id.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "payment id is required".to_string(),
                field: Some("attempt_id".to_string()),
            });
        }

        let raw: YooPayment = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/v3/payments/{}", attempt_id)),
                Some(self.auth()),
                None,
                &[],
                Some(Duration::from_secs(self.config.status_timeout_secs)),
            )
            .await?;

        let mut status = GatewayStatus::from_provider(&raw.status);
        if needs_capture(status, raw.paid) {
            match self.capture(&raw).await {
                Ok(captured) => status = captured,
                Err(e) => {
                    warn!(attempt_id = attempt_id, error = %e, "capture failed, keeping reported status")
                }
            }
        }

        Ok(StatusResponse {
            attempt_id: raw.id,
            status,
            paid: raw.paid,
            amount: raw.amount.as_ref().and_then(YooAmount::to_money),
        })
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

fn needs_capture(status: GatewayStatus, paid: bool) -> bool {
    status == GatewayStatus::WaitingForCapture || (status == GatewayStatus::Pending && paid)
}

fn truncate_description(description: &str) -> String {
    description.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

#[derive(Debug, Deserialize)]
struct YooPayment {
    id: String,
    status: String,
    #[serde(default)]
    paid: bool,
    amount: Option<YooAmount>,
    confirmation: Option<YooConfirmation>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct YooAmount {
    value: String,
    currency: String,
}

impl YooAmount {
    fn to_money(&self) -> Option<Money> {
        Decimal::from_str(&self.value)
            .ok()
            .map(|amount| Money::new(amount, &self.currency))
    }
}

#[derive(Debug, Deserialize)]
struct YooConfirmation {
    confirmation_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gateway(config: YooKassaConfig) -> YooKassaGateway {
        YooKassaGateway::new(config).unwrap()
    }

    fn test_config() -> YooKassaConfig {
        YooKassaConfig {
            shop_id: "123456".to_string(),
            secret_key: "test_secret".to_string(),
            ..YooKassaConfig::default()
        }
    }

    fn request(description: &str) -> CreatePaymentRequest {
        CreatePaymentRequest {
            reference: Uuid::new_v4(),
            amount: Money::new(dec!(3740), "RUB"),
            description: description.to_string(),
            metadata: serde_json::json!({ "user_id": "42", "plan": "1m" }),
        }
    }

    #[test]
    fn create_payload_carries_receipt_and_capture() {
        let gw = gateway(test_config());
        let payload = gw.build_create_payload(&request("Subscription Netflix (1 mo.)"));

        assert_eq!(payload["amount"]["value"], "3740.00");
        assert_eq!(payload["amount"]["currency"], "RUB");
        assert_eq!(payload["capture"], true);
        assert_eq!(payload["confirmation"]["type"], "redirect");
        assert_eq!(payload["receipt"]["tax_system_code"], 1);
        assert_eq!(payload["receipt"]["items"][0]["vat_code"], 6);
        assert_eq!(
            payload["receipt"]["items"][0]["payment_mode"],
            "full_prepayment"
        );
        assert_eq!(payload["metadata"]["plan"], "1m");
        assert!(payload.get("test").is_none());
        assert!(payload["receipt"]["customer"].get("phone").is_none());
    }

    #[test]
    fn test_mode_and_phone_are_included() {
        let gw = gateway(YooKassaConfig {
            test_mode: true,
            receipt_phone: Some("79990001122".to_string()),
            ..test_config()
        });
        let payload = gw.build_create_payload(&request("x"));
        assert_eq!(payload["test"], true);
        assert_eq!(payload["receipt"]["customer"]["phone"], "79990001122");
    }

    #[test]
    fn long_description_is_truncated() {
        let gw = gateway(test_config());
        let long = "я".repeat(200);
        let payload = gw.build_create_payload(&request(&long));
        let description = payload["description"].as_str().unwrap();
        assert_eq!(description.chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn capture_is_needed_for_held_payments() {
        assert!(needs_capture(GatewayStatus::WaitingForCapture, false));
        assert!(needs_capture(GatewayStatus::Pending, true));
        assert!(!needs_capture(GatewayStatus::Pending, false));
        assert!(!needs_capture(GatewayStatus::Succeeded, true));
    }

    #[test]
    fn payment_response_deserializes() {
        let raw: YooPayment = serde_json::from_str(
            r#"{
                "id": "2d9a1c2e-000f-5000-8000-1b6b2f1b0c3a",
                "status": "pending",
                "paid": false,
                "amount": {"value": "3740.00", "currency": "RUB"},
                "confirmation": {"type": "redirect", "confirmation_url": "https://yoomoney.ru/checkout/x"}
            }"#,
        )
        .unwrap();
        assert_eq!(raw.status, "pending");
        assert_eq!(
            raw.amount.unwrap().to_money(),
            Some(Money::new(dec!(3740.00), "RUB"))
        );
        assert_eq!(
            raw.confirmation.unwrap().confirmation_url.as_deref(),
            Some("https://yoomoney.ru/checkout/x")
        );
    }

    #[test]
    fn config_validation() {
        assert!(test_config().validate().is_ok());
        assert!(YooKassaConfig::default().validate().is_err());
        let bad_url = YooKassaConfig {
            base_url: "api.yookassa.ru".to_string(),
            ..test_config()
        };
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("test_secret"));
    }
}
