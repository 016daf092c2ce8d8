use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use super::gateway_trait::{
    GatewayPaymentStatus, PaymentGateway, PaymentRequest, PaymentResponse, RefundRequest,
    RefundResponse, VerificationResult, WebhookHeaders, WebhookNotification,
};
use super::signatures;
use crate::config::GatewaySettings;
use crate::core::{AppError, Currency, Result};

/// Replay window for webhook timestamps, in seconds
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Stripe payment gateway client
///
/// Webhook deliveries carry a `Stripe-Signature: t=<ts>,v1=<sig>` header; the
/// signature is HMAC-SHA256 over `"{ts}.{raw_body}"` under the endpoint
/// secret, with a five minute timestamp tolerance:
/// https://stripe.com/docs/webhooks/signatures
pub struct StripeGateway {
    client: Client,
    settings: GatewaySettings,
}

impl StripeGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self { client, settings }
    }
}

/// Parse a `t=<ts>,v1=<sig>` signature header
fn parse_signature_header(header: &str) -> Result<(i64, String)> {
    let mut timestamp = None;
    let mut v1_signature = None;

    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => v1_signature = Some(value.to_string()),
            _ => {}
        }
    }

    match (timestamp, v1_signature) {
        (Some(t), Some(sig)) => Ok((t, sig)),
        _ => Err(AppError::signature(
            "Malformed Stripe-Signature header (expected t=..,v1=..)",
        )),
    }
}

fn map_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "succeeded" => GatewayPaymentStatus::Completed,
        "requires_capture" => GatewayPaymentStatus::Authorized,
        "canceled" => GatewayPaymentStatus::Cancelled,
        "payment_failed" => GatewayPaymentStatus::Failed,
        _ => GatewayPaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn initialize_payment(&self, request: PaymentRequest) -> Result<PaymentResponse> {
        let url = format!("{}/v1/payment_intents", self.settings.base_url);

        // Stripe's API is form-encoded; amounts are in minor units.
        let amount = request.currency.to_minor_units(request.amount).to_string();
        let currency = request.currency.to_string().to_lowercase();
        let mut form: Vec<(&str, String)> = vec![
            ("amount", amount),
            ("currency", currency),
            ("description", request.description.clone()),
            ("metadata[reference]", request.reference.clone()),
        ];
        if let Some(email) = &request.customer_email {
            form.push(("receipt_email", email.clone()));
        }

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.settings.api_key, Some(""))
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Stripe API request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(AppError::Network)?;
        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Stripe API error - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let intent: StripePaymentIntent = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(PaymentResponse {
            gateway_transaction_id: Some(intent.id),
            redirect_url: None,
            instructions: intent.client_secret,
            status: map_status(&intent.status),
        })
    }

    async fn verify_payment(&self, reference: &str) -> Result<VerificationResult> {
        // `reference` here is the PaymentIntent id recorded at initialization
        let url = format!("{}/v1/payment_intents/{}", self.settings.base_url, reference);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.settings.api_key, Some(""))
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Stripe API request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(AppError::Network)?;
        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Stripe API error - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let intent: StripePaymentIntent = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(VerificationResult {
            gateway_transaction_id: Some(intent.id),
            status: map_status(&intent.status),
            amount: intent
                .amount
                .map(|minor| Decimal::from(minor) / Decimal::from(100)),
            error_code: intent.last_payment_error.map(|e| e.code),
        })
    }

    async fn refund_payment(&self, request: RefundRequest) -> Result<RefundResponse> {
        let url = format!("{}/v1/refunds", self.settings.base_url);

        let form = vec![
            ("payment_intent", request.gateway_transaction_id.clone()),
            (
                "amount",
                request.currency.to_minor_units(request.amount).to_string(),
            ),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.settings.api_key, Some(""))
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Stripe API request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(AppError::Network)?;
        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Stripe refund error - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let refund: StripeRefund = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(RefundResponse {
            gateway_refund_id: Some(refund.id),
            status: if refund.status == "succeeded" {
                GatewayPaymentStatus::Refunded
            } else {
                GatewayPaymentStatus::Pending
            },
        })
    }

    fn verify_webhook(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<()> {
        let header = headers
            .get("stripe-signature")
            .ok_or_else(|| AppError::signature("Missing Stripe-Signature header"))?;

        let (timestamp, v1_signature) = parse_signature_header(header)?;

        let age = (Utc::now().timestamp() - timestamp).abs();
        if age > TIMESTAMP_TOLERANCE_SECS {
            return Err(AppError::signature(format!(
                "Stripe webhook timestamp outside tolerance ({}s old)",
                age
            )));
        }

        let payload = std::str::from_utf8(body)
            .map_err(|_| AppError::callback("Stripe webhook body is not valid UTF-8"))?;
        let signed_payload = format!("{}.{}", timestamp, payload);
        let expected =
            signatures::hmac_sha256_hex(&self.settings.webhook_secret, signed_payload.as_bytes());

        if !signatures::constant_time_eq(&expected, &v1_signature) {
            return Err(AppError::signature("Stripe webhook signature mismatch"));
        }

        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookNotification> {
        let event: StripeEvent = serde_json::from_slice(body)
            .map_err(|e| AppError::callback(format!("Invalid Stripe webhook payload: {}", e)))?;

        let object = event.data.object;
        let status = match event.event_type.as_str() {
            "payment_intent.succeeded" => GatewayPaymentStatus::Completed,
            "payment_intent.payment_failed" => GatewayPaymentStatus::Failed,
            "payment_intent.canceled" => GatewayPaymentStatus::Cancelled,
            "charge.refunded" => GatewayPaymentStatus::Refunded,
            _ => map_status(&object.status),
        };

        let reference = object
            .metadata
            .as_ref()
            .and_then(|m| m.get("reference"))
            .and_then(|r| r.as_str())
            .unwrap_or(&object.id)
            .to_string();

        let raw_payload: serde_json::Value = serde_json::from_slice(body)?;

        Ok(WebhookNotification {
            gateway_transaction_id: object.id,
            reference,
            amount: object
                .amount
                .map(|minor| Decimal::from(minor) / Decimal::from(100)),
            status,
            error_code: object.last_payment_error.map(|e| e.code),
            raw_payload,
        })
    }

    fn name(&self) -> &str {
        "stripe"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(
            currency,
            Currency::ZAR | Currency::USD | Currency::EUR | Currency::GBP
        )
    }

    fn supports_recurring(&self) -> bool {
        true
    }
}

// Stripe API response structures

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    status: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    last_payment_error: Option<StripeError>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    code: String,
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripePaymentIntent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gateway() -> StripeGateway {
        StripeGateway::new(GatewaySettings {
            enabled: true,
            merchant_id: String::new(),
            api_key: "sk_test_key".to_string(),
            passphrase: None,
            webhook_secret: "whsec_test".to_string(),
            base_url: "https://api.stripe.com".to_string(),
        })
    }

    fn event_body() -> &'static str {
        r#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_123","status":"succeeded","amount":10000,"metadata":{"reference":"TXN-42"}}}}"#
    }

    fn signed_headers(body: &str, secret: &str, timestamp: i64) -> WebhookHeaders {
        let signed_payload = format!("{}.{}", timestamp, body);
        let signature = signatures::hmac_sha256_hex(secret, signed_payload.as_bytes());
        let mut headers = WebhookHeaders::new();
        headers.insert(
            "Stripe-Signature",
            format!("t={},v1={}", timestamp, signature),
        );
        headers
    }

    #[test]
    fn test_parse_signature_header() {
        let (t, v1) = parse_signature_header("t=1609459200,v1=abcdef").unwrap();
        assert_eq!(t, 1609459200);
        assert_eq!(v1, "abcdef");
    }

    #[test]
    fn test_parse_signature_header_invalid() {
        assert!(parse_signature_header("garbage").is_err());
        assert!(parse_signature_header("t=123").is_err());
    }

    #[test]
    fn test_webhook_accepts_fresh_valid_signature() {
        let gateway = test_gateway();
        let body = event_body();
        let headers = signed_headers(body, "whsec_test", Utc::now().timestamp());

        assert!(gateway.verify_webhook(&headers, body.as_bytes()).is_ok());
    }

    #[test]
    fn test_webhook_rejects_stale_timestamp() {
        let gateway = test_gateway();
        let body = event_body();
        let stale = Utc::now().timestamp() - TIMESTAMP_TOLERANCE_SECS - 60;
        let headers = signed_headers(body, "whsec_test", stale);

        let result = gateway.verify_webhook(&headers, body.as_bytes());
        assert!(matches!(result, Err(AppError::Signature(_))));
    }

    #[test]
    fn test_webhook_rejects_wrong_secret() {
        let gateway = test_gateway();
        let body = event_body();
        let headers = signed_headers(body, "whsec_wrong", Utc::now().timestamp());

        let result = gateway.verify_webhook(&headers, body.as_bytes());
        assert!(matches!(result, Err(AppError::Signature(_))));
    }

    #[test]
    fn test_parse_webhook_extracts_metadata_reference() {
        let gateway = test_gateway();
        let notification = gateway.parse_webhook(event_body().as_bytes()).unwrap();

        assert_eq!(notification.reference, "TXN-42");
        assert_eq!(notification.gateway_transaction_id, "pi_123");
        assert_eq!(notification.status, GatewayPaymentStatus::Completed);
        assert_eq!(notification.amount, Some(Decimal::new(10000, 2)));
    }
}
