use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;

use super::gateway_trait::{
    GatewayPaymentStatus, PaymentGateway, PaymentRequest, PaymentResponse, RefundRequest,
    RefundResponse, VerificationResult, WebhookHeaders, WebhookNotification,
};
use super::signatures;
use crate::config::GatewaySettings;
use crate::core::{AppError, Currency, Result};

/// Cryptocurrency payment processor client
///
/// The processor signs callbacks with HMAC-SHA512 of the raw body under the
/// shared callback secret, in the `x-processor-signature` header.
pub struct CryptoGateway {
    client: Client,
    settings: GatewaySettings,
}

impl CryptoGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self { client, settings }
    }
}

fn map_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "paid" | "confirmed" => GatewayPaymentStatus::Completed,
        "invalid" | "failed" => GatewayPaymentStatus::Failed,
        "expired" => GatewayPaymentStatus::Expired,
        "canceled" => GatewayPaymentStatus::Cancelled,
        _ => GatewayPaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for CryptoGateway {
    async fn initialize_payment(&self, request: PaymentRequest) -> Result<PaymentResponse> {
        let url = format!("{}/v2/orders", self.settings.base_url);

        let body = json!({
            "order_id": request.reference,
            "price_amount": format!("{:.2}", request.amount),
            "price_currency": request.currency.to_string(),
            "title": request.description,
            "callback_url": request.notify_url,
            "success_url": request.return_url,
            "cancel_url": request.cancel_url,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.settings.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Crypto processor request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(AppError::Network)?;
        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Crypto processor error - HTTP {} ({})",
                status.as_u16(),
                text
            )));
        }

        let order: CryptoOrder = serde_json::from_str(&text).map_err(|e| {
            AppError::gateway(format!("Failed to parse crypto processor response: {}", e))
        })?;

        Ok(PaymentResponse {
            gateway_transaction_id: Some(order.id.to_string()),
            redirect_url: order.payment_url,
            instructions: None,
            status: GatewayPaymentStatus::Pending,
        })
    }

    async fn verify_payment(&self, reference: &str) -> Result<VerificationResult> {
        let url = format!("{}/v2/orders/{}", self.settings.base_url, reference);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.settings.api_key))
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Crypto processor request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(AppError::Network)?;
        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Crypto processor error - HTTP {} ({})",
                status.as_u16(),
                text
            )));
        }

        let order: CryptoOrder = serde_json::from_str(&text).map_err(|e| {
            AppError::gateway(format!("Failed to parse crypto processor response: {}", e))
        })?;

        Ok(VerificationResult {
            gateway_transaction_id: Some(order.id.to_string()),
            status: map_status(&order.status),
            amount: order
                .price_amount
                .as_deref()
                .and_then(|a| Decimal::from_str(a).ok()),
            error_code: None,
        })
    }

    async fn refund_payment(&self, _request: RefundRequest) -> Result<RefundResponse> {
        // On-chain settlements are final; refunds are manual payouts.
        Err(AppError::refund(
            "Crypto payments are settled on-chain and cannot be refunded automatically",
        ))
    }

    fn verify_webhook(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<()> {
        let provided = headers
            .get("x-processor-signature")
            .ok_or_else(|| AppError::signature("Missing x-processor-signature header"))?;

        let expected = signatures::hmac_sha512_hex(&self.settings.webhook_secret, body);
        if !signatures::constant_time_eq(&expected, provided) {
            return Err(AppError::signature("Crypto callback signature mismatch"));
        }

        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookNotification> {
        let callback: CryptoCallback = serde_json::from_slice(body)
            .map_err(|e| AppError::callback(format!("Invalid crypto callback payload: {}", e)))?;

        let raw_payload: serde_json::Value = serde_json::from_slice(body)?;

        Ok(WebhookNotification {
            gateway_transaction_id: callback.id.to_string(),
            reference: callback.order_id,
            amount: callback
                .price_amount
                .as_deref()
                .and_then(|a| Decimal::from_str(a).ok()),
            status: map_status(&callback.status),
            error_code: None,
            raw_payload,
        })
    }

    fn name(&self) -> &str {
        "crypto"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(currency, Currency::ZAR | Currency::USD | Currency::EUR)
    }
}

#[derive(Debug, Deserialize)]
struct CryptoOrder {
    id: u64,
    status: String,
    #[serde(default)]
    payment_url: Option<String>,
    #[serde(default)]
    price_amount: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CryptoCallback {
    id: u64,
    order_id: String,
    status: String,
    #[serde(default)]
    price_amount: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gateway() -> CryptoGateway {
        CryptoGateway::new(GatewaySettings {
            enabled: true,
            merchant_id: String::new(),
            api_key: "token".to_string(),
            passphrase: None,
            webhook_secret: "cb-secret".to_string(),
            base_url: "https://api.coingate.com".to_string(),
        })
    }

    const BODY: &str = r#"{"id":912,"order_id":"TXN-20","status":"paid","price_amount":"500.00"}"#;

    #[test]
    fn test_callback_signature_round_trip() {
        let gateway = test_gateway();
        let signature = signatures::hmac_sha512_hex("cb-secret", BODY.as_bytes());
        let mut headers = WebhookHeaders::new();
        headers.insert("x-processor-signature", signature);

        assert!(gateway.verify_webhook(&headers, BODY.as_bytes()).is_ok());
    }

    #[test]
    fn test_callback_rejects_wrong_secret() {
        let gateway = test_gateway();
        let signature = signatures::hmac_sha512_hex("other-secret", BODY.as_bytes());
        let mut headers = WebhookHeaders::new();
        headers.insert("x-processor-signature", signature);

        let result = gateway.verify_webhook(&headers, BODY.as_bytes());
        assert!(matches!(result, Err(AppError::Signature(_))));
    }

    #[test]
    fn test_parse_callback_maps_paid() {
        let gateway = test_gateway();
        let notification = gateway.parse_webhook(BODY.as_bytes()).unwrap();
        assert_eq!(notification.status, GatewayPaymentStatus::Completed);
        assert_eq!(notification.reference, "TXN-20");
    }
}
