use async_trait::async_trait;
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

/// SnapScan QR payment gateway client
///
/// SnapScan signs webhook deliveries with HMAC-SHA256 of the raw body under
/// the webhook auth key, sent in the `x-signature` header:
/// https://developer.getsnapscan.com/#webhooks
pub struct SnapScanGateway {
    client: Client,
    settings: GatewaySettings,
}

impl SnapScanGateway {
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
        "completed" => GatewayPaymentStatus::Completed,
        "error" | "failed" => GatewayPaymentStatus::Failed,
        _ => GatewayPaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for SnapScanGateway {
    async fn initialize_payment(&self, request: PaymentRequest) -> Result<PaymentResponse> {
        // SnapScan checkouts are QR links parameterized by merchant id,
        // amount in cents and the merchant reference.
        let redirect_url = format!(
            "https://pos.snapscan.io/qr/{}?id={}&amount={}",
            self.settings.merchant_id,
            request.reference,
            request.currency.to_minor_units(request.amount),
        );

        Ok(PaymentResponse {
            gateway_transaction_id: None,
            redirect_url: Some(redirect_url),
            instructions: None,
            status: GatewayPaymentStatus::Pending,
        })
    }

    async fn verify_payment(&self, reference: &str) -> Result<VerificationResult> {
        let url = format!(
            "{}/merchant/api/v1/payments?merchantReference={}",
            self.settings.base_url, reference
        );

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.settings.api_key, Some(""))
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("SnapScan API request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(AppError::Network)?;
        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "SnapScan API error - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let payments: Vec<SnapScanPayment> = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse SnapScan response: {}", e)))?;

        let payment = payments
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found(format!("SnapScan payment '{}'", reference)))?;

        Ok(VerificationResult {
            gateway_transaction_id: Some(payment.id.to_string()),
            status: map_status(&payment.status),
            amount: Some(Decimal::from(payment.total_amount) / Decimal::from(100)),
            error_code: None,
        })
    }

    async fn refund_payment(&self, _request: RefundRequest) -> Result<RefundResponse> {
        Err(AppError::refund(
            "SnapScan refunds must be issued from the merchant dashboard",
        ))
    }

    fn verify_webhook(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<()> {
        let provided = headers
            .get("x-signature")
            .ok_or_else(|| AppError::signature("Missing x-signature header"))?;

        let expected = signatures::hmac_sha256_hex(&self.settings.webhook_secret, body);
        if !signatures::constant_time_eq(&expected, provided) {
            return Err(AppError::signature("SnapScan webhook signature mismatch"));
        }

        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookNotification> {
        let payment: SnapScanPayment = serde_json::from_slice(body)
            .map_err(|e| AppError::callback(format!("Invalid SnapScan webhook payload: {}", e)))?;

        let reference = payment
            .merchant_reference
            .clone()
            .ok_or_else(|| AppError::callback("SnapScan webhook missing merchantReference"))?;

        let raw_payload: serde_json::Value = serde_json::from_slice(body)?;

        Ok(WebhookNotification {
            gateway_transaction_id: payment.id.to_string(),
            reference,
            amount: Some(Decimal::from(payment.total_amount) / Decimal::from(100)),
            status: map_status(&payment.status),
            error_code: None,
            raw_payload,
        })
    }

    fn name(&self) -> &str {
        "snapscan"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(currency, Currency::ZAR)
    }
}

#[derive(Debug, Deserialize)]
struct SnapScanPayment {
    id: u64,
    status: String,
    #[serde(rename = "totalAmount")]
    total_amount: i64,
    #[serde(rename = "merchantReference")]
    merchant_reference: Option<String>,
}
