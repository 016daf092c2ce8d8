use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::gateway_trait::{
    GatewayPaymentStatus, PaymentGateway, PaymentRequest, PaymentResponse, RefundRequest,
    RefundResponse, VerificationResult, WebhookHeaders, WebhookNotification,
};
use super::signatures;
use crate::config::GatewaySettings;
use crate::core::{AppError, Currency, Result};

/// PayStack payment gateway client
///
/// Webhook deliveries carry an `x-paystack-signature` header holding the
/// HMAC-SHA512 of the raw body under the secret key:
/// https://paystack.com/docs/payments/webhooks
pub struct PayStackGateway {
    client: Client,
    settings: GatewaySettings,
}

impl PayStackGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self { client, settings }
    }

    async fn read_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await.map_err(AppError::Network)?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "PayStack {} error - HTTP {} ({})",
                context,
                status.as_u16(),
                body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            AppError::gateway(format!("Failed to parse PayStack {} response: {}", context, e))
        })
    }
}

fn map_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "success" => GatewayPaymentStatus::Completed,
        "failed" => GatewayPaymentStatus::Failed,
        "abandoned" => GatewayPaymentStatus::Cancelled,
        "reversed" => GatewayPaymentStatus::Refunded,
        _ => GatewayPaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for PayStackGateway {
    async fn initialize_payment(&self, request: PaymentRequest) -> Result<PaymentResponse> {
        let url = format!("{}/transaction/initialize", self.settings.base_url);

        let email = request
            .customer_email
            .as_deref()
            .ok_or_else(|| AppError::validation("PayStack requires a customer email"))?;

        let body = json!({
            "reference": request.reference,
            "email": email,
            // PayStack amounts are in minor units (kobo/cents)
            "amount": request.currency.to_minor_units(request.amount),
            "currency": request.currency.to_string(),
            "callback_url": request.return_url,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("PayStack API request failed: {}", e)))?;

        let parsed: PayStackEnvelope<PayStackInitData> =
            self.read_response(response, "initialize").await?;

        Ok(PaymentResponse {
            gateway_transaction_id: Some(parsed.data.access_code),
            redirect_url: Some(parsed.data.authorization_url),
            instructions: None,
            status: GatewayPaymentStatus::Pending,
        })
    }

    async fn verify_payment(&self, reference: &str) -> Result<VerificationResult> {
        let url = format!("{}/transaction/verify/{}", self.settings.base_url, reference);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.settings.api_key)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("PayStack API request failed: {}", e)))?;

        let parsed: PayStackEnvelope<PayStackTransactionData> =
            self.read_response(response, "verify").await?;

        let amount = Decimal::from(parsed.data.amount) / Decimal::from(100);

        Ok(VerificationResult {
            gateway_transaction_id: Some(parsed.data.id.to_string()),
            status: map_status(&parsed.data.status),
            amount: Some(amount),
            error_code: parsed.data.gateway_response_code,
        })
    }

    async fn refund_payment(&self, request: RefundRequest) -> Result<RefundResponse> {
        let url = format!("{}/refund", self.settings.base_url);

        let body = json!({
            "transaction": request.gateway_transaction_id,
            "amount": request.currency.to_minor_units(request.amount),
            "merchant_note": request.reason,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("PayStack API request failed: {}", e)))?;

        let parsed: PayStackEnvelope<PayStackRefundData> =
            self.read_response(response, "refund").await?;

        Ok(RefundResponse {
            gateway_refund_id: Some(parsed.data.id.to_string()),
            status: GatewayPaymentStatus::Pending,
        })
    }

    fn verify_webhook(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<()> {
        let provided = headers
            .get("x-paystack-signature")
            .ok_or_else(|| AppError::signature("Missing x-paystack-signature header"))?;

        let expected = signatures::hmac_sha512_hex(&self.settings.api_key, body);
        if !signatures::constant_time_eq(&expected, provided) {
            return Err(AppError::signature("PayStack webhook signature mismatch"));
        }

        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookNotification> {
        let event: PayStackWebhookEvent = serde_json::from_slice(body)
            .map_err(|e| AppError::callback(format!("Invalid PayStack webhook payload: {}", e)))?;

        let status = match event.event.as_str() {
            "charge.success" => GatewayPaymentStatus::Completed,
            "charge.failed" => GatewayPaymentStatus::Failed,
            "refund.processed" => GatewayPaymentStatus::Refunded,
            _ => map_status(&event.data.status),
        };

        let raw_payload: serde_json::Value = serde_json::from_slice(body)?;

        Ok(WebhookNotification {
            gateway_transaction_id: event.data.id.to_string(),
            reference: event.data.reference,
            amount: Some(Decimal::from(event.data.amount) / Decimal::from(100)),
            status,
            error_code: event.data.gateway_response_code,
            raw_payload,
        })
    }

    fn name(&self) -> &str {
        "paystack"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(currency, Currency::ZAR | Currency::NGN | Currency::USD)
    }

    fn supports_recurring(&self) -> bool {
        true
    }
}

// PayStack API response structures

#[derive(Debug, Deserialize)]
struct PayStackEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct PayStackInitData {
    authorization_url: String,
    access_code: String,
}

#[derive(Debug, Deserialize)]
struct PayStackTransactionData {
    id: u64,
    status: String,
    amount: i64,
    #[serde(default, rename = "gateway_response")]
    gateway_response_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayStackRefundData {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct PayStackWebhookEvent {
    event: String,
    data: PayStackWebhookData,
}

#[derive(Debug, Deserialize)]
struct PayStackWebhookData {
    id: u64,
    reference: String,
    amount: i64,
    #[serde(default)]
    status: String,
    #[serde(default, rename = "gateway_response")]
    gateway_response_code: Option<String>,
}
