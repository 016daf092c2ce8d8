use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use super::gateway_trait::{
    GatewayPaymentStatus, PaymentGateway, PaymentRequest, PaymentResponse, RefundRequest,
    RefundResponse, VerificationResult, WebhookHeaders, WebhookNotification,
};
use super::signatures;
use crate::config::GatewaySettings;
use crate::core::{AppError, Currency, Result};

/// Zapper QR payment gateway client
///
/// Zapper posts payment notifications signed with HMAC-SHA256 of the raw body
/// under the merchant API key, in the `x-zapper-signature` header.
pub struct ZapperGateway {
    settings: GatewaySettings,
}

impl ZapperGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        Self { settings }
    }
}

fn map_status(status: i32) -> GatewayPaymentStatus {
    // Zapper numeric payment statuses: 2 = paid, 3 = declined, 4 = cancelled
    match status {
        2 => GatewayPaymentStatus::Completed,
        3 => GatewayPaymentStatus::Failed,
        4 => GatewayPaymentStatus::Cancelled,
        _ => GatewayPaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for ZapperGateway {
    async fn initialize_payment(&self, request: PaymentRequest) -> Result<PaymentResponse> {
        // Zapper checkouts encode merchant/site and payment details into a
        // QR code URL scanned by the customer app.
        let redirect_url = format!(
            "https://www.zapper.com/url/?t=6&i={}:{}:{}&amount={}&reference={}",
            self.settings.merchant_id,
            self.settings.api_key,
            request.currency,
            request.currency.to_minor_units(request.amount),
            request.reference,
        );

        Ok(PaymentResponse {
            gateway_transaction_id: None,
            redirect_url: Some(redirect_url),
            instructions: None,
            status: GatewayPaymentStatus::Pending,
        })
    }

    async fn verify_payment(&self, _reference: &str) -> Result<VerificationResult> {
        Err(AppError::gateway(
            "Zapper settles asynchronously; no synchronous verification API",
        ))
    }

    async fn refund_payment(&self, _request: RefundRequest) -> Result<RefundResponse> {
        Err(AppError::refund(
            "Zapper refunds must be issued from the merchant dashboard",
        ))
    }

    fn verify_webhook(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<()> {
        let provided = headers
            .get("x-zapper-signature")
            .ok_or_else(|| AppError::signature("Missing x-zapper-signature header"))?;

        let expected = signatures::hmac_sha256_hex(&self.settings.api_key, body);
        if !signatures::constant_time_eq(&expected, provided) {
            return Err(AppError::signature("Zapper webhook signature mismatch"));
        }

        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookNotification> {
        let payment: ZapperPayment = serde_json::from_slice(body)
            .map_err(|e| AppError::callback(format!("Invalid Zapper webhook payload: {}", e)))?;

        let raw_payload: serde_json::Value = serde_json::from_slice(body)?;

        Ok(WebhookNotification {
            gateway_transaction_id: payment.payment_id,
            reference: payment.merchant_reference,
            amount: Decimal::from_str(&payment.amount).ok(),
            status: map_status(payment.payment_status),
            error_code: None,
            raw_payload,
        })
    }

    fn name(&self) -> &str {
        "zapper"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(currency, Currency::ZAR)
    }
}

#[derive(Debug, Deserialize)]
struct ZapperPayment {
    #[serde(rename = "paymentId")]
    payment_id: String,
    #[serde(rename = "merchantReference")]
    merchant_reference: String,
    amount: String,
    #[serde(rename = "paymentStatus")]
    payment_status: i32,
}
