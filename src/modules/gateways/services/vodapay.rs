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

/// VodaPay mini-program payment gateway client
///
/// VodaPay notifications are signed with HMAC-SHA256 of the raw body under
/// the merchant webhook secret, in the `x-vodapay-signature` header.
pub struct VodaPayGateway {
    settings: GatewaySettings,
}

impl VodaPayGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        Self { settings }
    }
}

fn map_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "SUCCESS" => GatewayPaymentStatus::Completed,
        "FAIL" => GatewayPaymentStatus::Failed,
        "CLOSED" => GatewayPaymentStatus::Cancelled,
        _ => GatewayPaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for VodaPayGateway {
    async fn initialize_payment(&self, request: PaymentRequest) -> Result<PaymentResponse> {
        let redirect_url = format!(
            "{}/pay?merchantId={}&paymentRequestId={}&amount={}&currency={}",
            self.settings.base_url,
            self.settings.merchant_id,
            request.reference,
            request.currency.to_minor_units(request.amount),
            request.currency,
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
            "VodaPay settles asynchronously; no synchronous verification API",
        ))
    }

    async fn refund_payment(&self, _request: RefundRequest) -> Result<RefundResponse> {
        Err(AppError::refund(
            "VodaPay refunds must be issued from the merchant portal",
        ))
    }

    fn verify_webhook(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<()> {
        let provided = headers
            .get("x-vodapay-signature")
            .ok_or_else(|| AppError::signature("Missing x-vodapay-signature header"))?;

        let expected = signatures::hmac_sha256_hex(&self.settings.webhook_secret, body);
        if !signatures::constant_time_eq(&expected, provided) {
            return Err(AppError::signature("VodaPay webhook signature mismatch"));
        }

        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookNotification> {
        let payment: VodaPayNotification = serde_json::from_slice(body)
            .map_err(|e| AppError::callback(format!("Invalid VodaPay webhook payload: {}", e)))?;

        let raw_payload: serde_json::Value = serde_json::from_slice(body)?;
        let status = map_status(&payment.payment_status);

        Ok(WebhookNotification {
            gateway_transaction_id: payment.payment_id,
            reference: payment.payment_request_id,
            amount: Decimal::from_str(&payment.payment_amount.value).ok(),
            status,
            error_code: if status == GatewayPaymentStatus::Failed {
                payment.payment_result_code
            } else {
                None
            },
            raw_payload,
        })
    }

    fn name(&self) -> &str {
        "vodapay"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(currency, Currency::ZAR)
    }
}

#[derive(Debug, Deserialize)]
struct VodaPayNotification {
    #[serde(rename = "paymentId")]
    payment_id: String,
    #[serde(rename = "paymentRequestId")]
    payment_request_id: String,
    #[serde(rename = "paymentStatus")]
    payment_status: String,
    #[serde(rename = "paymentAmount")]
    payment_amount: VodaPayAmount,
    #[serde(rename = "paymentResultCode")]
    payment_result_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VodaPayAmount {
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gateway() -> VodaPayGateway {
        VodaPayGateway::new(GatewaySettings {
            enabled: true,
            merchant_id: "M001".to_string(),
            api_key: "voda-key".to_string(),
            passphrase: None,
            webhook_secret: "voda-secret".to_string(),
            base_url: "https://api.vodapay.vodacom.co.za".to_string(),
        })
    }

    const BODY: &str = r#"{"paymentId":"vp-1","paymentRequestId":"TXN-12","paymentStatus":"SUCCESS","paymentAmount":{"value":"250.00"}}"#;

    #[test]
    fn test_webhook_signature_round_trip() {
        let gateway = test_gateway();
        let signature = signatures::hmac_sha256_hex("voda-secret", BODY.as_bytes());
        let mut headers = WebhookHeaders::new();
        headers.insert("x-vodapay-signature", signature);

        assert!(gateway.verify_webhook(&headers, BODY.as_bytes()).is_ok());
    }

    #[test]
    fn test_webhook_rejects_missing_header() {
        let gateway = test_gateway();
        let result = gateway.verify_webhook(&WebhookHeaders::new(), BODY.as_bytes());
        assert!(matches!(result, Err(AppError::Signature(_))));
    }

    #[test]
    fn test_parse_webhook() {
        let gateway = test_gateway();
        let notification = gateway.parse_webhook(BODY.as_bytes()).unwrap();
        assert_eq!(notification.reference, "TXN-12");
        assert_eq!(notification.status, GatewayPaymentStatus::Completed);
        assert_eq!(notification.amount, Some(Decimal::new(25000, 2)));
    }
}
