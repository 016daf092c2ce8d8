use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::gateway_trait::{
    GatewayPaymentStatus, PaymentGateway, PaymentRequest, PaymentResponse, RefundRequest,
    RefundResponse, VerificationResult, WebhookHeaders, WebhookNotification,
};
use super::signatures;
use crate::config::GatewaySettings;
use crate::core::{AppError, Currency, Result};

/// PayFast payment gateway client
///
/// PayFast settles asynchronously via ITN (Instant Transaction Notification)
/// posts. The ITN signature is an MD5 digest over the form parameters in the
/// order they were received, excluding the `signature` field, with the
/// merchant passphrase appended:
/// https://developers.payfast.co.za/docs#step_4_confirm_payment
pub struct PayFastGateway {
    settings: GatewaySettings,
}

impl PayFastGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        Self { settings }
    }

    /// Build the MD5 parameter string for a set of ordered form pairs.
    ///
    /// Pairs stay in received order and keep their original URL encoding;
    /// the `signature` pair is dropped and the passphrase appended last.
    fn signature_base(&self, raw_body: &str) -> String {
        let mut base: String = raw_body
            .split('&')
            .filter(|pair| !pair.starts_with("signature="))
            .collect::<Vec<_>>()
            .join("&");

        if let Some(passphrase) = &self.settings.passphrase {
            base.push_str("&passphrase=");
            base.push_str(passphrase);
        }

        base
    }

    fn compute_signature(&self, raw_body: &str) -> String {
        signatures::md5_hex(self.signature_base(raw_body).as_bytes())
    }
}

#[async_trait]
impl PaymentGateway for PayFastGateway {
    async fn initialize_payment(&self, request: PaymentRequest) -> Result<PaymentResponse> {
        // PayFast is redirect-based: the customer is sent to the process page
        // with the payment details as query parameters.
        let mut params: Vec<(String, String)> = vec![
            ("merchant_id".to_string(), self.settings.merchant_id.clone()),
            ("merchant_key".to_string(), self.settings.api_key.clone()),
            ("m_payment_id".to_string(), request.reference.clone()),
            ("amount".to_string(), format!("{:.2}", request.amount)),
            ("item_name".to_string(), request.description.clone()),
        ];

        if let Some(email) = &request.customer_email {
            params.push(("email_address".to_string(), email.clone()));
        }
        if let Some(url) = &request.return_url {
            params.push(("return_url".to_string(), url.clone()));
        }
        if let Some(url) = &request.cancel_url {
            params.push(("cancel_url".to_string(), url.clone()));
        }
        if let Some(url) = &request.notify_url {
            params.push(("notify_url".to_string(), url.clone()));
        }
        if request.is_subscription {
            params.push(("subscription_type".to_string(), "1".to_string()));
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let signature = self.compute_signature(&query);
        let redirect_url = format!(
            "{}/eng/process?{}&signature={}",
            self.settings.base_url, query, signature
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
            "PayFast settles asynchronously via ITN; no synchronous verification API",
        ))
    }

    async fn refund_payment(&self, _request: RefundRequest) -> Result<RefundResponse> {
        // PayFast refunds are initiated from the merchant dashboard; the
        // public API does not expose a refund call.
        Err(AppError::refund(
            "PayFast refunds must be issued from the merchant dashboard",
        ))
    }

    fn verify_webhook(&self, _headers: &WebhookHeaders, body: &[u8]) -> Result<()> {
        let raw_body = std::str::from_utf8(body)
            .map_err(|_| AppError::callback("PayFast ITN body is not valid UTF-8"))?;

        let fields = parse_form(raw_body);
        let provided = fields
            .iter()
            .find(|(k, _)| k == "signature")
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| AppError::signature("PayFast ITN missing signature field"))?;

        let expected = self.compute_signature(raw_body);
        if !signatures::constant_time_eq(&expected, provided) {
            return Err(AppError::signature("PayFast ITN signature mismatch"));
        }

        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookNotification> {
        let raw_body = std::str::from_utf8(body)
            .map_err(|_| AppError::callback("PayFast ITN body is not valid UTF-8"))?;
        let fields = parse_form(raw_body);

        let field = |name: &str| -> Option<String> {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };

        let gateway_transaction_id = field("pf_payment_id")
            .ok_or_else(|| AppError::callback("PayFast ITN missing pf_payment_id"))?;
        let reference = field("m_payment_id")
            .ok_or_else(|| AppError::callback("PayFast ITN missing m_payment_id"))?;
        let payment_status = field("payment_status")
            .ok_or_else(|| AppError::callback("PayFast ITN missing payment_status"))?;

        let status = match payment_status.as_str() {
            "COMPLETE" => GatewayPaymentStatus::Completed,
            "FAILED" => GatewayPaymentStatus::Failed,
            "CANCELLED" => GatewayPaymentStatus::Cancelled,
            _ => GatewayPaymentStatus::Pending,
        };

        let amount = field("amount_gross").and_then(|a| Decimal::from_str(&a).ok());

        let raw_payload = serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        );

        Ok(WebhookNotification {
            gateway_transaction_id,
            reference,
            amount,
            status,
            error_code: if status == GatewayPaymentStatus::Failed {
                field("reason")
            } else {
                None
            },
            raw_payload,
        })
    }

    fn name(&self) -> &str {
        "payfast"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(currency, Currency::ZAR)
    }

    fn supports_recurring(&self) -> bool {
        true
    }
}

/// Decode an application/x-www-form-urlencoded body, preserving field order
fn parse_form(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (urldecode(key), urldecode(value))
        })
        .collect()
}

fn urldecode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push((hi * 16 + lo) as u8);
                    i += 2;
                } else {
                    out.push(b'%');
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_gateway(passphrase: Option<&str>) -> PayFastGateway {
        PayFastGateway::new(GatewaySettings {
            enabled: true,
            merchant_id: "10000100".to_string(),
            api_key: "46f0cd694581a".to_string(),
            passphrase: passphrase.map(|p| p.to_string()),
            webhook_secret: String::new(),
            base_url: "https://sandbox.payfast.co.za".to_string(),
        })
    }

    fn signed_itn(gateway: &PayFastGateway, body: &str) -> String {
        let signature = gateway.compute_signature(body);
        format!("{}&signature={}", body, signature)
    }

    #[test]
    fn test_itn_signature_accepts_valid_body() {
        let gateway = test_gateway(Some("jt7NOE43FZPn"));
        let body = signed_itn(
            &gateway,
            "m_payment_id=TXN-1&pf_payment_id=1089250&payment_status=COMPLETE&amount_gross=100.00",
        );

        assert!(gateway
            .verify_webhook(&WebhookHeaders::new(), body.as_bytes())
            .is_ok());
    }

    #[test]
    fn test_itn_signature_rejects_tampered_amount() {
        let gateway = test_gateway(Some("jt7NOE43FZPn"));
        let body = signed_itn(
            &gateway,
            "m_payment_id=TXN-1&pf_payment_id=1089250&payment_status=COMPLETE&amount_gross=100.00",
        );
        let tampered = body.replace("100.00", "999.00");

        let result = gateway.verify_webhook(&WebhookHeaders::new(), tampered.as_bytes());
        assert!(matches!(result, Err(AppError::Signature(_))));
    }

    #[test]
    fn test_itn_signature_is_order_sensitive() {
        let gateway = test_gateway(None);
        let body = signed_itn(
            &gateway,
            "m_payment_id=TXN-1&pf_payment_id=1089250&payment_status=COMPLETE",
        );
        // Same fields, different order: digest must differ.
        let reordered = signed_itn(
            &gateway,
            "pf_payment_id=1089250&m_payment_id=TXN-1&payment_status=COMPLETE",
        );
        let (_, original_sig) = body.rsplit_once("signature=").unwrap();
        let (_, reordered_sig) = reordered.rsplit_once("signature=").unwrap();
        assert_ne!(original_sig, reordered_sig);
    }

    #[test]
    fn test_itn_missing_signature_rejected() {
        let gateway = test_gateway(None);
        let result = gateway.verify_webhook(
            &WebhookHeaders::new(),
            b"m_payment_id=TXN-1&payment_status=COMPLETE",
        );
        assert!(matches!(result, Err(AppError::Signature(_))));
    }

    #[test]
    fn test_parse_webhook_maps_complete_status() {
        let gateway = test_gateway(None);
        let body =
            "m_payment_id=TXN-9&pf_payment_id=555&payment_status=COMPLETE&amount_gross=150.00";

        let notification = gateway.parse_webhook(body.as_bytes()).unwrap();
        assert_eq!(notification.reference, "TXN-9");
        assert_eq!(notification.gateway_transaction_id, "555");
        assert_eq!(notification.status, GatewayPaymentStatus::Completed);
        assert_eq!(notification.amount, Some(dec!(150.00)));
    }

    #[tokio::test]
    async fn test_initialize_builds_signed_redirect() {
        let gateway = test_gateway(Some("jt7NOE43FZPn"));
        let response = gateway
            .initialize_payment(PaymentRequest {
                reference: "TXN-ABC".to_string(),
                amount: dec!(100.00),
                currency: Currency::ZAR,
                description: "Order 42".to_string(),
                customer_email: Some("buyer@example.com".to_string()),
                customer_name: None,
                return_url: Some("https://shop.example/return".to_string()),
                cancel_url: None,
                notify_url: Some("https://shop.example/webhook/payfast".to_string()),
                is_subscription: false,
            })
            .await
            .unwrap();

        let url = response.redirect_url.unwrap();
        assert!(url.starts_with("https://sandbox.payfast.co.za/eng/process?"));
        assert!(url.contains("m_payment_id=TXN-ABC"));
        assert!(url.contains("signature="));
        assert_eq!(response.status, GatewayPaymentStatus::Pending);
    }

    #[test]
    fn test_urldecode_roundtrip() {
        assert_eq!(urldecode("a%20b+c"), "a b c");
        assert_eq!(urlencode("a b&c"), "a+b%26c");
    }
}
