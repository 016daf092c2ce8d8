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

/// Ozow (instant EFT) payment gateway client
///
/// Ozow notifications carry a `Hash` field: the SHA512 of the notification
/// fields concatenated in documented order, lowercased, with the site's
/// private key appended:
/// https://docs.ozow.com/docs/response-hash-check
pub struct OzowGateway {
    client: Client,
    settings: GatewaySettings,
}

impl OzowGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self { client, settings }
    }

    /// SHA512 over the lowercased concatenation of `fields` + private key
    fn hash_fields(&self, fields: &[&str]) -> String {
        let mut concatenated: String = fields.concat();
        concatenated.push_str(&self.settings.webhook_secret);
        signatures::sha512_hex(concatenated.to_lowercase().as_bytes())
    }
}

fn map_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "Complete" => GatewayPaymentStatus::Completed,
        "Cancelled" => GatewayPaymentStatus::Cancelled,
        "Error" => GatewayPaymentStatus::Failed,
        "Abandoned" => GatewayPaymentStatus::Expired,
        _ => GatewayPaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for OzowGateway {
    async fn initialize_payment(&self, request: PaymentRequest) -> Result<PaymentResponse> {
        let url = format!("{}/postpaymentrequest", self.settings.base_url);

        let amount = format!("{:.2}", request.amount);
        let is_test = "false";
        let currency = request.currency.to_string();
        let success_url = request.return_url.clone().unwrap_or_default();
        let cancel_url = request.cancel_url.clone().unwrap_or_default();
        let notify_url = request.notify_url.clone().unwrap_or_default();

        // Request hash covers the fields in the order they are posted
        let hash_check = self.hash_fields(&[
            &self.settings.merchant_id,
            &currency,
            &amount,
            &request.reference,
            &cancel_url,
            &success_url,
            &notify_url,
            is_test,
        ]);

        let body = json!({
            "siteCode": self.settings.merchant_id,
            "countryCode": "ZA",
            "currencyCode": currency,
            "amount": amount,
            "transactionReference": request.reference,
            "cancelUrl": cancel_url,
            "successUrl": success_url,
            "notifyUrl": notify_url,
            "isTest": false,
            "hashCheck": hash_check,
        });

        let response = self
            .client
            .post(&url)
            .header("ApiKey", &self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Ozow API request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(AppError::Network)?;
        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Ozow API error - HTTP {} ({})",
                status.as_u16(),
                text
            )));
        }

        let parsed: OzowPaymentRequestResponse = serde_json::from_str(&text)
            .map_err(|e| AppError::gateway(format!("Failed to parse Ozow response: {}", e)))?;

        if let Some(error) = parsed.error_message {
            return Err(AppError::gateway(format!("Ozow rejected payment: {}", error)));
        }

        Ok(PaymentResponse {
            gateway_transaction_id: parsed.payment_request_id,
            redirect_url: parsed.url,
            instructions: None,
            status: GatewayPaymentStatus::Pending,
        })
    }

    async fn verify_payment(&self, reference: &str) -> Result<VerificationResult> {
        let url = format!(
            "{}/GetTransactionByReference?siteCode={}&transactionReference={}",
            self.settings.base_url, self.settings.merchant_id, reference
        );

        let response = self
            .client
            .get(&url)
            .header("ApiKey", &self.settings.api_key)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Ozow API request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(AppError::Network)?;
        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Ozow API error - HTTP {} ({})",
                status.as_u16(),
                text
            )));
        }

        let transactions: Vec<OzowTransaction> = serde_json::from_str(&text)
            .map_err(|e| AppError::gateway(format!("Failed to parse Ozow response: {}", e)))?;

        let transaction = transactions
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found(format!("Ozow transaction '{}'", reference)))?;

        Ok(VerificationResult {
            gateway_transaction_id: Some(transaction.transaction_id),
            status: map_status(&transaction.status),
            amount: Decimal::from_str(&transaction.amount).ok(),
            error_code: None,
        })
    }

    async fn refund_payment(&self, _request: RefundRequest) -> Result<RefundResponse> {
        Err(AppError::refund(
            "Ozow refunds must be issued from the merchant dashboard",
        ))
    }

    fn verify_webhook(&self, _headers: &WebhookHeaders, body: &[u8]) -> Result<()> {
        let notification: OzowNotification = serde_json::from_slice(body)
            .map_err(|e| AppError::callback(format!("Invalid Ozow notification: {}", e)))?;

        let provided = notification
            .hash
            .as_deref()
            .ok_or_else(|| AppError::signature("Ozow notification missing Hash field"))?;

        // Hash covers the notification fields in documented order
        let expected = self.hash_fields(&[
            &notification.site_code,
            &notification.transaction_id,
            &notification.transaction_reference,
            &notification.amount,
            &notification.status,
            &notification.optional1.clone().unwrap_or_default(),
            &notification.optional2.clone().unwrap_or_default(),
            &notification.optional3.clone().unwrap_or_default(),
            &notification.optional4.clone().unwrap_or_default(),
            &notification.optional5.clone().unwrap_or_default(),
            &notification.currency_code,
            &notification.is_test.to_string(),
            &notification.status_message.clone().unwrap_or_default(),
        ]);

        if !signatures::constant_time_eq(&expected, &provided.to_lowercase()) {
            return Err(AppError::signature("Ozow notification hash mismatch"));
        }

        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookNotification> {
        let notification: OzowNotification = serde_json::from_slice(body)
            .map_err(|e| AppError::callback(format!("Invalid Ozow notification: {}", e)))?;

        let raw_payload: serde_json::Value = serde_json::from_slice(body)?;
        let status = map_status(&notification.status);

        Ok(WebhookNotification {
            gateway_transaction_id: notification.transaction_id,
            reference: notification.transaction_reference,
            amount: Decimal::from_str(&notification.amount).ok(),
            status,
            error_code: if status == GatewayPaymentStatus::Failed {
                notification.status_message
            } else {
                None
            },
            raw_payload,
        })
    }

    fn name(&self) -> &str {
        "ozow"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(currency, Currency::ZAR)
    }
}

// Ozow API structures

#[derive(Debug, Deserialize)]
struct OzowPaymentRequestResponse {
    #[serde(rename = "paymentRequestId")]
    payment_request_id: Option<String>,
    url: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OzowTransaction {
    #[serde(rename = "transactionId")]
    transaction_id: String,
    status: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OzowNotification {
    site_code: String,
    transaction_id: String,
    transaction_reference: String,
    amount: String,
    status: String,
    optional1: Option<String>,
    optional2: Option<String>,
    optional3: Option<String>,
    optional4: Option<String>,
    optional5: Option<String>,
    currency_code: String,
    is_test: bool,
    status_message: Option<String>,
    hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gateway() -> OzowGateway {
        OzowGateway::new(GatewaySettings {
            enabled: true,
            merchant_id: "TSTSTE0001".to_string(),
            api_key: "api-key".to_string(),
            passphrase: None,
            webhook_secret: "215114531AFF7134A94C88CEEA48E".to_string(),
            base_url: "https://api.ozow.com".to_string(),
        })
    }

    fn notification_json(gateway: &OzowGateway, status: &str, amount: &str) -> String {
        let hash = gateway.hash_fields(&[
            "TSTSTE0001",
            "ozow-tx-1",
            "TXN-77",
            amount,
            status,
            "",
            "",
            "",
            "",
            "",
            "ZAR",
            "false",
            "",
        ]);

        format!(
            r#"{{"SiteCode":"TSTSTE0001","TransactionId":"ozow-tx-1","TransactionReference":"TXN-77","Amount":"{}","Status":"{}","Optional1":null,"Optional2":null,"Optional3":null,"Optional4":null,"Optional5":null,"CurrencyCode":"ZAR","IsTest":false,"StatusMessage":null,"Hash":"{}"}}"#,
            amount, status, hash
        )
    }

    #[test]
    fn test_notification_accepts_valid_hash() {
        let gateway = test_gateway();
        let body = notification_json(&gateway, "Complete", "100.00");

        assert!(gateway
            .verify_webhook(&WebhookHeaders::new(), body.as_bytes())
            .is_ok());
    }

    #[test]
    fn test_notification_rejects_tampered_status() {
        let gateway = test_gateway();
        let body = notification_json(&gateway, "Complete", "100.00").replace("Complete", "Error");

        let result = gateway.verify_webhook(&WebhookHeaders::new(), body.as_bytes());
        assert!(matches!(result, Err(AppError::Signature(_))));
    }

    #[test]
    fn test_parse_notification_maps_statuses() {
        let gateway = test_gateway();

        let complete = notification_json(&gateway, "Complete", "100.00");
        let parsed = gateway.parse_webhook(complete.as_bytes()).unwrap();
        assert_eq!(parsed.status, GatewayPaymentStatus::Completed);
        assert_eq!(parsed.reference, "TXN-77");

        let abandoned = notification_json(&gateway, "Abandoned", "100.00");
        let parsed = gateway.parse_webhook(abandoned.as_bytes()).unwrap();
        assert_eq!(parsed.status, GatewayPaymentStatus::Expired);
    }

    #[test]
    fn test_zar_only() {
        let gateway = test_gateway();
        assert!(gateway.supports_currency(Currency::ZAR));
        assert!(!gateway.supports_currency(Currency::USD));
    }
}
