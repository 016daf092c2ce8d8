use crate::core::{Currency, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Payment gateway trait for initializing payments, verifying outcomes and
/// authenticating webhooks
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment with the gateway and return redirect/checkout details
    async fn initialize_payment(&self, request: PaymentRequest) -> Result<PaymentResponse>;

    /// Query the gateway for the current state of a payment
    async fn verify_payment(&self, reference: &str) -> Result<VerificationResult>;

    /// Request a (partial) refund of a settled payment
    async fn refund_payment(&self, request: RefundRequest) -> Result<RefundResponse>;

    /// Locally computable portion of the vendor's webhook signature scheme.
    ///
    /// Must be side-effect free: a rejected delivery never touches storage.
    fn verify_webhook(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<()>;

    /// Authenticate a webhook delivery end to end.
    ///
    /// Most schemes verify entirely locally, so the default defers to
    /// [`verify_webhook`](Self::verify_webhook). Gateways whose vendor
    /// requires an API round-trip (PayPal) override this; passing the
    /// local checks alone must never authenticate a delivery for them.
    async fn verify_webhook_delivery(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<()> {
        self.verify_webhook(headers, body)
    }

    /// Extract payment outcome from an already-authenticated webhook body
    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookNotification>;

    /// Gateway identifier (payfast, paystack, ...)
    fn name(&self) -> &str;

    /// Check if gateway supports a currency
    fn supports_currency(&self, currency: Currency) -> bool;

    /// Whether the gateway can drive recurring billing
    fn supports_recurring(&self) -> bool {
        false
    }

    /// Whether the gateway delivers asynchronous webhooks at all
    fn supports_webhooks(&self) -> bool {
        true
    }
}

/// Case-insensitive view over the webhook delivery headers
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    headers: HashMap<String, String>,
}

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: String) {
        self.headers.insert(name.to_ascii_lowercase(), value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }
}

impl FromIterator<(String, String)> for WebhookHeaders {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = WebhookHeaders::new();
        for (name, value) in iter {
            headers.insert(&name, value);
        }
        headers
    }
}

/// Payment request data passed to a gateway driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Merchant reference (TXN-...)
    pub reference: String,

    /// Payment amount
    pub amount: Decimal,

    /// Currency
    pub currency: Currency,

    /// Description shown to the customer
    pub description: String,

    /// Customer contact
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,

    /// Redirect URLs
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,

    /// Webhook delivery URL for this payment
    pub notify_url: Option<String>,

    /// Whether this payment opens a recurring agreement
    pub is_subscription: bool,
}

/// Response from gateway after payment initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    /// Gateway transaction identifier, when assigned at initialization
    pub gateway_transaction_id: Option<String>,

    /// URL the customer must be redirected to, if the flow is redirect-based
    pub redirect_url: Option<String>,

    /// Manual payment instructions (EFT bank details)
    pub instructions: Option<String>,

    /// Initial payment status
    pub status: GatewayPaymentStatus,
}

/// Result of an explicit verification call against the gateway API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub gateway_transaction_id: Option<String>,
    pub status: GatewayPaymentStatus,
    pub amount: Option<Decimal>,
    pub error_code: Option<String>,
}

/// Refund request data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub gateway_transaction_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub reason: Option<String>,
}

/// Refund response from gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResponse {
    pub gateway_refund_id: Option<String>,
    pub status: GatewayPaymentStatus,
}

/// Payment status as reported by a gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentStatus {
    Pending,
    Authorized,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    Expired,
}

/// Payment outcome carried by an authenticated webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotification {
    /// Gateway transaction identifier
    pub gateway_transaction_id: String,

    /// Merchant reference (TXN-...) echoed back by the gateway
    pub reference: String,

    /// Amount reported by the gateway, when present
    pub amount: Option<Decimal>,

    /// Mapped payment status
    pub status: GatewayPaymentStatus,

    /// Vendor error code on failures
    pub error_code: Option<String>,

    /// Full gateway payload (JSON)
    pub raw_payload: serde_json::Value,
}
