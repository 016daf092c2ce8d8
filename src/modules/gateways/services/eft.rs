use async_trait::async_trait;

use super::gateway_trait::{
    GatewayPaymentStatus, PaymentGateway, PaymentRequest, PaymentResponse, RefundRequest,
    RefundResponse, VerificationResult, WebhookHeaders, WebhookNotification,
};
use crate::config::GatewaySettings;
use crate::core::{AppError, Currency, Result};

/// Manual EFT (bank transfer) gateway
///
/// There is no processor behind this driver: the customer receives bank
/// details and the payment stays pending until an operator reconciles it
/// through the admin API.
pub struct EftGateway {
    settings: GatewaySettings,
}

impl EftGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PaymentGateway for EftGateway {
    async fn initialize_payment(&self, request: PaymentRequest) -> Result<PaymentResponse> {
        // Bank details are carried in the gateway settings; the merchant
        // reference doubles as the deposit reference.
        let instructions = format!(
            "Pay {} {:.2} via EFT to account {} using reference {}",
            request.currency, request.amount, self.settings.merchant_id, request.reference
        );

        Ok(PaymentResponse {
            gateway_transaction_id: None,
            redirect_url: None,
            instructions: Some(instructions),
            status: GatewayPaymentStatus::Pending,
        })
    }

    async fn verify_payment(&self, _reference: &str) -> Result<VerificationResult> {
        Err(AppError::gateway(
            "EFT payments are reconciled manually through the admin API",
        ))
    }

    async fn refund_payment(&self, _request: RefundRequest) -> Result<RefundResponse> {
        Err(AppError::refund(
            "EFT refunds are manual bank payouts",
        ))
    }

    fn verify_webhook(&self, _headers: &WebhookHeaders, _body: &[u8]) -> Result<()> {
        Err(AppError::callback("EFT does not deliver webhooks"))
    }

    fn parse_webhook(&self, _body: &[u8]) -> Result<WebhookNotification> {
        Err(AppError::callback("EFT does not deliver webhooks"))
    }

    fn name(&self) -> &str {
        "eft"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(currency, Currency::ZAR)
    }

    fn supports_webhooks(&self) -> bool {
        false
    }
}
