use std::sync::Arc;

use tracing::{info, warn};

use super::payment_service::map_gateway_status;
use crate::core::{AppError, Result};
use crate::modules::events::{EventBus, PaymentEvent};
use crate::modules::gateways::services::{GatewayRegistry, WebhookHeaders};
use crate::modules::transactions::models::TransactionStatus;
use crate::modules::transactions::repositories::TransactionRepository;

/// Processes inbound gateway webhooks
///
/// The flow is verify, claim, reconcile. Signature verification happens
/// before any database work so forged payloads never touch a transaction.
/// The claim is a single conditional UPDATE, so concurrent deliveries of
/// the same notification reconcile at most once.
pub struct WebhookService {
    registry: Arc<GatewayRegistry>,
    repository: Arc<TransactionRepository>,
    events: EventBus,
    lock_seconds: i64,
}

impl WebhookService {
    pub fn new(
        registry: Arc<GatewayRegistry>,
        repository: Arc<TransactionRepository>,
        events: EventBus,
        lock_seconds: i64,
    ) -> Self {
        Self {
            registry,
            repository,
            events,
            lock_seconds,
        }
    }

    /// Handle one webhook delivery from a gateway
    ///
    /// Returns Ok on duplicate deliveries and on notifications for already
    /// settled transactions; gateways treat a non-2xx as an invitation to
    /// redeliver, which is only wanted for genuine failures.
    pub async fn process(
        &self,
        gateway_name: &str,
        headers: &WebhookHeaders,
        body: &[u8],
    ) -> Result<()> {
        let gateway = self.registry.get(gateway_name)?;

        if !gateway.supports_webhooks() {
            return Err(AppError::callback(format!(
                "Gateway '{}' does not deliver webhooks",
                gateway_name
            )));
        }

        gateway.verify_webhook_delivery(headers, body).await?;
        let notification = gateway.parse_webhook(body)?;

        let mut transaction = match self
            .repository
            .claim_for_webhook(&notification.reference, self.lock_seconds)
            .await?
        {
            Some(transaction) => transaction,
            None => {
                // Either already settled or another delivery holds the claim.
                let existing = self
                    .repository
                    .find_by_reference(&notification.reference)
                    .await?;
                match existing {
                    Some(existing) => {
                        info!(
                            reference = %notification.reference,
                            gateway = %gateway_name,
                            status = %existing.status,
                            "Webhook ignored, transaction not claimable"
                        );
                        return Ok(());
                    }
                    None => {
                        return Err(AppError::not_found(format!(
                            "Transaction '{}'",
                            notification.reference
                        )));
                    }
                }
            }
        };

        // Amount tampering check against what the gateway reports.
        if let Some(amount) = notification.amount {
            if amount != transaction.amount {
                warn!(
                    reference = %transaction.reference,
                    expected = %transaction.amount,
                    reported = %amount,
                    "Webhook amount mismatch"
                );
                self.repository.release_webhook_claim(&transaction.id).await?;
                return Err(AppError::callback(format!(
                    "Webhook amount {} does not match transaction amount {}",
                    amount, transaction.amount
                )));
            }
        }

        let next = map_gateway_status(notification.status);
        transaction.gateway_transaction_id =
            Some(notification.gateway_transaction_id.clone());
        transaction.gateway_response = Some(notification.raw_payload.clone());

        if transaction.status != next && transaction.status.can_transition_to(next) {
            if next == TransactionStatus::Failed {
                transaction.record_failure(
                    notification.error_code.clone(),
                    "Reported by gateway webhook".to_string(),
                );
            }
            transaction.transition_to(next)?;
        }

        transaction.locked_until = None;
        self.repository.update(&transaction).await?;

        info!(
            reference = %transaction.reference,
            gateway = %gateway_name,
            status = %transaction.status,
            "Webhook reconciled"
        );

        match transaction.status {
            TransactionStatus::Completed => self.events.publish(PaymentEvent::PaymentCompleted {
                reference: transaction.reference.clone(),
                gateway: transaction.gateway.clone(),
                amount: transaction.amount,
                currency: transaction.currency,
            }),
            TransactionStatus::Failed => self.events.publish(PaymentEvent::PaymentFailed {
                reference: transaction.reference.clone(),
                gateway: transaction.gateway.clone(),
                error_code: transaction.error_code.clone(),
            }),
            TransactionStatus::Cancelled => self.events.publish(PaymentEvent::PaymentCancelled {
                reference: transaction.reference.clone(),
                gateway: transaction.gateway.clone(),
            }),
            TransactionStatus::Expired => self.events.publish(PaymentEvent::PaymentExpired {
                reference: transaction.reference.clone(),
                gateway: transaction.gateway.clone(),
            }),
            _ => {}
        }

        Ok(())
    }
}
