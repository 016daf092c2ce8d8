use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LimitsConfig;
use crate::core::{AppError, Currency, Result};
use crate::modules::events::{EventBus, PaymentEvent};
use crate::modules::gateways::services::{
    GatewayPaymentStatus, GatewayRegistry, PaymentRequest, RefundRequest,
};
use crate::modules::transactions::models::{Transaction, TransactionStatus, TransactionType};
use crate::modules::transactions::repositories::TransactionRepository;

/// Request to start a payment
#[derive(Debug, Clone, Deserialize)]
pub struct InitializePaymentRequest {
    pub gateway: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
    pub notify_url: Option<String>,
    #[serde(default)]
    pub is_subscription: bool,
    /// Set internally by the billing runner, never from the API
    #[serde(skip)]
    pub subscription_id: Option<String>,
}

/// Response from starting a payment
#[derive(Debug, Clone, Serialize)]
pub struct InitializePaymentResponse {
    pub reference: String,
    pub status: TransactionStatus,
    pub redirect_url: Option<String>,
    pub instructions: Option<String>,
}

/// Request to refund a payment
#[derive(Debug, Clone, Deserialize)]
pub struct RefundPaymentRequest {
    /// Omitted means a full refund of the remaining balance
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

/// Transaction with its refund bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetails {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub total_refunded: Decimal,
    pub refundable_amount: Decimal,
}

/// Transaction with its child refunds and retries
#[derive(Debug, Clone, Serialize)]
pub struct TransactionHistory {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub children: Vec<Transaction>,
}

/// Orchestrates payments across the registered gateways
///
/// Owns amount-limit and currency validation, the refund arithmetic, and
/// the retry bookkeeping. Gateway-specific behavior stays behind the
/// registry.
pub struct PaymentService {
    registry: Arc<GatewayRegistry>,
    repository: Arc<TransactionRepository>,
    events: EventBus,
    limits: LimitsConfig,
}

impl PaymentService {
    pub fn new(
        registry: Arc<GatewayRegistry>,
        repository: Arc<TransactionRepository>,
        events: EventBus,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            registry,
            repository,
            events,
            limits,
        }
    }

    fn validate_amount(&self, amount: Decimal, currency: Currency) -> Result<()> {
        currency.validate_amount(amount)?;
        if amount < self.limits.min_amount {
            return Err(AppError::amount(format!(
                "Amount {} is below the minimum of {}",
                amount, self.limits.min_amount
            )));
        }
        if amount > self.limits.max_amount {
            return Err(AppError::amount(format!(
                "Amount {} exceeds the maximum of {}",
                amount, self.limits.max_amount
            )));
        }
        Ok(())
    }

    /// Start a payment on the requested gateway
    pub async fn initialize_payment(
        &self,
        request: InitializePaymentRequest,
    ) -> Result<InitializePaymentResponse> {
        self.validate_amount(request.amount, request.currency)?;

        let gateway = self.registry.get(&request.gateway)?;
        if !gateway.supports_currency(request.currency) {
            return Err(AppError::currency(format!(
                "Gateway '{}' does not support {}",
                request.gateway, request.currency
            )));
        }
        if request.is_subscription && !gateway.supports_recurring() {
            return Err(AppError::validation(format!(
                "Gateway '{}' does not support recurring billing",
                request.gateway
            )));
        }

        let mut transaction = Transaction::new_payment(
            request.gateway.clone(),
            request.amount,
            request.currency,
            request.description.clone(),
            request.customer_email.clone(),
            request.customer_name.clone(),
            request.customer_phone.clone(),
        )?;
        transaction.subscription_id = request.subscription_id.clone();
        let transaction_record = self.repository.create(&transaction).await?;
        transaction = transaction_record;

        let gateway_response = gateway
            .initialize_payment(PaymentRequest {
                reference: transaction.reference.clone(),
                amount: request.amount,
                currency: request.currency,
                description: request.description,
                customer_email: request.customer_email,
                customer_name: request.customer_name,
                return_url: request.return_url,
                cancel_url: request.cancel_url,
                notify_url: request.notify_url,
                is_subscription: request.is_subscription,
            })
            .await;

        let response = match gateway_response {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    reference = %transaction.reference,
                    gateway = %transaction.gateway,
                    error = %e,
                    "Gateway initialization failed"
                );
                transaction.record_failure(None, e.to_string());
                transaction.transition_to(TransactionStatus::Failed)?;
                self.repository.update(&transaction).await?;
                self.events.publish(PaymentEvent::PaymentFailed {
                    reference: transaction.reference.clone(),
                    gateway: transaction.gateway.clone(),
                    error_code: None,
                });
                return Err(e);
            }
        };

        transaction.gateway_transaction_id = response.gateway_transaction_id.clone();
        if response.status != GatewayPaymentStatus::Pending {
            transaction.transition_to(map_gateway_status(response.status))?;
        }
        self.repository.update(&transaction).await?;

        info!(
            reference = %transaction.reference,
            gateway = %transaction.gateway,
            amount = %transaction.amount,
            "Payment initialized"
        );
        self.events.publish(PaymentEvent::PaymentInitialized {
            reference: transaction.reference.clone(),
            gateway: transaction.gateway.clone(),
            amount: transaction.amount,
            currency: transaction.currency,
        });

        Ok(InitializePaymentResponse {
            reference: transaction.reference,
            status: transaction.status,
            redirect_url: response.redirect_url,
            instructions: response.instructions,
        })
    }

    /// Verify a payment against the gateway and reconcile local state
    ///
    /// Gateways without a synchronous verification API leave the stored
    /// state untouched; webhooks remain the source of truth for them.
    pub async fn verify_payment(&self, reference: &str) -> Result<TransactionDetails> {
        let mut transaction = self.require_transaction(reference).await?;
        let gateway = self.registry.get(&transaction.gateway)?;

        if !transaction.status.is_terminal() && !transaction.can_refund() {
            match gateway.verify_payment(reference).await {
                Ok(result) => {
                    let next = map_gateway_status(result.status);
                    if let Some(gateway_id) = result.gateway_transaction_id {
                        transaction.gateway_transaction_id = Some(gateway_id);
                    }
                    if transaction.status != next && transaction.status.can_transition_to(next) {
                        transaction.transition_to(next)?;
                        if let Some(code) = result.error_code {
                            transaction.record_failure(Some(code), "Reported by gateway".into());
                        }
                        self.repository.update(&transaction).await?;
                        self.publish_status_event(&transaction);
                    } else {
                        self.repository.update(&transaction).await?;
                    }
                }
                Err(AppError::Gateway(message)) => {
                    // No synchronous verification for this gateway.
                    info!(
                        reference = %reference,
                        gateway = %transaction.gateway,
                        message = %message,
                        "Verification unavailable, returning stored state"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        self.details(transaction).await
    }

    /// Current stored state of a transaction
    pub async fn get_status(&self, reference: &str) -> Result<TransactionDetails> {
        let transaction = self.require_transaction(reference).await?;
        self.details(transaction).await
    }

    /// Transaction with its refunds and retries
    pub async fn get_history(&self, reference: &str) -> Result<TransactionHistory> {
        let transaction = self.require_transaction(reference).await?;
        let children = self.repository.find_children(&transaction.id).await?;
        Ok(TransactionHistory {
            transaction,
            children,
        })
    }

    /// Paginated transaction listing
    pub async fn list_transactions(
        &self,
        gateway: Option<&str>,
        status: Option<TransactionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);
        self.repository.list(gateway, status, limit, offset).await
    }

    /// Refund a completed payment, in part or in full
    pub async fn refund_payment(
        &self,
        reference: &str,
        request: RefundPaymentRequest,
    ) -> Result<TransactionDetails> {
        let mut parent = self.require_transaction(reference).await?;

        if !parent.can_refund() {
            return Err(AppError::refund(format!(
                "Transaction {} is not refundable in status {}",
                parent.reference, parent.status
            )));
        }

        let total_refunded = self.repository.total_refunded(&parent.id).await?;
        let refundable = parent.refundable_amount(total_refunded);
        let amount = request.amount.unwrap_or(refundable);

        parent.currency.validate_amount(amount)?;
        if amount > refundable {
            return Err(AppError::refund(format!(
                "Refund of {} exceeds the refundable balance of {}",
                amount, refundable
            )));
        }

        let gateway = self.registry.get(&parent.gateway)?;
        let gateway_transaction_id = parent.gateway_transaction_id.clone().ok_or_else(|| {
            AppError::refund("Transaction has no gateway identifier to refund against")
        })?;

        let mut refund = Transaction::new_refund(&parent, amount)?;
        if let Some(reason) = &request.reason {
            refund.description = format!("{} ({})", refund.description, reason);
        }
        refund = self.repository.create(&refund).await?;

        let response = gateway
            .refund_payment(RefundRequest {
                gateway_transaction_id,
                amount,
                currency: parent.currency,
                reason: request.reason,
            })
            .await;

        match response {
            Ok(response) => {
                refund.gateway_transaction_id = response.gateway_refund_id;
                refund.transition_to(TransactionStatus::Completed)?;
                self.repository.update(&refund).await?;
            }
            Err(e) => {
                warn!(
                    reference = %parent.reference,
                    refund_reference = %refund.reference,
                    error = %e,
                    "Gateway refund failed"
                );
                refund.record_failure(None, e.to_string());
                refund.transition_to(TransactionStatus::Failed)?;
                self.repository.update(&refund).await?;
                return Err(e);
            }
        }

        let new_total = total_refunded + amount;
        let next = if new_total >= parent.amount {
            TransactionStatus::Refunded
        } else {
            TransactionStatus::PartiallyRefunded
        };
        parent.transition_to(next)?;
        self.repository.update(&parent).await?;

        info!(
            reference = %parent.reference,
            refund_reference = %refund.reference,
            amount = %amount,
            "Refund completed"
        );
        self.events.publish(PaymentEvent::RefundIssued {
            reference: parent.reference.clone(),
            refund_reference: refund.reference,
            amount,
        });

        self.details(parent).await
    }

    /// Retry a failed payment as a new child transaction
    pub async fn retry_payment(&self, reference: &str) -> Result<InitializePaymentResponse> {
        let parent = self.require_transaction(reference).await?;

        if !parent.can_retry(self.limits.max_retry_attempts as i32) {
            return Err(AppError::validation(format!(
                "Transaction {} cannot be retried",
                parent.reference
            )));
        }

        let gateway = self.registry.get(&parent.gateway)?;
        let mut retry = Transaction::new_retry(&parent)?;
        retry = self.repository.create(&retry).await?;
        self.repository.increment_retry_count(&parent.id).await?;

        let response = gateway
            .initialize_payment(PaymentRequest {
                reference: retry.reference.clone(),
                amount: retry.amount,
                currency: retry.currency,
                description: retry.description.clone(),
                customer_email: retry.customer_email.clone(),
                customer_name: retry.customer_name.clone(),
                return_url: None,
                cancel_url: None,
                notify_url: None,
                is_subscription: false,
            })
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                retry.record_failure(None, e.to_string());
                retry.transition_to(TransactionStatus::Failed)?;
                self.repository.update(&retry).await?;
                return Err(e);
            }
        };

        retry.gateway_transaction_id = response.gateway_transaction_id.clone();
        self.repository.update(&retry).await?;

        info!(
            reference = %parent.reference,
            retry_reference = %retry.reference,
            attempt = parent.retry_count + 1,
            "Payment retry initialized"
        );
        self.events.publish(PaymentEvent::PaymentRetried {
            reference: parent.reference,
            retry_reference: retry.reference.clone(),
            attempt: parent.retry_count + 1,
        });

        Ok(InitializePaymentResponse {
            reference: retry.reference,
            status: retry.status,
            redirect_url: response.redirect_url,
            instructions: response.instructions,
        })
    }

    /// Manually settle a transaction that has no webhook channel
    ///
    /// Used by operators to reconcile EFT deposits once the money shows up
    /// on the bank statement.
    pub async fn reconcile_manual(&self, reference: &str) -> Result<TransactionDetails> {
        let mut transaction = self.require_transaction(reference).await?;

        if !transaction
            .status
            .can_transition_to(TransactionStatus::Completed)
        {
            return Err(AppError::conflict(format!(
                "Transaction {} cannot be reconciled from status {}",
                transaction.reference, transaction.status
            )));
        }

        transaction.transition_to(TransactionStatus::Completed)?;
        self.repository.update(&transaction).await?;

        info!(reference = %transaction.reference, "Transaction reconciled manually");
        self.events.publish(PaymentEvent::PaymentCompleted {
            reference: transaction.reference.clone(),
            gateway: transaction.gateway.clone(),
            amount: transaction.amount,
            currency: transaction.currency,
        });

        self.details(transaction).await
    }

    /// Soft delete a transaction record
    pub async fn delete_transaction(&self, reference: &str) -> Result<()> {
        let transaction = self.require_transaction(reference).await?;
        self.repository.soft_delete(&transaction.id).await?;
        info!(reference = %transaction.reference, "Transaction soft deleted");
        Ok(())
    }

    async fn require_transaction(&self, reference: &str) -> Result<Transaction> {
        self.repository
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Transaction '{}'", reference)))
    }

    async fn details(&self, transaction: Transaction) -> Result<TransactionDetails> {
        let total_refunded =
            if transaction.transaction_type == TransactionType::Refund {
                Decimal::ZERO
            } else {
                self.repository.total_refunded(&transaction.id).await?
            };
        let refundable_amount = transaction.refundable_amount(total_refunded);
        Ok(TransactionDetails {
            transaction,
            total_refunded,
            refundable_amount,
        })
    }

    fn publish_status_event(&self, transaction: &Transaction) {
        let event = match transaction.status {
            TransactionStatus::Completed => Some(PaymentEvent::PaymentCompleted {
                reference: transaction.reference.clone(),
                gateway: transaction.gateway.clone(),
                amount: transaction.amount,
                currency: transaction.currency,
            }),
            TransactionStatus::Failed => Some(PaymentEvent::PaymentFailed {
                reference: transaction.reference.clone(),
                gateway: transaction.gateway.clone(),
                error_code: transaction.error_code.clone(),
            }),
            TransactionStatus::Cancelled => Some(PaymentEvent::PaymentCancelled {
                reference: transaction.reference.clone(),
                gateway: transaction.gateway.clone(),
            }),
            TransactionStatus::Expired => Some(PaymentEvent::PaymentExpired {
                reference: transaction.reference.clone(),
                gateway: transaction.gateway.clone(),
            }),
            _ => None,
        };
        if let Some(event) = event {
            self.events.publish(event);
        }
    }
}

/// Map a gateway status onto the transaction lifecycle
pub(crate) fn map_gateway_status(status: GatewayPaymentStatus) -> TransactionStatus {
    match status {
        GatewayPaymentStatus::Pending => TransactionStatus::Processing,
        GatewayPaymentStatus::Authorized => TransactionStatus::Authorized,
        GatewayPaymentStatus::Completed => TransactionStatus::Completed,
        GatewayPaymentStatus::Failed => TransactionStatus::Failed,
        GatewayPaymentStatus::Cancelled => TransactionStatus::Cancelled,
        GatewayPaymentStatus::Refunded => TransactionStatus::Refunded,
        GatewayPaymentStatus::Expired => TransactionStatus::Expired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_gateway_status() {
        assert_eq!(
            map_gateway_status(GatewayPaymentStatus::Completed),
            TransactionStatus::Completed
        );
        assert_eq!(
            map_gateway_status(GatewayPaymentStatus::Pending),
            TransactionStatus::Processing
        );
        assert_eq!(
            map_gateway_status(GatewayPaymentStatus::Expired),
            TransactionStatus::Expired
        );
    }
}
