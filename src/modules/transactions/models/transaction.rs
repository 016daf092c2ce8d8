use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::core::{reference, AppError, Currency, Result};

/// Gateway error codes that must never be retried
pub const NON_RETRYABLE_ERROR_CODES: &[&str] = &[
    "invalid_card",
    "expired_card",
    "fraud_detected",
    "invalid_account",
    "unsupported_currency",
];

/// Payment transaction status
///
/// Transitions are one-directional: a terminal status never moves again,
/// and a completed payment can only move into the refund states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Authorized,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
    Voided,
    Expired,
}

impl TransactionStatus {
    /// Whether this status allows a transition to `next`
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        match self {
            Pending => matches!(
                next,
                Processing | Authorized | Completed | Failed | Cancelled | Expired
            ),
            Processing => matches!(next, Authorized | Completed | Failed | Cancelled | Expired),
            Authorized => matches!(next, Completed | Failed | Voided),
            Completed => matches!(next, Refunded | PartiallyRefunded),
            PartiallyRefunded => matches!(next, Refunded | PartiallyRefunded),
            Failed | Cancelled | Refunded | Voided | Expired => false,
        }
    }

    /// Terminal statuses never change again
    pub fn is_terminal(self) -> bool {
        use TransactionStatus::*;
        matches!(self, Failed | Cancelled | Refunded | Voided | Expired)
    }

    /// Whether money has moved in the customer's favor of the merchant
    pub fn is_successful(self) -> bool {
        use TransactionStatus::*;
        matches!(self, Authorized | Completed | PartiallyRefunded | Refunded)
    }
}

impl Default for TransactionStatus {
    fn default() -> Self {
        TransactionStatus::Pending
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Authorized => "authorized",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::PartiallyRefunded => "partially_refunded",
            TransactionStatus::Voided => "voided",
            TransactionStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "processing" => Ok(TransactionStatus::Processing),
            "authorized" => Ok(TransactionStatus::Authorized),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            "refunded" => Ok(TransactionStatus::Refunded),
            "partially_refunded" => Ok(TransactionStatus::PartiallyRefunded),
            "voided" => Ok(TransactionStatus::Voided),
            "expired" => Ok(TransactionStatus::Expired),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

/// Transaction kind
///
/// Refunds and retries are child transactions linked to their original
/// payment through `parent_transaction_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(10)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Payment,
    Refund,
    Retry,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Payment => write!(f, "payment"),
            TransactionType::Refund => write!(f, "refund"),
            TransactionType::Retry => write!(f, "retry"),
        }
    }
}

/// Payment transaction record
///
/// One row per payment attempt, refund, or retry. The merchant-facing
/// `reference` is unique; the gateway's own identifier lands in
/// `gateway_transaction_id` once known.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    #[serde(skip_deserializing)]
    pub id: String,

    /// Merchant reference (TXN-, RFD-)
    pub reference: String,

    /// Gateway name the transaction was routed to
    pub gateway: String,

    /// Gateway's own transaction identifier
    pub gateway_transaction_id: Option<String>,

    pub transaction_type: TransactionType,

    /// Original payment this refund or retry belongs to
    pub parent_transaction_id: Option<String>,

    pub amount: Decimal,
    pub currency: Currency,
    pub status: TransactionStatus,

    pub description: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,

    /// Subscription this payment bills, when raised by the billing runner
    pub subscription_id: Option<String>,

    /// Gateway error code on failure
    pub error_code: Option<String>,
    pub error_message: Option<String>,

    /// Number of retry children spawned from this payment
    pub retry_count: i32,

    /// Webhook processing claim, see claim_for_webhook
    pub locked_until: Option<DateTime<Utc>>,

    /// Last raw gateway payload for this transaction
    pub gateway_response: Option<serde_json::Value>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Soft delete marker
    pub deleted_at: Option<DateTime<Utc>>,

    #[serde(skip_deserializing)]
    pub created_at: DateTime<Utc>,
    #[serde(skip_deserializing)]
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new payment transaction with a fresh TXN- reference
    pub fn new_payment(
        gateway: String,
        amount: Decimal,
        currency: Currency,
        description: String,
        customer_email: Option<String>,
        customer_name: Option<String>,
        customer_phone: Option<String>,
    ) -> Result<Self> {
        currency.validate_amount(amount)?;

        if gateway.trim().is_empty() {
            return Err(AppError::validation("Gateway name cannot be empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            reference: reference::transaction_reference(),
            gateway,
            gateway_transaction_id: None,
            transaction_type: TransactionType::Payment,
            parent_transaction_id: None,
            amount,
            currency,
            status: TransactionStatus::Pending,
            description,
            customer_email,
            customer_name,
            customer_phone,
            subscription_id: None,
            error_code: None,
            error_message: None,
            retry_count: 0,
            locked_until: None,
            gateway_response: None,
            completed_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Create a refund child transaction for a completed parent
    pub fn new_refund(parent: &Transaction, amount: Decimal) -> Result<Self> {
        parent.currency.validate_amount(amount)?;

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            reference: reference::refund_reference(),
            gateway: parent.gateway.clone(),
            gateway_transaction_id: None,
            transaction_type: TransactionType::Refund,
            parent_transaction_id: Some(parent.id.clone()),
            amount,
            currency: parent.currency,
            status: TransactionStatus::Pending,
            description: format!("Refund for {}", parent.reference),
            customer_email: parent.customer_email.clone(),
            customer_name: parent.customer_name.clone(),
            customer_phone: parent.customer_phone.clone(),
            subscription_id: parent.subscription_id.clone(),
            error_code: None,
            error_message: None,
            retry_count: 0,
            locked_until: None,
            gateway_response: None,
            completed_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Create a retry child transaction for a failed parent
    ///
    /// The retry carries a fresh reference so the gateway sees a new payment.
    pub fn new_retry(parent: &Transaction) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            reference: reference::transaction_reference(),
            gateway: parent.gateway.clone(),
            gateway_transaction_id: None,
            transaction_type: TransactionType::Retry,
            parent_transaction_id: Some(parent.id.clone()),
            amount: parent.amount,
            currency: parent.currency,
            status: TransactionStatus::Pending,
            description: parent.description.clone(),
            customer_email: parent.customer_email.clone(),
            customer_name: parent.customer_name.clone(),
            customer_phone: parent.customer_phone.clone(),
            subscription_id: parent.subscription_id.clone(),
            error_code: None,
            error_message: None,
            retry_count: 0,
            locked_until: None,
            gateway_response: None,
            completed_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a status transition, rejecting any move the lifecycle forbids
    pub fn transition_to(&mut self, next: TransactionStatus) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(AppError::conflict(format!(
                "Cannot transition transaction {} from {} to {}",
                self.reference, self.status, next
            )));
        }

        self.status = next;
        self.updated_at = Utc::now();
        if next == TransactionStatus::Completed {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Whether a failed payment may be retried
    ///
    /// Retries are blocked for non-payment rows, below-threshold statuses,
    /// exhausted attempts, and permanently declined error codes.
    pub fn can_retry(&self, max_attempts: i32) -> bool {
        if self.transaction_type == TransactionType::Refund {
            return false;
        }
        if self.status != TransactionStatus::Failed {
            return false;
        }
        if self.retry_count >= max_attempts {
            return false;
        }
        match self.error_code.as_deref() {
            Some(code) => !NON_RETRYABLE_ERROR_CODES.contains(&code),
            None => true,
        }
    }

    /// Whether this transaction may be refunded at all
    pub fn can_refund(&self) -> bool {
        self.transaction_type != TransactionType::Refund
            && matches!(
                self.status,
                TransactionStatus::Completed | TransactionStatus::PartiallyRefunded
            )
    }

    /// Amount still available to refund given the completed refund total
    pub fn refundable_amount(&self, total_refunded: Decimal) -> Decimal {
        let remaining = self.amount - total_refunded;
        if remaining < Decimal::ZERO {
            Decimal::ZERO
        } else {
            remaining
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Record a gateway failure on this transaction
    pub fn record_failure(&mut self, error_code: Option<String>, error_message: String) {
        self.error_code = error_code;
        self.error_message = Some(error_message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payment() -> Transaction {
        Transaction::new_payment(
            "payfast".to_string(),
            dec!(150.00),
            Currency::ZAR,
            "Order #42".to_string(),
            Some("buyer@example.com".to_string()),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_new_payment_defaults() {
        let tx = payment();
        assert!(tx.reference.starts_with("TXN-"));
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.transaction_type, TransactionType::Payment);
        assert_eq!(tx.retry_count, 0);
        assert!(tx.parent_transaction_id.is_none());
    }

    #[test]
    fn test_new_payment_rejects_invalid_amount() {
        let result = Transaction::new_payment(
            "payfast".to_string(),
            dec!(-5.00),
            Currency::ZAR,
            "Order".to_string(),
            None,
            None,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let mut tx = payment();
        tx.transition_to(TransactionStatus::Processing).unwrap();
        tx.transition_to(TransactionStatus::Completed).unwrap();
        assert!(tx.completed_at.is_some());
        tx.transition_to(TransactionStatus::PartiallyRefunded).unwrap();
        tx.transition_to(TransactionStatus::Refunded).unwrap();
        assert!(tx.status.is_terminal());
    }

    #[test]
    fn test_terminal_statuses_do_not_move() {
        let mut tx = payment();
        tx.transition_to(TransactionStatus::Failed).unwrap();
        assert!(tx.transition_to(TransactionStatus::Completed).is_err());
        assert!(tx.transition_to(TransactionStatus::Pending).is_err());
    }

    #[test]
    fn test_completed_only_moves_to_refund_states() {
        let mut tx = payment();
        tx.transition_to(TransactionStatus::Completed).unwrap();
        assert!(tx.transition_to(TransactionStatus::Failed).is_err());
        assert!(tx.transition_to(TransactionStatus::Pending).is_err());
        assert!(tx.transition_to(TransactionStatus::Refunded).is_ok());
    }

    #[test]
    fn test_same_status_transition_is_noop() {
        let mut tx = payment();
        tx.transition_to(TransactionStatus::Pending).unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[test]
    fn test_can_retry_rules() {
        let mut tx = payment();
        assert!(!tx.can_retry(3));

        tx.transition_to(TransactionStatus::Failed).unwrap();
        assert!(tx.can_retry(3));

        tx.retry_count = 3;
        assert!(!tx.can_retry(3));

        tx.retry_count = 0;
        tx.error_code = Some("fraud_detected".to_string());
        assert!(!tx.can_retry(3));

        tx.error_code = Some("timeout".to_string());
        assert!(tx.can_retry(3));
    }

    #[test]
    fn test_can_refund_rules() {
        let mut tx = payment();
        assert!(!tx.can_refund());

        tx.transition_to(TransactionStatus::Completed).unwrap();
        assert!(tx.can_refund());

        let refund = Transaction::new_refund(&tx, dec!(50.00)).unwrap();
        assert!(!refund.can_refund());
        assert!(refund.reference.starts_with("RFD-"));
        assert_eq!(refund.parent_transaction_id, Some(tx.id.clone()));
    }

    #[test]
    fn test_refundable_amount_never_negative() {
        let mut tx = payment();
        tx.transition_to(TransactionStatus::Completed).unwrap();
        assert_eq!(tx.refundable_amount(dec!(50.00)), dec!(100.00));
        assert_eq!(tx.refundable_amount(dec!(150.00)), dec!(0.00));
        assert_eq!(tx.refundable_amount(dec!(200.00)), Decimal::ZERO);
    }

    #[test]
    fn test_retry_carries_fresh_reference() {
        let mut tx = payment();
        tx.transition_to(TransactionStatus::Failed).unwrap();
        let retry = Transaction::new_retry(&tx).unwrap();
        assert_ne!(retry.reference, tx.reference);
        assert_eq!(retry.amount, tx.amount);
        assert_eq!(retry.transaction_type, TransactionType::Retry);
    }

    #[test]
    fn test_status_round_trip() {
        use std::str::FromStr;
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Processing,
            TransactionStatus::Authorized,
            TransactionStatus::Completed,
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
            TransactionStatus::Refunded,
            TransactionStatus::PartiallyRefunded,
            TransactionStatus::Voided,
            TransactionStatus::Expired,
        ] {
            assert_eq!(
                TransactionStatus::from_str(&status.to_string()).unwrap(),
                status
            );
        }
        assert!(TransactionStatus::from_str("bogus").is_err());
    }
}
