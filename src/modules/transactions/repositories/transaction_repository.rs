use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::MySqlPool;

use super::super::models::{Transaction, TransactionStatus};
use crate::core::{AppError, Result};

const SELECT_COLUMNS: &str = r#"
    id, reference, gateway, gateway_transaction_id, transaction_type,
    parent_transaction_id, amount, currency, status, description,
    customer_email, customer_name, customer_phone, subscription_id,
    error_code, error_message, retry_count,
    locked_until, gateway_response, completed_at, deleted_at,
    created_at, updated_at
"#;

/// Repository for transaction persistence
///
/// Soft-deleted rows are excluded from every lookup except the admin
/// variants that ask for them explicitly.
pub struct TransactionRepository {
    pool: MySqlPool,
}

impl TransactionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Insert a new transaction row
    pub async fn create(&self, transaction: &Transaction) -> Result<Transaction> {
        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, reference, gateway, gateway_transaction_id, transaction_type,
                parent_transaction_id, amount, currency, status, description,
                customer_email, customer_name, customer_phone, subscription_id,
                error_code, error_message, retry_count,
                locked_until, gateway_response, completed_at, deleted_at,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.reference)
        .bind(&transaction.gateway)
        .bind(&transaction.gateway_transaction_id)
        .bind(transaction.transaction_type)
        .bind(&transaction.parent_transaction_id)
        .bind(transaction.amount)
        .bind(transaction.currency)
        .bind(transaction.status)
        .bind(&transaction.description)
        .bind(&transaction.customer_email)
        .bind(&transaction.customer_name)
        .bind(&transaction.customer_phone)
        .bind(&transaction.subscription_id)
        .bind(&transaction.error_code)
        .bind(&transaction.error_message)
        .bind(transaction.retry_count)
        .bind(transaction.locked_until)
        .bind(&transaction.gateway_response)
        .bind(transaction.completed_at)
        .bind(transaction.deleted_at)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await?;

        self.find_by_id(&transaction.id).await?.ok_or_else(|| {
            AppError::internal("Transaction was created but not found")
        })
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {} FROM payment_transactions WHERE id = ? AND deleted_at IS NULL",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {} FROM payment_transactions WHERE reference = ? AND deleted_at IS NULL",
            SELECT_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    /// Find a transaction by the gateway's own identifier
    pub async fn find_by_gateway_transaction_id(
        &self,
        gateway: &str,
        gateway_transaction_id: &str,
    ) -> Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            r#"SELECT {} FROM payment_transactions
               WHERE gateway = ? AND gateway_transaction_id = ? AND deleted_at IS NULL"#,
            SELECT_COLUMNS
        ))
        .bind(gateway)
        .bind(gateway_transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    /// List child refunds and retries of a transaction
    pub async fn find_children(&self, parent_id: &str) -> Result<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"SELECT {} FROM payment_transactions
               WHERE parent_transaction_id = ? AND deleted_at IS NULL
               ORDER BY created_at ASC"#,
            SELECT_COLUMNS
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// Paginated listing, optionally filtered by gateway and status
    pub async fn list(
        &self,
        gateway: Option<&str>,
        status: Option<TransactionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>> {
        let mut query = format!(
            "SELECT {} FROM payment_transactions WHERE deleted_at IS NULL",
            SELECT_COLUMNS
        );
        if gateway.is_some() {
            query.push_str(" AND gateway = ?");
        }
        if status.is_some() {
            query.push_str(" AND status = ?");
        }
        query.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query_as::<_, Transaction>(&query);
        if let Some(gateway) = gateway {
            q = q.bind(gateway.to_string());
        }
        if let Some(status) = status {
            q = q.bind(status);
        }
        let transactions = q.bind(limit).bind(offset).fetch_all(&self.pool).await?;

        Ok(transactions)
    }

    /// Persist the current state of a transaction
    pub async fn update(&self, transaction: &Transaction) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET gateway_transaction_id = ?, status = ?, error_code = ?,
                error_message = ?, retry_count = ?, locked_until = ?,
                gateway_response = ?, completed_at = ?, updated_at = NOW()
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&transaction.gateway_transaction_id)
        .bind(transaction.status)
        .bind(&transaction.error_code)
        .bind(&transaction.error_message)
        .bind(transaction.retry_count)
        .bind(transaction.locked_until)
        .bind(&transaction.gateway_response)
        .bind(transaction.completed_at)
        .bind(&transaction.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Transaction '{}'",
                transaction.id
            )));
        }

        Ok(())
    }

    /// Atomically claim a transaction for webhook processing
    ///
    /// A single conditional UPDATE takes the claim: only a row that is still
    /// in a non-terminal inbound state and not held by a live lock is
    /// claimed. Concurrent deliveries for the same transaction see zero rows
    /// affected and back off, so reconciliation runs at most once per
    /// delivery window. Pending rows advance to processing on claim;
    /// authorized rows keep their status so capture webhooks can settle them.
    pub async fn claim_for_webhook(
        &self,
        reference: &str,
        lock_seconds: i64,
    ) -> Result<Option<Transaction>> {
        let locked_until = Utc::now() + Duration::seconds(lock_seconds);

        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET locked_until = ?,
                status = IF(status = 'pending', 'processing', status),
                updated_at = NOW()
            WHERE reference = ?
              AND deleted_at IS NULL
              AND status IN ('pending', 'processing', 'authorized')
              AND (locked_until IS NULL OR locked_until < NOW())
            "#,
        )
        .bind(locked_until)
        .bind(reference)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_reference(reference).await
    }

    /// Release a webhook claim without waiting for the lock to expire
    pub async fn release_webhook_claim(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE payment_transactions SET locked_until = NULL, updated_at = NOW() WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Sum of completed refund children for a payment
    pub async fn total_refunded(&self, parent_id: &str) -> Result<Decimal> {
        let row: (Option<Decimal>,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0) as total
            FROM payment_transactions
            WHERE parent_transaction_id = ?
              AND transaction_type = 'refund'
              AND status = 'completed'
              AND deleted_at IS NULL
            "#,
        )
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0.unwrap_or_default())
    }

    /// Bump the retry counter on the parent payment
    pub async fn increment_retry_count(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE payment_transactions SET retry_count = retry_count + 1, updated_at = NOW() WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Soft delete a transaction
    pub async fn soft_delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE payment_transactions SET deleted_at = NOW(), updated_at = NOW() WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Transaction '{}'", id)));
        }

        Ok(())
    }
}

// Persistence behavior is covered by the database-backed integration tests.
