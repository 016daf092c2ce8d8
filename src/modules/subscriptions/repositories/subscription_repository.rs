use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

use super::super::models::{Subscription, SubscriptionStatus};
use crate::core::{AppError, Result};

const SELECT_COLUMNS: &str = r#"
    id, reference, gateway, customer_email, customer_name, amount, currency,
    frequency, status, description, current_period_start, current_period_end,
    next_billing_date, trial_ends_at, cancel_at_period_end,
    failed_attempts, grace_period_ends_at, total_cycles,
    completed_cycles, cancelled_at, deleted_at, created_at, updated_at
"#;

/// Repository for subscription persistence
///
/// Soft-deleted rows are excluded from every lookup.
pub struct SubscriptionRepository {
    pool: MySqlPool,
}

impl SubscriptionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, subscription: &Subscription) -> Result<Subscription> {
        sqlx::query(
            r#"
            INSERT INTO payment_subscriptions (
                id, reference, gateway, customer_email, customer_name, amount, currency,
                frequency, status, description, current_period_start, current_period_end,
                next_billing_date, trial_ends_at, cancel_at_period_end,
                failed_attempts, grace_period_ends_at, total_cycles,
                completed_cycles, cancelled_at, deleted_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.reference)
        .bind(&subscription.gateway)
        .bind(&subscription.customer_email)
        .bind(&subscription.customer_name)
        .bind(subscription.amount)
        .bind(subscription.currency)
        .bind(subscription.frequency)
        .bind(subscription.status)
        .bind(&subscription.description)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.next_billing_date)
        .bind(subscription.trial_ends_at)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.failed_attempts)
        .bind(subscription.grace_period_ends_at)
        .bind(subscription.total_cycles)
        .bind(subscription.completed_cycles)
        .bind(subscription.cancelled_at)
        .bind(subscription.deleted_at)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;

        self.find_by_id(&subscription.id).await?.ok_or_else(|| {
            AppError::internal("Subscription was created but not found")
        })
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM payment_subscriptions WHERE id = ? AND deleted_at IS NULL",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM payment_subscriptions WHERE reference = ? AND deleted_at IS NULL",
            SELECT_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    /// Paginated listing, optionally filtered by status
    pub async fn list(
        &self,
        status: Option<SubscriptionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Subscription>> {
        let mut query = format!(
            "SELECT {} FROM payment_subscriptions WHERE deleted_at IS NULL",
            SELECT_COLUMNS
        );
        if status.is_some() {
            query.push_str(" AND status = ?");
        }
        query.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query_as::<_, Subscription>(&query);
        if let Some(status) = status {
            q = q.bind(status);
        }
        let subscriptions = q.bind(limit).bind(offset).fetch_all(&self.pool).await?;

        Ok(subscriptions)
    }

    /// Billable subscriptions whose billing date has arrived
    pub async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Subscription>> {
        let subscriptions = sqlx::query_as::<_, Subscription>(&format!(
            r#"SELECT {} FROM payment_subscriptions
               WHERE status IN ('trialing', 'active', 'past_due')
                 AND next_billing_date <= ? AND deleted_at IS NULL
               ORDER BY next_billing_date ASC
               LIMIT ?"#,
            SELECT_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    /// Persist the current state of a subscription
    pub async fn update(&self, subscription: &Subscription) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_subscriptions
            SET status = ?, current_period_start = ?, current_period_end = ?,
                next_billing_date = ?, cancel_at_period_end = ?,
                failed_attempts = ?, grace_period_ends_at = ?,
                completed_cycles = ?, cancelled_at = ?, updated_at = NOW()
            WHERE id = ?
            "#,
        )
        .bind(subscription.status)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.next_billing_date)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.failed_attempts)
        .bind(subscription.grace_period_ends_at)
        .bind(subscription.completed_cycles)
        .bind(subscription.cancelled_at)
        .bind(&subscription.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Subscription '{}'",
                subscription.id
            )));
        }

        Ok(())
    }

    /// Soft delete a subscription record
    pub async fn soft_delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE payment_subscriptions SET deleted_at = NOW(), updated_at = NOW() WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Subscription '{}'", id)));
        }

        Ok(())
    }
}

// Persistence behavior is covered by the database-backed integration tests.
