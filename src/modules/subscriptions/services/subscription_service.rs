use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::LimitsConfig;
use crate::core::{AppError, Currency, Result};
use crate::modules::events::{EventBus, PaymentEvent};
use crate::modules::gateways::services::GatewayRegistry;
use crate::modules::subscriptions::models::{Frequency, Subscription, SubscriptionStatus};
use crate::modules::subscriptions::repositories::SubscriptionRepository;
use crate::modules::transactions::services::{InitializePaymentRequest, PaymentService};

const BILLING_BATCH_SIZE: i64 = 100;

/// Request to create a subscription
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub gateway: String,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    pub frequency: Frequency,
    pub description: String,
    pub total_cycles: Option<i32>,
    /// Free trial length; billing starts once it lapses
    pub trial_days: Option<i64>,
}

/// Outcome of one due-billing run
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct BillingRunSummary {
    pub billed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Manages recurring billing agreements
///
/// Billing charges go through the PaymentService, so every cycle leaves a
/// normal transaction row behind and obeys the same amount limits.
pub struct SubscriptionService {
    registry: Arc<GatewayRegistry>,
    repository: Arc<SubscriptionRepository>,
    payments: Arc<PaymentService>,
    events: EventBus,
    limits: LimitsConfig,
}

impl SubscriptionService {
    pub fn new(
        registry: Arc<GatewayRegistry>,
        repository: Arc<SubscriptionRepository>,
        payments: Arc<PaymentService>,
        events: EventBus,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            registry,
            repository,
            payments,
            events,
            limits,
        }
    }

    /// Create a subscription on a recurring-capable gateway
    pub async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription> {
        let gateway = self.registry.get(&request.gateway)?;
        if !gateway.supports_recurring() {
            return Err(AppError::validation(format!(
                "Gateway '{}' does not support recurring billing",
                request.gateway
            )));
        }
        if !gateway.supports_currency(request.currency) {
            return Err(AppError::currency(format!(
                "Gateway '{}' does not support {}",
                request.gateway, request.currency
            )));
        }

        let subscription = Subscription::new(
            request.gateway,
            request.customer_email,
            request.customer_name,
            request.amount,
            request.currency,
            request.frequency,
            request.description,
            request.total_cycles,
            request.trial_days,
        )?;
        let subscription = self.repository.create(&subscription).await?;

        info!(
            reference = %subscription.reference,
            gateway = %subscription.gateway,
            frequency = %subscription.frequency,
            "Subscription created"
        );
        self.events.publish(PaymentEvent::SubscriptionCreated {
            reference: subscription.reference.clone(),
            gateway: subscription.gateway.clone(),
        });

        Ok(subscription)
    }

    pub async fn get_subscription(&self, reference: &str) -> Result<Subscription> {
        self.repository
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Subscription '{}'", reference)))
    }

    pub async fn list_subscriptions(
        &self,
        status: Option<SubscriptionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Subscription>> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);
        self.repository.list(status, limit, offset).await
    }

    /// Cancel a subscription, either immediately or at the period boundary
    pub async fn cancel_subscription(
        &self,
        reference: &str,
        at_period_end: bool,
    ) -> Result<Subscription> {
        let mut subscription = self.get_subscription(reference).await?;
        subscription.cancel(at_period_end)?;
        self.repository.update(&subscription).await?;

        if at_period_end {
            info!(
                reference = %subscription.reference,
                period_end = %subscription.current_period_end,
                "Subscription flagged to cancel at period end"
            );
        } else {
            info!(reference = %subscription.reference, "Subscription cancelled");
            self.events.publish(PaymentEvent::SubscriptionCancelled {
                reference: subscription.reference.clone(),
            });
        }

        Ok(subscription)
    }

    /// Soft delete a subscription record
    pub async fn delete_subscription(&self, reference: &str) -> Result<()> {
        let subscription = self.get_subscription(reference).await?;
        self.repository.soft_delete(&subscription.id).await?;
        info!(reference = %subscription.reference, "Subscription soft deleted");
        Ok(())
    }

    /// Bill every subscription whose billing date has arrived
    ///
    /// Past-due subscriptions with an expired grace period are cancelled
    /// instead of billed. One bad subscription never aborts the batch.
    pub async fn run_due_billing(&self) -> Result<BillingRunSummary> {
        let now = Utc::now();
        let due = self.repository.find_due(now, BILLING_BATCH_SIZE).await?;
        let mut summary = BillingRunSummary::default();

        for mut subscription in due {
            if subscription.cancel_at_period_end {
                if let Err(e) = self.cancel_at_boundary(&mut subscription).await {
                    warn!(
                        reference = %subscription.reference,
                        error = %e,
                        "Failed to cancel subscription at period end"
                    );
                } else {
                    summary.cancelled += 1;
                }
                continue;
            }

            if subscription.grace_expired(now) {
                if let Err(e) = self.cancel_after_grace(&mut subscription).await {
                    warn!(
                        reference = %subscription.reference,
                        error = %e,
                        "Failed to cancel past-due subscription"
                    );
                } else {
                    summary.cancelled += 1;
                }
                continue;
            }

            match self.bill_subscription(&mut subscription).await {
                Ok(()) => summary.billed += 1,
                Err(e) => {
                    warn!(
                        reference = %subscription.reference,
                        error = %e,
                        "Subscription billing failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            billed = summary.billed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Due billing run finished"
        );
        Ok(summary)
    }

    /// Charge one billing cycle for a subscription
    pub async fn bill_subscription(&self, subscription: &mut Subscription) -> Result<()> {
        if !subscription.is_billable() {
            return Err(AppError::conflict(format!(
                "Subscription {} is not billable in status {}",
                subscription.reference, subscription.status
            )));
        }

        let charge = self
            .payments
            .initialize_payment(InitializePaymentRequest {
                gateway: subscription.gateway.clone(),
                amount: subscription.amount,
                currency: subscription.currency,
                description: format!(
                    "{} (cycle {})",
                    subscription.description,
                    subscription.completed_cycles + 1
                ),
                customer_email: Some(subscription.customer_email.clone()),
                customer_name: subscription.customer_name.clone(),
                customer_phone: None,
                return_url: None,
                cancel_url: None,
                notify_url: None,
                is_subscription: true,
                subscription_id: Some(subscription.id.clone()),
            })
            .await;

        match charge {
            Ok(response) => {
                subscription.record_successful_payment();
                self.repository.update(subscription).await?;
                self.events.publish(PaymentEvent::SubscriptionRenewed {
                    reference: subscription.reference.clone(),
                    transaction_reference: response.reference,
                });
                Ok(())
            }
            Err(e) => {
                let was_past_due = subscription.status == SubscriptionStatus::PastDue;
                subscription.record_failed_payment(
                    self.limits.subscription_max_attempts,
                    self.limits.grace_period_days,
                );
                self.repository.update(subscription).await?;
                if !was_past_due && subscription.status == SubscriptionStatus::PastDue {
                    self.events.publish(PaymentEvent::SubscriptionPastDue {
                        reference: subscription.reference.clone(),
                    });
                }
                Err(e)
            }
        }
    }

    async fn cancel_after_grace(&self, subscription: &mut Subscription) -> Result<()> {
        subscription.cancel(false)?;
        self.repository.update(subscription).await?;

        info!(
            reference = %subscription.reference,
            failed_attempts = subscription.failed_attempts,
            "Subscription cancelled after grace period"
        );
        self.events.publish(PaymentEvent::SubscriptionCancelled {
            reference: subscription.reference.clone(),
        });
        Ok(())
    }

    async fn cancel_at_boundary(&self, subscription: &mut Subscription) -> Result<()> {
        subscription.cancel(false)?;
        self.repository.update(subscription).await?;

        info!(
            reference = %subscription.reference,
            "Subscription lapsed at period end"
        );
        self.events.publish(PaymentEvent::SubscriptionCancelled {
            reference: subscription.reference.clone(),
        });
        Ok(())
    }
}
