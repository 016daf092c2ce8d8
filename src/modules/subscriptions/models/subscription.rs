use chrono::{DateTime, Days, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::core::{reference, AppError, Currency, Result};

/// Billing frequency for recurring payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(10)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annually,
}

impl Frequency {
    /// Advance a billing date by one period
    ///
    /// Month-based periods use calendar arithmetic, so a Jan 31 anchor
    /// bills on the last day of shorter months.
    pub fn advance(self, date: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Frequency::Daily => date + Days::new(1),
            Frequency::Weekly => date + Days::new(7),
            Frequency::Monthly => date + Months::new(1),
            Frequency::Quarterly => date + Months::new(3),
            Frequency::Annually => date + Months::new(12),
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
            Frequency::Quarterly => write!(f, "quarterly"),
            Frequency::Annually => write!(f, "annually"),
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            "annually" => Ok(Frequency::Annually),
            _ => Err(format!("Invalid billing frequency: {}", s)),
        }
    }
}

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(10)", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Cancelled,
    Completed,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Trialing => write!(f, "trialing"),
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::PastDue => write!(f, "past_due"),
            SubscriptionStatus::Cancelled => write!(f, "cancelled"),
            SubscriptionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Recurring billing agreement
///
/// Each successful billing cycle produces a child payment transaction on
/// the subscription's gateway. The billing date always moves forward, so
/// a subscription is never charged twice for the same period.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    #[serde(skip_deserializing)]
    pub id: String,

    /// Merchant reference (SUB-)
    pub reference: String,

    pub gateway: String,
    pub customer_email: String,
    pub customer_name: Option<String>,

    pub amount: Decimal,
    pub currency: Currency,
    pub frequency: Frequency,
    pub status: SubscriptionStatus,

    pub description: String,

    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub next_billing_date: DateTime<Utc>,

    /// End of the free trial; the first charge lands here
    pub trial_ends_at: Option<DateTime<Utc>>,

    /// When set, the billing runner cancels at the period boundary
    /// instead of renewing
    pub cancel_at_period_end: bool,

    /// Consecutive failed billing attempts in the current period
    pub failed_attempts: i32,
    pub grace_period_ends_at: Option<DateTime<Utc>>,

    /// None means the subscription runs until cancelled
    pub total_cycles: Option<i32>,
    pub completed_cycles: i32,

    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_deserializing)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_deserializing)]
    pub created_at: DateTime<Utc>,
    #[serde(skip_deserializing)]
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: String,
        customer_email: String,
        customer_name: Option<String>,
        amount: Decimal,
        currency: Currency,
        frequency: Frequency,
        description: String,
        total_cycles: Option<i32>,
        trial_days: Option<i64>,
    ) -> Result<Self> {
        currency.validate_amount(amount)?;

        if customer_email.trim().is_empty() {
            return Err(AppError::validation("Customer email cannot be empty"));
        }
        if let Some(cycles) = total_cycles {
            if cycles <= 0 {
                return Err(AppError::validation(
                    "Total cycles must be positive when set",
                ));
            }
        }
        if let Some(days) = trial_days {
            if days <= 0 {
                return Err(AppError::validation("Trial days must be positive when set"));
            }
        }

        let now = Utc::now();
        // A trial replaces the first billing period; billing starts when
        // the trial lapses.
        let (status, period_end, trial_ends_at) = match trial_days {
            Some(days) => {
                let trial_end = now + Duration::days(days);
                (SubscriptionStatus::Trialing, trial_end, Some(trial_end))
            }
            None => (SubscriptionStatus::Active, frequency.advance(now), None),
        };
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            reference: reference::subscription_reference(),
            gateway,
            customer_email,
            customer_name,
            amount,
            currency,
            frequency,
            status,
            description,
            current_period_start: now,
            current_period_end: period_end,
            next_billing_date: period_end,
            trial_ends_at,
            cancel_at_period_end: false,
            failed_attempts: 0,
            grace_period_ends_at: None,
            total_cycles,
            completed_cycles: 0,
            cancelled_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_billable(&self) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }

    /// Whether the billing date has arrived
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_billable() && self.next_billing_date <= now
    }

    /// Whether a past-due subscription has exhausted its grace period
    pub fn grace_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::PastDue
            && self
                .grace_period_ends_at
                .map(|ends| ends < now)
                .unwrap_or(false)
    }

    /// Advance the billing period after a successful charge
    ///
    /// The next billing date moves strictly forward from the period end,
    /// never from the wall clock, so late billing does not drift the cycle.
    pub fn record_successful_payment(&mut self) {
        self.completed_cycles += 1;
        self.failed_attempts = 0;
        self.grace_period_ends_at = None;

        self.current_period_start = self.current_period_end;
        self.current_period_end = self.frequency.advance(self.current_period_end);
        self.next_billing_date = self.current_period_end;
        self.updated_at = Utc::now();

        if let Some(total) = self.total_cycles {
            if self.completed_cycles >= total {
                self.status = SubscriptionStatus::Completed;
                return;
            }
        }
        self.status = SubscriptionStatus::Active;
    }

    /// Record a failed charge
    ///
    /// Failures below the attempt budget leave the status untouched, so
    /// the next billing run simply tries again. Exhausting the budget
    /// moves the subscription to past due and opens the grace window.
    pub fn record_failed_payment(&mut self, max_attempts: i32, grace_days: i64) {
        let now = Utc::now();
        self.failed_attempts += 1;
        if self.failed_attempts >= max_attempts && self.status != SubscriptionStatus::PastDue {
            self.grace_period_ends_at = Some(now + Duration::days(grace_days));
            self.status = SubscriptionStatus::PastDue;
        }
        self.updated_at = now;
    }

    /// Cancel now, or flag the subscription to lapse at the period boundary
    pub fn cancel(&mut self, at_period_end: bool) -> Result<()> {
        match self.status {
            SubscriptionStatus::Cancelled => Err(AppError::conflict(format!(
                "Subscription {} is already cancelled",
                self.reference
            ))),
            SubscriptionStatus::Completed => Err(AppError::conflict(format!(
                "Subscription {} has already completed",
                self.reference
            ))),
            _ if at_period_end => {
                self.cancel_at_period_end = true;
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => {
                self.status = SubscriptionStatus::Cancelled;
                self.cancelled_at = Some(Utc::now());
                self.updated_at = Utc::now();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};
    use rust_decimal_macros::dec;

    fn subscription(frequency: Frequency) -> Subscription {
        Subscription::new(
            "paystack".to_string(),
            "subscriber@example.com".to_string(),
            None,
            dec!(99.00),
            Currency::ZAR,
            frequency,
            "Pro plan".to_string(),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_new_subscription_defaults() {
        let sub = subscription(Frequency::Monthly);
        assert!(sub.reference.starts_with("SUB-"));
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.completed_cycles, 0);
        assert_eq!(sub.next_billing_date, sub.current_period_end);
    }

    #[test]
    fn test_monthly_advance_clamps_to_month_end() {
        let jan31 = Utc.with_ymd_and_hms(2026, 1, 31, 8, 0, 0).unwrap();
        let next = Frequency::Monthly.advance(jan31);
        assert_eq!(next.month(), 2);
        assert_eq!(next.day(), 28);
    }

    #[test]
    fn test_successful_payment_advances_period() {
        let mut sub = subscription(Frequency::Weekly);
        let old_end = sub.current_period_end;

        sub.record_successful_payment();
        assert_eq!(sub.completed_cycles, 1);
        assert_eq!(sub.current_period_start, old_end);
        assert!(sub.next_billing_date > old_end);
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_billing_date_strictly_advances() {
        let mut sub = subscription(Frequency::Daily);
        let mut previous = sub.next_billing_date;
        for _ in 0..10 {
            sub.record_successful_payment();
            assert!(sub.next_billing_date > previous);
            previous = sub.next_billing_date;
        }
    }

    #[test]
    fn test_fixed_cycles_complete() {
        let mut sub = Subscription::new(
            "paystack".to_string(),
            "subscriber@example.com".to_string(),
            None,
            dec!(50.00),
            Currency::ZAR,
            Frequency::Monthly,
            "3 month plan".to_string(),
            Some(3),
            None,
        )
        .unwrap();

        sub.record_successful_payment();
        sub.record_successful_payment();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        sub.record_successful_payment();
        assert_eq!(sub.status, SubscriptionStatus::Completed);
        assert!(sub.cancel(false).is_err());
    }

    #[test]
    fn test_trial_defers_first_billing() {
        let sub = Subscription::new(
            "paystack".to_string(),
            "subscriber@example.com".to_string(),
            None,
            dec!(99.00),
            Currency::ZAR,
            Frequency::Monthly,
            "Pro plan".to_string(),
            None,
            Some(14),
        )
        .unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Trialing);
        assert_eq!(sub.trial_ends_at, Some(sub.next_billing_date));
        assert!(sub.is_billable());
        assert!(!sub.is_due(Utc::now()));
        assert!(sub.is_due(sub.next_billing_date + Duration::seconds(1)));
    }

    #[test]
    fn test_trial_first_charge_activates() {
        let mut sub = Subscription::new(
            "paystack".to_string(),
            "subscriber@example.com".to_string(),
            None,
            dec!(99.00),
            Currency::ZAR,
            Frequency::Monthly,
            "Pro plan".to_string(),
            None,
            Some(7),
        )
        .unwrap();

        sub.record_successful_payment();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.completed_cycles, 1);
        assert!(sub.next_billing_date > sub.trial_ends_at.unwrap());
    }

    #[test]
    fn test_cancel_at_period_end_keeps_subscription_billable_until_boundary() {
        let mut sub = subscription(Frequency::Monthly);
        sub.cancel(true).unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(sub.cancel_at_period_end);
        assert!(sub.cancelled_at.is_none());

        sub.cancel(false).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    }

    #[test]
    fn test_failures_below_budget_keep_subscription_active() {
        let mut sub = subscription(Frequency::Monthly);
        sub.record_failed_payment(3, 7);
        sub.record_failed_payment(3, 7);

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.failed_attempts, 2);
        assert!(sub.grace_period_ends_at.is_none());
    }

    #[test]
    fn test_exhausted_budget_opens_grace_window() {
        let mut sub = subscription(Frequency::Monthly);
        for _ in 0..3 {
            sub.record_failed_payment(3, 7);
        }

        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        assert_eq!(sub.failed_attempts, 3);
        assert!(sub.grace_period_ends_at.is_some());
        assert!(!sub.grace_expired(Utc::now()));
        assert!(sub.grace_expired(Utc::now() + Duration::days(8)));
    }

    #[test]
    fn test_failures_past_the_budget_keep_original_grace_window() {
        let mut sub = subscription(Frequency::Monthly);
        sub.record_failed_payment(1, 7);
        let first_window = sub.grace_period_ends_at;
        sub.record_failed_payment(1, 7);

        assert_eq!(sub.failed_attempts, 2);
        assert_eq!(sub.grace_period_ends_at, first_window);
    }

    #[test]
    fn test_recovery_clears_past_due() {
        let mut sub = subscription(Frequency::Monthly);
        sub.record_failed_payment(1, 7);
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        sub.record_successful_payment();

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.failed_attempts, 0);
        assert!(sub.grace_period_ends_at.is_none());
    }

    #[test]
    fn test_cancel_is_final() {
        let mut sub = subscription(Frequency::Monthly);
        sub.cancel(false).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert!(sub.cancelled_at.is_some());
        assert!(sub.cancel(false).is_err());
        assert!(!sub.is_billable());
    }

    #[test]
    fn test_is_due() {
        let sub = subscription(Frequency::Monthly);
        assert!(!sub.is_due(Utc::now()));
        assert!(sub.is_due(sub.next_billing_date + Duration::seconds(1)));
    }
}
