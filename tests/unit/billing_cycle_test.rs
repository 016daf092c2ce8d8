// Subscription billing cycle arithmetic

use chrono::{Datelike, Duration, TimeZone, Utc};
use paybridge::core::Currency;
use paybridge::modules::subscriptions::models::{Frequency, Subscription, SubscriptionStatus};
use proptest::prelude::*;
use rust_decimal_macros::dec;

const ALL_FREQUENCIES: [Frequency; 5] = [
    Frequency::Daily,
    Frequency::Weekly,
    Frequency::Monthly,
    Frequency::Quarterly,
    Frequency::Annually,
];

fn subscription(frequency: Frequency, total_cycles: Option<i32>) -> Subscription {
    Subscription::new(
        "paystack".to_string(),
        "subscriber@example.com".to_string(),
        None,
        dec!(199.00),
        Currency::ZAR,
        frequency,
        "Plan".to_string(),
        total_cycles,
        None,
    )
    .expect("Failed to create subscription")
}

#[test]
fn test_advance_moves_forward_for_every_frequency() {
    let anchor = Utc.with_ymd_and_hms(2026, 3, 15, 9, 30, 0).unwrap();
    for frequency in ALL_FREQUENCIES {
        assert!(frequency.advance(anchor) > anchor, "{} must advance", frequency);
    }
}

#[test]
fn test_month_end_anchors_clamp() {
    let jan31 = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
    let feb = Frequency::Monthly.advance(jan31);
    assert_eq!((feb.month(), feb.day()), (2, 28));

    let leap_jan31 = Utc.with_ymd_and_hms(2028, 1, 31, 0, 0, 0).unwrap();
    let leap_feb = Frequency::Monthly.advance(leap_jan31);
    assert_eq!((leap_feb.month(), leap_feb.day()), (2, 29));
}

#[test]
fn test_quarterly_advance_is_three_calendar_months() {
    let nov30 = Utc.with_ymd_and_hms(2026, 11, 30, 0, 0, 0).unwrap();
    let next = Frequency::Quarterly.advance(nov30);
    assert_eq!((next.year(), next.month(), next.day()), (2027, 2, 28));
}

#[test]
fn test_late_billing_does_not_drift_the_cycle() {
    let mut sub = subscription(Frequency::Monthly, None);
    let scheduled = sub.next_billing_date;

    // Billing runs late; the next date still anchors on the period end.
    sub.record_successful_payment();
    assert_eq!(sub.current_period_start, scheduled);
    assert_eq!(sub.next_billing_date, Frequency::Monthly.advance(scheduled));
}

#[test]
fn test_grace_period_lifecycle() {
    let mut sub = subscription(Frequency::Monthly, None);
    sub.record_failed_payment(2, 7);
    assert_eq!(sub.status, SubscriptionStatus::Active);
    sub.record_failed_payment(2, 7);

    assert_eq!(sub.status, SubscriptionStatus::PastDue);
    assert!(sub.is_billable());
    assert!(!sub.grace_expired(Utc::now() + Duration::days(6)));
    assert!(sub.grace_expired(Utc::now() + Duration::days(8)));
}

#[test]
fn test_fixed_cycle_subscription_completes_exactly() {
    let mut sub = subscription(Frequency::Weekly, Some(4));
    for cycle in 1..=4 {
        assert!(sub.is_billable(), "cycle {} should be billable", cycle);
        sub.record_successful_payment();
    }
    assert_eq!(sub.status, SubscriptionStatus::Completed);
    assert_eq!(sub.completed_cycles, 4);
    assert!(!sub.is_billable());
}

proptest! {
    /// The billing date strictly advances over any run of successes and
    /// failures, for every frequency
    #[test]
    fn test_billing_date_strictly_monotonic(
        frequency_idx in 0usize..5,
        outcomes in prop::collection::vec(any::<bool>(), 1..30),
    ) {
        let mut sub = subscription(ALL_FREQUENCIES[frequency_idx], None);
        let mut previous = sub.next_billing_date;

        for success in outcomes {
            if success {
                sub.record_successful_payment();
                prop_assert!(sub.next_billing_date > previous);
                previous = sub.next_billing_date;
            } else {
                sub.record_failed_payment(3, 7);
                // Failures hold the billing date so the charge is retried.
                prop_assert_eq!(sub.next_billing_date, previous);
            }
        }
    }

    /// Completed cycles never exceed the configured total
    #[test]
    fn test_completed_cycles_bounded(
        total in 1i32..20,
        extra_attempts in 0usize..10,
    ) {
        let mut sub = subscription(Frequency::Daily, Some(total));
        for _ in 0..(total as usize + extra_attempts) {
            if !sub.is_billable() {
                break;
            }
            sub.record_successful_payment();
        }
        prop_assert_eq!(sub.completed_cycles, total);
        prop_assert_eq!(sub.status, SubscriptionStatus::Completed);
    }
}
