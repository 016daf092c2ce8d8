// Refund arithmetic invariants for payment transactions

use paybridge::core::Currency;
use paybridge::modules::transactions::models::{Transaction, TransactionStatus, TransactionType};
use proptest::prelude::*;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn completed_payment(amount: Decimal) -> Transaction {
    let mut tx = Transaction::new_payment(
        "paystack".to_string(),
        amount,
        Currency::ZAR,
        "Order".to_string(),
        None,
        None,
        None,
    )
    .expect("Failed to create payment");
    tx.transition_to(TransactionStatus::Completed)
        .expect("Failed to complete payment");
    tx
}

#[test]
fn test_full_refund_consumes_balance() {
    let tx = completed_payment(dec!(500.00));
    assert_eq!(tx.refundable_amount(Decimal::ZERO), dec!(500.00));
    assert_eq!(tx.refundable_amount(dec!(500.00)), Decimal::ZERO);
}

#[test]
fn test_refund_child_carries_parent_details() {
    let tx = completed_payment(dec!(500.00));
    let refund = Transaction::new_refund(&tx, dec!(120.00)).expect("Failed to create refund");

    assert_eq!(refund.transaction_type, TransactionType::Refund);
    assert_eq!(refund.currency, tx.currency);
    assert_eq!(refund.gateway, tx.gateway);
    assert_eq!(refund.parent_transaction_id.as_deref(), Some(tx.id.as_str()));
    assert!(refund.reference.starts_with("RFD-"));
}

#[test]
fn test_refund_rejects_invalid_amounts() {
    let tx = completed_payment(dec!(500.00));
    assert!(Transaction::new_refund(&tx, dec!(-1.00)).is_err());
    assert!(Transaction::new_refund(&tx, Decimal::ZERO).is_err());
    assert!(Transaction::new_refund(&tx, dec!(10.005)).is_err());
}

#[test]
fn test_refund_children_are_not_refundable() {
    let tx = completed_payment(dec!(500.00));
    let mut refund = Transaction::new_refund(&tx, dec!(500.00)).expect("Failed to create refund");
    refund
        .transition_to(TransactionStatus::Completed)
        .expect("Failed to complete refund");
    assert!(!refund.can_refund());
}

proptest! {
    /// The refundable balance never goes negative, whatever the refund total
    #[test]
    fn test_refundable_amount_never_negative(
        amount_cents in 100u64..100_000_000u64,
        refunded_cents in 0u64..200_000_000u64,
    ) {
        let amount = Decimal::from_u64(amount_cents).unwrap() / Decimal::from(100);
        let refunded = Decimal::from_u64(refunded_cents).unwrap() / Decimal::from(100);

        let tx = completed_payment(amount);
        prop_assert!(tx.refundable_amount(refunded) >= Decimal::ZERO);
    }

    /// Refunded total plus remaining balance always equals the original amount
    /// while the refund total stays within the amount
    #[test]
    fn test_partial_refund_conserves_amount(
        amount_cents in 100u64..100_000_000u64,
        refunded_fraction in 0u64..=100u64,
    ) {
        let amount = Decimal::from_u64(amount_cents).unwrap() / Decimal::from(100);
        let refunded = (amount * Decimal::from_u64(refunded_fraction).unwrap()
            / Decimal::from(100)).round_dp(2);

        let tx = completed_payment(amount);
        let remaining = tx.refundable_amount(refunded);
        prop_assert_eq!(refunded + remaining, amount);
    }

    /// A sequence of partial refunds never exceeds the original amount
    #[test]
    fn test_refund_sequence_bounded_by_amount(
        amount_cents in 1000u64..10_000_000u64,
        parts in prop::collection::vec(1u64..1000u64, 1..10),
    ) {
        let amount = Decimal::from_u64(amount_cents).unwrap() / Decimal::from(100);
        let tx = completed_payment(amount);

        let mut total_refunded = Decimal::ZERO;
        for part_cents in parts {
            let requested = Decimal::from_u64(part_cents).unwrap() / Decimal::from(100);
            let refundable = tx.refundable_amount(total_refunded);
            // The service grants at most the remaining balance.
            let granted = requested.min(refundable);
            total_refunded += granted;
            prop_assert!(total_refunded <= amount);
        }
    }
}
