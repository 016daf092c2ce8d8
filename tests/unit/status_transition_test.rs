// Transaction lifecycle transition rules

use paybridge::core::Currency;
use paybridge::modules::transactions::models::{
    Transaction, TransactionStatus, NON_RETRYABLE_ERROR_CODES,
};
use rust_decimal_macros::dec;

use TransactionStatus::*;

const ALL_STATUSES: [TransactionStatus; 10] = [
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
];

fn payment() -> Transaction {
    Transaction::new_payment(
        "stripe".to_string(),
        dec!(250.00),
        Currency::USD,
        "Order".to_string(),
        None,
        None,
        None,
    )
    .expect("Failed to create payment")
}

#[test]
fn test_terminal_statuses_allow_nothing() {
    for terminal in [Failed, Cancelled, Refunded, Voided, Expired] {
        assert!(terminal.is_terminal());
        for next in ALL_STATUSES {
            assert!(
                !terminal.can_transition_to(next),
                "{} must not transition to {}",
                terminal,
                next
            );
        }
    }
}

#[test]
fn test_completed_only_enters_refund_states() {
    for next in ALL_STATUSES {
        let allowed = matches!(next, Refunded | PartiallyRefunded);
        assert_eq!(
            Completed.can_transition_to(next),
            allowed,
            "completed -> {} should be {}",
            next,
            allowed
        );
    }
}

#[test]
fn test_no_backward_transitions() {
    // Once past pending, nothing returns to pending.
    for status in ALL_STATUSES {
        assert!(!status.can_transition_to(Pending));
    }
    // Processing is only reachable from pending.
    for status in ALL_STATUSES {
        if status != Pending {
            assert!(!status.can_transition_to(Processing));
        }
    }
}

#[test]
fn test_authorized_paths() {
    assert!(Authorized.can_transition_to(Completed));
    assert!(Authorized.can_transition_to(Voided));
    assert!(Authorized.can_transition_to(Failed));
    assert!(!Authorized.can_transition_to(Refunded));
    assert!(!Authorized.can_transition_to(Expired));
}

#[test]
fn test_partial_refund_can_continue_or_finish() {
    assert!(PartiallyRefunded.can_transition_to(PartiallyRefunded));
    assert!(PartiallyRefunded.can_transition_to(Refunded));
    assert!(!PartiallyRefunded.can_transition_to(Completed));
}

#[test]
fn test_transition_rejection_preserves_state() {
    let mut tx = payment();
    tx.transition_to(Completed).expect("pending -> completed");

    let result = tx.transition_to(Failed);
    assert!(result.is_err());
    assert_eq!(tx.status, Completed);
}

#[test]
fn test_completed_at_set_once() {
    let mut tx = payment();
    assert!(tx.completed_at.is_none());
    tx.transition_to(Processing).expect("pending -> processing");
    assert!(tx.completed_at.is_none());
    tx.transition_to(Completed).expect("processing -> completed");
    assert!(tx.completed_at.is_some());
}

#[test]
fn test_non_retryable_error_codes_block_retry() {
    for code in NON_RETRYABLE_ERROR_CODES {
        let mut tx = payment();
        tx.transition_to(Failed).expect("pending -> failed");
        tx.error_code = Some(code.to_string());
        assert!(!tx.can_retry(3), "{} must block retries", code);
    }
}

#[test]
fn test_retry_budget_enforced() {
    let mut tx = payment();
    tx.transition_to(Failed).expect("pending -> failed");

    for attempts in 0..3 {
        tx.retry_count = attempts;
        assert!(tx.can_retry(3));
    }
    tx.retry_count = 3;
    assert!(!tx.can_retry(3));
}
