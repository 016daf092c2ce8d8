use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::core::Currency;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Domain events emitted by the payment and subscription services
///
/// Events are broadcast in-process; a dropped receiver loses events rather
/// than blocking the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    PaymentInitialized {
        reference: String,
        gateway: String,
        amount: Decimal,
        currency: Currency,
    },
    PaymentCompleted {
        reference: String,
        gateway: String,
        amount: Decimal,
        currency: Currency,
    },
    PaymentFailed {
        reference: String,
        gateway: String,
        error_code: Option<String>,
    },
    PaymentCancelled {
        reference: String,
        gateway: String,
    },
    PaymentExpired {
        reference: String,
        gateway: String,
    },
    RefundIssued {
        reference: String,
        refund_reference: String,
        amount: Decimal,
    },
    PaymentRetried {
        reference: String,
        retry_reference: String,
        attempt: i32,
    },
    SubscriptionCreated {
        reference: String,
        gateway: String,
    },
    SubscriptionRenewed {
        reference: String,
        transaction_reference: String,
    },
    SubscriptionPastDue {
        reference: String,
    },
    SubscriptionCancelled {
        reference: String,
    },
}

impl PaymentEvent {
    /// Merchant reference the event is about
    pub fn reference(&self) -> &str {
        match self {
            PaymentEvent::PaymentInitialized { reference, .. }
            | PaymentEvent::PaymentCompleted { reference, .. }
            | PaymentEvent::PaymentFailed { reference, .. }
            | PaymentEvent::PaymentCancelled { reference, .. }
            | PaymentEvent::PaymentExpired { reference, .. }
            | PaymentEvent::RefundIssued { reference, .. }
            | PaymentEvent::PaymentRetried { reference, .. }
            | PaymentEvent::SubscriptionCreated { reference, .. }
            | PaymentEvent::SubscriptionRenewed { reference, .. }
            | PaymentEvent::SubscriptionPastDue { reference }
            | PaymentEvent::SubscriptionCancelled { reference } => reference,
        }
    }
}

/// In-process event bus backed by a broadcast channel
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PaymentEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: PaymentEvent) {
        debug!(reference = %event.reference(), "Publishing payment event");
        // A send error only means nobody is listening right now.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentEvent> {
        self.sender.subscribe()
    }

    /// Spawn a subscriber that logs every event
    pub fn spawn_logging_subscriber(&self) {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        info!(reference = %event.reference(), event = ?event, "Payment event");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        info!(skipped, "Event log subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(PaymentEvent::PaymentCompleted {
            reference: "TXN-1".to_string(),
            gateway: "payfast".to_string(),
            amount: dec!(100.00),
            currency: Currency::ZAR,
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.reference(), "TXN-1");
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(PaymentEvent::SubscriptionCancelled {
            reference: "SUB-1".to_string(),
        });
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(PaymentEvent::PaymentFailed {
            reference: "TXN-2".to_string(),
            gateway: "stripe".to_string(),
            error_code: Some("card_declined".to_string()),
        });

        assert_eq!(first.recv().await.unwrap().reference(), "TXN-2");
        assert_eq!(second.recv().await.unwrap().reference(), "TXN-2");
    }
}
