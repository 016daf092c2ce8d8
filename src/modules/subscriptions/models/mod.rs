pub mod subscription;

pub use subscription::{Frequency, Subscription, SubscriptionStatus};
