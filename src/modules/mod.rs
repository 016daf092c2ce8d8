pub mod events;
pub mod gateways;
pub mod health;
pub mod subscriptions;
pub mod transactions;
