//! PayBridge Payment Gateway Service
//!
//! A unified API over South African and international payment gateways with
//! webhook reconciliation, refund and retry bookkeeping, and recurring
//! billing.

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;

// Re-export commonly used types
pub use modules::events;
pub use modules::gateways;
pub use modules::subscriptions;
pub use modules::transactions;
