pub mod crypto;
pub mod eft;
pub mod gateway_trait;
pub mod ozow;
pub mod payfast;
pub mod paypal;
pub mod paystack;
pub mod registry;
pub mod signatures;
pub mod snapscan;
pub mod stripe;
pub mod vodapay;
pub mod zapper;

pub use gateway_trait::{
    GatewayPaymentStatus, PaymentGateway, PaymentRequest, PaymentResponse, RefundRequest,
    RefundResponse, VerificationResult, WebhookHeaders, WebhookNotification,
};
pub use registry::{GatewayInfo, GatewayRegistry};
