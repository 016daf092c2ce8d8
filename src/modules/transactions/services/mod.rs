pub mod payment_service;
pub mod webhook_service;

pub use payment_service::{
    InitializePaymentRequest, InitializePaymentResponse, PaymentService, RefundPaymentRequest,
    TransactionDetails, TransactionHistory,
};
pub use webhook_service::WebhookService;
