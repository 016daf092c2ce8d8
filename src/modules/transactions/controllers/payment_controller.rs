use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::core::error::AppError;
use crate::modules::transactions::models::TransactionStatus;
use crate::modules::transactions::services::{
    InitializePaymentRequest, PaymentService, RefundPaymentRequest,
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub gateway: Option<String>,
    pub status: Option<TransactionStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// Start a payment
/// POST /initialize
pub async fn initialize(
    service: web::Data<Arc<PaymentService>>,
    request: web::Json<InitializePaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let response = service.initialize_payment(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(response))
}

/// Verify a payment against its gateway
/// GET /verify/{reference}
pub async fn verify(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let details = service.verify_payment(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(details))
}

/// Stored state of a payment
/// GET /status/{reference}
pub async fn status(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let details = service.get_status(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(details))
}

/// Refund a completed payment
/// POST /refund/{reference}
pub async fn refund(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
    request: web::Json<RefundPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let details = service
        .refund_payment(&path.into_inner(), request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(details))
}

/// Retry a failed payment
/// POST /retry/{reference}
pub async fn retry(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let response = service.retry_payment(&path.into_inner()).await?;
    Ok(HttpResponse::Created().json(response))
}

/// Payment with its refunds and retries
/// GET /history/{reference}
pub async fn history(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let history = service.get_history(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(history))
}

/// Configure payment routes, mounted under /api/v1/payments
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/initialize", web::post().to(initialize))
        .route("/verify/{reference}", web::get().to(verify))
        .route("/status/{reference}", web::get().to(status))
        .route("/refund/{reference}", web::post().to(refund))
        .route("/retry/{reference}", web::post().to(retry))
        .route("/history/{reference}", web::get().to(history));
}
