use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde_json::json;

use super::payment_controller::ListQuery;
use crate::core::error::AppError;
use crate::modules::transactions::services::PaymentService;

/// List transactions with filters
/// GET /admin
pub async fn list_transactions(
    service: web::Data<Arc<PaymentService>>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let transactions = service
        .list_transactions(
            query.gateway.as_deref(),
            query.status,
            query.limit,
            query.offset,
        )
        .await?;
    Ok(HttpResponse::Ok().json(transactions))
}

/// Full transaction history for operators
/// GET /admin/{reference}
pub async fn get_transaction(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let history = service.get_history(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(history))
}

/// Manually settle a transaction after bank statement reconciliation
/// POST /admin/{reference}/reconcile
pub async fn reconcile(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let details = service.reconcile_manual(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(details))
}

/// Soft delete a transaction record
/// DELETE /admin/{reference}
pub async fn delete_transaction(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    service.delete_transaction(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "deleted": true })))
}

/// Configure admin routes, mounted under /api/v1/payments
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("", web::get().to(list_transactions))
            .route("/{reference}", web::get().to(get_transaction))
            .route("/{reference}/reconcile", web::post().to(reconcile))
            .route("/{reference}", web::delete().to(delete_transaction)),
    );
}
