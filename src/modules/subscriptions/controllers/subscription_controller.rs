use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::core::error::AppError;
use crate::modules::subscriptions::models::SubscriptionStatus;
use crate::modules::subscriptions::services::{CreateSubscriptionRequest, SubscriptionService};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<SubscriptionStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelQuery {
    #[serde(default)]
    pub at_period_end: bool,
}

/// Create a subscription
/// POST /subscriptions
pub async fn create(
    service: web::Data<Arc<SubscriptionService>>,
    request: web::Json<CreateSubscriptionRequest>,
) -> Result<HttpResponse, AppError> {
    let subscription = service.create_subscription(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(subscription))
}

/// Fetch a subscription
/// GET /subscriptions/{reference}
pub async fn get(
    service: web::Data<Arc<SubscriptionService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let subscription = service.get_subscription(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(subscription))
}

/// List subscriptions
/// GET /subscriptions
pub async fn list(
    service: web::Data<Arc<SubscriptionService>>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let subscriptions = service
        .list_subscriptions(query.status, query.limit, query.offset)
        .await?;
    Ok(HttpResponse::Ok().json(subscriptions))
}

/// Cancel a subscription, now or at the period boundary
/// POST /subscriptions/{reference}/cancel?at_period_end=true
pub async fn cancel(
    service: web::Data<Arc<SubscriptionService>>,
    path: web::Path<String>,
    query: web::Query<CancelQuery>,
) -> Result<HttpResponse, AppError> {
    let subscription = service
        .cancel_subscription(&path.into_inner(), query.at_period_end)
        .await?;
    Ok(HttpResponse::Ok().json(subscription))
}

/// Soft delete a subscription record
/// DELETE /subscriptions/{reference}
pub async fn delete(
    service: web::Data<Arc<SubscriptionService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    service.delete_subscription(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "deleted": true })))
}

/// Trigger a due-billing run
/// POST /subscriptions/billing/run
///
/// The scheduler calls the service directly; this endpoint exists for
/// operators to force a run.
pub async fn run_billing(
    service: web::Data<Arc<SubscriptionService>>,
) -> Result<HttpResponse, AppError> {
    let summary = service.run_due_billing().await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Configure subscription routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/subscriptions")
            .route("", web::post().to(create))
            .route("", web::get().to(list))
            .route("/billing/run", web::post().to(run_billing))
            .route("/{reference}", web::get().to(get))
            .route("/{reference}", web::delete().to(delete))
            .route("/{reference}/cancel", web::post().to(cancel)),
    );
}
