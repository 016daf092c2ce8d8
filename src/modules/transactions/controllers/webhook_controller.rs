use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::info;

use crate::core::error::AppError;
use crate::modules::gateways::services::WebhookHeaders;
use crate::modules::transactions::services::WebhookService;

/// Receive a gateway webhook
/// POST /webhook/{gateway}
///
/// The body is kept as raw bytes: every signature scheme is computed over
/// the exact payload the gateway sent, before any deserialization.
pub async fn receive(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    service: web::Data<Arc<WebhookService>>,
) -> Result<HttpResponse, AppError> {
    let gateway = path.into_inner();

    info!(
        gateway = %gateway,
        content_length = body.len(),
        "Webhook received"
    );

    let headers: WebhookHeaders = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    service.process(&gateway, &headers, &body).await?;

    Ok(HttpResponse::Ok().json(json!({ "received": true })))
}

/// Configure webhook routes, mounted under /api/v1/payments
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/webhook/{gateway}", web::post().to(receive));
}
