use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::core::error::AppError;
use crate::modules::gateways::services::GatewayRegistry;

/// List all registered payment gateways
/// GET /gateways
/// Returns each gateway with its supported currencies and capabilities
pub async fn list_gateways(
    registry: web::Data<Arc<GatewayRegistry>>,
) -> Result<HttpResponse, AppError> {
    let gateways = registry.list();
    Ok(HttpResponse::Ok().json(gateways))
}

/// Configure gateway routes, mounted under /api/v1/payments
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/gateways", web::get().to(list_gateways));
}
