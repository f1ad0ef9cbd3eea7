//! HTTP handlers and route configuration.

mod health;
mod quota;

use actix_web::{HttpMessage, HttpRequest, web};
use chrono::Utc;
use quota_core::QuotaError;

use crate::middleware::error::AppError;
use crate::observability::RequestId;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            // Authenticated quota routes
            .service(
                web::scope("/quota")
                    .app_data(web::JsonConfig::default().error_handler(|err, req| {
                        extractor_error(err.to_string(), req)
                    }))
                    .app_data(web::QueryConfig::default().error_handler(|err, req| {
                        extractor_error(err.to_string(), req)
                    }))
                    .route("/enforce", web::post().to(quota::enforce))
                    .route("/usage", web::get().to(quota::usage)),
            ),
    );
}

/// Malformed bodies and queries get the same problem shape as other rejections.
fn extractor_error(detail: String, req: &HttpRequest) -> actix_web::Error {
    tracing::debug!(detail = %detail, path = req.path(), "Rejected malformed request");
    let error = AppError::quota(QuotaError::InvalidRequest(detail), Utc::now());
    match req.extensions().get::<RequestId>() {
        Some(id) => error.with_request_id(id).into(),
        None => error.into(),
    }
}
