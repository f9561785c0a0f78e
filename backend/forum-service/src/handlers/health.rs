use crate::{AppState, SERVICE_NAME};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Liveness: the process is up and serving
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness: storage answers and change propagation is subscribed
pub async fn ready(state: web::Data<AppState>) -> HttpResponse {
    let storage = state.store.health_check().await;
    let subscriptions = state.propagator.active_subscriptions().await;

    match storage {
        Ok(()) if subscriptions > 0 => HttpResponse::Ok().json(json!({
            "status": "ready",
            "service": SERVICE_NAME,
            "subscriptions": subscriptions,
        })),
        Ok(()) => HttpResponse::ServiceUnavailable().json(json!({
            "status": "not_ready",
            "service": SERVICE_NAME,
            "error": "change propagation not started",
        })),
        Err(e) => HttpResponse::ServiceUnavailable().json(json!({
            "status": "not_ready",
            "service": SERVICE_NAME,
            "error": format!("storage check failed: {}", e),
        })),
    }
}
