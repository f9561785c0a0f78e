//! Prometheus metrics for forum-service.
//!
//! Exposes vote, moderation and view-cache collectors plus the `/metrics`
//! handler.

use actix_web::HttpResponse;
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    /// Committed votes segmented by ledger transition (insert/retract/flip),
    /// plus refused votes (conflict/rejected).
    pub static ref VOTES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "forum_votes_total",
        "Vote ledger operations segmented by outcome",
        &["outcome"]
    )
    .expect("failed to register forum_votes_total");

    /// Moderation transitions (report/queue/ban/flag) and whether they applied.
    pub static ref MODERATION_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "forum_moderation_transitions_total",
        "Moderation transitions segmented by kind and result",
        &["kind", "result"]
    )
    .expect("failed to register forum_moderation_transitions_total");

    /// View cache events (hit/miss/invalidate).
    pub static ref VIEW_CACHE_EVENTS: IntCounterVec = register_int_counter_vec!(
        "forum_view_cache_events_total",
        "View cache events segmented by outcome",
        &["event"]
    )
    .expect("failed to register forum_view_cache_events_total");
}

pub fn record_moderation(kind: &str, result: &crate::error::Result<impl Sized>) {
    let label = match result {
        Ok(_) => "applied",
        Err(err) if err.is_retryable() => "conflict",
        Err(_) => "rejected",
    };
    MODERATION_TRANSITIONS_TOTAL
        .with_label_values(&[kind, label])
        .inc();
}

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
