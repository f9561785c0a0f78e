use crate::domain::{CastVoteRequest, RecomputeCountersRequest, Viewer};
use crate::error::Result;
use crate::AppState;
use actix_web::{web, HttpResponse};

/// POST /api/v1/votes
///
/// Repeating the current direction retracts the vote; the opposite direction
/// flips it.
pub async fn cast_vote(
    state: web::Data<AppState>,
    viewer: Viewer,
    req: web::Json<CastVoteRequest>,
) -> Result<HttpResponse> {
    let outcome = state.votes.cast_vote(&viewer, req.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// POST /api/v1/moderation/recompute
pub async fn recompute_counters(
    state: web::Data<AppState>,
    viewer: Viewer,
    req: web::Json<RecomputeCountersRequest>,
) -> Result<HttpResponse> {
    let counters = state
        .votes
        .recompute_counters(&viewer, req.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(counters))
}
