/// Ranked views. Storage failures degrade to an empty page flagged
/// `degraded` so clients can offer a retry; everything else is surfaced.
use crate::domain::Viewer;
use crate::error::Result;
use crate::services::{FeedPage, FeedQuery, SortStrategy};
use crate::AppState;
use actix_web::{web, HttpResponse};
use tracing::warn;
use uuid::Uuid;

pub(crate) fn degrade<T>(
    result: Result<FeedPage<T>>,
    sort: Option<SortStrategy>,
    bounds: (usize, usize),
    view: &str,
) -> Result<FeedPage<T>> {
    match result {
        Err(e) if e.is_infrastructure() => {
            warn!(view, error = %e, "Serving degraded feed");
            Ok(FeedPage::degraded(sort, bounds.0, bounds.1))
        }
        other => other,
    }
}

/// GET /api/v1/communities/{community_id}/posts
pub async fn community_posts(
    state: web::Data<AppState>,
    viewer: Viewer,
    community_id: web::Path<Uuid>,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse> {
    let community_id = community_id.into_inner();
    let result = state
        .feeds
        .community_feed(&viewer, community_id, &query)
        .await;
    let page = degrade(
        result,
        Some(query.sort.unwrap_or_default()),
        state.feeds.page_bounds(&query),
        "community",
    )?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /api/v1/feed/following
pub async fn following_feed(
    state: web::Data<AppState>,
    viewer: Viewer,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse> {
    let result = state.feeds.following_feed(&viewer, &query).await;
    let page = degrade(
        result,
        Some(query.sort.unwrap_or(SortStrategy::New)),
        state.feeds.page_bounds(&query),
        "following",
    )?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /api/v1/feed/saved
pub async fn saved_feed(
    state: web::Data<AppState>,
    viewer: Viewer,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse> {
    let result = state.feeds.saved_feed(&viewer, &query).await;
    let page = degrade(result, None, state.feeds.page_bounds(&query), "saved")?;
    Ok(HttpResponse::Ok().json(page))
}
