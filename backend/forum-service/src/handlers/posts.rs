/// Community and post handlers
use crate::domain::{CreateCommunityRequest, CreatePostRequest, Viewer};
use crate::error::Result;
use crate::AppState;
use actix_web::{web, HttpResponse};
use uuid::Uuid;

/// POST /api/v1/communities
pub async fn create_community(
    state: web::Data<AppState>,
    viewer: Viewer,
    req: web::Json<CreateCommunityRequest>,
) -> Result<HttpResponse> {
    let community = state
        .content
        .create_community(&viewer, req.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(community))
}

/// POST /api/v1/communities/{community_id}/posts
pub async fn create_post(
    state: web::Data<AppState>,
    viewer: Viewer,
    community_id: web::Path<Uuid>,
    req: web::Json<CreatePostRequest>,
) -> Result<HttpResponse> {
    let post = state
        .content
        .create_post(&viewer, community_id.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(post))
}

/// GET /api/v1/posts/{post_id}
pub async fn get_post(
    state: web::Data<AppState>,
    viewer: Viewer,
    post_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let post = state.content.get_post(&viewer, post_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}
