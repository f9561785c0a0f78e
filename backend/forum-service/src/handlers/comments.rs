use crate::domain::{CreateCommentRequest, Viewer};
use crate::error::Result;
use crate::AppState;
use actix_web::{web, HttpResponse};
use uuid::Uuid;

/// GET /api/v1/posts/{post_id}/comments
pub async fn comment_tree(
    state: web::Data<AppState>,
    viewer: Viewer,
    post_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let post_id = post_id.into_inner();
    let tree = state.feeds.comment_tree(&viewer, post_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "post_id": post_id,
        "comments": tree,
    })))
}

/// POST /api/v1/posts/{post_id}/comments
pub async fn create_comment(
    state: web::Data<AppState>,
    viewer: Viewer,
    post_id: web::Path<Uuid>,
    req: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse> {
    let comment = state
        .content
        .create_comment(&viewer, post_id.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(comment))
}
