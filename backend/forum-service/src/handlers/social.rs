use crate::domain::Viewer;
use crate::error::Result;
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use uuid::Uuid;

pub async fn save_post(
    state: web::Data<AppState>,
    viewer: Viewer,
    post_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let changed = state.social.save_post(&viewer, post_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "saved": true, "changed": changed })))
}

pub async fn unsave_post(
    state: web::Data<AppState>,
    viewer: Viewer,
    post_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let changed = state
        .social
        .unsave_post(&viewer, post_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "saved": false, "changed": changed })))
}

pub async fn follow(
    state: web::Data<AppState>,
    viewer: Viewer,
    user_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let changed = state.social.follow(&viewer, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "following": true, "changed": changed })))
}

pub async fn unfollow(
    state: web::Data<AppState>,
    viewer: Viewer,
    user_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let changed = state.social.unfollow(&viewer, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "following": false, "changed": changed })))
}
