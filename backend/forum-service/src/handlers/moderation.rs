/// Moderation handlers. Everything except filing a report requires the
/// moderator capability, which the service layer enforces.
use super::StatusQuery;
use crate::domain::{
    CreateBanRequest, CreateReportRequest, EnqueuePostRequest, QueueStatus, ReportStatus,
    ResolveReportRequest, ReviewQueueItemRequest, TogglePostFlagRequest, Viewer,
};
use crate::error::Result;
use crate::AppState;
use actix_web::{web, HttpResponse};
use uuid::Uuid;

/// POST /api/v1/reports
pub async fn create_report(
    state: web::Data<AppState>,
    viewer: Viewer,
    req: web::Json<CreateReportRequest>,
) -> Result<HttpResponse> {
    let report = state.moderation.report(&viewer, req.into_inner()).await?;
    Ok(HttpResponse::Created().json(report))
}

/// GET /api/v1/moderation/reports?status=
pub async fn list_reports(
    state: web::Data<AppState>,
    viewer: Viewer,
    query: web::Query<StatusQuery<ReportStatus>>,
) -> Result<HttpResponse> {
    let reports = state.moderation.list_reports(&viewer, query.status).await?;
    Ok(HttpResponse::Ok().json(reports))
}

/// POST /api/v1/moderation/reports/{report_id}/resolve
pub async fn resolve_report(
    state: web::Data<AppState>,
    viewer: Viewer,
    report_id: web::Path<Uuid>,
    req: web::Json<ResolveReportRequest>,
) -> Result<HttpResponse> {
    let resolution = state
        .moderation
        .resolve_report(&viewer, report_id.into_inner(), req.action)
        .await?;
    Ok(HttpResponse::Ok().json(resolution))
}

/// GET /api/v1/moderation/queue?status=
pub async fn list_queue(
    state: web::Data<AppState>,
    viewer: Viewer,
    query: web::Query<StatusQuery<QueueStatus>>,
) -> Result<HttpResponse> {
    let items = state.moderation.list_queue(&viewer, query.status).await?;
    Ok(HttpResponse::Ok().json(items))
}

/// POST /api/v1/moderation/queue
pub async fn enqueue_post(
    state: web::Data<AppState>,
    viewer: Viewer,
    req: web::Json<EnqueuePostRequest>,
) -> Result<HttpResponse> {
    let item = state
        .moderation
        .enqueue_post(&viewer, req.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(item))
}

/// POST /api/v1/moderation/queue/{item_id}/review
pub async fn review_queue_item(
    state: web::Data<AppState>,
    viewer: Viewer,
    item_id: web::Path<Uuid>,
    req: web::Json<ReviewQueueItemRequest>,
) -> Result<HttpResponse> {
    let review = state
        .moderation
        .review_queue_item(&viewer, item_id.into_inner(), req.decision)
        .await?;
    Ok(HttpResponse::Ok().json(review))
}

/// POST /api/v1/moderation/bans
pub async fn create_ban(
    state: web::Data<AppState>,
    viewer: Viewer,
    req: web::Json<CreateBanRequest>,
) -> Result<HttpResponse> {
    let ban = state.moderation.set_ban(&viewer, req.into_inner()).await?;
    Ok(HttpResponse::Created().json(ban))
}

/// POST /api/v1/moderation/posts/{post_id}/flags
pub async fn toggle_post_flag(
    state: web::Data<AppState>,
    viewer: Viewer,
    post_id: web::Path<Uuid>,
    req: web::Json<TogglePostFlagRequest>,
) -> Result<HttpResponse> {
    let post = state
        .moderation
        .toggle_post_flag(&viewer, post_id.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(post))
}
