//! Moderation pipeline
//!
//! Reports (`pending -> resolved`), the pre-publication queue
//! (`pending -> approved | rejected`), bans and post flag toggles. State
//! checks and side effects commit together in the store; this layer adds the
//! moderator capability check, metrics, logging and change notification.

use super::propagation::{tables, ChangeNotifier};
use super::ensure_not_banned;
use crate::domain::{
    Ban, BanSubject, CreateBanRequest, CreateReportRequest, EnqueuePostRequest,
    ModerationQueueItem, Post, QueueDecision, QueueReview, QueueStatus, Report, ReportAction,
    ReportResolution, ReportStatus, TargetKind, TogglePostFlagRequest, Viewer,
};
use crate::error::{ForumError, Result};
use crate::metrics::record_moderation;
use crate::repository::{ForumStore, NewBan, NewReport};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

pub struct ModerationService {
    store: Arc<dyn ForumStore>,
    notifier: ChangeNotifier,
}

impl ModerationService {
    pub fn new(store: Arc<dyn ForumStore>, notifier: ChangeNotifier) -> Self {
        Self { store, notifier }
    }

    /// File a report. Signed-in users report under their id; anonymous
    /// callers must present a reporter token.
    pub async fn report(&self, viewer: &Viewer, request: CreateReportRequest) -> Result<Report> {
        request.validate()?;
        if viewer.is_anonymous() && request.reporter_token.is_none() {
            return Err(ForumError::Validation(
                "anonymous reports require a reporter_token".to_string(),
            ));
        }
        ensure_not_banned(self.store.as_ref(), viewer, "reporting").await?;

        let result = self
            .store
            .create_report(NewReport {
                reporter_id: viewer.user_id,
                reporter_token: request.reporter_token,
                target_id: request.target_id,
                target_kind: request.target_kind,
                reason: request.reason,
                description: request.description,
            })
            .await;
        record_moderation("report", &result);
        let report = result?;

        info!(
            report_id = %report.id,
            target_id = %report.target_id,
            target_kind = %report.target_kind,
            reason = %report.reason,
            "Report filed"
        );
        self.notifier
            .row_changed(
                tables::REPORTS,
                report.id,
                json!({ "status": report.status, "target_id": report.target_id }),
            )
            .await;

        Ok(report)
    }

    /// Resolving with `delete` soft-deletes the target in the same atomic
    /// unit; a report that is no longer pending is a conflict.
    pub async fn resolve_report(
        &self,
        viewer: &Viewer,
        report_id: Uuid,
        action: ReportAction,
    ) -> Result<ReportResolution> {
        let moderator_id = viewer.require_moderator()?;

        let result = self
            .store
            .resolve_report(report_id, action, moderator_id)
            .await;
        record_moderation("report_resolve", &result);
        let resolution = result.map_err(|e| {
            warn!(report_id = %report_id, error = %e, "Report resolution refused");
            e
        })?;

        info!(
            report_id = %report_id,
            moderator_id = %moderator_id,
            action = action.as_str(),
            target_deleted = resolution.target_deleted,
            "Report resolved"
        );

        if resolution.target_deleted {
            let table = match resolution.report.target_kind {
                TargetKind::Post => tables::POSTS,
                TargetKind::Comment => tables::COMMENTS,
            };
            self.notifier
                .row_changed(
                    table,
                    resolution.report.target_id,
                    json!({
                        "post_id": resolution.affected_post_id,
                        "community_id": resolution.affected_community_id,
                        "deleted": true,
                    }),
                )
                .await;
        }
        self.notifier
            .row_changed(
                tables::REPORTS,
                report_id,
                json!({ "status": resolution.report.status }),
            )
            .await;

        Ok(resolution)
    }

    /// Oldest first, so the queue drains in filing order
    pub async fn list_reports(
        &self,
        viewer: &Viewer,
        status: Option<ReportStatus>,
    ) -> Result<Vec<Report>> {
        viewer.require_moderator()?;
        self.store.list_reports(status).await
    }

    /// Approval publishes the post, rejection soft-deletes it
    pub async fn review_queue_item(
        &self,
        viewer: &Viewer,
        item_id: Uuid,
        decision: QueueDecision,
    ) -> Result<QueueReview> {
        let moderator_id = viewer.require_moderator()?;

        let result = self
            .store
            .review_queue_item(item_id, decision, moderator_id)
            .await;
        record_moderation("queue_review", &result);
        let review = result.map_err(|e| {
            warn!(item_id = %item_id, error = %e, "Queue review refused");
            e
        })?;

        info!(
            item_id = %item_id,
            post_id = %review.item.post_id,
            moderator_id = %moderator_id,
            status = review.item.status.as_str(),
            "Queue item reviewed"
        );

        self.notifier
            .row_changed(
                tables::POSTS,
                review.item.post_id,
                json!({ "community_id": review.community_id }),
            )
            .await;
        self.notifier
            .row_changed(
                tables::MODERATION_QUEUE,
                item_id,
                json!({ "post_id": review.item.post_id, "status": review.item.status }),
            )
            .await;

        Ok(review)
    }

    pub async fn list_queue(
        &self,
        viewer: &Viewer,
        status: Option<QueueStatus>,
    ) -> Result<Vec<ModerationQueueItem>> {
        viewer.require_moderator()?;
        self.store.list_queue(status).await
    }

    /// Flag a post for review after publication
    pub async fn enqueue_post(
        &self,
        viewer: &Viewer,
        request: EnqueuePostRequest,
    ) -> Result<ModerationQueueItem> {
        let moderator_id = viewer.require_moderator()?;
        request.validate()?;
        let post_id = request.post_id;
        let result = self
            .store
            .enqueue_post(post_id, &format!("moderator:{}", moderator_id), &request.reason)
            .await;
        record_moderation("queue_enqueue", &result);
        let item = result?;

        info!(item_id = %item.id, post_id = %post_id, "Post queued for review");
        self.notifier
            .row_changed(
                tables::MODERATION_QUEUE,
                item.id,
                json!({ "post_id": post_id, "status": item.status }),
            )
            .await;
        Ok(item)
    }

    /// A full ban blocks acting; a shadowban only hides the subject's content
    pub async fn set_ban(&self, viewer: &Viewer, request: CreateBanRequest) -> Result<Ban> {
        let moderator_id = viewer.require_moderator()?;
        request.validate()?;
        if request.subject == BanSubject::User(moderator_id) {
            return Err(ForumError::Validation("cannot ban yourself".to_string()));
        }

        let result = self
            .store
            .create_ban(NewBan {
                subject: request.subject,
                is_shadowban: request.is_shadowban,
                is_permanent: request.is_permanent,
                reason: request.reason,
                banned_by: Some(moderator_id),
            })
            .await;
        record_moderation("ban", &result);
        let ban = result?;

        warn!(
            ban_id = %ban.id,
            subject = %request.subject,
            shadowban = ban.is_shadowban,
            permanent = ban.is_permanent,
            moderator_id = %moderator_id,
            "Ban issued"
        );
        self.notifier
            .row_changed(
                tables::BANS,
                ban.id,
                json!({
                    "user_id": ban.user_id,
                    "ip_address": ban.ip_address,
                    "is_shadowban": ban.is_shadowban,
                }),
            )
            .await;

        Ok(ban)
    }

    /// Pin, lock or soft-delete a post. An explicit value sets the flag,
    /// otherwise it flips.
    pub async fn toggle_post_flag(
        &self,
        viewer: &Viewer,
        post_id: Uuid,
        request: TogglePostFlagRequest,
    ) -> Result<Post> {
        let moderator_id = viewer.require_moderator()?;

        let result = self
            .store
            .set_post_flag(post_id, request.flag, request.value)
            .await;
        record_moderation("post_flag", &result);
        let post = result?;

        info!(
            post_id = %post_id,
            moderator_id = %moderator_id,
            flag = request.flag.column(),
            value = request.flag.get(&post),
            "Post flag set"
        );
        self.notifier.post_changed(&post, false).await;

        Ok(post)
    }
}
