//! Validated request payloads
//!
//! These double as HTTP bodies; services call `validate()` before touching
//! storage.

use super::{BanSubject, CommunityRule, PostFlag, QueueDecision, ReportAction, TargetKind};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCommunityRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<CommunityRule>,
    #[serde(default)]
    pub require_post_approval: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[validate(length(max = 40000))]
    #[serde(default)]
    pub body: String,
    /// Suppress the author's identity from other viewers
    #[serde(default)]
    pub anonymous: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 10000))]
    pub body: String,
    pub parent_comment_id: Option<Uuid>,
    #[serde(default)]
    pub anonymous: bool,
}

/// `direction` stays a raw integer so an unknown value is a validation error
/// rather than a deserialization failure.
#[derive(Debug, Clone, Deserialize)]
pub struct CastVoteRequest {
    pub target_id: Uuid,
    pub target_kind: TargetKind,
    pub direction: i16,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReportRequest {
    pub target_id: Uuid,
    pub target_kind: TargetKind,
    #[validate(length(min = 1, max = 100))]
    pub reason: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    /// Client-held token identifying an anonymous reporter
    #[validate(length(min = 8, max = 128))]
    pub reporter_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveReportRequest {
    pub action: ReportAction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewQueueItemRequest {
    pub decision: QueueDecision,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBanRequest {
    pub subject: BanSubject,
    #[serde(default)]
    pub is_shadowban: bool,
    #[serde(default)]
    pub is_permanent: bool,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TogglePostFlagRequest {
    pub flag: PostFlag,
    /// Explicit value makes the call idempotent; absent flips the flag
    pub value: Option<bool>,
}

/// Post-hoc flagging of a published post
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EnqueuePostRequest {
    pub post_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecomputeCountersRequest {
    pub target_id: Uuid,
    pub target_kind: TargetKind,
}
