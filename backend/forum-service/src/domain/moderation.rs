//! Moderation records and their state machines
//!
//! Report: `pending -> resolved`.
//! Queue item: `pending -> approved | rejected`.
//! Every transition out of a non-pending state is a conflict.

use super::TargetKind;
use crate::error::{ConflictReason, ForumError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Resolved => "resolved",
        }
    }

    pub fn resolve(self) -> Result<ReportStatus> {
        match self {
            ReportStatus::Pending => Ok(ReportStatus::Resolved),
            ReportStatus::Resolved => Err(ForumError::Conflict(
                ConflictReason::ReportAlreadyResolved,
            )),
        }
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "resolved" => Ok(ReportStatus::Resolved),
            other => Err(format!("unknown report status: {}", other)),
        }
    }
}

impl TryFrom<String> for ReportStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// What the moderator decided about the reported content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportAction {
    /// Soft-delete the reported item
    Delete,
    /// Leave the item alone; only the report changes
    #[serde(alias = "approve")]
    Keep,
}

impl ReportAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportAction::Delete => "delete",
            ReportAction::Keep => "keep",
        }
    }
}

impl FromStr for ReportAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "delete" => Ok(ReportAction::Delete),
            "keep" | "approve" => Ok(ReportAction::Keep),
            other => Err(format!("unknown report action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Option<Uuid>,
    /// Stands in for the reporter when the report was filed anonymously
    pub reporter_token: Option<String>,
    pub target_id: Uuid,
    #[sqlx(try_from = "String")]
    pub target_kind: TargetKind,
    pub reason: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ReportStatus,
    pub resolution: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Committed report resolution plus whether its side effect hit anything
#[derive(Debug, Clone, Serialize)]
pub struct ReportResolution {
    pub report: Report,
    pub target_deleted: bool,
    /// Post whose views are affected by the side effect
    pub affected_post_id: Option<Uuid>,
    pub affected_community_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Approved,
    Rejected,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Approved => "approved",
            QueueStatus::Rejected => "rejected",
        }
    }

    pub fn review(self, decision: QueueDecision) -> Result<QueueStatus> {
        match self {
            QueueStatus::Pending => Ok(match decision {
                QueueDecision::Approve => QueueStatus::Approved,
                QueueDecision::Reject => QueueStatus::Rejected,
            }),
            QueueStatus::Approved | QueueStatus::Rejected => Err(ForumError::Conflict(
                ConflictReason::QueueItemAlreadyReviewed,
            )),
        }
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "approved" => Ok(QueueStatus::Approved),
            "rejected" => Ok(QueueStatus::Rejected),
            other => Err(format!("unknown queue status: {}", other)),
        }
    }
}

impl TryFrom<String> for QueueStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ModerationQueueItem {
    pub id: Uuid,
    pub post_id: Uuid,
    pub flagged_by: String,
    pub reason: String,
    #[sqlx(try_from = "String")]
    pub status: QueueStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Committed queue review with the post it touched
#[derive(Debug, Clone, Serialize)]
pub struct QueueReview {
    pub item: ModerationQueueItem,
    pub community_id: Option<Uuid>,
}

/// Who a ban applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BanSubject {
    User(Uuid),
    Ip(IpAddr),
}

impl fmt::Display for BanSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BanSubject::User(id) => write!(f, "user:{}", id),
            BanSubject::Ip(ip) => write!(f, "ip:{}", ip),
        }
    }
}

/// Standing ban record. Exactly one of `user_id` / `ip_address` is set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ban {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub is_shadowban: bool,
    pub is_permanent: bool,
    pub reason: String,
    pub banned_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Ban {
    pub fn subject(&self) -> Option<BanSubject> {
        if let Some(user_id) = self.user_id {
            return Some(BanSubject::User(user_id));
        }
        self.ip_address
            .as_deref()
            .and_then(|ip| ip.parse().ok())
            .map(BanSubject::Ip)
    }

    /// Full bans stop the subject from acting; shadowbans only hide them.
    pub fn blocks_actions(&self) -> bool {
        !self.is_shadowban
    }
}
