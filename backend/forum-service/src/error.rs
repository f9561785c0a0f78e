/// Error types for forum-service
///
/// Every failure is mapped onto one of four caller-facing classes: invalid
/// input, a state conflict, missing authority, or a missing target. Storage and
/// infrastructure failures surface as 500s.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::fmt;
use thiserror::Error;

/// Why a mutation was refused against the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    ReportAlreadyResolved,
    QueueItemAlreadyReviewed,
    ConcurrentVote,
    PostLocked,
    ContentDeleted,
}

impl ConflictReason {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictReason::ReportAlreadyResolved => "already_resolved",
            ConflictReason::QueueItemAlreadyReviewed => "already_reviewed",
            ConflictReason::ConcurrentVote => "concurrent_vote",
            ConflictReason::PostLocked => "post_locked",
            ConflictReason::ContentDeleted => "content_deleted",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConflictReason::ReportAlreadyResolved => "report is already resolved",
            ConflictReason::QueueItemAlreadyReviewed => "queue item is already reviewed",
            ConflictReason::ConcurrentVote => {
                "another vote on this item was recorded concurrently, reload and retry"
            }
            ConflictReason::PostLocked => "post is locked",
            ConflictReason::ContentDeleted => "content has been deleted",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Error)]
pub enum ForumError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(ConflictReason),

    /// Caller has no identity where one is required (anonymous voting)
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    /// Caller's identity lacks the capability (non-moderator, banned user)
    #[error("Forbidden: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Change feed error: {0}")]
    ChangeFeed(#[from] change_feed::ChangeFeedError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForumError {
    /// Conflicts may succeed against fresh state; nothing else will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ForumError::Conflict(_))
    }

    /// Storage or transport failure rather than anything about the request
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            ForumError::Database(_) | ForumError::ChangeFeed(_) | ForumError::Internal(_)
        )
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            ForumError::Validation(_) => "validation_failed",
            ForumError::Conflict(reason) => reason.code(),
            ForumError::Unauthenticated(_) => "authentication_required",
            ForumError::Unauthorized(_) => "forbidden",
            ForumError::NotFound(_) => "not_found",
            ForumError::Database(_) => "database_error",
            ForumError::ChangeFeed(_) => "change_feed_error",
            ForumError::Config(_) => "config_error",
            ForumError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for ForumError {
    fn status_code(&self) -> StatusCode {
        match self {
            ForumError::Validation(_) => StatusCode::BAD_REQUEST,
            ForumError::Conflict(_) => StatusCode::CONFLICT,
            ForumError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ForumError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ForumError::NotFound(_) => StatusCode::NOT_FOUND,
            ForumError::Database(_)
            | ForumError::ChangeFeed(_)
            | ForumError::Config(_)
            | ForumError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        HttpResponse::build(status).json(serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
            "status": status.as_u16(),
            "retryable": self.is_retryable(),
        }))
    }
}

impl From<validator::ValidationErrors> for ForumError {
    fn from(err: validator::ValidationErrors) -> Self {
        ForumError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ForumError>;
