//! Shared capabilities of posts and comments
//!
//! Ranking, visibility filtering and reporting work against these traits
//! instead of relying on the two row types happening to share field names.

use super::{Comment, Post, TargetKind};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Anything carrying vote counters
pub trait Votable {
    fn target_id(&self) -> Uuid;
    fn target_kind(&self) -> TargetKind;
    fn upvotes(&self) -> i64;
    fn downvotes(&self) -> i64;

    fn net_score(&self) -> i64 {
        self.upvotes() - self.downvotes()
    }
}

/// Anything that can be reported and hidden by moderation
pub trait Moderated {
    fn author_id(&self) -> Option<Uuid>;
    fn is_deleted(&self) -> bool;
    fn is_shadowbanned(&self) -> bool;
    fn is_approved(&self) -> bool;

    /// Hidden from everyone except the author and moderators
    fn is_hidden(&self) -> bool {
        self.is_deleted() || self.is_shadowbanned() || !self.is_approved()
    }
}

/// Orderable content: votes plus a creation time, optionally pinned
pub trait Rankable: Votable {
    fn created_at(&self) -> DateTime<Utc>;

    fn is_pinned(&self) -> bool {
        false
    }
}

impl Votable for Post {
    fn target_id(&self) -> Uuid {
        self.id
    }
    fn target_kind(&self) -> TargetKind {
        TargetKind::Post
    }
    fn upvotes(&self) -> i64 {
        self.upvotes
    }
    fn downvotes(&self) -> i64 {
        self.downvotes
    }
}

impl Moderated for Post {
    fn author_id(&self) -> Option<Uuid> {
        self.author_id
    }
    fn is_deleted(&self) -> bool {
        self.deleted
    }
    fn is_shadowbanned(&self) -> bool {
        self.shadowbanned
    }
    fn is_approved(&self) -> bool {
        self.approved
    }
}

impl Rankable for Post {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn is_pinned(&self) -> bool {
        self.pinned
    }
}

impl Votable for Comment {
    fn target_id(&self) -> Uuid {
        self.id
    }
    fn target_kind(&self) -> TargetKind {
        TargetKind::Comment
    }
    fn upvotes(&self) -> i64 {
        self.upvotes
    }
    fn downvotes(&self) -> i64 {
        self.downvotes
    }
}

impl Moderated for Comment {
    fn author_id(&self) -> Option<Uuid> {
        self.author_id
    }
    fn is_deleted(&self) -> bool {
        self.deleted
    }
    fn is_shadowbanned(&self) -> bool {
        self.shadowbanned
    }
    fn is_approved(&self) -> bool {
        self.approved
    }
}

impl Rankable for Comment {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
