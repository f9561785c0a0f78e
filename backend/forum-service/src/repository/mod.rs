//! Storage seam for the forum
//!
//! Every mutating method is a single atomic unit: the state check, the
//! mutation and its side effects (counter reconciliation, soft deletes,
//! shadowban marking) commit together or not at all.

use crate::domain::{
    Ban, BanSubject, Comment, Community, CommunityRule, ModerationQueueItem, Post, PostFlag,
    QueueDecision, QueueReview, QueueStatus, Report, ReportAction, ReportResolution,
    ReportStatus, SavedPostView, TargetKind, Vote, VoteCounters, VoteDirection, VoteOutcome,
};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::IpAddr;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryForumStore;
pub use postgres::PgForumStore;

/// `flagged_by` of queue items created because the community gates posts
pub const COMMUNITY_POLICY_SOURCE: &str = "community_policy";

#[derive(Debug, Clone)]
pub struct NewCommunity {
    pub name: String,
    pub description: Option<String>,
    pub rules: Vec<CommunityRule>,
    pub require_post_approval: bool,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub community_id: Uuid,
    pub author_id: Uuid,
    pub is_anonymous: bool,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Uuid,
    pub parent_comment_id: Option<Uuid>,
    pub author_id: Uuid,
    pub is_anonymous: bool,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub reporter_id: Option<Uuid>,
    pub reporter_token: Option<String>,
    pub target_id: Uuid,
    pub target_kind: TargetKind,
    pub reason: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewBan {
    pub subject: BanSubject,
    pub is_shadowban: bool,
    pub is_permanent: bool,
    pub reason: String,
    pub banned_by: Option<Uuid>,
}

#[async_trait]
pub trait ForumStore: Send + Sync {
    // Communities
    async fn create_community(&self, input: NewCommunity) -> Result<Community>;
    async fn get_community(&self, community_id: Uuid) -> Result<Option<Community>>;

    // Posts

    /// Inserts the post and bumps the community's `post_count`. Communities
    /// requiring approval get the post unapproved plus a pending queue item.
    async fn create_post(&self, input: NewPost) -> Result<(Post, Option<ModerationQueueItem>)>;
    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>>;
    /// All posts of a community, hidden ones included, newest first
    async fn posts_in_community(&self, community_id: Uuid) -> Result<Vec<Post>>;
    /// Non-anonymous posts by any of `author_ids`, newest first
    async fn posts_by_authors(&self, author_ids: &[Uuid]) -> Result<Vec<Post>>;
    /// Sets `flag` to `value`, or flips it when `value` is `None`
    async fn set_post_flag(&self, post_id: Uuid, flag: PostFlag, value: Option<bool>)
        -> Result<Post>;

    // Comments

    /// Inserts the comment and bumps the post's `comment_count`.
    /// Locked or deleted posts refuse new comments.
    async fn create_comment(&self, input: NewComment) -> Result<Comment>;
    async fn get_comment(&self, comment_id: Uuid) -> Result<Option<Comment>>;
    /// Every comment on the post, deleted ones included, newest first
    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>>;

    // Vote ledger

    /// Applies insert / retract / flip and reconciles the target's counters
    /// from the ledger before committing.
    async fn cast_vote(
        &self,
        voter_id: Uuid,
        target_id: Uuid,
        target_kind: TargetKind,
        direction: VoteDirection,
    ) -> Result<VoteOutcome>;
    async fn vote_for(
        &self,
        voter_id: Uuid,
        target_id: Uuid,
        target_kind: TargetKind,
    ) -> Result<Option<Vote>>;
    /// Rewrites the denormalized counters from a count of ledger rows
    async fn recompute_counters(&self, target_id: Uuid, target_kind: TargetKind)
        -> Result<VoteCounters>;

    // Reports
    async fn create_report(&self, input: NewReport) -> Result<Report>;
    /// `pending -> resolved`; `Delete` soft-deletes the target in the same unit
    async fn resolve_report(
        &self,
        report_id: Uuid,
        action: ReportAction,
        reviewer_id: Uuid,
    ) -> Result<ReportResolution>;
    /// Oldest first
    async fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>>;

    // Moderation queue
    async fn enqueue_post(
        &self,
        post_id: Uuid,
        flagged_by: &str,
        reason: &str,
    ) -> Result<ModerationQueueItem>;
    /// `pending -> approved | rejected`, applying the decision to the post
    async fn review_queue_item(
        &self,
        item_id: Uuid,
        decision: QueueDecision,
        reviewer_id: Uuid,
    ) -> Result<QueueReview>;
    /// Oldest first
    async fn list_queue(&self, status: Option<QueueStatus>) -> Result<Vec<ModerationQueueItem>>;

    // Bans

    /// Records the ban. A user shadowban also marks that user's existing
    /// posts and comments shadowbanned.
    async fn create_ban(&self, input: NewBan) -> Result<Ban>;
    /// Most recent full (non-shadow) ban matching the user or the address
    async fn active_ban(&self, user_id: Option<Uuid>, ip: Option<IpAddr>) -> Result<Option<Ban>>;
    async fn shadowbanned_users(&self) -> Result<HashSet<Uuid>>;

    // Bookmarks. Both return whether anything changed.
    async fn save_post(&self, user_id: Uuid, post_id: Uuid) -> Result<bool>;
    async fn unsave_post(&self, user_id: Uuid, post_id: Uuid) -> Result<bool>;
    /// Most recently saved first
    async fn saved_posts(&self, user_id: Uuid) -> Result<Vec<SavedPostView>>;

    // Follows. Both return whether anything changed.
    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool>;
    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool>;
    async fn followees(&self, follower_id: Uuid) -> Result<Vec<Uuid>>;

    async fn health_check(&self) -> Result<()>;
}
