//! In-process store used by `STORAGE_BACKEND=memory` and the test suite
//!
//! A single mutex guards every table and each method holds it for its whole
//! body, which gives the same all-or-nothing behaviour as one PostgreSQL
//! transaction per call.

use super::{
    ForumStore, NewBan, NewComment, NewCommunity, NewPost, NewReport, COMMUNITY_POLICY_SOURCE,
};
use crate::domain::{
    Ban, BanSubject, Comment, Community, Follow, ModerationQueueItem, Post, PostFlag,
    QueueDecision, QueueReview, QueueStatus, Report, ReportAction, ReportResolution,
    ReportStatus, SavedPost, SavedPostView, TargetKind, Vote, VoteCounters, VoteDirection,
    VoteOutcome, VoteTransition,
};
use crate::error::{ConflictReason, ForumError, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use std::collections::HashSet;
use std::net::IpAddr;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    communities: Vec<Community>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    votes: Vec<Vote>,
    reports: Vec<Report>,
    queue: Vec<ModerationQueueItem>,
    bans: Vec<Ban>,
    saved: Vec<SavedPost>,
    follows: Vec<Follow>,
}

/// Where a post or comment lives
struct Location {
    post_id: Uuid,
    community_id: Option<Uuid>,
}

fn target_not_found(target_id: Uuid, kind: TargetKind) -> ForumError {
    ForumError::NotFound(format!("{} {} not found", kind, target_id))
}

impl Tables {
    fn post(&self, post_id: Uuid) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == post_id)
    }

    fn post_mut(&mut self, post_id: Uuid) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| p.id == post_id)
    }

    fn comment(&self, comment_id: Uuid) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == comment_id)
    }

    fn comment_mut(&mut self, comment_id: Uuid) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|c| c.id == comment_id)
    }

    fn is_shadowbanned(&self, user_id: Uuid) -> bool {
        self.bans
            .iter()
            .any(|b| b.is_shadowban && b.user_id == Some(user_id))
    }

    /// `Some(deleted)` if the target exists
    fn target_deleted(&self, target_id: Uuid, kind: TargetKind) -> Option<bool> {
        match kind {
            TargetKind::Post => self.post(target_id).map(|p| p.deleted),
            TargetKind::Comment => self.comment(target_id).map(|c| c.deleted),
        }
    }

    fn locate(&self, target_id: Uuid, kind: TargetKind) -> Option<Location> {
        let post_id = match kind {
            TargetKind::Post => target_id,
            TargetKind::Comment => self.comment(target_id)?.post_id,
        };
        Some(Location {
            post_id,
            community_id: self.post(post_id).map(|p| p.community_id),
        })
    }

    /// Marks the target deleted; a comment leaving the live set also leaves
    /// its post's `comment_count`.
    fn soft_delete(&mut self, target_id: Uuid, kind: TargetKind) -> bool {
        match kind {
            TargetKind::Post => match self.post_mut(target_id) {
                Some(post) => {
                    post.deleted = true;
                    true
                }
                None => false,
            },
            TargetKind::Comment => {
                let post_id = match self.comment_mut(target_id) {
                    Some(comment) if !comment.deleted => {
                        comment.deleted = true;
                        comment.post_id
                    }
                    Some(_) => return true,
                    None => return false,
                };
                if let Some(post) = self.post_mut(post_id) {
                    post.comment_count = (post.comment_count - 1).max(0);
                }
                true
            }
        }
    }

    fn recompute(&mut self, target_id: Uuid, kind: TargetKind) -> Result<VoteCounters> {
        let (upvotes, downvotes) = self
            .votes
            .iter()
            .filter(|v| v.target_id == target_id && v.target_kind == kind)
            .fold((0i64, 0i64), |(up, down), v| match v.direction {
                VoteDirection::Up => (up + 1, down),
                VoteDirection::Down => (up, down + 1),
            });

        match kind {
            TargetKind::Post => {
                let post = self
                    .post_mut(target_id)
                    .ok_or_else(|| target_not_found(target_id, kind))?;
                post.upvotes = upvotes;
                post.downvotes = downvotes;
            }
            TargetKind::Comment => {
                let comment = self
                    .comment_mut(target_id)
                    .ok_or_else(|| target_not_found(target_id, kind))?;
                comment.upvotes = upvotes;
                comment.downvotes = downvotes;
            }
        }

        Ok(VoteCounters {
            target_id,
            target_kind: kind,
            upvotes,
            downvotes,
        })
    }
}

fn newest_first<T, F>(mut rows: Vec<T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> chrono::DateTime<Utc>,
{
    rows.reverse();
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    rows
}

#[derive(Default)]
pub struct MemoryForumStore {
    tables: Mutex<Tables>,
}

impl MemoryForumStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ForumStore for MemoryForumStore {
    async fn create_community(&self, input: NewCommunity) -> Result<Community> {
        let mut tables = self.tables.lock().await;
        let community = Community {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            member_count: 0,
            post_count: 0,
            rules: Json(input.rules),
            require_post_approval: input.require_post_approval,
            created_at: Utc::now(),
        };
        tables.communities.push(community.clone());
        Ok(community)
    }

    async fn get_community(&self, community_id: Uuid) -> Result<Option<Community>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .communities
            .iter()
            .find(|c| c.id == community_id)
            .cloned())
    }

    async fn create_post(&self, input: NewPost) -> Result<(Post, Option<ModerationQueueItem>)> {
        let mut tables = self.tables.lock().await;
        let shadowbanned = tables.is_shadowbanned(input.author_id);
        let community = tables
            .communities
            .iter_mut()
            .find(|c| c.id == input.community_id)
            .ok_or_else(|| {
                ForumError::NotFound(format!("community {} not found", input.community_id))
            })?;
        community.post_count += 1;
        let requires_approval = community.require_post_approval;

        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            community_id: input.community_id,
            author_id: Some(input.author_id),
            is_anonymous: input.is_anonymous,
            title: input.title,
            body: input.body,
            deleted: false,
            approved: !requires_approval,
            pinned: false,
            locked: false,
            shadowbanned,
            upvotes: 0,
            downvotes: 0,
            comment_count: 0,
            created_at: now,
        };
        tables.posts.push(post.clone());

        let queued = requires_approval.then(|| ModerationQueueItem {
            id: Uuid::new_v4(),
            post_id: post.id,
            flagged_by: COMMUNITY_POLICY_SOURCE.to_string(),
            reason: "community requires post approval".to_string(),
            status: QueueStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
        });
        if let Some(item) = &queued {
            tables.queue.push(item.clone());
        }

        Ok((post, queued))
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let tables = self.tables.lock().await;
        Ok(tables.post(post_id).cloned())
    }

    async fn posts_in_community(&self, community_id: Uuid) -> Result<Vec<Post>> {
        let tables = self.tables.lock().await;
        let rows = tables
            .posts
            .iter()
            .filter(|p| p.community_id == community_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |p: &Post| p.created_at))
    }

    async fn posts_by_authors(&self, author_ids: &[Uuid]) -> Result<Vec<Post>> {
        let tables = self.tables.lock().await;
        let authors: HashSet<Uuid> = author_ids.iter().copied().collect();
        let rows = tables
            .posts
            .iter()
            .filter(|p| !p.is_anonymous && p.author_id.map_or(false, |a| authors.contains(&a)))
            .cloned()
            .collect();
        Ok(newest_first(rows, |p: &Post| p.created_at))
    }

    async fn set_post_flag(
        &self,
        post_id: Uuid,
        flag: PostFlag,
        value: Option<bool>,
    ) -> Result<Post> {
        let mut tables = self.tables.lock().await;
        let post = tables
            .post_mut(post_id)
            .ok_or_else(|| target_not_found(post_id, TargetKind::Post))?;
        let next = value.unwrap_or(!flag.get(post));
        flag.set(post, next);
        Ok(post.clone())
    }

    async fn create_comment(&self, input: NewComment) -> Result<Comment> {
        let mut tables = self.tables.lock().await;
        let post = tables
            .post(input.post_id)
            .ok_or_else(|| target_not_found(input.post_id, TargetKind::Post))?;
        if post.deleted {
            return Err(ForumError::Conflict(ConflictReason::ContentDeleted));
        }
        if post.locked {
            return Err(ForumError::Conflict(ConflictReason::PostLocked));
        }
        if let Some(parent_id) = input.parent_comment_id {
            let parent = tables
                .comment(parent_id)
                .ok_or_else(|| target_not_found(parent_id, TargetKind::Comment))?;
            if parent.post_id != input.post_id {
                return Err(ForumError::Validation(
                    "parent comment belongs to a different post".to_string(),
                ));
            }
        }

        let comment = Comment {
            id: Uuid::new_v4(),
            post_id: input.post_id,
            parent_comment_id: input.parent_comment_id,
            author_id: Some(input.author_id),
            is_anonymous: input.is_anonymous,
            body: input.body,
            deleted: false,
            approved: true,
            shadowbanned: tables.is_shadowbanned(input.author_id),
            upvotes: 0,
            downvotes: 0,
            created_at: Utc::now(),
        };
        tables.comments.push(comment.clone());
        if let Some(post) = tables.post_mut(input.post_id) {
            post.comment_count += 1;
        }
        Ok(comment)
    }

    async fn get_comment(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        let tables = self.tables.lock().await;
        Ok(tables.comment(comment_id).cloned())
    }

    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let tables = self.tables.lock().await;
        let rows = tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |c: &Comment| c.created_at))
    }

    async fn cast_vote(
        &self,
        voter_id: Uuid,
        target_id: Uuid,
        target_kind: TargetKind,
        direction: VoteDirection,
    ) -> Result<VoteOutcome> {
        let mut tables = self.tables.lock().await;
        match tables.target_deleted(target_id, target_kind) {
            None => return Err(target_not_found(target_id, target_kind)),
            Some(true) => return Err(ForumError::Conflict(ConflictReason::ContentDeleted)),
            Some(false) => {}
        }

        let existing = tables.votes.iter().position(|v| {
            v.voter_id == voter_id && v.target_id == target_id && v.target_kind == target_kind
        });
        let transition =
            VoteTransition::plan(existing.map(|i| tables.votes[i].direction), direction);
        let now = Utc::now();

        match (transition, existing) {
            (VoteTransition::Insert { direction }, None) => tables.votes.push(Vote {
                voter_id,
                target_id,
                target_kind,
                direction,
                created_at: now,
                updated_at: now,
            }),
            (VoteTransition::Retract { .. }, Some(index)) => {
                tables.votes.remove(index);
            }
            (VoteTransition::Flip { to, .. }, Some(index)) => {
                let vote = &mut tables.votes[index];
                vote.direction = to;
                vote.updated_at = now;
            }
            _ => {
                return Err(ForumError::Internal(
                    "vote transition disagrees with ledger".to_string(),
                ))
            }
        }

        let counters = tables.recompute(target_id, target_kind)?;
        Ok(VoteOutcome::new(transition, counters))
    }

    async fn vote_for(
        &self,
        voter_id: Uuid,
        target_id: Uuid,
        target_kind: TargetKind,
    ) -> Result<Option<Vote>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .votes
            .iter()
            .find(|v| {
                v.voter_id == voter_id && v.target_id == target_id && v.target_kind == target_kind
            })
            .cloned())
    }

    async fn recompute_counters(
        &self,
        target_id: Uuid,
        target_kind: TargetKind,
    ) -> Result<VoteCounters> {
        let mut tables = self.tables.lock().await;
        tables.recompute(target_id, target_kind)
    }

    async fn create_report(&self, input: NewReport) -> Result<Report> {
        let mut tables = self.tables.lock().await;
        if tables
            .target_deleted(input.target_id, input.target_kind)
            .is_none()
        {
            return Err(target_not_found(input.target_id, input.target_kind));
        }

        let now = Utc::now();
        let report = Report {
            id: Uuid::new_v4(),
            reporter_id: input.reporter_id,
            reporter_token: input.reporter_token,
            target_id: input.target_id,
            target_kind: input.target_kind,
            reason: input.reason,
            description: input.description,
            status: ReportStatus::Pending,
            resolution: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.reports.push(report.clone());
        Ok(report)
    }

    async fn resolve_report(
        &self,
        report_id: Uuid,
        action: ReportAction,
        reviewer_id: Uuid,
    ) -> Result<ReportResolution> {
        let mut tables = self.tables.lock().await;
        let index = tables
            .reports
            .iter()
            .position(|r| r.id == report_id)
            .ok_or_else(|| ForumError::NotFound(format!("report {} not found", report_id)))?;
        let next = tables.reports[index].status.resolve()?;
        let (target_id, target_kind) = {
            let report = &tables.reports[index];
            (report.target_id, report.target_kind)
        };

        let target_deleted = match action {
            ReportAction::Delete => tables.soft_delete(target_id, target_kind),
            ReportAction::Keep => false,
        };
        let location = tables.locate(target_id, target_kind);

        let now = Utc::now();
        let report = &mut tables.reports[index];
        report.status = next;
        report.resolution = Some(action.as_str().to_string());
        report.reviewed_by = Some(reviewer_id);
        report.reviewed_at = Some(now);
        report.updated_at = now;

        Ok(ReportResolution {
            report: report.clone(),
            target_deleted,
            affected_post_id: location.as_ref().map(|l| l.post_id),
            affected_community_id: location.and_then(|l| l.community_id),
        })
    }

    async fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .reports
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }

    async fn enqueue_post(
        &self,
        post_id: Uuid,
        flagged_by: &str,
        reason: &str,
    ) -> Result<ModerationQueueItem> {
        let mut tables = self.tables.lock().await;
        if tables.post(post_id).is_none() {
            return Err(target_not_found(post_id, TargetKind::Post));
        }
        let item = ModerationQueueItem {
            id: Uuid::new_v4(),
            post_id,
            flagged_by: flagged_by.to_string(),
            reason: reason.to_string(),
            status: QueueStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
        };
        tables.queue.push(item.clone());
        Ok(item)
    }

    async fn review_queue_item(
        &self,
        item_id: Uuid,
        decision: QueueDecision,
        reviewer_id: Uuid,
    ) -> Result<QueueReview> {
        let mut tables = self.tables.lock().await;
        let index = tables
            .queue
            .iter()
            .position(|q| q.id == item_id)
            .ok_or_else(|| ForumError::NotFound(format!("queue item {} not found", item_id)))?;
        let next = tables.queue[index].status.review(decision)?;
        let post_id = tables.queue[index].post_id;

        let community_id = tables.post_mut(post_id).map(|post| {
            match decision {
                QueueDecision::Approve => post.approved = true,
                QueueDecision::Reject => post.deleted = true,
            }
            post.community_id
        });

        let item = &mut tables.queue[index];
        item.status = next;
        item.reviewed_by = Some(reviewer_id);
        item.reviewed_at = Some(Utc::now());

        Ok(QueueReview {
            item: item.clone(),
            community_id,
        })
    }

    async fn list_queue(&self, status: Option<QueueStatus>) -> Result<Vec<ModerationQueueItem>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .queue
            .iter()
            .filter(|q| status.map_or(true, |s| q.status == s))
            .cloned()
            .collect())
    }

    async fn create_ban(&self, input: NewBan) -> Result<Ban> {
        let mut tables = self.tables.lock().await;
        let (user_id, ip_address) = match input.subject {
            BanSubject::User(id) => (Some(id), None),
            BanSubject::Ip(ip) => (None, Some(ip.to_string())),
        };
        let ban = Ban {
            id: Uuid::new_v4(),
            user_id,
            ip_address,
            is_shadowban: input.is_shadowban,
            is_permanent: input.is_permanent,
            reason: input.reason,
            banned_by: input.banned_by,
            created_at: Utc::now(),
        };

        if let (true, Some(user_id)) = (ban.is_shadowban, ban.user_id) {
            for post in tables
                .posts
                .iter_mut()
                .filter(|p| p.author_id == Some(user_id))
            {
                post.shadowbanned = true;
            }
            for comment in tables
                .comments
                .iter_mut()
                .filter(|c| c.author_id == Some(user_id))
            {
                comment.shadowbanned = true;
            }
        }

        tables.bans.push(ban.clone());
        Ok(ban)
    }

    async fn active_ban(&self, user_id: Option<Uuid>, ip: Option<IpAddr>) -> Result<Option<Ban>> {
        let tables = self.tables.lock().await;
        let ip = ip.map(|ip| ip.to_string());
        Ok(tables
            .bans
            .iter()
            .rev()
            .find(|b| {
                !b.is_shadowban
                    && ((user_id.is_some() && b.user_id == user_id)
                        || (ip.is_some() && b.ip_address == ip))
            })
            .cloned())
    }

    async fn shadowbanned_users(&self) -> Result<HashSet<Uuid>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .bans
            .iter()
            .filter(|b| b.is_shadowban)
            .filter_map(|b| b.user_id)
            .collect())
    }

    async fn save_post(&self, user_id: Uuid, post_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if tables.post(post_id).is_none() {
            return Err(target_not_found(post_id, TargetKind::Post));
        }
        if tables
            .saved
            .iter()
            .any(|s| s.user_id == user_id && s.post_id == post_id)
        {
            return Ok(false);
        }
        tables.saved.push(SavedPost {
            user_id,
            post_id,
            saved_at: Utc::now(),
        });
        Ok(true)
    }

    async fn unsave_post(&self, user_id: Uuid, post_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.saved.len();
        tables
            .saved
            .retain(|s| !(s.user_id == user_id && s.post_id == post_id));
        Ok(tables.saved.len() != before)
    }

    async fn saved_posts(&self, user_id: Uuid) -> Result<Vec<SavedPostView>> {
        let tables = self.tables.lock().await;
        let views = tables
            .saved
            .iter()
            .filter(|s| s.user_id == user_id)
            .filter_map(|s| {
                tables.post(s.post_id).map(|post| SavedPostView {
                    saved_at: s.saved_at,
                    post: post.clone(),
                })
            })
            .collect();
        Ok(newest_first(views, |v: &SavedPostView| v.saved_at))
    }

    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        if follower_id == followee_id {
            return Err(ForumError::Validation("cannot follow yourself".to_string()));
        }
        let mut tables = self.tables.lock().await;
        if tables
            .follows
            .iter()
            .any(|f| f.follower_id == follower_id && f.followee_id == followee_id)
        {
            return Ok(false);
        }
        tables.follows.push(Follow {
            follower_id,
            followee_id,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|f| !(f.follower_id == follower_id && f.followee_id == followee_id));
        Ok(tables.follows.len() != before)
    }

    async fn followees(&self, follower_id: Uuid) -> Result<Vec<Uuid>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .follows
            .iter()
            .filter(|f| f.follower_id == follower_id)
            .map(|f| f.followee_id)
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(require_post_approval: bool) -> (MemoryForumStore, Post) {
        let store = MemoryForumStore::new();
        let community = store
            .create_community(NewCommunity {
                name: "rust".into(),
                description: None,
                rules: vec![],
                require_post_approval,
            })
            .await
            .unwrap();
        let (post, _) = store
            .create_post(NewPost {
                community_id: community.id,
                author_id: Uuid::new_v4(),
                is_anonymous: false,
                title: "hello".into(),
                body: String::new(),
            })
            .await
            .unwrap();
        (store, post)
    }

    #[tokio::test]
    async fn test_toggle_retraction_law() {
        let (store, post) = seeded(false).await;
        let voter = Uuid::new_v4();

        store
            .cast_vote(voter, post.id, TargetKind::Post, VoteDirection::Up)
            .await
            .unwrap();
        let outcome = store
            .cast_vote(voter, post.id, TargetKind::Post, VoteDirection::Up)
            .await
            .unwrap();

        assert_eq!(outcome.net_score, 0);
        assert!(outcome.current_vote.is_none());
        assert!(store
            .vote_for(voter, post.id, TargetKind::Post)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_flip_law() {
        let (store, post) = seeded(false).await;
        let voter = Uuid::new_v4();

        store
            .cast_vote(voter, post.id, TargetKind::Post, VoteDirection::Up)
            .await
            .unwrap();
        let outcome = store
            .cast_vote(voter, post.id, TargetKind::Post, VoteDirection::Down)
            .await
            .unwrap();

        assert_eq!(outcome.net_score, -1);
        assert_eq!(outcome.counters.upvotes, 0);
        assert_eq!(outcome.counters.downvotes, 1);
        let vote = store
            .vote_for(voter, post.id, TargetKind::Post)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(vote.direction, VoteDirection::Down);
    }

    #[tokio::test]
    async fn test_vote_on_missing_target_is_not_found() {
        let store = MemoryForumStore::new();
        let err = store
            .cast_vote(
                Uuid::new_v4(),
                Uuid::new_v4(),
                TargetKind::Comment,
                VoteDirection::Up,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ForumError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_with_delete_is_single_shot() {
        let (store, post) = seeded(false).await;
        let report = store
            .create_report(NewReport {
                reporter_id: Some(Uuid::new_v4()),
                reporter_token: None,
                target_id: post.id,
                target_kind: TargetKind::Post,
                reason: "spam".into(),
                description: None,
            })
            .await
            .unwrap();
        let moderator = Uuid::new_v4();

        let resolution = store
            .resolve_report(report.id, ReportAction::Delete, moderator)
            .await
            .unwrap();
        assert_eq!(resolution.report.status, ReportStatus::Resolved);
        assert!(resolution.target_deleted);
        assert!(store.get_post(post.id).await.unwrap().unwrap().deleted);

        let err = store
            .resolve_report(report.id, ReportAction::Keep, moderator)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ForumError::Conflict(ConflictReason::ReportAlreadyResolved)
        ));
        let reports = store.list_reports(None).await.unwrap();
        assert_eq!(reports[0].resolution.as_deref(), Some("delete"));
        assert!(store.get_post(post.id).await.unwrap().unwrap().deleted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_keep_ledger_and_counters_aligned() {
        let (store, post) = seeded(false).await;
        let store = std::sync::Arc::new(store);
        let post_id = post.id;
        let repeat_voter = Uuid::new_v4();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let store = store.clone();
            tasks.spawn(async move {
                store
                    .cast_vote(repeat_voter, post_id, TargetKind::Post, VoteDirection::Up)
                    .await
            });
        }
        for _ in 0..8 {
            let store = store.clone();
            tasks.spawn(async move {
                store
                    .cast_vote(Uuid::new_v4(), post_id, TargetKind::Post, VoteDirection::Up)
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        // An even number of identical votes from one voter retracts to nothing.
        assert!(store
            .vote_for(repeat_voter, post.id, TargetKind::Post)
            .await
            .unwrap()
            .is_none());
        let stored = store.get_post(post.id).await.unwrap().unwrap();
        assert_eq!((stored.upvotes, stored.downvotes), (8, 0));

        let counters = store
            .recompute_counters(post.id, TargetKind::Post)
            .await
            .unwrap();
        assert_eq!((counters.upvotes, counters.downvotes), (8, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_resolves_succeed_once() {
        let (store, post) = seeded(false).await;
        let report = store
            .create_report(NewReport {
                reporter_id: Some(Uuid::new_v4()),
                reporter_token: None,
                target_id: post.id,
                target_kind: TargetKind::Post,
                reason: "spam".into(),
                description: None,
            })
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            store.resolve_report(report.id, ReportAction::Delete, Uuid::new_v4()),
            store.resolve_report(report.id, ReportAction::Keep, Uuid::new_v4()),
        );

        let (winner, loser) = match (first, second) {
            (Ok(resolution), Err(err)) | (Err(err), Ok(resolution)) => (resolution, err),
            other => panic!("expected exactly one resolution, got {:?}", other),
        };
        assert!(matches!(
            loser,
            ForumError::Conflict(ConflictReason::ReportAlreadyResolved)
        ));
        let reports = store.list_reports(Some(ReportStatus::Resolved)).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].resolution, winner.report.resolution);
        assert_eq!(
            store.get_post(post.id).await.unwrap().unwrap().deleted,
            winner.target_deleted
        );
    }

    #[tokio::test]
    async fn test_deleting_comment_updates_comment_count() {
        let (store, post) = seeded(false).await;
        let comment = store
            .create_comment(NewComment {
                post_id: post.id,
                parent_comment_id: None,
                author_id: Uuid::new_v4(),
                is_anonymous: false,
                body: "first".into(),
            })
            .await
            .unwrap();
        assert_eq!(store.get_post(post.id).await.unwrap().unwrap().comment_count, 1);

        let report = store
            .create_report(NewReport {
                reporter_id: None,
                reporter_token: Some("anon-token-1".into()),
                target_id: comment.id,
                target_kind: TargetKind::Comment,
                reason: "abuse".into(),
                description: None,
            })
            .await
            .unwrap();
        store
            .resolve_report(report.id, ReportAction::Delete, Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(store.get_post(post.id).await.unwrap().unwrap().comment_count, 0);
        assert!(store.get_comment(comment.id).await.unwrap().unwrap().deleted);
    }

    #[tokio::test]
    async fn test_locked_post_refuses_comments() {
        let (store, post) = seeded(false).await;
        store
            .set_post_flag(post.id, PostFlag::Locked, None)
            .await
            .unwrap();
        let err = store
            .create_comment(NewComment {
                post_id: post.id,
                parent_comment_id: None,
                author_id: Uuid::new_v4(),
                is_anonymous: false,
                body: "late".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ForumError::Conflict(ConflictReason::PostLocked)));
    }

    #[tokio::test]
    async fn test_explicit_flag_value_is_idempotent() {
        let (store, post) = seeded(false).await;
        for _ in 0..2 {
            let updated = store
                .set_post_flag(post.id, PostFlag::Pinned, Some(true))
                .await
                .unwrap();
            assert!(updated.pinned);
        }
        let flipped = store
            .set_post_flag(post.id, PostFlag::Pinned, None)
            .await
            .unwrap();
        assert!(!flipped.pinned);
    }

    #[tokio::test]
    async fn test_community_policy_queues_posts() {
        let (store, post) = seeded(true).await;
        assert!(!post.approved);

        let queue = store.list_queue(Some(QueueStatus::Pending)).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].flagged_by, COMMUNITY_POLICY_SOURCE);

        let review = store
            .review_queue_item(queue[0].id, QueueDecision::Approve, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(review.item.status, QueueStatus::Approved);
        assert!(store.get_post(post.id).await.unwrap().unwrap().approved);

        let err = store
            .review_queue_item(queue[0].id, QueueDecision::Reject, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ForumError::Conflict(ConflictReason::QueueItemAlreadyReviewed)
        ));
        assert!(!store.get_post(post.id).await.unwrap().unwrap().deleted);
    }

    #[tokio::test]
    async fn test_shadowban_marks_existing_content() {
        let (store, post) = seeded(false).await;
        let author = post.author_id.unwrap();
        store
            .create_ban(NewBan {
                subject: BanSubject::User(author),
                is_shadowban: true,
                is_permanent: false,
                reason: "spam ring".into(),
                banned_by: None,
            })
            .await
            .unwrap();

        assert!(store.get_post(post.id).await.unwrap().unwrap().shadowbanned);
        assert!(store.shadowbanned_users().await.unwrap().contains(&author));
        // Shadowbans never block actions
        assert!(store.active_ban(Some(author), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ip_ban_matches_address() {
        let store = MemoryForumStore::new();
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        store
            .create_ban(NewBan {
                subject: BanSubject::Ip(ip),
                is_shadowban: false,
                is_permanent: true,
                reason: "botnet".into(),
                banned_by: None,
            })
            .await
            .unwrap();

        assert!(store
            .active_ban(Some(Uuid::new_v4()), Some(ip))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .active_ban(Some(Uuid::new_v4()), None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_save_and_follow_are_idempotent() {
        let (store, post) = seeded(false).await;
        let user = Uuid::new_v4();

        assert!(store.save_post(user, post.id).await.unwrap());
        assert!(!store.save_post(user, post.id).await.unwrap());
        assert_eq!(store.saved_posts(user).await.unwrap().len(), 1);
        assert!(store.unsave_post(user, post.id).await.unwrap());
        assert!(!store.unsave_post(user, post.id).await.unwrap());

        let other = Uuid::new_v4();
        assert!(store.follow(user, other).await.unwrap());
        assert!(!store.follow(user, other).await.unwrap());
        assert_eq!(store.followees(user).await.unwrap(), vec![other]);
        assert!(matches!(
            store.follow(user, user).await.unwrap_err(),
            ForumError::Validation(_)
        ));
    }
}
