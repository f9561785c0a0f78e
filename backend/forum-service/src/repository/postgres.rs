//! PostgreSQL-backed store
//!
//! Mutations run inside one transaction and lock the row they transition
//! (`SELECT ... FOR UPDATE`) before reading its state, so two callers racing
//! on the same vote target, report or queue item serialize on that row.

use super::{
    ForumStore, NewBan, NewComment, NewCommunity, NewPost, NewReport, COMMUNITY_POLICY_SOURCE,
};
use crate::domain::{
    Ban, BanSubject, Comment, Community, ModerationQueueItem, Post, PostFlag, QueueDecision,
    QueueReview, QueueStatus, Report, ReportAction, ReportResolution, ReportStatus,
    SavedPostView, TargetKind, Vote, VoteCounters, VoteDirection, VoteOutcome, VoteTransition,
};
use crate::error::{ConflictReason, ForumError, Result};
use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Row};
use std::collections::HashSet;
use std::net::IpAddr;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

fn content_table(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Post => "posts",
        TargetKind::Comment => "comments",
    }
}

fn target_not_found(target_id: Uuid, kind: TargetKind) -> ForumError {
    ForumError::NotFound(format!("{} {} not found", kind, target_id))
}

/// A duplicate ledger row means another transaction won the race for the
/// same (voter, target) pair.
fn map_vote_conflict(err: sqlx::Error) -> ForumError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return ForumError::Conflict(ConflictReason::ConcurrentVote);
        }
    }
    ForumError::Database(err)
}

async fn author_is_shadowbanned(conn: &mut PgConnection, author_id: Uuid) -> Result<bool> {
    let shadowbanned = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM bans WHERE user_id = $1 AND is_shadowban)",
    )
    .bind(author_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(shadowbanned)
}

async fn recompute_in(
    conn: &mut PgConnection,
    target_id: Uuid,
    kind: TargetKind,
) -> Result<VoteCounters> {
    let (upvotes, downvotes): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FILTER (WHERE direction = 1),
               COUNT(*) FILTER (WHERE direction = -1)
        FROM votes
        WHERE target_id = $1 AND target_kind = $2
        "#,
    )
    .bind(target_id)
    .bind(kind.as_str())
    .fetch_one(&mut *conn)
    .await?;

    let sql = format!(
        "UPDATE {} SET upvotes = $2, downvotes = $3 WHERE id = $1",
        content_table(kind)
    );
    let result = sqlx::query(&sql)
        .bind(target_id)
        .bind(upvotes)
        .bind(downvotes)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(target_not_found(target_id, kind));
    }

    Ok(VoteCounters {
        target_id,
        target_kind: kind,
        upvotes,
        downvotes,
    })
}

async fn insert_queue_item(
    conn: &mut PgConnection,
    post_id: Uuid,
    flagged_by: &str,
    reason: &str,
) -> Result<ModerationQueueItem> {
    let item = sqlx::query_as::<_, ModerationQueueItem>(
        r#"
        INSERT INTO moderation_queue (id, post_id, flagged_by, reason, status, created_at)
        VALUES ($1, $2, $3, $4, 'pending', NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(post_id)
    .bind(flagged_by)
    .bind(reason)
    .fetch_one(&mut *conn)
    .await?;
    Ok(item)
}

/// Soft-deletes the target. Returns false when it does not exist.
async fn soft_delete_in(conn: &mut PgConnection, target_id: Uuid, kind: TargetKind) -> Result<bool> {
    match kind {
        TargetKind::Post => {
            let result = sqlx::query("UPDATE posts SET deleted = TRUE WHERE id = $1")
                .bind(target_id)
                .execute(&mut *conn)
                .await?;
            Ok(result.rows_affected() > 0)
        }
        TargetKind::Comment => {
            let row: Option<(Uuid, bool)> =
                sqlx::query_as("SELECT post_id, deleted FROM comments WHERE id = $1 FOR UPDATE")
                    .bind(target_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            match row {
                None => Ok(false),
                Some((_, true)) => Ok(true),
                Some((post_id, false)) => {
                    sqlx::query("UPDATE comments SET deleted = TRUE WHERE id = $1")
                        .bind(target_id)
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query(
                        "UPDATE posts SET comment_count = GREATEST(comment_count - 1, 0) WHERE id = $1",
                    )
                    .bind(post_id)
                    .execute(&mut *conn)
                    .await?;
                    Ok(true)
                }
            }
        }
    }
}

/// `(post_id, community_id)` of a target
async fn locate_in(
    conn: &mut PgConnection,
    target_id: Uuid,
    kind: TargetKind,
) -> Result<Option<(Uuid, Option<Uuid>)>> {
    match kind {
        TargetKind::Post => {
            let community_id =
                sqlx::query_scalar::<_, Uuid>("SELECT community_id FROM posts WHERE id = $1")
                    .bind(target_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            Ok(Some((target_id, community_id)))
        }
        TargetKind::Comment => {
            let row: Option<(Uuid, Uuid)> = sqlx::query_as(
                r#"
                SELECT c.post_id, p.community_id
                FROM comments c
                JOIN posts p ON p.id = c.post_id
                WHERE c.id = $1
                "#,
            )
            .bind(target_id)
            .fetch_optional(&mut *conn)
            .await?;
            Ok(row.map(|(post_id, community_id)| (post_id, Some(community_id))))
        }
    }
}

#[derive(Clone)]
pub struct PgForumStore {
    pool: PgPool,
}

impl PgForumStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ForumStore for PgForumStore {
    async fn create_community(&self, input: NewCommunity) -> Result<Community> {
        let community = sqlx::query_as::<_, Community>(
            r#"
            INSERT INTO communities (id, name, description, rules, require_post_approval, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.description)
        .bind(Json(&input.rules))
        .bind(input.require_post_approval)
        .fetch_one(&self.pool)
        .await?;

        Ok(community)
    }

    async fn get_community(&self, community_id: Uuid) -> Result<Option<Community>> {
        let community = sqlx::query_as::<_, Community>("SELECT * FROM communities WHERE id = $1")
            .bind(community_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(community)
    }

    async fn create_post(&self, input: NewPost) -> Result<(Post, Option<ModerationQueueItem>)> {
        let mut tx = self.pool.begin().await?;

        let requires_approval = sqlx::query_scalar::<_, bool>(
            r#"
            UPDATE communities SET post_count = post_count + 1
            WHERE id = $1
            RETURNING require_post_approval
            "#,
        )
        .bind(input.community_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            ForumError::NotFound(format!("community {} not found", input.community_id))
        })?;
        let shadowbanned = author_is_shadowbanned(&mut tx, input.author_id).await?;

        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (
                id, community_id, author_id, is_anonymous, title, body,
                approved, shadowbanned, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.community_id)
        .bind(input.author_id)
        .bind(input.is_anonymous)
        .bind(&input.title)
        .bind(&input.body)
        .bind(!requires_approval)
        .bind(shadowbanned)
        .fetch_one(&mut *tx)
        .await?;

        let queued = if requires_approval {
            Some(
                insert_queue_item(
                    &mut tx,
                    post.id,
                    COMMUNITY_POLICY_SOURCE,
                    "community requires post approval",
                )
                .await?,
            )
        } else {
            None
        };

        tx.commit().await?;
        Ok((post, queued))
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn posts_in_community(&self, community_id: Uuid) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            "SELECT * FROM posts WHERE community_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn posts_by_authors(&self, author_ids: &[Uuid]) -> Result<Vec<Post>> {
        if author_ids.is_empty() {
            return Ok(Vec::new());
        }
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            WHERE author_id = ANY($1) AND NOT is_anonymous
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(author_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn set_post_flag(
        &self,
        post_id: Uuid,
        flag: PostFlag,
        value: Option<bool>,
    ) -> Result<Post> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| target_not_found(post_id, TargetKind::Post))?;

        let next = value.unwrap_or(!flag.get(&current));
        let sql = format!(
            "UPDATE posts SET {} = $2 WHERE id = $1 RETURNING *",
            flag.column()
        );
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(post_id)
            .bind(next)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(post)
    }

    async fn create_comment(&self, input: NewComment) -> Result<Comment> {
        let mut tx = self.pool.begin().await?;

        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1 FOR UPDATE")
            .bind(input.post_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| target_not_found(input.post_id, TargetKind::Post))?;
        if post.deleted {
            return Err(ForumError::Conflict(ConflictReason::ContentDeleted));
        }
        if post.locked {
            return Err(ForumError::Conflict(ConflictReason::PostLocked));
        }

        if let Some(parent_id) = input.parent_comment_id {
            let parent_post = sqlx::query_scalar::<_, Uuid>(
                "SELECT post_id FROM comments WHERE id = $1",
            )
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| target_not_found(parent_id, TargetKind::Comment))?;
            if parent_post != input.post_id {
                return Err(ForumError::Validation(
                    "parent comment belongs to a different post".to_string(),
                ));
            }
        }

        let shadowbanned = author_is_shadowbanned(&mut tx, input.author_id).await?;
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (
                id, post_id, parent_comment_id, author_id, is_anonymous, body,
                shadowbanned, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.post_id)
        .bind(input.parent_comment_id)
        .bind(input.author_id)
        .bind(input.is_anonymous)
        .bind(&input.body)
        .bind(shadowbanned)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE posts SET comment_count = comment_count + 1 WHERE id = $1")
            .bind(input.post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(comment)
    }

    async fn get_comment(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = $1")
            .bind(comment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT * FROM comments WHERE post_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn cast_vote(
        &self,
        voter_id: Uuid,
        target_id: Uuid,
        target_kind: TargetKind,
        direction: VoteDirection,
    ) -> Result<VoteOutcome> {
        let mut tx = self.pool.begin().await?;

        let lock_sql = format!(
            "SELECT deleted FROM {} WHERE id = $1 FOR UPDATE",
            content_table(target_kind)
        );
        let deleted = sqlx::query_scalar::<_, bool>(&lock_sql)
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| target_not_found(target_id, target_kind))?;
        if deleted {
            return Err(ForumError::Conflict(ConflictReason::ContentDeleted));
        }

        let existing = sqlx::query_scalar::<_, i16>(
            r#"
            SELECT direction FROM votes
            WHERE voter_id = $1 AND target_id = $2 AND target_kind = $3
            FOR UPDATE
            "#,
        )
        .bind(voter_id)
        .bind(target_id)
        .bind(target_kind.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .map(VoteDirection::try_from)
        .transpose()
        .map_err(ForumError::Internal)?;

        let transition = VoteTransition::plan(existing, direction);
        match transition {
            VoteTransition::Insert { direction } => {
                sqlx::query(
                    r#"
                    INSERT INTO votes (voter_id, target_id, target_kind, direction, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, NOW(), NOW())
                    "#,
                )
                .bind(voter_id)
                .bind(target_id)
                .bind(target_kind.as_str())
                .bind(i16::from(direction))
                .execute(&mut *tx)
                .await
                .map_err(map_vote_conflict)?;
            }
            VoteTransition::Retract { .. } => {
                sqlx::query(
                    "DELETE FROM votes WHERE voter_id = $1 AND target_id = $2 AND target_kind = $3",
                )
                .bind(voter_id)
                .bind(target_id)
                .bind(target_kind.as_str())
                .execute(&mut *tx)
                .await?;
            }
            VoteTransition::Flip { to, .. } => {
                sqlx::query(
                    r#"
                    UPDATE votes SET direction = $4, updated_at = NOW()
                    WHERE voter_id = $1 AND target_id = $2 AND target_kind = $3
                    "#,
                )
                .bind(voter_id)
                .bind(target_id)
                .bind(target_kind.as_str())
                .bind(i16::from(to))
                .execute(&mut *tx)
                .await?;
            }
        }

        let counters = recompute_in(&mut tx, target_id, target_kind).await?;
        tx.commit().await.map_err(map_vote_conflict)?;

        Ok(VoteOutcome::new(transition, counters))
    }

    async fn vote_for(
        &self,
        voter_id: Uuid,
        target_id: Uuid,
        target_kind: TargetKind,
    ) -> Result<Option<Vote>> {
        let vote = sqlx::query_as::<_, Vote>(
            "SELECT * FROM votes WHERE voter_id = $1 AND target_id = $2 AND target_kind = $3",
        )
        .bind(voter_id)
        .bind(target_id)
        .bind(target_kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(vote)
    }

    async fn recompute_counters(
        &self,
        target_id: Uuid,
        target_kind: TargetKind,
    ) -> Result<VoteCounters> {
        let mut tx = self.pool.begin().await?;
        let lock_sql = format!(
            "SELECT id FROM {} WHERE id = $1 FOR UPDATE",
            content_table(target_kind)
        );
        sqlx::query(&lock_sql)
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| target_not_found(target_id, target_kind))?;

        let counters = recompute_in(&mut tx, target_id, target_kind).await?;
        tx.commit().await?;
        Ok(counters)
    }

    async fn create_report(&self, input: NewReport) -> Result<Report> {
        let exists_sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
            content_table(input.target_kind)
        );
        let exists = sqlx::query_scalar::<_, bool>(&exists_sql)
            .bind(input.target_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(target_not_found(input.target_id, input.target_kind));
        }

        let report = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports (
                id, reporter_id, reporter_token, target_id, target_kind,
                reason, description, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.reporter_id)
        .bind(&input.reporter_token)
        .bind(input.target_id)
        .bind(input.target_kind.as_str())
        .bind(&input.reason)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(report)
    }

    async fn resolve_report(
        &self,
        report_id: Uuid,
        action: ReportAction,
        reviewer_id: Uuid,
    ) -> Result<ReportResolution> {
        let mut tx = self.pool.begin().await?;

        let report = sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = $1 FOR UPDATE")
            .bind(report_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ForumError::NotFound(format!("report {} not found", report_id)))?;
        let next = report.status.resolve()?;

        let target_deleted = match action {
            ReportAction::Delete => {
                soft_delete_in(&mut tx, report.target_id, report.target_kind).await?
            }
            ReportAction::Keep => false,
        };
        let location = locate_in(&mut tx, report.target_id, report.target_kind).await?;

        let report = sqlx::query_as::<_, Report>(
            r#"
            UPDATE reports
            SET status = $2, resolution = $3, reviewed_by = $4,
                reviewed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(report_id)
        .bind(next.as_str())
        .bind(action.as_str())
        .bind(reviewer_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ReportResolution {
            report,
            target_deleted,
            affected_post_id: location.map(|(post_id, _)| post_id),
            affected_community_id: location.and_then(|(_, community_id)| community_id),
        })
    }

    async fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>> {
        let reports = sqlx::query_as::<_, Report>(
            r#"
            SELECT * FROM reports
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(reports)
    }

    async fn enqueue_post(
        &self,
        post_id: Uuid,
        flagged_by: &str,
        reason: &str,
    ) -> Result<ModerationQueueItem> {
        let mut conn = self.pool.acquire().await?;
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
            .bind(post_id)
            .fetch_one(&mut *conn)
            .await?;
        if !exists {
            return Err(target_not_found(post_id, TargetKind::Post));
        }
        insert_queue_item(&mut conn, post_id, flagged_by, reason).await
    }

    async fn review_queue_item(
        &self,
        item_id: Uuid,
        decision: QueueDecision,
        reviewer_id: Uuid,
    ) -> Result<QueueReview> {
        let mut tx = self.pool.begin().await?;

        let item = sqlx::query_as::<_, ModerationQueueItem>(
            "SELECT * FROM moderation_queue WHERE id = $1 FOR UPDATE",
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ForumError::NotFound(format!("queue item {} not found", item_id)))?;
        let next = item.status.review(decision)?;

        let post_sql = match decision {
            QueueDecision::Approve => {
                "UPDATE posts SET approved = TRUE WHERE id = $1 RETURNING community_id"
            }
            QueueDecision::Reject => {
                "UPDATE posts SET deleted = TRUE WHERE id = $1 RETURNING community_id"
            }
        };
        let community_id = sqlx::query_scalar::<_, Uuid>(post_sql)
            .bind(item.post_id)
            .fetch_optional(&mut *tx)
            .await?;

        let item = sqlx::query_as::<_, ModerationQueueItem>(
            r#"
            UPDATE moderation_queue
            SET status = $2, reviewed_by = $3, reviewed_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(item_id)
        .bind(next.as_str())
        .bind(reviewer_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(QueueReview { item, community_id })
    }

    async fn list_queue(&self, status: Option<QueueStatus>) -> Result<Vec<ModerationQueueItem>> {
        let items = sqlx::query_as::<_, ModerationQueueItem>(
            r#"
            SELECT * FROM moderation_queue
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn create_ban(&self, input: NewBan) -> Result<Ban> {
        let (user_id, ip_address) = match input.subject {
            BanSubject::User(id) => (Some(id), None),
            BanSubject::Ip(ip) => (None, Some(ip.to_string())),
        };

        let mut tx = self.pool.begin().await?;
        let ban = sqlx::query_as::<_, Ban>(
            r#"
            INSERT INTO bans (
                id, user_id, ip_address, is_shadowban, is_permanent, reason, banned_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&ip_address)
        .bind(input.is_shadowban)
        .bind(input.is_permanent)
        .bind(&input.reason)
        .bind(input.banned_by)
        .fetch_one(&mut *tx)
        .await?;

        if let (true, Some(user_id)) = (ban.is_shadowban, ban.user_id) {
            let posts = sqlx::query("UPDATE posts SET shadowbanned = TRUE WHERE author_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            let comments =
                sqlx::query("UPDATE comments SET shadowbanned = TRUE WHERE author_id = $1")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            tracing::debug!(
                user_id = %user_id,
                posts = posts.rows_affected(),
                comments = comments.rows_affected(),
                "Marked existing content shadowbanned"
            );
        }

        tx.commit().await?;
        Ok(ban)
    }

    async fn active_ban(&self, user_id: Option<Uuid>, ip: Option<IpAddr>) -> Result<Option<Ban>> {
        if user_id.is_none() && ip.is_none() {
            return Ok(None);
        }
        let ban = sqlx::query_as::<_, Ban>(
            r#"
            SELECT * FROM bans
            WHERE NOT is_shadowban AND (user_id = $1 OR ip_address = $2)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(ip.map(|ip| ip.to_string()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(ban)
    }

    async fn shadowbanned_users(&self) -> Result<HashSet<Uuid>> {
        let users = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT user_id FROM bans WHERE is_shadowban AND user_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users.into_iter().collect())
    }

    async fn save_post(&self, user_id: Uuid, post_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(target_not_found(post_id, TargetKind::Post));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO saved_posts (user_id, post_id, saved_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, post_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unsave_post(&self, user_id: Uuid, post_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saved_posts WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn saved_posts(&self, user_id: Uuid) -> Result<Vec<SavedPostView>> {
        let rows = sqlx::query(
            r#"
            SELECT p.*, s.saved_at
            FROM saved_posts s
            JOIN posts p ON p.id = s.post_id
            WHERE s.user_id = $1
            ORDER BY s.saved_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<SavedPostView> {
                Ok(SavedPostView {
                    saved_at: row.try_get("saved_at")?,
                    post: Post::from_row(row)?,
                })
            })
            .collect()
    }

    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        if follower_id == followee_id {
            return Err(ForumError::Validation("cannot follow yourself".to_string()));
        }
        let result = sqlx::query(
            r#"
            INSERT INTO follows (follower_id, followee_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (follower_id, followee_id) DO NOTHING
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn followees(&self, follower_id: Uuid) -> Result<Vec<Uuid>> {
        let followees = sqlx::query_scalar::<_, Uuid>(
            "SELECT followee_id FROM follows WHERE follower_id = $1 ORDER BY created_at ASC",
        )
        .bind(follower_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(followees)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
