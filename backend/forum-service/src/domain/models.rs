use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which kind of content item a vote or report points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Comment,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Post => "post",
            TargetKind::Comment => "comment",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(TargetKind::Post),
            "comment" => Ok(TargetKind::Comment),
            other => Err(format!("unknown target kind: {}", other)),
        }
    }
}

impl TryFrom<String> for TargetKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Post row. Counters are a cache of the vote ledger and comment table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub community_id: Uuid,
    /// Real author, kept even for anonymous posts so moderators can trace them
    pub author_id: Option<Uuid>,
    pub is_anonymous: bool,
    pub title: String,
    pub body: String,
    pub deleted: bool,
    pub approved: bool,
    pub pinned: bool,
    pub locked: bool,
    pub shadowbanned: bool,
    pub upvotes: i64,
    pub downvotes: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Comment row; `parent_comment_id` makes comments recursive
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub parent_comment_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub is_anonymous: bool,
    pub body: String,
    pub deleted: bool,
    pub approved: bool,
    pub shadowbanned: bool,
    pub upvotes: i64,
    pub downvotes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityRule {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Community {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub member_count: i64,
    pub post_count: i64,
    pub rules: Json<Vec<CommunityRule>>,
    /// New posts enter the moderation queue unapproved
    pub require_post_approval: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SavedPost {
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub saved_at: DateTime<Utc>,
}

/// A saved post as shown in the saved feed; `saved_at` drives the order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPostView {
    pub saved_at: DateTime<Utc>,
    pub post: Post,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follow {
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Post-level moderator toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostFlag {
    Pinned,
    Locked,
    Deleted,
}

impl PostFlag {
    pub fn column(&self) -> &'static str {
        match self {
            PostFlag::Pinned => "pinned",
            PostFlag::Locked => "locked",
            PostFlag::Deleted => "deleted",
        }
    }

    pub fn get(&self, post: &Post) -> bool {
        match self {
            PostFlag::Pinned => post.pinned,
            PostFlag::Locked => post.locked,
            PostFlag::Deleted => post.deleted,
        }
    }

    pub fn set(&self, post: &mut Post, value: bool) {
        match self {
            PostFlag::Pinned => post.pinned = value,
            PostFlag::Locked => post.locked = value,
            PostFlag::Deleted => post.deleted = value,
        }
    }
}

/// Hide the author of anonymous content from everyone but its author and
/// moderators.
pub fn redact_author(
    author_id: Option<Uuid>,
    is_anonymous: bool,
    viewer: &super::Viewer,
) -> Option<Uuid> {
    if !is_anonymous || viewer.is_moderator || (author_id.is_some() && viewer.user_id == author_id)
    {
        author_id
    } else {
        None
    }
}

impl Post {
    pub fn redacted_for(mut self, viewer: &super::Viewer) -> Self {
        self.author_id = redact_author(self.author_id, self.is_anonymous, viewer);
        self
    }
}

impl Comment {
    pub fn redacted_for(mut self, viewer: &super::Viewer) -> Self {
        self.author_id = redact_author(self.author_id, self.is_anonymous, viewer);
        self
    }
}
