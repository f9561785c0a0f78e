//! Community, post and comment creation plus single-post reads

use super::propagation::{tables, ChangeNotifier};
use super::{ensure_not_banned, ranking, shadowbanned_users};
use crate::domain::{
    Comment, Community, CreateCommentRequest, CreateCommunityRequest, CreatePostRequest, Post,
    TargetKind, Viewer,
};
use crate::error::{ForumError, Result};
use crate::repository::{ForumStore, NewComment, NewCommunity, NewPost};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

pub struct ContentService {
    store: Arc<dyn ForumStore>,
    notifier: ChangeNotifier,
}

impl ContentService {
    pub fn new(store: Arc<dyn ForumStore>, notifier: ChangeNotifier) -> Self {
        Self { store, notifier }
    }

    pub async fn create_community(
        &self,
        viewer: &Viewer,
        request: CreateCommunityRequest,
    ) -> Result<Community> {
        let moderator_id = viewer.require_moderator()?;
        request.validate()?;

        let community = self
            .store
            .create_community(NewCommunity {
                name: request.name,
                description: request.description,
                rules: request.rules,
                require_post_approval: request.require_post_approval,
            })
            .await?;

        info!(
            community_id = %community.id,
            moderator_id = %moderator_id,
            require_post_approval = community.require_post_approval,
            "Community created"
        );
        Ok(community)
    }

    /// Communities gating new posts return the post unapproved and queued
    pub async fn create_post(
        &self,
        viewer: &Viewer,
        community_id: Uuid,
        request: CreatePostRequest,
    ) -> Result<Post> {
        let author_id = viewer.require_user("post")?;
        request.validate()?;
        ensure_not_banned(self.store.as_ref(), viewer, "posting").await?;

        let (post, queued) = self
            .store
            .create_post(NewPost {
                community_id,
                author_id,
                is_anonymous: request.anonymous,
                title: request.title,
                body: request.body,
            })
            .await?;

        info!(
            post_id = %post.id,
            community_id = %community_id,
            anonymous = post.is_anonymous,
            queued = queued.is_some(),
            "Post created"
        );

        self.notifier.post_changed(&post, true).await;
        if let Some(item) = &queued {
            self.notifier
                .row_changed(
                    tables::MODERATION_QUEUE,
                    item.id,
                    json!({ "post_id": item.post_id, "status": item.status }),
                )
                .await;
        }

        Ok(post.redacted_for(viewer))
    }

    pub async fn create_comment(
        &self,
        viewer: &Viewer,
        post_id: Uuid,
        request: CreateCommentRequest,
    ) -> Result<Comment> {
        let author_id = viewer.require_user("comment")?;
        request.validate()?;
        ensure_not_banned(self.store.as_ref(), viewer, "commenting").await?;

        let comment = self
            .store
            .create_comment(NewComment {
                post_id,
                parent_comment_id: request.parent_comment_id,
                author_id,
                is_anonymous: request.anonymous,
                body: request.body,
            })
            .await?;

        info!(
            comment_id = %comment.id,
            post_id = %post_id,
            parent_comment_id = ?comment.parent_comment_id,
            "Comment created"
        );

        let community_id = match self.store.get_post(post_id).await {
            Ok(post) => post.map(|p| p.community_id),
            Err(_) => None,
        };
        self.notifier
            .comment_changed(&comment, community_id, true)
            .await;

        Ok(comment.redacted_for(viewer))
    }

    /// Direct single-post read. Missing and hidden posts are both NotFound.
    pub async fn get_post(&self, viewer: &Viewer, post_id: Uuid) -> Result<Post> {
        let not_found = || ForumError::NotFound(format!("{} {} not found", TargetKind::Post, post_id));
        let post = self.store.get_post(post_id).await?.ok_or_else(not_found)?;

        let shadowbanned = shadowbanned_users(self.store.as_ref(), self.notifier.cache()).await?;
        if !ranking::is_visible(&post, viewer, &shadowbanned) {
            debug!(post_id = %post_id, "Hidden post requested by unauthorized viewer");
            return Err(not_found());
        }
        Ok(post.redacted_for(viewer))
    }
}
