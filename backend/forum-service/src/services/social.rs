//! Bookmarks and follow edges. Every call is idempotent; the boolean result
//! says whether anything changed.

use super::propagation::{tables, ChangeNotifier};
use super::{ranking, shadowbanned_users};
use crate::domain::{TargetKind, Viewer};
use crate::error::{ForumError, Result};
use crate::repository::ForumStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct SocialService {
    store: Arc<dyn ForumStore>,
    notifier: ChangeNotifier,
}

impl SocialService {
    pub fn new(store: Arc<dyn ForumStore>, notifier: ChangeNotifier) -> Self {
        Self { store, notifier }
    }

    /// Only posts the caller can currently see may be saved
    pub async fn save_post(&self, viewer: &Viewer, post_id: Uuid) -> Result<bool> {
        let user_id = viewer.require_user("save posts")?;
        let not_found = || ForumError::NotFound(format!("{} {} not found", TargetKind::Post, post_id));
        let post = self.store.get_post(post_id).await?.ok_or_else(not_found)?;
        let shadowbanned = shadowbanned_users(self.store.as_ref(), self.notifier.cache()).await?;
        if !ranking::is_visible(&post, viewer, &shadowbanned) {
            return Err(not_found());
        }

        let saved = self.store.save_post(user_id, post_id).await?;
        if saved {
            info!(user_id = %user_id, post_id = %post_id, "Post saved");
            self.notifier
                .edge_changed(tables::SAVED_POSTS, user_id, post_id, true)
                .await;
        }
        Ok(saved)
    }

    pub async fn unsave_post(&self, viewer: &Viewer, post_id: Uuid) -> Result<bool> {
        let user_id = viewer.require_user("unsave posts")?;
        let removed = self.store.unsave_post(user_id, post_id).await?;
        if removed {
            info!(user_id = %user_id, post_id = %post_id, "Post unsaved");
            self.notifier
                .edge_changed(tables::SAVED_POSTS, user_id, post_id, false)
                .await;
        }
        Ok(removed)
    }

    pub async fn follow(&self, viewer: &Viewer, followee_id: Uuid) -> Result<bool> {
        let user_id = viewer.require_user("follow users")?;
        let added = self.store.follow(user_id, followee_id).await?;
        if added {
            info!(follower_id = %user_id, followee_id = %followee_id, "Follow added");
            self.notifier
                .edge_changed(tables::FOLLOWS, user_id, followee_id, true)
                .await;
        }
        Ok(added)
    }

    pub async fn unfollow(&self, viewer: &Viewer, followee_id: Uuid) -> Result<bool> {
        let user_id = viewer.require_user("unfollow users")?;
        let removed = self.store.unfollow(user_id, followee_id).await?;
        if removed {
            info!(follower_id = %user_id, followee_id = %followee_id, "Follow removed");
            self.notifier
                .edge_changed(tables::FOLLOWS, user_id, followee_id, false)
                .await;
        }
        Ok(removed)
    }
}
