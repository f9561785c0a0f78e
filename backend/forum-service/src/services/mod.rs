pub mod comment_tree;
pub mod content;
pub mod feeds;
pub mod moderation;
pub mod propagation;
pub mod ranking;
pub mod social;
pub mod vote_ledger;

pub use comment_tree::{build_comment_tree, CommentNode};
pub use content::ContentService;
pub use feeds::{FeedPage, FeedQuery, FeedService, SavedItem};
pub use moderation::ModerationService;
pub use propagation::{ChangeNotifier, ChangePropagator, ViewCache};
pub use ranking::{Ranker, SortStrategy};
pub use social::SocialService;
pub use vote_ledger::VoteService;

use crate::domain::{TargetKind, Viewer};
use crate::error::{ForumError, Result};
use crate::repository::ForumStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Refuses callers holding a full ban on their account or address
pub(crate) async fn ensure_not_banned(
    store: &dyn ForumStore,
    viewer: &Viewer,
    action: &str,
) -> Result<()> {
    if let Some(ban) = store.active_ban(viewer.user_id, viewer.ip).await? {
        warn!(
            ban_id = %ban.id,
            user_id = ?viewer.user_id,
            ip = ?viewer.ip,
            action,
            "Refused action from banned caller"
        );
        return Err(ForumError::Unauthorized(format!(
            "banned from {}: {}",
            action, ban.reason
        )));
    }
    Ok(())
}

/// Shadowbanned user ids, served from the view cache when possible
pub(crate) async fn shadowbanned_users(
    store: &dyn ForumStore,
    cache: &ViewCache,
) -> Result<Arc<HashSet<Uuid>>> {
    if let Some(users) = cache.shadowbanned() {
        return Ok(users);
    }
    let ticket = cache.ticket();
    let users = Arc::new(store.shadowbanned_users().await?);
    cache.put_shadowbanned(ticket, Arc::clone(&users));
    Ok(users)
}

/// `(post_id, community_id)` of a vote/report target, for change events.
/// Lookup failures only widen the invalidation, so they are logged and
/// swallowed.
pub(crate) async fn locate_target(
    store: &dyn ForumStore,
    target_id: Uuid,
    kind: TargetKind,
) -> (Option<Uuid>, Option<Uuid>) {
    let post_id = match kind {
        TargetKind::Post => Ok(Some(target_id)),
        TargetKind::Comment => store
            .get_comment(target_id)
            .await
            .map(|c| c.map(|c| c.post_id)),
    };
    let post_id = match post_id {
        Ok(Some(post_id)) => post_id,
        Ok(None) => return (None, None),
        Err(e) => {
            warn!(error = %e, target_id = %target_id, "Failed to locate target");
            return (None, None);
        }
    };
    match store.get_post(post_id).await {
        Ok(post) => (Some(post_id), post.map(|p| p.community_id)),
        Err(e) => {
            warn!(error = %e, post_id = %post_id, "Failed to locate post");
            (Some(post_id), None)
        }
    }
}
