//! View cache and change propagation
//!
//! Reads cache raw row snapshots (never rankings, hot scores depend on the
//! read time). Every committed mutation is published as a `ChangeEvent`; the
//! propagator maps events to the cache keys they stale and evicts them.
//! The publishing instance evicts synchronously before publishing so its own
//! callers always read their writes.

use crate::domain::{Comment, Post, TargetKind};
use crate::error::Result;
use crate::metrics::VIEW_CACHE_EVENTS;
use change_feed::{
    ChangeEvent, ChangeFeed, ChangeFilter, ChangeHandler, ChangeOperation, Subscription,
};
use dashmap::DashMap;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod tables {
    pub const POSTS: &str = "posts";
    pub const COMMENTS: &str = "comments";
    pub const VOTES: &str = "votes";
    pub const REPORTS: &str = "reports";
    pub const MODERATION_QUEUE: &str = "moderation_queue";
    pub const BANS: &str = "bans";
    pub const SAVED_POSTS: &str = "saved_posts";
    pub const FOLLOWS: &str = "follows";

    /// Tables whose changes can stale a cached view
    pub const WATCHED: [&str; 4] = [POSTS, COMMENTS, VOTES, BANS];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKey {
    CommunityPosts(Uuid),
    PostComments(Uuid),
    ShadowbannedUsers,
}

#[derive(Clone)]
enum Snapshot {
    Posts(Arc<Vec<Post>>),
    Comments(Arc<Vec<Comment>>),
    Users(Arc<HashSet<Uuid>>),
}

/// What a change event stales
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Nothing,
    Keys(Vec<ViewKey>),
    Everything,
}

fn uuid_column(event: &ChangeEvent, column: &str) -> Option<Uuid> {
    event.column(column)?.parse().ok()
}

/// Maps a change to the views it stales. Events missing the columns needed
/// to narrow the blast radius invalidate everything.
pub fn invalidation_for(event: &ChangeEvent) -> Invalidation {
    if event.operation == ChangeOperation::Resync {
        return Invalidation::Everything;
    }

    let community = uuid_column(event, "community_id").map(ViewKey::CommunityPosts);
    let post_comments = uuid_column(event, "post_id").map(ViewKey::PostComments);

    let keys: Option<Vec<ViewKey>> = match event.table.as_str() {
        tables::POSTS => community.map(|key| vec![key]),
        tables::COMMENTS => match (post_comments, community) {
            (Some(comments), Some(posts)) => Some(vec![comments, posts]),
            (Some(comments), None) => Some(vec![comments]),
            _ => None,
        },
        tables::VOTES => match event.column("target_kind").and_then(|k| k.parse().ok()) {
            Some(TargetKind::Post) => community.map(|key| vec![key]),
            Some(TargetKind::Comment) => post_comments.map(|key| vec![key]),
            None => None,
        },
        tables::BANS => return Invalidation::Everything,
        tables::REPORTS | tables::MODERATION_QUEUE | tables::SAVED_POSTS | tables::FOLLOWS => {
            return Invalidation::Nothing
        }
        _ => return Invalidation::Nothing,
    };

    match keys {
        Some(keys) => Invalidation::Keys(keys),
        None => Invalidation::Everything,
    }
}

/// Snapshot cache keyed by view scope.
///
/// Loads take an epoch ticket first; a snapshot loaded before an eviction is
/// discarded instead of being written back over fresher state.
#[derive(Default)]
pub struct ViewCache {
    entries: DashMap<ViewKey, Snapshot>,
    epoch: AtomicU64,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticket to pass back to a `put_*` call after loading from the store
    pub fn ticket(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn get(&self, key: ViewKey) -> Option<Snapshot> {
        let hit = self.entries.get(&key).map(|entry| entry.value().clone());
        let event = if hit.is_some() { "hit" } else { "miss" };
        VIEW_CACHE_EVENTS.with_label_values(&[event]).inc();
        hit
    }

    fn put(&self, key: ViewKey, ticket: u64, snapshot: Snapshot) {
        if self.ticket() != ticket {
            debug!(?key, "Discarding snapshot loaded before an invalidation");
            return;
        }
        self.entries.insert(key, snapshot);
    }

    pub fn posts(&self, community_id: Uuid) -> Option<Arc<Vec<Post>>> {
        match self.get(ViewKey::CommunityPosts(community_id))? {
            Snapshot::Posts(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn put_posts(&self, community_id: Uuid, ticket: u64, rows: Arc<Vec<Post>>) {
        self.put(
            ViewKey::CommunityPosts(community_id),
            ticket,
            Snapshot::Posts(rows),
        );
    }

    pub fn comments(&self, post_id: Uuid) -> Option<Arc<Vec<Comment>>> {
        match self.get(ViewKey::PostComments(post_id))? {
            Snapshot::Comments(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn put_comments(&self, post_id: Uuid, ticket: u64, rows: Arc<Vec<Comment>>) {
        self.put(ViewKey::PostComments(post_id), ticket, Snapshot::Comments(rows));
    }

    pub fn shadowbanned(&self) -> Option<Arc<HashSet<Uuid>>> {
        match self.get(ViewKey::ShadowbannedUsers)? {
            Snapshot::Users(users) => Some(users),
            _ => None,
        }
    }

    pub fn put_shadowbanned(&self, ticket: u64, users: Arc<HashSet<Uuid>>) {
        self.put(ViewKey::ShadowbannedUsers, ticket, Snapshot::Users(users));
    }

    /// Evicts whatever `event` stales. Returns the number of entries removed.
    pub fn apply(&self, event: &ChangeEvent) -> usize {
        let invalidation = invalidation_for(event);
        if invalidation != Invalidation::Nothing {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }

        let evicted = match invalidation {
            Invalidation::Nothing => 0,
            Invalidation::Keys(keys) => keys
                .iter()
                .filter(|key| self.entries.remove(key).is_some())
                .count(),
            Invalidation::Everything => {
                let count = self.entries.len();
                self.entries.clear();
                count
            }
        };

        if evicted > 0 {
            VIEW_CACHE_EVENTS
                .with_label_values(&["invalidate"])
                .inc_by(evicted as u64);
            debug!(table = %event.table, evicted, "Evicted stale views");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Subscribes the view cache to the change feed
pub struct ChangePropagator {
    cache: Arc<ViewCache>,
    feed: Arc<dyn ChangeFeed>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ChangePropagator {
    pub fn new(cache: Arc<ViewCache>, feed: Arc<dyn ChangeFeed>) -> Self {
        Self {
            cache,
            feed,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to every table that can stale a cached view
    pub async fn start(&self) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        for table in tables::WATCHED {
            let cache = Arc::clone(&self.cache);
            let handler: ChangeHandler = Arc::new(move |event: ChangeEvent| {
                cache.apply(&event);
                Ok(())
            });
            subscriptions.push(self.feed.subscribe(ChangeFilter::table(table), handler).await?);
        }
        info!(tables = ?tables::WATCHED, "Change propagation started");
        Ok(())
    }

    pub async fn active_subscriptions(&self) -> usize {
        self.subscriptions
            .lock()
            .await
            .iter()
            .filter(|s| s.is_active())
            .count()
    }

    pub async fn stop(&self) {
        let mut subscriptions = self.subscriptions.lock().await;
        for subscription in subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        info!("Change propagation stopped");
    }
}

/// Publishing side: evict locally, then tell everyone else
#[derive(Clone)]
pub struct ChangeNotifier {
    cache: Arc<ViewCache>,
    feed: Arc<dyn ChangeFeed>,
    source: String,
}

impl ChangeNotifier {
    pub fn new(cache: Arc<ViewCache>, feed: Arc<dyn ChangeFeed>, source: impl Into<String>) -> Self {
        Self {
            cache,
            feed,
            source: source.into(),
        }
    }

    pub fn cache(&self) -> &Arc<ViewCache> {
        &self.cache
    }

    /// The mutation has already committed, so a publish failure only delays
    /// other instances and is logged rather than returned.
    pub async fn notify(&self, event: ChangeEvent) {
        self.cache.apply(&event);
        if let Err(e) = self.feed.publish(event).await {
            warn!(error = %e, "Failed to publish change event");
        }
    }

    pub async fn post_changed(&self, post: &Post, created: bool) {
        let row = json!({
            "id": post.id,
            "community_id": post.community_id,
            "deleted": post.deleted,
            "approved": post.approved,
            "pinned": post.pinned,
            "locked": post.locked,
        });
        let event = if created {
            ChangeEvent::insert(tables::POSTS, post.id.to_string(), row, &self.source)
        } else {
            ChangeEvent::update(tables::POSTS, post.id.to_string(), row, &self.source)
        };
        self.notify(event).await;
    }

    pub async fn comment_changed(&self, comment: &Comment, community_id: Option<Uuid>, created: bool) {
        let row = json!({
            "id": comment.id,
            "post_id": comment.post_id,
            "community_id": community_id,
            "parent_comment_id": comment.parent_comment_id,
            "deleted": comment.deleted,
        });
        let event = if created {
            ChangeEvent::insert(tables::COMMENTS, comment.id.to_string(), row, &self.source)
        } else {
            ChangeEvent::update(tables::COMMENTS, comment.id.to_string(), row, &self.source)
        };
        self.notify(event).await;
    }

    pub async fn vote_changed(
        &self,
        voter_id: Uuid,
        target_id: Uuid,
        target_kind: TargetKind,
        post_id: Option<Uuid>,
        community_id: Option<Uuid>,
        net_score: i64,
    ) {
        let row = json!({
            "voter_id": voter_id,
            "target_id": target_id,
            "target_kind": target_kind,
            "post_id": post_id,
            "community_id": community_id,
            "net_score": net_score,
        });
        let event = ChangeEvent::update(
            tables::VOTES,
            format!("{}:{}", voter_id, target_id),
            row,
            &self.source,
        );
        self.notify(event).await;
    }

    pub async fn row_changed(&self, table: &str, row_id: Uuid, row: serde_json::Value) {
        let event = ChangeEvent::update(table, row_id.to_string(), row, &self.source);
        self.notify(event).await;
    }

    pub async fn edge_changed(&self, table: &str, from: Uuid, to: Uuid, inserted: bool) {
        let row_id = format!("{}:{}", from, to);
        let row = json!({ "from": from, "to": to });
        let event = if inserted {
            ChangeEvent::insert(table, row_id, row, &self.source)
        } else {
            ChangeEvent::delete(table, row_id, row, &self.source)
        };
        self.notify(event).await;
    }
}
