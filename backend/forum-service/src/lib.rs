/// Forum Service Library
///
/// Vote ledger, ranked community feeds, threaded comments and the moderation
/// pipeline for community forums, with change propagation keeping cached
/// views consistent across instances.
///
/// # Modules
///
/// - `handlers`: HTTP request handlers and route table
/// - `domain`: Entities, state machines and validated request payloads
/// - `services`: Vote ledger, ranking, comment trees, moderation and feeds
/// - `repository`: Storage seam with PostgreSQL and in-memory backends
/// - `middleware`: Caller identity extraction
/// - `error`: Error types and handling
/// - `config`: Configuration management
/// - `metrics`: Prometheus counters
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod repository;
pub mod services;

pub use config::Config;
pub use error::{ForumError, Result};

use change_feed::ChangeFeed;
use config::RankingConfig;
use repository::ForumStore;
use services::{
    ChangeNotifier, ChangePropagator, ContentService, FeedService, ModerationService,
    SocialService, ViewCache, VoteService,
};
use std::sync::Arc;

pub const SERVICE_NAME: &str = "forum-service";

/// Shared application state handed to every handler
pub struct AppState {
    pub store: Arc<dyn ForumStore>,
    pub content: ContentService,
    pub votes: VoteService,
    pub moderation: ModerationService,
    pub feeds: FeedService,
    pub social: SocialService,
    pub propagator: Arc<ChangePropagator>,
}

impl AppState {
    /// Wire every service onto one store, one view cache and one change feed.
    /// Call `propagator.start()` before serving traffic.
    pub fn new(
        store: Arc<dyn ForumStore>,
        feed: Arc<dyn ChangeFeed>,
        ranking: &RankingConfig,
    ) -> Self {
        let cache = Arc::new(ViewCache::new());
        let notifier = ChangeNotifier::new(Arc::clone(&cache), Arc::clone(&feed), SERVICE_NAME);

        Self {
            content: ContentService::new(Arc::clone(&store), notifier.clone()),
            votes: VoteService::new(Arc::clone(&store), notifier.clone()),
            moderation: ModerationService::new(Arc::clone(&store), notifier.clone()),
            social: SocialService::new(Arc::clone(&store), notifier),
            feeds: FeedService::new(Arc::clone(&store), Arc::clone(&cache), ranking),
            propagator: Arc::new(ChangePropagator::new(cache, feed)),
            store,
        }
    }
}
