//! Ranked and personalized views
//!
//! Community listings, the following feed, the saved feed and the comment
//! tree of one post. Raw rows come from the view cache or the store, are
//! filtered for the viewer, redacted, ranked, and only then paginated.

use super::comment_tree::{build_comment_tree, CommentNode};
use super::propagation::ViewCache;
use super::ranking::{visible_to, Ranker, SortStrategy};
use super::{ranking, shadowbanned_users};
use crate::config::RankingConfig;
use crate::domain::{Comment, Post, TargetKind, Viewer};
use crate::error::{ForumError, Result};
use crate::repository::ForumStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Query-string parameters shared by ranked views
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    pub sort: Option<SortStrategy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage<T> {
    pub items: Vec<T>,
    /// `None` for views that are never re-ranked (saved feed)
    pub sort: Option<SortStrategy>,
    pub limit: usize,
    pub offset: usize,
    /// Visible items before pagination
    pub total: usize,
    /// Set when the store failed and an empty page was served instead
    pub degraded: bool,
}

impl<T> FeedPage<T> {
    pub fn degraded(sort: Option<SortStrategy>, limit: usize, offset: usize) -> Self {
        Self {
            items: Vec::new(),
            sort,
            limit,
            offset,
            total: 0,
            degraded: true,
        }
    }
}

/// Saved post with the time it was saved, which is what orders the feed
#[derive(Debug, Clone, Serialize)]
pub struct SavedItem {
    pub saved_at: chrono::DateTime<Utc>,
    #[serde(flatten)]
    pub post: Post,
}

pub struct FeedService {
    store: Arc<dyn ForumStore>,
    cache: Arc<ViewCache>,
    ranker: Ranker,
    default_page_size: usize,
    max_page_size: usize,
}

impl FeedService {
    pub fn new(store: Arc<dyn ForumStore>, cache: Arc<ViewCache>, ranking: &RankingConfig) -> Self {
        Self {
            store,
            cache,
            ranker: Ranker::new(ranking.hot_gravity, ranking.hot_age_offset_hours),
            default_page_size: ranking.default_page_size,
            max_page_size: ranking.max_page_size,
        }
    }

    /// `(limit, offset)` with the limit clamped to `1..=max_page_size`
    pub fn page_bounds(&self, query: &FeedQuery) -> (usize, usize) {
        let limit = query
            .limit
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);
        (limit, query.offset.unwrap_or(0))
    }

    fn paginate<T>(&self, items: Vec<T>, sort: Option<SortStrategy>, query: &FeedQuery) -> FeedPage<T> {
        let (limit, offset) = self.page_bounds(query);
        let total = items.len();
        FeedPage {
            items: items.into_iter().skip(offset).take(limit).collect(),
            sort,
            limit,
            offset,
            total,
            degraded: false,
        }
    }

    async fn community_rows(&self, community_id: Uuid) -> Result<Arc<Vec<Post>>> {
        if let Some(rows) = self.cache.posts(community_id) {
            return Ok(rows);
        }
        let ticket = self.cache.ticket();
        let rows = Arc::new(self.store.posts_in_community(community_id).await?);
        self.cache.put_posts(community_id, ticket, Arc::clone(&rows));
        Ok(rows)
    }

    async fn comment_rows(&self, post_id: Uuid) -> Result<Arc<Vec<Comment>>> {
        if let Some(rows) = self.cache.comments(post_id) {
            return Ok(rows);
        }
        let ticket = self.cache.ticket();
        let rows = Arc::new(self.store.comments_for_post(post_id).await?);
        self.cache.put_comments(post_id, ticket, Arc::clone(&rows));
        Ok(rows)
    }

    fn rank_for(&self, posts: Vec<Post>, viewer: &Viewer, strategy: SortStrategy) -> Vec<Post> {
        let redacted = posts.into_iter().map(|p| p.redacted_for(viewer)).collect();
        self.ranker.rank(redacted, strategy, Utc::now())
    }

    /// Ranked posts of one community, hot by default
    pub async fn community_feed(
        &self,
        viewer: &Viewer,
        community_id: Uuid,
        query: &FeedQuery,
    ) -> Result<FeedPage<Post>> {
        if self.store.get_community(community_id).await?.is_none() {
            return Err(ForumError::NotFound(format!(
                "community {} not found",
                community_id
            )));
        }
        let strategy = query.sort.unwrap_or_default();
        let rows = self.community_rows(community_id).await?;
        let shadowbanned = shadowbanned_users(self.store.as_ref(), &self.cache).await?;

        let visible = visible_to((*rows).clone(), viewer, &shadowbanned);
        let ranked = self.rank_for(visible, viewer, strategy);
        debug!(
            community_id = %community_id,
            strategy = %strategy,
            candidates = rows.len(),
            visible = ranked.len(),
            "Community feed assembled"
        );
        Ok(self.paginate(ranked, Some(strategy), query))
    }

    /// Posts by the users `viewer` follows, newest by default. An empty
    /// follow set is an empty feed.
    pub async fn following_feed(&self, viewer: &Viewer, query: &FeedQuery) -> Result<FeedPage<Post>> {
        let user_id = viewer.require_user("see your following feed")?;
        let strategy = query.sort.unwrap_or(SortStrategy::New);

        let followees = self.store.followees(user_id).await?;
        if followees.is_empty() {
            return Ok(self.paginate(Vec::new(), Some(strategy), query));
        }

        let posts = self.store.posts_by_authors(&followees).await?;
        let shadowbanned = shadowbanned_users(self.store.as_ref(), &self.cache).await?;
        let live: Vec<Post> = posts.into_iter().filter(|p| !p.deleted).collect();
        let visible = visible_to(live, viewer, &shadowbanned);
        let ranked = self.rank_for(visible, viewer, strategy);

        debug!(
            user_id = %user_id,
            followees = followees.len(),
            visible = ranked.len(),
            "Following feed assembled"
        );
        Ok(self.paginate(ranked, Some(strategy), query))
    }

    /// Saved posts, most recently saved first; never re-ranked
    pub async fn saved_feed(&self, viewer: &Viewer, query: &FeedQuery) -> Result<FeedPage<SavedItem>> {
        let user_id = viewer.require_user("see saved posts")?;
        let saved = self.store.saved_posts(user_id).await?;
        let shadowbanned = shadowbanned_users(self.store.as_ref(), &self.cache).await?;

        let items: Vec<SavedItem> = saved
            .into_iter()
            .filter(|view| ranking::is_visible(&view.post, viewer, &shadowbanned))
            .map(|view| SavedItem {
                saved_at: view.saved_at,
                post: view.post.redacted_for(viewer),
            })
            .collect();
        Ok(self.paginate(items, None, query))
    }

    /// Nested replies of one post in newest-first sibling order
    pub async fn comment_tree(&self, viewer: &Viewer, post_id: Uuid) -> Result<Vec<CommentNode>> {
        let not_found = || ForumError::NotFound(format!("{} {} not found", TargetKind::Post, post_id));
        let post = self.store.get_post(post_id).await?.ok_or_else(not_found)?;
        let shadowbanned = shadowbanned_users(self.store.as_ref(), &self.cache).await?;
        if !ranking::is_visible(&post, viewer, &shadowbanned) {
            return Err(not_found());
        }

        let rows = self.comment_rows(post_id).await?;
        let live: Vec<Comment> = rows.iter().filter(|c| !c.deleted).cloned().collect();
        let visible: Vec<Comment> = visible_to(live, viewer, &shadowbanned)
            .into_iter()
            .map(|c| c.redacted_for(viewer))
            .collect();

        let tree = build_comment_tree(visible);
        debug!(post_id = %post_id, roots = tree.len(), "Comment tree built");
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BanSubject, VoteDirection};
    use crate::repository::{MemoryForumStore, NewBan, NewComment, NewCommunity, NewPost};

    struct Fixture {
        feeds: FeedService,
        store: Arc<dyn ForumStore>,
        community_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn ForumStore> = Arc::new(MemoryForumStore::new());
        let community = store
            .create_community(NewCommunity {
                name: "feeds".into(),
                description: None,
                rules: vec![],
                require_post_approval: false,
            })
            .await
            .unwrap();
        Fixture {
            feeds: FeedService::new(
                Arc::clone(&store),
                Arc::new(ViewCache::new()),
                &RankingConfig::default(),
            ),
            store,
            community_id: community.id,
        }
    }

    async fn post(f: &Fixture, author: Uuid, title: &str) -> Post {
        f.store
            .create_post(NewPost {
                community_id: f.community_id,
                author_id: author,
                is_anonymous: false,
                title: title.into(),
                body: String::new(),
            })
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_empty_follow_set_is_empty_feed() {
        let f = fixture().await;
        post(&f, Uuid::new_v4(), "global").await;

        let page = f
            .feeds
            .following_feed(&Viewer::user(Uuid::new_v4()), &FeedQuery::default())
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.sort, Some(SortStrategy::New));
        assert!(!page.degraded);
    }

    #[tokio::test]
    async fn test_following_feed_skips_deleted_posts() {
        let f = fixture().await;
        let viewer = Uuid::new_v4();
        let author = Uuid::new_v4();
        f.store.follow(viewer, author).await.unwrap();

        let kept = post(&f, author, "kept").await;
        let removed = post(&f, author, "removed").await;
        f.store
            .set_post_flag(removed.id, crate::domain::PostFlag::Deleted, Some(true))
            .await
            .unwrap();

        let page = f
            .feeds
            .following_feed(&Viewer::moderator(viewer), &FeedQuery::default())
            .await
            .unwrap();
        let ids: Vec<Uuid> = page.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![kept.id]);
    }

    #[tokio::test]
    async fn test_saved_feed_orders_by_save_time() {
        let f = fixture().await;
        let user = Uuid::new_v4();
        let older = post(&f, Uuid::new_v4(), "older").await;
        let newer = post(&f, Uuid::new_v4(), "newer").await;

        f.store.save_post(user, newer.id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        f.store.save_post(user, older.id).await.unwrap();

        let page = f
            .feeds
            .saved_feed(&Viewer::user(user), &FeedQuery::default())
            .await
            .unwrap();
        let titles: Vec<&str> = page.items.iter().map(|i| i.post.title.as_str()).collect();
        assert_eq!(titles, vec!["older", "newer"]);
        assert_eq!(page.sort, None);
    }

    #[tokio::test]
    async fn test_community_feed_hides_shadowbanned_author_and_reflects_votes() {
        let f = fixture().await;
        let spammer = Uuid::new_v4();
        let honest = post(&f, Uuid::new_v4(), "honest").await;
        post(&f, spammer, "spam").await;

        // Warm the cache, then mutate through the store and invalidate.
        let viewer = Viewer::user(Uuid::new_v4());
        let first = f
            .feeds
            .community_feed(&viewer, f.community_id, &FeedQuery::default())
            .await
            .unwrap();
        assert_eq!(first.total, 2);

        f.store
            .create_ban(NewBan {
                subject: BanSubject::User(spammer),
                is_shadowban: true,
                is_permanent: false,
                reason: "spam".into(),
                banned_by: None,
            })
            .await
            .unwrap();
        f.store
            .cast_vote(Uuid::new_v4(), honest.id, TargetKind::Post, VoteDirection::Up)
            .await
            .unwrap();
        f.feeds.cache.apply(&change_feed::ChangeEvent::resync("bans", "test"));

        let page = f
            .feeds
            .community_feed(&viewer, f.community_id, &FeedQuery::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].upvotes, 1);

        let own = f
            .feeds
            .community_feed(&Viewer::user(spammer), f.community_id, &FeedQuery::default())
            .await
            .unwrap();
        assert_eq!(own.items.len(), 2);
    }

    #[tokio::test]
    async fn test_pagination_is_applied_after_ranking() {
        let f = fixture().await;
        for n in 0..5 {
            post(&f, Uuid::new_v4(), &format!("p{}", n)).await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        let query = FeedQuery {
            sort: Some(SortStrategy::New),
            limit: Some(2),
            offset: Some(1),
        };
        let page = f
            .feeds
            .community_feed(&Viewer::anonymous(), f.community_id, &query)
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        let titles: Vec<&str> = page.items.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["p3", "p2"]);

        let (limit, _) = f.feeds.page_bounds(&FeedQuery {
            limit: Some(10_000),
            ..FeedQuery::default()
        });
        assert_eq!(limit, 100);
    }

    #[tokio::test]
    async fn test_comment_tree_drops_deleted_subtrees() {
        let f = fixture().await;
        let parent_post = post(&f, Uuid::new_v4(), "thread").await;
        let comment = |parent: Option<Uuid>, body: &str| NewComment {
            post_id: parent_post.id,
            parent_comment_id: parent,
            author_id: Uuid::new_v4(),
            is_anonymous: false,
            body: body.into(),
        };

        let root = f.store.create_comment(comment(None, "root")).await.unwrap();
        let doomed = f
            .store
            .create_comment(comment(Some(root.id), "doomed"))
            .await
            .unwrap();
        f.store
            .create_comment(comment(Some(doomed.id), "orphaned"))
            .await
            .unwrap();
        f.store
            .create_comment(comment(Some(root.id), "sibling"))
            .await
            .unwrap();

        let report = f
            .store
            .create_report(crate::repository::NewReport {
                reporter_id: Some(Uuid::new_v4()),
                reporter_token: None,
                target_id: doomed.id,
                target_kind: TargetKind::Comment,
                reason: "abuse".into(),
                description: None,
            })
            .await
            .unwrap();
        f.store
            .resolve_report(report.id, crate::domain::ReportAction::Delete, Uuid::new_v4())
            .await
            .unwrap();

        let tree = f
            .feeds
            .comment_tree(&Viewer::anonymous(), parent_post.id)
            .await
            .unwrap();
        assert_eq!(tree.len(), 1);
        let replies: Vec<&str> = tree[0]
            .replies
            .iter()
            .map(|r| r.comment.body.as_str())
            .collect();
        assert_eq!(replies, vec!["sibling"]);
    }

    #[tokio::test]
    async fn test_missing_post_tree_is_not_found() {
        let f = fixture().await;
        let err = f
            .feeds
            .comment_tree(&Viewer::anonymous(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ForumError::NotFound(_)));
    }
}
