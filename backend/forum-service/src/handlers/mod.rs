/// HTTP handlers for forum endpoints
///
/// - Feeds: ranked community listings, following and saved feeds
/// - Posts and comments: creation, single-post reads, comment trees
/// - Votes: casting and moderator reconciliation
/// - Moderation: reports, the review queue, bans and post flags
/// - Social: bookmarks and follows
pub mod comments;
pub mod feed;
pub mod health;
pub mod moderation;
pub mod posts;
pub mod social;
pub mod votes;

use actix_web::web;
use serde::Deserialize;

/// `?status=` filter shared by the moderator listings
#[derive(Debug, Deserialize)]
pub struct StatusQuery<S> {
    pub status: Option<S>,
}

/// Route table for the whole service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(crate::metrics::serve_metrics))
        .route("/health", web::get().to(health::health))
        .route("/ready", web::get().to(health::ready))
        .service(
            web::scope("/api/v1")
                .service(
                    web::scope("/communities")
                        .route("", web::post().to(posts::create_community))
                        .service(
                            web::resource("/{community_id}/posts")
                                .route(web::get().to(feed::community_posts))
                                .route(web::post().to(posts::create_post)),
                        ),
                )
                .service(
                    web::scope("/feed")
                        .route("/following", web::get().to(feed::following_feed))
                        .route("/saved", web::get().to(feed::saved_feed)),
                )
                .service(
                    web::scope("/posts")
                        .route("/{post_id}", web::get().to(posts::get_post))
                        .service(
                            web::resource("/{post_id}/comments")
                                .route(web::get().to(comments::comment_tree))
                                .route(web::post().to(comments::create_comment)),
                        )
                        .service(
                            web::resource("/{post_id}/save")
                                .route(web::post().to(social::save_post))
                                .route(web::delete().to(social::unsave_post)),
                        ),
                )
                .service(
                    web::resource("/users/{user_id}/follow")
                        .route(web::post().to(social::follow))
                        .route(web::delete().to(social::unfollow)),
                )
                .route("/votes", web::post().to(votes::cast_vote))
                .route("/reports", web::post().to(moderation::create_report))
                .service(
                    web::scope("/moderation")
                        .route("/reports", web::get().to(moderation::list_reports))
                        .route(
                            "/reports/{report_id}/resolve",
                            web::post().to(moderation::resolve_report),
                        )
                        .service(
                            web::resource("/queue")
                                .route(web::get().to(moderation::list_queue))
                                .route(web::post().to(moderation::enqueue_post)),
                        )
                        .route(
                            "/queue/{item_id}/review",
                            web::post().to(moderation::review_queue_item),
                        )
                        .route("/bans", web::post().to(moderation::create_ban))
                        .route(
                            "/posts/{post_id}/flags",
                            web::post().to(moderation::toggle_post_flag),
                        )
                        .route("/recompute", web::post().to(votes::recompute_counters)),
                ),
        );
}
