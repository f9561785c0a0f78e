//! HTTP-level tests over the in-memory store
//!
//! Each test builds the full route table with `test::init_service` and talks
//! to it the way the gateway would: identity arrives in headers, bodies are
//! JSON.

use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use change_feed::MemoryChangeFeed;
use forum_service::config::RankingConfig;
use forum_service::middleware::{ROLE_HEADER, USER_ID_HEADER};
use forum_service::repository::MemoryForumStore;
use forum_service::{handlers, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

async fn state() -> web::Data<AppState> {
    let state = web::Data::new(AppState::new(
        Arc::new(MemoryForumStore::new()),
        Arc::new(MemoryChangeFeed::new("forum-service-test")),
        &RankingConfig::default(),
    ));
    state.propagator.start().await.expect("propagation starts");
    state
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .configure(handlers::configure),
        )
        .await
    };
}

fn as_user(req: test::TestRequest, user: Uuid) -> test::TestRequest {
    req.insert_header((USER_ID_HEADER, user.to_string()))
}

fn as_moderator(req: test::TestRequest, user: Uuid) -> test::TestRequest {
    as_user(req, user).insert_header((ROLE_HEADER, "moderator"))
}

async fn json_body(resp: ServiceResponse) -> Value {
    test::read_body_json(resp).await
}

#[actix_web::test]
async fn test_vote_laws_over_http() {
    let state = state().await;
    let app = app!(state);
    let moderator = Uuid::new_v4();
    let author = Uuid::new_v4();

    let req = as_moderator(test::TestRequest::post().uri("/api/v1/communities"), moderator)
        .set_json(json!({ "name": "rust" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let community_id = json_body(resp).await["id"].as_str().unwrap().to_string();

    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/v1/communities/{}/posts", community_id)),
        author,
    )
    .set_json(json!({ "title": "P", "body": "" }))
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let post_id = json_body(resp).await["id"].as_str().unwrap().to_string();

    let vote = |voter: Uuid, direction: i16| {
        as_user(test::TestRequest::post().uri("/api/v1/votes"), voter)
            .set_json(json!({
                "target_id": post_id,
                "target_kind": "post",
                "direction": direction,
            }))
            .to_request()
    };

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut scores = Vec::new();
    for (voter, direction) in [(a, 1), (b, 1), (a, 1), (b, -1)] {
        let resp = test::call_service(&app, vote(voter, direction)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        scores.push(json_body(resp).await["net_score"].as_i64().unwrap());
    }
    // insert, insert, retract, flip
    assert_eq!(scores, vec![1, 2, 1, -1]);

    // The cached community view was invalidated by the votes.
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/communities/{}/posts?sort=top", community_id))
        .to_request();
    let page = json_body(test::call_service(&app, req).await).await;
    assert_eq!(page["items"][0]["upvotes"], 0);
    assert_eq!(page["items"][0]["downvotes"], 1);
    assert_eq!(page["sort"], "top");
    assert_eq!(page["degraded"], false);

    let req = test::TestRequest::post()
        .uri("/api/v1/votes")
        .set_json(json!({ "target_id": post_id, "target_kind": "post", "direction": 1 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp).await["code"], "authentication_required");
}

#[actix_web::test]
async fn test_comment_tree_nesting_and_order() {
    let state = state().await;
    let app = app!(state);
    let moderator = Uuid::new_v4();
    let user = Uuid::new_v4();

    let req = as_moderator(test::TestRequest::post().uri("/api/v1/communities"), moderator)
        .set_json(json!({ "name": "threads" }))
        .to_request();
    let community_id = json_body(test::call_service(&app, req).await).await["id"]
        .as_str()
        .unwrap()
        .to_string();
    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/v1/communities/{}/posts", community_id)),
        user,
    )
    .set_json(json!({ "title": "thread", "body": "" }))
    .to_request();
    let post_id = json_body(test::call_service(&app, req).await).await["id"]
        .as_str()
        .unwrap()
        .to_string();

    let comment = |body: &'static str, parent: Option<String>| {
        as_user(
            test::TestRequest::post().uri(&format!("/api/v1/posts/{}/comments", post_id)),
            user,
        )
        .set_json(json!({ "body": body, "parent_comment_id": parent }))
        .to_request()
    };

    let resp = test::call_service(&app, comment("c1", None)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let c1 = json_body(resp).await["id"].as_str().unwrap().to_string();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    test::call_service(&app, comment("c2", Some(c1.clone()))).await;
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    test::call_service(&app, comment("c3", None)).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{}/comments", post_id))
        .to_request();
    let body = json_body(test::call_service(&app, req).await).await;
    let roots = body["comments"].as_array().unwrap();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0]["body"], "c3");
    assert_eq!(roots[1]["body"], "c1");
    assert_eq!(roots[1]["replies"][0]["body"], "c2");
    assert_eq!(roots[0]["replies"].as_array().unwrap().len(), 0);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{}", post_id))
        .to_request();
    let post = json_body(test::call_service(&app, req).await).await;
    assert_eq!(post["comment_count"], 3);
}

#[actix_web::test]
async fn test_report_resolution_is_single_shot() {
    let state = state().await;
    let app = app!(state);
    let moderator = Uuid::new_v4();
    let author = Uuid::new_v4();

    let req = as_moderator(test::TestRequest::post().uri("/api/v1/communities"), moderator)
        .set_json(json!({ "name": "reports" }))
        .to_request();
    let community_id = json_body(test::call_service(&app, req).await).await["id"]
        .as_str()
        .unwrap()
        .to_string();
    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/v1/communities/{}/posts", community_id)),
        author,
    )
    .set_json(json!({ "title": "spam", "body": "buy now" }))
    .to_request();
    let post_id = json_body(test::call_service(&app, req).await).await["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Warm the community view before the moderation action.
    let feed_uri = format!("/api/v1/communities/{}/posts", community_id);
    let req = test::TestRequest::get().uri(&feed_uri).to_request();
    assert_eq!(json_body(test::call_service(&app, req).await).await["total"], 1);

    let req = test::TestRequest::post()
        .uri("/api/v1/reports")
        .set_json(json!({
            "target_id": post_id,
            "target_kind": "post",
            "reason": "spam",
            "reporter_token": "anon-token-1234",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let report_id = json_body(resp).await["id"].as_str().unwrap().to_string();

    let req = as_user(
        test::TestRequest::get().uri("/api/v1/moderation/reports?status=pending"),
        author,
    )
    .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = as_moderator(
        test::TestRequest::get().uri("/api/v1/moderation/reports?status=pending"),
        moderator,
    )
    .to_request();
    let pending = json_body(test::call_service(&app, req).await).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let resolve = || {
        as_moderator(
            test::TestRequest::post()
                .uri(&format!("/api/v1/moderation/reports/{}/resolve", report_id)),
            moderator,
        )
        .set_json(json!({ "action": "delete" }))
        .to_request()
    };
    let resp = test::call_service(&app, resolve()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resolution = json_body(resp).await;
    assert_eq!(resolution["report"]["status"], "resolved");
    assert_eq!(resolution["target_deleted"], true);

    let resp = test::call_service(&app, resolve()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body = json_body(resp).await;
    assert_eq!(body["code"], "already_resolved");
    assert_eq!(body["retryable"], true);

    let req = test::TestRequest::get().uri(&feed_uri).to_request();
    let page = json_body(test::call_service(&app, req).await).await;
    assert_eq!(page["total"], 0);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{}", post_id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_following_and_saved_feeds() {
    let state = state().await;
    let app = app!(state);
    let moderator = Uuid::new_v4();
    let reader = Uuid::new_v4();
    let writer = Uuid::new_v4();

    let req = as_moderator(test::TestRequest::post().uri("/api/v1/communities"), moderator)
        .set_json(json!({ "name": "social" }))
        .to_request();
    let community_id = json_body(test::call_service(&app, req).await).await["id"]
        .as_str()
        .unwrap()
        .to_string();
    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/v1/communities/{}/posts", community_id)),
        writer,
    )
    .set_json(json!({ "title": "hello", "body": "" }))
    .to_request();
    let post_id = json_body(test::call_service(&app, req).await).await["id"]
        .as_str()
        .unwrap()
        .to_string();

    let req = as_user(test::TestRequest::get().uri("/api/v1/feed/following"), reader).to_request();
    let page = json_body(test::call_service(&app, req).await).await;
    assert_eq!(page["items"].as_array().unwrap().len(), 0);

    for _ in 0..2 {
        let req = as_user(
            test::TestRequest::post().uri(&format!("/api/v1/users/{}/follow", writer)),
            reader,
        )
        .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
    let req = as_user(test::TestRequest::get().uri("/api/v1/feed/following"), reader).to_request();
    let page = json_body(test::call_service(&app, req).await).await;
    assert_eq!(page["items"][0]["title"], "hello");
    assert_eq!(page["sort"], "new");

    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/v1/posts/{}/save", post_id)),
        reader,
    )
    .to_request();
    let body = json_body(test::call_service(&app, req).await).await;
    assert_eq!(body["changed"], true);

    let req = as_user(test::TestRequest::get().uri("/api/v1/feed/saved"), reader).to_request();
    let page = json_body(test::call_service(&app, req).await).await;
    assert_eq!(page["items"][0]["id"], post_id.as_str());
    assert!(page["items"][0]["saved_at"].is_string());

    let req = test::TestRequest::get().uri("/api/v1/feed/saved").to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn test_unknown_community_and_bad_identity() {
    let state = state().await;
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/communities/{}/posts", Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["code"], "not_found");

    let req = test::TestRequest::get()
        .uri("/api/v1/feed/following")
        .insert_header((USER_ID_HEADER, "nobody"))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[actix_web::test]
async fn test_queue_and_flags_over_http() {
    let state = state().await;
    let app = app!(state);
    let moderator = Uuid::new_v4();
    let author = Uuid::new_v4();

    let req = as_moderator(test::TestRequest::post().uri("/api/v1/communities"), moderator)
        .set_json(json!({ "name": "gated", "require_post_approval": true }))
        .to_request();
    let community_id = json_body(test::call_service(&app, req).await).await["id"]
        .as_str()
        .unwrap()
        .to_string();
    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/v1/communities/{}/posts", community_id)),
        author,
    )
    .set_json(json!({ "title": "awaiting", "body": "" }))
    .to_request();
    let post = json_body(test::call_service(&app, req).await).await;
    assert_eq!(post["approved"], false);

    let feed_uri = format!("/api/v1/communities/{}/posts", community_id);
    let req = test::TestRequest::get().uri(&feed_uri).to_request();
    assert_eq!(json_body(test::call_service(&app, req).await).await["total"], 0);

    let req = as_moderator(
        test::TestRequest::get().uri("/api/v1/moderation/queue?status=pending"),
        moderator,
    )
    .to_request();
    let queue = json_body(test::call_service(&app, req).await).await;
    assert_eq!(queue[0]["flagged_by"], "community_policy");
    let item_id = queue[0]["id"].as_str().unwrap().to_string();

    let review = || {
        as_moderator(
            test::TestRequest::post()
                .uri(&format!("/api/v1/moderation/queue/{}/review", item_id)),
            moderator,
        )
        .set_json(json!({ "decision": "approve" }))
        .to_request()
    };
    assert_eq!(test::call_service(&app, review()).await.status(), StatusCode::OK);
    let resp = test::call_service(&app, review()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(resp).await["code"], "already_reviewed");

    let req = test::TestRequest::get().uri(&feed_uri).to_request();
    assert_eq!(json_body(test::call_service(&app, req).await).await["total"], 1);

    let post_id = post["id"].as_str().unwrap();
    let req = as_moderator(
        test::TestRequest::post().uri(&format!("/api/v1/moderation/posts/{}/flags", post_id)),
        moderator,
    )
    .set_json(json!({ "flag": "locked" }))
    .to_request();
    let flagged = json_body(test::call_service(&app, req).await).await;
    assert_eq!(flagged["locked"], true);

    let req = as_user(
        test::TestRequest::post().uri(&format!("/api/v1/posts/{}/comments", post_id)),
        author,
    )
    .set_json(json!({ "body": "too late" }))
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(resp).await["code"], "post_locked");
}

#[actix_web::test]
async fn test_health_and_readiness() {
    let state = state().await;
    let app = app!(state);

    for uri in ["/health", "/ready", "/metrics"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK, "{}", uri);
    }

    state.propagator.stop().await;
    let req = test::TestRequest::get().uri("/ready").to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}
