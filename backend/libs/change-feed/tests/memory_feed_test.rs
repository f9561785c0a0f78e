use change_feed::{
    ChangeEvent, ChangeFeed, ChangeFeedError, ChangeFilter, ChangeOperation, MemoryChangeFeed,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

async fn recv(rx: &mut mpsc::UnboundedReceiver<ChangeEvent>) -> Option<ChangeEvent> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn publish_without_subscribers_reaches_nobody() {
    let feed = MemoryChangeFeed::new("test");
    let reached = feed
        .publish(ChangeEvent::insert("votes", "1", json!({}), "test"))
        .await
        .unwrap();
    assert_eq!(reached, 0);
    assert_eq!(feed.stats().events_published, 1);
}

#[tokio::test]
async fn subscriber_receives_only_matching_events() {
    let feed = MemoryChangeFeed::new("test");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let subscription = feed
        .subscribe(
            ChangeFilter::table("comments").where_eq("post_id", "p1"),
            Arc::new(move |event: ChangeEvent| -> change_feed::Result<()> {
                tx.send(event)
                    .map_err(|e| ChangeFeedError::Handler(e.to_string()))
            }),
        )
        .await
        .unwrap();

    feed.publish(ChangeEvent::insert("comments", "c1", json!({ "post_id": "p2" }), "test"))
        .await
        .unwrap();
    feed.publish(ChangeEvent::insert("votes", "v1", json!({ "post_id": "p1" }), "test"))
        .await
        .unwrap();
    feed.publish(ChangeEvent::insert("comments", "c2", json!({ "post_id": "p1" }), "test"))
        .await
        .unwrap();

    let event = recv(&mut rx).await.expect("matching event delivered");
    assert_eq!(event.row_id.as_deref(), Some("c2"));
    assert_eq!(event.operation, ChangeOperation::Insert);

    subscription.unsubscribe();
}

#[tokio::test]
async fn handler_errors_are_counted_not_fatal() {
    let feed = MemoryChangeFeed::new("test");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let _subscription = feed
        .subscribe(
            ChangeFilter::table("posts"),
            Arc::new(move |event: ChangeEvent| -> change_feed::Result<()> {
                if event.row_id.as_deref() == Some("bad") {
                    return Err(ChangeFeedError::Handler("rejected".into()));
                }
                tx.send(event)
                    .map_err(|e| ChangeFeedError::Handler(e.to_string()))
            }),
        )
        .await
        .unwrap();

    feed.publish(ChangeEvent::update("posts", "bad", json!({}), "test"))
        .await
        .unwrap();
    feed.publish(ChangeEvent::update("posts", "good", json!({}), "test"))
        .await
        .unwrap();

    let event = recv(&mut rx).await.expect("subscription survives handler error");
    assert_eq!(event.row_id.as_deref(), Some("good"));
    assert_eq!(feed.stats().handler_errors, 1);
}

#[tokio::test]
async fn lagging_subscriber_gets_resync() {
    let feed = MemoryChangeFeed::with_capacity("test", 2);
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Publish before the listener task gets a chance to run so it lags.
    let _subscription = feed
        .subscribe(
            ChangeFilter::table("votes"),
            Arc::new(move |event: ChangeEvent| -> change_feed::Result<()> {
                tx.send(event)
                    .map_err(|e| ChangeFeedError::Handler(e.to_string()))
            }),
        )
        .await
        .unwrap();

    for i in 0..5 {
        feed.publish(ChangeEvent::insert("votes", i.to_string(), json!({}), "test"))
            .await
            .unwrap();
    }

    let mut saw_resync = false;
    while let Some(event) = recv(&mut rx).await {
        if event.operation == ChangeOperation::Resync {
            saw_resync = true;
            break;
        }
    }
    assert!(saw_resync);
    assert!(feed.stats().lagged_events > 0);
}
