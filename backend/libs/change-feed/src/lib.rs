//! Realtime change feed for relational tables
//!
//! Services publish a [`ChangeEvent`] after every committed mutation; readers
//! register a [`ChangeFilter`] plus a single handler and get called for every
//! matching event.
//!
//! # Architecture
//!
//! ```text
//! forum-service (writer):
//!   1. COMMIT vote / report resolution / new comment
//!   2. publish {"table": "votes", "operation": "Insert", "row": {"target_id": ...}}
//!      ↓
//! MemoryChangeFeed (tokio broadcast)  or  RedisChangeFeed (PUBLISH forum:changes)
//!      ↓
//! Subscribers (view cache, admin console):
//!   3. filter by table and optional column predicate
//!   4. invoke handler → evict cached snapshot
//! ```
//!
//! # Example
//!
//! ```no_run
//! use change_feed::{ChangeEvent, ChangeFeed, ChangeFilter, MemoryChangeFeed};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), change_feed::ChangeFeedError> {
//! let feed = MemoryChangeFeed::new("forum-service");
//!
//! let subscription = feed
//!     .subscribe(
//!         ChangeFilter::table("comments").where_eq("post_id", "42"),
//!         Arc::new(|event: ChangeEvent| -> change_feed::Result<()> {
//!             println!("comment changed: {:?}", event.row_id);
//!             Ok(())
//!         }),
//!     )
//!     .await?;
//!
//! feed.publish(ChangeEvent::insert(
//!     "comments",
//!     "7",
//!     serde_json::json!({ "post_id": "42" }),
//!     "forum-service",
//! ))
//! .await?;
//!
//! subscription.unsubscribe();
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

mod error;
mod memory;
mod pubsub;
mod stats;

pub use error::ChangeFeedError;
pub use memory::MemoryChangeFeed;
pub use pubsub::{ReconnectPolicy, RedisChangeFeed};
pub use stats::{FeedStats, StatsCollector};

pub type Result<T> = std::result::Result<T, ChangeFeedError>;

/// Row-level operation carried by a change event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
    /// The subscriber missed events and must treat the whole table as changed
    Resync,
}

/// A single committed change on a named table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event_id: String,
    pub table: String,
    pub operation: ChangeOperation,
    pub row_id: Option<String>,
    /// Column values of the affected row, as a JSON object
    pub row: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source_service: String,
}

impl ChangeEvent {
    fn new(
        table: impl Into<String>,
        operation: ChangeOperation,
        row_id: Option<String>,
        row: serde_json::Value,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            table: table.into(),
            operation,
            row_id,
            row,
            timestamp: chrono::Utc::now(),
            source_service: source_service.into(),
        }
    }

    pub fn insert(
        table: impl Into<String>,
        row_id: impl Into<String>,
        row: serde_json::Value,
        source_service: impl Into<String>,
    ) -> Self {
        Self::new(
            table,
            ChangeOperation::Insert,
            Some(row_id.into()),
            row,
            source_service,
        )
    }

    pub fn update(
        table: impl Into<String>,
        row_id: impl Into<String>,
        row: serde_json::Value,
        source_service: impl Into<String>,
    ) -> Self {
        Self::new(
            table,
            ChangeOperation::Update,
            Some(row_id.into()),
            row,
            source_service,
        )
    }

    pub fn delete(
        table: impl Into<String>,
        row_id: impl Into<String>,
        row: serde_json::Value,
        source_service: impl Into<String>,
    ) -> Self {
        Self::new(
            table,
            ChangeOperation::Delete,
            Some(row_id.into()),
            row,
            source_service,
        )
    }

    pub fn resync(table: impl Into<String>, source_service: impl Into<String>) -> Self {
        Self::new(
            table,
            ChangeOperation::Resync,
            None,
            serde_json::Value::Null,
            source_service,
        )
    }

    /// Column value as a string, whether it was encoded as a JSON string or not
    pub fn column(&self, name: &str) -> Option<String> {
        match self.row.get(name)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Table name plus an optional `column = value` predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: String,
    pub column: Option<(String, String)>,
}

impl ChangeFilter {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: None,
        }
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.column = Some((column.into(), value.into()));
        self
    }

    /// Resync events match on table alone; the column predicate cannot be
    /// evaluated against a missing row.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        if event.operation == ChangeOperation::Resync {
            return true;
        }
        match &self.column {
            None => true,
            Some((column, expected)) => event.column(column).as_deref() == Some(expected.as_str()),
        }
    }
}

/// Handler invoked for every event passing the subscription's filter
pub type ChangeHandler = Arc<dyn Fn(ChangeEvent) -> Result<()> + Send + Sync>;

/// Live subscription; dropping it leaves the listener running, call
/// [`Subscription::unsubscribe`] to stop it.
pub struct Subscription {
    filter: ChangeFilter,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(filter: ChangeFilter, handle: JoinHandle<()>) -> Self {
        Self { filter, handle }
    }

    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

/// Publish/subscribe primitive over table changes
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Publish a committed change. Returns the number of listeners reached.
    async fn publish(&self, event: ChangeEvent) -> Result<usize>;

    /// Register a handler for events matching `filter`
    async fn subscribe(&self, filter: ChangeFilter, handler: ChangeHandler)
        -> Result<Subscription>;

    fn stats(&self) -> FeedStats;
}

/// Shared delivery path for every backend: filter, invoke, count.
pub(crate) fn deliver(
    filter: &ChangeFilter,
    handler: &ChangeHandler,
    stats: &StatsCollector,
    event: ChangeEvent,
) {
    if !filter.matches(&event) {
        stats.record_filtered();
        return;
    }

    let event_id = event.event_id.clone();
    match handler(event) {
        Ok(()) => stats.record_delivery(),
        Err(e) => {
            stats.record_handler_error();
            tracing::error!(error = %e, event_id = %event_id, "Change handler failed");
        }
    }
}
