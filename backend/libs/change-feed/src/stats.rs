//! Delivery counters for change feed subscriptions

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time view of feed delivery counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    pub events_published: u64,
    pub events_delivered: u64,
    pub events_filtered: u64,
    pub handler_errors: u64,
    pub lagged_events: u64,
    pub resubscribes: u64,
}

/// Thread-safe counter set shared between a feed and its subscriptions
#[derive(Clone, Default)]
pub struct StatsCollector {
    published: Arc<AtomicU64>,
    delivered: Arc<AtomicU64>,
    filtered: Arc<AtomicU64>,
    handler_errors: Arc<AtomicU64>,
    lagged: Arc<AtomicU64>,
    resubscribes: Arc<AtomicU64>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publish(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record events a slow subscriber skipped
    pub fn record_lagged(&self, skipped: u64) {
        self.lagged.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn record_resubscribe(&self) {
        self.resubscribes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FeedStats {
        FeedStats {
            events_published: self.published.load(Ordering::Relaxed),
            events_delivered: self.delivered.load(Ordering::Relaxed),
            events_filtered: self.filtered.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            lagged_events: self.lagged.load(Ordering::Relaxed),
            resubscribes: self.resubscribes.load(Ordering::Relaxed),
        }
    }
}
