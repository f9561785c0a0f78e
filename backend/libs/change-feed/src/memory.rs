//! In-process change feed over a tokio broadcast channel

use crate::{
    deliver, ChangeEvent, ChangeFeed, ChangeFilter, ChangeHandler, FeedStats, Result,
    StatsCollector, Subscription,
};
use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Change feed for a single process (tests, `STORAGE_BACKEND=memory`)
#[derive(Clone)]
pub struct MemoryChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
    service_name: String,
    stats: StatsCollector,
}

impl MemoryChangeFeed {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(service_name: impl Into<String>) -> Self {
        Self::with_capacity(service_name, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(service_name: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            service_name: service_name.into(),
            stats: StatsCollector::new(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

#[async_trait]
impl ChangeFeed for MemoryChangeFeed {
    async fn publish(&self, event: ChangeEvent) -> Result<usize> {
        debug!(
            event_id = %event.event_id,
            table = %event.table,
            operation = ?event.operation,
            "Publishing change event"
        );
        self.stats.record_publish();

        // No receivers is not an error: nobody is caching that view yet.
        Ok(self.sender.send(event).unwrap_or(0))
    }

    async fn subscribe(
        &self,
        filter: ChangeFilter,
        handler: ChangeHandler,
    ) -> Result<Subscription> {
        let mut receiver = self.sender.subscribe();
        let stats = self.stats.clone();
        let service_name = self.service_name.clone();
        let task_filter = filter.clone();

        info!(table = %filter.table, column = ?filter.column, "Subscribed to change feed");

        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => deliver(&task_filter, &handler, &stats, event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            table = %task_filter.table,
                            skipped,
                            "Change subscriber lagged, forcing resync"
                        );
                        stats.record_lagged(skipped);
                        let resync = ChangeEvent::resync(task_filter.table.clone(), &service_name);
                        deliver(&task_filter, &handler, &stats, resync);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            warn!(table = %task_filter.table, "Change subscription ended");
        });

        Ok(Subscription::new(filter, handle))
    }

    fn stats(&self) -> FeedStats {
        self.stats.snapshot()
    }
}
