//! Cross-process change feed over Redis Pub/Sub
//!
//! Each subscription owns its own pub/sub connection. When that connection
//! drops the listener delivers a resync, resubscribes with exponential
//! backoff, and delivers a second resync once it is back, since anything
//! published in between was lost.

use crate::{
    deliver, ChangeEvent, ChangeFeed, ChangeFeedError, ChangeFilter, ChangeHandler, FeedStats,
    Result, StatsCollector, Subscription,
};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Raw message payloads from one pub/sub connection
type PayloadStream = BoxStream<'static, RedisResult<String>>;

/// Delay schedule between resubscribe attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

/// Change feed shared by every replica of a service
#[derive(Clone)]
pub struct RedisChangeFeed {
    client: Client,
    connection: ConnectionManager,
    channel: String,
    reconnect: ReconnectPolicy,
    stats: StatsCollector,
}

impl RedisChangeFeed {
    /// Default Redis channel for table change events
    pub const DEFAULT_CHANNEL: &'static str = "forum:changes";

    /// Connect to Redis
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use change_feed::RedisChangeFeed;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), change_feed::ChangeFeedError> {
    /// let feed = RedisChangeFeed::new("redis://localhost:6379").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::with_channel(redis_url, Self::DEFAULT_CHANNEL.to_string()).await
    }

    pub async fn with_channel(redis_url: &str, channel: String) -> Result<Self> {
        if channel.trim().is_empty() {
            return Err(ChangeFeedError::Configuration(
                "change feed channel must not be empty".to_string(),
            ));
        }

        let client = Client::open(redis_url)?;
        let connection = ConnectionManager::new(client.clone()).await?;

        Ok(Self {
            client,
            connection,
            channel,
            reconnect: ReconnectPolicy::default(),
            stats: StatsCollector::new(),
        })
    }

    pub fn with_reconnect_policy(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn connector(&self) -> impl FnMut() -> BoxFuture<'static, Result<PayloadStream>> + Send {
        let client = self.client.clone();
        let channel = self.channel.clone();
        move || {
            let client = client.clone();
            let channel = channel.clone();
            async move {
                let mut pubsub = client.get_async_pubsub().await?;
                pubsub.subscribe(&channel).await?;
                let messages: PayloadStream = pubsub
                    .into_on_message()
                    .map(|msg| msg.get_payload::<String>())
                    .boxed();
                Ok::<_, ChangeFeedError>(messages)
            }
            .boxed()
        }
    }
}

#[async_trait]
impl ChangeFeed for RedisChangeFeed {
    async fn publish(&self, event: ChangeEvent) -> Result<usize> {
        let payload = serde_json::to_string(&event)?;

        debug!(
            event_id = %event.event_id,
            table = %event.table,
            operation = ?event.operation,
            channel = %self.channel,
            "Publishing change event"
        );

        let mut conn = self.connection.clone();
        let subscribers: usize = conn.publish(&self.channel, payload).await?;
        self.stats.record_publish();

        Ok(subscribers)
    }

    async fn subscribe(
        &self,
        filter: ChangeFilter,
        handler: ChangeHandler,
    ) -> Result<Subscription> {
        let mut connect = self.connector();
        // The first attempt fails fast so startup surfaces a dead Redis.
        let messages = connect().await?;

        info!(
            channel = %self.channel,
            table = %filter.table,
            column = ?filter.column,
            "Subscribed to change feed"
        );

        let handle = tokio::spawn(run_subscription(
            messages,
            connect,
            Listener {
                filter: filter.clone(),
                handler,
                stats: self.stats.clone(),
                source: self.channel.clone(),
            },
            self.reconnect,
        ));

        Ok(Subscription::new(filter, handle))
    }

    fn stats(&self) -> FeedStats {
        self.stats.snapshot()
    }
}

struct Listener {
    filter: ChangeFilter,
    handler: ChangeHandler,
    stats: StatsCollector,
    source: String,
}

impl Listener {
    fn resync(&self) {
        let event = ChangeEvent::resync(self.filter.table.clone(), &self.source);
        deliver(&self.filter, &self.handler, &self.stats, event);
    }

    /// Deliver every decodable message until the connection ends
    async fn drain(&self, messages: &mut PayloadStream) {
        while let Some(payload) = messages.next().await {
            let payload = match payload {
                Ok(p) => p,
                Err(e) => {
                    error!(error = ?e, "Failed to get change event payload");
                    continue;
                }
            };

            let event: ChangeEvent = match serde_json::from_str(&payload) {
                Ok(event) => event,
                Err(e) => {
                    error!(error = ?e, payload = %payload, "Failed to deserialize change event");
                    continue;
                }
            };

            deliver(&self.filter, &self.handler, &self.stats, event);
        }
    }
}

/// Runs until the owning [`Subscription`] aborts it.
async fn run_subscription<C>(
    mut messages: PayloadStream,
    mut connect: C,
    listener: Listener,
    policy: ReconnectPolicy,
) where
    C: FnMut() -> BoxFuture<'static, Result<PayloadStream>> + Send,
{
    loop {
        listener.drain(&mut messages).await;
        warn!(table = %listener.filter.table, "Change subscription dropped, resyncing");
        listener.resync();

        let mut delay = policy.initial_delay;
        messages = loop {
            match connect().await {
                Ok(messages) => break messages,
                Err(e) => {
                    warn!(
                        error = %e,
                        table = %listener.filter.table,
                        retry_in_ms = delay.as_millis() as u64,
                        "Change feed resubscribe failed"
                    );
                    tokio::time::sleep(delay).await;
                    delay = policy.next_delay(delay);
                }
            }
        };

        listener.stats.record_resubscribe();
        info!(table = %listener.filter.table, "Change subscription restored");
        listener.resync();
    }
}
