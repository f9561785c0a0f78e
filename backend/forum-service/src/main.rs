use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use change_feed::{ChangeFeed, MemoryChangeFeed, RedisChangeFeed};
use forum_service::config::{ChangeFeedBackend, StorageBackend};
use forum_service::repository::{ForumStore, MemoryForumStore, PgForumStore};
use forum_service::{handlers, AppState, Config, SERVICE_NAME};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,forum_service=debug".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn build_store(config: &Config) -> Result<Arc<dyn ForumStore>> {
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(MemoryForumStore::new()))
        }
        StorageBackend::Postgres => {
            let db = config
                .database
                .as_ref()
                .context("database configuration missing for postgres storage")?;
            let pool = PgPoolOptions::new()
                .max_connections(db.max_connections)
                .min_connections(db.min_connections)
                .acquire_timeout(Duration::from_secs(db.acquire_timeout_secs))
                .connect(&db.url)
                .await
                .context("Failed to connect to PostgreSQL")?;

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!(
                max_connections = db.max_connections,
                "PostgreSQL pool ready, migrations applied"
            );
            Ok(Arc::new(PgForumStore::new(pool)))
        }
    }
}

async fn build_change_feed(config: &Config) -> Result<Arc<dyn ChangeFeed>> {
    match config.change_feed.backend {
        ChangeFeedBackend::Memory => Ok(Arc::new(MemoryChangeFeed::new(SERVICE_NAME))),
        ChangeFeedBackend::Redis => {
            let url = config
                .change_feed
                .redis_url
                .as_deref()
                .context("REDIS_URL is required for the redis change feed")?;
            let feed = RedisChangeFeed::with_channel(url, config.change_feed.channel.clone())
                .await
                .context("Failed to connect change feed to Redis")?;
            tracing::info!(channel = %feed.channel(), "Redis change feed connected");
            Ok(Arc::new(feed))
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Starting {} v{}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    let store = build_store(&config).await?;
    let feed = build_change_feed(&config).await?;

    let state = web::Data::new(AppState::new(store, feed, &config.ranking));
    state
        .propagator
        .start()
        .await
        .context("Failed to start change propagation")?;

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("HTTP server listening on {}", bind_address);

    let server_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(server_state.clone())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await
    .context("HTTP server failed")?;

    state.propagator.stop().await;
    tracing::info!("{} stopped", SERVICE_NAME);
    Ok(())
}
