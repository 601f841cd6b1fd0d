// src/main.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gear_lists::{
    create_app,
    mailer::LogMailer,
    store::{MemoryStore, PgStore, Store},
    AppState, Config,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("invalid configuration");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(db_url)
                .await
                .expect("Failed to connect to Postgres");
            let store = PgStore::new(pool);
            store.migrate().await.expect("Failed to run migrations");
            tracing::info!("✅ 数据库连接成功!");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    spawn_purge_task(store.clone(), Duration::from_secs(config.purge_interval_secs.max(1)));

    let addr = config.bind_addr;
    let state = AppState::new(store, Arc::new(LogMailer), config);
    let app = create_app(state);

    tracing::info!("🚀 服务器运行在: {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

// 定期清理过期的会话、匿名会话和重置令牌
fn spawn_purge_task(store: Arc<dyn Store>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.purge_expired(Utc::now()).await {
                Ok(report) => tracing::info!(
                    sessions = report.sessions,
                    anonymous_sessions = report.anonymous_sessions,
                    reset_tokens = report.reset_tokens,
                    "purged expired credentials"
                ),
                Err(e) => tracing::error!("purge failed: {}", e),
            }
        }
    });
}
