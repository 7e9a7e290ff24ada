use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use translation_hub::config::Config;
use translation_hub::db::Database;
use translation_hub::queue::Queue;
use translation_hub::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_hub=info".parse()?),
        )
        .init();

    info!("Starting translation hub server");

    let config = Config::from_env()?;
    let db = Database::new(&config.database_path)?;
    let queue = Queue::open(&config.queue_path)?;

    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        db,
        queue,
        client: reqwest::Client::new(),
    };
    let app = server::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind server address")?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
