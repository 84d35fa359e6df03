use std::sync::Arc;

use anyhow::{Context, Result};
use feedloom_api::{router, AppState};
use feedloom_archive::Store;
use feedloom_common::Config;
use feedloom_render::FeedRenderer;
use feedloom_scout::{build_publisher, FeedPublication, Ingestor, Scheduler};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("feedloom=info".parse()?))
        .init();

    let config = Config::from_env();

    let store = Arc::new(Store::new(&config.data_dir, config.store_max_items));
    let publisher = match build_publisher(&config.publish) {
        Ok(publisher) => publisher,
        Err(e) => {
            warn!(error = %e, "Publisher unavailable, feeds will only be served locally");
            None
        }
    };
    let publication = Arc::new(FeedPublication::new(
        store,
        FeedRenderer::new(config.feed.clone()),
        publisher,
        config.auto_sync,
    ));
    let ingestor = Ingestor::from_config(&config, publication);
    let scheduler = Arc::new(
        Scheduler::from_config(&config, ingestor).context("Failed to set up crawlers")?,
    );
    scheduler.start();

    let addr = format!("0.0.0.0:{}", config.port);
    let data_dir = config.data_dir.display().to_string();
    let state = Arc::new(AppState::new(config, scheduler));
    let app = router(state);

    info!(data_dir = data_dir.as_str(), "feedloom starting on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
