pub mod rest;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use feedloom_archive::Store;
use feedloom_common::Config;
use feedloom_scout::{FeedPublication, Ingestor, Scheduler};

pub struct AppState {
    pub config: Config,
    pub scheduler: Arc<Scheduler>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, scheduler: Arc<Scheduler>) -> Self {
        Self {
            config,
            scheduler,
            started_at: Instant::now(),
        }
    }

    pub fn ingestor(&self) -> &Ingestor {
        self.scheduler.ingestor()
    }

    pub fn publication(&self) -> &Arc<FeedPublication> {
        self.ingestor().publication()
    }

    pub fn store(&self) -> &Arc<Store> {
        self.publication().store()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(rest::health))
        .route("/api/feed", post(rest::feed::api_push))
        .route("/api/feed/{platform}", get(rest::api_rss))
        .route("/api/data/{platform}", get(rest::api_data))
        .route("/api/status", get(rest::api_status))
        .route("/api/fetch", post(rest::api_fetch))
        .route("/api/sync", post(rest::api_sync))
        .with_state(state)
        // Browser extensions push from arbitrary origins.
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}
