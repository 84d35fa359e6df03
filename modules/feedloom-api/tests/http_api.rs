use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use feedloom_api::{router, AppState};
use feedloom_archive::services::BilibiliNormalizer;
use feedloom_archive::{Crawler, FilterChain, PageBudget, PageSource, RawPage, Store};
use feedloom_common::{Config, DelayWindow, Platform};
use feedloom_render::FeedRenderer;
use feedloom_scout::{FeedPublication, Ingestor, Scheduler, Timing};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

/// Holds the first request open until released.
struct GatedFeed {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl PageSource for GatedFeed {
    fn platform(&self) -> Platform {
        Platform::Bilibili
    }

    async fn fetch_page(&self, _cursor: Option<&str>) -> feedloom_archive::Result<RawPage> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(RawPage::default())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    state: Arc<AppState>,
}

impl Harness {
    fn new(crawlers: Vec<Crawler>, alt_mirror: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_lookup(|_| None);
        let publication = Arc::new(FeedPublication::new(
            Arc::new(Store::new(dir.path(), config.store_max_items)),
            FeedRenderer::new(config.feed.clone()),
            None,
            true,
        ));
        let mirror = alt_mirror.then(|| FilterChain::default().only_types(&["DYNAMIC_TYPE_AV"]));
        let scheduler = Arc::new(Scheduler::new(
            crawlers,
            Ingestor::new(publication, mirror),
            Timing {
                startup_delay: Duration::from_secs(10),
                interval: Duration::from_secs(1800),
            },
        ));
        Self {
            _dir: dir,
            state: Arc::new(AppState::new(config, scheduler)),
        }
    }

    fn app(&self) -> Router {
        router(self.state.clone())
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn pushed_item(id: &str, kind: &str, t: i64) -> Value {
    json!({
        "id": id,
        "type": kind,
        "author": "up",
        "title": format!("post {id}"),
        "content": "hello",
        "link": format!("https://www.bilibili.com/opus/{id}"),
        "images": [],
        "publishTime": t,
        "stats": { "like": 1 }
    })
}

#[tokio::test]
async fn health_check() {
    let harness = Harness::new(Vec::new(), false);
    let (status, body) = send(harness.app(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn push_merges_and_reports_counts() {
    let harness = Harness::new(Vec::new(), true);
    let batch = json!({
        "platform": "bilibili",
        "items": [
            pushed_item("2", "DYNAMIC_TYPE_AV", 2_000),
            pushed_item("1", "DYNAMIC_TYPE_WORD", 1_000),
        ]
    });

    let (status, body) = send_json(harness.app(), post_json("/api/feed", batch.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["newCount"], 2);
    assert_eq!(body["totalCount"], 2);
    assert_eq!(body["sync"]["status"], "skipped");
    assert_eq!(body["mirrored"]["newCount"], 1);

    let (_, again) = send_json(harness.app(), post_json("/api/feed", batch)).await;
    assert_eq!(again["newCount"], 0);
    assert_eq!(again["totalCount"], 2);

    let (status, data) = send_json(harness.app(), get("/api/data/bilibili-alt")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["code"], 0);
    assert_eq!(data["total"], 1);
    assert_eq!(data["data"][0]["id"], "2");
    assert_eq!(data["data"][0]["platform"], "bilibili-alt");
}

#[tokio::test]
async fn malformed_pushes_are_rejected() {
    let harness = Harness::new(Vec::new(), false);

    let (status, body) = send_json(
        harness.app(),
        post_json("/api/feed", json!({ "platform": "myspace", "items": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("myspace"));

    let (status, _) = send_json(
        harness.app(),
        post_json("/api/feed", json!({ "platform": "zhihu", "items": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::post("/api/feed")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send_json(harness.app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn rss_endpoint_serves_rendered_feed() {
    let harness = Harness::new(Vec::new(), false);
    let batch = json!({
        "platform": "zhihu",
        "items": [pushed_item("zhihu_1", "answer", 1_700_000_000_000)]
    });
    send_json(harness.app(), post_json("/api/feed", batch)).await;

    let response = harness.app().oneshot(get("/api/feed/zhihu")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/rss+xml; charset=utf-8"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let feed = feed_rs::parser::parse(&bytes[..]).unwrap();
    assert_eq!(feed.entries.len(), 1);
    assert_eq!(feed.entries[0].id, "zhihu_1");

    let (status, _) = send_json(harness.app(), get("/api/feed/myspace")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_reports_counts_and_flags() {
    let harness = Harness::new(Vec::new(), false);
    let (status, body) = send_json(harness.app(), get("/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["publisher"], false);
    assert_eq!(body["fetchIntervalMinutes"], 30);
    assert_eq!(body["cycleRunning"], false);
    assert_eq!(body["platforms"]["douban"]["credential"], false);
    assert_eq!(body["platforms"]["douban"]["count"], 0);
    assert!(body["lastCycle"].is_null());
}

#[tokio::test]
async fn sync_without_publisher_reports_skips() {
    let harness = Harness::new(Vec::new(), false);
    let batch = json!({
        "platform": "douban",
        "items": [pushed_item("douban_1", "status", 1_000)]
    });
    send_json(harness.app(), post_json("/api/feed", batch)).await;

    let (status, body) = send_json(harness.app(), post_json("/api/sync", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"]["douban"]["status"], "skipped");
    assert_eq!(body["results"]["douban"]["reason"], "no_publisher");
}

#[tokio::test]
async fn fetch_conflicts_while_a_cycle_runs() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let crawler = Crawler::new(
        Box::new(GatedFeed {
            entered: entered.clone(),
            release: release.clone(),
        }),
        Box::new(BilibiliNormalizer::new(Platform::Bilibili)),
        FilterChain::default(),
        PageBudget {
            max_pages: 1,
            extra_pages: 0,
        },
        DelayWindow::NONE,
    );
    let harness = Harness::new(vec![crawler], false);

    let first = tokio::spawn(send_json(harness.app(), post_json("/api/fetch", json!({}))));
    entered.notified().await;

    let (status, body) = send_json(harness.app(), post_json("/api/fetch", json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already running"));

    release.notify_one();
    let (status, report) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["platforms"][0]["platform"], "bilibili");
    assert_eq!(report["platforms"][0]["stop"], "empty");
}
