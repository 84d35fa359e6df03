use std::sync::Mutex;

use async_trait::async_trait;
use feedloom_archive::services::BilibiliNormalizer;
use feedloom_archive::{
    ArchiveError, Crawler, FilterChain, PageBudget, PageSource, Paginator, RawPage, StopReason,
    Store,
};
use feedloom_common::{ActivityItem, DelayWindow, Platform};
use serde_json::{json, Value};

/// Serves scripted pages in order and records the cursors it was asked for.
struct FakeFeed {
    pages: Vec<RawPage>,
    cursors: Mutex<Vec<Option<String>>>,
}

impl FakeFeed {
    fn new(pages: Vec<RawPage>) -> Self {
        Self {
            pages,
            cursors: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PageSource for FakeFeed {
    fn platform(&self) -> Platform {
        Platform::Bilibili
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> feedloom_archive::Result<RawPage> {
        let mut cursors = self.cursors.lock().unwrap();
        cursors.push(cursor.map(str::to_string));
        self.pages
            .get(cursors.len() - 1)
            .cloned()
            .ok_or_else(|| ArchiveError::Malformed("no more scripted pages".into()))
    }
}

fn record(id: u64) -> Value {
    json!({
        "id_str": id.to_string(),
        "type": "DYNAMIC_TYPE_WORD",
        "modules": {
            "module_author": { "name": "up", "mid": 1, "pub_ts": 1_700_000_000u64 + id },
            "module_dynamic": { "desc": { "text": format!("post {id}") } }
        }
    })
}

fn page(ids: impl IntoIterator<Item = u64>, n: usize, has_more: bool) -> RawPage {
    RawPage {
        records: ids.into_iter().map(record).collect(),
        next_cursor: Some(format!("offset-{n}")),
        has_more,
    }
}

fn crawler(feed: FakeFeed, max_pages: u32, extra_pages: u32) -> Crawler {
    Crawler::new(
        Box::new(feed),
        Box::new(BilibiliNormalizer::new(Platform::Bilibili)),
        FilterChain::default(),
        PageBudget {
            max_pages,
            extra_pages,
        },
        DelayWindow::NONE,
    )
}

fn stored_item(id: u64) -> ActivityItem {
    let mut item = ActivityItem::new(Platform::Bilibili, id.to_string());
    item.publish_time_millis = (1_700_000_000 + id as i64) * 1000;
    item
}

#[tokio::test]
async fn fresh_platform_collects_every_page() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path(), 200);

    let feed = FakeFeed::new(vec![
        page(300..310, 1, true),
        page(200..210, 2, true),
        page(100..110, 3, false),
    ]);
    let crawler = crawler(feed, 5, 0);

    let outcome = crawler.crawl(&store.existing_ids(Platform::Bilibili)).await;
    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.stop, StopReason::Empty);
    assert_eq!(outcome.overlap_page, None);
    assert_eq!(outcome.items.len(), 30);

    let merged = store.merge(Platform::Bilibili, outcome.items).unwrap();
    assert_eq!(merged.new_count, 30);
    assert_eq!(store.load(Platform::Bilibili).len(), 30);
}

#[tokio::test]
async fn cursor_is_threaded_between_pages() {
    let feed = FakeFeed::new(vec![page(1..3, 1, true), page(3..5, 2, false)]);
    let normalizer = BilibiliNormalizer::new(Platform::Bilibili);
    let filters = FilterChain::default();
    let paginator = Paginator {
        source: &feed,
        normalizer: &normalizer,
        filters: &filters,
        budget: PageBudget {
            max_pages: 5,
            extra_pages: 0,
        },
        delay: DelayWindow::NONE,
    };
    paginator.run(&Default::default()).await;
    assert_eq!(
        *feed.cursors.lock().unwrap(),
        vec![None, Some("offset-1".to_string())]
    );
}

#[tokio::test]
async fn partial_duplicates_merge_only_new_items() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path(), 50);
    store
        .merge(Platform::Bilibili, (1..=50).map(stored_item).collect())
        .unwrap();

    // Seven ids already stored, three newer ones.
    let ids: Vec<u64> = (44..=50).chain(101..=103).collect();
    let feed = FakeFeed::new(vec![page(ids, 1, false)]);
    let outcome = crawler(feed, 5, 0)
        .crawl(&store.existing_ids(Platform::Bilibili))
        .await;
    assert_eq!(outcome.items.len(), 10);

    let merged = store.merge(Platform::Bilibili, outcome.items).unwrap();
    assert_eq!(merged.new_count, 3);
    assert_eq!(merged.total_count, 50);

    let stored = store.load(Platform::Bilibili);
    assert_eq!(stored.len(), 50);
    assert!(stored
        .windows(2)
        .all(|w| w[0].publish_time_millis >= w[1].publish_time_millis));
    assert_eq!(stored[0].id, "103");
    // The three oldest fell off the end.
    assert!(!stored.iter().any(|i| i.id == "1" || i.id == "2" || i.id == "3"));
}

#[tokio::test]
async fn overlap_on_third_page_fetches_extra_pages() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path(), 200);
    store
        .merge(Platform::Bilibili, (1..=8).map(stored_item).collect())
        .unwrap();

    let feed = FakeFeed::new(vec![
        page(500..510, 1, true),
        page(400..410, 2, true),
        // 8 of 10 already stored.
        page((1..=8).chain(300..302), 3, true),
        page(200..210, 4, true),
        page(100..110, 5, true),
        page(50..60, 6, true),
        page(40..50, 7, true),
    ]);
    let outcome = crawler(feed, 10, 2)
        .crawl(&store.existing_ids(Platform::Bilibili))
        .await;

    assert_eq!(outcome.overlap_page, Some(3));
    assert_eq!(outcome.pages, 5);
    assert_eq!(outcome.stop, StopReason::Budget);
    assert_eq!(outcome.items.len(), 50);
}

#[tokio::test]
async fn max_pages_wins_over_extra_pages() {
    let feed = FakeFeed::new(vec![
        page(1..3, 1, true),
        page(3..5, 2, true),
        page(5..7, 3, true),
    ]);
    let existing = ["1", "2"].iter().map(|s| s.to_string()).collect();
    let outcome = crawler(feed, 2, 5).crawl(&existing).await;
    assert_eq!(outcome.overlap_page, Some(1));
    assert_eq!(outcome.pages, 2);
    assert_eq!(outcome.stop, StopReason::MaxPages);
}
