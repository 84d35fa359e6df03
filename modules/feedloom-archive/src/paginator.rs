// Page-by-page crawl with overlap detection.
//
// Upstream feeds have no "since" cursor. A page on which fewer than half the
// kept records are new marks the point where the crawl reached territory it
// has already stored; a configurable number of extra pages after that
// recovers entries that arrived out of order.

use std::collections::HashSet;
use std::time::Duration;

use feedloom_common::{ActivityItem, DelayWindow};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::filter::FilterChain;
use crate::normalize::Normalizer;
use crate::source::PageSource;

/// Why a crawl ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Empty page, or the upstream signaled there is nothing more.
    Empty,
    /// Transport or payload failure. Items from earlier pages are kept.
    Error,
    /// Extra-page budget after overlap ran out.
    Budget,
    /// Hard page ceiling reached.
    MaxPages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBudget {
    pub max_pages: u32,
    pub extra_pages: u32,
}

/// Everything one crawl produced. `items` may contain ids already in the
/// store; de-duplication happens at merge.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub items: Vec<ActivityItem>,
    pub pages: u32,
    pub stop: StopReason,
    /// 1-based page on which overlap was first detected.
    pub overlap_page: Option<u32>,
    /// Set when the crawl stopped on a failed request.
    pub error: Option<String>,
}

pub struct Paginator<'a> {
    pub source: &'a dyn PageSource,
    pub normalizer: &'a dyn Normalizer,
    pub filters: &'a FilterChain,
    pub budget: PageBudget,
    pub delay: DelayWindow,
}

impl Paginator<'_> {
    /// Crawl until a stop condition. Never fails: request errors end the
    /// run early and whatever was collected so far is returned.
    pub async fn run(&self, existing: &HashSet<String>) -> CrawlOutcome {
        let platform = self.source.platform();
        info!(
            %platform,
            max_pages = self.budget.max_pages,
            extra_pages = self.budget.extra_pages,
            "Crawl started"
        );

        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;
        let mut overlap_page = None;
        // None until overlap is seen, then the extra pages still allowed.
        let mut extra_left: Option<u32> = None;
        let mut error = None;

        let stop = loop {
            if pages >= self.budget.max_pages {
                break StopReason::MaxPages;
            }

            let page = match self.source.fetch_page(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(%platform, page = pages + 1, error = %e, "Page request failed, stopping");
                    error = Some(e.to_string());
                    break StopReason::Error;
                }
            };
            pages += 1;

            if page.records.is_empty() {
                break StopReason::Empty;
            }

            let mut page_total = 0usize;
            let mut page_new = 0usize;
            for raw in &page.records {
                if !self.filters.accepts_subtype(self.normalizer.subtype(raw)) {
                    continue;
                }
                let Some(item) = self.normalizer.normalize(raw) else {
                    continue;
                };
                if !self.filters.accepts_item(&item) {
                    continue;
                }
                page_total += 1;
                if !existing.contains(&item.id) {
                    page_new += 1;
                }
                items.push(item);
            }
            debug!(%platform, page = pages, page_total, page_new, "Page processed");

            if extra_left.is_none() && page_total > 0 && page_new * 2 < page_total {
                info!(
                    %platform,
                    page = pages,
                    page_new,
                    page_total,
                    extra_pages = self.budget.extra_pages,
                    "Overlap detected"
                );
                overlap_page = Some(pages);
                extra_left = Some(self.budget.extra_pages);
            }

            if let Some(left) = extra_left.as_mut() {
                if *left == 0 {
                    break StopReason::Budget;
                }
                *left -= 1;
            }

            cursor = page.next_cursor.filter(|c| !c.is_empty());
            if !page.has_more || cursor.is_none() {
                break StopReason::Empty;
            }
            if pages >= self.budget.max_pages {
                break StopReason::MaxPages;
            }

            self.pause().await;
        };

        info!(%platform, pages, items = items.len(), ?stop, "Crawl finished");
        CrawlOutcome {
            items,
            pages,
            stop,
            overlap_page,
            error,
        }
    }

    /// Randomized anti-abuse pause between two requests.
    async fn pause(&self) {
        let DelayWindow { min, max } = self.delay;
        if max.is_zero() {
            return;
        }
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let millis = rand::rng().random_range(lo.as_millis() as u64..=hi.as_millis() as u64);
        debug!(delay_ms = millis, "Pausing before next page");
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use feedloom_common::Platform;
    use serde_json::{json, Value};

    use super::*;
    use crate::error::{ArchiveError, Result};
    use crate::source::RawPage;

    /// Serves pre-built pages; fails once they run out.
    struct ScriptedSource {
        pages: Vec<Vec<&'static str>>,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Vec<&'static str>>) -> Self {
            Self {
                pages,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        fn platform(&self) -> Platform {
            Platform::Bilibili
        }

        async fn fetch_page(&self, _cursor: Option<&str>) -> Result<RawPage> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let ids = self.pages.get(n).ok_or(ArchiveError::Status {
                status: 503,
                body: "unavailable".into(),
            })?;
            Ok(RawPage {
                records: ids.iter().map(|id| json!({ "id": id })).collect(),
                next_cursor: Some(format!("c{}", n + 1)),
                has_more: true,
            })
        }
    }

    struct IdNormalizer;

    impl Normalizer for IdNormalizer {
        fn platform(&self) -> Platform {
            Platform::Bilibili
        }

        fn subtype<'a>(&self, _raw: &'a Value) -> &'a str {
            "post"
        }

        fn normalize(&self, raw: &Value) -> Option<ActivityItem> {
            let id = raw["id"].as_str()?;
            if id.starts_with("ad") {
                return None;
            }
            Some(ActivityItem::new(Platform::Bilibili, id))
        }
    }

    async fn crawl(source: &ScriptedSource, budget: PageBudget, existing: &[&str]) -> CrawlOutcome {
        let filters = FilterChain::default();
        let paginator = Paginator {
            source,
            normalizer: &IdNormalizer,
            filters: &filters,
            budget,
            delay: DelayWindow::NONE,
        };
        let existing = existing.iter().map(|s| s.to_string()).collect();
        paginator.run(&existing).await
    }

    #[tokio::test]
    async fn stops_at_max_pages() {
        let source = ScriptedSource::new(vec![vec!["a"], vec!["b"], vec!["c"]]);
        let out = crawl(&source, PageBudget { max_pages: 2, extra_pages: 0 }, &[]).await;
        assert_eq!(out.pages, 2);
        assert_eq!(out.stop, StopReason::MaxPages);
        assert_eq!(out.items.len(), 2);
    }

    #[tokio::test]
    async fn request_failure_keeps_partial_results() {
        let source = ScriptedSource::new(vec![vec!["a", "b"]]);
        let out = crawl(&source, PageBudget { max_pages: 5, extra_pages: 0 }, &[]).await;
        assert_eq!(out.stop, StopReason::Error);
        assert_eq!(out.items.len(), 2);
        assert!(out.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn overlap_without_extra_pages_stops_immediately() {
        let source = ScriptedSource::new(vec![vec!["n1", "n2"], vec!["o1", "o2", "n3"], vec!["n4"]]);
        let out = crawl(
            &source,
            PageBudget { max_pages: 5, extra_pages: 0 },
            &["o1", "o2"],
        )
        .await;
        assert_eq!(out.pages, 2);
        assert_eq!(out.overlap_page, Some(2));
        assert_eq!(out.stop, StopReason::Budget);
        assert_eq!(out.items.len(), 5);
    }

    #[tokio::test]
    async fn exactly_half_new_is_not_overlap() {
        let source = ScriptedSource::new(vec![vec!["o1", "n1"], vec![]]);
        let out = crawl(&source, PageBudget { max_pages: 5, extra_pages: 0 }, &["o1"]).await;
        assert_eq!(out.overlap_page, None);
        assert_eq!(out.stop, StopReason::Empty);
    }

    #[tokio::test]
    async fn unrepresentable_records_do_not_count() {
        // Two ads and one old record: the single kept record is old.
        let source = ScriptedSource::new(vec![vec!["ad1", "ad2", "o1"], vec!["n1"]]);
        let out = crawl(&source, PageBudget { max_pages: 5, extra_pages: 0 }, &["o1"]).await;
        assert_eq!(out.overlap_page, Some(1));
        assert_eq!(out.items.len(), 1);
    }

    #[tokio::test]
    async fn zero_max_pages_fetches_nothing() {
        let source = ScriptedSource::new(vec![vec!["a"]]);
        let out = crawl(&source, PageBudget { max_pages: 0, extra_pages: 0 }, &[]).await;
        assert_eq!(out.pages, 0);
        assert!(out.items.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
