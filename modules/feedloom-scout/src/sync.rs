// Feed publication: load a platform's stored items, render them and hand
// the document to the publisher.

use std::sync::Arc;

use feedloom_archive::Store;
use feedloom_common::{MergeOutcome, Platform};
use feedloom_render::FeedRenderer;
use serde::Serialize;
use tracing::{info, warn};

use crate::publish::Publisher;

/// What happened to a platform's published document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Published { url: String },
    Skipped { reason: &'static str },
    Failed { error: String },
}

impl SyncOutcome {
    const NO_NEW_ITEMS: Self = Self::Skipped { reason: "no_new_items" };
    const AUTO_SYNC_OFF: Self = Self::Skipped { reason: "auto_sync_disabled" };
    const NO_PUBLISHER: Self = Self::Skipped { reason: "no_publisher" };
    const EMPTY: Self = Self::Skipped { reason: "empty" };
}

pub struct FeedPublication {
    store: Arc<Store>,
    renderer: FeedRenderer,
    publisher: Option<Arc<dyn Publisher>>,
    auto_sync: bool,
}

impl FeedPublication {
    pub fn new(
        store: Arc<Store>,
        renderer: FeedRenderer,
        publisher: Option<Arc<dyn Publisher>>,
        auto_sync: bool,
    ) -> Self {
        Self {
            store,
            renderer,
            publisher,
            auto_sync,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn has_publisher(&self) -> bool {
        self.publisher.is_some()
    }

    pub fn auto_sync(&self) -> bool {
        self.auto_sync
    }

    /// The current document for `platform`, rendered from the store.
    pub fn render(&self, platform: Platform) -> String {
        self.renderer.render(platform, &self.store.load(platform))
    }

    /// Publish after a merge. Only runs when the merge added something and
    /// auto-sync is on.
    pub async fn after_merge(&self, platform: Platform, merged: MergeOutcome) -> SyncOutcome {
        if merged.new_count == 0 {
            return SyncOutcome::NO_NEW_ITEMS;
        }
        if !self.auto_sync {
            return SyncOutcome::AUTO_SYNC_OFF;
        }
        self.publish(platform).await
    }

    /// Render and upload regardless of auto-sync. Failures are logged and
    /// reported, never raised.
    pub async fn publish(&self, platform: Platform) -> SyncOutcome {
        let Some(publisher) = &self.publisher else {
            return SyncOutcome::NO_PUBLISHER;
        };
        let items = self.store.load(platform);
        if items.is_empty() {
            return SyncOutcome::EMPTY;
        }

        let xml = self.renderer.render(platform, &items);
        let key = self.renderer.key(platform);
        match publisher.upload(key, &xml).await {
            Ok(published) => {
                info!(%platform, url = published.url.as_str(), "Feed published");
                SyncOutcome::Published { url: published.url }
            }
            Err(e) => {
                warn!(%platform, error = %e, "Feed publish failed");
                SyncOutcome::Failed {
                    error: format!("{e:#}"),
                }
            }
        }
    }

    /// Publish every platform that has stored items.
    pub async fn publish_all(&self) -> Vec<(Platform, SyncOutcome)> {
        let mut results = Vec::new();
        for platform in Platform::ALL {
            if self.store.count(platform) == 0 {
                continue;
            }
            results.push((platform, self.publish(platform).await));
        }
        results
    }
}
