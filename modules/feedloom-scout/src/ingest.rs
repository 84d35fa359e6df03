use std::sync::Arc;

use feedloom_archive::FilterChain;
use feedloom_common::{ActivityItem, Config, MergeOutcome, Platform};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::sync::{FeedPublication, SyncOutcome};

/// Result of merging one batch, and of publishing afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingested {
    pub platform: Platform,
    #[serde(flatten)]
    pub merged: MergeOutcome,
    pub sync: SyncOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirrored: Option<Mirrored>,
}

/// The part of a main-account batch copied into the alt account's feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mirrored {
    pub platform: Platform,
    #[serde(flatten)]
    pub merged: MergeOutcome,
    pub sync: SyncOutcome,
}

/// The single path by which items enter the store, shared by crawls and
/// pushed batches.
pub struct Ingestor {
    publication: Arc<FeedPublication>,
    /// Set when the alt account has no crawl of its own: its feed is then
    /// fed from the main account's video posts.
    alt_mirror: Option<FilterChain>,
}

impl Ingestor {
    pub fn new(publication: Arc<FeedPublication>, alt_mirror: Option<FilterChain>) -> Self {
        Self {
            publication,
            alt_mirror,
        }
    }

    pub fn from_config(config: &Config, publication: Arc<FeedPublication>) -> Self {
        let alt_mirror = config
            .bilibili_alt
            .credential
            .is_none()
            .then(|| FilterChain::for_platform(Platform::BilibiliAlt, &config.bilibili_alt));
        Self::new(publication, alt_mirror)
    }

    pub fn publication(&self) -> &Arc<FeedPublication> {
        &self.publication
    }

    pub fn mirrors_alt(&self) -> bool {
        self.alt_mirror.is_some()
    }

    /// Merge `items` into `platform`'s collection and publish when new items
    /// arrived. Store write failures are the only error.
    pub async fn ingest(&self, platform: Platform, items: Vec<ActivityItem>) -> Result<Ingested> {
        let mirror_items = match (&self.alt_mirror, platform) {
            (Some(filters), Platform::Bilibili) => items
                .iter()
                .filter(|item| filters.accepts_subtype(&item.kind) && filters.accepts_item(item))
                .map(|item| ActivityItem {
                    platform: Platform::BilibiliAlt,
                    ..item.clone()
                })
                .collect(),
            _ => Vec::new(),
        };

        let store = self.publication.store();
        let merged = store.merge(platform, items)?;
        let sync = self.publication.after_merge(platform, merged).await;

        let mirrored = if mirror_items.is_empty() {
            None
        } else {
            let alt_merged = store.merge(Platform::BilibiliAlt, mirror_items)?;
            if alt_merged.new_count > 0 {
                info!(new_count = alt_merged.new_count, "Mirrored videos into alt feed");
            }
            Some(Mirrored {
                platform: Platform::BilibiliAlt,
                merged: alt_merged,
                sync: self
                    .publication
                    .after_merge(Platform::BilibiliAlt, alt_merged)
                    .await,
            })
        };

        Ok(Ingested {
            platform,
            merged,
            sync,
            mirrored,
        })
    }
}
