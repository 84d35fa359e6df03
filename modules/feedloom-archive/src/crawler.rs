use std::collections::HashSet;

use feedloom_common::{DelayWindow, Platform, PlatformConfig};

use crate::error::{ArchiveError, Result};
use crate::filter::FilterChain;
use crate::normalize::Normalizer;
use crate::paginator::{CrawlOutcome, PageBudget, Paginator};
use crate::services::{normalizer_for, source_for};
use crate::source::PageSource;

/// Everything needed to crawl one account: where pages come from, how
/// records are normalized and filtered, and how far to go.
pub struct Crawler {
    source: Box<dyn PageSource>,
    normalizer: Box<dyn Normalizer>,
    filters: FilterChain,
    budget: PageBudget,
    delay: DelayWindow,
}

impl Crawler {
    pub fn new(
        source: Box<dyn PageSource>,
        normalizer: Box<dyn Normalizer>,
        filters: FilterChain,
        budget: PageBudget,
        delay: DelayWindow,
    ) -> Self {
        Self {
            source,
            normalizer,
            filters,
            budget,
            delay,
        }
    }

    /// Crawler for a configured platform. Fails when no credential is set.
    pub fn for_platform(
        platform: Platform,
        config: &PlatformConfig,
        client: reqwest::Client,
    ) -> Result<Self> {
        let credential = config
            .credential
            .as_deref()
            .ok_or(ArchiveError::MissingCredential(platform))?;

        Ok(Self::new(
            source_for(platform, client, credential),
            normalizer_for(platform),
            FilterChain::for_platform(platform, config),
            PageBudget {
                max_pages: config.max_pages,
                extra_pages: config.extra_pages,
            },
            config.delay,
        ))
    }

    pub fn platform(&self) -> Platform {
        self.source.platform()
    }

    /// Run one crawl against a snapshot of the ids already stored.
    pub async fn crawl(&self, existing: &HashSet<String>) -> CrawlOutcome {
        Paginator {
            source: self.source.as_ref(),
            normalizer: self.normalizer.as_ref(),
            filters: &self.filters,
            budget: self.budget,
            delay: self.delay,
        }
        .run(existing)
        .await
    }
}
