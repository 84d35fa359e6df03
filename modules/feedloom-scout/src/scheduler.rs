// Service: recurring fetch cycles.
//
// A cycle crawls every configured platform one after another, merges each
// result and publishes the platforms that gained items. Platforms are never
// crawled in parallel; the inter-page delays assume one request stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use feedloom_archive::{http_client, Crawler, StopReason};
use feedloom_common::{Config, Platform};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::{Result, ScoutError};
use crate::ingest::{Ingestor, Mirrored};
use crate::sync::SyncOutcome;

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub startup_delay: Duration,
    pub interval: Duration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub platforms: Vec<PlatformReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformReport {
    pub platform: Platform,
    pub fetched: usize,
    pub pages: u32,
    pub stop: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap_page: Option<u32>,
    pub new_count: usize,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirrored: Option<Mirrored>,
    /// Crawl stopped on a failed request, or the merge failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Scheduler {
    crawlers: Vec<Crawler>,
    ingestor: Ingestor,
    timing: Timing,
    running: AtomicBool,
    last_report: RwLock<Option<CycleReport>>,
}

/// Clears the in-flight flag when a cycle ends, even by panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Scheduler {
    pub fn new(crawlers: Vec<Crawler>, ingestor: Ingestor, timing: Timing) -> Self {
        Self {
            crawlers,
            ingestor,
            timing,
            running: AtomicBool::new(false),
            last_report: RwLock::new(None),
        }
    }

    /// One crawler per platform that has a credential, sharing one HTTP
    /// client.
    pub fn from_config(config: &Config, ingestor: Ingestor) -> Result<Self> {
        let client = http_client(config.request_timeout)?;
        let crawlers = config
            .crawlable_platforms()
            .into_iter()
            .map(|p| Crawler::for_platform(p, config.platform(p), client.clone()))
            .collect::<feedloom_archive::Result<Vec<_>>>()?;

        Ok(Self::new(
            crawlers,
            ingestor,
            Timing {
                startup_delay: config.startup_delay,
                interval: config.fetch_interval,
            },
        ))
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.crawlers.iter().map(Crawler::platform).collect()
    }

    pub fn interval(&self) -> Duration {
        self.timing.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Arm the timer: first cycle after the startup delay, then one per
    /// interval. Without any crawlable platform nothing is armed.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.crawlers.is_empty() {
            info!("No platform credentials configured, scheduled fetching is off");
            return None;
        }

        info!(
            platforms = ?self.platforms(),
            interval_minutes = self.timing.interval.as_secs() / 60,
            "Scheduler started"
        );

        let scheduler = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                Instant::now() + scheduler.timing.startup_delay,
                scheduler.timing.interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match scheduler.run_now().await {
                    Ok(_) => {}
                    Err(ScoutError::CycleInProgress) => {
                        info!("Fetch cycle still running, skipping scheduled tick");
                    }
                    Err(e) => error!(error = %e, "Scheduled fetch cycle failed"),
                }
            }
        }))
    }

    /// Run one cycle now. Rejected while another cycle is in flight.
    pub async fn run_now(&self) -> Result<CycleReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ScoutError::CycleInProgress);
        }
        let _in_flight = InFlight(&self.running);

        let report = self.run_cycle().await;
        *self
            .last_report
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(report.clone());
        Ok(report)
    }

    async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        info!(platforms = self.crawlers.len(), "Fetch cycle started");

        let mut platforms = Vec::with_capacity(self.crawlers.len());
        for crawler in &self.crawlers {
            platforms.push(self.run_platform(crawler).await);
        }

        let finished_at = Utc::now();
        info!(
            elapsed_secs = (finished_at - started_at).num_seconds(),
            "Fetch cycle finished"
        );
        CycleReport {
            started_at,
            finished_at,
            platforms,
        }
    }

    async fn run_platform(&self, crawler: &Crawler) -> PlatformReport {
        let platform = crawler.platform();
        let store = self.ingestor.publication().store();

        let outcome = crawler.crawl(&store.existing_ids(platform)).await;
        let mut report = PlatformReport {
            platform,
            fetched: outcome.items.len(),
            pages: outcome.pages,
            stop: outcome.stop,
            overlap_page: outcome.overlap_page,
            new_count: 0,
            total_count: 0,
            sync: None,
            mirrored: None,
            error: outcome.error,
        };

        match self.ingestor.ingest(platform, outcome.items).await {
            Ok(ingested) => {
                report.new_count = ingested.merged.new_count;
                report.total_count = ingested.merged.total_count;
                report.sync = Some(ingested.sync);
                report.mirrored = ingested.mirrored;
            }
            Err(e) => {
                warn!(%platform, error = %e, "Merge failed");
                report.total_count = store.count(platform);
                report.error = Some(e.to_string());
            }
        }
        report
    }
}
