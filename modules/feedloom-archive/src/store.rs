// Per-platform JSON collections on disk.
//
// Each platform owns one `{key}.json` file holding its items newest-first.
// `merge` is the only mutation besides the administrative `clear`.

use std::collections::{HashMap, HashSet};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use feedloom_common::{ActivityItem, MergeOutcome, Platform};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::Result;

pub struct Store {
    dir: PathBuf,
    max_items: usize,
    locks: HashMap<Platform, Mutex<()>>,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>, max_items: usize) -> Self {
        Self {
            dir: dir.into(),
            max_items,
            locks: Platform::ALL.into_iter().map(|p| (p, Mutex::new(()))).collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    fn path(&self, platform: Platform) -> PathBuf {
        self.dir.join(format!("{}.json", platform.key()))
    }

    /// The stored collection, newest first. Missing or unreadable files
    /// read as empty.
    pub fn load(&self, platform: Platform) -> Vec<ActivityItem> {
        let path = self.path(platform);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(%platform, path = %path.display(), error = %e, "Failed to read store file");
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(items) => items,
            Err(e) => {
                warn!(%platform, path = %path.display(), error = %e, "Failed to parse store file");
                Vec::new()
            }
        }
    }

    pub fn count(&self, platform: Platform) -> usize {
        self.load(platform).len()
    }

    /// Ids currently stored, for overlap detection.
    pub fn existing_ids(&self, platform: Platform) -> HashSet<String> {
        self.load(platform).into_iter().map(|i| i.id).collect()
    }

    /// Add the items whose ids are not stored yet, then sort newest first and
    /// truncate to the size bound. Nothing is written when no item is new.
    /// Within `incoming`, the first occurrence of an id wins.
    pub fn merge(&self, platform: Platform, incoming: Vec<ActivityItem>) -> Result<MergeOutcome> {
        let _guard = self.lock(platform);

        let existing = self.load(platform);
        let mut seen: HashSet<String> = existing.iter().map(|i| i.id.clone()).collect();
        let mut merged: Vec<ActivityItem> = incoming
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();

        let new_count = merged.len();
        if new_count == 0 {
            return Ok(MergeOutcome {
                total_count: existing.len(),
                new_count: 0,
            });
        }

        merged.extend(existing);
        // Stable: on equal timestamps new items stay ahead of old ones.
        merged.sort_by(|a, b| b.publish_time_millis.cmp(&a.publish_time_millis));
        merged.truncate(self.max_items);

        self.save(platform, &merged)?;
        info!(%platform, new_count, total = merged.len(), "Store merged");

        Ok(MergeOutcome {
            total_count: merged.len(),
            new_count,
        })
    }

    /// Reset a platform's collection to empty.
    pub fn clear(&self, platform: Platform) -> Result<()> {
        let _guard = self.lock(platform);
        self.save(platform, &[])?;
        info!(%platform, "Store cleared");
        Ok(())
    }

    fn lock(&self, platform: Platform) -> Option<std::sync::MutexGuard<'_, ()>> {
        self.locks
            .get(&platform)
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Write through a temp file in the same directory, then rename over the
    /// target. Readers see either the old file or the new one.
    fn save(&self, platform: Platform, items: &[ActivityItem]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, items)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path(platform)).map_err(|e| e.error)?;
        Ok(())
    }
}
