//! Download registry: one entry per enclosure, updated from engine events

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::item::{DownloadItem, DownloadStatus, ProgressEvent};
use crate::error::RegistryError;

/// Minimum spacing between two samples used for a speed reading
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Last byte count seen for an active download
#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    bytes: u64,
    at: Instant,
}

/// Surfaced once per download reaching `Completed` or `Failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalNotification {
    pub enclosure_id: u64,
    pub status: DownloadStatus,
    pub file_name: String,
    pub error: Option<String>,
}

/// Result of applying one event
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedEvent {
    /// The item after the merge
    pub item: DownloadItem,
    pub notification: Option<TerminalNotification>,
}

/// Keyed collection of downloads plus the bookkeeping needed to derive
/// speed and fire terminal notifications exactly once.
#[derive(Debug)]
pub struct DownloadRegistry {
    items: BTreeMap<u64, DownloadItem>,
    samples: HashMap<u64, SpeedSample>,
    notified: HashSet<u64>,
    sample_interval: Duration,
}

impl Default for DownloadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadRegistry {
    pub fn new() -> Self {
        Self::with_sample_interval(DEFAULT_SAMPLE_INTERVAL)
    }

    pub fn with_sample_interval(sample_interval: Duration) -> Self {
        Self {
            items: BTreeMap::new(),
            samples: HashMap::new(),
            notified: HashSet::new(),
            sample_interval,
        }
    }

    /// Load persisted history. Later entries win on duplicate ids, and
    /// terminal entries count as already notified.
    pub fn hydrate(&mut self, history: Vec<DownloadItem>) -> usize {
        let count = history.len();

        for item in history {
            let id = item.enclosure_id;
            if item.status.is_notifiable() {
                self.notified.insert(id);
            } else {
                self.notified.remove(&id);
            }
            self.samples.remove(&id);
            self.items.insert(id, item);
        }

        info!("Hydrated {} downloads from history", count);
        count
    }

    pub fn apply_progress_event(&mut self, event: ProgressEvent) -> Option<AppliedEvent> {
        self.apply_progress_event_at(event, Instant::now())
    }

    /// Apply one engine event observed at `now`.
    ///
    /// Returns `None` when the event is discarded because it would move
    /// the byte count of a downloading item backwards.
    pub fn apply_progress_event_at(
        &mut self,
        event: ProgressEvent,
        now: Instant,
    ) -> Option<AppliedEvent> {
        let id = event.enclosure_id;

        match self.items.get_mut(&id) {
            Some(existing) => {
                let resumed = event.status == DownloadStatus::Downloading
                    && existing.status != DownloadStatus::Downloading;

                if !resumed
                    && event.status == DownloadStatus::Downloading
                    && event.downloaded_bytes < existing.downloaded_bytes
                {
                    warn!(
                        enclosure_id = id,
                        prev = existing.downloaded_bytes,
                        next = event.downloaded_bytes,
                        "Dropping out-of-order progress event"
                    );
                    return None;
                }

                if resumed {
                    // A retry reuses the id: start sampling and notifying afresh
                    self.samples.remove(&id);
                    self.notified.remove(&id);
                    existing.speed = Some(0.0);
                }

                merge(existing, &event);
            }
            None => {
                self.items.insert(id, DownloadItem::from_event(&event));
            }
        }

        if event.status == DownloadStatus::Downloading {
            self.resample(id, event.downloaded_bytes, now);
        } else {
            self.samples.remove(&id);
        }

        let item = self.items.get(&id)?.clone();
        let notification = self.take_notification(&item);

        Some(AppliedEvent { item, notification })
    }

    fn resample(&mut self, id: u64, bytes: u64, now: Instant) {
        let next = SpeedSample { bytes, at: now };

        let Some(prev) = self.samples.get(&id).copied() else {
            self.samples.insert(id, next);
            return;
        };

        let elapsed = now.saturating_duration_since(prev.at);
        if elapsed < self.sample_interval || elapsed.is_zero() {
            return;
        }

        let speed = bytes.saturating_sub(prev.bytes) as f64 / elapsed.as_secs_f64();
        if let Some(item) = self.items.get_mut(&id) {
            item.speed = Some(speed);
        }
        self.samples.insert(id, next);

        debug!(enclosure_id = id, speed, "Download speed resampled");
    }

    fn take_notification(&mut self, item: &DownloadItem) -> Option<TerminalNotification> {
        if !item.status.is_notifiable() || !self.notified.insert(item.enclosure_id) {
            return None;
        }

        Some(TerminalNotification {
            enclosure_id: item.enclosure_id,
            status: item.status,
            file_name: item.file_name.clone(),
            error: item.error.clone(),
        })
    }

    /// Drop one download from the list. Local only.
    pub fn remove(&mut self, enclosure_id: u64) -> Result<DownloadItem, RegistryError> {
        let item = self
            .items
            .remove(&enclosure_id)
            .ok_or(RegistryError::NotFound(enclosure_id))?;

        self.samples.remove(&enclosure_id);
        self.notified.remove(&enclosure_id);

        info!(enclosure_id, "Download removed from list");
        Ok(item)
    }

    /// Drop every completed download, returning the removed ids
    pub fn clear_completed(&mut self) -> Vec<u64> {
        let removed: Vec<u64> = self
            .items
            .values()
            .filter(|item| item.status == DownloadStatus::Completed)
            .map(|item| item.enclosure_id)
            .collect();

        for id in &removed {
            self.items.remove(id);
            self.samples.remove(id);
            self.notified.remove(id);
        }

        info!("Cleared {} completed downloads", removed.len());
        removed
    }

    pub fn get(&self, enclosure_id: u64) -> Option<&DownloadItem> {
        self.items.get(&enclosure_id)
    }

    /// All items ordered by enclosure id
    pub fn items(&self) -> impl Iterator<Item = &DownloadItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn active_downloads(&self) -> Vec<&DownloadItem> {
        self.items.values().filter(|item| item.is_active()).collect()
    }

    /// Sum of speeds over active downloads, in bytes per second
    pub fn total_active_speed(&self) -> f64 {
        self.items
            .values()
            .filter(|item| item.is_active())
            .filter_map(|item| item.speed)
            .sum()
    }

    pub fn has_completed_downloads(&self) -> bool {
        self.items
            .values()
            .any(|item| item.status == DownloadStatus::Completed)
    }
}

/// Merge an event over an existing item. Absent fields keep what is known.
fn merge(item: &mut DownloadItem, event: &ProgressEvent) {
    if let Some(file_name) = &event.file_name {
        item.file_name = file_name.clone();
    }
    if let Some(url) = &event.url {
        item.url = url.clone();
    }
    if let Some(file_path) = &event.file_path {
        item.file_path = Some(file_path.clone());
    }

    item.status = event.status;

    match event.status {
        DownloadStatus::Downloading => {
            item.progress = event.progress;
            item.downloaded_bytes = event.downloaded_bytes;
            item.total_bytes = event.total_bytes;
            item.error = None;
        }
        DownloadStatus::Failed => {
            merge_counters(item, event);
            if event.error.is_some() {
                item.error = event.error.clone();
            }
        }
        DownloadStatus::Completed | DownloadStatus::Cancelled => {
            merge_counters(item, event);
            item.error = None;
        }
    }
}

// Terminal events from the engine carry zeros when it lost track of the
// counters; those must not erase what was already observed.
fn merge_counters(item: &mut DownloadItem, event: &ProgressEvent) {
    if event.progress > 0 {
        item.progress = event.progress;
    }
    if event.downloaded_bytes > 0 {
        item.downloaded_bytes = event.downloaded_bytes;
    }
    if event.total_bytes > 0 {
        item.total_bytes = event.total_bytes;
    }
}
