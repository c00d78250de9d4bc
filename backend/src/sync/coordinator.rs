//! Sync coordinator: the single linear progression through sync stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::stage::{StageStatus, SyncStage};
use super::summary::SyncSummary;

/// Entries pulled so far out of the known total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntriesProgress {
    pub pulled: u64,
    pub total: u64,
    /// round(100 * pulled / total), clamped to 0..=100; 0 when total is 0
    pub percentage: u8,
}

impl EntriesProgress {
    pub fn new(pulled: u64, total: u64) -> Self {
        Self {
            pulled,
            total,
            percentage: percentage_of(pulled, total),
        }
    }
}

/// Rounded percentage of `part` in `whole`, clamped to 0..=100
pub fn percentage_of(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    let pct = (part as f64 * 100.0 / whole as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// A working stage together with its derived status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    pub stage: SyncStage,
    pub status: StageStatus,
}

/// Full snapshot of the coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Identifies the current (or last) run in logs; new per `start_sync`
    pub run_id: Option<Uuid>,
    pub syncing: bool,
    pub current_stage: SyncStage,
    pub categories_count: Option<u64>,
    pub feeds_count: Option<u64>,
    pub entries_progress: Option<EntriesProgress>,
    /// Only written by a successful completion
    pub last_synced_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub last_summary: Option<SyncSummary>,
}

impl SyncState {
    /// Derive the status of one working stage.
    ///
    /// Pure function of the snapshot; recomputed on every call.
    pub fn stage_status(&self, stage: SyncStage) -> StageStatus {
        if self.error.is_some() || self.current_stage == SyncStage::Failed {
            return self.failed_stage_status(stage);
        }

        match self.current_stage {
            SyncStage::Completed => StageStatus::Completed,
            SyncStage::Idle => StageStatus::Pending,
            current if stage == current => StageStatus::Active,
            current if stage < current => StageStatus::Completed,
            _ => StageStatus::Pending,
        }
    }

    fn failed_stage_status(&self, stage: SyncStage) -> StageStatus {
        match stage {
            SyncStage::Categories if self.categories_count.is_some() => StageStatus::Completed,
            SyncStage::Feeds if self.feeds_count.is_some() => StageStatus::Completed,
            SyncStage::Entries if self.entries_started() => StageStatus::Error,
            _ => StageStatus::Pending,
        }
    }

    /// Statuses of the four working stages, in run order
    pub fn stage_statuses(&self) -> [StageProgress; 4] {
        SyncStage::WORKING.map(|stage| StageProgress {
            stage,
            status: self.stage_status(stage),
        })
    }

    fn entries_started(&self) -> bool {
        self.entries_progress
            .map(|progress| progress.pulled > 0)
            .unwrap_or(false)
    }
}

/// Owns the sync state and applies the driver's transition calls.
///
/// Advancement is entirely external: the coordinator never moves to the
/// next stage on its own and does not validate stage order.
#[derive(Debug, Default)]
pub struct SyncCoordinator {
    state: SyncState,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore the last successful sync time from a previous session
    pub fn with_last_synced_at(last_synced_at: Option<DateTime<Utc>>) -> Self {
        Self {
            state: SyncState {
                last_synced_at,
                ..SyncState::default()
            },
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Begin a run. Re-entry while syncing resets the run again.
    pub fn start_sync(&mut self) {
        if self.state.syncing {
            warn!("Sync started while a run was already in progress, resetting");
        }

        let run_id = Uuid::new_v4();
        self.state = SyncState {
            run_id: Some(run_id),
            syncing: true,
            last_synced_at: self.state.last_synced_at,
            ..SyncState::default()
        };

        info!(%run_id, "Sync started");
    }

    pub fn set_current_stage(&mut self, stage: SyncStage) {
        debug!(run_id = ?self.state.run_id, %stage, "Sync stage changed");
        self.state.current_stage = stage;
    }

    pub fn set_categories_count(&mut self, count: u64) {
        self.state.categories_count = Some(monotonic(self.state.categories_count, count));
    }

    pub fn set_feeds_count(&mut self, count: u64) {
        self.state.feeds_count = Some(monotonic(self.state.feeds_count, count));
    }

    pub fn set_entries_progress(&mut self, pulled: u64, total: u64) {
        self.state.entries_progress = Some(EntriesProgress::new(pulled, total));
    }

    pub fn complete_sync(&mut self) {
        self.complete_sync_at(Utc::now(), None);
    }

    /// Complete with the driver's summary of what was transferred
    pub fn complete_sync_with(&mut self, summary: SyncSummary) {
        self.complete_sync_at(Utc::now(), Some(summary));
    }

    pub fn complete_sync_at(&mut self, now: DateTime<Utc>, summary: Option<SyncSummary>) {
        self.state.syncing = false;
        self.state.last_synced_at = Some(now);
        self.state.current_stage = SyncStage::Completed;
        self.state.last_summary = summary;

        info!(run_id = ?self.state.run_id, ?summary, "Sync completed");
    }

    /// End the run with an error. Counts gathered so far stay visible.
    pub fn fail_sync(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(run_id = ?self.state.run_id, error = %message, "Sync failed");

        self.state.syncing = false;
        self.state.error = Some(message);
        self.state.current_stage = SyncStage::Failed;
    }

    /// Set or clear the error. Setting one always stops the run; clearing
    /// leaves the stage untouched.
    pub fn set_error(&mut self, message: Option<String>) {
        if message.is_some() {
            self.state.syncing = false;
        }
        self.state.error = message;
    }
}

fn monotonic(current: Option<u64>, next: u64) -> u64 {
    match current {
        Some(prev) if next < prev => {
            debug!(prev, next, "Ignoring decreasing sync count");
            prev
        }
        _ => next,
    }
}
