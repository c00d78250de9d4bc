//! Shared, observable wrappers around the two trackers
//!
//! Every mutation holds the write lock for exactly one operation and,
//! still under that lock, mirrors the change into the history store and
//! publishes it. Store writes and published changes therefore follow the
//! order in which mutations were applied. Readers get snapshots computed
//! under a single read lock.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::download::{
    AppliedEvent, DownloadItem, DownloadRegistry, ProgressEvent, RawProgressEvent,
    TerminalNotification,
};
use crate::error::{EventError, RegistryError};
use crate::format;
use crate::sync::{StageProgress, SyncCoordinator, SyncStage, SyncState, SyncSummary};

/// Change published to subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    Sync(SyncSnapshot),
    /// Full download list, sent to a subscriber when it connects
    Downloads(DownloadsSnapshot),
    Download(DownloadItem),
    DownloadRemoved { enclosure_id: u64 },
    DownloadsCleared { removed: Vec<u64> },
    Notify(TerminalNotification),
    Command(EngineCommand),
}

/// Action forwarded to the external download engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
    Cancel,
    Retry,
}

/// Request for the engine; the registry only changes once the engine
/// reports back through a progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCommand {
    pub action: CommandAction,
    pub enclosure_id: u64,
    pub url: String,
    pub file_name: String,
}

/// Create the channel both hubs publish on
pub fn event_channel(capacity: usize) -> broadcast::Sender<HubEvent> {
    let (tx, _) = broadcast::channel(capacity.max(1));
    tx
}

/// Sync state plus every derived view
#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot {
    #[serde(flatten)]
    pub state: SyncState,
    pub stages: Vec<StageView>,
    pub overall_percentage: u8,
    pub status_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageView {
    #[serde(flatten)]
    pub progress: StageProgress,
    pub description: String,
}

impl SyncSnapshot {
    pub fn from_state(state: &SyncState) -> Self {
        let stages = state
            .stage_statuses()
            .into_iter()
            .map(|progress| StageView {
                description: format::stage_description(progress.stage, state),
                progress,
            })
            .collect();

        Self {
            state: state.clone(),
            stages,
            overall_percentage: format::overall_percentage(state),
            status_text: format::sync_status_text(state),
        }
    }
}

/// Download list plus aggregate views
#[derive(Debug, Clone, Serialize)]
pub struct DownloadsSnapshot {
    pub items: Vec<DownloadItem>,
    pub active_count: usize,
    pub total_active_speed: f64,
    pub total_active_speed_text: String,
    pub has_completed_downloads: bool,
}

impl DownloadsSnapshot {
    pub fn from_registry(registry: &DownloadRegistry) -> Self {
        let total_active_speed = registry.total_active_speed();

        Self {
            items: registry.items().cloned().collect(),
            active_count: registry.active_downloads().len(),
            total_active_speed,
            total_active_speed_text: format::format_speed(total_active_speed),
            has_completed_downloads: registry.has_completed_downloads(),
        }
    }
}

/// Shared sync coordinator
#[derive(Clone)]
pub struct SyncHub {
    coordinator: Arc<RwLock<SyncCoordinator>>,
    events: broadcast::Sender<HubEvent>,
    history: Option<Database>,
}

impl SyncHub {
    pub fn new(coordinator: SyncCoordinator, events: broadcast::Sender<HubEvent>) -> Self {
        Self {
            coordinator: Arc::new(RwLock::new(coordinator)),
            events,
            history: None,
        }
    }

    /// Persist the completion time into `db`
    pub fn with_history(mut self, db: Database) -> Self {
        self.history = Some(db);
        self
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot::from_state(self.coordinator.read().state())
    }

    pub fn start_sync(&self) -> SyncSnapshot {
        self.update(|c| c.start_sync())
    }

    pub fn set_current_stage(&self, stage: SyncStage) -> SyncSnapshot {
        self.update(|c| c.set_current_stage(stage))
    }

    pub fn set_categories_count(&self, count: u64) -> SyncSnapshot {
        self.update(|c| c.set_categories_count(count))
    }

    pub fn set_feeds_count(&self, count: u64) -> SyncSnapshot {
        self.update(|c| c.set_feeds_count(count))
    }

    pub fn set_entries_progress(&self, pulled: u64, total: u64) -> SyncSnapshot {
        self.update(|c| c.set_entries_progress(pulled, total))
    }

    pub fn complete_sync(&self, summary: Option<SyncSummary>) -> SyncSnapshot {
        self.update_persisted(|c| match summary {
            Some(summary) => c.complete_sync_with(summary),
            None => c.complete_sync(),
        })
    }

    pub fn fail_sync(&self, message: String) -> SyncSnapshot {
        self.update(|c| c.fail_sync(message))
    }

    pub fn set_error(&self, message: Option<String>) -> SyncSnapshot {
        self.update(|c| c.set_error(message))
    }

    fn update(&self, apply: impl FnOnce(&mut SyncCoordinator)) -> SyncSnapshot {
        let mut coordinator = self.coordinator.write();
        apply(&mut *coordinator);
        self.publish(SyncSnapshot::from_state(coordinator.state()))
    }

    /// Like `update`, also recording the completion time in the history store
    fn update_persisted(&self, apply: impl FnOnce(&mut SyncCoordinator)) -> SyncSnapshot {
        let mut coordinator = self.coordinator.write();
        apply(&mut *coordinator);

        if let Some(db) = &self.history {
            if let Err(e) = db.save_last_synced_at(coordinator.state().last_synced_at) {
                error!("Failed to persist last sync time: {}", e);
            }
        }

        self.publish(SyncSnapshot::from_state(coordinator.state()))
    }

    fn publish(&self, snapshot: SyncSnapshot) -> SyncSnapshot {
        let _ = self.events.send(HubEvent::Sync(snapshot.clone()));
        snapshot
    }
}

/// Shared download registry
#[derive(Clone)]
pub struct DownloadHub {
    registry: Arc<RwLock<DownloadRegistry>>,
    events: broadcast::Sender<HubEvent>,
    history: Option<Database>,
}

impl DownloadHub {
    pub fn new(registry: DownloadRegistry, events: broadcast::Sender<HubEvent>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            events,
            history: None,
        }
    }

    /// Mirror every change into `db`
    pub fn with_history(mut self, db: Database) -> Self {
        self.history = Some(db);
        self
    }

    pub fn snapshot(&self) -> DownloadsSnapshot {
        DownloadsSnapshot::from_registry(&self.registry.read())
    }

    pub fn get(&self, enclosure_id: u64) -> Option<DownloadItem> {
        self.registry.read().get(enclosure_id).cloned()
    }

    pub fn hydrate(&self, history: Vec<DownloadItem>) -> usize {
        self.registry.write().hydrate(history)
    }

    /// Validate and apply an event as received from the wire.
    ///
    /// Unknown statuses are logged and dropped without touching the registry.
    pub fn apply_raw(&self, raw: RawProgressEvent) -> Result<Option<AppliedEvent>, EventError> {
        let enclosure_id = raw.enclosure_id;
        match ProgressEvent::try_from(raw) {
            Ok(event) => Ok(self.apply(event)),
            Err(e) => {
                warn!(enclosure_id, "Dropping progress event: {}", e);
                Err(e)
            }
        }
    }

    pub fn apply(&self, event: ProgressEvent) -> Option<AppliedEvent> {
        let mut registry = self.registry.write();
        let applied = registry.apply_progress_event(event)?;

        if let Some(db) = &self.history {
            if let Err(e) = db.upsert_download(&applied.item) {
                error!(enclosure_id = applied.item.enclosure_id, "Failed to save download: {}", e);
            }
        }

        let _ = self.events.send(HubEvent::Download(applied.item.clone()));
        if let Some(notification) = &applied.notification {
            info!(
                enclosure_id = notification.enclosure_id,
                status = %notification.status,
                "Download finished"
            );
            let _ = self.events.send(HubEvent::Notify(notification.clone()));
        }
        drop(registry);

        Some(applied)
    }

    pub fn cancel(&self, enclosure_id: u64) -> Result<EngineCommand, RegistryError> {
        self.command(CommandAction::Cancel, enclosure_id)
    }

    pub fn retry(&self, enclosure_id: u64) -> Result<EngineCommand, RegistryError> {
        self.command(CommandAction::Retry, enclosure_id)
    }

    fn command(
        &self,
        action: CommandAction,
        enclosure_id: u64,
    ) -> Result<EngineCommand, RegistryError> {
        let item = self.get(enclosure_id).ok_or(RegistryError::NotFound(enclosure_id))?;

        let command = EngineCommand {
            action,
            enclosure_id,
            file_name: format::display_name(&item),
            url: item.url,
        };

        info!(enclosure_id, ?action, "Forwarding download command to engine");
        let _ = self.events.send(HubEvent::Command(command.clone()));
        Ok(command)
    }

    pub fn remove(&self, enclosure_id: u64) -> Result<DownloadItem, RegistryError> {
        let mut registry = self.registry.write();
        let item = registry.remove(enclosure_id)?;

        if let Some(db) = &self.history {
            if let Err(e) = db.delete_download(enclosure_id) {
                error!(enclosure_id, "Failed to delete download: {}", e);
            }
        }

        let _ = self.events.send(HubEvent::DownloadRemoved { enclosure_id });
        Ok(item)
    }

    pub fn clear_completed(&self) -> Vec<u64> {
        let mut registry = self.registry.write();
        let removed = registry.clear_completed();

        if let Some(db) = &self.history {
            if let Err(e) = db.delete_downloads(&removed) {
                error!("Failed to delete completed downloads: {}", e);
            }
        }

        let _ = self.events.send(HubEvent::DownloadsCleared {
            removed: removed.clone(),
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::DownloadStatus;

    #[tokio::test]
    async fn sync_mutations_are_published() {
        let events = event_channel(16);
        let mut rx = events.subscribe();
        let hub = SyncHub::new(SyncCoordinator::new(), events);

        hub.start_sync();
        hub.set_current_stage(SyncStage::Categories);

        match rx.recv().await.unwrap() {
            HubEvent::Sync(snapshot) => assert!(snapshot.state.syncing),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            HubEvent::Sync(snapshot) => {
                assert_eq!(snapshot.state.current_stage, SyncStage::Categories);
                assert_eq!(snapshot.status_text, "Syncing categories...");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn completion_publishes_one_notification() {
        let events = event_channel(16);
        let mut rx = events.subscribe();
        let hub = DownloadHub::new(DownloadRegistry::new(), events);

        let done = ProgressEvent::new(9, DownloadStatus::Completed).with_file_name("a.mp3");
        hub.apply(done.clone());
        hub.apply(done);

        let mut notifications = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, HubEvent::Notify(_)) {
                notifications += 1;
            }
        }
        assert_eq!(notifications, 1);
    }

    #[tokio::test]
    async fn cancel_publishes_command_without_mutating() {
        let events = event_channel(16);
        let hub = DownloadHub::new(DownloadRegistry::new(), events.clone());
        hub.apply(
            ProgressEvent::new(4, DownloadStatus::Downloading)
                .with_url("https://example.com/a.mp3"),
        );

        let mut rx = events.subscribe();
        let command = hub.cancel(4).unwrap();
        assert_eq!(command.action, CommandAction::Cancel);
        assert_eq!(command.file_name, "a.mp3");
        assert_eq!(hub.get(4).unwrap().status, DownloadStatus::Downloading);
        assert!(matches!(rx.recv().await.unwrap(), HubEvent::Command(_)));

        assert_eq!(hub.retry(99).unwrap_err(), RegistryError::NotFound(99));
    }

    #[test]
    fn unknown_status_leaves_registry_untouched() {
        let hub = DownloadHub::new(DownloadRegistry::new(), event_channel(4));
        let raw: RawProgressEvent = serde_json::from_value(serde_json::json!({
            "enclosure_id": 1,
            "status": "exploded"
        }))
        .unwrap();

        assert!(hub.apply_raw(raw).is_err());
        assert!(hub.snapshot().items.is_empty());
    }

    #[test]
    fn hub_event_is_tagged() {
        let value = serde_json::to_value(HubEvent::DownloadRemoved { enclosure_id: 3 }).unwrap();
        assert_eq!(value["type"], "download_removed");
        assert_eq!(value["enclosure_id"], 3);
    }
}
