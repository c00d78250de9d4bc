//! Flux Progress - sync and download progress tracking for a Miniflux reader
//!
//! Two independent state trackers driven by external collaborators:
//! the [`sync::SyncCoordinator`] follows a sync run through its stages,
//! and the [`download::DownloadRegistry`] folds download engine events
//! into per-item state. Both are plain state containers; [`hub`] shares
//! them and publishes changes, [`server`] exposes them over HTTP.

pub mod config;
pub mod db;
pub mod download;
pub mod error;
pub mod format;
pub mod hub;
pub mod server;
pub mod sync;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::Settings;
use crate::db::Database;
use crate::download::DownloadRegistry;
use crate::hub::{DownloadHub, HubEvent, SyncHub};
use crate::sync::SyncCoordinator;

/// Application state shared across all components
pub struct AppState {
    pub settings: Settings,
    pub sync: SyncHub,
    pub downloads: DownloadHub,
    events: broadcast::Sender<HubEvent>,
}

impl AppState {
    /// Build the trackers, restoring history from `db` when given.
    ///
    /// A history store that fails to load is logged and skipped; the
    /// trackers then start empty.
    pub fn new(settings: Settings, db: Option<Database>) -> Self {
        let events = hub::event_channel(settings.events.channel_capacity);

        let last_synced_at = match &db {
            Some(db) => db.load_last_synced_at().unwrap_or_else(|e| {
                error!("Failed to load last sync time: {}", e);
                None
            }),
            None => None,
        };

        let mut sync = SyncHub::new(
            SyncCoordinator::with_last_synced_at(last_synced_at),
            events.clone(),
        );
        let mut downloads = DownloadHub::new(
            DownloadRegistry::with_sample_interval(settings.downloads.speed_sample_interval()),
            events.clone(),
        );

        if let Some(db) = db {
            sync = sync.with_history(db.clone());

            if settings.downloads.persist_history {
                match db.load_history() {
                    Ok(history) => {
                        downloads.hydrate(history);
                    }
                    Err(e) => error!("Failed to load download history: {}", e),
                }
                downloads = downloads.with_history(db);
            }
        }

        info!("Progress trackers ready");

        Self {
            settings,
            sync,
            downloads,
            events,
        }
    }

    /// Subscribe to every published change
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }
}
