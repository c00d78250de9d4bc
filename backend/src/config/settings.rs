//! Settings data structures

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Download tracking
    #[serde(default)]
    pub downloads: DownloadSettings,

    /// Change feed
    #[serde(default)]
    pub events: EventSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerSettings::default(),
            downloads: DownloadSettings::default(),
            events: EventSettings::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to; the reader frontend runs on the same machine
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8788,
        }
    }
}

/// Download tracking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Minimum time between two samples used for a speed reading
    pub speed_sample_interval_ms: u64,

    /// Whether download history is kept in the database
    pub persist_history: bool,
}

impl DownloadSettings {
    pub fn speed_sample_interval(&self) -> Duration {
        Duration::from_millis(self.speed_sample_interval_ms)
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            speed_sample_interval_ms: 500,
            persist_history: true,
        }
    }
}

/// Change feed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSettings {
    /// Messages buffered per subscriber before it starts lagging
    pub channel_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}
