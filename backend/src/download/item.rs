//! Download item model and the inbound progress event

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EventError;

/// Download status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses that surface a one-shot notification on first arrival
    pub fn is_notifiable(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloading" => Ok(Self::Downloading),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EventError::UnknownStatus(other.to_string())),
        }
    }
}

/// One tracked download, keyed by the enclosure it fetches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadItem {
    pub enclosure_id: u64,
    pub url: String,
    pub file_name: String,
    pub status: DownloadStatus,
    /// 0-100, as reported by the engine
    pub progress: u8,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    #[serde(default)]
    pub file_path: Option<String>,
    /// Only present while `status` is `Failed`
    #[serde(default)]
    pub error: Option<String>,
    /// Bytes per second, derived from progress samples
    #[serde(default)]
    pub speed: Option<f64>,
}

impl DownloadItem {
    /// Build a fresh item from the first event seen for its id
    pub fn from_event(event: &ProgressEvent) -> Self {
        Self {
            enclosure_id: event.enclosure_id,
            url: event.url.clone().unwrap_or_default(),
            file_name: event.file_name.clone().unwrap_or_default(),
            status: event.status,
            progress: event.progress,
            downloaded_bytes: event.downloaded_bytes,
            total_bytes: event.total_bytes,
            file_path: event.file_path.clone(),
            error: match event.status {
                DownloadStatus::Failed => event.error.clone(),
                _ => None,
            },
            speed: Some(0.0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == DownloadStatus::Downloading
    }
}

/// Progress event as pushed by the download engine.
///
/// Accepts both snake_case and camelCase field names. Missing and empty
/// strings both mean "not provided".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProgressEvent {
    #[serde(alias = "enclosureId")]
    pub enclosure_id: u64,
    #[serde(default, alias = "fileName")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub progress: u32,
    #[serde(default, alias = "downloadedBytes")]
    pub downloaded_bytes: u64,
    #[serde(default, alias = "totalBytes")]
    pub total_bytes: u64,
    pub status: String,
    #[serde(default, alias = "filePath")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A validated progress event
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub enclosure_id: u64,
    pub file_name: Option<String>,
    pub url: Option<String>,
    pub progress: u8,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub status: DownloadStatus,
    pub file_path: Option<String>,
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn new(enclosure_id: u64, status: DownloadStatus) -> Self {
        Self {
            enclosure_id,
            file_name: None,
            url: None,
            progress: 0,
            downloaded_bytes: 0,
            total_bytes: 0,
            status,
            file_path: None,
            error: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = provided(Some(file_name.into()));
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = provided(Some(url.into()));
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    pub fn with_bytes(mut self, downloaded_bytes: u64, total_bytes: u64) -> Self {
        self.downloaded_bytes = downloaded_bytes;
        self.total_bytes = total_bytes;
        self
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = provided(Some(file_path.into()));
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = provided(Some(error.into()));
        self
    }
}

impl TryFrom<RawProgressEvent> for ProgressEvent {
    type Error = EventError;

    fn try_from(raw: RawProgressEvent) -> Result<Self, Self::Error> {
        let status = raw.status.parse()?;

        Ok(Self {
            enclosure_id: raw.enclosure_id,
            file_name: provided(raw.file_name),
            url: provided(raw.url),
            progress: raw.progress.min(100) as u8,
            downloaded_bytes: raw.downloaded_bytes,
            total_bytes: raw.total_bytes,
            status,
            file_path: provided(raw.file_path),
            error: provided(raw.error),
        })
    }
}

fn provided(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
