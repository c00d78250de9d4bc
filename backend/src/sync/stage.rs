//! Sync stage model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EventError;

/// One phase of a sync run
///
/// Variants are declared in run order; the derived `Ord` is what stage
/// classification relies on. `Failed` sits last but is never compared
/// against the four working stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStage {
    #[default]
    Idle,
    Categories,
    Feeds,
    Entries,
    Cleanup,
    Completed,
    Failed,
}

impl SyncStage {
    /// The four working stages shown to the user, in order
    pub const WORKING: [SyncStage; 4] = [
        SyncStage::Categories,
        SyncStage::Feeds,
        SyncStage::Entries,
        SyncStage::Cleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Categories => "categories",
            Self::Feeds => "feeds",
            Self::Entries => "entries",
            Self::Cleanup => "cleanup",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the stage ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the stage is one of the four working stages
    pub fn is_working(&self) -> bool {
        Self::WORKING.contains(self)
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStage {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "categories" => Ok(Self::Categories),
            "feeds" => Ok(Self::Feeds),
            "entries" => Ok(Self::Entries),
            "cleanup" => Ok(Self::Cleanup),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(EventError::UnknownStage(other.to_string())),
        }
    }
}

/// How a working stage looks relative to the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Active,
    Completed,
    Pending,
    Error,
}
