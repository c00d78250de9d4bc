//! Presentation derivations: human-readable text computed from tracker state

use crate::download::DownloadItem;
use crate::sync::{StageStatus, SyncStage, SyncState};

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Name used when neither the engine nor the URL provides one
pub const FALLBACK_FILE_NAME: &str = "download.bin";

/// Format a byte count with a binary unit, e.g. `1.5 MB`
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", value, BYTE_UNITS[unit])
}

/// Format a transfer rate in bytes per second
pub fn format_speed(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return "0 B/s".to_string();
    }
    format!("{}/s", format_bytes(bytes_per_sec.round() as u64))
}

/// Overall progress of the run, 0-100.
///
/// Each working stage weighs a quarter; an active entries stage
/// contributes its own percentage of that quarter.
pub fn overall_percentage(state: &SyncState) -> u8 {
    if state.current_stage == SyncStage::Completed && state.error.is_none() {
        return 100;
    }

    let share = 100.0 / SyncStage::WORKING.len() as f64;
    let total: f64 = state
        .stage_statuses()
        .iter()
        .map(|entry| match (entry.stage, entry.status) {
            (_, StageStatus::Completed) => share,
            (SyncStage::Entries, StageStatus::Active) => state
                .entries_progress
                .map(|progress| share * f64::from(progress.percentage) / 100.0)
                .unwrap_or(0.0),
            _ => 0.0,
        })
        .sum();

    total.round().clamp(0.0, 100.0) as u8
}

/// One-line status for the sync indicator
pub fn sync_status_text(state: &SyncState) -> String {
    if let Some(error) = &state.error {
        return format!("Sync failed: {}", error);
    }

    if state.syncing {
        return match state.current_stage {
            SyncStage::Categories => "Syncing categories...".to_string(),
            SyncStage::Feeds => "Syncing feeds...".to_string(),
            SyncStage::Entries => match state.entries_progress {
                Some(progress) => format!(
                    "Syncing entries ({} of {})...",
                    progress.pulled, progress.total
                ),
                None => "Syncing entries...".to_string(),
            },
            SyncStage::Cleanup => "Cleaning up...".to_string(),
            _ => "Starting sync...".to_string(),
        };
    }

    if state.current_stage == SyncStage::Completed {
        return "Sync complete".to_string();
    }

    match state.last_synced_at {
        Some(at) => format!("Last synced {}", at.format("%Y-%m-%d %H:%M UTC")),
        None => "Never synced".to_string(),
    }
}

/// Detail line for one working stage
pub fn stage_description(stage: SyncStage, state: &SyncState) -> String {
    match stage {
        SyncStage::Categories => match state.categories_count {
            Some(n) => format!("{} {}", n, plural(n, "category", "categories")),
            None => "Categories".to_string(),
        },
        SyncStage::Feeds => match state.feeds_count {
            Some(n) => format!("{} {}", n, plural(n, "feed", "feeds")),
            None => "Feeds".to_string(),
        },
        SyncStage::Entries => match state.entries_progress {
            Some(progress) => format!(
                "{} / {} entries ({}%)",
                progress.pulled, progress.total, progress.percentage
            ),
            None => "Entries".to_string(),
        },
        SyncStage::Cleanup => "Removing stale items".to_string(),
        other => other.to_string(),
    }
}

fn plural<'a>(n: u64, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

/// File name to show for a download
pub fn display_name(item: &DownloadItem) -> String {
    if !item.file_name.is_empty() {
        return item.file_name.clone();
    }
    name_from_url(&item.url).unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Last non-empty path segment of a URL, percent-decoded
pub fn name_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;

    let decoded = urlencoding::decode(last)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last.to_string());

    Some(decoded)
}
