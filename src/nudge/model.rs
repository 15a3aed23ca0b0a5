use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Oldest entries are evicted once the history grows past this.
pub const HISTORY_CAP: usize = 50;

const DEFAULT_INTERVAL_HOURS: u32 = 5;
const DEFAULT_MESSAGE: &str = "hi";

/// User-editable settings. The interval is captured into the countdown at
/// start time, so edits here never shorten or stretch a cycle already in
/// flight; the message and the two sink flags are read live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NudgeConfig {
    pub interval_hours: u32,
    pub interval_minutes: u32,
    pub message: String,
    pub notifications_enabled: bool,
    pub sound_enabled: bool,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            interval_hours: DEFAULT_INTERVAL_HOURS,
            interval_minutes: 0,
            message: DEFAULT_MESSAGE.to_string(),
            notifications_enabled: true,
            sound_enabled: true,
        }
    }
}

impl NudgeConfig {
    /// Widened before multiplying so extreme hour counts cannot overflow.
    pub fn interval_seconds(&self) -> u64 {
        u64::from(self.interval_hours) * 3600 + u64::from(self.interval_minutes) * 60
    }
}

/// One past firing, formatted for display in local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub time: String,
    pub date: String,
    pub message: String,
}

impl HistoryEntry {
    pub fn record(fired_at: DateTime<Utc>, message: &str) -> Self {
        let local = fired_at.with_timezone(&Local);
        Self {
            time: local.format("%H:%M:%S").to_string(),
            date: local.format("%Y-%m-%d").to_string(),
            message: message.to_string(),
        }
    }
}

/// Bounded record of past firings, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NudgeHistory {
    entries: Vec<HistoryEntry>,
}

impl NudgeHistory {
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(HISTORY_CAP);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Persisted document, written after every state transition and read once at
/// startup. Field names match the stored key-value shape; every field falls
/// back to its default so a partial document still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub running: bool,
    /// Epoch milliseconds of the current deadline; `null` when stopped.
    pub target_time: Option<i64>,
    pub total_seconds: u64,
    pub interval_hours: u32,
    pub interval_minutes: u32,
    pub nudge_message: String,
    pub notifications_enabled: bool,
    pub sound_enabled: bool,
    pub history: NudgeHistory,
}

impl Default for Snapshot {
    fn default() -> Self {
        let config = NudgeConfig::default();
        Self {
            running: false,
            target_time: None,
            total_seconds: 0,
            interval_hours: config.interval_hours,
            interval_minutes: config.interval_minutes,
            nudge_message: config.message,
            notifications_enabled: config.notifications_enabled,
            sound_enabled: config.sound_enabled,
            history: NudgeHistory::default(),
        }
    }
}

impl Snapshot {
    pub fn config(&self) -> NudgeConfig {
        NudgeConfig {
            interval_hours: self.interval_hours,
            interval_minutes: self.interval_minutes,
            message: self.nudge_message.clone(),
            notifications_enabled: self.notifications_enabled,
            sound_enabled: self.sound_enabled,
        }
    }
}
