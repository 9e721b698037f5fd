//! Active-window scheduling across poll cycles.
//!
//! Each room carries an *active window*: entries accepted as pending but not
//! yet fired. Every cycle merges the freshly built timelines into the windows
//! and fires whatever has come due. The windows are the only state that
//! outlives a cycle; everything here is a pure function of
//! `(candidates, previous windows, now)`.

use crate::error::Result;
use crate::timeline::{EntryKind, TimelineEntry, Timelines};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Pending entries per room, persisted by the host between cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveWindows(BTreeMap<String, Vec<TimelineEntry>>);

impl ActiveWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room: &str) -> Option<&[TimelineEntry]> {
        self.0.get(room).map(Vec::as_slice)
    }

    pub fn insert(&mut self, room: impl Into<String>, entries: Vec<TimelineEntry>) {
        self.0.insert(room.into(), entries);
    }

    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TimelineEntry])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of rooms with a window (including emptied ones).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total pending entries over all rooms.
    pub fn pending(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl From<BTreeMap<String, Vec<TimelineEntry>>> for ActiveWindows {
    fn from(map: BTreeMap<String, Vec<TimelineEntry>>) -> Self {
        Self(map)
    }
}

/// A command due to be dispatched.
///
/// Its `Display` form, `<subject>/command/<room>/<command><type>`, is the
/// payload handed to the device dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiredCommand {
    pub subject: String,
    pub room: String,
    pub command: String,
    pub kind: EntryKind,
    pub time: DateTime<Utc>,
}

impl From<&TimelineEntry> for FiredCommand {
    fn from(entry: &TimelineEntry) -> Self {
        Self {
            subject: entry.subject.clone(),
            room: entry.room.clone(),
            command: entry.command.clone(),
            kind: entry.kind,
            time: entry.time,
        }
    }
}

impl fmt::Display for FiredCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/command/{}/{}{}",
            self.subject, self.room, self.command, self.kind
        )
    }
}

/// Result of one scheduling decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Windows to persist for the next cycle.
    pub active: ActiveWindows,
    /// Commands to dispatch now, one per room at most.
    pub fired: Vec<FiredCommand>,
}

/// Merge fresh candidates into the previous windows, then fire due entries.
pub fn calculate_active(
    candidates: &Timelines,
    previous: &ActiveWindows,
    now: DateTime<Utc>,
) -> Schedule {
    let mut active = merge_candidates(candidates, previous);
    let fired = fire_due(&mut active, now);
    Schedule { active, fired }
}

/// Merge candidates room by room.
///
/// For a room with an existing window, entries at or after the earliest
/// candidate are discarded (the calendar supersedes them) before the
/// candidates are appended. Rooms without candidates keep their window as is.
pub fn merge_candidates(candidates: &Timelines, previous: &ActiveWindows) -> ActiveWindows {
    let mut merged = previous.0.clone();

    for (room, entries) in candidates {
        let Some(cutoff) = entries.first().map(|e| e.time) else {
            continue;
        };
        let window = merged.entry(room.clone()).or_default();
        let keep = window.iter().position(|e| e.time >= cutoff).unwrap_or(window.len());
        if keep < window.len() {
            debug!(room = %room, dropped = window.len() - keep, "superseded pending entries");
        }
        window.truncate(keep);
        window.extend(entries.iter().cloned());
    }

    ActiveWindows(merged)
}

/// Fire at most one command per room.
///
/// The latest entry with `time <= now` fires; it and every entry before it are
/// removed from the window.
pub fn fire_due(active: &mut ActiveWindows, now: DateTime<Utc>) -> Vec<FiredCommand> {
    let mut fired = Vec::new();

    for (room, window) in active.0.iter_mut() {
        let Some(due) = window.iter().rposition(|e| e.time <= now) else {
            continue;
        };
        let command = FiredCommand::from(&window[due]);
        if due > 0 {
            debug!(room = %room, skipped = due, "collapsed earlier due entries");
        }
        window.drain(..=due);
        info!(command = %command, at = %command.time, "firing command");
        fired.push(command);
    }

    fired
}
