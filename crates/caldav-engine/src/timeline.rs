//! Per-room timelines of start/end command entries.
//!
//! A timeline is rebuilt from scratch every cycle:
//!
//! 1. each complete event yields a `start` and an `end` entry,
//! 2. entries are appended to their room unless an equal entry is present,
//! 3. each room is sorted by time (stable, so ties keep insertion order),
//! 4. runs of same-command entries are collapsed ([`optimise`]),
//! 5. `end` entries coinciding with their predecessor are dropped
//!    ([`remove_conflicts`]).

use crate::event::SimpleEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Which boundary of a command window an entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Start,
    End,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Start => "start",
            EntryKind::End => "end",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One schedulable action. `command`, `room` and `subject` are lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub time: DateTime<Utc>,
    pub command: String,
    pub room: String,
    pub subject: String,
}

impl TimelineEntry {
    /// Two entries are duplicates when kind, command, instant and subject match.
    /// The room is implied by the timeline the entries live in.
    pub fn is_duplicate_of(&self, other: &TimelineEntry) -> bool {
        self.kind == other.kind
            && self.command == other.command
            && self.time == other.time
            && self.subject == other.subject
    }
}

/// Ordered entries of a single room.
pub type RoomTimeline = Vec<TimelineEntry>;

/// Timelines keyed by lower-cased room name.
pub type Timelines = BTreeMap<String, RoomTimeline>;

/// The start and end entries of a complete event, or `None` if the event lacks
/// a start, end, title, room or command.
pub fn window_entries(event: &SimpleEvent) -> Option<[TimelineEntry; 2]> {
    let start = event.start?;
    let end = event.end?;
    let subject = event.title.as_deref()?.to_lowercase();
    if event.room.is_empty() || event.command.is_empty() {
        return None;
    }
    let room = event.room.to_lowercase();
    let command = event.command.to_lowercase();

    let entry = |kind, time| TimelineEntry {
        kind,
        time,
        command: command.clone(),
        room: room.clone(),
        subject: subject.clone(),
    };
    Some([entry(EntryKind::Start, start), entry(EntryKind::End, end)])
}

/// Build one optimised timeline per room from a batch of events.
///
/// Incomplete events are skipped, not reported as errors.
pub fn build_timelines(events: &[SimpleEvent]) -> Timelines {
    let mut rooms: Timelines = BTreeMap::new();

    for event in events {
        let Some(entries) = window_entries(event) else {
            debug!(id = ?event.id, title = ?event.title, "skipping incomplete calendar event");
            continue;
        };
        for entry in entries {
            let room = rooms.entry(entry.room.clone()).or_default();
            if !room.iter().any(|existing| existing.is_duplicate_of(&entry)) {
                room.push(entry);
            }
        }
    }

    for (name, room) in rooms.iter_mut() {
        room.sort_by_key(|entry| entry.time);
        let before = room.len();
        *room = remove_conflicts(optimise(std::mem::take(room)));
        debug!(room = %name, entries = before, kept = room.len(), "built room timeline");
    }

    rooms
}

/// Collapse runs of consecutive entries sharing kind and command.
///
/// A run of starts keeps its first entry (the device is switched on once, at
/// the earliest time); a run of ends keeps its last (switched off at the
/// latest). Input must already be sorted by time.
pub fn optimise(entries: Vec<TimelineEntry>) -> Vec<TimelineEntry> {
    let mut optimised = Vec::with_capacity(entries.len());
    let mut run: Vec<TimelineEntry> = Vec::new();

    for entry in entries {
        let continues = run
            .last()
            .is_some_and(|last| last.kind == entry.kind && last.command == entry.command);
        if !continues {
            flush_run(&mut run, &mut optimised);
        }
        run.push(entry);
    }
    flush_run(&mut run, &mut optimised);

    optimised
}

fn flush_run(run: &mut Vec<TimelineEntry>, out: &mut Vec<TimelineEntry>) {
    let kept = match run.first().map(|e| e.kind) {
        Some(EntryKind::Start) => run.drain(..).next(),
        Some(EntryKind::End) => run.drain(..).last(),
        None => None,
    };
    out.extend(kept);
}

/// Drop every `end` entry whose time equals that of the entry before it.
pub fn remove_conflicts(entries: Vec<TimelineEntry>) -> Vec<TimelineEntry> {
    let mut kept = Vec::with_capacity(entries.len());
    let mut previous: Option<DateTime<Utc>> = None;

    for entry in entries {
        let time = entry.time;
        let coincides = previous == Some(time);
        if !(entry.kind == EntryKind::End && coincides) {
            kept.push(entry);
        }
        previous = Some(time);
    }

    kept
}
