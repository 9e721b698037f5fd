//! The schedulable projection of a calendar event.

use crate::parser::RawCalendarEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single command window: run `command` in `room` from `start` to `end`.
///
/// Recurring events produce one `SimpleEvent` per occurrence, all sharing the
/// same `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleEvent {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Taken from `LOCATION`; empty when absent.
    pub room: String,
    /// Taken from `DESCRIPTION`; empty when absent.
    pub command: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl SimpleEvent {
    /// Project a raw event through the fixed property mapping.
    pub fn from_raw(raw: &RawCalendarEvent) -> Self {
        Self {
            id: raw.get("uid").map(|s| s.trim().to_string()),
            title: raw.get("summary").map(|s| s.trim().to_string()),
            room: raw.get("location").map(str::trim).unwrap_or_default().to_string(),
            command: raw
                .get("description")
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            start: raw.time("dtstart"),
            end: raw.time("dtend"),
            updated: raw.time("dtstamp"),
        }
    }

    /// Copy of this event moved to start at `start`, keeping its duration.
    pub fn at_occurrence(&self, start: DateTime<Utc>) -> Self {
        let end = match (self.start, self.end) {
            (Some(s), Some(e)) => Some(start + (e - s)),
            _ => None,
        };
        Self {
            start: Some(start),
            end,
            ..self.clone()
        }
    }
}
