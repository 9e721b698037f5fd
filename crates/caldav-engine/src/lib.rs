//! # caldav-engine
//!
//! Turns calendar "command windows" into fire-once device commands.
//!
//! A calendar event such as *AirCon / bedroom / Cool, 08:45-19:30* becomes a
//! `start` command at 08:45 and an `end` command at 19:30. The engine is polled
//! periodically: every cycle re-reads the calendar, rebuilds per-room
//! timelines, and fires whatever has come due without re-firing anything it
//! already fired.
//!
//! ## Modules
//!
//! - [`parser`] -- iCalendar text to raw `VEVENT` records
//! - [`recurrence`] -- RRULE expansion into a lookahead window
//! - [`event`] -- the schedulable `SimpleEvent` projection
//! - [`timeline`] -- per-room, deduplicated, optimised start/end entries
//! - [`scheduler`] -- active windows carried across cycles, firing policy
//! - [`cycle`] -- one poll cycle end to end, and the `Poller` that owns state
//! - [`config`] -- poll interval, lookahead and offset settings
//! - [`error`] -- Error types
//!
//! ## Quick start
//!
//! ```rust
//! use caldav_engine::{EngineConfig, Poller};
//! use chrono::{TimeZone, Utc};
//!
//! let calendar = "BEGIN:VEVENT\n\
//!                 UID:1\n\
//!                 SUMMARY:AirCon\n\
//!                 LOCATION:bedroom\n\
//!                 DESCRIPTION:Cool\n\
//!                 DTSTART:20170206T084500Z\n\
//!                 DTEND:20170206T193000Z\n\
//!                 END:VEVENT\n";
//!
//! let mut poller = Poller::new(EngineConfig::default());
//! let now = Utc.with_ymd_and_hms(2017, 2, 6, 8, 0, 0).unwrap();
//! assert!(poller.run(calendar, now).unwrap().is_empty());
//!
//! let later = Utc.with_ymd_and_hms(2017, 2, 6, 8, 50, 0).unwrap();
//! let fired = poller.run(calendar, later).unwrap();
//! assert_eq!(fired[0].to_string(), "aircon/command/bedroom/coolstart");
//! ```

pub mod config;
pub mod cycle;
pub mod error;
pub mod event;
pub mod parser;
pub mod recurrence;
pub mod scheduler;
pub mod timeline;

pub use config::EngineConfig;
pub use cycle::{run_cycle, CalendarSource, CycleOutcome, Poller};
pub use error::EngineError;
pub use event::SimpleEvent;
pub use parser::{parse_calendar, RawCalendarEvent};
pub use recurrence::{expand_event, expand_events};
pub use scheduler::{calculate_active, ActiveWindows, FiredCommand, Schedule};
pub use timeline::{build_timelines, EntryKind, RoomTimeline, TimelineEntry, Timelines};
