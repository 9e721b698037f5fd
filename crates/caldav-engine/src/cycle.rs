//! One poll cycle: fetch -> parse -> expand -> build -> schedule.
//!
//! [`run_cycle`] is the pure form. [`Poller`] owns the active windows for one
//! calendar source and commits a cycle's result only once every stage has
//! succeeded, so a failed cycle never leaves partial state behind.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::parser::parse_calendar;
use crate::recurrence::expand_events;
use crate::scheduler::{calculate_active, ActiveWindows, FiredCommand};
use crate::timeline::{build_timelines, Timelines};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Where calendar documents come from.
pub trait CalendarSource {
    /// Fetch the current calendar document.
    ///
    /// # Errors
    /// Implementations should return `EngineError::SourceFetch` when the
    /// source is unreachable or the payload is unusable.
    fn fetch(&mut self) -> Result<String>;
}

/// A fixed in-memory document.
impl CalendarSource for String {
    fn fetch(&mut self) -> Result<String> {
        Ok(self.clone())
    }
}

/// Everything a successful cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    /// Commands to dispatch, in room order.
    pub fired: Vec<FiredCommand>,
    /// The timelines built from this cycle's document.
    pub timelines: Timelines,
    /// The active windows to persist.
    pub active: ActiveWindows,
    /// Number of schedulable events after expansion.
    pub events: usize,
}

/// Parse, expand and build timelines for a document.
pub fn build_cycle_timelines(
    body: &str,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<(Timelines, usize)> {
    let offset = config.resolve_offset(now)?;
    let (after, before) = config.lookahead(now)?;
    let raw = parse_calendar(body, offset)?;
    let events = expand_events(&raw, after, before, offset)?;
    Ok((build_timelines(&events), events.len()))
}

/// Run a whole cycle against `previous` without touching it.
pub fn run_cycle(
    body: &str,
    previous: &ActiveWindows,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<CycleOutcome> {
    let (timelines, events) = build_cycle_timelines(body, now, config)?;
    let schedule = calculate_active(&timelines, previous, now);
    debug!(
        events,
        rooms = timelines.len(),
        fired = schedule.fired.len(),
        pending = schedule.active.pending(),
        "cycle complete"
    );
    Ok(CycleOutcome {
        fired: schedule.fired,
        timelines,
        active: schedule.active,
        events,
    })
}

/// Drives cycles for one calendar source.
///
/// Taking `&mut self` per poll means two cycles can never overlap on the same
/// windows.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    config: EngineConfig,
    active: ActiveWindows,
}

impl Poller {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_state(config, ActiveWindows::new())
    }

    /// Resume from previously persisted windows.
    pub fn with_state(config: EngineConfig, active: ActiveWindows) -> Self {
        Self { config, active }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn active(&self) -> &ActiveWindows {
        &self.active
    }

    pub fn into_active(self) -> ActiveWindows {
        self.active
    }

    /// Fetch a document from `source` and run a cycle on it.
    ///
    /// On error the active windows are unchanged.
    pub fn poll<S: CalendarSource + ?Sized>(
        &mut self,
        source: &mut S,
        now: DateTime<Utc>,
    ) -> Result<Vec<FiredCommand>> {
        let body = source.fetch().map_err(|e| match e {
            EngineError::SourceFetch(_) => e,
            other => EngineError::SourceFetch(other.to_string()),
        });
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "calendar fetch failed; keeping active windows");
                return Err(e);
            }
        };
        self.run(&body, now)
    }

    /// Run a cycle on an already fetched document.
    pub fn run(&mut self, body: &str, now: DateTime<Utc>) -> Result<Vec<FiredCommand>> {
        match run_cycle(body, &self.active, now, &self.config) {
            Ok(outcome) => {
                self.active = outcome.active;
                Ok(outcome.fired)
            }
            Err(e) => {
                warn!(error = %e, "cycle aborted; keeping active windows");
                Err(e)
            }
        }
    }
}
