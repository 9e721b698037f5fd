//! Recurrence expansion -- raw events into concrete occurrences inside a
//! lookahead window.
//!
//! Wraps the `rrule` crate. Rules are expanded in local wall-clock time: the
//! event's `DTSTART`, `UNTIL` and `EXDATE` values are shifted by the cycle's
//! fixed offset and handed to `rrule` as if they were UTC, so `BYDAY`,
//! `BYHOUR` and friends see local days and hours. Occurrences are shifted back
//! to real UTC before the window check.

use crate::error::{EngineError, Result};
use crate::event::SimpleEvent;
use crate::parser::{parse_date_time, RawCalendarEvent};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use rrule::RRuleSet;
use tracing::{debug, warn};

/// Upper bound on occurrences materialized for one event in one window.
///
/// This is the largest limit `rrule` accepts; a minutely rule over a 48 hour
/// window stays well below it.
pub const MAX_OCCURRENCES: u16 = u16::MAX;

const ICAL_UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Expand every raw event of a batch. Fails on the first bad rule.
pub fn expand_events(
    events: &[RawCalendarEvent],
    after: DateTime<Utc>,
    before: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Vec<SimpleEvent>> {
    let mut expanded = Vec::new();
    for event in events {
        expanded.extend(expand_event(event, after, before, offset)?);
    }
    debug!(
        raw = events.len(),
        occurrences = expanded.len(),
        "expanded calendar events"
    );
    Ok(expanded)
}

/// Expand one raw event into the occurrences that fall inside the window.
///
/// - Without an `RRULE` the event is kept iff `after < DTSTART < before`.
/// - With an `RRULE` every occurrence in `[after, before]` (inclusive) becomes
///   one event that keeps the base event's duration. No occurrences means the
///   event is dropped.
///
/// At most [`MAX_OCCURRENCES`] occurrences are produced per event; anything
/// beyond that inside the window is dropped with a warning.
///
/// # Errors
/// Returns `EngineError::InvalidRule` if the rule cannot be parsed or the event
/// has a rule but no `DTSTART`.
pub fn expand_event(
    event: &RawCalendarEvent,
    after: DateTime<Utc>,
    before: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Vec<SimpleEvent>> {
    let base = SimpleEvent::from_raw(event);

    let Some(rule) = event.rrule() else {
        return Ok(match base.start {
            Some(start) if start > after && start < before => vec![base],
            _ => Vec::new(),
        });
    };

    let dtstart = event.time("dtstart").ok_or_else(|| {
        EngineError::InvalidRule(format!("RRULE without DTSTART: {}", rule))
    })?;
    let exdates = exdates(event, offset)?;
    let starts = occurrences_between(rule, dtstart, &exdates, after, before, offset)?;

    Ok(starts
        .into_iter()
        .map(|start| base.at_occurrence(start))
        .collect())
}

/// Occurrence start times of `rule` anchored at `dtstart`, inclusive of both
/// window bounds. The rule is evaluated in local time at `offset`.
pub fn occurrences_between(
    rule: &str,
    dtstart: DateTime<Utc>,
    exdates: &[DateTime<Utc>],
    after: DateTime<Utc>,
    before: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Vec<DateTime<Utc>>> {
    let rule = normalise_rule(rule, offset)?;

    let mut text = format!(
        "DTSTART:{}\nRRULE:{}",
        wall_clock(dtstart, offset)?,
        rule
    );
    if !exdates.is_empty() {
        let list = exdates
            .iter()
            .map(|d| wall_clock(*d, offset))
            .collect::<Result<Vec<_>>>()?;
        text.push_str(&format!("\nEXDATE:{}", list.join(",")));
    }

    let set: RRuleSet = text
        .parse()
        .map_err(|e| EngineError::InvalidRule(format!("{}: {}", rule, e)))?;

    // Widen by a second on each side so the bound check below alone decides
    // inclusivity.
    let slack = Duration::seconds(1);
    let local_after = shift(after - slack, offset, 1)?;
    let local_before = shift(before + slack, offset, 1)?;
    let result = set
        .after(local_after.with_timezone(&rrule::Tz::UTC))
        .before(local_before.with_timezone(&rrule::Tz::UTC))
        .all(MAX_OCCURRENCES);

    if result.limited {
        warn!(rule = %rule, limit = MAX_OCCURRENCES, "recurrence expansion truncated");
    }

    let mut starts = Vec::with_capacity(result.dates.len());
    for local in result.dates {
        let start = shift(local.with_timezone(&Utc), offset, -1)?;
        if start >= after && start <= before {
            starts.push(start);
        }
    }
    Ok(starts)
}

/// Move `dt` by the offset: `direction` 1 goes UTC -> wall clock, -1 back.
fn shift(dt: DateTime<Utc>, offset: FixedOffset, direction: i64) -> Result<DateTime<Utc>> {
    let seconds = i64::from(offset.local_minus_utc()) * direction;
    dt.checked_add_signed(Duration::seconds(seconds))
        .ok_or_else(|| EngineError::InvalidRule(format!("date out of range: {}", dt)))
}

/// Local wall-clock time of `dt`, formatted as a `Z` date-time for `rrule`.
fn wall_clock(dt: DateTime<Utc>, offset: FixedOffset) -> Result<String> {
    Ok(shift(dt, offset, 1)?.format(ICAL_UTC_FORMAT).to_string())
}

/// Rewrite `UNTIL` values as local wall-clock `Z` date-times.
fn normalise_rule(rule: &str, offset: FixedOffset) -> Result<String> {
    let rule = rule.trim();
    if rule.is_empty() {
        return Err(EngineError::InvalidRule("empty RRULE string".to_string()));
    }

    let parts = rule
        .split(';')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                let until = parse_date_time(value, offset)
                    .ok_or_else(|| EngineError::InvalidRule(format!("bad UNTIL in {}", rule)))?;
                Ok(format!("UNTIL={}", wall_clock(until, offset)?))
            }
            _ => Ok(part.to_string()),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(parts.join(";"))
}

/// `EXDATE` values of an event, resolved to UTC.
fn exdates(event: &RawCalendarEvent, offset: FixedOffset) -> Result<Vec<DateTime<Utc>>> {
    let mut dates = Vec::new();
    for (name, value) in event.properties() {
        if name.split(';').next() != Some("exdate") {
            continue;
        }
        for item in value.split(',').filter(|s| !s.trim().is_empty()) {
            let date = parse_date_time(item, offset).ok_or_else(|| {
                EngineError::InvalidRule(format!("bad EXDATE value {:?}", item))
            })?;
            dates.push(date);
        }
    }
    Ok(dates)
}
