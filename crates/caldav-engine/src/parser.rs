//! iCalendar text -> raw event records.
//!
//! Parsing runs in two phases. The first pass scans the document for
//! `BEGIN:VEVENT` / `END:VEVENT` blocks and collects each block's properties
//! as lower-cased name -> raw text. The second pass resolves every `dt*`
//! property into an absolute timestamp using the cycle's fixed UTC offset.
//!
//! Only the subset of RFC 5545 needed to drive command windows is handled:
//! folded lines are unfolded, nested components such as `VALARM` are skipped,
//! and `TZID` parameters are ignored in favour of the fixed offset.

use crate::error::{EngineError, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use tracing::debug;

const BEGIN_EVENT: &str = "BEGIN:VEVENT";
const END_EVENT: &str = "END:VEVENT";

/// One `VEVENT` block with its date-time properties resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCalendarEvent {
    properties: BTreeMap<String, String>,
    times: BTreeMap<String, DateTime<Utc>>,
}

impl RawCalendarEvent {
    /// Raw text of a property, looked up by its lower-cased name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Parsed timestamp of a `dt*` property, keyed by the name without parameters.
    pub fn time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.times.get(name).copied()
    }

    /// Original text of a parsed `dt*` property (stored as `<name>_orig`).
    pub fn original(&self, name: &str) -> Option<&str> {
        self.get(&format!("{}_orig", name))
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn rrule(&self) -> Option<&str> {
        self.get("rrule").map(str::trim).filter(|r| !r.is_empty())
    }
}

/// Parse a calendar document into raw events.
///
/// # Errors
/// Returns `EngineError::Parse` for an unterminated or nested `VEVENT` block and
/// `EngineError::InvalidDateTime` when a `dt*` property is not a date-time.
pub fn parse_calendar(text: &str, offset: FixedOffset) -> Result<Vec<RawCalendarEvent>> {
    let blocks = scan_blocks(text)?;
    let events = blocks
        .into_iter()
        .map(|fields| resolve_times(fields, offset))
        .collect::<Result<Vec<_>>>()?;
    debug!(events = events.len(), "parsed calendar document");
    Ok(events)
}

/// First pass: collect the property map of every `VEVENT` block.
fn scan_blocks(text: &str) -> Result<Vec<BTreeMap<String, String>>> {
    let mut blocks = Vec::new();
    let mut current: Option<BTreeMap<String, String>> = None;
    let mut nested = 0usize;
    let mut opened_at = 0usize;

    for (line_no, line) in unfold(text) {
        let in_event = current.is_some();

        if line.eq_ignore_ascii_case(BEGIN_EVENT) {
            if in_event {
                return Err(EngineError::Parse {
                    line: line_no,
                    message: format!("VEVENT opened at line {} was never closed", opened_at),
                });
            }
            current = Some(BTreeMap::new());
            opened_at = line_no;
            continue;
        }

        if line.eq_ignore_ascii_case(END_EVENT) {
            match current.take() {
                Some(_) if nested > 0 => {
                    return Err(EngineError::Parse {
                        line: line_no,
                        message: "END:VEVENT inside an unclosed nested component".to_string(),
                    });
                }
                Some(fields) => blocks.push(fields),
                None => {}
            }
            continue;
        }

        let Some(fields) = current.as_mut() else {
            continue;
        };

        let upper = line.to_ascii_uppercase();
        if upper.starts_with("BEGIN:") {
            nested += 1;
            continue;
        }
        if upper.starts_with("END:") && nested > 0 {
            nested -= 1;
            continue;
        }
        if nested > 0 {
            continue;
        }

        if let Some((name, value)) = line.split_once(':') {
            let name = name.to_lowercase();
            // EXDATE may repeat; every other property keeps its last value.
            match fields.get_mut(&name) {
                Some(existing) if name.split(';').next() == Some("exdate") => {
                    existing.push(',');
                    existing.push_str(value);
                }
                _ => {
                    fields.insert(name, value.to_string());
                }
            }
        }
    }

    if current.is_some() {
        return Err(EngineError::Parse {
            line: opened_at,
            message: "VEVENT block is not terminated by END:VEVENT".to_string(),
        });
    }

    Ok(blocks)
}

/// Split into logical lines, joining RFC 5545 continuation lines.
///
/// Yields the 1-based number of the physical line each logical line starts on.
fn unfold(text: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    for (idx, raw) in text.split('\n').enumerate() {
        let physical = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = physical
            .strip_prefix(' ')
            .or_else(|| physical.strip_prefix('\t'))
        {
            if let Some((_, last)) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        lines.push((idx + 1, physical.to_string()));
    }
    lines
}

/// Second pass: parse every `dt*` property into a timestamp.
fn resolve_times(
    mut properties: BTreeMap<String, String>,
    offset: FixedOffset,
) -> Result<RawCalendarEvent> {
    let mut times = BTreeMap::new();
    let mut originals = Vec::new();

    for (name, value) in &properties {
        if !name.starts_with("dt") || name.ends_with("_orig") {
            continue;
        }
        let bare = name.split(';').next().unwrap_or(name.as_str()).to_string();
        let parsed =
            parse_date_time(value, offset).ok_or_else(|| EngineError::InvalidDateTime {
                property: name.clone(),
                value: value.clone(),
            })?;
        times.insert(bare.clone(), parsed);
        originals.push((format!("{}_orig", bare), value.clone()));
    }

    properties.extend(originals);
    Ok(RawCalendarEvent { properties, times })
}

/// Parse `YYYYMMDDTHHMMSS` (local), `YYYYMMDDTHHMMSSZ` (UTC) or `YYYYMMDD`
/// (local midnight).
pub fn parse_date_time(text: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let text = text.trim();
    let (text, is_utc) = match text.strip_suffix('Z').or_else(|| text.strip_suffix('z')) {
        Some(rest) => (rest, true),
        None => (text, false),
    };

    let naive = match text.len() {
        8 => parse_date(text)?.and_hms_opt(0, 0, 0)?,
        15 if text.as_bytes()[8].eq_ignore_ascii_case(&b'T') => {
            let date = parse_date(&text[..8])?;
            let time = &text[9..];
            let hour = digits(time, 0, 2)?;
            let minute = digits(time, 2, 4)?;
            let second = digits(time, 4, 6)?;
            date.and_hms_opt(hour, minute, second)?
        }
        _ => return None,
    };

    if is_utc {
        Some(Utc.from_utc_datetime(&naive))
    } else {
        local_to_utc(naive, offset)
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let year = digits(text, 0, 4)?;
    let month = digits(text, 4, 6)?;
    let day = digits(text, 6, 8)?;
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
}

fn digits(text: &str, from: usize, to: usize) -> Option<u32> {
    let slice = text.get(from..to)?;
    if !slice.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    slice.parse().ok()
}

fn local_to_utc(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
