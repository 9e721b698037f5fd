//! Engine configuration.
//!
//! All fields are optional in serialized form; missing values fall back to
//! the defaults below so an empty config file is a valid config.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Duration, FixedOffset, Local, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Default poll interval: 5 minutes.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 300_000;

/// Default lookahead window in hours.
pub const DEFAULT_LOOKAHEAD_HOURS: u32 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Milliseconds between poll cycles.
    pub poll_interval_ms: u64,
    /// Hours after `now` within which occurrences are materialized.
    pub lookahead_hours: u32,
    /// Fixed offset applied to floating calendar times, e.g. `+10:00`.
    pub utc_offset: Option<String>,
    /// IANA zone used to derive the offset when `utc_offset` is unset.
    pub timezone: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            lookahead_hours: DEFAULT_LOOKAHEAD_HOURS,
            utc_offset: None,
            timezone: None,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    /// The `[after, before]` lookahead window starting at `now`.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidConfig` if the window end is past the last
    /// representable date.
    pub fn lookahead(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let hours = self.lookahead_hours;
        let before = Duration::try_hours(i64::from(hours))
            .and_then(|span| now.checked_add_signed(span))
            .ok_or_else(|| {
                EngineError::InvalidConfig(format!("lookahead_hours {} is out of range", hours))
            })?;
        Ok((now, before))
    }

    /// Resolve the fixed offset used for this cycle.
    ///
    /// Precedence: explicit `utc_offset`, then `timezone` evaluated at `now`,
    /// then the host machine's local offset at `now`.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidTimezone` if either setting is unparseable.
    pub fn resolve_offset(&self, now: DateTime<Utc>) -> Result<FixedOffset> {
        if let Some(raw) = &self.utc_offset {
            return parse_utc_offset(raw);
        }
        let naive = now.naive_utc();
        if let Some(name) = &self.timezone {
            let tz: chrono_tz::Tz = name
                .parse()
                .map_err(|_| EngineError::InvalidTimezone(name.clone()))?;
            return Ok(tz.offset_from_utc_datetime(&naive).fix());
        }
        Ok(Local.offset_from_utc_datetime(&naive).fix())
    }
}

/// Parse `+HH:MM`, `-HHMM`, `Z` or `UTC` into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let invalid = || EngineError::InvalidTimezone(raw.to_string());
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }

    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'+') => (1, &trimmed[1..]),
        Some(b'-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
