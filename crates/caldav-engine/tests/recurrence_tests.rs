//! Tests for recurrence expansion into the lookahead window.

use caldav_engine::error::EngineError;
use caldav_engine::{expand_event, expand_events, parse_calendar, RawCalendarEvent};
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 2, day, hour, minute, 0).unwrap()
}

/// Helper: a single bedroom/Cool event with optional extra property lines.
fn event(start: &str, end: &str, extra: &str) -> RawCalendarEvent {
    let text = format!(
        "BEGIN:VEVENT\nUID:abc\nSUMMARY:AirCon\nLOCATION:bedroom\nDESCRIPTION:Cool\n\
         DTSTART:{}\nDTEND:{}\n{}END:VEVENT\n",
        start, end, extra
    );
    parse_calendar(&text, utc())
        .expect("fixture should parse")
        .remove(0)
}

// ---------------------------------------------------------------------------
// Non-recurring events: (after, before) exclusive
// ---------------------------------------------------------------------------

#[test]
fn single_event_inside_window_kept() {
    let raw = event("20170206T084500Z", "20170206T193000Z", "");
    let out = expand_event(&raw, at(6, 8, 0), at(7, 8, 0), utc()).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].start, Some(at(6, 8, 45)));
    assert_eq!(out[0].end, Some(at(6, 19, 30)));
    assert_eq!(out[0].room, "bedroom");
    assert_eq!(out[0].command, "Cool");
}

#[test]
fn single_event_on_window_bounds_dropped() {
    let raw = event("20170206T084500Z", "20170206T193000Z", "");
    assert!(expand_event(&raw, at(6, 8, 45), at(7, 8, 0), utc())
        .unwrap()
        .is_empty());
    assert!(expand_event(&raw, at(5, 8, 0), at(6, 8, 45), utc())
        .unwrap()
        .is_empty());
}

#[test]
fn single_event_already_started_dropped() {
    let raw = event("20170206T084500Z", "20170206T193000Z", "");
    assert!(expand_event(&raw, at(6, 9, 0), at(7, 9, 0), utc())
        .unwrap()
        .is_empty());
}

// ---------------------------------------------------------------------------
// Recurring events: [after, before] inclusive
// ---------------------------------------------------------------------------

#[test]
fn daily_rule_yields_occurrences_in_window() {
    let raw = event("20170206T084500Z", "20170206T193000Z", "RRULE:FREQ=DAILY\n");
    let out = expand_event(&raw, at(6, 9, 0), at(8, 9, 0), utc()).unwrap();
    let starts: Vec<_> = out.iter().map(|e| e.start.unwrap()).collect();
    assert_eq!(starts, vec![at(7, 8, 45), at(8, 8, 45)]);
}

#[test]
fn occurrences_keep_base_duration() {
    let raw = event("20170206T084500Z", "20170206T193000Z", "RRULE:FREQ=DAILY\n");
    let out = expand_event(&raw, at(6, 9, 0), at(8, 9, 0), utc()).unwrap();
    for occurrence in &out {
        let span = occurrence.end.unwrap() - occurrence.start.unwrap();
        assert_eq!(span, Duration::minutes(10 * 60 + 45));
        assert_eq!(occurrence.id.as_deref(), Some("abc"));
    }
}

#[test]
fn recurring_window_bounds_are_inclusive() {
    let raw = event("20170206T084500Z", "20170206T193000Z", "RRULE:FREQ=DAILY\n");
    let out = expand_event(&raw, at(7, 8, 45), at(8, 8, 45), utc()).unwrap();
    let starts: Vec<_> = out.iter().map(|e| e.start.unwrap()).collect();
    assert_eq!(starts, vec![at(7, 8, 45), at(8, 8, 45)]);
}

#[test]
fn exhausted_rule_drops_event() {
    let raw = event(
        "20170201T084500Z",
        "20170201T193000Z",
        "RRULE:FREQ=DAILY;COUNT=2\n",
    );
    assert!(expand_event(&raw, at(6, 0, 0), at(7, 0, 0), utc())
        .unwrap()
        .is_empty());
}

#[test]
fn count_limits_occurrences() {
    let raw = event(
        "20170206T084500Z",
        "20170206T193000Z",
        "RRULE:FREQ=DAILY;COUNT=2\n",
    );
    let out = expand_event(&raw, at(6, 0, 0), at(10, 0, 0), utc()).unwrap();
    assert_eq!(out.len(), 2);
}

#[test]
fn exdate_removes_occurrence() {
    let raw = event(
        "20170206T084500Z",
        "20170206T193000Z",
        "RRULE:FREQ=DAILY\nEXDATE:20170207T084500Z\n",
    );
    let out = expand_event(&raw, at(6, 0, 0), at(9, 0, 0), utc()).unwrap();
    let starts: Vec<_> = out.iter().map(|e| e.start.unwrap()).collect();
    assert_eq!(starts, vec![at(6, 8, 45), at(8, 8, 45)]);
}

#[test]
fn floating_until_uses_local_offset() {
    let plus_ten = FixedOffset::east_opt(10 * 3600).unwrap();
    let text = "BEGIN:VEVENT\nSUMMARY:AirCon\nLOCATION:bedroom\nDESCRIPTION:Cool\n\
                DTSTART:20170206T084500\nDTEND:20170206T093000\n\
                RRULE:FREQ=DAILY;UNTIL=20170207T235959\nEND:VEVENT\n";
    let raw = parse_calendar(text, plus_ten).unwrap().remove(0);
    let out = expand_event(&raw, at(5, 0, 0), at(9, 0, 0), plus_ten).unwrap();
    let starts: Vec<_> = out.iter().map(|e| e.start.unwrap()).collect();
    // 08:45 at +10:00 is 22:45 UTC the previous day.
    assert_eq!(starts, vec![at(5, 22, 45), at(6, 22, 45)]);
}

#[test]
fn repeated_exdate_lines_all_apply() {
    let raw = event(
        "20170206T084500Z",
        "20170206T193000Z",
        "RRULE:FREQ=DAILY\nEXDATE:20170207T084500Z\nEXDATE:20170208T084500Z\n",
    );
    let out = expand_event(&raw, at(6, 0, 0), at(9, 0, 0), utc()).unwrap();
    let starts: Vec<_> = out.iter().map(|e| e.start.unwrap()).collect();
    assert_eq!(starts, vec![at(6, 8, 45)]);
}

#[test]
fn dense_rule_is_not_cut_short() {
    let raw = event(
        "20170206T000000Z",
        "20170206T000100Z",
        "RRULE:FREQ=MINUTELY\n",
    );
    let out = expand_event(&raw, at(6, 0, 0), at(8, 0, 0), utc()).unwrap();
    assert_eq!(out.len(), 2 * 24 * 60 + 1);
    assert_eq!(out.last().and_then(|e| e.start), Some(at(8, 0, 0)));
}

// ---------------------------------------------------------------------------
// Rules are evaluated in local wall-clock time
// ---------------------------------------------------------------------------

/// Helper: a floating-time event parsed at `offset`.
fn local_event(start: &str, rule: &str, offset: FixedOffset) -> RawCalendarEvent {
    let text = format!(
        "BEGIN:VEVENT\nSUMMARY:AirCon\nLOCATION:bedroom\nDESCRIPTION:Cool\n\
         DTSTART:{}\nRRULE:{}\nEND:VEVENT\n",
        start, rule
    );
    parse_calendar(&text, offset)
        .expect("fixture should parse")
        .remove(0)
}

fn starts(
    raw: &RawCalendarEvent,
    after: DateTime<Utc>,
    before: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<DateTime<Utc>> {
    expand_event(raw, after, before, offset)
        .unwrap()
        .iter()
        .map(|e| e.start.unwrap())
        .collect()
}

#[test]
fn byday_uses_local_weekday_east_of_utc() {
    let nz = FixedOffset::east_opt(13 * 3600).unwrap();
    // Monday 08:45 NZDT is Sunday 19:45 UTC.
    let raw = local_event("20170206T084500", "FREQ=WEEKLY;BYDAY=MO", nz);
    assert_eq!(
        starts(&raw, at(11, 0, 0), at(14, 0, 0), nz),
        vec![at(12, 19, 45)]
    );
}

#[test]
fn byday_uses_local_weekday_west_of_utc() {
    let new_york = FixedOffset::west_opt(5 * 3600).unwrap();
    // Monday 20:30 EST is Tuesday 01:30 UTC.
    let raw = local_event("20170206T203000", "FREQ=WEEKLY;BYDAY=MO", new_york);
    assert_eq!(
        starts(&raw, at(12, 0, 0), at(15, 0, 0), new_york),
        vec![at(14, 1, 30)]
    );
}

#[test]
fn byhour_uses_local_hour() {
    let brisbane = FixedOffset::east_opt(10 * 3600).unwrap();
    let raw = local_event("20170206T070000", "FREQ=DAILY;BYHOUR=7;BYMINUTE=0", brisbane);
    // 07:00 at +10:00 is 21:00 UTC the day before.
    assert_eq!(
        starts(&raw, at(7, 0, 0), at(8, 0, 0), brisbane),
        vec![at(7, 21, 0)]
    );
}

#[test]
fn utc_until_compared_in_real_time() {
    let nz = FixedOffset::east_opt(13 * 3600).unwrap();
    // Last occurrence is local 02-08 08:45 (02-07 19:45Z), just before UNTIL.
    let raw = local_event("20170206T084500", "FREQ=DAILY;UNTIL=20170207T200000Z", nz);
    assert_eq!(
        starts(&raw, at(5, 0, 0), at(10, 0, 0), nz),
        vec![at(5, 19, 45), at(6, 19, 45), at(7, 19, 45)]
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn unparsable_rule_is_fatal() {
    let raw = event(
        "20170206T084500Z",
        "20170206T193000Z",
        "RRULE:FREQ=SOMETIMES\n",
    );
    assert!(matches!(
        expand_event(&raw, at(6, 0, 0), at(7, 0, 0), utc()),
        Err(EngineError::InvalidRule(_))
    ));
}

#[test]
fn one_bad_rule_fails_the_batch() {
    let good = event("20170206T084500Z", "20170206T193000Z", "");
    let bad = event("20170206T084500Z", "20170206T193000Z", "RRULE:BOGUS\n");
    assert!(expand_events(&[good, bad], at(6, 0, 0), at(7, 0, 0), utc()).is_err());
}

#[test]
fn rule_without_start_is_fatal() {
    let text = "BEGIN:VEVENT\nSUMMARY:AirCon\nRRULE:FREQ=DAILY\nEND:VEVENT\n";
    let raw = parse_calendar(text, utc()).unwrap().remove(0);
    assert!(matches!(
        expand_event(&raw, at(6, 0, 0), at(7, 0, 0), utc()),
        Err(EngineError::InvalidRule(_))
    ));
}
