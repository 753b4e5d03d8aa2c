//! # schedule-types
//!
//! Shared time-of-day and slot-interval types for the caddie booking backend.
//!
//! These types are used by:
//! - `backend-rust`: availability resolution, booking validation, alternative search
//! - `caddie-admin`: fixture validation when seeding caddie availability
//!
//! ## Conventions
//!
//! - A day is 1440 minutes. `TimeOfDay` covers `00:00..=23:59`.
//! - A `SlotRange` is half-open, `[start_minute, end_minute)`, with
//!   `0 <= start < end <= 1440`. The end may be midnight of the next day (`24:00`).
//! - Slot strings are lenient (`"9-12"`, `"09:00-12:00"`, `"9:30-12"`); booking
//!   times are strict `"HH:mm"`.
//!
//! All interval arithmetic operates on `SlotRange`, never on strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MINUTES_PER_DAY: u16 = 1440;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("invalid time of day '{0}', expected HH:mm")]
    InvalidTime(String),
    #[error("invalid slot '{0}', expected H[:MM]-H[:MM]")]
    InvalidSlot(String),
    #[error("empty or inverted range {start}-{end} (minutes)")]
    EmptyRange { start: u16, end: u16 },
    #[error("minute offset {0} is outside the day")]
    OutOfDay(u16),
}

// ── Time of Day ───────────────────────────────────────────────────────────────

/// Minute offset inside a day, serialized as strict `"HH:mm"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_hm(hours: u16, minutes: u16) -> Result<Self, TimeParseError> {
        if hours > 23 || minutes > 59 {
            return Err(TimeParseError::InvalidTime(format!("{hours}:{minutes}")));
        }
        Ok(Self(hours * 60 + minutes))
    }

    /// Strict `"HH:mm"`: two-digit hour 00-23, two-digit minute 00-59.
    pub fn parse_hhmm(s: &str) -> Result<Self, TimeParseError> {
        let invalid = || TimeParseError::InvalidTime(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        if h.len() != 2 || m.len() != 2 || !is_digits(h) || !is_digits(m) {
            return Err(invalid());
        }
        let hours: u16 = h.parse().map_err(|_| invalid())?;
        let minutes: u16 = m.parse().map_err(|_| invalid())?;
        Self::from_hm(hours, minutes).map_err(|_| invalid())
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_minutes(self.0))
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hhmm(s)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = TimeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_hhmm(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Formats a minute offset as zero-padded `"HH:mm"`; 1440 renders as `"24:00"`.
pub fn format_minutes(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// ── Slot Range ────────────────────────────────────────────────────────────────

/// Canonical half-open interval `[start_minute, end_minute)` inside one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRange {
    pub start_minute: u16,
    pub end_minute: u16,
}

impl SlotRange {
    pub fn new(start_minute: u16, end_minute: u16) -> Result<Self, TimeParseError> {
        if end_minute > MINUTES_PER_DAY {
            return Err(TimeParseError::OutOfDay(end_minute));
        }
        if start_minute >= end_minute {
            return Err(TimeParseError::EmptyRange {
                start: start_minute,
                end: end_minute,
            });
        }
        Ok(Self {
            start_minute,
            end_minute,
        })
    }

    /// Builds a range from two strict booking times; `end` must be after `start`.
    pub fn from_times(start: TimeOfDay, end: TimeOfDay) -> Result<Self, TimeParseError> {
        Self::new(start.minutes(), end.minutes())
    }

    /// Lenient slot-string parser. Accepts hours with or without leading zeros and
    /// with or without minutes: `"9-12"`, `"09:00-12:00"`, `"9:30-12"`, `"15-24"`.
    pub fn parse_slot(s: &str) -> Result<Self, TimeParseError> {
        let trimmed = s.trim();
        let invalid = || TimeParseError::InvalidSlot(s.to_string());
        let (start, end) = trimmed.split_once('-').ok_or_else(invalid)?;
        let start = parse_slot_bound(start.trim()).ok_or_else(invalid)?;
        let end = parse_slot_bound(end.trim()).ok_or_else(invalid)?;
        Self::new(start, end)
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end_minute - self.start_minute
    }

    /// Half-open overlap: `start_a < end_b && end_a > start_b`. Touching ranges do not overlap.
    pub fn overlaps(&self, other: &SlotRange) -> bool {
        self.start_minute < other.end_minute && self.end_minute > other.start_minute
    }

    pub fn contains(&self, other: &SlotRange) -> bool {
        self.start_minute <= other.start_minute && other.end_minute <= self.end_minute
    }

    pub fn start_label(&self) -> String {
        format_minutes(self.start_minute)
    }

    pub fn end_label(&self) -> String {
        format_minutes(self.end_minute)
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_label(), self.end_label())
    }
}

impl FromStr for SlotRange {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_slot(s)
    }
}

fn parse_slot_bound(s: &str) -> Option<u16> {
    let (h, m) = match s.split_once(':') {
        Some((h, m)) => (h, m),
        None => (s, ""),
    };
    if h.is_empty() || h.len() > 2 || !h.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if m.len() > 2 || !m.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: u16 = h.parse().ok()?;
    let minutes: u16 = if m.is_empty() { 0 } else { m.parse().ok()? };
    if minutes > 59 {
        return None;
    }
    let total = hours * 60 + minutes;
    (total <= MINUTES_PER_DAY).then_some(total)
}

// ── Interval Set Operations ───────────────────────────────────────────────────

/// Sorts by start and coalesces touching or overlapping ranges, so `9-12` and
/// `12-15` become one `9-15` block.
pub fn merge<I>(ranges: I) -> Vec<SlotRange>
where
    I: IntoIterator<Item = SlotRange>,
{
    let mut sorted: Vec<SlotRange> = ranges.into_iter().collect();
    sorted.sort();

    let mut merged: Vec<SlotRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start_minute <= last.end_minute => {
                last.end_minute = last.end_minute.max(range.end_minute);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Removes every busy range from the free set. The result stays sorted and disjoint.
pub fn subtract(free: &[SlotRange], busy: &[SlotRange]) -> Vec<SlotRange> {
    let busy = merge(busy.iter().copied());
    let mut out = Vec::new();

    for range in merge(free.iter().copied()) {
        let mut cursor = range.start_minute;
        for b in busy.iter().filter(|b| b.overlaps(&range)) {
            if b.start_minute > cursor {
                out.push(SlotRange {
                    start_minute: cursor,
                    end_minute: b.start_minute,
                });
            }
            cursor = cursor.max(b.end_minute);
        }
        if cursor < range.end_minute {
            out.push(SlotRange {
                start_minute: cursor,
                end_minute: range.end_minute,
            });
        }
    }
    out
}

/// The free block that fully contains `wanted`, if any. Partial coverage never counts.
pub fn containing(free: &[SlotRange], wanted: &SlotRange) -> Option<SlotRange> {
    free.iter().copied().find(|f| f.contains(wanted))
}

pub fn fits(free: &[SlotRange], wanted: &SlotRange) -> bool {
    containing(free, wanted).is_some()
}

// ── Wire View ─────────────────────────────────────────────────────────────────

/// `{ "start": "09:00", "end": "12:00" }` as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub start: String,
    pub end: String,
}

impl From<SlotRange> for TimeBlock {
    fn from(range: SlotRange) -> Self {
        Self {
            start: range.start_label(),
            end: range.end_label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> SlotRange {
        SlotRange::parse_slot(s).unwrap()
    }

    #[test]
    fn short_and_long_slot_forms_are_equivalent() {
        assert_eq!(r("9-12"), r("09:00-12:00"));
        assert_eq!(r("9-12"), SlotRange::new(540, 720).unwrap());
        assert_eq!(r("9:30-12"), SlotRange::new(570, 720).unwrap());
        assert_eq!(r(" 15 - 24 "), SlotRange::new(900, 1440).unwrap());
    }

    #[test]
    fn slot_parse_then_format_is_stable() {
        for slot in ["9-12", "7:05-8", "00:00-24:00", "12:30-13:45"] {
            let parsed = r(slot);
            assert!(parsed.duration_minutes() > 0);
            assert_eq!(r(&parsed.to_string()), parsed);
        }
    }

    #[test]
    fn rejects_malformed_or_inverted_slots() {
        assert!(SlotRange::parse_slot("12-9").is_err());
        assert!(SlotRange::parse_slot("9-9").is_err());
        assert!(SlotRange::parse_slot("9").is_err());
        assert!(SlotRange::parse_slot("9:75-10").is_err());
        assert!(SlotRange::parse_slot("25-26").is_err());
        assert!(SlotRange::parse_slot("morning").is_err());
    }

    #[test]
    fn strict_booking_time_format() {
        assert_eq!(TimeOfDay::parse_hhmm("09:30").unwrap().minutes(), 570);
        assert_eq!(TimeOfDay::parse_hhmm("23:59").unwrap().to_string(), "23:59");
        assert!(TimeOfDay::parse_hhmm("9:30").is_err());
        assert!(TimeOfDay::parse_hhmm("24:00").is_err());
        assert!(TimeOfDay::parse_hhmm("10:60").is_err());
        assert!(TimeOfDay::parse_hhmm("1030").is_err());
    }

    #[test]
    fn time_of_day_serializes_as_string() {
        let t = TimeOfDay::parse_hhmm("08:05").unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"08:05\"");
        let back: TimeOfDay = serde_json::from_str("\"08:05\"").unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<TimeOfDay>("\"8:5\"").is_err());
    }

    #[test]
    fn contiguous_slots_merge_into_one_block() {
        let merged = merge([r("12-15"), r("9-12")]);
        assert_eq!(merged, vec![r("9-15")]);

        assert!(fits(&merged, &r("10-13")));
        assert!(!fits(&merged, &r("10-16")));
    }

    #[test]
    fn merge_keeps_gaps_and_absorbs_nested_ranges() {
        let merged = merge([r("9-12"), r("10-11"), r("14-16"), r("15-18")]);
        assert_eq!(merged, vec![r("9-12"), r("14-18")]);
    }

    #[test]
    fn touching_ranges_do_not_overlap() {
        assert!(!r("9-10").overlaps(&r("10-11")));
        assert!(r("9:30-10:30").overlaps(&r("10-11")));
    }

    #[test]
    fn subtract_splits_free_blocks_around_bookings() {
        let free = vec![r("9-15")];
        let busy = vec![r("10-11"), r("13-14")];
        assert_eq!(
            subtract(&free, &busy),
            vec![r("9-10"), r("11-13"), r("14-15")]
        );
        assert!(subtract(&free, &[r("8-16")]).is_empty());
        assert_eq!(subtract(&free, &[]), free);
    }

    #[test]
    fn partially_free_window_does_not_fit() {
        let free = subtract(&[r("9-12")], &[r("10-11")]);
        assert!(!fits(&free, &r("9:30-10:30")));
        assert!(fits(&free, &r("11-12")));
        assert_eq!(containing(&free, &r("9-10")), Some(r("9-10")));
    }

    #[test]
    fn time_block_view_uses_padded_labels() {
        let block: TimeBlock = r("9-12:30").into();
        assert_eq!(block.start, "09:00");
        assert_eq!(block.end, "12:30");
    }
}
