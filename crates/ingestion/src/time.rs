//! Detection and normalization of heterogeneous time encodings.
//!
//! Rules are tried in a fixed order and the first match wins:
//!
//! 1. Strict date / date-time strings (a missing zone means UTC).
//! 2. A declared `<unit> since <epoch>` offset from file attributes or the
//!    column header.
//! 3. Unitless numeric heuristics:
//!    - day counts, only for columns whose name suggests one, resolved
//!      against the candidate epochs by the plausible-year bounds;
//!    - decimal years (`2023.5`);
//!    - whole years (`2021`), which keep no sub-year information;
//!    - Unix seconds.
//!
//! Compound `year, month, day[, hour]` columns go through
//! [`TimeNormalizer::normalize_compound`].

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use obs_common::RawValue;

use crate::aliases::canonical_name;
use crate::config::{IngestConfig, YearRange};
use crate::error::Result;
use crate::issue::RowIssue;

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Explicit UTC markers stripped before naive parsing.
const UTC_SUFFIXES: &[&str] = &["Z", " UTC", " GMT", "UTC"];

/// Offsets beyond this many milliseconds (~30,000 years) are rejected.
const MAX_OFFSET_MILLIS: f64 = 1e15;

/// Granularity of a declared numeric offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    /// Calendar months, not 30-day blocks.
    Months,
    /// Calendar years, applied as twelve months.
    Years,
}

impl OffsetUnit {
    pub fn parse(text: &str) -> Option<Self> {
        let unit = match text.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => OffsetUnit::Seconds,
            "min" | "mins" | "minute" | "minutes" => OffsetUnit::Minutes,
            "h" | "hr" | "hrs" | "hour" | "hours" => OffsetUnit::Hours,
            "d" | "day" | "days" => OffsetUnit::Days,
            "week" | "weeks" => OffsetUnit::Weeks,
            "month" | "months" => OffsetUnit::Months,
            "yr" | "yrs" | "year" | "years" => OffsetUnit::Years,
            _ => return None,
        };
        Some(unit)
    }

    /// Fixed length in seconds; `None` for calendar units.
    fn seconds(self) -> Option<f64> {
        match self {
            OffsetUnit::Seconds => Some(1.0),
            OffsetUnit::Minutes => Some(60.0),
            OffsetUnit::Hours => Some(3_600.0),
            OffsetUnit::Days => Some(86_400.0),
            OffsetUnit::Weeks => Some(604_800.0),
            OffsetUnit::Months | OffsetUnit::Years => None,
        }
    }
}

/// A `<unit> since <epoch>` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredOffset {
    pub unit: OffsetUnit,
    pub epoch: DateTime<Utc>,
}

impl DeclaredOffset {
    /// Parse a declaration such as `days since 1900-01-01` or
    /// `hours since 1970-01-01 00:00:00 UTC`. Also finds one embedded in a
    /// header like `time (days since 1900-01-01)`.
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.to_ascii_lowercase();
        let idx = lower.find(" since ")?;
        let unit_word = lower[..idx]
            .split(|c: char| c.is_whitespace() || c == '(' || c == '[')
            .filter(|s| !s.is_empty())
            .last()?;
        let unit = OffsetUnit::parse(unit_word)?;

        let rest = &text[idx + " since ".len()..];
        let epoch_text = rest.split([')', ']']).next()?.trim();
        let epoch = parse_epoch(epoch_text)?;
        Some(Self { unit, epoch })
    }

    /// Timestamp `offset` units after the epoch.
    pub fn apply(&self, offset: f64) -> Option<DateTime<Utc>> {
        if !offset.is_finite() {
            return None;
        }
        match self.unit {
            OffsetUnit::Months => add_months(self.epoch, offset),
            OffsetUnit::Years => add_months(self.epoch, offset * 12.0),
            unit => {
                let seconds = unit.seconds()?;
                add_millis(self.epoch, offset * seconds * 1_000.0)
            }
        }
    }
}

/// Converts raw time values to UTC instants.
#[derive(Debug, Clone)]
pub struct TimeNormalizer {
    epochs: Vec<NaiveDate>,
    plausible_years: YearRange,
}

impl TimeNormalizer {
    pub fn new(epochs: Vec<NaiveDate>, plausible_years: YearRange) -> Self {
        Self {
            epochs,
            plausible_years,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Ok(Self::new(config.epochs()?, config.plausible_years))
    }

    /// Normalize one value of the time column `column`.
    pub fn normalize(
        &self,
        column: &str,
        raw: &RawValue,
        declared: Option<&DeclaredOffset>,
    ) -> std::result::Result<DateTime<Utc>, RowIssue> {
        match raw {
            RawValue::Text(text) => {
                let text = text.trim();
                if let Some(dt) = parse_datetime_text(text) {
                    return Ok(dt);
                }
                let value: f64 = text.parse().map_err(|_| RowIssue::TimeFormatUnknown)?;
                self.normalize_numeric(column, value, declared)
            }
            RawValue::Number(value) => self.normalize_numeric(column, *value, declared),
        }
    }

    fn normalize_numeric(
        &self,
        column: &str,
        value: f64,
        declared: Option<&DeclaredOffset>,
    ) -> std::result::Result<DateTime<Utc>, RowIssue> {
        if !value.is_finite() {
            return Err(RowIssue::TimeFormatUnknown);
        }
        if let Some(declared) = declared {
            return declared.apply(value).ok_or(RowIssue::TimeFormatUnknown);
        }

        let integral = value.fract() == 0.0;
        let result = if suggests_day_count(column) && (1.0..=1e5).contains(&value) {
            self.day_count(value)
        } else if (1800.0..2100.0).contains(&value) && !integral {
            decimal_year(value)
        } else if (1900.0..=2100.0).contains(&value) && integral {
            year_start(value as i32)
        } else if (1000.0..=1e10).contains(&value) {
            unix_seconds(value)
        } else {
            None
        };
        result.ok_or(RowIssue::TimeFormatUnknown)
    }

    /// Day count against every candidate epoch; exactly one epoch must
    /// land in the plausible years.
    fn day_count(&self, days: f64) -> Option<DateTime<Utc>> {
        let mut plausible = self.epochs.iter().filter_map(|epoch| {
            let start = Utc.from_utc_datetime(&epoch.and_time(NaiveTime::MIN));
            add_millis(start, days * 86_400_000.0)
                .filter(|dt| self.plausible_years.contains(dt.year()))
        });
        let first = plausible.next()?;
        match plausible.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    /// Compose separate year, month, day and optional hour values.
    /// A missing or empty hour is midnight; fractional hours are honoured.
    pub fn normalize_compound(
        &self,
        year: &RawValue,
        month: &RawValue,
        day: &RawValue,
        hour: Option<&RawValue>,
    ) -> std::result::Result<DateTime<Utc>, RowIssue> {
        let whole = |raw: &RawValue| -> Option<i64> {
            let v = raw.to_f64()?;
            (v.fract() == 0.0).then_some(v as i64)
        };
        let hour = match hour.filter(|h| !is_blank(h)) {
            Some(h) => h.to_f64().ok_or(RowIssue::TimeFormatUnknown)?,
            None => 0.0,
        };
        if !(0.0..24.0).contains(&hour) {
            return Err(RowIssue::TimeFormatUnknown);
        }

        let date = (|| {
            let y = i32::try_from(whole(year)?).ok()?;
            let m = u32::try_from(whole(month)?).ok()?;
            let d = u32::try_from(whole(day)?).ok()?;
            NaiveDate::from_ymd_opt(y, m, d)
        })()
        .ok_or(RowIssue::TimeFormatUnknown)?;

        let midnight = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        add_millis(midnight, hour * 3_600_000.0).ok_or(RowIssue::TimeFormatUnknown)
    }
}

/// Whether a column name announces a day count (`days`, `julian_day`, `jday`).
pub fn suggests_day_count(column: &str) -> bool {
    let name = canonical_name(column);
    name.contains("day") || name.contains("julian") || name == "jd"
}

/// Strict date / date-time string parsing.
pub fn parse_datetime_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive = UTC_SUFFIXES
        .iter()
        .find_map(|suffix| text.strip_suffix(suffix))
        .unwrap_or(text)
        .trim_end();
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(naive, fmt) {
            return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        }
    }
    compact_date(naive)
}

/// `YYYYMMDD`.
fn compact_date(text: &str) -> Option<DateTime<Utc>> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = text[0..4].parse().ok()?;
    let month = text[4..6].parse().ok()?;
    let day = text[6..8].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

/// Epoch of a declaration; more lenient than [`parse_datetime_text`]
/// (`1900-1-1`, `1950-01-01 00:00:00 UTC`).
fn parse_epoch(text: &str) -> Option<DateTime<Utc>> {
    if let Some(dt) = parse_datetime_text(text) {
        return Some(dt);
    }
    let mut parts = text.split(|c: char| c.is_whitespace() || c == 'T');
    let date = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
    let time = parts
        .next()
        .map(|t| t.trim_end_matches('Z'))
        .and_then(|t| {
            NaiveTime::parse_from_str(t, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
                .ok()
        })
        .unwrap_or(NaiveTime::MIN);
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

fn add_millis(start: DateTime<Utc>, millis: f64) -> Option<DateTime<Utc>> {
    let millis = millis.round();
    if !millis.is_finite() || millis.abs() > MAX_OFFSET_MILLIS {
        return None;
    }
    start.checked_add_signed(Duration::milliseconds(millis as i64))
}

/// Whole calendar months, then the fraction as a share of the month landed in.
fn add_months(epoch: DateTime<Utc>, months: f64) -> Option<DateTime<Utc>> {
    if !months.is_finite() || months.abs() > 1e6 {
        return None;
    }
    let whole = months.floor();
    let fraction = months - whole;
    let whole = whole as i64;
    let base = if whole >= 0 {
        epoch.checked_add_months(Months::new(u32::try_from(whole).ok()?))?
    } else {
        epoch.checked_sub_months(Months::new(u32::try_from(-whole).ok()?))?
    };
    if fraction == 0.0 {
        return Some(base);
    }
    let next = base.checked_add_months(Months::new(1))?;
    let span = (next - base).num_milliseconds() as f64;
    add_millis(base, span * fraction)
}

/// Fraction maps linearly onto the year's length, leap days included.
fn decimal_year(value: f64) -> Option<DateTime<Utc>> {
    let year = value.floor() as i32;
    let start = year_start(year)?;
    let next = year_start(year + 1)?;
    let span = (next - start).num_milliseconds() as f64;
    add_millis(start, span * (value - value.floor()))
}

/// January 1st, 00:00 UTC. Everything below the year is lost.
fn year_start(year: i32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()
}

fn unix_seconds(value: f64) -> Option<DateTime<Utc>> {
    let secs = value.floor();
    let nanos = ((value - secs) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(secs as i64, nanos).single()
}

fn is_blank(raw: &RawValue) -> bool {
    matches!(raw, RawValue::Text(s) if s.trim().is_empty())
}
