//! Timestamp interval lists.
//!
//! A list holds closed `[lo, hi]` intervals in microseconds, sorted and
//! coalesced: no two intervals overlap or touch. Every operation here keeps
//! that shape.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, Utc};
use strata_core::{Error, Result};

pub const SECOND_MICROS: i64 = 1_000_000;
pub const MINUTE_MICROS: i64 = 60 * SECOND_MICROS;
pub const HOUR_MICROS: i64 = 60 * MINUTE_MICROS;
pub const DAY_MICROS: i64 = 24 * HOUR_MICROS;

/// Closed interval of microsecond timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval {
    pub lo: i64,
    pub hi: i64,
}

impl Interval {
    /// Creates `[lo, hi]`.
    pub const fn new(lo: i64, hi: i64) -> Self {
        Self { lo, hi }
    }

    /// Returns whether `ts` falls inside.
    #[inline]
    pub fn contains(&self, ts: i64) -> bool {
        self.lo <= ts && ts <= self.hi
    }
}

/// Appends `[lo, hi]`, merging it into the last interval when they touch.
pub fn append(list: &mut Vec<Interval>, lo: i64, hi: i64) {
    if lo > hi {
        return;
    }
    if let Some(last) = list.last_mut() {
        if last.hi.saturating_add(1) >= lo {
            last.hi = last.hi.max(hi);
            return;
        }
    }
    list.push(Interval::new(lo, hi));
}

/// Intersects two lists with a two-pointer merge.
pub fn intersect(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let (x, y) = (a[i], b[j]);
        if x.hi < y.lo {
            i += 1;
        } else if x.lo > y.hi {
            j += 1;
        } else {
            append(&mut out, x.lo.max(y.lo), x.hi.min(y.hi));
            if x.hi < y.hi {
                i += 1;
            } else {
                j += 1;
            }
        }
    }
    out
}

/// Complement of a list over the whole timeline.
pub fn invert(list: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::with_capacity(list.len() + 1);
    let mut last = i64::MIN;
    let mut open = true;
    for iv in list {
        if open && iv.lo > last {
            out.push(Interval::new(last, iv.lo - 1));
        }
        match iv.hi.checked_add(1) {
            Some(next) => last = next,
            None => open = false,
        }
    }
    if open {
        out.push(Interval::new(last, i64::MAX));
    }
    out
}

/// Removes `b` from `a`.
pub fn subtract(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    intersect(a, &invert(b))
}

/// Parses an interval literal, quotes already removed.
///
/// Accepted forms: `date`, `date;Nu` (range of N units from the start) and
/// `date;Nu;Pu;count` (range repeated `count` times every P units). Units
/// are `s m h d M y`. `date` is `YYYY[-MM[-DD[THH[:MM[:SS]]]]]` covering
/// the whole of its least significant field, or a full timestamp.
pub fn parse_interval_ex(text: &str, position: usize) -> Result<Vec<Interval>> {
    let parts: Vec<&str> = text.split(';').collect();
    let mut out = Vec::new();
    match parts.len() {
        1 => {
            if let Some(iv) = parse_interval(text) {
                append(&mut out, iv.lo, iv.hi);
            } else {
                let ts = try_parse_timestamp(text)
                    .ok_or_else(|| Error::interval_format(position, "Not a date"))?;
                append(&mut out, ts, ts);
            }
        }
        2 => parse_range(parts[0], parts[1], position, &mut out)?,
        4 => {
            let (period_text, unit) = split_unit(parts[2])
                .ok_or_else(|| Error::interval_format(position, "Period not a number"))?;
            let period: i32 = period_text
                .parse()
                .map_err(|_| Error::interval_format(position, "Period not a number"))?;
            let count: i32 = parts[3]
                .parse()
                .map_err(|_| Error::interval_format(position, "Count not a number"))?;
            parse_range(parts[0], parts[1], position, &mut out)?;
            if !matches!(unit, 'y' | 'M' | 'd' | 'h' | 'm' | 's') {
                return Err(Error::interval_format(
                    position,
                    format!("Unknown period: {}", unit),
                ));
            }
            let first = out[out.len() - 1];
            let (mut lo, mut hi) = (first.lo, first.hi);
            for _ in 1..count.max(1) {
                lo = add_period(lo, unit, period)
                    .ok_or_else(|| Error::invalid_date(position))?;
                hi = add_period(hi, unit, period)
                    .ok_or_else(|| Error::invalid_date(position))?;
                append(&mut out, lo, hi);
            }
        }
        _ => return Err(Error::interval_format(position, "Invalid interval format")),
    }
    Ok(out)
}

fn split_unit(s: &str) -> Option<(&str, char)> {
    let unit = s.chars().last()?;
    Some((&s[..s.len() - unit.len_utf8()], unit))
}

fn parse_range(date: &str, range: &str, position: usize, out: &mut Vec<Interval>) -> Result<()> {
    let (n, unit) =
        split_unit(range).ok_or_else(|| Error::interval_format(position, "Range not a number"))?;
    let n: i32 = n
        .parse()
        .map_err(|_| Error::interval_format(position, "Range not a number"))?;
    let lo = match parse_interval(date) {
        Some(iv) => iv.lo,
        None => try_parse_timestamp(date).ok_or_else(|| Error::invalid_date(position))?,
    };
    let base = match parse_interval(date) {
        Some(iv) => iv.hi,
        None => lo,
    };
    let hi = add_period(base, unit, n).ok_or_else(|| Error::invalid_date(position))?;
    append(out, lo, hi);
    Ok(())
}

/// Parses `YYYY[-MM[-DD[THH[:MM[:SS]]]]]` into the interval it covers.
pub fn parse_interval(text: &str) -> Option<Interval> {
    let b = text.as_bytes();
    let num = |at: usize, len: usize| -> Option<u32> {
        let s = text.get(at..at + len)?;
        if s.bytes().all(|c| c.is_ascii_digit()) {
            s.parse().ok()
        } else {
            None
        }
    };
    let sep = |at: usize, c: u8| b.get(at) == Some(&c);

    if b.len() < 4 {
        return None;
    }
    let year = num(0, 4)? as i32;
    if b.len() == 4 {
        let lo = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let hi = NaiveDate::from_ymd_opt(year, 12, 31)?;
        return Some(Interval::new(day_micros(lo), day_micros(hi) + DAY_MICROS - 1));
    }
    if !sep(4, b'-') || b.len() < 7 {
        return None;
    }
    let month = num(5, 2)?;
    if b.len() == 7 {
        let lo = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = lo.checked_add_months(Months::new(1))?;
        return Some(Interval::new(day_micros(lo), day_micros(next) - 1));
    }
    if !sep(7, b'-') || b.len() < 10 {
        return None;
    }
    let day = NaiveDate::from_ymd_opt(year, month, num(8, 2)?)?;
    let base = day_micros(day);
    if b.len() == 10 {
        return Some(Interval::new(base, base + DAY_MICROS - 1));
    }
    if !sep(10, b'T') || b.len() < 13 {
        return None;
    }
    let hour = num(11, 2)? as i64;
    if hour > 23 {
        return None;
    }
    let base = base + hour * HOUR_MICROS;
    if b.len() == 13 {
        return Some(Interval::new(base, base + HOUR_MICROS - 1));
    }
    if !sep(13, b':') || b.len() < 16 {
        return None;
    }
    let minute = num(14, 2)? as i64;
    if minute > 59 {
        return None;
    }
    let base = base + minute * MINUTE_MICROS;
    if b.len() == 16 {
        return Some(Interval::new(base, base + MINUTE_MICROS - 1));
    }
    if !sep(16, b':') || b.len() != 19 {
        return None;
    }
    let second = num(17, 2)? as i64;
    if second > 59 {
        return None;
    }
    let base = base + second * SECOND_MICROS;
    Some(Interval::new(base, base + SECOND_MICROS - 1))
}

fn day_micros(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_micros())
        .unwrap_or(0)
}

const TIMESTAMP_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%MZ",
];

/// Parses a full timestamp into epoch microseconds.
pub fn try_parse_timestamp(text: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).timestamp_micros());
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.and_utc().timestamp_micros());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(day_micros)
}

/// Parses a timestamp constant, reporting "Invalid date" at `position`.
pub fn parse_timestamp(text: &str, position: usize) -> Result<i64> {
    try_parse_timestamp(text).ok_or_else(|| Error::invalid_date(position))
}

/// Adds `n` units to a timestamp. Units: `s m h d w M y`.
pub fn add_period(micros: i64, unit: char, n: i32) -> Option<i64> {
    let n64 = n as i64;
    match unit {
        's' => micros.checked_add(n64 * SECOND_MICROS),
        'm' => micros.checked_add(n64 * MINUTE_MICROS),
        'h' => micros.checked_add(n64 * HOUR_MICROS),
        'd' => micros.checked_add(n64 * DAY_MICROS),
        'w' => micros.checked_add(n64 * 7 * DAY_MICROS),
        'M' => add_months(micros, n),
        'y' => add_months(micros, n.checked_mul(12)?),
        _ => None,
    }
}

/// Calendar month addition, clamping the day to the target month.
pub fn add_months(micros: i64, n: i32) -> Option<i64> {
    let dt = DateTime::from_timestamp_micros(micros)?.naive_utc();
    let moved = if n >= 0 {
        dt.checked_add_months(Months::new(n as u32))?
    } else {
        dt.checked_sub_months(Months::new(n.unsigned_abs()))?
    };
    Some(moved.and_utc().timestamp_micros())
}

/// Formats a timestamp as `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
pub fn format_timestamp(micros: i64) -> String {
    match DateTime::from_timestamp_micros(micros) {
        Some(dt) => format!("{}", dt.format("%Y-%m-%dT%H:%M:%S%.6fZ")),
        None => format!("{}", micros),
    }
}

/// Formats a list as `[{lo=..., hi=...},...]`.
pub fn format_intervals(list: &[Interval]) -> String {
    let mut out = String::from("[");
    for (i, iv) in list.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str("{lo=");
        out.push_str(&format_timestamp(iv.lo));
        out.push_str(", hi=");
        out.push_str(&format_timestamp(iv.hi));
        out.push('}');
    }
    out.push(']');
    out
}
