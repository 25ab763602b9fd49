/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::core::field::strip_cfws;

/// Parses an RFC 2822 date into seconds since the epoch.
///
/// chrono handles conformant dates; the fallback accepts the common
/// deviations found in old mail (missing weekday, missing seconds, alphabetic
/// zones chrono rejects).
pub fn parse_date(value: &str) -> Option<i64> {
    let cleaned = strip_cfws(value);
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(&cleaned) {
        return Some(date.timestamp());
    }
    parse_date_lenient(&cleaned)
}

fn parse_date_lenient(value: &str) -> Option<i64> {
    let mut day = None;
    let mut month = None;
    let mut year = None;
    let mut hour = 0u32;
    let mut minute = 0u32;
    let mut second = 0u32;
    let mut offset = 0i32;

    for part in value.split(|ch: char| ch == ' ' || ch == ',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part.contains(':') {
            let mut pieces = part.split(':');
            hour = pieces.next()?.parse().ok()?;
            minute = pieces.next()?.parse().ok()?;
            second = pieces.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        } else if let Some(value) = month_number(part) {
            month = Some(value);
        } else if let Ok(number) = part.parse::<u32>() {
            if day.is_none() && number <= 31 {
                day = Some(number);
            } else {
                year = Some(fix_year(number));
            }
        } else if let Some(zone) = zone_offset(part) {
            offset = zone;
        }
    }

    let date = NaiveDate::from_ymd_opt(year? as i32, month?, day?)?;
    let time = date.and_hms_opt(hour, minute, second)?;
    Some(time.and_utc().timestamp() - offset as i64)
}

fn fix_year(year: u32) -> u32 {
    // Two-digit years per RFC 2822 section 4.3.
    if year < 50 {
        year + 2000
    } else if year < 1000 {
        year + 1900
    } else {
        year
    }
}

pub(crate) fn month_number(name: &str) -> Option<u32> {
    static MONTHS: &[&str] = &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = name.get(..3)?.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|month| *month == lower)
        .map(|pos| pos as u32 + 1)
}

fn zone_offset(part: &str) -> Option<i32> {
    let bytes = part.as_bytes();
    if bytes.len() == 5 && (bytes[0] == b'+' || bytes[0] == b'-') {
        let hours: i32 = part.get(1..3)?.parse().ok()?;
        let minutes: i32 = part.get(3..5)?.parse().ok()?;
        let seconds = hours * 3600 + minutes * 60;
        return Some(if bytes[0] == b'-' { -seconds } else { seconds });
    }
    match part.to_ascii_uppercase().as_str() {
        "UT" | "GMT" | "Z" | "UTC" => Some(0),
        "EST" => Some(-5 * 3600),
        "EDT" => Some(-4 * 3600),
        "CST" => Some(-6 * 3600),
        "CDT" => Some(-5 * 3600),
        "MST" => Some(-7 * 3600),
        "MDT" => Some(-6 * 3600),
        "PST" => Some(-8 * 3600),
        "PDT" => Some(-7 * 3600),
        _ => None,
    }
}

/// Formats a timestamp as an RFC 2822 date in UTC.
pub fn format_date(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|date| date.format("%a, %d %b %Y %H:%M:%S +0000").to_string())
        .unwrap_or_default()
}

/// Parses the ctime-style date of an mbox `From ` envelope line, e.g.
/// `Sat Jan  3 01:05:34 1996`.
pub fn parse_ctime(value: &str) -> Option<i64> {
    let mut parts = value.split_whitespace();
    let _weekday = parts.next()?;
    let month = month_number(parts.next()?)?;
    let day: u32 = parts.next()?.parse().ok()?;
    let time = parts.next()?;
    let mut year_part = parts.next()?;
    // Some mailers write a timezone between time and year.
    if year_part.parse::<i32>().is_err() {
        year_part = parts.next()?;
    }
    let year: i32 = year_part.parse().ok()?;

    let mut pieces = time.split(':');
    let hour: u32 = pieces.next()?.parse().ok()?;
    let minute: u32 = pieces.next()?.parse().ok()?;
    let second: u32 = pieces.next().and_then(|s| s.parse().ok()).unwrap_or(0);

    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)
        .map(|t| t.and_utc().timestamp())
}

/// Formats a timestamp in ctime style for mbox envelope lines.
pub fn format_ctime(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|date| date.format("%a %b %e %H:%M:%S %Y").to_string())
        .unwrap_or_default()
}

/// Seconds since the epoch, now.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc2822_dates() {
        assert_eq!(
            parse_date("Sat, 20 Nov 2021 14:22:01 -0800"),
            Some(1637446921)
        );
        assert_eq!(parse_date("20 Nov 2021 22:22:01 +0000"), Some(1637446921));
        assert_eq!(
            parse_date("Sat, 20 Nov 2021 14:22:01 -0800 (PST)"),
            Some(1637446921)
        );
    }

    #[test]
    fn lenient_dates() {
        // two-digit year and named zone
        assert_eq!(parse_date("20 Nov 21 14:22:01 PST"), Some(1637446921));
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn ctime_roundtrip() {
        let ts = parse_ctime("Sat Jan  3 01:05:34 1996").unwrap();
        assert_eq!(ts, 820631134);
        assert_eq!(format_ctime(ts), "Sat Jan  3 01:05:34 1996");
        assert_eq!(parse_ctime(&format_ctime(ts)), Some(ts));
    }

    #[test]
    fn format_is_rfc2822() {
        let formatted = format_date(1637446921);
        assert_eq!(formatted, "Sat, 20 Nov 2021 22:22:01 +0000");
        assert_eq!(parse_date(&formatted), Some(1637446921));
    }
}
