//! Best-effort parsing of the date strings news sites print.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y年%m月%d日 %H:%M",
    "%Y年%m月%d日%H时%M分",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日"];

// Parsed with the current year prepended.
const YEARLESS_FORMATS: &[&str] = &["%m月%d日 %H:%M", "%m-%d %H:%M"];

// Parsed as a time on `today`.
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Parse `input` against the known formats. Year-less strings take the year of
/// `today`, time-only strings take its date.
pub fn parse_naive(input: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    for fmt in YEARLESS_FORMATS {
        let with_year = format!("{} {}", today.year(), s);
        if let Ok(dt) = NaiveDateTime::parse_from_str(&with_year, &format!("%Y {}", fmt)) {
            return Some(dt);
        }
    }

    for fmt in TIME_FORMATS {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Some(today.and_time(t));
        }
    }

    None
}

/// Parse a site-local date string, interpreting it in the process timezone.
pub fn parse_local(input: &str) -> Option<DateTime<Utc>> {
    let naive = parse_naive(input, Local::now().date_naive());
    if naive.is_none() {
        tracing::debug!(input, "could not parse date string");
    }
    naive
        .and_then(|n| Local.from_local_datetime(&n).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn from_unix(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn test_full_formats() {
        assert_eq!(parse_naive("2023-10-26 14:30:00", today()), Some(dt(2023, 10, 26, 14, 30)));
        assert_eq!(parse_naive("2023/10/26 14:30", today()), Some(dt(2023, 10, 26, 14, 30)));
        assert_eq!(parse_naive("10/26/2023 14:30:00", today()), Some(dt(2023, 10, 26, 14, 30)));
    }

    #[test]
    fn test_chinese_formats() {
        assert_eq!(parse_naive("2023年10月26日 14:30", today()), Some(dt(2023, 10, 26, 14, 30)));
        assert_eq!(parse_naive("2023年10月26日14时30分", today()), Some(dt(2023, 10, 26, 14, 30)));
        assert_eq!(parse_naive("10月26日 14:30", today()), Some(dt(2024, 10, 26, 14, 30)));
    }

    #[test]
    fn test_date_and_time_only() {
        assert_eq!(parse_naive("2023-10-26", today()), Some(dt(2023, 10, 26, 0, 0)));
        assert_eq!(parse_naive("11:34", today()), Some(dt(2024, 5, 17, 11, 34)));
        assert_eq!(parse_naive(" 11-25 10:00 ", today()), Some(dt(2024, 11, 25, 10, 0)));
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(parse_naive("Some invalid date string", today()), None);
        assert_eq!(parse_naive("", today()), None);
    }

    #[test]
    fn test_from_unix() {
        let parsed = from_unix(1_700_000_000).unwrap();
        assert_eq!(parsed.timestamp(), 1_700_000_000);
    }
}
