//! Raw feed record → canonical event tuple.
//!
//! Normalization never fails: anything that cannot be interpreted degrades to
//! an empty string (timestamps, links) or to the `Unknown` category.

use std::sync::LazyLock;

use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::event::{NormalizedEvent, RawEvent, RawTimestamp, UNKNOWN_CATEGORY};

static CATEGORY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]").expect("category regex should compile"));

static CATEGORY_TAG_WITH_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\[[^\]]+\]\s*").expect("category regex should compile"));

/// Hour is deliberately unpadded.
const DISPLAY_FORMAT: &str = "%Y-%m-%d %-H:%M:%S";

/// Time zone timestamps are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    /// The running process's local zone.
    #[default]
    Local,
    Named(Tz),
}

impl DisplayZone {
    /// Parse an IANA zone name such as `America/Chicago`.
    pub fn from_name(name: &str) -> Option<Self> {
        name.parse::<Tz>().ok().map(DisplayZone::Named)
    }

    /// Render an instant as `YYYY-MM-DD H:MM:SS` in this zone.
    pub fn render(&self, instant: DateTime<Utc>) -> String {
        match self {
            DisplayZone::Local => instant.with_timezone(&Local).format(DISPLAY_FORMAT).to_string(),
            DisplayZone::Named(tz) => instant.with_timezone(tz).format(DISPLAY_FORMAT).to_string(),
        }
    }

    /// Interpret a wall-clock time in this zone.
    fn resolve(&self, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            DisplayZone::Local => wall_clock(&Local, naive),
            DisplayZone::Named(tz) => wall_clock(tz, naive),
        }
    }
}

/// Read a wall-clock time in `zone`.
///
/// Ambiguous times (clocks falling back) take the earlier instant. Times
/// skipped by a spring-forward gap move forward by an hour, so 02:30 on a
/// changeover night reads as 03:30.
fn wall_clock<Z: TimeZone>(zone: &Z, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
    let local = match zone.from_local_datetime(naive) {
        LocalResult::None => {
            let shifted = naive.checked_add_signed(TimeDelta::hours(1))?;
            zone.from_local_datetime(&shifted).earliest()
        }
        resolved => resolved.earliest(),
    };
    local.map(|dt| dt.with_timezone(&Utc))
}

/// Turns feed records into `NormalizedEvent`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    zone: DisplayZone,
}

impl Normalizer {
    pub fn new(zone: DisplayZone) -> Self {
        Normalizer { zone }
    }

    pub fn zone(&self) -> DisplayZone {
        self.zone
    }

    pub fn normalize(&self, raw: &RawEvent) -> NormalizedEvent {
        let (title, category) = split_category(raw.summary.as_deref().unwrap_or_default());

        NormalizedEvent {
            identity: raw.uid.clone(),
            title,
            category,
            start: self.format_timestamp(raw.start.as_ref()),
            end: self.format_timestamp(raw.end.as_ref()),
            link: resolve_link(raw.url.as_ref()),
        }
    }

    /// Render an optional feed timestamp, or `""` when absent or unreadable.
    pub fn format_timestamp(&self, value: Option<&RawTimestamp>) -> String {
        value
            .and_then(|v| self.to_instant(v))
            .map(|instant| self.zone.render(instant))
            .unwrap_or_default()
    }

    fn to_instant(&self, value: &RawTimestamp) -> Option<DateTime<Utc>> {
        match value {
            RawTimestamp::Utc(dt) => Some(*dt),
            RawTimestamp::Floating(naive) => self.zone.resolve(naive),
            RawTimestamp::Zoned { datetime, tzid } => match tzid.parse::<Tz>() {
                Ok(tz) => wall_clock(&tz, datetime),
                // Unknown zone ids (e.g. Outlook's "Eastern Standard Time") read as wall clock.
                Err(_) => self.zone.resolve(datetime),
            },
            RawTimestamp::Date(date) => self.zone.resolve(&date.and_time(Default::default())),
            RawTimestamp::Unparsed(text) => self.parse_loose(text.trim()),
        }
    }

    /// Best-effort reading of a timestamp the feed parser rejected.
    fn parse_loose(&self, text: &str) -> Option<DateTime<Utc>> {
        if text.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Some(utc) = text.strip_suffix('Z') {
            if let Ok(naive) = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S") {
                return Some(naive.and_utc());
            }
        }
        const NAIVE_FORMATS: [&str; 4] = [
            "%Y%m%dT%H%M%S",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M",
        ];
        if let Some(naive) = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        {
            return self.zone.resolve(&naive);
        }
        ["%Y%m%d", "%Y-%m-%d"]
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
            .and_then(|date| self.zone.resolve(&date.and_time(Default::default())))
    }
}

/// Split `"Quiz 3 [CS 101]"` into `("Quiz 3", "CS 101")`.
///
/// Only the first bracketed segment is the category, and only it is removed
/// from the title together with the whitespace around it.
pub fn split_category(summary: &str) -> (String, String) {
    let category = CATEGORY_TAG
        .captures(summary)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

    let title = CATEGORY_TAG_WITH_SPACE
        .replace(summary, "")
        .trim()
        .to_string();

    (title, category)
}

/// Resolve a link given either as a string or as `{ "val": "..." }`.
pub fn resolve_link(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Object(map)) => map
            .get("val")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn utc_normalizer() -> Normalizer {
        Normalizer::new(DisplayZone::Named(chrono_tz::UTC))
    }

    fn raw(summary: Option<&str>) -> RawEvent {
        RawEvent {
            uid: "event-1".into(),
            summary: summary.map(String::from),
            start: None,
            end: None,
            url: None,
        }
    }

    #[test]
    fn test_category_extracted_from_summary() {
        let event = utc_normalizer().normalize(&raw(Some("Quiz 3 [CS 101]")));

        assert_eq!(event.title, "Quiz 3");
        assert_eq!(event.category, "CS 101");
    }

    #[test]
    fn test_summary_without_brackets_is_unknown() {
        let event = utc_normalizer().normalize(&raw(Some("  Office hours  ")));

        assert_eq!(event.title, "Office hours");
        assert_eq!(event.category, "Unknown");
    }

    #[test]
    fn test_only_first_tag_is_category() {
        let (title, category) = split_category("[MATH 2] Homework [late]");

        assert_eq!(category, "MATH 2");
        assert_eq!(title, "Homework [late]");
    }

    #[test]
    fn test_empty_brackets_are_not_a_category() {
        let (title, category) = split_category("Essay []");

        assert_eq!(category, "Unknown");
        assert_eq!(title, "Essay []");
    }

    #[test]
    fn test_missing_summary() {
        let event = utc_normalizer().normalize(&raw(None));

        assert_eq!(event.title, "");
        assert_eq!(event.category, "Unknown");
    }

    #[test]
    fn test_hour_is_not_padded() {
        let n = utc_normalizer();
        let morning = RawTimestamp::Utc(Utc.with_ymd_and_hms(2024, 1, 2, 9, 5, 7).unwrap());
        let afternoon = RawTimestamp::Utc(Utc.with_ymd_and_hms(2024, 11, 20, 13, 0, 0).unwrap());

        assert_eq!(n.format_timestamp(Some(&morning)), "2024-01-02 9:05:07");
        assert_eq!(n.format_timestamp(Some(&afternoon)), "2024-11-20 13:00:00");
    }

    #[test]
    fn test_missing_or_bad_timestamp_is_empty() {
        let n = utc_normalizer();

        assert_eq!(n.format_timestamp(None), "");
        assert_eq!(
            n.format_timestamp(Some(&RawTimestamp::Unparsed("next tuesday".into()))),
            ""
        );
        assert_eq!(n.format_timestamp(Some(&RawTimestamp::Unparsed(String::new()))), "");
    }

    #[test]
    fn test_zoned_timestamp_rendered_in_display_zone() {
        let n = utc_normalizer();
        let zoned = RawTimestamp::Zoned {
            datetime: NaiveDate::from_ymd_opt(2024, 7, 1)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
            tzid: "America/New_York".into(),
        };

        assert_eq!(n.format_timestamp(Some(&zoned)), "2024-07-01 12:30:00");
    }

    #[test]
    fn test_time_skipped_by_dst_moves_forward() {
        let n = Normalizer::new(DisplayZone::Named(chrono_tz::America::New_York));
        let skipped = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let zoned = RawTimestamp::Zoned {
            datetime: skipped,
            tzid: "America/New_York".into(),
        };

        assert_eq!(
            n.format_timestamp(Some(&RawTimestamp::Floating(skipped))),
            "2024-03-10 3:30:00"
        );
        assert_eq!(n.format_timestamp(Some(&zoned)), "2024-03-10 3:30:00");
    }

    #[test]
    fn test_repeated_hour_takes_earlier_instant() {
        let n = utc_normalizer();
        let repeated = RawTimestamp::Zoned {
            datetime: NaiveDate::from_ymd_opt(2024, 11, 3)
                .unwrap()
                .and_hms_opt(1, 30, 0)
                .unwrap(),
            tzid: "America/New_York".into(),
        };

        // 01:30 EDT, not 01:30 EST
        assert_eq!(n.format_timestamp(Some(&repeated)), "2024-11-03 5:30:00");
    }

    #[test]
    fn test_date_only_renders_midnight() {
        let n = utc_normalizer();
        let date = RawTimestamp::Date(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());

        assert_eq!(n.format_timestamp(Some(&date)), "2024-03-04 0:00:00");
    }

    #[test]
    fn test_unparsed_text_is_interpreted_when_possible() {
        let n = utc_normalizer();

        assert_eq!(
            n.format_timestamp(Some(&RawTimestamp::Unparsed("20240105T235900Z".into()))),
            "2024-01-05 23:59:00"
        );
        assert_eq!(
            n.format_timestamp(Some(&RawTimestamp::Unparsed("2024-01-05T07:00:00+02:00".into()))),
            "2024-01-05 5:00:00"
        );
    }

    #[test]
    fn test_link_resolution() {
        assert_eq!(resolve_link(Some(&json!("https://canvas/a/1"))), "https://canvas/a/1");
        assert_eq!(
            resolve_link(Some(&json!({"params": {"VALUE": "URI"}, "val": "https://canvas/a/2"}))),
            "https://canvas/a/2"
        );
        assert_eq!(resolve_link(Some(&json!({"params": {}}))), "");
        assert_eq!(resolve_link(Some(&json!({"val": 42}))), "");
        assert_eq!(resolve_link(Some(&json!(17))), "");
        assert_eq!(resolve_link(None), "");
    }
}
