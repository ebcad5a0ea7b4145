//! ICS feed parsing using the icalendar crate's parser.

use std::collections::HashMap;

use icalendar::parser::{Component, Property, read_calendar, unfold};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use serde_json::{Map, Value};

use crate::error::FeedError;
use crate::event::{CONTAINER_IDENTITY, RawEvent, RawTimestamp};

/// Parse a feed body into raw records.
///
/// The first record is always the container pseudo-record (identity
/// `vcalendar`) carrying the calendar name as its summary. Events follow,
/// one per UID: a later VEVENT with the same UID replaces the earlier one
/// in place, and RECURRENCE-ID overrides are dropped in favour of the master.
pub fn parse_feed(content: &str) -> Result<Vec<RawEvent>, FeedError> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| FeedError::Parse(e.to_string()))?;

    // The parser lifts a lone VCALENDAR's properties onto the calendar itself
    let mut calendar_name = calendar
        .properties
        .iter()
        .find(|p| {
            let name: &str = p.name.as_ref();
            name == "X-WR-CALNAME"
        })
        .map(|p| p.val.to_string());
    let mut vevents = Vec::new();
    collect(&calendar.components, &mut calendar_name, &mut vevents);

    let mut records = vec![RawEvent {
        uid: CONTAINER_IDENTITY.to_string(),
        summary: calendar_name,
        start: None,
        end: None,
        url: None,
    }];
    let mut positions: HashMap<String, usize> = HashMap::new();

    for vevent in vevents {
        if vevent.find_prop("RECURRENCE-ID").is_some() {
            continue;
        }
        let Some(event) = to_raw_event(vevent) else {
            continue;
        };

        match positions.get(&event.uid) {
            Some(&i) => records[i] = event,
            None => {
                positions.insert(event.uid.clone(), records.len());
                records.push(event);
            }
        }
    }

    Ok(records)
}

/// Walk components, descending into VCALENDAR wrappers.
fn collect<'c, 'a>(
    components: &'c [Component<'a>],
    calendar_name: &mut Option<String>,
    vevents: &mut Vec<&'c Component<'a>>,
) {
    for component in components {
        if component.name == "VEVENT" {
            vevents.push(component);
        } else if component.name == "VCALENDAR" {
            if calendar_name.is_none() {
                *calendar_name = component.find_prop("X-WR-CALNAME").map(|p| p.val.to_string());
            }
            collect(&component.components, calendar_name, vevents);
        }
    }
}

fn to_raw_event(vevent: &Component<'_>) -> Option<RawEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    if uid.is_empty() || uid == CONTAINER_IDENTITY {
        return None;
    }

    Some(RawEvent {
        uid,
        summary: vevent.find_prop("SUMMARY").map(|p| p.val.to_string()),
        start: vevent.find_prop("DTSTART").map(to_raw_timestamp),
        end: vevent.find_prop("DTEND").map(to_raw_timestamp),
        url: vevent.find_prop("URL").map(to_link_value),
    })
}

fn to_raw_timestamp(prop: &Property<'_>) -> RawTimestamp {
    match DatePerhapsTime::try_from(prop) {
        Ok(DatePerhapsTime::Date(date)) => RawTimestamp::Date(date),
        Ok(DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt))) => RawTimestamp::Utc(dt),
        Ok(DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive))) => {
            RawTimestamp::Floating(naive)
        }
        Ok(DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid })) => {
            RawTimestamp::Zoned {
                datetime: date_time,
                tzid,
            }
        }
        Err(_) => RawTimestamp::Unparsed(prop.val.to_string()),
    }
}

/// A bare URL becomes a string; one with parameters becomes `{ "val", "params" }`.
fn to_link_value(prop: &Property<'_>) -> Value {
    let val = prop.val.to_string();
    if prop.params.is_empty() {
        return Value::String(val);
    }

    let params: Map<String, Value> = prop
        .params
        .iter()
        .map(|p| {
            let value = p
                .val
                .as_ref()
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null);
            (p.key.to_string(), value)
        })
        .collect();

    let mut link = Map::new();
    link.insert("params".to_string(), Value::Object(params));
    link.insert("val".to_string(), Value::String(val));
    Value::Object(link)
}
