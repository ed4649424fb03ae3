//! Calendar-feed adapter over the `ical` crate.
//!
//! Only the properties the collectors need are kept: `DTSTART` (with its
//! `TZID` parameter), `SUMMARY` and `URL`. Text values are unescaped per
//! RFC 5545 §3.3.11.

use ical::IcalParser;
use ical::property::Property;
use std::io::BufReader;

use crate::error::FeedError;

/// One `VEVENT`, reduced to the fields screenings are built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEvent {
    /// Raw `DTSTART` value, e.g. `20261021T193000`.
    pub start: Option<String>,
    /// `TZID` parameter of `DTSTART`, if any.
    pub tzid: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
}

/// Parse an iCalendar document into its events.
///
/// # Arguments
///
/// * `bytes` - The raw `.ics` file
///
/// # Returns
///
/// Every `VEVENT`, in document order, with the fields a collector reads. A
/// document without a `VCALENDAR`, or one the parser rejects, is
/// [`FeedError::Malformed`].
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEvent>, FeedError> {
    let mut events = Vec::new();
    let mut calendars = 0usize;

    for calendar in IcalParser::new(BufReader::new(bytes)) {
        let calendar = calendar.map_err(|e| FeedError::Malformed(e.to_string()))?;
        calendars += 1;
        events.extend(calendar.events.iter().map(|ev| to_event(&ev.properties)));
    }

    if calendars == 0 {
        return Err(FeedError::Malformed("no VCALENDAR found".into()));
    }
    Ok(events)
}

fn to_event(properties: &[Property]) -> FeedEvent {
    let mut event = FeedEvent::default();
    for prop in properties {
        match prop.name.to_ascii_uppercase().as_str() {
            "DTSTART" => {
                event.start = prop.value.clone();
                event.tzid = param(prop, "TZID");
            }
            "SUMMARY" => event.summary = prop.value.as_deref().map(unescape_text),
            "URL" => event.url = prop.value.as_deref().map(unescape_text),
            _ => {}
        }
    }
    event
}

fn param(prop: &Property, name: &str) -> Option<String> {
    prop.params
        .as_ref()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first().cloned())
}

/// Undo iCalendar TEXT escaping (`\,` `\;` `\n` `\\`).
pub fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
