//! Turning venue-specific date/time text into absolute timestamps.
//!
//! Every venue prints showtimes differently, so each collector assembles its
//! raw tokens into one string and hands it to [`TimeNormalizer::parse`] with a
//! fixed layout:
//!
//! | Venue | Assembled text | Layout |
//! |-------|----------------|--------|
//! | Hollywood | `7:30 PM October 21 2026` | [`HOLLYWOOD_LAYOUT`] |
//! | Academy | `7:30 PM October 21, 2026` | [`ACADEMY_LAYOUT`] |
//! | CineMagic | `October 21 2026 7:30 PM` | [`CINEMAGIC_LAYOUT`] |
//!
//! Two sources omit the year and resolve it differently. CineMagic uses
//! [`infer_year`] (December tabs showing January mean next year); Hollywood
//! assumes the current year and then applies [`roll_forward_if_stale`].
//! The two heuristics are intentionally separate.

use chrono::{DateTime, Datelike, Duration, Month, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TimeParseError;

pub const HOLLYWOOD_LAYOUT: &str = "%I:%M %p %B %d %Y";
pub const ACADEMY_LAYOUT: &str = "%I:%M %p %B %d, %Y";
pub const CINEMAGIC_LAYOUT: &str = "%B %d %Y %I:%M %p";

/// Days in the past a Hollywood showtime may land before it is assumed to
/// belong to next year.
pub const STALE_AFTER_DAYS: i64 = 30 * 6;

pub const SHORT_WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

static GLUED_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}:\d{2})\s*([AaPp])\.?[Mm]\.?$").expect("valid regex"));

/// Parses assembled date/time text in a venue's time zone.
#[derive(Debug, Clone, Copy)]
pub struct TimeNormalizer {
    tz: Tz,
}

impl TimeNormalizer {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Parse `raw` against a `chrono` layout and place it in the venue zone.
    ///
    /// Runs of whitespace are collapsed first, so text pulled out of the DOM
    /// with stray newlines still matches. A local time repeated by a DST
    /// fall-back resolves to the earlier instant.
    pub fn parse(&self, layout: &str, raw: &str) -> Result<DateTime<Tz>, TimeParseError> {
        let text = collapse_whitespace(raw);
        let naive = NaiveDateTime::parse_from_str(&text, layout).map_err(|e| {
            TimeParseError::Layout {
                input: text.clone(),
                layout: layout.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.localize(naive)
    }

    /// Place a wall-clock time in the venue zone.
    pub fn localize(&self, naive: NaiveDateTime) -> Result<DateTime<Tz>, TimeParseError> {
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| TimeParseError::NonexistentLocalTime(naive.to_string()))
    }

    /// Today's date as seen from the venue.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }
}

/// Collapse internal whitespace runs to single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pick the year for a date printed without one.
///
/// # Arguments
///
/// * `today` - The venue-local date of the run
/// * `month` - Month number printed on the listing, `1..=12`
///
/// # Returns
///
/// The current year, except that a January date seen in December belongs to
/// next year.
pub fn infer_year(today: NaiveDate, month: u32) -> i32 {
    if today.month() == 12 && month == 1 {
        today.year() + 1
    } else {
        today.year()
    }
}

/// Push a timestamp forward one year if it is more than [`STALE_AFTER_DAYS`] behind `now`.
pub fn roll_forward_if_stale(t: DateTime<Tz>, now: DateTime<Utc>) -> DateTime<Tz> {
    if now.signed_duration_since(t) <= Duration::days(STALE_AFTER_DAYS) {
        return t;
    }
    let tz = t.timezone();
    t.naive_local()
        .checked_add_months(Months::new(12))
        .and_then(|n| tz.from_local_datetime(&n).earliest())
        .unwrap_or(t)
}

/// Month number for an English month name or abbreviation ("Jan", "Sept", "January").
pub fn month_from_token(token: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january", "february", "march", "april", "may", "june", "july", "august",
        "september", "october", "november", "december",
    ];
    let t = token.trim().trim_end_matches(['.', ',']).to_lowercase();
    if t.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(&t))
        .map(|i| i as u32 + 1)
}

/// Full English name of a month number, e.g. `10` → `"October"`.
pub fn month_name(month: u32) -> Option<&'static str> {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
}

/// Split a showtime like `7:30 pm` into `("7:30", "PM")`.
///
/// Exactly two whitespace-separated tokens are expected; the glued form
/// `7:30pm` is also accepted.
pub fn split_time_tokens(raw: &str) -> Result<(String, String), TimeParseError> {
    let fields: Vec<&str> = raw.split_whitespace().collect();
    match fields.as_slice() {
        [clock, meridiem] => Ok((clock.to_string(), meridiem.to_uppercase())),
        [glued] => GLUED_TIME
            .captures(glued)
            .map(|c| (c[1].to_string(), format!("{}M", c[2].to_uppercase())))
            .ok_or_else(|| TimeParseError::TokenCount {
                input: raw.to_string(),
                expected: 2,
                found: 1,
            }),
        _ => Err(TimeParseError::TokenCount {
            input: raw.to_string(),
            expected: 2,
            found: fields.len(),
        }),
    }
}

/// Split a Hollywood day header like `Tue, October 21` into `(month, day)`.
pub fn parse_day_header(raw: &str) -> Result<(String, String), TimeParseError> {
    let fields: Vec<&str> = raw
        .split_whitespace()
        .map(|f| f.trim_end_matches(','))
        .collect();
    if fields.len() != 3 {
        return Err(TimeParseError::TokenCount {
            input: raw.to_string(),
            expected: 3,
            found: fields.len(),
        });
    }
    Ok((fields[1].to_string(), fields[2].to_string()))
}

/// The three tokens printed on a CineMagic calendar tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTab {
    pub weekday: String,
    pub day: u32,
    pub month: u32,
    /// The month as printed, kept for log lines and layout assembly.
    pub month_token: String,
}

impl DateTab {
    /// Assemble tab date and button time into text for [`CINEMAGIC_LAYOUT`].
    ///
    /// The month is written out in full so abbreviations like "Sept" parse.
    pub fn assemble(&self, year: i32, showtime: &str) -> String {
        let month = month_name(self.month).unwrap_or(self.month_token.as_str());
        format!(
            "{} {} {} {}",
            month,
            self.day,
            year,
            collapse_whitespace(showtime)
        )
    }
}

/// Parse a CineMagic tab such as `Today\nTue\n21\nOct`.
///
/// The word "Today" is dropped, then exactly weekday, day and month must
/// remain and the weekday must be a short English name.
pub fn parse_date_tab(raw: &str) -> Result<DateTab, TimeParseError> {
    let tokens: Vec<&str> = raw
        .split_whitespace()
        .filter(|t| !t.eq_ignore_ascii_case("today"))
        .collect();
    if tokens.len() != 3 {
        return Err(TimeParseError::TokenCount {
            input: collapse_whitespace(raw),
            expected: 3,
            found: tokens.len(),
        });
    }
    let (weekday, day, month_token) = (tokens[0], tokens[1], tokens[2]);
    if !SHORT_WEEKDAYS.contains(&weekday) {
        return Err(TimeParseError::BadToken {
            token: weekday.to_string(),
            kind: "weekday",
        });
    }
    let day = day
        .parse::<u32>()
        .ok()
        .filter(|d| (1..=31).contains(d))
        .ok_or_else(|| TimeParseError::BadToken {
            token: day.to_string(),
            kind: "day of month",
        })?;
    let month = month_from_token(month_token).ok_or_else(|| TimeParseError::BadToken {
        token: month_token.to_string(),
        kind: "month",
    })?;
    Ok(DateTab {
        weekday: weekday.to_string(),
        day,
        month,
        month_token: month_token.to_string(),
    })
}

/// Parse an iCalendar `DTSTART` value.
///
/// Handles UTC (`20261021T193000Z`), zoned (`TZID=...`), floating local times
/// and all-day `VALUE=DATE` values. Floating and all-day values are taken to
/// be in `default_tz`.
pub fn parse_ical_datetime(
    value: &str,
    tzid: Option<&str>,
    default_tz: Tz,
) -> Result<DateTime<Tz>, TimeParseError> {
    let value = value.trim();
    let layout_err = |layout: &str, e: chrono::ParseError| TimeParseError::Layout {
        input: value.to_string(),
        layout: layout.to_string(),
        reason: e.to_string(),
    };

    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .map_err(|e| layout_err("%Y%m%dT%H%M%SZ", e))?;
        return Ok(Utc.from_utc_datetime(&naive).with_timezone(&default_tz));
    }

    let tz = match tzid {
        Some(name) => name
            .trim_matches('"')
            .parse::<Tz>()
            .map_err(|_| TimeParseError::BadToken {
                token: name.to_string(),
                kind: "time zone",
            })?,
        None => default_tz,
    };

    let naive = if value.len() == 8 {
        NaiveDate::parse_from_str(value, "%Y%m%d")
            .map_err(|e| layout_err("%Y%m%d", e))?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| TimeParseError::NonexistentLocalTime(value.to_string()))?
    } else {
        NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
            .map_err(|e| layout_err("%Y%m%dT%H%M%S", e))?
    };

    let local = TimeNormalizer::new(tz).localize(naive)?;
    Ok(local.with_timezone(&default_tz))
}
