//! Data models for venues and the screenings collected from them.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Venue`]: The closed set of theaters the collectors know how to read
//! - [`Screening`]: One film showing at one venue at one time
//!
//! A [`Screening`] can only be built through [`Screening::new`], which trims
//! the title and resolves the detail URL against the venue's site. Once built
//! it is never mutated.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::ScreeningError;

/// A theater that publishes screening listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Venue {
    ClintonStateTheater,
    HollywoodTheatre,
    AcademyTheater,
    CineMagicTheater,
}

impl Venue {
    /// Every known venue, in the order collectors are launched.
    pub const ALL: [Venue; 4] = [
        Venue::ClintonStateTheater,
        Venue::HollywoodTheatre,
        Venue::AcademyTheater,
        Venue::CineMagicTheater,
    ];

    /// Human readable name used in the rendered listing.
    pub fn display_name(&self) -> &'static str {
        match self {
            Venue::ClintonStateTheater => "Clinton State Theater",
            Venue::HollywoodTheatre => "Hollywood Theater",
            Venue::AcademyTheater => "Academy Theater",
            Venue::CineMagicTheater => "CineMagic Theater",
        }
    }

    /// Short identifier accepted by `--venues` and the config file.
    pub fn slug(&self) -> &'static str {
        match self {
            Venue::ClintonStateTheater => "clinton",
            Venue::HollywoodTheatre => "hollywood",
            Venue::AcademyTheater => "academy",
            Venue::CineMagicTheater => "cinemagic",
        }
    }

    /// Site root that relative detail links are resolved against.
    pub fn base_url(&self) -> &'static str {
        match self {
            Venue::ClintonStateTheater => "https://cstpdx.com",
            Venue::HollywoodTheatre => "https://hollywoodtheatre.org",
            Venue::AcademyTheater => "https://academytheaterpdx.com",
            Venue::CineMagicTheater => "https://tickets.thecinemagictheater.com",
        }
    }

    /// Whether collecting this venue needs a rendering session.
    pub fn needs_renderer(&self) -> bool {
        !matches!(self, Venue::ClintonStateTheater)
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Venue::ALL
            .into_iter()
            .find(|v| v.slug() == wanted)
            .ok_or_else(|| {
                let known = Venue::ALL.iter().map(|v| v.slug()).collect::<Vec<_>>().join(", ");
                format!("unknown venue '{s}' (expected one of: {known})")
            })
    }
}

impl Serialize for Venue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

/// A single film showing at one venue at one time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Screening {
    title: String,
    venue: Venue,
    start_time: DateTime<Tz>,
    detail_url: String,
}

impl Screening {
    /// Build a screening, trimming the title and making the detail URL absolute.
    ///
    /// # Errors
    ///
    /// - [`ScreeningError::EmptyTitle`] if the title is blank after trimming
    /// - [`ScreeningError::BadUrl`] if the link cannot be resolved against the
    ///   venue's site
    pub fn new(
        title: &str,
        venue: Venue,
        start_time: DateTime<Tz>,
        detail_url: &str,
    ) -> Result<Self, ScreeningError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ScreeningError::EmptyTitle);
        }
        let detail_url = absolutize(venue, detail_url.trim())?;
        Ok(Self {
            title: title.to_string(),
            venue,
            start_time,
            detail_url,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn start_time(&self) -> DateTime<Tz> {
        self.start_time
    }

    /// The start time as a UTC instant, used for ordering across venues.
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start_time.with_timezone(&Utc)
    }

    pub fn detail_url(&self) -> &str {
        &self.detail_url
    }
}

/// Resolve `link` against the venue's site root. Absolute links pass through.
fn absolutize(venue: Venue, link: &str) -> Result<String, ScreeningError> {
    if let Ok(absolute) = Url::parse(link) {
        return Ok(absolute.to_string());
    }
    let base = Url::parse(venue.base_url()).map_err(|e| ScreeningError::BadUrl {
        url: venue.base_url().to_string(),
        reason: e.to_string(),
    })?;
    base.join(link)
        .map(|u| u.to_string())
        .map_err(|e| ScreeningError::BadUrl {
            url: link.to_string(),
            reason: e.to_string(),
        })
}
