//! Clinton State Theater, from its syndicated iCalendar feed.
//!
//! The feed is fetched through the [`ArtifactCache`](crate::cache::ArtifactCache)
//! under a fixed key, so runs within the cache TTL reuse the same file.

use async_trait::async_trait;
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};

use super::feed::{FeedEvent, parse_feed};
use super::{CollectContext, Collector};
use crate::error::CollectError;
use crate::models::{Screening, Venue};
use crate::timeparse::parse_ical_datetime;
use crate::utils::truncate_for_log;

pub const FEED_KEY: &str = "cstpdx.ics";
pub const FEED_URL: &str = "https://cstpdx.com/schedule/list/?ical=1";

pub struct ClintonCollector;

#[async_trait]
impl Collector for ClintonCollector {
    fn venue(&self) -> Venue {
        Venue::ClintonStateTheater
    }

    #[instrument(level = "info", skip_all, fields(venue = %Venue::ClintonStateTheater))]
    async fn collect(&self, ctx: &CollectContext) -> Result<Vec<Screening>, CollectError> {
        let path = ctx.cache.fetch_or_download(FEED_KEY, FEED_URL).await?;
        let bytes = tokio::fs::read(&path).await?;
        let events = parse_feed(&bytes)?;
        info!(events = events.len(), "Parsed calendar feed");

        let tz = ctx.normalizer.tz();
        let screenings: Vec<Screening> = events
            .iter()
            .enumerate()
            .filter_map(|(i, ev)| to_screening(i, ev, tz))
            .collect();

        info!(count = screenings.len(), "Collected Clinton State Theater");
        Ok(screenings)
    }
}

fn to_screening(index: usize, ev: &FeedEvent, tz: Tz) -> Option<Screening> {
    let Some(raw_start) = ev.start.as_deref() else {
        warn!(index, "Event has no DTSTART; skipping");
        return None;
    };
    let start = match parse_ical_datetime(raw_start, ev.tzid.as_deref(), tz) {
        Ok(t) => t,
        Err(e) => {
            warn!(index, error = %e, "Cannot parse event start; skipping");
            return None;
        }
    };
    let Some(summary) = ev.summary.as_deref() else {
        warn!(index, "Event has no SUMMARY; skipping");
        return None;
    };
    let url = ev
        .url
        .as_deref()
        .unwrap_or(Venue::ClintonStateTheater.base_url());

    match Screening::new(summary, Venue::ClintonStateTheater, start, url) {
        Ok(s) => {
            debug!(index, title = %truncate_for_log(s.title(), 80), "Feed event");
            Some(s)
        }
        Err(e) => {
            warn!(index, error = %e, "Skipping feed event");
            None
        }
    }
}
