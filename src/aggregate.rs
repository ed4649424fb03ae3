//! Turning the combined collection into the final listing.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use tracing::{debug, info, instrument};

use crate::models::Screening;

/// Keep screenings starting strictly after `now`, drop exact duplicates and
/// sort ascending by start instant.
///
/// The sort is stable: screenings starting at the same instant keep the
/// order they arrived in. Duplicates (same venue, title, instant and link)
/// happen when a film shows on more than one listing view of a venue.
///
/// # Arguments
///
/// * `screenings` - Everything the venues delivered, in arrival order
/// * `now` - Reference instant; screenings at or before it are dropped
///
/// # Returns
///
/// The upcoming screenings, de-duplicated and in start order.
#[instrument(level = "info", skip_all, fields(input = screenings.len(), %now))]
pub fn aggregate(screenings: Vec<Screening>, now: DateTime<Utc>) -> Vec<Screening> {
    let total = screenings.len();
    let (upcoming, past): (Vec<_>, Vec<_>) =
        screenings.into_iter().partition(|s| s.start_utc() > now);
    debug!(past = past.len(), "Dropped past screenings");

    let mut listing: Vec<Screening> = upcoming
        .into_iter()
        .unique_by(|s| {
            (
                s.venue(),
                s.title().to_string(),
                s.start_utc(),
                s.detail_url().to_string(),
            )
        })
        .collect();
    listing.sort_by_key(|s| s.start_utc());

    info!(
        total,
        past = past.len(),
        kept = listing.len(),
        "Aggregated screenings"
    );
    listing
}
