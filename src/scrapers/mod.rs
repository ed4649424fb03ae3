//! Per-venue screening collectors.
//!
//! Every venue publishes its schedule differently, so each one gets its own
//! [`Collector`]. They all follow the same two-phase pattern:
//!
//! 1. **Locate**: fetch the venue's feed through the artifact cache, or open
//!    its listing page in a pooled rendering session
//! 2. **Extract**: pull title, date/time text and link out of each listing and
//!    normalize them into [`Screening`]s
//!
//! # Supported Venues
//!
//! | Venue | Module | Method | Notes |
//! |-------|--------|--------|-------|
//! | Clinton State Theater | [`clinton`] | iCalendar feed | Cached for the cache TTL |
//! | Hollywood Theater | [`hollywood`] | Rendered page | Two grids: current and "Coming Soon" |
//! | Academy Theater | [`academy`] | Rendered pages | Listing page, then one page per film |
//! | CineMagic Theater | [`cinemagic`] | Rendered page | One date tab at a time |
//!
//! # Failure Policy
//!
//! A listing with a missing element or an unparseable time is logged and
//! skipped. Failing to reach the venue's feed or page is returned as a
//! [`CollectError`] and the venue contributes nothing.
//!
//! Collectors do not drop past showtimes; that happens once, in
//! [`crate::aggregate`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ArtifactCache;
use crate::error::{CollectError, RenderError};
use crate::models::{Screening, Venue};
use crate::render::pool::RenderPool;
use crate::render::{Element, Page};
use crate::timeparse::{TimeNormalizer, collapse_whitespace};

pub mod academy;
pub mod cinemagic;
pub mod clinton;
pub mod feed;
pub mod hollywood;

/// Everything a collector may use during one run.
pub struct CollectContext {
    /// Instant the run started; used for year inference.
    pub now: DateTime<Utc>,
    pub normalizer: TimeNormalizer,
    pub cache: Arc<ArtifactCache>,
    /// Absent when no rendered venue is configured.
    pub pool: Option<Arc<RenderPool>>,
    /// Bound on opening a page and waiting for it to settle.
    pub page_timeout: Duration,
    /// How many sub-pages or cards a venue works on at once.
    pub venue_concurrency: usize,
}

impl CollectContext {
    /// The render pool, or [`CollectError::NoRenderer`] for `venue`.
    pub fn pool(&self, venue: Venue) -> Result<&RenderPool, CollectError> {
        self.pool
            .as_deref()
            .ok_or(CollectError::NoRenderer(venue.display_name()))
    }
}

/// Produces the screenings of one venue.
#[async_trait]
pub trait Collector: Send + Sync {
    fn venue(&self) -> Venue;

    async fn collect(&self, ctx: &CollectContext) -> Result<Vec<Screening>, CollectError>;
}

/// The collector for `venue`.
///
/// # Arguments
///
/// * `venue` - Any of [`Venue::ALL`]
///
/// # Returns
///
/// A shareable collector, ready to be spawned by the orchestrator.
pub fn collector_for(venue: Venue) -> Arc<dyn Collector> {
    match venue {
        Venue::ClintonStateTheater => Arc::new(clinton::ClintonCollector),
        Venue::HollywoodTheatre => Arc::new(hollywood::HollywoodCollector),
        Venue::AcademyTheater => Arc::new(academy::AcademyCollector),
        Venue::CineMagicTheater => Arc::new(cinemagic::CineMagicCollector),
    }
}

/// Whitespace-collapsed text of the first descendant of `el` matching `selector`.
pub(crate) async fn text_in(
    el: &dyn Element,
    selector: &str,
) -> Result<Option<String>, RenderError> {
    match el.find_element(selector).await? {
        Some(found) => Ok(Some(collapse_whitespace(&found.text().await?))),
        None => Ok(None),
    }
}

/// Like [`text_in`], searching the whole page.
pub(crate) async fn page_text(
    page: &dyn Page,
    selector: &str,
) -> Result<Option<String>, RenderError> {
    match page.find_element(selector).await? {
        Some(found) => Ok(Some(collapse_whitespace(&found.text().await?))),
        None => Ok(None),
    }
}
