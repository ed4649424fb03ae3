//! Hollywood Theater, from the rendered event grid on its home page.
//!
//! The home page shows a grid of event cards for the current week. Each card
//! has a title, a carousel of days and, in the active carousel slide, a
//! `Tue, October 21` style header followed by showtime links. A "Coming Soon"
//! tab swaps in a second grid with the same card layout.
//!
//! Day headers carry no year, so the current year is assumed and
//! [`roll_forward_if_stale`] moves anything more than six months old into
//! next year.

use async_trait::async_trait;
use chrono::Datelike;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::{CollectContext, Collector, text_in};
use crate::error::{CollectError, RenderError};
use crate::models::{Screening, Venue};
use crate::render::{Element, Page, bounded, with_page};
use crate::timeparse::{
    HOLLYWOOD_LAYOUT, month_from_token, month_name, parse_day_header, roll_forward_if_stale,
    split_time_tokens,
};
use crate::utils::truncate_for_log;

pub const HOME_URL: &str = "https://hollywoodtheatre.org/";

struct Selectors {
    card: &'static str,
    title: &'static str,
    day_header: &'static str,
    showtimes: &'static str,
    coming_soon_tab: &'static str,
}

const SELECTORS: Selectors = Selectors {
    card: ".event-grid-item",
    title: ".event-grid-header h3",
    day_header: "div.event-grid-showtimes div.carousel-item.active h4.showtimes_date_header",
    showtimes: "div.event-grid-showtimes div.carousel-item.active .showtime-square a",
    coming_soon_tab: r#"a[data-events-target="comingSoonTab"]"#,
};

pub struct HollywoodCollector;

#[async_trait]
impl Collector for HollywoodCollector {
    fn venue(&self) -> Venue {
        Venue::HollywoodTheatre
    }

    #[instrument(level = "info", skip_all, fields(venue = %Venue::HollywoodTheatre))]
    async fn collect(&self, ctx: &CollectContext) -> Result<Vec<Screening>, CollectError> {
        let pool = ctx.pool(Venue::HollywoodTheatre)?;
        let session = pool.acquire().await?;

        let screenings = with_page(&*session, HOME_URL, ctx.page_timeout, |page| async move {
            let mut screenings = scrape_grid(page.as_ref(), ctx, "now playing").await?;
            match open_coming_soon(page.as_ref(), ctx).await {
                Ok(true) => {
                    screenings.extend(scrape_grid(page.as_ref(), ctx, "coming soon").await?)
                }
                Ok(false) => warn!("No \"Coming Soon\" tab; using the first grid only"),
                Err(e) if e.is_session_loss() => return Err(e),
                Err(e) => warn!(error = %e, "Cannot open \"Coming Soon\"; using the first grid only"),
            }
            Ok(screenings)
        })
        .await;
        pool.finish(session, &screenings);
        let screenings = screenings?;

        info!(count = screenings.len(), "Collected Hollywood Theater");
        Ok(screenings)
    }
}

/// Click the "Coming Soon" tab and wait for the grid to settle.
/// `Ok(false)` if the page has no such tab.
async fn open_coming_soon(page: &dyn Page, ctx: &CollectContext) -> Result<bool, RenderError> {
    let Some(tab) = page.find_element(SELECTORS.coming_soon_tab).await? else {
        return Ok(false);
    };
    tab.click().await?;
    bounded(ctx.page_timeout, "coming soon grid", page.wait_stable()).await?;
    Ok(true)
}

/// Scrape every event card currently on the page, a few at a time.
async fn scrape_grid(
    page: &dyn Page,
    ctx: &CollectContext,
    grid: &'static str,
) -> Result<Vec<Screening>, RenderError> {
    let cards = page.find_elements(SELECTORS.card).await?;
    info!(grid, cards = cards.len(), "Scraping event grid");

    let cards: Vec<_> = cards
        .into_iter()
        .enumerate()
        .map(|(i, card)| scrape_card(i, card, ctx))
        .collect();
    let screenings: Vec<Result<Vec<Screening>, RenderError>> = stream::iter(cards)
        .buffer_unordered(ctx.venue_concurrency.max(1))
        .collect()
        .await;
    let screenings: Vec<Vec<Screening>> = screenings.into_iter().collect::<Result<_, _>>()?;
    Ok(screenings.into_iter().flatten().collect())
}

/// A card that cannot be read is skipped; only a lost session is an error.
async fn scrape_card(
    index: usize,
    card: Box<dyn Element>,
    ctx: &CollectContext,
) -> Result<Vec<Screening>, RenderError> {
    match try_scrape_card(index, card.as_ref(), ctx).await {
        Ok(screenings) => Ok(screenings),
        Err(e) if e.is_session_loss() => Err(e),
        Err(e) => {
            warn!(index, error = %e, "Cannot read event card; skipping");
            Ok(Vec::new())
        }
    }
}

async fn try_scrape_card(
    index: usize,
    card: &dyn Element,
    ctx: &CollectContext,
) -> Result<Vec<Screening>, RenderError> {
    let Some(title) = text_in(card, SELECTORS.title).await? else {
        warn!(index, "Cannot find title");
        return Ok(Vec::new());
    };
    let Some(header) = text_in(card, SELECTORS.day_header).await? else {
        warn!(index, %title, "Cannot find day");
        return Ok(Vec::new());
    };
    let (month, day) = match parse_day_header(&header) {
        Ok(parts) => parts,
        Err(e) => {
            warn!(index, %title, error = %e, "Day is unrecognizable");
            return Ok(Vec::new());
        }
    };
    let month = month_from_token(&month)
        .and_then(month_name)
        .map(str::to_string)
        .unwrap_or(month);
    let year = ctx.normalizer.today(ctx.now).year();
    debug!(index, title = %truncate_for_log(&title, 80), %header, "Event card");

    let mut screenings = Vec::new();
    for link in card.find_elements(SELECTORS.showtimes).await? {
        let raw = link.text().await?;
        let (clock, meridiem) = match split_time_tokens(&raw) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(index, %title, error = %e, "Time is unrecognizable");
                continue;
            }
        };
        let assembled = format!("{clock} {meridiem} {month} {day} {year}");
        let start = match ctx.normalizer.parse(HOLLYWOOD_LAYOUT, &assembled) {
            Ok(t) => roll_forward_if_stale(t, ctx.now),
            Err(e) => {
                warn!(index, %title, error = %e, "Cannot parse time");
                continue;
            }
        };
        let href = link.attribute("href").await?.unwrap_or_else(|| HOME_URL.to_string());
        match Screening::new(&title, Venue::HollywoodTheatre, start, &href) {
            Ok(s) => screenings.push(s),
            Err(e) => warn!(index, %title, error = %e, "Skipping showtime"),
        }
    }
    Ok(screenings)
}
