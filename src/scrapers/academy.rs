//! Academy Theater, from the revival-series listing and one page per film.
//!
//! The listing page only links to films. Each film page carries the title
//! and a showtime block whose direct children alternate between a day label
//! (`div.st-title`, e.g. `October 21, 2026`) and the container of that day's
//! time spans. Days already gone are marked `.passedshowtime` or hidden.
//!
//! Film pages are visited concurrently, each in its own page of the one
//! pooled session.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{CollectContext, Collector, page_text, text_in};
use crate::error::{CollectError, RenderError};
use crate::models::{Screening, Venue};
use crate::render::{Browser, Page, with_page};
use crate::timeparse::{ACADEMY_LAYOUT, split_time_tokens};

pub const LISTING_URL: &str = "https://academytheaterpdx.com/revivalseries/";

struct Selectors {
    film: &'static str,
    film_link: &'static str,
    title: &'static str,
    showtimes: &'static str,
    day: &'static str,
    passed: &'static str,
    day_label: &'static str,
    time: &'static str,
}

const SELECTORS: Selectors = Selectors {
    film: "div.at-np-bot-pad.at-np-container",
    film_link: "div.at-np-details-title a",
    title: "div.entry-info h1.entry-title",
    showtimes: "div.entry-showtime div.showtime",
    day: "st-title",
    passed: "passedshowtime",
    day_label: "label",
    time: "span",
};

pub struct AcademyCollector;

#[async_trait]
impl Collector for AcademyCollector {
    fn venue(&self) -> Venue {
        Venue::AcademyTheater
    }

    #[instrument(level = "info", skip_all, fields(venue = %Venue::AcademyTheater))]
    async fn collect(&self, ctx: &CollectContext) -> Result<Vec<Screening>, CollectError> {
        let pool = ctx.pool(Venue::AcademyTheater)?;
        let session = pool.acquire().await?;
        let browser: &dyn Browser = &*session;

        let film_urls = with_page(browser, LISTING_URL, ctx.page_timeout, |page| async move {
            film_links(page.as_ref()).await
        })
        .await;
        let film_urls = match film_urls {
            Ok(urls) => urls,
            Err(e) => {
                if e.is_session_loss() {
                    pool.discard(session);
                }
                return Err(e.into());
            }
        };
        info!(films = film_urls.len(), "Indexed film pages");

        let films: Vec<_> = film_urls
            .into_iter()
            .map(|url| film_or_skip(browser, url, ctx))
            .collect();
        let results: Vec<Result<Vec<Screening>, RenderError>> = stream::iter(films)
            .buffer_unordered(ctx.venue_concurrency.max(1))
            .collect()
            .await;
        let screenings: Result<Vec<Vec<Screening>>, RenderError> = results.into_iter().collect();
        pool.finish(session, &screenings);

        let screenings: Vec<Screening> = screenings?.into_iter().flatten().collect();
        info!(count = screenings.len(), "Collected Academy Theater");
        Ok(screenings)
    }
}

/// One film page's screenings. A failed page is skipped; only a lost
/// session is an error.
async fn film_or_skip(
    browser: &dyn Browser,
    url: String,
    ctx: &CollectContext,
) -> Result<Vec<Screening>, RenderError> {
    match scrape_film(browser, &url, ctx).await {
        Ok(found) => {
            debug!(%url, count = found.len(), "Scraped film page");
            Ok(found)
        }
        Err(e) if e.is_session_loss() => Err(e),
        Err(e) => {
            warn!(%url, error = %e, "Film page failed; skipping");
            Ok(Vec::new())
        }
    }
}

/// Absolute, de-duplicated film page URLs from the listing page.
async fn film_links(page: &dyn Page) -> Result<Vec<String>, RenderError> {
    let base = Url::parse(&page.url()).map_err(|e| RenderError::Navigation {
        url: page.url(),
        reason: e.to_string(),
    })?;

    let mut urls = Vec::new();
    for (i, film) in page.find_elements(SELECTORS.film).await?.iter().enumerate() {
        let href = match film.find_element(SELECTORS.film_link).await? {
            Some(link) => link.attribute("href").await?,
            None => None,
        };
        match href.as_deref().map(|h| base.join(h)) {
            Some(Ok(url)) => urls.push(url.to_string()),
            Some(Err(e)) => warn!(index = i, error = %e, "Bad film link"),
            None => warn!(index = i, "Film has no link"),
        }
    }
    Ok(urls.into_iter().unique().collect())
}

async fn scrape_film(
    browser: &dyn Browser,
    url: &str,
    ctx: &CollectContext,
) -> Result<Vec<Screening>, RenderError> {
    with_page(browser, url, ctx.page_timeout, |page| async move {
        let Some(title) = page_text(page.as_ref(), SELECTORS.title).await? else {
            warn!(%url, "Cannot find title");
            return Ok(Vec::new());
        };
        let Some(block) = page.find_element(SELECTORS.showtimes).await? else {
            warn!(%url, %title, "Cannot find showtimes");
            return Ok(Vec::new());
        };

        let children = block.children().await?;
        let mut screenings = Vec::new();
        for (i, child) in children.iter().enumerate() {
            if !child.has_class(SELECTORS.day).await?
                || child.has_class(SELECTORS.passed).await?
                || !child.is_visible().await?
            {
                continue;
            }
            let Some(day) = text_in(child.as_ref(), SELECTORS.day_label).await? else {
                warn!(%url, %title, "Day has no label");
                continue;
            };
            let Some(times) = children.get(i + 1) else {
                warn!(%url, %title, %day, "Day has no times");
                continue;
            };
            if !times.is_visible().await? {
                continue;
            }

            for span in times.find_elements(SELECTORS.time).await? {
                let raw = span.text().await?;
                let (clock, meridiem) = match split_time_tokens(&raw) {
                    Ok(parts) => parts,
                    Err(e) => {
                        warn!(%url, %title, error = %e, "Time is unrecognizable");
                        continue;
                    }
                };
                let assembled = format!("{clock} {meridiem} {day}");
                let start = match ctx.normalizer.parse(ACADEMY_LAYOUT, &assembled) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(%url, %title, error = %e, "Cannot parse time");
                        continue;
                    }
                };
                match Screening::new(&title, Venue::AcademyTheater, start, url) {
                    Ok(s) => screenings.push(s),
                    Err(e) => warn!(%url, error = %e, "Skipping showtime"),
                }
            }
        }
        Ok(screenings)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::html::fixtures::{FixtureSource, fixture_pool};
    use crate::scrapers::testing;
    use chrono::{Datelike, Timelike};

    const LISTING: &str = r#"
<html><body>
  <div class="at-np-bot-pad at-np-container">
    <div class="at-np-details-title"><a href="/movie/heat/">Heat</a></div>
  </div>
  <div class="at-np-bot-pad at-np-container">
    <div class="at-np-details-title"><a href="https://academytheaterpdx.com/movie/ran/">Ran</a></div>
  </div>
  <div class="at-np-bot-pad at-np-container">
    <div class="at-np-details-title"><a href="/movie/heat/">Heat again</a></div>
  </div>
  <div class="at-np-bot-pad at-np-container">
    <div class="at-np-details-title"><a href="/movie/gone/">Gone</a></div>
  </div>
</body></html>"#;

    const HEAT: &str = r#"
<html><body>
  <div class="entry-info"><h1 class="entry-title">Heat</h1></div>
  <div class="entry-showtime"><div class="showtime">
    <div class="st-title passedshowtime"><label>October 19, 2026</label></div>
    <div class="st-times"><span>1:00 pm</span></div>
    <div class="st-title"><label>October 21, 2026</label></div>
    <div class="st-times"><span>2:05 pm</span><span>7:30 pm</span></div>
    <div class="st-title" style="display:none"><label>October 22, 2026</label></div>
    <div class="st-times"><span>7:30 pm</span></div>
    <div class="st-title"><label>October 23, 2026</label></div>
    <div class="st-times"><span>sold out</span><span>9:00 pm</span></div>
  </div></div>
</body></html>"#;

    const RAN: &str = r#"
<html><body>
  <div class="entry-info"><h1 class="entry-title">Ran</h1></div>
  <div class="entry-showtime"><div class="showtime">
    <div class="st-title"><label>November 1, 2026</label></div>
    <div class="st-times"><span>1:30 am</span></div>
  </div></div>
</body></html>"#;

    fn source() -> FixtureSource {
        FixtureSource::default()
            .with(LISTING_URL, LISTING)
            .with("https://academytheaterpdx.com/movie/heat/", HEAT)
            .with("https://academytheaterpdx.com/movie/ran/", RAN)
    }

    #[tokio::test]
    async fn test_collects_each_film_page() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = testing::context(tmp.path(), Some(fixture_pool(source(), 2)));

        let mut screenings = AcademyCollector.collect(&ctx).await.unwrap();
        screenings.sort_by_key(|s| s.start_utc());

        // Heat: two on the 21st, one valid on the 23rd. Ran: one.
        // The missing "gone" page is logged and skipped.
        assert_eq!(screenings.len(), 4);
        let heat: Vec<_> = screenings.iter().filter(|s| s.title() == "Heat").collect();
        assert_eq!(heat.len(), 3);
        assert_eq!((heat[0].start_time().day(), heat[0].start_time().hour()), (21, 14));
        assert_eq!(heat[0].detail_url(), "https://academytheaterpdx.com/movie/heat/");
        assert_eq!((heat[2].start_time().day(), heat[2].start_time().hour()), (23, 21));

        let ran = screenings.iter().find(|s| s.title() == "Ran").unwrap();
        assert_eq!((ran.start_time().month(), ran.start_time().hour()), (11, 1));
    }

    #[tokio::test]
    async fn test_unreachable_listing_is_a_venue_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = testing::context(tmp.path(), Some(fixture_pool(FixtureSource::default(), 1)));
        assert!(matches!(
            AcademyCollector.collect(&ctx).await,
            Err(CollectError::Render(_))
        ));
    }
}
