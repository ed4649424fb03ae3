//! CineMagic Theater, from the date tabs of its ticketing page.
//!
//! The now-showing page has one tab per day (`Today Tue 21 Oct`). Clicking a
//! tab replaces the movie list below it, so tabs are worked through one at a
//! time on the same page. Today's tab is already open on load, so it is
//! still read when the backend cannot click. The tabs carry no year; see
//! [`infer_year`](crate::timeparse::infer_year).

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::{CollectContext, Collector, text_in};
use crate::error::{CollectError, RenderError};
use crate::models::{Screening, Venue};
use crate::render::{Page, bounded, with_page};
use crate::timeparse::{CINEMAGIC_LAYOUT, DateTab, infer_year, parse_date_tab, split_time_tokens};

pub const NOW_SHOWING_URL: &str = "https://tickets.thecinemagictheater.com/now-showing";

struct Selectors {
    tab: &'static str,
    movie: &'static str,
    title: &'static str,
    showtime: &'static str,
}

const SELECTORS: Selectors = Selectors {
    tab: "div.calendar-filter li:not(.calendar)",
    movie: "div.movie-container",
    title: "div.text-white div.text-h5",
    showtime: "div.showings.col.row button",
};

pub struct CineMagicCollector;

#[async_trait]
impl Collector for CineMagicCollector {
    fn venue(&self) -> Venue {
        Venue::CineMagicTheater
    }

    #[instrument(level = "info", skip_all, fields(venue = %Venue::CineMagicTheater))]
    async fn collect(&self, ctx: &CollectContext) -> Result<Vec<Screening>, CollectError> {
        let pool = ctx.pool(Venue::CineMagicTheater)?;
        let session = pool.acquire().await?;

        let screenings = with_page(&*session, NOW_SHOWING_URL, ctx.page_timeout, |page| async move {
            let tabs = page.find_elements(SELECTORS.tab).await?;
            info!(tabs = tabs.len(), "Found date tabs");
            let today = ctx.normalizer.today(ctx.now);

            let mut screenings = Vec::new();
            for (i, tab) in tabs.iter().enumerate() {
                let raw = tab.text().await?;
                let date = match parse_date_tab(&raw) {
                    Ok(date) => date,
                    Err(e) => {
                        warn!(index = i, error = %e, "Unrecognizable date tab; skipping");
                        continue;
                    }
                };
                let year = infer_year(today, date.month);
                debug!(
                    index = i,
                    weekday = %date.weekday,
                    day = date.day,
                    month = %date.month_token,
                    year,
                    "Date tab"
                );

                let opened = async {
                    tab.click().await?;
                    bounded(ctx.page_timeout, "date tab", page.wait_stable()).await
                };
                match opened.await {
                    Ok(()) => {}
                    // Today's tab is the one shown on load.
                    Err(RenderError::Unsupported(_)) if is_today(&raw) => {
                        debug!(index = i, "Reading today's tab without a click");
                    }
                    Err(e) if e.is_session_loss() => return Err(e),
                    Err(e) => {
                        warn!(index = i, error = %e, "Cannot open date tab; skipping");
                        continue;
                    }
                }

                match scrape_showings(page.as_ref(), &date, year, ctx).await {
                    Ok(found) => {
                        debug!(index = i, count = found.len(), "Scraped date tab");
                        screenings.extend(found);
                    }
                    Err(e) if e.is_session_loss() => return Err(e),
                    Err(e) => warn!(index = i, error = %e, "Cannot read date tab; skipping"),
                }
            }
            Ok(screenings)
        })
        .await;
        pool.finish(session, &screenings);
        let screenings = screenings?;

        info!(count = screenings.len(), "Collected CineMagic Theater");
        Ok(screenings)
    }
}

fn is_today(tab_text: &str) -> bool {
    tab_text
        .split_whitespace()
        .any(|t| t.eq_ignore_ascii_case("today"))
}

/// Read every movie and its showtime buttons as currently shown for `date`.
async fn scrape_showings(
    page: &dyn Page,
    date: &DateTab,
    year: i32,
    ctx: &CollectContext,
) -> Result<Vec<Screening>, RenderError> {
    let mut screenings = Vec::new();
    for movie in page.find_elements(SELECTORS.movie).await? {
        let Some(title) = text_in(movie.as_ref(), SELECTORS.title).await? else {
            warn!(date = %date.month_token, day = date.day, "Cannot find title");
            continue;
        };
        for button in movie.find_elements(SELECTORS.showtime).await? {
            let raw = button.text().await?;
            let (clock, meridiem) = match split_time_tokens(&raw) {
                Ok(parts) => parts,
                Err(e) => {
                    warn!(%title, error = %e, "Time is unrecognizable");
                    continue;
                }
            };
            let assembled = date.assemble(year, &format!("{clock} {meridiem}"));
            let start = match ctx.normalizer.parse(CINEMAGIC_LAYOUT, &assembled) {
                Ok(t) => t,
                Err(e) => {
                    warn!(%title, error = %e, "Cannot parse time");
                    continue;
                }
            };
            match Screening::new(&title, Venue::CineMagicTheater, start, NOW_SHOWING_URL) {
                Ok(s) => screenings.push(s),
                Err(e) => warn!(%title, error = %e, "Skipping showtime"),
            }
        }
    }
    Ok(screenings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::html::StaticBrowser;
    use crate::render::html::fixtures::{FixtureSource, fixture_pool};
    use crate::render::Browser;
    use crate::scrapers::testing;
    use chrono::{Datelike, TimeZone, Timelike, Utc};
    use chrono_tz::America::Los_Angeles;
    use std::sync::Arc;

    const PAGE: &str = r#"
<html><body>
  <div class="calendar-filter"><ul>
    <li class="calendar">Pick a date</li>
    <li>Today Tue 20 Oct</li>
    <li>Wed 21 Oct</li>
  </ul></div>
  <div class="movie-container">
    <div class="text-white"><div class="text-h5"> The Wild Robot </div></div>
    <div class="showings col row"><button>4:15 PM</button><button>6:45 pm</button></div>
  </div>
  <div class="movie-container">
    <div class="text-white"><div class="text-h5">Anora</div></div>
    <div class="showings col row"><button>Sold Out Tonight</button><button>9:10 PM</button></div>
  </div>
</body></html>"#;

    #[tokio::test]
    async fn test_scrape_showings_of_open_tab() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = testing::context(tmp.path(), None);
        let browser = StaticBrowser::new(Arc::new(
            FixtureSource::default().with(NOW_SHOWING_URL, PAGE),
        ));
        let page = browser.open_page(NOW_SHOWING_URL).await.unwrap();
        let date = parse_date_tab("Wed 21 Oct").unwrap();

        let screenings = scrape_showings(page.as_ref(), &date, 2026, &ctx).await.unwrap();
        assert_eq!(screenings.len(), 3);
        assert_eq!(screenings[0].title(), "The Wild Robot");
        assert_eq!((screenings[0].start_time().day(), screenings[0].start_time().hour()), (21, 16));
        assert_eq!(screenings[1].start_time().minute(), 45);
        assert_eq!(screenings[2].title(), "Anora");
        assert_eq!(screenings[2].detail_url(), NOW_SHOWING_URL);
        assert_eq!(screenings[2].start_time().year(), 2026);
    }

    #[tokio::test]
    async fn test_without_clicks_only_todays_tab_is_read() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = fixture_pool(FixtureSource::default().with(NOW_SHOWING_URL, PAGE), 1);
        let ctx = testing::context(tmp.path(), Some(pool));

        let screenings = CineMagicCollector.collect(&ctx).await.unwrap();
        assert_eq!(screenings.len(), 3);
        assert!(screenings.iter().all(|s| s.start_time().day() == 20));
    }

    const NEW_YEAR_TABS: &str = r#"
<html><body>
  <div class="calendar-filter"><ul>
    <li class="calendar">Pick a date</li>
    <li>Today Wed 30 Dec</li>
    <li>Thu 31 Dec</li>
    <li>Fri 1 Jan</li>
  </ul></div>
  <div class="movie-container">
    <div class="text-white"><div class="text-h5">Nosferatu</div></div>
    <div class="showings col row"><button>7:00 PM</button></div>
  </div>
</body></html>"#;

    fn day_list(title: &str, times: &[&str]) -> String {
        let buttons: String = times.iter().map(|t| format!("<button>{t}</button>")).collect();
        format!(
            r#"<html><body><div class="movie-container">
                 <div class="text-white"><div class="text-h5">{title}</div></div>
                 <div class="showings col row">{buttons}</div>
               </div></body></html>"#
        )
    }

    #[tokio::test]
    async fn test_every_tab_is_read_after_its_click() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FixtureSource::default()
            .with(NOW_SHOWING_URL, NEW_YEAR_TABS)
            .on_click("30 Dec", &day_list("Nosferatu", &["7:00 PM"]))
            .on_click("31 Dec", &day_list("The Thin Man", &["5:00 PM", "9:30 PM"]))
            .on_click("1 Jan", &day_list("Brazil", &["2:00 PM"]));
        let mut ctx = testing::context(tmp.path(), Some(fixture_pool(source, 1)));
        ctx.now = Los_Angeles
            .with_ymd_and_hms(2026, 12, 30, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        let screenings = CineMagicCollector.collect(&ctx).await.unwrap();
        let days: Vec<_> = screenings
            .iter()
            .map(|s| (s.title(), s.start_time().year(), s.start_time().month(), s.start_time().day()))
            .collect();
        assert_eq!(
            days,
            vec![
                ("Nosferatu", 2026, 12, 30),
                ("The Thin Man", 2026, 12, 31),
                ("The Thin Man", 2026, 12, 31),
                ("Brazil", 2027, 1, 1),
            ]
        );
        assert_eq!(screenings[2].start_time().hour(), 21);
        assert_eq!(screenings[3].start_time().hour(), 14);
    }

    #[test]
    fn test_is_today() {
        assert!(is_today("Today\nTue\n20\nOct"));
        assert!(!is_today("Wed 21 Oct"));
    }

    #[tokio::test]
    async fn test_unreachable_page_is_a_venue_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = testing::context(tmp.path(), Some(fixture_pool(FixtureSource::default(), 1)));
        assert!(matches!(
            CineMagicCollector.collect(&ctx).await,
            Err(CollectError::Render(_))
        ));
    }
}
