//! # movie_cal
//!
//! Collects upcoming movie screenings from a handful of independent
//! Portland theaters and prints one chronological listing.
//!
//! ## Venues
//!
//! - Clinton State Theater, from its iCalendar feed (cached on disk)
//! - Hollywood Theatre, Academy Theater and CineMagic Theater, from their
//!   rendered web pages through a bounded pool of browser sessions
//!
//! ## Usage
//!
//! ```sh
//! movie_cal --venues clinton,academy -j ./json
//! ```
//!
//! ## Architecture
//!
//! 1. **Settings**: CLI flags, environment and an optional YAML file
//! 2. **Collection**: one task per venue, results streamed over a bounded channel
//! 3. **Aggregation**: drop past screenings, de-duplicate, sort by start time
//! 4. **Output**: text listing on stdout, optional JSON copy on disk

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod aggregate;
mod cache;
mod cli;
mod config;
mod download;
mod error;
mod models;
mod orchestrator;
mod outputs;
mod render;
mod scrapers;
mod timeparse;
mod utils;

use cache::ArtifactCache;
use cli::{Cli, Engine};
use config::Settings;
use download::HttpDownloader;
use error::RunError;
use outputs::json::{self, Listing};
use outputs::text::render_listing;
use render::Launcher;
use render::chrome::{ChromeLauncher, StableWait, find_chrome};
use render::html::{HttpSource, StaticLauncher};
use render::pool::RenderPool;
use scrapers::{CollectContext, collector_for};
use timeparse::TimeNormalizer;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    // stdout carries the listing, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    info!("movie_cal starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let settings = Settings::resolve(&args).map_err(|e| {
        error!(error = %e, "Invalid configuration");
        RunError::from(e)
    })?;
    info!(
        venues = ?settings.venues,
        tz = %settings.tz,
        engine = ?settings.engine,
        pool_size = settings.pool_size,
        "Resolved settings"
    );
    if settings.venues.is_empty() {
        return Err(RunError::NoVenues.into());
    }

    // Early check: the JSON directory must be writable before any scraping
    if let Some(dir) = &settings.json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "JSON output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e.into());
        }
    }

    let http = reqwest::Client::builder()
        .timeout(settings.http_timeout)
        .user_agent(concat!("movie_cal/", env!("CARGO_PKG_VERSION")))
        .build()?;

    // ---- Artifact cache ----
    let cache = Arc::new(ArtifactCache::new(
        &settings.cache_root,
        settings.cache_ttl,
        Arc::new(HttpDownloader::new(http.clone())),
    ));
    if let Err(source) = cache.ensure_dirs().await {
        error!(path = %settings.cache_root.display(), error = %source, "Cannot create cache directories");
        return Err(RunError::CacheDirs {
            path: settings.cache_root.clone(),
            source,
        }
        .into());
    }
    info!(cache_dir = %cache.cache_dir().display(), "Artifact cache ready");

    // ---- Render pool (only for rendered venues) ----
    let pool = if settings.needs_renderer() {
        let pool = Arc::new(build_pool(&settings, http)?);
        info!(capacity = pool.capacity(), "Render pool ready");
        Some(pool)
    } else {
        None
    };

    // ---- Collect ----
    let ctx = Arc::new(CollectContext {
        now: Utc::now(),
        normalizer: TimeNormalizer::new(settings.tz),
        cache,
        pool: pool.clone(),
        page_timeout: settings.page_timeout,
        venue_concurrency: settings.venue_concurrency,
    });
    let collectors = settings.venues.iter().map(|v| collector_for(*v)).collect();
    let outcome = orchestrator::run(collectors, ctx.clone(), settings.channel_capacity).await;

    if let Some(pool) = &pool {
        pool.shutdown().await;
    }

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Collection failed");
            return Err(e.into());
        }
    };
    for failed in report.failed_venues() {
        if let Err(reason) = &failed.result {
            warn!(venue = %failed.venue, %reason, "Venue contributed no screenings");
        }
    }

    // ---- Aggregate & output ----
    let collected = report.screenings.len();
    let listing = aggregate::aggregate(report.screenings, ctx.now);
    info!(collected, upcoming = listing.len(), "Aggregated screenings");

    print!("{}", render_listing(&listing, settings.display_tz));

    if let Some(dir) = &settings.json_output_dir {
        if let Err(e) = json::write_listing(&Listing::new(&listing, ctx.now), dir).await {
            error!(error = %e, "Failed to write JSON listing");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

/// Launcher for the configured engine, wrapped in a bounded pool.
fn build_pool(settings: &Settings, http: reqwest::Client) -> Result<RenderPool, RunError> {
    let launcher: Arc<dyn Launcher> = match settings.engine {
        Engine::Chrome => {
            let Some(executable) = find_chrome(settings.chrome_bin.as_deref()) else {
                error!("No Chrome/Chromium executable found");
                return Err(RunError::EngineNotFound);
            };
            info!(path = %executable.display(), "Using Chrome");
            Arc::new(ChromeLauncher::new(executable, StableWait::default()))
        }
        Engine::Static => {
            warn!("Static engine selected; pages needing clicks will be partially collected");
            Arc::new(StaticLauncher::new(Arc::new(HttpSource::new(http))))
        }
    };
    Ok(RenderPool::new(launcher, settings.pool_size))
}
