//! Fan-out/fan-in over the venue collectors.
//!
//! One task per venue is spawned on the runtime. Every task publishes its
//! screenings into a single bounded channel; a drain task moves them into a
//! private `Vec` as they arrive so a full buffer only slows producers down.
//! The collection is handed back only after every venue task has been joined.
//!
//! ```text
//! Launching ──spawn N──▶ Awaiting ──join N──▶ Draining ──▶ RunReport
//! ```
//!
//! A venue that errors or panics contributes nothing and is logged; the
//! others carry on. A run in which every venue failed is an error, and so is
//! a run in which a rendering session was lost: the remaining venue tasks
//! are aborted and nothing is reported.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::error::{CollectError, RunError};
use crate::models::{Screening, Venue};
use crate::scrapers::{CollectContext, Collector};

/// Default bound of the shared result channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Spawning one task per venue.
    Launching,
    /// Waiting for every venue task to finish.
    Awaiting,
    /// All producers are done; collecting the buffered results.
    Draining,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Launching => "launching",
            RunState::Awaiting => "awaiting",
            RunState::Draining => "draining",
        })
    }
}

/// How one venue's task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueOutcome {
    pub venue: Venue,
    /// Screenings delivered, or the error that stopped the venue.
    pub result: Result<usize, String>,
}

#[derive(Debug)]
pub struct RunReport {
    /// Everything delivered, in arrival order.
    pub screenings: Vec<Screening>,
    /// One entry per venue, in launch order.
    pub outcomes: Vec<VenueOutcome>,
}

impl RunReport {
    pub fn failed_venues(&self) -> impl Iterator<Item = &VenueOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Run every collector concurrently and gather what they produce.
///
/// # Arguments
///
/// * `collectors` - One per venue, in the order outcomes are reported
/// * `ctx` - Shared clock, cache and render pool
/// * `channel_capacity` - Bound of the result channel
///
/// # Returns
///
/// Every delivered screening plus one outcome per venue.
///
/// # Errors
///
/// - [`RunError::NoVenues`] if `collectors` is empty
/// - [`RunError::SessionLost`] if a venue lost its rendering session
/// - [`RunError::AllVenuesFailed`] if no venue finished successfully
#[instrument(level = "info", skip_all, fields(venues = collectors.len()))]
pub async fn run(
    collectors: Vec<Arc<dyn Collector>>,
    ctx: Arc<CollectContext>,
    channel_capacity: usize,
) -> Result<RunReport, RunError> {
    if collectors.is_empty() {
        return Err(RunError::NoVenues);
    }

    info!(state = %RunState::Launching, channel_capacity, "Launching venue collectors");
    let (tx, mut rx) = mpsc::channel::<Screening>(channel_capacity.max(1));
    let drain: JoinHandle<Vec<Screening>> = tokio::spawn(async move {
        let mut collected = Vec::new();
        while let Some(screening) = rx.recv().await {
            collected.push(screening);
        }
        collected
    });

    let tasks: Vec<(Venue, JoinHandle<Result<usize, CollectError>>)> = collectors
        .into_iter()
        .map(|collector| {
            let venue = collector.venue();
            let tx = tx.clone();
            let ctx = Arc::clone(&ctx);
            let handle = tokio::spawn(async move {
                info!(%venue, "Collecting");
                let screenings = collector.collect(&ctx).await?;
                let delivered = screenings.len();
                for screening in screenings {
                    // The receiver lives until every sender is gone.
                    if tx.send(screening).await.is_err() {
                        break;
                    }
                }
                Ok(delivered)
            });
            (venue, handle)
        })
        .collect();
    // Only the tasks' clones keep the channel open now.
    drop(tx);

    info!(state = %RunState::Awaiting, tasks = tasks.len(), "Waiting for venues");
    let mut outcomes = Vec::with_capacity(tasks.len());
    let mut tasks = tasks.into_iter();
    while let Some((venue, handle)) = tasks.next() {
        let result = match handle.await {
            Ok(Ok(count)) => {
                info!(%venue, count, "Venue finished");
                Ok(count)
            }
            Ok(Err(e)) if e.is_session_loss() => {
                error!(%venue, error = %e, "Rendering session lost; aborting the run");
                for (other, handle) in tasks.by_ref() {
                    debug!(venue = %other, "Aborting venue task");
                    handle.abort();
                }
                drain.abort();
                return Err(RunError::SessionLost {
                    venue,
                    reason: e.to_string(),
                });
            }
            Ok(Err(e)) => {
                error!(%venue, error = %e, "Venue failed; it contributes nothing");
                Err(e.to_string())
            }
            Err(e) => {
                error!(%venue, error = %e, "Venue task aborted; it contributes nothing");
                Err(format!("task aborted: {e}"))
            }
        };
        outcomes.push(VenueOutcome { venue, result });
    }

    info!(state = %RunState::Draining, "All venues joined; draining results");
    let screenings = drain.await?;

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        total = screenings.len(),
        venues = outcomes.len(),
        failed,
        "Collection complete"
    );
    if failed == outcomes.len() {
        return Err(RunError::AllVenuesFailed(failed));
    }

    Ok(RunReport {
        screenings,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::error::RenderError;
    use crate::scrapers::clinton::ClintonCollector;
    use crate::scrapers::testing;
    use crate::timeparse::CINEMAGIC_LAYOUT;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::warn;

    /// Parses `(title, "Oct 21 2026 7:30 PM")` pairs, skipping bad times.
    struct ListingCollector {
        venue: Venue,
        listings: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl Collector for ListingCollector {
        fn venue(&self) -> Venue {
            self.venue
        }

        async fn collect(&self, ctx: &CollectContext) -> Result<Vec<Screening>, CollectError> {
            let mut out = Vec::new();
            for (title, raw) in &self.listings {
                match ctx.normalizer.parse(CINEMAGIC_LAYOUT, raw) {
                    Ok(t) => out.push(Screening::new(title, self.venue, t, "/").unwrap()),
                    Err(e) => warn!(error = %e, "skipping listing"),
                }
            }
            Ok(out)
        }
    }

    struct Unreachable(Venue);

    #[async_trait]
    impl Collector for Unreachable {
        fn venue(&self) -> Venue {
            self.0
        }

        async fn collect(&self, _ctx: &CollectContext) -> Result<Vec<Screening>, CollectError> {
            Err(RenderError::Navigation {
                url: self.0.base_url().to_string(),
                reason: "connection refused".into(),
            }
            .into())
        }
    }

    struct Panics(Venue);

    #[async_trait]
    impl Collector for Panics {
        fn venue(&self) -> Venue {
            self.0
        }

        async fn collect(&self, _ctx: &CollectContext) -> Result<Vec<Screening>, CollectError> {
            panic!("selector exploded");
        }
    }

    fn ctx(root: &std::path::Path) -> Arc<CollectContext> {
        Arc::new(testing::context(root, None))
    }

    #[tokio::test]
    async fn test_partial_failure_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let collectors: Vec<Arc<dyn Collector>> = vec![
            Arc::new(Unreachable(Venue::ClintonStateTheater)),
            Arc::new(ListingCollector {
                venue: Venue::HollywoodTheatre,
                listings: vec![
                    ("Alien", "Oct 22 2026 9:00 PM"),
                    ("Heat", "Oct 21 2026 7:00 PM"),
                ],
            }),
            Arc::new(ListingCollector {
                venue: Venue::AcademyTheater,
                listings: vec![
                    ("Ran", "Oct 23 2026 1:00 PM"),
                    ("Tampopo", "Oct 21 2026 TBA"),
                    ("Possession", "Oct 21 2026 8:15 PM"),
                ],
            }),
        ];
        let ctx = ctx(tmp.path());

        let report = run(collectors, ctx.clone(), 2).await.unwrap();
        assert_eq!(report.screenings.len(), 4);
        assert_eq!(report.outcomes.len(), 3);
        let failed: Vec<_> = report.failed_venues().map(|o| o.venue).collect();
        assert_eq!(failed, vec![Venue::ClintonStateTheater]);
        assert_eq!(report.outcomes[1].result, Ok(2));
        assert_eq!(report.outcomes[2].result, Ok(2));

        let listing = aggregate(report.screenings, ctx.now);
        let titles: Vec<_> = listing.iter().map(|s| s.title()).collect();
        assert_eq!(titles, vec!["Heat", "Possession", "Alien", "Ran"]);
    }

    #[tokio::test]
    async fn test_panicking_venue_does_not_stop_others() {
        let tmp = tempfile::tempdir().unwrap();
        let collectors: Vec<Arc<dyn Collector>> = vec![
            Arc::new(Panics(Venue::CineMagicTheater)),
            Arc::new(ListingCollector {
                venue: Venue::AcademyTheater,
                listings: vec![("Ran", "Oct 23 2026 1:00 PM")],
            }),
        ];
        let report = run(collectors, ctx(tmp.path()), 8).await.unwrap();
        assert_eq!(report.screenings.len(), 1);
        assert!(report.outcomes[0].result.as_ref().unwrap_err().contains("task aborted"));
    }

    #[tokio::test]
    async fn test_output_larger_than_channel_does_not_deadlock() {
        let tmp = tempfile::tempdir().unwrap();
        let listings = vec![("Loop", "Oct 23 2026 1:00 PM"); 50];
        let collectors: Vec<Arc<dyn Collector>> = vec![
            Arc::new(ListingCollector {
                venue: Venue::AcademyTheater,
                listings: listings.clone(),
            }),
            Arc::new(ListingCollector {
                venue: Venue::HollywoodTheatre,
                listings,
            }),
        ];
        let report = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run(collectors, ctx(tmp.path()), 1),
        )
        .await
        .expect("run must not deadlock")
        .unwrap();
        assert_eq!(report.screenings.len(), 100);
    }

    #[tokio::test]
    async fn test_every_venue_failing_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let collectors: Vec<Arc<dyn Collector>> =
            vec![Arc::new(Unreachable(Venue::ClintonStateTheater))];
        let err = run(collectors, ctx(tmp.path()), 10).await.unwrap_err();
        assert!(matches!(err, RunError::AllVenuesFailed(1)));
    }

    #[tokio::test]
    async fn test_no_venues_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = run(Vec::new(), ctx(tmp.path()), 10).await.unwrap_err();
        assert!(matches!(err, RunError::NoVenues));
    }

    #[tokio::test]
    async fn test_lost_session_fails_the_run() {
        use crate::render::pool::RenderPool;
        use crate::render::{Browser, Launcher, Page};
        use crate::scrapers::hollywood::HollywoodCollector;

        struct ExitedBrowser;

        #[async_trait]
        impl Browser for ExitedBrowser {
            async fn open_page(&self, _url: &str) -> Result<Box<dyn Page>, RenderError> {
                Err(RenderError::Engine("browser process exited".into()))
            }

            async fn close(&self) -> Result<(), RenderError> {
                Ok(())
            }
        }

        struct ExitedLauncher;

        #[async_trait]
        impl Launcher for ExitedLauncher {
            async fn launch(&self) -> Result<Arc<dyn Browser>, RenderError> {
                Ok(Arc::new(ExitedBrowser))
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let pool = Arc::new(RenderPool::new(Arc::new(ExitedLauncher), 1));
        let ctx = Arc::new(testing::context(tmp.path(), Some(pool.clone())));
        let collectors: Vec<Arc<dyn Collector>> = vec![
            Arc::new(HollywoodCollector),
            Arc::new(ListingCollector {
                venue: Venue::AcademyTheater,
                listings: vec![("Ran", "Oct 23 2026 1:00 PM")],
            }),
        ];

        let err = run(collectors, ctx, 10).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::SessionLost {
                venue: Venue::HollywoodTheatre,
                ..
            }
        ));
        // The dead session is never offered to another caller.
        assert_eq!(pool.idle_sessions(), 0);
        assert_eq!(pool.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_repeat_runs_reuse_cached_feed() {
        use crate::download::Downloader;
        use crate::error::DownloadError;
        use std::path::{Path, PathBuf};

        struct CountingFeed(AtomicUsize);

        #[async_trait]
        impl Downloader for CountingFeed {
            async fn download(&self, _url: &str, dir: &Path) -> Result<PathBuf, DownloadError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                let path = dir.join("feed.ics");
                tokio::fs::write(
                    &path,
                    "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nDTSTART:20261101T030000Z\r\n\
                     SUMMARY:Suspiria\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
                )
                .await?;
                Ok(path)
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let feed = Arc::new(CountingFeed(AtomicUsize::new(0)));
        let ctx = testing::context_with(tmp.path(), None, feed.clone());
        ctx.cache.ensure_dirs().await.unwrap();
        let ctx = Arc::new(ctx);

        let clinton = || vec![Arc::new(ClintonCollector) as Arc<dyn Collector>];
        let first = run(clinton(), ctx.clone(), 10).await.unwrap();
        let second = run(clinton(), ctx, 10).await.unwrap();
        assert_eq!(first.screenings, second.screenings);
        assert_eq!(first.screenings.len(), 1);
        assert_eq!(feed.0.load(Ordering::SeqCst), 1);
    }
}
