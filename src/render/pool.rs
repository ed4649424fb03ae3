//! Bounded pool of rendering sessions shared by the venue collectors.
//!
//! A `Semaphore` with `capacity` permits caps how many sessions can be in
//! use; the idle list holds sessions released by earlier holders. Sessions
//! are launched lazily, only when a caller holds a permit and nothing is
//! idle, so the number of live sessions never exceeds `capacity`.
//!
//! A session whose engine died is discarded rather than put back, so a later
//! acquire never hands out a dead session.

use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, instrument, warn};

use super::{Browser, Launcher};
use crate::error::RenderError;

/// Default number of sessions the pool may hold.
pub const DEFAULT_CAPACITY: usize = 12;

pub struct RenderPool {
    launcher: Arc<dyn Launcher>,
    permits: Semaphore,
    idle: Mutex<Vec<Arc<dyn Browser>>>,
    live: AtomicUsize,
    capacity: usize,
}

impl RenderPool {
    pub fn new(launcher: Arc<dyn Launcher>, capacity: usize) -> Self {
        Self {
            launcher,
            permits: Semaphore::new(capacity),
            idle: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sessions launched and not yet shut down.
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn idle_sessions(&self) -> usize {
        self.idle.lock().len()
    }

    /// Take a session, waiting while `capacity` are already handed out.
    ///
    /// The session goes back to the pool when the returned guard is dropped.
    #[instrument(level = "debug", skip_all)]
    pub async fn acquire(&self) -> Result<PooledBrowser<'_>, RenderError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RenderError::Engine("render pool is shut down".into()))?;

        let reused = self.idle.lock().pop();
        let browser = match reused {
            Some(browser) => {
                debug!(idle = self.idle_sessions(), "Reusing idle session");
                browser
            }
            None => {
                let browser = self.launcher.launch().await?;
                let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
                info!(live, capacity = self.capacity, "Launched rendering session");
                browser
            }
        };

        Ok(PooledBrowser {
            pool: self,
            browser,
            lost: false,
            _permit: permit,
        })
    }

    /// Hand a session back after use, or discard it if `outcome` shows its
    /// engine is gone.
    ///
    /// # Arguments
    ///
    /// * `session` - The guard returned by [`RenderPool::acquire`]
    /// * `outcome` - What the caller got out of the session
    pub fn finish<T>(&self, session: PooledBrowser<'_>, outcome: &Result<T, RenderError>) {
        match outcome {
            Err(e) if e.is_session_loss() => self.discard(session),
            _ => self.release(session),
        }
    }

    /// Hand a session back for reuse. Equivalent to dropping the guard.
    pub fn release(&self, session: PooledBrowser<'_>) {
        drop(session);
    }

    /// Forget a dead session. Its permit is freed but it is never reused.
    pub fn discard(&self, mut session: PooledBrowser<'_>) {
        session.lost = true;
    }

    fn put_back(&self, browser: Arc<dyn Browser>) {
        self.idle.lock().push(browser);
    }

    /// Refuse further acquires and close every idle session.
    pub async fn shutdown(&self) {
        self.permits.close();
        let idle: Vec<_> = std::mem::take(&mut *self.idle.lock());
        for browser in idle {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "Failed to close rendering session");
            }
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        info!(remaining = self.live_sessions(), "Render pool shut down");
    }
}

/// A session checked out of a [`RenderPool`].
pub struct PooledBrowser<'a> {
    pool: &'a RenderPool,
    browser: Arc<dyn Browser>,
    lost: bool,
    _permit: SemaphorePermit<'a>,
}

impl Deref for PooledBrowser<'_> {
    type Target = dyn Browser;

    fn deref(&self) -> &Self::Target {
        self.browser.as_ref()
    }
}

impl Drop for PooledBrowser<'_> {
    fn drop(&mut self) {
        // The permit is a field, so it is released after the session is idle again.
        if self.lost {
            let live = self.pool.live.fetch_sub(1, Ordering::SeqCst) - 1;
            warn!(live, "Discarded lost rendering session");
        } else {
            self.pool.put_back(self.browser.clone());
        }
    }
}
