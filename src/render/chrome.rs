//! Headless Chrome backend over the DevTools protocol.
//!
//! Each [`ChromeBrowser`] is one Chrome process with its own profile
//! directory, driven by a `chromiumoxide` handler task. Pages and elements
//! are thin wrappers that translate the crate's [`Page`]/[`Element`] calls
//! into CDP commands.

use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use futures::StreamExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use super::{Browser, Element, Launcher, Page};
use crate::error::RenderError;

/// Executable names tried on `PATH` when no binary is configured.
const CHROME_NAMES: [&str; 5] = [
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Install locations checked after `PATH`.
const CHROME_PATHS: [&str; 3] = [
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/usr/lib/chromium/chromium",
];

/// JS evaluated to decide whether the DOM is still changing.
const DOM_SIZE_JS: &str = "document.documentElement ? document.documentElement.outerHTML.length : 0";

const VISIBLE_JS: &str =
    "function() { return !!(this.offsetWidth || this.offsetHeight || this.getClientRects().length); }";

/// Locate a Chrome binary.
///
/// # Arguments
///
/// * `explicit` - A configured binary. A bare command name such as
///   `chromium` is looked up on `PATH`; anything else must be an existing file.
///
/// # Returns
///
/// The executable to launch, trying `explicit` alone if given, otherwise the
/// usual names on `PATH` and then well-known install locations. `None` if
/// nothing is found.
pub fn find_chrome(explicit: Option<&Path>) -> Option<PathBuf> {
    find_chrome_in(explicit, std::env::var_os("PATH"))
}

fn find_chrome_in(explicit: Option<&Path>, path_var: Option<OsString>) -> Option<PathBuf> {
    let path_dirs = || path_var.iter().flat_map(|p| std::env::split_paths(p));

    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        if path.components().count() != 1 {
            return None;
        }
        return path_dirs().map(|dir| dir.join(path)).find(|p| p.is_file());
    }
    path_dirs()
        .flat_map(|dir| CHROME_NAMES.map(|name| dir.join(name)))
        .find(|p| p.is_file())
        .or_else(|| CHROME_PATHS.iter().map(PathBuf::from).find(|p| p.is_file()))
}

/// How [`ChromePage::wait_stable`] decides a page has settled.
#[derive(Debug, Clone, Copy)]
pub struct StableWait {
    /// Delay between DOM size samples.
    pub poll: Duration,
    /// Consecutive identical samples required.
    pub rounds: u32,
}

impl Default for StableWait {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(300),
            rounds: 3,
        }
    }
}

/// Launches one headless Chrome process per session.
pub struct ChromeLauncher {
    executable: PathBuf,
    stable: StableWait,
    launched: AtomicUsize,
}

impl ChromeLauncher {
    pub fn new(executable: PathBuf, stable: StableWait) -> Self {
        Self {
            executable,
            stable,
            launched: AtomicUsize::new(0),
        }
    }

    fn profile_dir(&self) -> PathBuf {
        let n = self.launched.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("movie-cal-chrome-{}-{n}", std::process::id()))
    }
}

#[async_trait]
impl Launcher for ChromeLauncher {
    #[instrument(level = "info", skip_all, fields(executable = %self.executable.display()))]
    async fn launch(&self) -> Result<Arc<dyn Browser>, RenderError> {
        let config = BrowserConfig::builder()
            .chrome_executable(&self.executable)
            .user_data_dir(self.profile_dir())
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .build()
            .map_err(RenderError::Engine)?;

        let (browser, mut handler) = chromiumoxide::Browser::launch(config).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Chrome handler stopped");
                    break;
                }
            }
        });
        info!("Chrome launched");

        Ok(Arc::new(ChromeBrowser {
            browser: RwLock::new(browser),
            handler_task,
            stable: self.stable,
        }))
    }
}

pub struct ChromeBrowser {
    /// Pages open under a shared lock; only `close` needs it exclusively.
    browser: RwLock<chromiumoxide::Browser>,
    handler_task: JoinHandle<()>,
    stable: StableWait,
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn open_page(&self, url: &str) -> Result<Box<dyn Page>, RenderError> {
        let page = self
            .browser
            .read()
            .await
            .new_page(url)
            .await
            .map_err(|e| match RenderError::from(e) {
                lost @ RenderError::Engine(_) => lost,
                other => RenderError::Navigation {
                    url: url.to_string(),
                    reason: other.to_string(),
                },
            })?;
        debug!(%url, "Opened page");
        Ok(Box::new(ChromePage {
            page,
            url: parking_lot::Mutex::new(url.to_string()),
            stable: self.stable,
        }))
    }

    async fn close(&self) -> Result<(), RenderError> {
        let mut browser = self.browser.write().await;
        browser.close().await?;
        let _ = browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }
}

pub struct ChromePage {
    page: chromiumoxide::Page,
    url: parking_lot::Mutex<String>,
    stable: StableWait,
}

impl ChromePage {
    async fn dom_size(&self) -> Result<u64, RenderError> {
        self.page
            .evaluate(DOM_SIZE_JS)
            .await?
            .into_value::<u64>()
            .map_err(|e| RenderError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn wait_stable(&self) -> Result<(), RenderError> {
        self.page.wait_for_navigation().await?;
        let mut last = self.dom_size().await?;
        let mut unchanged = 0;
        while unchanged < self.stable.rounds {
            tokio::time::sleep(self.stable.poll).await;
            let size = self.dom_size().await?;
            if size == last {
                unchanged += 1;
            } else {
                unchanged = 0;
                last = size;
            }
        }
        Ok(())
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Box<dyn Element>>, RenderError> {
        let found = self.page.find_elements(selector).await?;
        Ok(wrap(found))
    }

    async fn navigate(&self, url: &str) -> Result<(), RenderError> {
        self.page.goto(url).await.map_err(|e| RenderError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        *self.url.lock() = url.to_string();
        Ok(())
    }

    fn url(&self) -> String {
        self.url.lock().clone()
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.page.clone().close().await?;
        Ok(())
    }
}

fn wrap(elements: Vec<chromiumoxide::Element>) -> Vec<Box<dyn Element>> {
    elements
        .into_iter()
        .map(|el| Box::new(ChromeElement { el }) as Box<dyn Element>)
        .collect()
}

pub struct ChromeElement {
    el: chromiumoxide::Element,
}

#[async_trait]
impl Element for ChromeElement {
    async fn text(&self) -> Result<String, RenderError> {
        Ok(self.el.inner_text().await?.unwrap_or_default())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, RenderError> {
        Ok(self.el.attribute(name).await?)
    }

    async fn click(&self) -> Result<(), RenderError> {
        self.el.click().await?;
        Ok(())
    }

    async fn is_visible(&self) -> Result<bool, RenderError> {
        let ret = self.el.call_js_fn(VISIBLE_JS, false).await?;
        Ok(ret.result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Box<dyn Element>>, RenderError> {
        Ok(wrap(self.el.find_elements(selector).await?))
    }

    async fn children(&self) -> Result<Vec<Box<dyn Element>>, RenderError> {
        Ok(wrap(self.el.find_elements(":scope > *").await?))
    }
}
