//! Page rendering: the collaborator traits collectors drive, their backends,
//! and the pool that shares browser sessions between venues.
//!
//! # Submodules
//!
//! - [`pool`]: [`RenderPool`](pool::RenderPool), bounded reuse of sessions
//! - [`chrome`]: headless Chrome over the DevTools protocol (`chromiumoxide`)
//! - [`html`]: fetch-and-parse backend on `reqwest` + `scraper`; no script
//!   execution and no clicks
//!
//! Collectors only see the traits below, so a venue scraper reads the same
//! whichever backend is running underneath it.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::RenderError;

pub mod chrome;
pub mod html;
pub mod pool;

/// Starts new rendering sessions for the pool.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Browser>, RenderError>;
}

/// One live rendering session. Several pages may be open in it at once.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_page(&self, url: &str) -> Result<Box<dyn Page>, RenderError>;

    /// Shut the session down. Pages opened from it become unusable.
    async fn close(&self) -> Result<(), RenderError>;
}

/// An open page inside a [`Browser`].
#[async_trait]
pub trait Page: Send + Sync {
    /// Wait until the document has stopped changing.
    async fn wait_stable(&self) -> Result<(), RenderError>;

    /// First element matching `selector`, if any.
    async fn find_element(&self, selector: &str) -> Result<Option<Box<dyn Element>>, RenderError> {
        Ok(self.find_elements(selector).await?.into_iter().next())
    }

    /// Every element matching `selector`, possibly none.
    async fn find_elements(&self, selector: &str) -> Result<Vec<Box<dyn Element>>, RenderError>;

    async fn navigate(&self, url: &str) -> Result<(), RenderError>;

    /// Address of the document currently loaded.
    fn url(&self) -> String;

    async fn close(&self) -> Result<(), RenderError>;
}

/// A node inside a [`Page`].
#[async_trait]
pub trait Element: Send + Sync {
    /// Rendered text content.
    async fn text(&self) -> Result<String, RenderError>;

    async fn attribute(&self, name: &str) -> Result<Option<String>, RenderError>;

    async fn click(&self) -> Result<(), RenderError>;

    async fn is_visible(&self) -> Result<bool, RenderError>;

    async fn find_element(&self, selector: &str) -> Result<Option<Box<dyn Element>>, RenderError> {
        Ok(self.find_elements(selector).await?.into_iter().next())
    }

    /// Descendants matching `selector`.
    async fn find_elements(&self, selector: &str) -> Result<Vec<Box<dyn Element>>, RenderError>;

    /// Direct element children, in document order.
    async fn children(&self) -> Result<Vec<Box<dyn Element>>, RenderError>;

    /// Whether the `class` attribute contains `class`.
    async fn has_class(&self, class: &str) -> Result<bool, RenderError> {
        Ok(self
            .attribute("class")
            .await?
            .is_some_and(|c| c.split_whitespace().any(|c| c == class)))
    }
}

/// Bound a rendering step by `limit`, naming it in the timeout error.
///
/// # Arguments
///
/// * `limit` - How long `fut` may run
/// * `what` - Label for [`RenderError::Timeout`]
/// * `fut` - The step itself
///
/// # Returns
///
/// Whatever `fut` returned, or a timeout error once `limit` passes.
pub async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, RenderError>
where
    F: Future<Output = Result<T, RenderError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| RenderError::Timeout {
            what: what.to_string(),
            secs: limit.as_secs(),
        })?
}

/// Open `url`, wait for it to settle, run `f`, then close the page whatever
/// `f` returned.
///
/// # Arguments
///
/// * `browser` - Session to open the page in
/// * `url` - Page to load
/// * `limit` - Bound on opening and on settling, each
/// * `f` - Reads the settled page
///
/// # Returns
///
/// The result of `f`, or the error that kept the page from loading.
pub async fn with_page<T, F, Fut>(
    browser: &dyn Browser,
    url: &str,
    limit: Duration,
    f: F,
) -> Result<T, RenderError>
where
    F: FnOnce(Arc<dyn Page>) -> Fut,
    Fut: Future<Output = Result<T, RenderError>>,
{
    let page: Arc<dyn Page> = Arc::from(bounded(limit, url, browser.open_page(url)).await?);
    let result = match bounded(limit, url, page.wait_stable()).await {
        Ok(()) => f(page.clone()).await,
        Err(e) => Err(e),
    };
    if let Err(e) = page.close().await {
        warn!(%url, error = %e, "Failed to close page");
    }
    result
}
