//! Script-free rendering backend: fetch the HTML, query it with `scraper`.
//!
//! Useful for server-rendered venue pages when no Chrome is installed. There
//! is no JavaScript, so [`Page::wait_stable`] returns immediately. A click
//! only does something if the [`HtmlSource`] knows which document it leads
//! to; over HTTP it fails with [`RenderError::Unsupported`], which collectors
//! treat as "this listing view is unavailable".
//!
//! `scraper::Html` is not `Send`, so documents are parsed on demand inside
//! synchronous helpers and elements carry their own outer HTML.

use async_trait::async_trait;
use parking_lot::Mutex;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::debug;

use super::{Browser, Element, Launcher, Page};
use crate::error::RenderError;

/// Where page HTML comes from.
#[async_trait]
pub trait HtmlSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, RenderError>;

    /// Document shown after clicking `element` (its outer HTML) on the page
    /// at `url`, or `None` if the click cannot be followed.
    async fn click(&self, _url: &str, _element: &str) -> Result<Option<String>, RenderError> {
        Ok(None)
    }
}

/// Fetches pages over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HtmlSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<String, RenderError> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let body = resp.text().await?;
        debug!(%url, bytes = body.len(), "Fetched static page");
        Ok(body)
    }
}

/// Hands out [`StaticBrowser`] sessions sharing one [`HtmlSource`].
pub struct StaticLauncher {
    source: Arc<dyn HtmlSource>,
}

impl StaticLauncher {
    pub fn new(source: Arc<dyn HtmlSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Launcher for StaticLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>, RenderError> {
        Ok(Arc::new(StaticBrowser::new(self.source.clone())))
    }
}

pub struct StaticBrowser {
    source: Arc<dyn HtmlSource>,
}

impl StaticBrowser {
    pub fn new(source: Arc<dyn HtmlSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Browser for StaticBrowser {
    async fn open_page(&self, url: &str) -> Result<Box<dyn Page>, RenderError> {
        let html = self.source.fetch(url).await?;
        Ok(Box::new(StaticPage {
            loaded: Arc::new(Loaded {
                source: self.source.clone(),
                state: Mutex::new((url.to_string(), Arc::from(html))),
            }),
        }))
    }

    async fn close(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Shared by a page and every element taken from it, so a click can swap
/// the document the page reads next.
struct Loaded {
    source: Arc<dyn HtmlSource>,
    /// Current URL and document.
    state: Mutex<(String, Arc<str>)>,
}

pub struct StaticPage {
    loaded: Arc<Loaded>,
}

#[async_trait]
impl Page for StaticPage {
    async fn wait_stable(&self) -> Result<(), RenderError> {
        Ok(())
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Box<dyn Element>>, RenderError> {
        let html = self.loaded.state.lock().1.clone();
        let selector = parse_selector(selector)?;
        let doc = Html::parse_document(&html);
        let found = doc.select(&selector).map(|el| el.html()).collect();
        Ok(boxed(found, &self.loaded))
    }

    async fn navigate(&self, url: &str) -> Result<(), RenderError> {
        let html = self.loaded.source.fetch(url).await?;
        *self.loaded.state.lock() = (url.to_string(), Arc::from(html));
        Ok(())
    }

    fn url(&self) -> String {
        self.loaded.state.lock().0.clone()
    }

    async fn close(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// An element snapshot holding its own outer HTML.
pub struct StaticElement {
    html: String,
    page: Arc<Loaded>,
}

impl StaticElement {
    fn with_root<R>(&self, f: impl FnOnce(ElementRef<'_>) -> R) -> Option<R> {
        let fragment = Html::parse_fragment(&self.html);
        let root = fragment.root_element().children().find_map(ElementRef::wrap);
        root.map(f)
    }
}

#[async_trait]
impl Element for StaticElement {
    async fn text(&self) -> Result<String, RenderError> {
        Ok(self
            .with_root(|el| el.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, RenderError> {
        Ok(self
            .with_root(|el| el.value().attr(name).map(str::to_string))
            .flatten())
    }

    async fn click(&self) -> Result<(), RenderError> {
        let url = self.page.state.lock().0.clone();
        match self.page.source.click(&url, &self.html).await? {
            Some(html) => {
                debug!(%url, bytes = html.len(), "Click replaced the document");
                self.page.state.lock().1 = Arc::from(html);
                Ok(())
            }
            None => Err(RenderError::Unsupported("click")),
        }
    }

    async fn is_visible(&self) -> Result<bool, RenderError> {
        Ok(self
            .with_root(|el| {
                let value = el.value();
                let style = value
                    .attr("style")
                    .unwrap_or_default()
                    .replace(' ', "")
                    .to_lowercase();
                value.attr("hidden").is_none()
                    && !style.contains("display:none")
                    && !style.contains("visibility:hidden")
            })
            .unwrap_or(false))
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Box<dyn Element>>, RenderError> {
        let selector = parse_selector(selector)?;
        let found = self
            .with_root(|el| el.select(&selector).map(|e| e.html()).collect())
            .unwrap_or_default();
        Ok(boxed(found, &self.page))
    }

    async fn children(&self) -> Result<Vec<Box<dyn Element>>, RenderError> {
        let found = self
            .with_root(|el| {
                el.children()
                    .filter_map(ElementRef::wrap)
                    .map(|e| e.html())
                    .collect()
            })
            .unwrap_or_default();
        Ok(boxed(found, &self.page))
    }
}

fn parse_selector(selector: &str) -> Result<Selector, RenderError> {
    Selector::parse(selector).map_err(|_| RenderError::Selector(selector.to_string()))
}

fn boxed(fragments: Vec<String>, page: &Arc<Loaded>) -> Vec<Box<dyn Element>> {
    fragments
        .into_iter()
        .map(|html| {
            Box::new(StaticElement {
                html,
                page: page.clone(),
            }) as Box<dyn Element>
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::FixtureSource;
    use super::*;

    const DOC: &str = r#"
        <html><body>
          <div class="card"><h3> Alien </h3><a href="/events/alien">7:00 pm</a></div>
          <div class="card" style="display: none"><h3>Hidden</h3></div>
          <ul id="list"><li>one</li><li>two</li></ul>
        </body></html>"#;

    async fn open(url: &str) -> Box<dyn Page> {
        let source = FixtureSource::default().with("https://example.com/", DOC);
        let browser = StaticBrowser {
            source: Arc::new(source),
        };
        browser.open_page(url).await.unwrap()
    }

    #[tokio::test]
    async fn test_find_elements_and_text() {
        let page = open("https://example.com/").await;
        let cards = page.find_elements("div.card").await.unwrap();
        assert_eq!(cards.len(), 2);

        let title = cards[0].find_element("h3").await.unwrap().unwrap();
        assert_eq!(title.text().await.unwrap().trim(), "Alien");

        let link = cards[0].find_element("a").await.unwrap().unwrap();
        assert_eq!(link.attribute("href").await.unwrap().as_deref(), Some("/events/alien"));
        assert_eq!(link.attribute("title").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_visibility_from_inline_style() {
        let page = open("https://example.com/").await;
        let cards = page.find_elements("div.card").await.unwrap();
        assert!(cards[0].is_visible().await.unwrap());
        assert!(!cards[1].is_visible().await.unwrap());
    }

    #[tokio::test]
    async fn test_children_and_classes() {
        let page = open("https://example.com/").await;
        let list = page.find_element("#list").await.unwrap().unwrap();
        let items = list.children().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].text().await.unwrap(), "two");

        let card = page.find_element("div.card").await.unwrap().unwrap();
        assert!(card.has_class("card").await.unwrap());
        assert!(!card.has_class("car").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_element_is_none() {
        let page = open("https://example.com/").await;
        assert!(page.find_element("table").await.unwrap().is_none());
        assert!(page.find_elements("table").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_click_is_unsupported() {
        let page = open("https://example.com/").await;
        let card = page.find_element("div.card").await.unwrap().unwrap();
        assert!(matches!(card.click().await, Err(RenderError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_click_swaps_the_document() {
        let source = FixtureSource::default()
            .with("https://example.com/", DOC)
            .on_click("Alien", r#"<html><body><p class="next">Nostromo</p></body></html>"#);
        let browser = StaticBrowser::new(Arc::new(source));
        let page = browser.open_page("https://example.com/").await.unwrap();

        let card = page.find_element("div.card").await.unwrap().unwrap();
        let title = card.find_element("h3").await.unwrap().unwrap();
        title.click().await.unwrap();

        assert!(page.find_elements("div.card").await.unwrap().is_empty());
        let next = page.find_element("p.next").await.unwrap().unwrap();
        assert_eq!(next.text().await.unwrap(), "Nostromo");
        assert_eq!(page.url(), "https://example.com/");

        // Elements without a matching click stay unsupported.
        assert!(matches!(next.click().await, Err(RenderError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_unknown_url_fails_to_open() {
        let source = FixtureSource::default();
        let browser = StaticBrowser {
            source: Arc::new(source),
        };
        assert!(browser.open_page("https://nowhere.test/").await.is_err());
    }

    #[tokio::test]
    async fn test_bad_selector() {
        let page = open("https://example.com/").await;
        assert!(matches!(
            page.find_elements("div[").await,
            Err(RenderError::Selector(_))
        ));
    }
}
