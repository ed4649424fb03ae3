//! Error types for each layer of the collection pipeline.
//!
//! Errors are split by how far they are allowed to travel:
//!
//! | Scope | Types | Effect |
//! |-------|-------|--------|
//! | Item | [`TimeParseError`], [`ScreeningError`] | listing skipped, logged |
//! | Venue | [`CollectError`] and the collaborator errors it wraps | venue contributes nothing, logged |
//! | Process | [`RunError`], [`ConfigError`] | run aborts with a non-zero exit |
//!
//! A [`RenderError::Engine`] is the one venue-level error that escalates: a
//! rendering session that died takes the whole run down with it.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::Venue;

/// A date/time string that could not be turned into an instant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("cannot parse '{input}' with layout '{layout}': {reason}")]
    Layout {
        input: String,
        layout: String,
        reason: String,
    },

    #[error("expected {expected} tokens in '{input}', found {found}")]
    TokenCount {
        input: String,
        expected: usize,
        found: usize,
    },

    #[error("'{token}' is not a recognized {kind}")]
    BadToken { token: String, kind: &'static str },

    #[error("local time {0} does not exist in the venue time zone")]
    NonexistentLocalTime(String),
}

/// A listing that could not be turned into a [`crate::models::Screening`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScreeningError {
    #[error("screening has an empty title")]
    EmptyTitle,

    #[error("cannot resolve detail url '{url}': {reason}")]
    BadUrl { url: String, reason: String },
}

/// Failure of the download collaborator.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("http status {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("io error writing download: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the artifact cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("download of '{key}' failed: {source}")]
    Download {
        key: String,
        #[source]
        source: DownloadError,
    },

    #[error("cannot move {from} into cache: {source}")]
    Promote {
        from: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the calendar-feed collaborator.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed calendar feed: {0}")]
    Malformed(String),
}

/// Failure of the page-rendering collaborator.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The session itself is gone: the engine process exited or its
    /// connection dropped.
    #[error("rendering engine error: {0}")]
    Engine(String),

    /// A single command failed on a session that is still alive.
    #[error("rendering command failed: {0}")]
    Protocol(String),

    #[error("cannot load {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    #[error("invalid selector '{0}'")]
    Selector(String),

    #[error("{0} is not supported by this rendering backend")]
    Unsupported(&'static str),
}

impl RenderError {
    /// Whether the session that produced this error can no longer be used.
    pub fn is_session_loss(&self) -> bool {
        matches!(self, RenderError::Engine(_))
    }
}

impl From<chromiumoxide::error::CdpError> for RenderError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        use chromiumoxide::error::CdpError;
        match &err {
            CdpError::Ws(_)
            | CdpError::ChannelSendError(_)
            | CdpError::NoResponse
            | CdpError::LaunchExit(..)
            | CdpError::LaunchTimeout(_)
            | CdpError::LaunchIo(..) => RenderError::Engine(err.to_string()),
            _ => RenderError::Protocol(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for RenderError {
    fn from(err: reqwest::Error) -> Self {
        RenderError::Navigation {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            reason: err.to_string(),
        }
    }
}

/// A venue that could not be collected at all.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no rendering pool configured for {0}")]
    NoRenderer(&'static str),
}

impl CollectError {
    pub fn is_session_loss(&self) -> bool {
        matches!(self, CollectError::Render(e) if e.is_session_loss())
    }
}

/// Invalid settings from the CLI or config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown time zone '{0}'")]
    TimeZone(String),

    #[error("{0}")]
    Venue(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Errors that end the whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot create cache directories under {path}: {source}")]
    CacheDirs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot find a Chrome executable (set CHROME_BIN or --chrome-bin)")]
    EngineNotFound,

    #[error("no venues configured")]
    NoVenues,

    #[error("rendering session lost while collecting {venue}: {reason}")]
    SessionLost { venue: Venue, reason: String },

    #[error("every configured venue failed ({0} attempted)")]
    AllVenuesFailed(usize),

    #[error("result collection task failed: {0}")]
    Drain(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_count_message() {
        let err = TimeParseError::TokenCount {
            input: "Tue 21".into(),
            expected: 3,
            found: 2,
        };
        assert_eq!(err.to_string(), "expected 3 tokens in 'Tue 21', found 2");
    }

    #[test]
    fn test_collect_error_is_transparent() {
        let err: CollectError = RenderError::Unsupported("click").into();
        assert_eq!(err.to_string(), "click is not supported by this rendering backend");
    }

    #[test]
    fn test_only_engine_failures_are_session_loss() {
        let lost: CollectError = RenderError::Engine("browser process exited".into()).into();
        assert!(lost.is_session_loss());

        let slow: CollectError = RenderError::Timeout {
            what: "page".into(),
            secs: 60,
        }
        .into();
        assert!(!slow.is_session_loss());
        assert!(!RenderError::Protocol("node not found".into()).is_session_loss());
        assert!(!CollectError::NoRenderer("Hollywood").is_session_loss());
    }

    #[test]
    fn test_cdp_connection_errors_are_session_loss() {
        use chromiumoxide::error::CdpError;
        assert!(RenderError::from(CdpError::NoResponse).is_session_loss());
        assert!(!RenderError::from(CdpError::NotFound).is_session_loss());
        assert!(!RenderError::from(CdpError::Timeout).is_session_loss());
    }
}
