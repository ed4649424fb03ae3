//! Command-line interface definitions for movie_cal.
//!
//! Every option can also come from an environment variable or the YAML
//! config file; see [`crate::config::Settings::resolve`] for precedence.
//! Options left unset here fall through to the config file, then to the
//! built-in defaults.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Which page-rendering backend drives the rendered venues.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Headless Chrome; runs page scripts and supports clicks.
    Chrome,
    /// Plain HTTP fetch and HTML parsing; no scripts, no clicks.
    Static,
}

/// Command-line arguments for movie_cal.
///
/// # Examples
///
/// ```sh
/// # Every venue, Chrome found on PATH
/// movie_cal
///
/// # Only two venues, also writing JSON
/// movie_cal --venues clinton,academy -j ./out
///
/// # Explicit browser and config file
/// CHROME_BIN=/usr/bin/chromium movie_cal -c movie_cal.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, env = "MOVIE_CAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Chrome/Chromium executable (default: search PATH)
    #[arg(long, env = "CHROME_BIN")]
    pub chrome_bin: Option<PathBuf>,

    /// Root of the download cache (default: <tmp>/movie-cal)
    #[arg(long, env = "MOVIE_CAL_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Comma-separated venue slugs: clinton, hollywood, academy, cinemagic (default: all)
    #[arg(long, env = "MOVIE_CAL_VENUES", value_delimiter = ',')]
    pub venues: Vec<String>,

    /// IANA time zone the venues print their showtimes in
    #[arg(long, env = "MOVIE_CAL_TIMEZONE")]
    pub timezone: Option<String>,

    /// IANA time zone for the TIME line of the listing (default: venue zone)
    #[arg(long, env = "MOVIE_CAL_DISPLAY_TIMEZONE")]
    pub display_timezone: Option<String>,

    /// Maximum number of concurrent browser sessions
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Rendering backend for venues that need a browser
    #[arg(long, env = "MOVIE_CAL_ENGINE", value_enum)]
    pub engine: Option<Engine>,

    /// Also write the listing as JSON into this directory
    #[arg(short, long)]
    pub json_output_dir: Option<PathBuf>,
}
