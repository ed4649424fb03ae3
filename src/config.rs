//! Run settings: CLI flags over an optional YAML file over defaults.
//!
//! # Config file
//!
//! Every key is optional:
//!
//! ```yaml
//! venues: [clinton, hollywood, academy, cinemagic]
//! timezone: America/Los_Angeles
//! display_timezone: America/New_York
//! cache_dir: /var/tmp/movie-cal
//! cache_ttl_hours: 24
//! chrome_bin: /usr/bin/chromium
//! engine: chrome            # or: static
//! pool_size: 12
//! page_timeout_secs: 60
//! http_timeout_secs: 120
//! channel_capacity: 1000
//! venue_concurrency: 6
//! json_output_dir: ./out
//! ```

use chrono_tz::Tz;
use itertools::Itertools;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::DEFAULT_TTL_HOURS;
use crate::cli::{Cli, Engine};
use crate::error::ConfigError;
use crate::models::Venue;
use crate::orchestrator::DEFAULT_CHANNEL_CAPACITY;
use crate::render::pool::DEFAULT_CAPACITY;

pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";
pub const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_VENUE_CONCURRENCY: usize = 6;

/// Contents of the YAML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub venues: Option<Vec<String>>,
    pub timezone: Option<String>,
    pub display_timezone: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub cache_ttl_hours: Option<u64>,
    pub chrome_bin: Option<PathBuf>,
    pub engine: Option<Engine>,
    pub pool_size: Option<usize>,
    pub page_timeout_secs: Option<u64>,
    pub http_timeout_secs: Option<u64>,
    pub channel_capacity: Option<usize>,
    pub venue_concurrency: Option<usize>,
    pub json_output_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub venues: Vec<Venue>,
    /// Zone the venues print showtimes in.
    pub tz: Tz,
    /// Zone for the listing's TIME lines.
    pub display_tz: Tz,
    pub cache_root: PathBuf,
    pub cache_ttl: chrono::Duration,
    pub chrome_bin: Option<PathBuf>,
    pub engine: Engine,
    pub pool_size: usize,
    pub page_timeout: Duration,
    pub http_timeout: Duration,
    pub channel_capacity: usize,
    pub venue_concurrency: usize,
    pub json_output_dir: Option<PathBuf>,
}

impl Settings {
    /// Load the config file named by `cli` (if any) and merge the two.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    /// Combine CLI values with file values; the CLI wins.
    pub fn merge(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let venue_slugs = if cli.venues.is_empty() {
            file.venues
        } else {
            Some(cli.venues.clone())
        };
        let venues = match venue_slugs {
            Some(slugs) => slugs
                .iter()
                .map(|s| s.parse::<Venue>().map_err(ConfigError::Venue))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .unique()
                .collect(),
            None => Venue::ALL.to_vec(),
        };

        let tz = parse_tz(
            cli.timezone
                .as_deref()
                .or(file.timezone.as_deref())
                .unwrap_or(DEFAULT_TIMEZONE),
        )?;
        let display_tz = match cli
            .display_timezone
            .as_deref()
            .or(file.display_timezone.as_deref())
        {
            Some(name) => parse_tz(name)?,
            None => tz,
        };

        let settings = Self {
            venues,
            tz,
            display_tz,
            cache_root: cli
                .cache_dir
                .clone()
                .or(file.cache_dir)
                .unwrap_or_else(|| std::env::temp_dir().join("movie-cal")),
            cache_ttl: chrono::Duration::hours(nonzero(
                "cache_ttl_hours",
                file.cache_ttl_hours.unwrap_or(DEFAULT_TTL_HOURS as u64),
            )? as i64),
            chrome_bin: cli.chrome_bin.clone().or(file.chrome_bin),
            engine: cli.engine.or(file.engine).unwrap_or(Engine::Chrome),
            pool_size: nonzero(
                "pool_size",
                cli.pool_size.or(file.pool_size).unwrap_or(DEFAULT_CAPACITY),
            )?,
            page_timeout: Duration::from_secs(nonzero(
                "page_timeout_secs",
                file.page_timeout_secs.unwrap_or(DEFAULT_PAGE_TIMEOUT_SECS),
            )?),
            http_timeout: Duration::from_secs(nonzero(
                "http_timeout_secs",
                file.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            )?),
            channel_capacity: nonzero(
                "channel_capacity",
                file.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY),
            )?,
            venue_concurrency: nonzero(
                "venue_concurrency",
                file.venue_concurrency.unwrap_or(DEFAULT_VENUE_CONCURRENCY),
            )?,
            json_output_dir: cli.json_output_dir.clone().or(file.json_output_dir),
        };
        debug!(?settings, "Resolved settings");
        Ok(settings)
    }

    /// Whether any configured venue needs a rendering session.
    pub fn needs_renderer(&self) -> bool {
        self.venues.iter().any(|v| v.needs_renderer())
    }
}

fn parse_tz(name: &str) -> Result<Tz, ConfigError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::TimeZone(name.to_string()))
}

fn nonzero<T: PartialEq + Default>(field: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        Err(ConfigError::Zero { field })
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("movie_cal").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let s = Settings::merge(&cli(&[]), FileConfig::default()).unwrap();
        assert_eq!(s.venues, Venue::ALL.to_vec());
        assert_eq!(s.tz, chrono_tz::America::Los_Angeles);
        assert_eq!(s.display_tz, s.tz);
        assert_eq!(s.pool_size, 12);
        assert_eq!(s.cache_ttl, chrono::Duration::hours(24));
        assert_eq!(s.page_timeout, Duration::from_secs(60));
        assert_eq!(s.channel_capacity, 1000);
        assert_eq!(s.engine, Engine::Chrome);
        assert!(s.cache_root.ends_with("movie-cal"));
        assert!(s.needs_renderer());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig {
            venues: Some(vec!["hollywood".into()]),
            pool_size: Some(4),
            timezone: Some("America/Chicago".into()),
            ..FileConfig::default()
        };
        let s = Settings::merge(&cli(&["--venues", "clinton", "--pool-size", "2"]), file).unwrap();
        assert_eq!(s.venues, vec![Venue::ClintonStateTheater]);
        assert_eq!(s.pool_size, 2);
        assert_eq!(s.tz, chrono_tz::America::Chicago);
        assert!(!s.needs_renderer());
    }

    #[test]
    fn test_duplicate_venues_collapse() {
        let s = Settings::merge(&cli(&["--venues", "academy,Academy"]), FileConfig::default())
            .unwrap();
        assert_eq!(s.venues, vec![Venue::AcademyTheater]);
    }

    #[test]
    fn test_rejects_unknown_venue() {
        let err = Settings::merge(&cli(&["--venues", "bagdad"]), FileConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Venue(_)));
    }

    #[test]
    fn test_rejects_bad_time_zone() {
        let err = Settings::merge(&cli(&["--timezone", "Pacific Time"]), FileConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::TimeZone(_)));
    }

    #[test]
    fn test_rejects_zero_pool() {
        let err = Settings::merge(&cli(&["--pool-size", "0"]), FileConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Zero { field: "pool_size" }));
    }

    #[test]
    fn test_load_yaml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("movie_cal.yaml");
        std::fs::write(
            &path,
            "venues: [cinemagic]\nengine: static\ncache_ttl_hours: 6\ndisplay_timezone: UTC\n",
        )
        .unwrap();

        let path_arg = path.display().to_string();
        let s = Settings::resolve(&cli(&["-c", &path_arg])).unwrap();
        assert_eq!(s.venues, vec![Venue::CineMagicTheater]);
        assert_eq!(s.engine, Engine::Static);
        assert_eq!(s.cache_ttl, chrono::Duration::hours(6));
        assert_eq!(s.display_tz, chrono_tz::UTC);
    }

    #[test]
    fn test_unknown_yaml_key_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.yaml");
        std::fs::write(&path, "pool_sise: 3\n").unwrap();
        let path_arg = path.display().to_string();
        assert!(matches!(
            Settings::resolve(&cli(&["-c", &path_arg])),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(matches!(
            Settings::resolve(&cli(&["-c", "/no/such/movie_cal.yaml"])),
            Err(ConfigError::Read { .. })
        ));
    }
}
