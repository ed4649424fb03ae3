//! JSON copy of the listing for other tools.
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── screenings.json   # { generated_at, count, screenings: [...] }
//! ```
//!
//! The file is replaced on every run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

use crate::models::Screening;

pub const FILE_NAME: &str = "screenings.json";

#[derive(Debug, Serialize)]
pub struct Listing<'a> {
    pub generated_at: DateTime<Utc>,
    pub count: usize,
    pub screenings: &'a [Screening],
}

impl<'a> Listing<'a> {
    pub fn new(screenings: &'a [Screening], generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            count: screenings.len(),
            screenings,
        }
    }
}

/// Write `listing` to `<json_output_dir>/screenings.json`, creating the
/// directory if needed.
///
/// # Arguments
///
/// * `listing` - Screenings plus generation metadata
/// * `json_output_dir` - Directory to write into
///
/// # Returns
///
/// The path written.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir.display()))]
pub async fn write_listing(listing: &Listing<'_>, json_output_dir: &Path) -> io::Result<PathBuf> {
    let json = serde_json::to_string_pretty(listing)?;

    if let Err(e) = fs::create_dir_all(json_output_dir).await {
        error!(error = %e, "Failed to create JSON dir");
        return Err(e);
    }

    let path = json_output_dir.join(FILE_NAME);
    info!(path = %path.display(), count = listing.count, "Writing JSON");
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON listing");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Venue;
    use chrono::TimeZone;
    use chrono_tz::America::Los_Angeles;

    #[tokio::test]
    async fn test_write_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let out_dir = tmp.path().join("json");
        let start = Los_Angeles.with_ymd_and_hms(2026, 10, 21, 19, 30, 0).unwrap();
        let screenings = vec![
            Screening::new("Alien", Venue::HollywoodTheatre, start, "/events/alien").unwrap(),
        ];
        let generated_at = Utc.with_ymd_and_hms(2026, 10, 20, 19, 0, 0).unwrap();

        let path = write_listing(&Listing::new(&screenings, generated_at), &out_dir)
            .await
            .unwrap();
        assert_eq!(path, out_dir.join(FILE_NAME));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["generated_at"], "2026-10-20T19:00:00Z");
        assert_eq!(value["screenings"][0]["title"], "Alien");
        assert_eq!(value["screenings"][0]["venue"], "Hollywood Theater");
        assert_eq!(value["screenings"][0]["start_time"], "2026-10-21T19:30:00-07:00");
    }
}
