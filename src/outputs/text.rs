//! Plain-text listing written to stdout.
//!
//! Each screening becomes a block of labelled lines followed by a Markdown
//! task line that can be pasted straight into a notes app:
//!
//! ```text
//! TITLE: Alien
//! TIME: Wed Oct 21 7:30 PM PDT 2026
//! THEATER: Hollywood Theater
//! URL: https://hollywoodtheatre.org/events/alien
//! - [ ] 19:30 [Alien Screening](https://hollywoodtheatre.org/events/alien) 📅 2026-10-21
//! ```
//!
//! `TIME` is shown in the display time zone; the task line keeps the venue's
//! own wall clock.

use chrono_tz::Tz;
use std::fmt::Write;

use crate::models::Screening;

const RULE_WIDTH: usize = 60;
const TIME_FORMAT: &str = "%a %b %e %-I:%M %p %Z %Y";

/// Render the listing in the order given.
///
/// # Arguments
///
/// * `screenings` - The aggregated listing
/// * `display_tz` - Time zone of the `TIME` line
///
/// # Returns
///
/// A `SCREENINGS:` header and rule, then one block per screening: the
/// `TITLE`/`TIME`/`THEATER`/`URL` lines and a task line.
pub fn render_listing(screenings: &[Screening], display_tz: Tz) -> String {
    let mut out = String::new();
    out.push_str("SCREENINGS:\n");
    out.push_str(&"=".repeat(RULE_WIDTH));
    out.push('\n');

    for s in screenings {
        let shown = s.start_time().with_timezone(&display_tz);
        let local = s.start_time();
        // Writing to a String cannot fail.
        let _ = writeln!(out, "TITLE: {}", s.title());
        let _ = writeln!(out, "TIME: {}", shown.format(TIME_FORMAT));
        let _ = writeln!(out, "THEATER: {}", s.venue().display_name());
        let _ = writeln!(out, "URL: {}", s.detail_url());
        let _ = writeln!(
            out,
            "- [ ] {} [{} Screening]({}) 📅 {}",
            local.format("%H:%M"),
            s.title(),
            s.detail_url(),
            local.format("%Y-%m-%d")
        );
        out.push('\n');
    }
    out
}
