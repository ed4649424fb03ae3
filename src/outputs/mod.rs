//! Output generation for the final listing.
//!
//! # Submodules
//!
//! - [`text`]: the human-readable listing printed to stdout
//! - [`json`]: an optional machine-readable copy written to disk
//!
//! # Output Structure
//!
//! ```text
//! stdout                 # SCREENINGS: ... one block per screening
//!
//! json_output_dir/
//! └── screenings.json    # only with --json-output-dir
//! ```

pub mod json;
pub mod text;
