//! Data recovery for lzip compressed files: merge several damaged copies
//! into a good one, repair a single-byte error, or split a multimember
//! stream into its members.

pub mod decoder;
pub mod diff;
pub mod error;
pub mod fileio;
pub mod header;
pub mod merge;
pub mod oracle;
pub mod repair;
pub mod split;

pub use diff::Block;
pub use error::RescueError;
pub use oracle::{try_decompress, Verdict};

use std::sync::atomic::{AtomicI32, Ordering};

static VERBOSITY: AtomicI32 = AtomicI32::new(0);

/// Written once during argument parsing, read by every diagnostic site.
/// Negative silences everything; progress lines need at least 1.
pub fn set_verbosity(level: i32) {
    VERBOSITY.store(level, Ordering::Relaxed);
}

pub fn verbosity() -> i32 {
    VERBOSITY.load(Ordering::Relaxed)
}
