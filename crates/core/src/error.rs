//! Error taxonomy for a single crawl (spec §7).
//!
//! Most failure modes inside a crawl are recoverable — a file that can't be
//! read, a regex mismatch, an unresolvable import — and are handled inline
//! by logging a warning and continuing. `CrawlError` only covers the one
//! fatal case: an invalid input root, which aborts the whole crawl.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("crawl root does not exist or is not a directory: {0}")]
    InvalidRoot(PathBuf),
}

impl CrawlError {
    /// Exit code mandated by spec §7 for an invalid input root.
    pub const EXIT_CODE: i32 = 2;
}
