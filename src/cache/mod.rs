//! Content-addressed storage of resampled results.
//!
//! In memory, results live in per-source partitions owned by the
//! [`CacheManager`]; on disk, each result is a fingerprint-named file.

pub mod disk;
pub mod entry;
pub mod fingerprint;
pub mod lru;
pub mod manager;

pub use disk::DiskCache;
pub use entry::{CacheEntry, ScaleResult};
pub use fingerprint::{Fingerprint, FingerprintInputs};
pub use lru::RecencyList;
pub use manager::{CacheManager, CacheStats, Claim};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Disk cache failures; callers treat every variant as a miss
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}
