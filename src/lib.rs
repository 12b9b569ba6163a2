//! Sprite resampling engine
//!
//! Upscales sprites and atlas regions with an edge-directed scaler, caches
//! the results in memory and on disk by content fingerprint, and schedules
//! the work against a per-frame budget.

pub mod cache;
pub mod cli;
pub mod config;
pub mod geometry;
pub mod logging;
pub mod memory;
pub mod resample;
pub mod scheduler;
pub mod source;
pub mod texture;
pub mod threading;

pub use cache::{CacheManager, Fingerprint, ScaleResult};
pub use cli::Cli;
pub use config::ResampleConfig;
pub use logging::LogLevel;
pub use resample::{PixelFormat, ResampleError, Upscaler};
pub use scheduler::{Lookup, Scheduler};
pub use source::{SourceImage, SourceRegion};
pub use texture::{ManagedTexture, ScaledTexture};
