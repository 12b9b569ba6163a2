//! Sprite resampling: the edge-directed scaler and the passes around it.
//!
//! A miss runs through [`pipeline::Upscaler`], which extracts the sprite,
//! analyzes its edges, pads, premultiplies, scales, clamps, classifies and
//! optionally block-compresses the result.

pub mod blend;
pub mod color;
pub mod compress;
pub mod edge;
pub mod kernel;
pub mod pipeline;
pub mod xbrz;

use crate::geometry::{Bounds, Extent};
use thiserror::Error;

pub use color::Color16;
pub use compress::{PixelFormat, PixelStats};
pub use pipeline::Upscaler;
pub use xbrz::ScalerConfig;

/// Smallest scale factor the scaler produces
pub const MIN_SCALE: u32 = 2;
/// Largest scale factor the scaler produces
pub const MAX_SCALE: u32 = 6;

/// Errors raised by the resampling passes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResampleError {
    #[error("Invalid scale factor: {scale} (must be between 2 and 6)")]
    InvalidScale { scale: u32 },

    #[error("Region {region} is empty")]
    EmptyRegion { region: Bounds },

    #[error("Region {region} lies outside the {image_extent} source")]
    RegionOutOfBounds { region: Bounds, image_extent: Extent },

    #[error("Pixel buffer holds {actual} texels, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("{format:?} is not a block format")]
    NotBlockFormat { format: PixelFormat },

    #[error("Extent {extent} is not a multiple of the 4x4 block size")]
    NotBlockMultiple { extent: Extent },

    #[error("Out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("Resize failed: {0}")]
    Resize(String),
}

impl ResampleError {
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, ResampleError::OutOfMemory { .. })
    }
}

pub type Result<T> = std::result::Result<T, ResampleError>;

/// Allocate a filled buffer, reporting allocation failure instead of aborting
pub(crate) fn try_alloc<T: Clone>(len: usize, fill: T) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| ResampleError::OutOfMemory {
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    buffer.resize(len, fill);
    Ok(buffer)
}

/// Copy a slice, reporting allocation failure instead of aborting
pub(crate) fn try_clone<T: Clone>(items: &[T]) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(items.len())
        .map_err(|_| ResampleError::OutOfMemory {
            bytes: items.len().saturating_mul(std::mem::size_of::<T>()),
        })?;
    buffer.extend_from_slice(items);
    Ok(buffer)
}

/// Check that a buffer matches its declared extent
pub(crate) fn check_buffer(len: usize, extent: Extent) -> Result<()> {
    let expected = extent.area() as usize;
    if len != expected {
        return Err(ResampleError::BufferSizeMismatch {
            expected,
            actual: len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_alloc_fills() {
        let v = try_alloc(16, 7u8).unwrap();
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_try_alloc_reports_oom() {
        let err = try_alloc(usize::MAX / 2, 0u64).unwrap_err();
        assert!(err.is_out_of_memory());
    }

    #[test]
    fn test_check_buffer() {
        assert!(check_buffer(16, Extent::new(4, 4)).is_ok());
        assert_eq!(
            check_buffer(15, Extent::new(4, 4)),
            Err(ResampleError::BufferSizeMismatch {
                expected: 16,
                actual: 15
            })
        );
    }
}
