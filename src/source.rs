//! Host-provided source images and the regions requested from them.

use crate::cache::fingerprint::hash_region;
use crate::geometry::{Bounds, Extent, Vec2B};
use crate::resample::color::decode_rgba8;
use crate::resample::{check_buffer, Color16, ResampleError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Runtime identity of a source image, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl SourceId {
    fn next() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A sprite sheet or standalone sprite owned by the host
#[derive(Debug)]
pub struct SourceImage {
    id: SourceId,
    name: Option<String>,
    extent: Extent,
    pixels: Vec<Color16>,
    /// Content hashes by region; pixels never change after construction
    region_hashes: Mutex<HashMap<Bounds, u64>>,
}

impl SourceImage {
    pub fn new(name: Option<String>, extent: Extent, pixels: Vec<Color16>) -> Result<Self, ResampleError> {
        check_buffer(pixels.len(), extent)?;
        Ok(Self {
            id: SourceId::next(),
            name,
            extent,
            pixels,
            region_hashes: Mutex::new(HashMap::new()),
        })
    }

    /// Build from tightly packed RGBA8 bytes
    pub fn from_rgba8(name: Option<String>, extent: Extent, rgba: &[u8]) -> Result<Self, ResampleError> {
        if rgba.len() != extent.area() as usize * 4 {
            return Err(ResampleError::BufferSizeMismatch {
                expected: extent.area() as usize * 4,
                actual: rgba.len(),
            });
        }
        Self::new(name, extent, decode_rgba8(rgba))
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Logical name, stable across runs (usually an asset path)
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn pixels(&self) -> &[Color16] {
        &self.pixels
    }

    /// Hash of the texels inside `bounds`, computed once per region
    pub fn region_hash(&self, bounds: Bounds) -> u64 {
        if let Some(&hash) = self.region_hashes.lock().get(&bounds) {
            return hash;
        }
        let hash = hash_region(&self.pixels, self.extent, bounds);
        self.region_hashes.lock().insert(bounds, hash);
        hash
    }
}

/// A rectangle of a source image, with the host's tiling hints
#[derive(Debug, Clone)]
pub struct SourceRegion {
    pub source: Arc<SourceImage>,
    pub bounds: Bounds,
    /// Axes the host samples with wrap addressing
    pub tiling: Vec2B,
}

impl SourceRegion {
    pub fn new(source: Arc<SourceImage>, bounds: Bounds) -> Self {
        Self {
            source,
            bounds,
            tiling: Vec2B::FALSE,
        }
    }

    /// The whole image
    pub fn full(source: Arc<SourceImage>) -> Self {
        let bounds = Bounds::full(source.extent());
        Self::new(source, bounds)
    }

    pub fn with_tiling(mut self, tiling: Vec2B) -> Self {
        self.tiling = tiling;
        self
    }

    /// Check that the region is non-empty and inside its source
    pub fn validate(&self) -> Result<(), ResampleError> {
        if self.bounds.is_empty() {
            return Err(ResampleError::EmptyRegion {
                region: self.bounds,
            });
        }
        let image = self.source.extent();
        if !Bounds::full(image).contains(&self.bounds) {
            return Err(ResampleError::RegionOutOfBounds {
                region: self.bounds,
                image_extent: image,
            });
        }
        Ok(())
    }
}
