//! Stable 64-bit fingerprints of resample requests.

use crate::geometry::{Bounds, Extent, Vec2B};
use crate::resample::Color16;
use crate::source::SourceId;
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// Streaming 64-bit XXH3 with typed little-endian writers
#[derive(Clone)]
pub struct Hasher64 {
    inner: Xxh3,
}

impl Hasher64 {
    pub fn new() -> Self {
        Self { inner: Xxh3::new() }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.update(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.update(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.update(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.update(&[u8::from(value)]);
    }

    /// Length-prefixed so adjacent strings cannot alias
    pub fn write_str(&mut self, value: &str) {
        self.write_u64(value.len() as u64);
        self.update(value.as_bytes());
    }

    pub fn finish(&self) -> u64 {
        self.inner.digest()
    }
}

impl Default for Hasher64 {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash the texels of a region of a full image
pub fn hash_region(pixels: &[Color16], image: Extent, region: Bounds) -> u64 {
    let mut hasher = Hasher64::new();
    let width = image.width as usize;
    let (x0, y0) = (region.corner.x.max(0) as usize, region.corner.y.max(0) as usize);
    let row_len = region.extent.width as usize;
    let mut row_bytes = Vec::with_capacity(row_len * 8);
    for y in y0..y0 + region.extent.height as usize {
        let start = y * width + x0;
        let Some(row) = pixels.get(start..start + row_len) else {
            break;
        };
        row_bytes.clear();
        for px in row {
            for channel in [px.r, px.g, px.b, px.a] {
                row_bytes.extend_from_slice(&channel.to_le_bytes());
            }
        }
        hasher.update(&row_bytes);
    }
    hasher.finish()
}

/// Content-addressed identity of a resample request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Everything a fingerprint depends on
#[derive(Debug, Clone, Copy)]
pub struct FingerprintInputs<'a> {
    pub source_id: SourceId,
    pub name: Option<&'a str>,
    pub image_extent: Extent,
    pub region: Bounds,
    pub scale: u32,
    pub tiling: Vec2B,
    pub config_digest: u64,
    pub content_hash: Option<u64>,
}

impl Fingerprint {
    /// Derive the fingerprint
    ///
    /// Unnamed sources are keyed by their runtime id, which makes their
    /// fingerprints meaningless across runs.
    pub fn compute(inputs: &FingerprintInputs<'_>) -> Self {
        let mut hasher = Hasher64::new();
        match inputs.name {
            Some(name) => {
                hasher.write_bool(true);
                hasher.write_str(name);
            }
            None => {
                hasher.write_bool(false);
                hasher.write_u64(inputs.source_id.0);
            }
        }
        hasher.write_u32(inputs.image_extent.width);
        hasher.write_u32(inputs.image_extent.height);
        hasher.write_i32(inputs.region.corner.x);
        hasher.write_i32(inputs.region.corner.y);
        hasher.write_u32(inputs.region.extent.width);
        hasher.write_u32(inputs.region.extent.height);
        hasher.write_u32(inputs.scale);
        hasher.write_bool(inputs.tiling.x);
        hasher.write_bool(inputs.tiling.y);
        hasher.write_u64(inputs.config_digest);
        match inputs.content_hash {
            Some(hash) => {
                hasher.write_bool(true);
                hasher.write_u64(hash);
            }
            None => hasher.write_bool(false),
        }
        Fingerprint(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn inputs() -> FingerprintInputs<'static> {
        FingerprintInputs {
            source_id: SourceId(7),
            name: Some("sprites/hero.png"),
            image_extent: Extent::new(64, 64),
            region: Bounds::new(16, 0, 16, 16),
            scale: 4,
            tiling: Vec2B::FALSE,
            config_digest: 42,
            content_hash: Some(1234),
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Fingerprint::compute(&inputs());
        let b = Fingerprint::compute(&inputs());
        assert_eq!(a, b);
        assert_eq!(format!("{}", a).len(), 16);
    }

    #[test]
    fn test_named_sources_ignore_runtime_id() {
        let mut other = inputs();
        other.source_id = SourceId(99);
        assert_eq!(Fingerprint::compute(&inputs()), Fingerprint::compute(&other));

        let mut unnamed = inputs();
        unnamed.name = None;
        let mut unnamed_other = unnamed;
        unnamed_other.source_id = SourceId(99);
        assert_ne!(Fingerprint::compute(&unnamed), Fingerprint::compute(&unnamed_other));
    }

    #[test]
    fn test_each_input_changes_fingerprint() {
        let base = Fingerprint::compute(&inputs());
        let variants: [fn(&mut FingerprintInputs<'static>); 8] = [
            |i| i.name = Some("sprites/villain.png"),
            |i| i.image_extent = Extent::new(64, 32),
            |i| i.region = Bounds::new(0, 0, 16, 16),
            |i| i.scale = 3,
            |i| i.tiling = Vec2B::new(true, false),
            |i| i.config_digest = 43,
            |i| i.content_hash = Some(1235),
            |i| i.content_hash = None,
        ];
        for change in variants {
            let mut i = inputs();
            change(&mut i);
            assert_ne!(Fingerprint::compute(&i), base);
        }
    }

    #[test]
    fn test_hash_region_sees_only_region() {
        let extent = Extent::new(4, 4);
        let mut pixels = vec![Color16::new(1, 2, 3, 4); 16];
        let region = Bounds::new(0, 0, 2, 2);
        let before = hash_region(&pixels, extent, region);
        pixels[15] = Color16::TRANSPARENT;
        assert_eq!(hash_region(&pixels, extent, region), before);
        pixels[5] = Color16::TRANSPARENT;
        assert_ne!(hash_region(&pixels, extent, region), before);
    }

    #[test]
    fn test_distinct_regions_do_not_collide() {
        let extent = Extent::new(4, 4);
        let region = Bounds::full(extent);
        let mut seen = HashSet::new();
        for seed in 0..200_000u32 {
            let pixels: Vec<Color16> = (0..16u32)
                .map(|i| {
                    let v = seed.wrapping_mul(2_654_435_761).rotate_left(i);
                    Color16::new(v as u16, (v >> 16) as u16, i as u16, seed as u16)
                })
                .collect();
            assert!(
                seen.insert(hash_region(&pixels, extent, region)),
                "collision at seed {}",
                seed
            );
        }
    }

    #[test]
    fn test_hash_halves_follow_content() {
        let halves: Vec<(u32, u32)> = (0..1000u64)
            .map(|n| {
                let mut hasher = Hasher64::new();
                hasher.write_u64(n);
                let h = hasher.finish();
                ((h >> 32) as u32, h as u32)
            })
            .collect();
        let xors: HashSet<u32> = halves.iter().map(|(hi, lo)| hi ^ lo).collect();
        let his: HashSet<u32> = halves.iter().map(|(hi, _)| *hi).collect();
        // a linear combination of the halves would collapse to a few values
        assert!(xors.len() > 990, "only {} distinct", xors.len());
        assert!(his.len() > 990, "only {} distinct", his.len());
    }

    #[test]
    fn test_hasher_strings_do_not_alias() {
        let mut a = Hasher64::new();
        a.write_str("ab");
        a.write_str("c");
        let mut b = Hasher64::new();
        b.write_str("a");
        b.write_str("bc");
        assert_ne!(a.finish(), b.finish());
    }
}
