//! Edge and wrap analysis, sprite extraction and padding synthesis.

use super::color::Color16;
use super::{check_buffer, try_alloc, try_clone, ResampleError, Result};
use crate::geometry::{Bounds, Extent, Vec2B, Vec2I};

/// Whether a region edge continues into the neighbouring atlas texels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisSeam {
    pub negative: bool,
    pub positive: bool,
}

impl AxisSeam {
    pub fn any(&self) -> bool {
        self.negative || self.positive
    }
}

/// Result of [`analyze`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeAnalysis {
    /// Axes sampled with wrapping
    pub wrapped: Vec2B,
    pub seam_x: AxisSeam,
    pub seam_y: AxisSeam,
}

/// Copy a region out of a full image
pub fn extract(pixels: &[Color16], image: Extent, region: Bounds) -> Result<Vec<Color16>> {
    check_buffer(pixels.len(), image)?;
    if region.is_empty() {
        return Err(ResampleError::EmptyRegion { region });
    }
    if !Bounds::full(image).contains(&region) {
        return Err(ResampleError::RegionOutOfBounds {
            region,
            image_extent: image,
        });
    }
    if region == Bounds::full(image) {
        return try_clone(pixels);
    }

    let width = region.extent.width as usize;
    let mut out = try_alloc(region.extent.area() as usize, Color16::TRANSPARENT)?;
    for (row, dst) in out.chunks_exact_mut(width).enumerate() {
        let start = (region.corner.y as usize + row) * image.width as usize + region.corner.x as usize;
        dst.copy_from_slice(&pixels[start..start + width]);
    }
    Ok(out)
}

/// Read-only view of a full source image
struct ImageView<'a> {
    pixels: &'a [Color16],
    width: usize,
}

impl<'a> ImageView<'a> {
    fn at(&self, x: i64, y: i64) -> Color16 {
        self.pixels[y as usize * self.width + x as usize]
    }

    fn columns_match(&self, a: i64, b: i64, top: i64, bottom: i64) -> bool {
        let mut visible = false;
        for y in top..bottom {
            let (pa, pb) = (self.at(a, y), self.at(b, y));
            if pa != pb {
                return false;
            }
            visible |= !pa.is_transparent();
        }
        visible
    }

    fn rows_match(&self, a: i64, b: i64, left: i64, right: i64) -> bool {
        let mut visible = false;
        for x in left..right {
            let (pa, pb) = (self.at(x, a), self.at(x, b));
            if pa != pb {
                return false;
            }
            visible |= !pa.is_transparent();
        }
        visible
    }
}

/// Decide wrapping and seams for a region of a full image
///
/// An axis wraps when `enabled` and either the host marks it as tiling or
/// the region's opposite edges are identical and not fully transparent.
/// A seam is reported on a side whose edge repeats the adjacent texels just
/// outside the region.
pub fn analyze(
    pixels: &[Color16],
    image: Extent,
    region: Bounds,
    tiling_hint: Vec2B,
    enabled: bool,
) -> Result<EdgeAnalysis> {
    check_buffer(pixels.len(), image)?;
    if region.is_empty() {
        return Err(ResampleError::EmptyRegion { region });
    }
    let full = Bounds::full(image);
    if !full.contains(&region) {
        return Err(ResampleError::RegionOutOfBounds {
            region,
            image_extent: image,
        });
    }

    let view = ImageView {
        pixels,
        width: image.width as usize,
    };
    let (left, top, right, bottom) = (region.left(), region.top(), region.right(), region.bottom());

    let mut analysis = EdgeAnalysis::default();
    if enabled {
        analysis.wrapped.x = tiling_hint.x
            || (region.extent.width > 1 && view.columns_match(left, right - 1, top, bottom));
        analysis.wrapped.y = tiling_hint.y
            || (region.extent.height > 1 && view.rows_match(top, bottom - 1, left, right));
    }

    analysis.seam_x = AxisSeam {
        negative: left > full.left() && view.columns_match(left - 1, left, top, bottom),
        positive: right < full.right() && view.columns_match(right, right - 1, top, bottom),
    };
    analysis.seam_y = AxisSeam {
        negative: top > full.top() && view.rows_match(top - 1, top, left, right),
        positive: bottom < full.bottom() && view.rows_match(bottom, bottom - 1, left, right),
    };

    Ok(analysis)
}

// ============================================================================
// Padding
// ============================================================================

/// Settings deciding whether a region receives a synthetic border
#[derive(Debug, Clone, Copy)]
pub struct PaddingPolicy<'a> {
    pub enabled: bool,
    pub min_size_texels: u32,
    pub allow: &'a [String],
    pub deny: &'a [String],
    pub max_dimension: u32,
}

/// Width of the synthetic border for a scale factor
pub fn padding_band(scale: u32) -> u32 {
    (scale / 2).max(1)
}

/// Border width in source texels per axis (zero where no padding applies)
pub fn padding_for(
    policy: &PaddingPolicy<'_>,
    name: Option<&str>,
    extent: Extent,
    scale: u32,
    edges: &EdgeAnalysis,
) -> Vec2I {
    if !policy.enabled {
        return Vec2I::ZERO;
    }
    let listed = |list: &[String]| name.is_some_and(|n| list.iter().any(|entry| entry == n));
    if listed(policy.deny) {
        return Vec2I::ZERO;
    }

    // the allow list lifts the size threshold only; tiling axes sample their
    // opposite edge and are never padded
    let mut should_pad = Vec2B::new(
        !(edges.wrapped.x || edges.seam_x.any()),
        !(edges.wrapped.y || edges.seam_y.any()),
    );
    let small = extent.width <= policy.min_size_texels && extent.height <= policy.min_size_texels;
    if small && !listed(policy.allow) {
        should_pad = Vec2B::FALSE;
    }

    let band = padding_band(scale);
    let axis = |pad: bool, size: u32| -> i32 {
        if !pad || size <= 1 {
            return 0;
        }
        let padded = u64::from(size + 2 * band) * u64::from(scale);
        if padded > u64::from(policy.max_dimension) {
            0
        } else {
            band as i32
        }
    };
    Vec2I::new(axis(should_pad.x, extent.width), axis(should_pad.y, extent.height))
}

/// Surround an image with a border replicating its edge texels
pub fn pad(pixels: &[Color16], extent: Extent, band: Vec2I) -> Result<(Vec<Color16>, Extent)> {
    check_buffer(pixels.len(), extent)?;
    if band == Vec2I::ZERO {
        return Ok((try_clone(pixels)?, extent));
    }

    let (bx, by) = (band.x.max(0) as u32, band.y.max(0) as u32);
    let padded = Extent::new(extent.width + 2 * bx, extent.height + 2 * by);
    let mut out = try_alloc(padded.area() as usize, Color16::TRANSPARENT)?;

    let (w, h) = (extent.width as i64, extent.height as i64);
    for y in 0..padded.height as i64 {
        let sy = (y - i64::from(by)).clamp(0, h - 1);
        for x in 0..padded.width as i64 {
            let sx = (x - i64::from(bx)).clamp(0, w - 1);
            out[(y * padded.width as i64 + x) as usize] = pixels[(sy * w + sx) as usize];
        }
    }
    Ok((out, padded))
}
