//! One complete miss computation, from source region to cache entry.

use super::color::{encode_rgba8, premultiply, unpremultiply, Color16};
use super::compress::{self, PixelFormat, PixelStats};
use super::edge::{self, EdgeAnalysis};
use super::xbrz::{self, ScalerConfig};
use super::{ResampleError, Result, MAX_SCALE, MIN_SCALE};
use crate::cache::entry::ScaleResult;
use crate::config::ResampleConfig;
use crate::geometry::{Bounds, Extent, Vec2B, Vec2I};
use crate::source::SourceImage;
use fast_image_resize as fir;
use fir::images::Image;
use fir::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use std::sync::Arc;

/// A finished upscale and the statistics that chose its format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upscaled {
    pub result: ScaleResult,
    pub stats: PixelStats,
    pub edges: EdgeAnalysis,
}

/// Runs the resampling passes with one configuration
#[derive(Debug, Clone)]
pub struct Upscaler {
    config: Arc<ResampleConfig>,
    scaler: ScalerConfig,
}

impl Upscaler {
    pub fn new(config: Arc<ResampleConfig>) -> Self {
        let scaler = config.scaler_config();
        Self { config, scaler }
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.config
    }

    /// Scale factor actually used for a region of `extent`
    ///
    /// Starts at the requested factor bounded to `2..=max_scale` and steps
    /// down while the result would exceed the preferred maximum dimension.
    pub fn effective_scale(&self, extent: Extent, requested: u32) -> Result<u32> {
        if requested == 0 {
            return Err(ResampleError::InvalidScale { scale: requested });
        }
        let mut scale = requested.min(self.config.max_scale).max(MIN_SCALE);
        while scale > MIN_SCALE && !extent.scaled(scale).fits_within(self.config.preferred_max_dimension) {
            scale -= 1;
        }
        Ok(scale)
    }

    /// Upscale `region` of `source` by `scale`
    ///
    /// `tiling` carries the host's wrap hints.
    pub fn upscale(&self, source: &SourceImage, region: Bounds, tiling: Vec2B, scale: u32) -> Result<Upscaled> {
        if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
            return Err(ResampleError::InvalidScale { scale });
        }
        let config = &*self.config;

        let edges = edge::analyze(
            source.pixels(),
            source.extent(),
            region,
            tiling,
            config.wrapped_addressing,
        )?;
        let band = edge::padding_for(&config.padding_policy(), source.name(), region.extent, scale, &edges);
        let (mut pixels, extent) = {
            let sprite = edge::extract(source.pixels(), source.extent(), region)?;
            edge::pad(&sprite, region.extent, band)?
        };

        if config.premultiply_alpha {
            premultiply(&mut pixels);
        }
        let mut scaled = xbrz::scale(scale, &pixels, extent, edges.wrapped, &self.scaler)?;
        drop(pixels);

        let full = extent.scaled(scale);
        let dimensions = full.clamped(config.max_dimension);
        if dimensions != full {
            log::debug!("Clamping {} to {}", full, dimensions);
            scaled = resize(&scaled, full, dimensions, config.premultiply_alpha)?;
        }
        if config.premultiply_alpha {
            unpremultiply(&mut scaled, config.premultiplication_low_pass);
        }

        let mut rgba = encode_rgba8(&scaled);
        drop(scaled);
        let stats = compress::classify(&mut rgba, config.masky_alpha_deviation_threshold);

        let factor = scale as i32;
        let mut result = ScaleResult {
            data: rgba,
            dimensions,
            format: PixelFormat::Rgba8,
            wrapped: edges.wrapped,
            padding: Vec2I::new(band.x * factor, band.y * factor),
            block_padding: Vec2I::ZERO,
        };
        if config.block_compression {
            compress_in_place(&mut result, &stats)?;
        }

        log::debug!(
            "Upscaled {} region {} x{} to {} {:?}",
            source.name().unwrap_or("<unnamed>"),
            region,
            scale,
            result.dimensions,
            result.format
        );
        Ok(Upscaled { result, stats, edges })
    }
}

/// Block-pad and compress when the padded result is block aligned
fn compress_in_place(result: &mut ScaleResult, stats: &PixelStats) -> Result<()> {
    let (padded, extent, added) = compress::block_pad(&result.data, result.dimensions)?;
    if !compress::is_block_multiple(extent) {
        return Ok(());
    }
    let format = stats.block_format();
    result.data = compress::compress(&padded, extent, format, stats.masky_alpha)?;
    result.dimensions = extent;
    result.format = format;
    result.block_padding = added;
    Ok(())
}

/// Catmull-Rom resample of a 16-bit image
fn resize(pixels: &[Color16], from: Extent, to: Extent, premultiplied: bool) -> Result<Vec<Color16>> {
    let resize_err = |err: &dyn std::fmt::Display| ResampleError::Resize(err.to_string());

    let mut bytes = super::try_alloc(pixels.len() * 8, 0u8)?;
    for (px, out) in pixels.iter().zip(bytes.chunks_exact_mut(8)) {
        out[0..2].copy_from_slice(&px.r.to_ne_bytes());
        out[2..4].copy_from_slice(&px.g.to_ne_bytes());
        out[4..6].copy_from_slice(&px.b.to_ne_bytes());
        out[6..8].copy_from_slice(&px.a.to_ne_bytes());
    }
    let src = Image::from_vec_u8(from.width, from.height, bytes, PixelType::U16x4).map_err(|e| resize_err(&e))?;
    let mut dst = Image::new(to.width, to.height, PixelType::U16x4);

    let options = ResizeOptions::new()
        .resize_alg(ResizeAlg::Convolution(FilterType::CatmullRom))
        .use_alpha(!premultiplied);
    Resizer::new()
        .resize(&src, &mut dst, &options)
        .map_err(|e| resize_err(&e))?;

    let word = |b: &[u8]| u16::from_ne_bytes([b[0], b[1]]);
    Ok(dst
        .buffer()
        .chunks_exact(8)
        .map(|b| Color16::new(word(&b[0..2]), word(&b[2..4]), word(&b[4..6]), word(&b[6..8])))
        .collect())
}

/// Run `op`; on allocation failure call `compact` once and retry
pub fn retry_on_oom<T>(mut op: impl FnMut() -> Result<T>, compact: impl FnOnce() -> u64) -> Result<T> {
    match op() {
        Err(err) if err.is_out_of_memory() => {
            let freed = compact();
            log::warn!("{}; retrying after compacting {} bytes", err, freed);
            op()
        }
        other => other,
    }
}
