//! Alpha classification and 4x4 block compression.
//!
//! Three block formats are produced:
//! - `BlockNoAlpha`: 8 bytes per block, two RGB565 endpoints, four-color palette
//! - `BlockPunchThrough`: 8 bytes per block, three colors plus transparent
//! - `BlockFullAlpha`: 16 bytes per block, an interpolated alpha block
//!   followed by a four-color block
//!
//! Compression only runs on images whose dimensions are multiples of four.

use super::{try_alloc, ResampleError, Result};
use crate::geometry::{Extent, Vec2I};

/// Storage format of a resampled texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PixelFormat {
    /// Uncompressed 8-bit RGBA
    Rgba8 = 0,
    BlockNoAlpha = 1,
    BlockPunchThrough = 2,
    BlockFullAlpha = 3,
}

impl PixelFormat {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PixelFormat::Rgba8),
            1 => Some(PixelFormat::BlockNoAlpha),
            2 => Some(PixelFormat::BlockPunchThrough),
            3 => Some(PixelFormat::BlockFullAlpha),
            _ => None,
        }
    }

    pub fn is_compressed(self) -> bool {
        self != PixelFormat::Rgba8
    }

    /// Byte size of an image of this format, `None` when the extent is not
    /// representable (compressed formats need multiples of four)
    pub fn byte_size(self, extent: Extent) -> Option<usize> {
        let area = usize::try_from(extent.area()).ok()?;
        match self {
            PixelFormat::Rgba8 => area.checked_mul(4),
            _ if !is_block_multiple(extent) => None,
            PixelFormat::BlockNoAlpha | PixelFormat::BlockPunchThrough => Some(area / 2),
            PixelFormat::BlockFullAlpha => Some(area),
        }
    }
}

pub fn is_block_multiple(extent: Extent) -> bool {
    extent.width % 4 == 0 && extent.height % 4 == 0
}

// ============================================================================
// Classification
// ============================================================================

/// Channel statistics of an RGBA8 image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelStats {
    pub has_r: bool,
    pub has_g: bool,
    pub has_b: bool,
    /// Alpha varies between texels
    pub has_alpha: bool,
    /// Every texel is fully opaque
    pub is_opaque: bool,
    /// Every alpha is either 0 or 255
    pub punch_through: bool,
    /// Alpha is dominated by hard 0/255 values
    pub masky_alpha: bool,
    pub grayscale: bool,
}

impl PixelStats {
    /// Block format matching these statistics
    pub fn block_format(&self) -> PixelFormat {
        if self.is_opaque {
            PixelFormat::BlockNoAlpha
        } else if self.punch_through {
            PixelFormat::BlockPunchThrough
        } else {
            PixelFormat::BlockFullAlpha
        }
    }
}

/// Population standard deviation of `data[range]`
fn standard_deviation(data: &[u32]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let count = data.len() as f64;
    let mean = data.iter().map(|&v| f64::from(v)).sum::<f64>() / count;
    let variance = data
        .iter()
        .map(|&v| {
            let diff = f64::from(v) - mean;
            diff * diff
        })
        .sum::<f64>()
        / count;
    variance.sqrt()
}

/// Build channel histograms and classify the image
///
/// The color of every fully transparent texel is cleared to zero.
pub fn classify(rgba: &mut [u8], masky_threshold: f64) -> PixelStats {
    let mut red = [0u32; 256];
    let mut green = [0u32; 256];
    let mut blue = [0u32; 256];
    let mut alpha = [0u32; 256];

    for px in rgba.chunks_exact_mut(4) {
        if px[3] == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
        }
        red[usize::from(px[0])] += 1;
        green[usize::from(px[1])] += 1;
        blue[usize::from(px[2])] += 1;
        alpha[usize::from(px[3])] += 1;
    }

    let count = (rgba.len() / 4) as u32;
    let is_opaque = alpha[255] == count;
    let punch_through = alpha[0] + alpha[255] == count;
    let has_alpha = alpha[255] != count && alpha[0] != count;
    let masky_alpha = if has_alpha && !punch_through {
        standard_deviation(&alpha[1..255]) < masky_threshold
    } else {
        punch_through
    };

    PixelStats {
        has_r: red[0] != count,
        has_g: green[0] != count,
        has_b: blue[0] != count,
        has_alpha,
        is_opaque,
        punch_through,
        masky_alpha,
        grayscale: red == green && green == blue,
    }
}

// ============================================================================
// Block padding
// ============================================================================

/// Round axes of at least four texels up to a multiple of four
///
/// New texels replicate the last column and row. Returns the padded image,
/// its extent and the number of texels added per axis.
pub fn block_pad(rgba: &[u8], extent: Extent) -> Result<(Vec<u8>, Extent, Vec2I)> {
    let round = |size: u32| -> u32 {
        if size >= 4 && size % 4 != 0 {
            (size + 3) & !3
        } else {
            size
        }
    };
    let padded = Extent::new(round(extent.width), round(extent.height));
    let added = Vec2I::new(
        (padded.width - extent.width) as i32,
        (padded.height - extent.height) as i32,
    );

    let (w, h) = (extent.width as usize, extent.height as usize);
    let pw = padded.width as usize;
    let mut out = try_alloc(padded.area() as usize * 4, 0u8)?;
    for y in 0..padded.height as usize {
        let sy = y.min(h - 1);
        for x in 0..pw {
            let sx = x.min(w - 1);
            let src = (sy * w + sx) * 4;
            let dst = (y * pw + x) * 4;
            out[dst..dst + 4].copy_from_slice(&rgba[src..src + 4]);
        }
    }
    Ok((out, padded, added))
}

// ============================================================================
// Color endpoints
// ============================================================================

fn to_565(rgb: [u8; 3]) -> u16 {
    let r = (u16::from(rgb[0]) * 31 + 127) / 255;
    let g = (u16::from(rgb[1]) * 63 + 127) / 255;
    let b = (u16::from(rgb[2]) * 31 + 127) / 255;
    (r << 11) | (g << 5) | b
}

fn from_565(c: u16) -> [u8; 3] {
    let r = ((c >> 11) & 0x1f) as u8;
    let g = ((c >> 5) & 0x3f) as u8;
    let b = (c & 0x1f) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

fn mix(a: [u8; 3], b: [u8; 3], wa: u16, wb: u16) -> [u8; 3] {
    let total = wa + wb;
    let ch = |i: usize| ((u16::from(a[i]) * wa + u16::from(b[i]) * wb + total / 2) / total) as u8;
    [ch(0), ch(1), ch(2)]
}

/// Decoded palette; `None` entries are transparent
fn color_palette(c0: u16, c1: u16, four_color: bool) -> [Option<[u8; 3]>; 4] {
    let (p0, p1) = (from_565(c0), from_565(c1));
    if four_color {
        [Some(p0), Some(p1), Some(mix(p0, p1, 2, 1)), Some(mix(p0, p1, 1, 2))]
    } else {
        [Some(p0), Some(p1), Some(mix(p0, p1, 1, 1)), None]
    }
}

fn rgb_distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    (0..3)
        .map(|i| {
            let d = i32::from(a[i]) - i32::from(b[i]);
            (d * d) as u32
        })
        .sum()
}

/// Bounding-box endpoints of a set of colors
fn bounding_endpoints(colors: &[[u8; 3]]) -> (u16, u16) {
    let mut lo = [255u8; 3];
    let mut hi = [0u8; 3];
    for c in colors {
        for i in 0..3 {
            lo[i] = lo[i].min(c[i]);
            hi[i] = hi[i].max(c[i]);
        }
    }
    (to_565(hi), to_565(lo))
}

/// Encode one color block; texels marked `None` are transparent
fn encode_color_block(texels: &[Option<[u8; 3]>; 16], force_four_color: bool, out: &mut [u8]) {
    let visible: Vec<[u8; 3]> = texels.iter().flatten().copied().collect();
    let transparent = visible.len() < texels.len();

    let (mut c0, mut c1) = if visible.is_empty() {
        (0, 0)
    } else {
        bounding_endpoints(&visible)
    };

    let four_color = force_four_color || !transparent;
    if four_color {
        if c0 < c1 {
            std::mem::swap(&mut c0, &mut c1);
        }
    } else if c0 > c1 {
        std::mem::swap(&mut c0, &mut c1);
    }

    // 3-color ordering of equal endpoints is fine for opaque blocks: index 0 is exact
    let palette = color_palette(c0, c1, four_color && c0 > c1);
    let mut indices = 0u32;
    for (i, texel) in texels.iter().enumerate() {
        let index = match texel {
            None if transparent && !force_four_color => 3,
            None => 0,
            Some(rgb) => palette
                .iter()
                .enumerate()
                .filter_map(|(idx, p)| p.map(|p| (idx, rgb_distance(*rgb, p))))
                .min_by_key(|&(_, d)| d)
                .map(|(idx, _)| idx as u32)
                .unwrap_or(0),
        };
        indices |= index << (2 * i);
    }

    out[0..2].copy_from_slice(&c0.to_le_bytes());
    out[2..4].copy_from_slice(&c1.to_le_bytes());
    out[4..8].copy_from_slice(&indices.to_le_bytes());
}

fn decode_color_block(block: &[u8], always_four_color: bool, out: &mut [[u8; 4]; 16]) {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let indices = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    let palette = color_palette(c0, c1, always_four_color || c0 > c1);
    for (i, texel) in out.iter_mut().enumerate() {
        let index = ((indices >> (2 * i)) & 0x3) as usize;
        *texel = match palette[index] {
            Some([r, g, b]) => [r, g, b, 255],
            None => [0, 0, 0, 0],
        };
    }
}

// ============================================================================
// Alpha endpoints
// ============================================================================

fn alpha_palette(a0: u8, a1: u8) -> [u8; 8] {
    let lerp = |w0: u16, w1: u16, total: u16| -> u8 {
        ((u16::from(a0) * w0 + u16::from(a1) * w1 + total / 2) / total) as u8
    };
    if a0 > a1 {
        [
            a0,
            a1,
            lerp(6, 1, 7),
            lerp(5, 2, 7),
            lerp(4, 3, 7),
            lerp(3, 4, 7),
            lerp(2, 5, 7),
            lerp(1, 6, 7),
        ]
    } else {
        [
            a0,
            a1,
            lerp(4, 1, 5),
            lerp(3, 2, 5),
            lerp(2, 3, 5),
            lerp(1, 4, 5),
            0,
            255,
        ]
    }
}

/// Encode one alpha block
///
/// Hard alpha keeps 0 and 255 exact by fitting the endpoints to the
/// intermediate values only.
fn encode_alpha_block(alphas: &[u8; 16], hard: bool, out: &mut [u8]) {
    let (a0, a1) = if hard {
        let interior = alphas.iter().copied().filter(|&a| a != 0 && a != 255);
        let lo = interior.clone().min().unwrap_or(0);
        let hi = interior.max().unwrap_or(0);
        (lo, hi)
    } else {
        let lo = alphas.iter().copied().min().unwrap_or(0);
        let hi = alphas.iter().copied().max().unwrap_or(0);
        (hi, lo)
    };

    let palette = alpha_palette(a0, a1);
    let mut bits = 0u64;
    for (i, &a) in alphas.iter().enumerate() {
        let index = palette
            .iter()
            .enumerate()
            .min_by_key(|&(_, &p)| (i16::from(p) - i16::from(a)).unsigned_abs())
            .map(|(idx, _)| idx as u64)
            .unwrap_or(0);
        bits |= index << (3 * i);
    }

    out[0] = a0;
    out[1] = a1;
    out[2..8].copy_from_slice(&bits.to_le_bytes()[..6]);
}

fn decode_alpha_block(block: &[u8], out: &mut [[u8; 4]; 16]) {
    let palette = alpha_palette(block[0], block[1]);
    let mut raw = [0u8; 8];
    raw[..6].copy_from_slice(&block[2..8]);
    let bits = u64::from_le_bytes(raw);
    for (i, texel) in out.iter_mut().enumerate() {
        texel[3] = palette[((bits >> (3 * i)) & 0x7) as usize];
    }
}

// ============================================================================
// Image level
// ============================================================================

fn block_size(format: PixelFormat) -> usize {
    match format {
        PixelFormat::BlockFullAlpha => 16,
        _ => 8,
    }
}

fn require_blocks(extent: Extent, format: PixelFormat) -> Result<()> {
    if !format.is_compressed() {
        return Err(ResampleError::NotBlockFormat { format });
    }
    if !is_block_multiple(extent) || extent.is_empty() {
        return Err(ResampleError::NotBlockMultiple { extent });
    }
    Ok(())
}

/// Block-compress an RGBA8 image whose dimensions are multiples of four
pub fn compress(rgba: &[u8], extent: Extent, format: PixelFormat, masky_alpha: bool) -> Result<Vec<u8>> {
    require_blocks(extent, format)?;
    if rgba.len() != extent.area() as usize * 4 {
        return Err(ResampleError::BufferSizeMismatch {
            expected: extent.area() as usize * 4,
            actual: rgba.len(),
        });
    }

    let width = extent.width as usize;
    let (bw, bh) = (width / 4, extent.height as usize / 4);
    let stride = block_size(format);
    let mut out = try_alloc(bw * bh * stride, 0u8)?;

    for by in 0..bh {
        for bx in 0..bw {
            let mut colors = [None; 16];
            let mut alphas = [0u8; 16];
            for ty in 0..4 {
                for tx in 0..4 {
                    let src = ((by * 4 + ty) * width + bx * 4 + tx) * 4;
                    let px = &rgba[src..src + 4];
                    let i = ty * 4 + tx;
                    alphas[i] = px[3];
                    let transparent = format == PixelFormat::BlockPunchThrough && px[3] < 128;
                    colors[i] = (!transparent).then_some([px[0], px[1], px[2]]);
                }
            }

            let block = &mut out[(by * bw + bx) * stride..(by * bw + bx + 1) * stride];
            match format {
                PixelFormat::BlockFullAlpha => {
                    encode_alpha_block(&alphas, masky_alpha, &mut block[..8]);
                    encode_color_block(&colors, true, &mut block[8..]);
                }
                PixelFormat::BlockPunchThrough => encode_color_block(&colors, false, block),
                _ => encode_color_block(&colors, true, block),
            }
        }
    }
    Ok(out)
}

/// Expand block-compressed data back to RGBA8
pub fn decompress(data: &[u8], extent: Extent, format: PixelFormat) -> Result<Vec<u8>> {
    require_blocks(extent, format)?;
    let expected = format.byte_size(extent).unwrap_or(0);
    if data.len() != expected {
        return Err(ResampleError::BufferSizeMismatch {
            expected,
            actual: data.len(),
        });
    }

    let width = extent.width as usize;
    let (bw, bh) = (width / 4, extent.height as usize / 4);
    let stride = block_size(format);
    let mut out = try_alloc(extent.area() as usize * 4, 0u8)?;

    for by in 0..bh {
        for bx in 0..bw {
            let block = &data[(by * bw + bx) * stride..(by * bw + bx + 1) * stride];
            let mut texels = [[0u8; 4]; 16];
            match format {
                PixelFormat::BlockFullAlpha => {
                    decode_color_block(&block[8..], true, &mut texels);
                    decode_alpha_block(&block[..8], &mut texels);
                }
                PixelFormat::BlockPunchThrough => decode_color_block(block, false, &mut texels),
                _ => decode_color_block(block, true, &mut texels),
            }
            for (i, texel) in texels.iter().enumerate() {
                let dst = ((by * 4 + i / 4) * width + bx * 4 + i % 4) * 4;
                out[dst..dst + 4].copy_from_slice(texel);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(extent: Extent, rgba: [u8; 4]) -> Vec<u8> {
        rgba.iter().copied().cycle().take(extent.area() as usize * 4).collect()
    }

    fn gradient(extent: Extent, alpha: impl Fn(usize, usize) -> u8) -> Vec<u8> {
        let mut out = Vec::new();
        for y in 0..extent.height as usize {
            for x in 0..extent.width as usize {
                out.extend_from_slice(&[(x * 16) as u8, (y * 16) as u8, 128, alpha(x, y)]);
            }
        }
        out
    }

    #[test]
    fn test_classify_opaque() {
        let mut img = solid(Extent::new(4, 4), [10, 20, 30, 255]);
        let stats = classify(&mut img, 200.0);
        assert!(stats.is_opaque);
        assert!(!stats.has_alpha);
        assert!(stats.has_r && stats.has_g && stats.has_b);
        assert!(!stats.grayscale);
        assert_eq!(stats.block_format(), PixelFormat::BlockNoAlpha);
    }

    #[test]
    fn test_classify_fully_transparent() {
        let mut img = solid(Extent::new(8, 8), [200, 100, 50, 0]);
        let stats = classify(&mut img, 200.0);
        assert!(stats.punch_through);
        assert!(!stats.has_alpha);
        assert!(!stats.is_opaque);
        // colors of transparent texels are cleared
        assert!(img.iter().all(|&b| b == 0));
        assert!(!stats.has_r);
        assert!(stats.grayscale);
        assert_eq!(stats.block_format(), PixelFormat::BlockPunchThrough);
    }

    #[test]
    fn test_classify_soft_alpha() {
        let mut img = gradient(Extent::new(16, 16), |x, y| ((x + y * 16) % 256) as u8);
        let stats = classify(&mut img, 0.5);
        assert!(stats.has_alpha);
        assert!(!stats.punch_through);
        // one texel per alpha value: zero deviation counts as masky
        assert!(stats.masky_alpha);
        assert_eq!(stats.block_format(), PixelFormat::BlockFullAlpha);
    }

    #[test]
    fn test_classify_uneven_alpha_is_not_masky() {
        let mut img = gradient(Extent::new(16, 16), |x, _| if x < 8 { 128 } else { 255 });
        let stats = classify(&mut img, 1.0);
        assert!(stats.has_alpha);
        assert!(!stats.masky_alpha);
    }

    #[test]
    fn test_classify_grayscale() {
        let mut img = solid(Extent::new(4, 4), [77, 77, 77, 255]);
        assert!(classify(&mut img, 200.0).grayscale);
    }

    #[test]
    fn test_block_pad() {
        let img = gradient(Extent::new(6, 5), |_, _| 255);
        let (out, extent, added) = block_pad(&img, Extent::new(6, 5)).unwrap();
        assert_eq!(extent, Extent::new(8, 8));
        assert_eq!(added, Vec2I::new(2, 3));
        assert_eq!(out.len(), 8 * 8 * 4);
        // replicated from (5, 4)
        let last = &img[(4 * 6 + 5) * 4..(4 * 6 + 6) * 4];
        assert_eq!(&out[(7 * 8 + 7) * 4..], last);

        let (_, small, added) = block_pad(&solid(Extent::new(2, 6), [1, 2, 3, 4]), Extent::new(2, 6)).unwrap();
        assert_eq!(small, Extent::new(2, 8));
        assert_eq!(added, Vec2I::new(0, 2));
    }

    #[test]
    fn test_opaque_roundtrip() {
        let extent = Extent::new(16, 16);
        let img = solid(extent, [200, 100, 40, 255]);
        let data = compress(&img, extent, PixelFormat::BlockNoAlpha, false).unwrap();
        assert_eq!(data.len(), 128);
        assert_eq!(Some(data.len()), PixelFormat::BlockNoAlpha.byte_size(extent));
        let back = decompress(&data, extent, PixelFormat::BlockNoAlpha).unwrap();
        for (a, b) in back.iter().zip(&img) {
            assert!((i16::from(*a) - i16::from(*b)).abs() <= 8);
        }
    }

    #[test]
    fn test_two_color_block_keeps_both() {
        let extent = Extent::new(4, 4);
        let mut img = Vec::new();
        for i in 0..16 {
            img.extend_from_slice(if i % 2 == 0 { &[255, 255, 255, 255] } else { &[0, 0, 0, 255] });
        }
        let data = compress(&img, extent, PixelFormat::BlockNoAlpha, false).unwrap();
        let back = decompress(&data, extent, PixelFormat::BlockNoAlpha).unwrap();
        assert_eq!(&back[0..4], &[255, 255, 255, 255]);
        assert_eq!(&back[4..8], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_punch_through_roundtrip() {
        let extent = Extent::new(8, 4);
        let img = gradient(extent, |x, _| if x % 3 == 0 { 0 } else { 255 });
        let data = compress(&img, extent, PixelFormat::BlockPunchThrough, true).unwrap();
        assert_eq!(data.len(), 16);
        let back = decompress(&data, extent, PixelFormat::BlockPunchThrough).unwrap();
        for (a, b) in back.chunks(4).zip(img.chunks(4)) {
            assert_eq!(a[3], b[3]);
        }
    }

    #[test]
    fn test_fully_transparent_punch_through() {
        let extent = Extent::new(4, 4);
        let data = compress(&solid(extent, [0, 0, 0, 0]), extent, PixelFormat::BlockPunchThrough, true).unwrap();
        let back = decompress(&data, extent, PixelFormat::BlockPunchThrough).unwrap();
        assert!(back.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_full_alpha_hard_edges_exact() {
        let extent = Extent::new(4, 4);
        let alphas = [0u8, 255, 100, 140, 0, 255, 120, 0, 255, 255, 0, 110, 130, 0, 255, 0];
        let mut img = Vec::new();
        for a in alphas {
            img.extend_from_slice(&[50, 60, 70, a]);
        }
        let data = compress(&img, extent, PixelFormat::BlockFullAlpha, true).unwrap();
        assert_eq!(data.len(), 16);
        let back = decompress(&data, extent, PixelFormat::BlockFullAlpha).unwrap();
        for (texel, &a) in back.chunks(4).zip(alphas.iter()) {
            if a == 0 || a == 255 {
                assert_eq!(texel[3], a);
            } else {
                assert!((i16::from(texel[3]) - i16::from(a)).abs() <= 8);
            }
        }
    }

    #[test]
    fn test_full_alpha_soft() {
        let extent = Extent::new(4, 4);
        let img = gradient(extent, |x, y| (x * 40 + y * 20) as u8);
        let data = compress(&img, extent, PixelFormat::BlockFullAlpha, false).unwrap();
        let back = decompress(&data, extent, PixelFormat::BlockFullAlpha).unwrap();
        for (a, b) in back.chunks(4).zip(img.chunks(4)) {
            assert!((i16::from(a[3]) - i16::from(b[3])).abs() <= 13);
        }
    }

    #[test]
    fn test_rejects_non_multiple() {
        let extent = Extent::new(6, 4);
        let img = solid(extent, [0, 0, 0, 255]);
        assert!(compress(&img, extent, PixelFormat::BlockNoAlpha, false).is_err());
        assert!(PixelFormat::BlockNoAlpha.byte_size(extent).is_none());
        assert_eq!(PixelFormat::Rgba8.byte_size(extent), Some(96));
    }

    #[test]
    fn test_format_tags() {
        for f in [
            PixelFormat::Rgba8,
            PixelFormat::BlockNoAlpha,
            PixelFormat::BlockPunchThrough,
            PixelFormat::BlockFullAlpha,
        ] {
            assert_eq!(PixelFormat::from_u8(f as u8), Some(f));
        }
        assert_eq!(PixelFormat::from_u8(9), None);
    }
}
