//! Edge-directed pixel-art upscaler in the xBRZ family.
//!
//! Every source texel is first filled into its `scale x scale` output block.
//! The four corners of each texel are then classified from 4x4
//! neighbourhoods, and blended corners are refined by one of five patterns
//! (corner, diagonal, shallow, steep, steep-and-shallow) taken from the
//! per-scale weight tables.

use super::blend::{self, BlendTable, OutputMatrix};
use super::color::{Color16, ColorDist};
use super::kernel::{BlendInfo, BlendResult, BlendType, Kernel3x3, Kernel4x4, RotatedKernel, Rotation};
use super::{check_buffer, try_alloc, ResampleError, Result};
use crate::geometry::{Extent, Vec2B};

/// Tunables of the scaler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalerConfig {
    pub luminance_weight: f64,
    pub equal_color_tolerance: f64,
    pub center_direction_bias: f64,
    pub dominant_direction_threshold: f64,
    pub steep_direction_threshold: f64,
    /// Input texels carry premultiplied alpha
    pub premultiplied: bool,
}

impl ScalerConfig {
    pub fn new() -> Self {
        Self {
            luminance_weight: 1.0,
            equal_color_tolerance: 30.0,
            center_direction_bias: 4.0,
            dominant_direction_threshold: 3.6,
            steep_direction_threshold: 2.2,
            premultiplied: true,
        }
    }
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Out-of-range sampling: modulo on wrapped axes, clamp otherwise
struct Sampler<'a> {
    pixels: &'a [Color16],
    width: isize,
    height: isize,
    wrapped: Vec2B,
}

impl<'a> Sampler<'a> {
    #[inline]
    fn at(&self, x: isize, y: isize) -> Color16 {
        let x = if self.wrapped.x {
            x.rem_euclid(self.width)
        } else {
            x.clamp(0, self.width - 1)
        };
        let y = if self.wrapped.y {
            y.rem_euclid(self.height)
        } else {
            y.clamp(0, self.height - 1)
        };
        self.pixels[(y * self.width + x) as usize]
    }

    /// 4x4 kernel whose F texel sits at (x, y)
    fn kernel(&self, x: isize, y: isize) -> Kernel4x4 {
        Kernel4x4 {
            a: self.at(x - 1, y - 1),
            b: self.at(x, y - 1),
            c: self.at(x + 1, y - 1),
            d: self.at(x + 2, y - 1),
            e: self.at(x - 1, y),
            f: self.at(x, y),
            g: self.at(x + 1, y),
            h: self.at(x + 2, y),
            i: self.at(x - 1, y + 1),
            j: self.at(x, y + 1),
            k: self.at(x + 1, y + 1),
            l: self.at(x + 2, y + 1),
            m: self.at(x - 1, y + 2),
            n: self.at(x, y + 2),
            o: self.at(x + 1, y + 2),
            p: self.at(x + 2, y + 2),
        }
    }
}

/// The scaler state for one pass
struct Pass<'a> {
    config: &'a ScalerConfig,
    dist: ColorDist,
    table: &'static BlendTable,
}

impl<'a> Pass<'a> {
    #[inline]
    fn dist(&self, a: Color16, b: Color16) -> f64 {
        self.dist.dist(a, b)
    }

    #[inline]
    fn eq(&self, a: Color16, b: Color16) -> bool {
        self.dist.eq(a, b, self.config.equal_color_tolerance)
    }

    /// Classify the corner shared by F, G, J and K
    fn preprocess_corners(&self, ker: &Kernel4x4) -> BlendResult {
        let mut result = BlendResult::default();

        if (ker.f == ker.g && ker.j == ker.k) || (ker.f == ker.j && ker.g == ker.k) {
            return result;
        }

        let bias = self.config.center_direction_bias;
        let jg = self.dist(ker.i, ker.f)
            + self.dist(ker.f, ker.c)
            + self.dist(ker.n, ker.k)
            + self.dist(ker.k, ker.h)
            + bias * self.dist(ker.j, ker.g);
        let fk = self.dist(ker.e, ker.j)
            + self.dist(ker.j, ker.o)
            + self.dist(ker.b, ker.g)
            + self.dist(ker.g, ker.l)
            + bias * self.dist(ker.f, ker.k);

        let threshold = self.config.dominant_direction_threshold;
        if jg < fk {
            let strength = if threshold * jg < fk {
                BlendType::Dominant
            } else {
                BlendType::Normal
            };
            if ker.f != ker.g && ker.f != ker.j {
                result.f = strength;
            }
            if ker.k != ker.j && ker.k != ker.g {
                result.k = strength;
            }
        } else if fk < jg {
            let strength = if threshold * fk < jg {
                BlendType::Dominant
            } else {
                BlendType::Normal
            };
            if ker.j != ker.f && ker.j != ker.k {
                result.j = strength;
            }
            if ker.g != ker.f && ker.g != ker.k {
                result.g = strength;
            }
        }
        result
    }

    /// Refine the bottom-right corner of the block under `rotation`
    fn scale_pixel(
        &self,
        rotation: Rotation,
        ker: &Kernel3x3,
        info: BlendInfo,
        out: &mut OutputMatrix<'_>,
    ) {
        let info = info.rotate(rotation);
        if info.bottom_right() == BlendType::None {
            return;
        }

        let k = RotatedKernel::new(ker, rotation);
        let (b, c, d, e, f, g, h, i) = (k.b(), k.c(), k.d(), k.e(), k.f(), k.g(), k.h(), k.i());

        let do_line_blend = if info.bottom_right() >= BlendType::Dominant {
            true
        } else if info.top_right() != BlendType::None && !self.eq(e, g) {
            false
        } else if info.bottom_left() != BlendType::None && !self.eq(e, c) {
            false
        } else {
            // an L-shaped run of one color with e as the only outlier
            !(!self.eq(e, i)
                && self.eq(g, h)
                && self.eq(h, i)
                && self.eq(i, f)
                && self.eq(f, c))
        };

        let px = if self.dist(e, f) <= self.dist(e, h) { f } else { h };

        if !do_line_blend {
            out.apply(self.table.corner, px, false);
            return;
        }

        let fg = self.dist(f, g);
        let hc = self.dist(h, c);
        let steep_threshold = self.config.steep_direction_threshold;
        let shallow = steep_threshold * fg <= hc && e != g && d != g;
        let steep = steep_threshold * hc <= fg && e != c && b != c;

        match (shallow, steep) {
            (true, true) => out.apply(self.table.steep_and_shallow, px, false),
            (true, false) => out.apply(self.table.shallow, px, false),
            (false, true) => out.apply(self.table.shallow, px, true),
            (false, false) => out.apply(self.table.diagonal, px, false),
        }
    }
}

/// Upscale `source` by an integer factor in `2..=6`
///
/// Out-of-range neighbours are taken modulo the extent on wrapped axes and
/// clamped to the edge otherwise. The output is row-major with extent
/// `extent * scale`. The result is a pure function of its inputs.
pub fn scale(
    factor: u32,
    source: &[Color16],
    extent: Extent,
    wrapped: Vec2B,
    config: &ScalerConfig,
) -> Result<Vec<Color16>> {
    let table = blend::table_for(factor as usize).ok_or(ResampleError::InvalidScale { scale: factor })?;
    if extent.is_empty() {
        return Err(ResampleError::EmptyRegion {
            region: crate::geometry::Bounds::full(extent),
        });
    }
    check_buffer(source.len(), extent)?;

    let scale = factor as usize;
    let width = extent.width as usize;
    let height = extent.height as usize;
    let out_width = width * scale;
    let mut out = try_alloc(out_width * height * scale, Color16::TRANSPARENT)?;

    let sampler = Sampler {
        pixels: source,
        width: width as isize,
        height: height as isize,
        wrapped,
    };
    let pass = Pass {
        config,
        dist: ColorDist::new(config.luminance_weight, true),
        table,
    };

    // blend info of the current row, carried over from the row above
    let mut pre = try_alloc(width, BlendInfo::default())?;

    for x in 0..width {
        let result = pass.preprocess_corners(&sampler.kernel(x as isize, -1));
        pre[x].set_top_right(result.j);
        if x + 1 < width {
            pre[x + 1].set_top_left(result.k);
        } else if wrapped.x {
            pre[0].set_top_left(result.k);
        }
    }

    for y in 0..height {
        let row_base = y * scale * out_width;
        let mut next_row = BlendInfo::default();

        if wrapped.x {
            let result = pass.preprocess_corners(&sampler.kernel(-1, y as isize));
            next_row.set_top_left(result.k);
            pre[0].set_bottom_left(result.g);
        }

        for x in 0..width {
            let ker = sampler.kernel(x as isize, y as isize);
            let mut info = pre[x];

            let result = pass.preprocess_corners(&ker);
            info.set_bottom_right(result.f);
            next_row.set_top_right(result.j);
            pre[x] = next_row;

            next_row = BlendInfo::default();
            next_row.set_top_left(result.k);
            if x + 1 < width {
                pre[x + 1].set_bottom_left(result.g);
            }

            let base = row_base + x * scale;
            for row in 0..scale {
                let start = base + row * out_width;
                out[start..start + scale].fill(ker.f);
            }

            if info.is_blending() {
                let ker3 = ker.center_3x3();
                for rotation in Rotation::ALL {
                    let mut matrix =
                        OutputMatrix::new(&mut out, base, out_width, scale, rotation, config.premultiplied);
                    pass.scale_pixel(rotation, &ker3, info, &mut matrix);
                }
            }
        }
    }

    Ok(out)
}
