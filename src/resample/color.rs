//! 16-bit-per-channel colors, the perceptual distance metric and the
//! alpha premultiplication passes.

// ============================================================================
// Color16
// ============================================================================

/// RGBA color with 16 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct Color16 {
    pub r: u16,
    pub g: u16,
    pub b: u16,
    pub a: u16,
}

impl Color16 {
    pub const MAX: u16 = u16::MAX;
    pub const TRANSPARENT: Color16 = Color16::new(0, 0, 0, 0);

    pub const fn new(r: u16, g: u16, b: u16, a: u16) -> Self {
        Self { r, g, b, a }
    }

    /// Widen an 8-bit RGBA texel (exact: 0xAB becomes 0xABAB)
    pub const fn from_rgba8(rgba: [u8; 4]) -> Self {
        Self {
            r: rgba[0] as u16 * 257,
            g: rgba[1] as u16 * 257,
            b: rgba[2] as u16 * 257,
            a: rgba[3] as u16 * 257,
        }
    }

    /// Narrow to 8-bit RGBA with rounding
    pub fn to_rgba8(self) -> [u8; 4] {
        [
            narrow(self.r),
            narrow(self.g),
            narrow(self.b),
            narrow(self.a),
        ]
    }

    pub fn is_opaque(&self) -> bool {
        self.a == Self::MAX
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }
}

fn narrow(value: u16) -> u8 {
    ((u32::from(value) * 255 + 32767) / 65535) as u8
}

/// Convert an RGBA8 byte buffer into 16-bit texels
pub fn decode_rgba8(bytes: &[u8]) -> Vec<Color16> {
    bytes
        .chunks_exact(4)
        .map(|px| Color16::from_rgba8([px[0], px[1], px[2], px[3]]))
        .collect()
}

/// Convert 16-bit texels back into an RGBA8 byte buffer
pub fn encode_rgba8(pixels: &[Color16]) -> Vec<u8> {
    pixels.iter().flat_map(|c| c.to_rgba8()).collect()
}

// ============================================================================
// Blending
// ============================================================================

/// Blend `front` over `back` with weight `m / n`
///
/// Premultiplied texels are interpolated linearly. Straight-alpha texels
/// weight each color by its alpha so transparent texels contribute no hue.
pub fn blend(back: Color16, front: Color16, m: u32, n: u32, premultiplied: bool) -> Color16 {
    debug_assert!(m <= n && n > 0);
    if premultiplied {
        let mix = |b: u16, f: u16| -> u16 {
            ((u32::from(b) * (n - m) + u32::from(f) * m + n / 2) / n) as u16
        };
        return Color16::new(
            mix(back.r, front.r),
            mix(back.g, front.g),
            mix(back.b, front.b),
            mix(back.a, front.a),
        );
    }

    let weight_front = u64::from(front.a) * u64::from(m);
    let weight_back = u64::from(back.a) * u64::from(n - m);
    let weight_sum = weight_front + weight_back;
    if weight_sum == 0 {
        return Color16::TRANSPARENT;
    }
    let mix = |b: u16, f: u16| -> u16 {
        ((u64::from(f) * weight_front + u64::from(b) * weight_back + weight_sum / 2) / weight_sum)
            as u16
    };
    Color16::new(
        mix(back.r, front.r),
        mix(back.g, front.g),
        mix(back.b, front.b),
        (weight_sum / u64::from(n)) as u16,
    )
}

// ============================================================================
// Color distance
// ============================================================================

// BT.709 luma coefficients
const K_B: f64 = 0.0722;
const K_R: f64 = 0.2126;
const K_G: f64 = 1.0 - K_B - K_R;
const SCALE_B: f64 = 0.5 / (1.0 - K_B);
const SCALE_R: f64 = 0.5 / (1.0 - K_R);

/// Distance values are expressed on an 8-bit channel scale
const CHANNEL_SCALE: f64 = 257.0;

/// Perceptual color distance in YCbCr space
///
/// The same instance drives both the corner classification and the
/// per-pixel blending decisions of a single scale pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorDist {
    luminance_weight: f64,
    with_alpha: bool,
}

impl ColorDist {
    pub fn new(luminance_weight: f64, with_alpha: bool) -> Self {
        Self {
            luminance_weight,
            with_alpha,
        }
    }

    /// Distance between the color components only
    pub fn dist_ycbcr(&self, a: Color16, b: Color16) -> f64 {
        let r_diff = (f64::from(a.r) - f64::from(b.r)) / CHANNEL_SCALE;
        let g_diff = (f64::from(a.g) - f64::from(b.g)) / CHANNEL_SCALE;
        let b_diff = (f64::from(a.b) - f64::from(b.b)) / CHANNEL_SCALE;

        let y = K_R * r_diff + K_G * g_diff + K_B * b_diff;
        let c_b = SCALE_B * (b_diff - y);
        let c_r = SCALE_R * (r_diff - y);

        let luma = self.luminance_weight * y;
        (luma * luma + c_b * c_b + c_r * c_r).sqrt()
    }

    /// Full distance, including the alpha difference when enabled
    ///
    /// Two fully transparent texels are always at distance zero.
    pub fn dist(&self, a: Color16, b: Color16) -> f64 {
        if !self.with_alpha {
            return self.dist_ycbcr(a, b);
        }
        let a1 = f64::from(a.a) / f64::from(Color16::MAX);
        let a2 = f64::from(b.a) / f64::from(Color16::MAX);
        let d = self.dist_ycbcr(a, b);
        if a1 < a2 {
            a1 * d + 255.0 * (a2 - a1)
        } else {
            a2 * d + 255.0 * (a1 - a2)
        }
    }

    /// Colors closer than `tolerance` compare equal
    pub fn eq(&self, a: Color16, b: Color16, tolerance: f64) -> bool {
        self.dist(a, b) < tolerance
    }
}

// ============================================================================
// Premultiplication
// ============================================================================

/// Multiply the color channels of every texel by its alpha
pub fn premultiply(pixels: &mut [Color16]) {
    for px in pixels.iter_mut() {
        if px.a == Color16::MAX {
            continue;
        }
        let a = u32::from(px.a);
        let mul = |c: u16| -> u16 { ((u32::from(c) * a + 32767) / 65535) as u16 };
        px.r = mul(px.r);
        px.g = mul(px.g);
        px.b = mul(px.b);
    }
}

/// Reverse [`premultiply`]
///
/// Texels that are fully transparent, fully opaque or whose alpha is below
/// `low_pass` are left untouched. Channels are clamped to the maximum.
pub fn unpremultiply(pixels: &mut [Color16], low_pass: u16) {
    for px in pixels.iter_mut() {
        if px.a == 0 || px.a == Color16::MAX || px.a < low_pass {
            continue;
        }
        let a = u32::from(px.a);
        let div = |c: u16| -> u16 {
            ((u32::from(c) * 65535 + a / 2) / a).min(u32::from(Color16::MAX)) as u16
        };
        px.r = div(px.r);
        px.g = div(px.g);
        px.b = div(px.b);
    }
}
