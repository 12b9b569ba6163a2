//! Small integer geometry types shared by the resampler and the cache.

use std::fmt;

/// 2D integer vector (x, y)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vec2I {
    pub x: i32,
    pub y: i32,
}

impl Vec2I {
    pub const ZERO: Vec2I = Vec2I { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Vec2I {
        Vec2I::new(self.x + dx, self.y + dy)
    }
}

/// Per-axis boolean flags (x, y)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vec2B {
    pub x: bool,
    pub y: bool,
}

impl Vec2B {
    pub const FALSE: Vec2B = Vec2B { x: false, y: false };
    pub const TRUE: Vec2B = Vec2B { x: true, y: true };

    pub const fn new(x: bool, y: bool) -> Self {
        Self { x, y }
    }

    pub fn any(&self) -> bool {
        self.x || self.y
    }

    pub fn all(&self) -> bool {
        self.x && self.y
    }
}

/// 2D size (width, height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of texels covered
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Multiply both axes, saturating on overflow
    pub fn scaled(&self, factor: u32) -> Extent {
        Extent::new(
            self.width.saturating_mul(factor),
            self.height.saturating_mul(factor),
        )
    }

    /// Clamp each axis independently to `max`
    pub fn clamped(&self, max: u32) -> Extent {
        Extent::new(self.width.min(max), self.height.min(max))
    }

    pub fn fits_within(&self, max: u32) -> bool {
        self.width <= max && self.height <= max
    }

    /// The largest axis
    pub fn max_axis(&self) -> u32 {
        self.width.max(self.height)
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle: a corner plus an extent
///
/// The right and bottom edges are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Bounds {
    pub corner: Vec2I,
    pub extent: Extent,
}

impl Bounds {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            corner: Vec2I::new(x, y),
            extent: Extent::new(width, height),
        }
    }

    /// Bounds covering a whole image of the given extent
    pub const fn full(extent: Extent) -> Self {
        Self {
            corner: Vec2I::ZERO,
            extent,
        }
    }

    pub fn left(&self) -> i64 {
        i64::from(self.corner.x)
    }

    pub fn top(&self) -> i64 {
        i64::from(self.corner.y)
    }

    pub fn right(&self) -> i64 {
        self.left() + i64::from(self.extent.width)
    }

    pub fn bottom(&self) -> i64 {
        self.top() + i64::from(self.extent.height)
    }

    pub fn is_empty(&self) -> bool {
        self.extent.is_empty()
    }

    /// Check whether `other` lies entirely inside these bounds
    pub fn contains(&self, other: &Bounds) -> bool {
        other.left() >= self.left()
            && other.top() >= self.top()
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Check whether the two rectangles share at least one texel
    pub fn intersects(&self, other: &Bounds) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) {}",
            self.corner.x, self.corner.y, self.extent
        )
    }
}
