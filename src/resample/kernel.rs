//! Sampling kernels, blend classifications and the rotation tables used by
//! the edge-directed scaler.

use super::color::Color16;

/// Strength of the blend decided for one corner of a source texel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum BlendType {
    /// No blending
    #[default]
    None = 0,
    /// A blend of normal strength
    Normal = 1,
    /// A strong blend, the edge is clearly oriented
    Dominant = 2,
}

impl BlendType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            1 => BlendType::Normal,
            2 => BlendType::Dominant,
            _ => BlendType::None,
        }
    }
}

/// Clockwise rotation applied to a kernel and its output block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Rotation {
    R0 = 0,
    R90 = 1,
    R180 = 2,
    R270 = 3,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Blend types of the four corners of one texel packed into a byte
///
/// Two bits per corner: top-left, top-right, bottom-right, bottom-left,
/// from the least significant bits upwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendInfo(pub u8);

impl BlendInfo {
    pub fn top_left(self) -> BlendType {
        BlendType::from_bits(self.0)
    }

    pub fn top_right(self) -> BlendType {
        BlendType::from_bits(self.0 >> 2)
    }

    pub fn bottom_right(self) -> BlendType {
        BlendType::from_bits(self.0 >> 4)
    }

    pub fn bottom_left(self) -> BlendType {
        BlendType::from_bits(self.0 >> 6)
    }

    pub fn set_top_left(&mut self, blend: BlendType) {
        self.0 |= blend as u8;
    }

    pub fn set_top_right(&mut self, blend: BlendType) {
        self.0 |= (blend as u8) << 2;
    }

    pub fn set_bottom_right(&mut self, blend: BlendType) {
        self.0 |= (blend as u8) << 4;
    }

    pub fn set_bottom_left(&mut self, blend: BlendType) {
        self.0 |= (blend as u8) << 6;
    }

    pub fn is_blending(self) -> bool {
        self.0 != 0
    }

    /// Rotate the corner assignment clockwise
    pub fn rotate(self, rotation: Rotation) -> BlendInfo {
        let b = self.0;
        BlendInfo(match rotation {
            Rotation::R0 => b,
            Rotation::R90 => b.rotate_left(2),
            Rotation::R180 => b.rotate_left(4),
            Rotation::R270 => b.rotate_left(6),
        })
    }
}

/// Corner classification produced for the 2x2 block F, G, J, K
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendResult {
    pub f: BlendType,
    pub g: BlendType,
    pub j: BlendType,
    pub k: BlendType,
}

/// 4x4 neighbourhood
///
/// ```text
/// A B C D
/// E F G H
/// I J K L
/// M N O P
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Kernel4x4 {
    pub a: Color16,
    pub b: Color16,
    pub c: Color16,
    pub d: Color16,
    pub e: Color16,
    pub f: Color16,
    pub g: Color16,
    pub h: Color16,
    pub i: Color16,
    pub j: Color16,
    pub k: Color16,
    pub l: Color16,
    pub m: Color16,
    pub n: Color16,
    pub o: Color16,
    pub p: Color16,
}

impl Kernel4x4 {
    /// The 3x3 neighbourhood centred on F
    pub fn center_3x3(&self) -> Kernel3x3 {
        Kernel3x3([
            self.a, self.b, self.c, self.e, self.f, self.g, self.i, self.j, self.k,
        ])
    }
}

/// 3x3 neighbourhood stored row-major
///
/// ```text
/// a b c
/// d e f
/// g h i
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Kernel3x3(pub [Color16; 9]);

/// For each rotation, the source index read for each destination position
const ROTATION_TABLE: [[usize; 9]; 4] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8],
    [6, 3, 0, 7, 4, 1, 8, 5, 2],
    [8, 7, 6, 5, 4, 3, 2, 1, 0],
    [2, 5, 8, 1, 4, 7, 0, 3, 6],
];

/// Rotated view into a [`Kernel3x3`]
#[derive(Clone, Copy)]
pub struct RotatedKernel<'a> {
    kernel: &'a Kernel3x3,
    map: &'static [usize; 9],
}

impl<'a> RotatedKernel<'a> {
    pub fn new(kernel: &'a Kernel3x3, rotation: Rotation) -> Self {
        Self {
            kernel,
            map: &ROTATION_TABLE[rotation.index()],
        }
    }

    #[inline]
    fn at(&self, index: usize) -> Color16 {
        self.kernel.0[self.map[index]]
    }

    pub fn b(&self) -> Color16 {
        self.at(1)
    }
    pub fn c(&self) -> Color16 {
        self.at(2)
    }
    pub fn d(&self) -> Color16 {
        self.at(3)
    }
    pub fn e(&self) -> Color16 {
        self.at(4)
    }
    pub fn f(&self) -> Color16 {
        self.at(5)
    }
    pub fn g(&self) -> Color16 {
        self.at(6)
    }
    pub fn h(&self) -> Color16 {
        self.at(7)
    }
    pub fn i(&self) -> Color16 {
        self.at(8)
    }
}
