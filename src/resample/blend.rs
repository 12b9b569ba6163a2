//! Output block writer and the fixed per-scale blend weights.
//!
//! Each scale factor owns a table of taps. A tap names a cell of the
//! `scale x scale` output block (in the unrotated frame) and the fraction
//! of the blend color mixed into it; a tap whose numerator equals its
//! denominator overwrites the cell.

use super::color::{blend, Color16};
use super::kernel::Rotation;

/// One weighted write into the output block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tap {
    pub row: u8,
    pub col: u8,
    pub num: u8,
    pub den: u8,
}

const fn tap(row: u8, col: u8, num: u8, den: u8) -> Tap {
    Tap { row, col, num, den }
}

const fn set(row: u8, col: u8) -> Tap {
    Tap {
        row,
        col,
        num: 1,
        den: 1,
    }
}

/// Blend patterns of one scale factor
///
/// Steep lines use the shallow taps mirrored along the diagonal.
#[derive(Debug)]
pub struct BlendTable {
    pub scale: usize,
    pub corner: &'static [Tap],
    pub diagonal: &'static [Tap],
    pub shallow: &'static [Tap],
    pub steep_and_shallow: &'static [Tap],
}

static SCALE_2X: BlendTable = BlendTable {
    scale: 2,
    // 1 - pi/4, the area of the corner outside an inscribed quarter circle
    corner: &[tap(1, 1, 21, 100)],
    diagonal: &[tap(1, 1, 1, 2)],
    shallow: &[tap(1, 0, 1, 4), tap(1, 1, 3, 4)],
    steep_and_shallow: &[tap(1, 0, 1, 4), tap(0, 1, 1, 4), tap(1, 1, 5, 6)],
};

static SCALE_3X: BlendTable = BlendTable {
    scale: 3,
    corner: &[tap(2, 2, 45, 100)],
    diagonal: &[tap(1, 2, 1, 8), tap(2, 1, 1, 8), tap(2, 2, 7, 8)],
    shallow: &[tap(2, 0, 1, 4), tap(1, 2, 1, 4), tap(2, 1, 3, 4), set(2, 2)],
    steep_and_shallow: &[
        tap(2, 0, 1, 4),
        tap(0, 2, 1, 4),
        tap(2, 1, 3, 4),
        tap(1, 2, 3, 4),
        set(2, 2),
    ],
};

static SCALE_4X: BlendTable = BlendTable {
    scale: 4,
    corner: &[tap(3, 3, 68, 100), tap(3, 2, 9, 100), tap(2, 3, 9, 100)],
    diagonal: &[tap(3, 2, 1, 2), tap(2, 3, 1, 2), set(3, 3)],
    shallow: &[
        tap(3, 0, 1, 4),
        tap(2, 2, 1, 4),
        tap(3, 1, 3, 4),
        tap(2, 3, 3, 4),
        set(3, 2),
        set(3, 3),
    ],
    steep_and_shallow: &[
        tap(3, 1, 3, 4),
        tap(1, 3, 3, 4),
        tap(3, 0, 1, 4),
        tap(0, 3, 1, 4),
        tap(2, 2, 1, 3),
        set(3, 3),
        set(3, 2),
        set(2, 3),
    ],
};

static SCALE_5X: BlendTable = BlendTable {
    scale: 5,
    corner: &[tap(4, 4, 86, 100), tap(4, 3, 23, 100), tap(3, 4, 23, 100)],
    diagonal: &[
        tap(4, 2, 1, 8),
        tap(3, 3, 1, 8),
        tap(2, 4, 1, 8),
        tap(4, 3, 7, 8),
        tap(3, 4, 7, 8),
        set(4, 4),
    ],
    shallow: &[
        tap(4, 0, 1, 4),
        tap(3, 2, 1, 4),
        tap(2, 4, 1, 4),
        tap(4, 1, 3, 4),
        tap(3, 3, 3, 4),
        set(4, 2),
        set(4, 3),
        set(4, 4),
        set(3, 4),
    ],
    steep_and_shallow: &[
        tap(0, 4, 1, 4),
        tap(2, 3, 1, 4),
        tap(1, 4, 3, 4),
        tap(4, 0, 1, 4),
        tap(3, 2, 1, 4),
        tap(4, 1, 3, 4),
        tap(3, 3, 2, 3),
        set(2, 4),
        set(3, 4),
        set(4, 4),
        set(4, 2),
        set(4, 3),
    ],
};

static SCALE_6X: BlendTable = BlendTable {
    scale: 6,
    corner: &[
        tap(5, 5, 97, 100),
        tap(4, 5, 42, 100),
        tap(5, 4, 42, 100),
        tap(5, 3, 6, 100),
        tap(3, 5, 6, 100),
    ],
    diagonal: &[
        tap(5, 3, 1, 2),
        tap(4, 4, 1, 2),
        tap(3, 5, 1, 2),
        set(4, 5),
        set(5, 5),
        set(5, 4),
    ],
    shallow: &[
        tap(5, 0, 1, 4),
        tap(4, 2, 1, 4),
        tap(3, 4, 1, 4),
        tap(5, 1, 3, 4),
        tap(4, 3, 3, 4),
        tap(3, 5, 3, 4),
        set(5, 2),
        set(5, 3),
        set(5, 4),
        set(5, 5),
        set(4, 4),
        set(4, 5),
    ],
    steep_and_shallow: &[
        tap(0, 5, 1, 4),
        tap(2, 4, 1, 4),
        tap(1, 5, 3, 4),
        tap(3, 4, 3, 4),
        tap(5, 0, 1, 4),
        tap(4, 2, 1, 4),
        tap(5, 1, 3, 4),
        tap(4, 3, 3, 4),
        set(2, 5),
        set(3, 5),
        set(4, 5),
        set(5, 5),
        set(4, 4),
        set(5, 4),
        set(5, 2),
        set(5, 3),
    ],
};

/// Blend table for a scale factor in `2..=6`
pub fn table_for(scale: usize) -> Option<&'static BlendTable> {
    match scale {
        2 => Some(&SCALE_2X),
        3 => Some(&SCALE_3X),
        4 => Some(&SCALE_4X),
        5 => Some(&SCALE_5X),
        6 => Some(&SCALE_6X),
        _ => None,
    }
}

// ============================================================================
// Output matrix
// ============================================================================

/// Rotated `n x n` window into the destination buffer
pub struct OutputMatrix<'a> {
    out: &'a mut [Color16],
    base: usize,
    stride: usize,
    n: usize,
    rotation: Rotation,
    premultiplied: bool,
}

impl<'a> OutputMatrix<'a> {
    pub fn new(
        out: &'a mut [Color16],
        base: usize,
        stride: usize,
        n: usize,
        rotation: Rotation,
        premultiplied: bool,
    ) -> Self {
        Self {
            out,
            base,
            stride,
            n,
            rotation,
            premultiplied,
        }
    }

    /// Destination index of cell (row, col) of the rotated block
    fn index(&self, row: usize, col: usize) -> usize {
        let (mut i, mut j) = (row, col);
        for _ in 0..self.rotation.index() {
            let prev_i = i;
            i = self.n - 1 - j;
            j = prev_i;
        }
        self.base + i * self.stride + j
    }

    pub fn get(&self, row: usize, col: usize) -> Color16 {
        self.out[self.index(row, col)]
    }

    /// Apply a set of taps, optionally mirrored along the diagonal
    pub fn apply(&mut self, taps: &[Tap], color: Color16, transposed: bool) {
        for t in taps {
            let (row, col) = if transposed {
                (usize::from(t.col), usize::from(t.row))
            } else {
                (usize::from(t.row), usize::from(t.col))
            };
            let idx = self.index(row, col);
            self.out[idx] = if t.num == t.den {
                color
            } else {
                blend(
                    self.out[idx],
                    color,
                    u32::from(t.num),
                    u32::from(t.den),
                    self.premultiplied,
                )
            };
        }
    }
}
