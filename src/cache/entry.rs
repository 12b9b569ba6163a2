//! Resample results and their persisted binary layout.
//!
//! Layout (little-endian):
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 4 | width (stored, including all padding) |
//! | 4 | 4 | height |
//! | 8 | 1 | format tag |
//! | 9 | 1 | wrapped x |
//! | 10 | 1 | wrapped y |
//! | 11 | 4 | padding x (output texels, each side) |
//! | 15 | 4 | padding y |
//! | 19 | 4 | block padding x (right edge) |
//! | 23 | 4 | block padding y (bottom edge) |
//! | 27 | .. | texel data, length implied by size and format |

use super::CacheError;
use crate::geometry::{Extent, Vec2B, Vec2I};
use crate::resample::compress::{decompress, PixelFormat};
use crate::resample::{try_alloc, Result as ResampleResult};
use std::sync::Arc;

pub const HEADER_LEN: usize = 27;

/// Output of one upscale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleResult {
    pub data: Vec<u8>,
    /// Stored dimensions, padding included
    pub dimensions: Extent,
    pub format: PixelFormat,
    pub wrapped: Vec2B,
    /// Synthetic border on each side, in output texels
    pub padding: Vec2I,
    /// Texels appended on the right and bottom to reach a block multiple
    pub block_padding: Vec2I,
}

/// Shared, immutable cache entry
pub type CacheEntry = Arc<ScaleResult>;

impl ScaleResult {
    /// Extent of the useful image once all padding is trimmed
    pub fn logical_extent(&self) -> Extent {
        let trim = |size: u32, pad: i32, block: i32| -> u32 {
            size.saturating_sub((2 * pad.max(0) + block.max(0)) as u32)
        };
        Extent::new(
            trim(self.dimensions.width, self.padding.x, self.block_padding.x),
            trim(self.dimensions.height, self.padding.y, self.block_padding.y),
        )
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    /// The stored image as RGBA8, decoding block formats
    pub fn to_rgba8(&self) -> ResampleResult<Vec<u8>> {
        if self.format.is_compressed() {
            decompress(&self.data, self.dimensions, self.format)
        } else {
            let mut copy = try_alloc(self.data.len(), 0u8)?;
            copy.copy_from_slice(&self.data);
            Ok(copy)
        }
    }

    /// The logical image as RGBA8 with every kind of padding removed
    pub fn logical_rgba8(&self) -> ResampleResult<Vec<u8>> {
        let full = self.to_rgba8()?;
        let logical = self.logical_extent();
        let stride = self.dimensions.width as usize * 4;
        let (x0, y0) = (self.padding.x.max(0) as usize, self.padding.y.max(0) as usize);
        let row = logical.width as usize * 4;
        let mut out = try_alloc(logical.area() as usize * 4, 0u8)?;
        for y in 0..logical.height as usize {
            let src = (y0 + y) * stride + x0 * 4;
            out[y * row..(y + 1) * row].copy_from_slice(&full[src..src + row]);
        }
        Ok(out)
    }

    /// Serialize to the persisted layout
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.extend_from_slice(&self.dimensions.width.to_le_bytes());
        out.extend_from_slice(&self.dimensions.height.to_le_bytes());
        out.push(self.format as u8);
        out.push(u8::from(self.wrapped.x));
        out.push(u8::from(self.wrapped.y));
        out.extend_from_slice(&self.padding.x.to_le_bytes());
        out.extend_from_slice(&self.padding.y.to_le_bytes());
        out.extend_from_slice(&self.block_padding.x.to_le_bytes());
        out.extend_from_slice(&self.block_padding.y.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse the persisted layout, rejecting anything inconsistent
    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(CacheError::Corrupt(format!(
                "entry is {} bytes, shorter than the header",
                bytes.len()
            )));
        }
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let i32_at = |at: usize| i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let bool_at = |at: usize| -> Result<bool, CacheError> {
            match bytes[at] {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(CacheError::Corrupt(format!("invalid flag byte {}", other))),
            }
        };

        let dimensions = Extent::new(u32_at(0), u32_at(4));
        if dimensions.is_empty() {
            return Err(CacheError::Corrupt(format!("empty dimensions {}", dimensions)));
        }
        let format = PixelFormat::from_u8(bytes[8])
            .ok_or_else(|| CacheError::Corrupt(format!("unknown format tag {}", bytes[8])))?;
        let wrapped = Vec2B::new(bool_at(9)?, bool_at(10)?);
        let padding = Vec2I::new(i32_at(11), i32_at(15));
        let block_padding = Vec2I::new(i32_at(19), i32_at(23));

        let fits = |size: u32, pad: i32, block: i32| {
            pad >= 0 && block >= 0 && (2 * i64::from(pad) + i64::from(block)) < i64::from(size)
        };
        if !fits(dimensions.width, padding.x, block_padding.x)
            || !fits(dimensions.height, padding.y, block_padding.y)
        {
            return Err(CacheError::Corrupt(format!(
                "padding {:?}/{:?} does not fit {}",
                padding, block_padding, dimensions
            )));
        }

        let expected = format.byte_size(dimensions).ok_or_else(|| {
            CacheError::Corrupt(format!("{:?} cannot store {}", format, dimensions))
        })?;
        let data = &bytes[HEADER_LEN..];
        if data.len() != expected {
            return Err(CacheError::Corrupt(format!(
                "expected {} data bytes, found {}",
                expected,
                data.len()
            )));
        }

        Ok(Self {
            data: data.to_vec(),
            dimensions,
            format,
            wrapped,
            padding,
            block_padding,
        })
    }
}
