//! RGBA8 raster helpers used by the chunker and the compositor.
//!
//! All bitmaps are `image::RgbaImage` with straight (non-premultiplied)
//! alpha, which is what the PNG codec reads and writes. Rectangles are
//! validated against their image before any pixel is touched, so the blit
//! loops below index without further bounds checks.

use crate::util::{BlueMarbleError, BlueMarbleResult};

pub mod io;
pub mod scale;

pub use ::image::{Rgba, RgbaImage};

/// Axis-aligned pixel rectangle in some image's local coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    /// Returns true when the two rectangles share at least one pixel.
    pub fn overlaps(&self, other: &PixelRect) -> bool {
        u64::from(self.x) < other.right()
            && u64::from(other.x) < self.right()
            && u64::from(self.y) < other.bottom()
            && u64::from(other.y) < self.bottom()
    }

    /// Checks that the rectangle is non-empty and lies inside `width x height`.
    pub(crate) fn check_within(&self, width: u32, height: u32) -> BlueMarbleResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BlueMarbleError::InvalidInput("rectangle must be non-empty"));
        }
        if self.right() > u64::from(width) || self.bottom() > u64::from(height) {
            return Err(BlueMarbleError::InvalidInput(
                "rectangle extends past the image bounds",
            ));
        }
        Ok(())
    }
}
