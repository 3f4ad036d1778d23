//! ``src/image/format.rs``
//! ============================================================================
//! # Image Header and Pixel Layout Model
//!
//! What a decoder reports about a source image, the resident layout the
//! cache stores it in, and the rectangles decoders publish as they progress.

use serde::{Deserialize, Serialize};

/// Source pixel encoding as reported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceFormat {
    pub bits_per_pixel: u16,
    pub float: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub format: SourceFormat,
    /// Pixel values are linear light rather than gamma encoded
    pub linear: bool,
}

impl ImageHeader {
    /// Zero-sized headers come from malformed or unreadable files.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Resident layout of a decoded image, shared by the surface and the renderer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelLayout {
    /// 8 bits per channel, `srgb` tags gamma-encoded data
    Rgba8 { srgb: bool },
    RgbaF16,
    RgbaF32,
}

impl PixelLayout {
    /// Picks the resident layout for a header.
    ///
    /// Float sources keep float storage (half precision unless the source is
    /// wider than `half_float_max_bits` per pixel); everything else is stored
    /// as 8-bit RGBA carrying the header's gamma tag.
    #[must_use]
    pub const fn select(header: &ImageHeader, half_float_max_bits: u16) -> Self {
        if header.format.float {
            if header.format.bits_per_pixel <= half_float_max_bits {
                Self::RgbaF16
            } else {
                Self::RgbaF32
            }
        } else {
            Self::Rgba8 {
                srgb: !header.linear,
            }
        }
    }

    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 { .. } => 4,
            Self::RgbaF16 => 8,
            Self::RgbaF32 => 16,
        }
    }

    #[must_use]
    pub const fn is_linear(self) -> bool {
        match self {
            Self::Rgba8 { srgb } => !srgb,
            Self::RgbaF16 | Self::RgbaF32 => true,
        }
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::RgbaF16 | Self::RgbaF32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the rectangle lies inside a `width` x `height` image.
    #[must_use]
    pub const fn fits(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

/// A rectangle the decoder reports complete, with its share of total progress.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Region {
    pub rect: Rect,
    pub progress: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(bits: u16, float: bool, linear: bool) -> ImageHeader {
        ImageHeader {
            width: 4,
            height: 4,
            format: SourceFormat {
                bits_per_pixel: bits,
                float,
            },
            linear,
        }
    }

    #[test]
    fn test_float_sources_pick_half_up_to_threshold() {
        assert_eq!(PixelLayout::select(&header(64, true, true), 64), PixelLayout::RgbaF16);
        assert_eq!(PixelLayout::select(&header(48, true, true), 64), PixelLayout::RgbaF16);
        assert_eq!(PixelLayout::select(&header(96, true, true), 64), PixelLayout::RgbaF32);
        assert_eq!(PixelLayout::select(&header(128, true, true), 64), PixelLayout::RgbaF32);
    }

    #[test]
    fn test_integer_sources_carry_gamma_tag() {
        let gamma = PixelLayout::select(&header(24, false, false), 64);
        let linear = PixelLayout::select(&header(32, false, true), 64);

        assert_eq!(gamma, PixelLayout::Rgba8 { srgb: true });
        assert_eq!(linear, PixelLayout::Rgba8 { srgb: false });
        assert!(!gamma.is_linear());
        assert!(linear.is_linear());
        assert!(PixelLayout::RgbaF16.is_linear());
    }

    #[test]
    fn test_header_validity() {
        assert!(header(32, false, false).is_valid());
        assert!(!ImageHeader::default().is_valid());
        assert!(
            !ImageHeader {
                width: 10,
                ..ImageHeader::default()
            }
            .is_valid()
        );
    }

    #[test]
    fn test_rect_fits() {
        assert!(Rect::new(0, 0, 4, 4).fits(4, 4));
        assert!(Rect::new(2, 3, 2, 1).fits(4, 4));
        assert!(!Rect::new(3, 0, 2, 1).fits(4, 4));
        assert!(Rect::new(0, 0, 0, 1).is_empty());
    }
}
