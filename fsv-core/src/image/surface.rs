//! ``src/image/surface.rs``
//! ============================================================================
//! # Surface: Backing Pixel Buffer of One Decode
//!
//! Tightly packed rows at the image's full dimensions. The decoder writes
//! into it from a background job while the UI thread copies finished regions
//! out for upload; both sides hold the lock only for the duration of one
//! row/rect copy.

use parking_lot::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::image::format::{PixelLayout, Rect};

#[derive(Debug)]
pub struct Surface {
    width: u32,
    height: u32,
    layout: PixelLayout,
    stride: usize,
    pixels: RwLock<Vec<u8>>,
}

impl Surface {
    /// Allocates a zeroed surface; fails if the byte size overflows or cannot be reserved.
    pub fn new(width: u32, height: u32, layout: PixelLayout) -> CoreResult<Self> {
        let stride = (width as usize)
            .checked_mul(layout.bytes_per_pixel())
            .ok_or_else(|| CoreError::resource(format!("row of {width} pixels is too large")))?;
        let size = stride.checked_mul(height as usize).ok_or_else(|| {
            CoreError::resource(format!("surface of {width}x{height} pixels is too large"))
        })?;

        let mut pixels: Vec<u8> = Vec::new();
        pixels
            .try_reserve_exact(size)
            .map_err(|e| CoreError::resource(format!("{width}x{height} surface: {e}")))?;
        pixels.resize(size, 0);

        Ok(Self {
            width,
            height,
            layout,
            stride,
            pixels: RwLock::new(pixels),
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Bytes per row.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Copies whole rows starting at row `y`. `rows.len()` must be a multiple of the stride.
    pub fn write_rows(&self, y: u32, rows: &[u8]) -> CoreResult<()> {
        if self.stride == 0 || rows.len() % self.stride != 0 {
            return Err(CoreError::resource("row data is not a whole number of rows"));
        }

        let start = y as usize * self.stride;
        let end = start + rows.len();

        let mut pixels = self.pixels.write();
        let target = pixels
            .get_mut(start..end)
            .ok_or_else(|| CoreError::resource(format!("rows from {y} exceed the surface")))?;
        target.copy_from_slice(rows);

        Ok(())
    }

    /// Copies tightly packed pixels into `rect`.
    pub fn write_rect(&self, rect: Rect, data: &[u8]) -> CoreResult<()> {
        self.check_rect(rect)?;

        let bpp = self.layout.bytes_per_pixel();
        let row_bytes = rect.width as usize * bpp;
        if data.len() != row_bytes * rect.height as usize {
            return Err(CoreError::resource("rect data size does not match rect"));
        }

        let mut pixels = self.pixels.write();
        for (row, chunk) in data.chunks_exact(row_bytes).enumerate() {
            let offset = (rect.y as usize + row) * self.stride + rect.x as usize * bpp;
            pixels[offset..offset + row_bytes].copy_from_slice(chunk);
        }

        Ok(())
    }

    /// Runs `f` over the contiguous bytes of rows `y..y + height`.
    pub fn with_rows<R>(&self, y: u32, height: u32, f: impl FnOnce(&[u8]) -> R) -> CoreResult<R> {
        self.check_rect(Rect::new(0, y, self.width, height))?;

        let start = y as usize * self.stride;
        let end = start + height as usize * self.stride;

        let pixels = self.pixels.read();
        Ok(f(&pixels[start..end]))
    }

    /// Copies `rect` out into `out` as tightly packed rows, reusing its allocation.
    pub fn copy_rect(&self, rect: Rect, out: &mut Vec<u8>) -> CoreResult<()> {
        self.check_rect(rect)?;

        let bpp = self.layout.bytes_per_pixel();
        let row_bytes = rect.width as usize * bpp;

        out.clear();
        out.reserve(row_bytes * rect.height as usize);

        let pixels = self.pixels.read();
        for row in 0..rect.height as usize {
            let offset = (rect.y as usize + row) * self.stride + rect.x as usize * bpp;
            out.extend_from_slice(&pixels[offset..offset + row_bytes]);
        }

        Ok(())
    }

    fn check_rect(&self, rect: Rect) -> CoreResult<()> {
        if rect.fits(self.width, self.height) {
            Ok(())
        } else {
            Err(CoreError::resource(format!(
                "{rect:?} exceeds {}x{} surface",
                self.width, self.height
            )))
        }
    }
}
