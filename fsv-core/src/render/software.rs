//! ``src/render/software.rs``
//! ============================================================================
//! # Software Renderer: CPU-side Resource Store
//!
//! Keeps every allocated resource as a byte buffer so uploads can be
//! inspected. Used by the headless binary and as the renderer in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{CoreError, CoreResult};
use crate::image::format::{PixelLayout, Rect};
use crate::render::resource::{ResourceId, ResourceUploader};

#[derive(Debug)]
struct SoftwareTexture {
    width: u32,
    height: u32,
    layout: PixelLayout,
    pixels: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct SoftwareRenderer {
    textures: Mutex<HashMap<ResourceId, SoftwareTexture>>,
    next_id: AtomicU64,
    uploads: AtomicUsize,
}

impl SoftwareRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resources currently allocated.
    #[must_use]
    pub fn resident(&self) -> usize {
        self.textures.lock().len()
    }

    /// Total successful uploads since creation.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn contains(&self, id: ResourceId) -> bool {
        self.textures.lock().contains_key(&id)
    }

    /// Copy of a resource's pixels, or `None` once freed.
    #[must_use]
    pub fn pixels(&self, id: ResourceId) -> Option<Vec<u8>> {
        self.textures.lock().get(&id).map(|t| t.pixels.clone())
    }

    #[must_use]
    pub fn dimensions(&self, id: ResourceId) -> Option<(u32, u32, PixelLayout)> {
        self.textures
            .lock()
            .get(&id)
            .map(|t| (t.width, t.height, t.layout))
    }
}

impl ResourceUploader for SoftwareRenderer {
    fn allocate(&self, width: u32, height: u32, layout: PixelLayout) -> CoreResult<ResourceId> {
        let size = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(layout.bytes_per_pixel()))
            .ok_or_else(|| CoreError::resource(format!("{width}x{height} texture is too large")))?;

        let mut pixels: Vec<u8> = Vec::new();
        pixels
            .try_reserve_exact(size)
            .map_err(|e| CoreError::resource(format!("{width}x{height} texture: {e}")))?;
        pixels.resize(size, 0);

        let id = ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.textures.lock().insert(
            id,
            SoftwareTexture {
                width,
                height,
                layout,
                pixels,
            },
        );

        trace!(resource = %id, width, height, ?layout, "allocated texture");
        Ok(id)
    }

    fn upload(&self, id: ResourceId, rect: Rect, pixels: &[u8]) -> CoreResult<()> {
        let mut textures = self.textures.lock();
        let texture = textures
            .get_mut(&id)
            .ok_or_else(|| CoreError::resource(format!("upload to unknown {id}")))?;

        if !rect.fits(texture.width, texture.height) {
            return Err(CoreError::resource(format!(
                "{rect:?} exceeds {}x{} texture {id}",
                texture.width, texture.height
            )));
        }

        let bpp = texture.layout.bytes_per_pixel();
        let row_bytes = rect.width as usize * bpp;
        if pixels.len() != row_bytes * rect.height as usize {
            return Err(CoreError::resource(format!(
                "upload of {} bytes does not match {rect:?}",
                pixels.len()
            )));
        }

        let stride = texture.width as usize * bpp;
        for (row, chunk) in pixels.chunks_exact(row_bytes).enumerate() {
            let offset = (rect.y as usize + row) * stride + rect.x as usize * bpp;
            texture.pixels[offset..offset + row_bytes].copy_from_slice(chunk);
        }

        self.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn free(&self, id: ResourceId) {
        if self.textures.lock().remove(&id).is_some() {
            trace!(resource = %id, "freed texture");
        }
    }
}
