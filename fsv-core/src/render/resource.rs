//! ``src/render/resource.rs``
//! ============================================================================
//! # Renderer Seam
//!
//! The cache never draws. It asks the renderer for an opaque resource of a
//! given size and layout, pushes finished sub-rectangles into it, and frees
//! it when the owning decode task is torn down.

use std::fmt;

use crate::error::CoreResult;
use crate::image::format::{PixelLayout, Rect};

/// Opaque renderer-side handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

pub trait ResourceUploader: Send + Sync {
    /// Allocates an uninitialized resource.
    fn allocate(&self, width: u32, height: u32, layout: PixelLayout) -> CoreResult<ResourceId>;

    /// Uploads tightly packed pixels covering `rect` (in the resource's layout).
    fn upload(&self, id: ResourceId, rect: Rect, pixels: &[u8]) -> CoreResult<()>;

    fn free(&self, id: ResourceId);
}

/// What `TextureCache::get` hands to the UI.
///
/// An empty reference (no resource) means "nothing to draw": the index was
/// out of range, or the file could not be opened or had no valid header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureRef {
    pub resource: Option<ResourceId>,
    pub width: u32,
    pub height: u32,
    pub layout: Option<PixelLayout>,
}

impl TextureRef {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            resource: None,
            width: 0,
            height: 0,
            layout: None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.resource.is_none()
    }
}
