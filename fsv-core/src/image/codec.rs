//! ``src/image/codec.rs``
//! ============================================================================
//! # Codec Seam
//!
//! A codec recognises file extensions and opens byte streams into decoders.
//! A decoder knows its header up front and later fills a [`Surface`]
//! progressively, reporting each finished [`Region`] through a sink and
//! checking the cancellation token between regions.

use tokio_util::sync::CancellationToken;

use crate::error::CoreResult;
use crate::fs::vfs::ReadSeek;
use crate::image::format::{ImageHeader, Region};
use crate::image::surface::Surface;

pub trait ImageCodec: Send + Sync {
    /// Case-insensitive check of a file extension (without the dot).
    fn is_decodable(&self, extension: &str) -> bool;

    /// Reads enough of `stream` to produce the header. `name` is the indexed
    /// relative path, used for format hints and diagnostics.
    fn open(&self, name: &str, stream: Box<dyn ReadSeek>) -> CoreResult<Box<dyn ImageDecoder>>;
}

pub trait ImageDecoder: Send {
    fn header(&self) -> &ImageHeader;

    /// Decodes into `target` (already sized from the header, in the layout
    /// the cache selected). Each completed region is passed to `sink`, in
    /// emission order. Returns `Err(CoreError::Cancelled)` when it stopped
    /// because `cancel` fired.
    fn decode(
        self: Box<Self>,
        target: &Surface,
        sink: &mut dyn FnMut(Region),
        cancel: &CancellationToken,
    ) -> CoreResult<()>;
}
