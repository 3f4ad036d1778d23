//! ``src/cache/decode_task.rs``
//! ============================================================================
//! # Decode Task: One Progressive Decode and Its Resources
//!
//! A task owns the background decode job, the surface the decoder writes
//! into, the queue of regions the decoder has finished, and the renderer
//! resource the regions are uploaded to.
//!
//! Teardown order is fixed: cancel the job, join it, free the resource, and
//! only then let the surface go. The decoder holds its own `Arc` to the
//! surface, but the join still comes first so a torn-down task never has a
//! writer behind it.

use std::mem;
use std::sync::Arc;

use compact_str::CompactString;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::image::codec::ImageDecoder;
use crate::image::format::{ImageHeader, PixelLayout, Region};
use crate::image::surface::Surface;
use crate::render::resource::{ResourceId, ResourceUploader, TextureRef};
use crate::tasks::job::{JobHandle, spawn_job};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    Decoding,
    Complete,
    Cancelled,
    /// Decoder gave up mid-stream; the surface keeps what was written
    Failed(CompactString),
}

impl DecodeStatus {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Decoding)
    }
}

#[derive(Debug)]
struct FeedState {
    pending: Vec<Region>,
    progress: f32,
    status: DecodeStatus,
}

/// Region queue shared between the decode job (writer) and the drain pass (reader).
#[derive(Debug)]
pub struct RegionFeed {
    state: Mutex<FeedState>,
}

impl Default for RegionFeed {
    fn default() -> Self {
        Self {
            state: Mutex::new(FeedState {
                pending: Vec::new(),
                progress: 0.0,
                status: DecodeStatus::Decoding,
            }),
        }
    }
}

impl RegionFeed {
    pub fn push(&self, region: Region) {
        let mut state = self.state.lock();
        state.pending.push(region);
        state.progress = (state.progress + region.progress).min(1.0);
    }

    /// Swaps the pending queue with `out` (which must be empty), leaving the queue empty.
    pub fn take_into(&self, out: &mut Vec<Region>) {
        debug_assert!(out.is_empty());
        mem::swap(&mut self.state.lock().pending, out);
    }

    fn finish(&self, status: DecodeStatus) {
        let mut state = self.state.lock();
        if status == DecodeStatus::Complete {
            state.progress = 1.0;
        }
        state.status = status;
    }

    #[must_use]
    pub fn progress(&self) -> f32 {
        self.state.lock().progress
    }

    #[must_use]
    pub fn status(&self) -> DecodeStatus {
        self.state.lock().status.clone()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// Result of pushing one task's pending regions to the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub uploaded: usize,
    pub failed: usize,
}

pub struct DecodeTask {
    name: CompactString,
    header: ImageHeader,
    surface: Arc<Surface>,
    feed: Arc<RegionFeed>,
    job: JobHandle,
    resource: ResourceId,
    uploader: Arc<dyn ResourceUploader>,
}

impl std::fmt::Debug for DecodeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeTask")
            .field("name", &self.name)
            .field("header", &self.header)
            .field("layout", &self.surface.layout())
            .field("resource", &self.resource)
            .field("status", &self.feed.status())
            .finish_non_exhaustive()
    }
}

/// A task whose surface and resource exist but whose decode has not started.
///
/// Dropping it without launching frees the resource.
pub struct PreparedDecode {
    name: CompactString,
    header: ImageHeader,
    // taken by `launch`
    decoder: Option<Box<dyn ImageDecoder>>,
    surface: Arc<Surface>,
    resource: ResourceId,
    uploader: Arc<dyn ResourceUploader>,
}

impl std::fmt::Debug for PreparedDecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedDecode")
            .field("name", &self.name)
            .field("header", &self.header)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl PreparedDecode {
    /// Starts decoding on the blocking pool.
    #[must_use]
    pub fn launch(mut self, runtime: &Handle) -> DecodeTask {
        let feed = Arc::new(RegionFeed::default());
        let decoder = self.decoder.take();

        let job = {
            let surface = Arc::clone(&self.surface);
            let feed = Arc::clone(&feed);
            let name = self.name.clone();

            spawn_job(runtime, "decode", move |token| {
                let result = decoder.map_or(Err(CoreError::Cancelled), |decoder| {
                    decoder.decode(&surface, &mut |region| feed.push(region), &token)
                });

                let status = match result {
                    Ok(()) => DecodeStatus::Complete,
                    Err(CoreError::Cancelled) => DecodeStatus::Cancelled,
                    Err(e) => {
                        warn!(
                            marker = "DECODE_TASK",
                            operation_type = "decode_failed",
                            name = %name,
                            error = %e,
                            "Decode stopped early; keeping partial image"
                        );
                        DecodeStatus::Failed(CompactString::new(e.to_string()))
                    }
                };

                debug!(
                    marker = "DECODE_TASK",
                    operation_type = "decode_finished",
                    name = %name,
                    status = ?status,
                    "Decode job returned"
                );
                feed.finish(status);
            })
        };

        debug!(
            marker = "DECODE_TASK",
            operation_type = "decode_launched",
            name = %self.name,
            width = self.header.width,
            height = self.header.height,
            layout = ?self.surface.layout(),
            resource = %self.resource,
            "Decode task launched"
        );

        DecodeTask {
            name: self.name.clone(),
            header: self.header,
            surface: Arc::clone(&self.surface),
            feed,
            job,
            resource: self.resource,
            uploader: Arc::clone(&self.uploader),
        }
    }
}

impl Drop for PreparedDecode {
    fn drop(&mut self) {
        if self.decoder.is_some() {
            self.uploader.free(self.resource);
        }
    }
}

impl DecodeTask {
    /// Allocates the surface and the resource without starting the decode.
    pub fn prepare(
        name: &str,
        decoder: Box<dyn ImageDecoder>,
        layout: PixelLayout,
        uploader: Arc<dyn ResourceUploader>,
    ) -> CoreResult<PreparedDecode> {
        let header = *decoder.header();
        if !header.is_valid() {
            return Err(CoreError::unreadable_header(name, "zero-sized image"));
        }

        let surface = Arc::new(Surface::new(header.width, header.height, layout)?);
        let resource = uploader.allocate(header.width, header.height, layout)?;

        Ok(PreparedDecode {
            name: CompactString::new(name),
            header,
            decoder: Some(decoder),
            surface,
            resource,
            uploader,
        })
    }

    /// `prepare` followed by `launch`.
    pub fn launch(
        runtime: &Handle,
        name: &str,
        decoder: Box<dyn ImageDecoder>,
        layout: PixelLayout,
        uploader: Arc<dyn ResourceUploader>,
    ) -> CoreResult<Self> {
        Ok(Self::prepare(name, decoder, layout, uploader)?.launch(runtime))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn header(&self) -> &ImageHeader {
        &self.header
    }

    #[must_use]
    pub fn layout(&self) -> PixelLayout {
        self.surface.layout()
    }

    #[must_use]
    pub const fn resource(&self) -> ResourceId {
        self.resource
    }

    #[must_use]
    pub fn texture_ref(&self) -> TextureRef {
        TextureRef {
            resource: Some(self.resource),
            width: self.header.width,
            height: self.header.height,
            layout: Some(self.surface.layout()),
        }
    }

    #[must_use]
    pub fn progress(&self) -> f32 {
        self.feed.progress()
    }

    #[must_use]
    pub fn status(&self) -> DecodeStatus {
        self.feed.status()
    }

    /// True once the decode job has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.job.is_finished()
    }

    /// Swaps out the pending regions and uploads each one.
    ///
    /// Full-width regions are uploaded straight from the surface rows;
    /// narrower ones are packed into `scratch` first. `regions` is a reusable
    /// buffer and is left empty.
    pub fn upload_pending(&self, regions: &mut Vec<Region>, scratch: &mut Vec<u8>) -> UploadOutcome {
        self.feed.take_into(regions);

        let mut outcome = UploadOutcome::default();
        for region in regions.drain(..) {
            match self.upload_region(region, scratch) {
                Ok(()) => outcome.uploaded += 1,

                Err(e) => {
                    outcome.failed += 1;
                    warn!(
                        marker = "DECODE_TASK",
                        operation_type = "upload_failed",
                        name = %self.name,
                        rect = ?region.rect,
                        error = %e,
                        "Region upload failed"
                    );
                }
            }
        }

        outcome
    }

    fn upload_region(&self, region: Region, scratch: &mut Vec<u8>) -> CoreResult<()> {
        let rect = region.rect;
        if rect.is_empty() {
            return Ok(());
        }

        if rect.x == 0 && rect.width == self.surface.width() {
            self.surface.with_rows(rect.y, rect.height, |rows| {
                self.uploader.upload(self.resource, rect, rows)
            })?
        } else {
            self.surface.copy_rect(rect, scratch)?;
            self.uploader.upload(self.resource, rect, scratch)
        }
    }
}

impl Drop for DecodeTask {
    fn drop(&mut self) {
        self.job.cancel_and_join();
        self.uploader.free(self.resource);

        debug!(
            marker = "DECODE_TASK",
            operation_type = "task_teardown",
            name = %self.name,
            resource = %self.resource,
            "Decode task torn down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::codec::ImageCodec;
    use crate::render::software::SoftwareRenderer;
    use crate::test_support::{FakeCodec, test_runtime, wait_until};
    use std::io::Cursor;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const RGBA8: PixelLayout = PixelLayout::Rgba8 { srgb: true };
    const WAIT: Duration = Duration::from_secs(5);

    fn open(codec: &FakeCodec, text: &str) -> Box<dyn ImageDecoder> {
        codec
            .open("test.png", Box::new(Cursor::new(text.as_bytes().to_vec())))
            .unwrap()
    }

    #[test]
    fn test_regions_reach_the_renderer_once() {
        let runtime = test_runtime();
        let codec = FakeCodec::new();
        let renderer = Arc::new(SoftwareRenderer::new());

        let task = DecodeTask::launch(
            runtime.handle(),
            "test.png",
            open(&codec, "3 2"),
            RGBA8,
            renderer.clone(),
        )
        .unwrap();

        assert!(wait_until(|| task.status().is_terminal(), WAIT));
        assert_eq!(task.status(), DecodeStatus::Complete);
        assert!((task.progress() - 1.0).abs() < f32::EPSILON);

        let mut regions = Vec::new();
        let mut scratch = Vec::new();
        let first = task.upload_pending(&mut regions, &mut scratch);
        let second = task.upload_pending(&mut regions, &mut scratch);

        assert_eq!(first, UploadOutcome { uploaded: 2, failed: 0 });
        assert_eq!(second, UploadOutcome::default());

        let pixels = renderer.pixels(task.resource()).unwrap();
        // pixel (2, 1)
        assert_eq!(&pixels[20..24], &[2, 1, 0, 255]);
    }

    #[test]
    fn test_drop_joins_before_freeing() {
        let runtime = test_runtime();
        let codec = FakeCodec::new();
        let renderer = Arc::new(SoftwareRenderer::new());

        let task = DecodeTask::launch(
            runtime.handle(),
            "test.png",
            open(&codec, "8 8 block"),
            RGBA8,
            renderer.clone(),
        )
        .unwrap();
        let resource = task.resource();

        assert!(wait_until(|| codec.active.load(Ordering::SeqCst) == 1, WAIT));
        drop(task);

        assert_eq!(codec.active.load(Ordering::SeqCst), 0);
        assert_eq!(codec.stopped.load(Ordering::SeqCst), 1);
        assert!(!renderer.contains(resource));
    }

    #[test]
    fn test_failure_is_reported_and_partial_kept() {
        let runtime = test_runtime();
        let codec = FakeCodec::new();
        let renderer = Arc::new(SoftwareRenderer::new());

        let task = DecodeTask::launch(
            runtime.handle(),
            "test.png",
            open(&codec, "2 4 fail"),
            RGBA8,
            renderer.clone(),
        )
        .unwrap();

        assert!(wait_until(|| task.status().is_terminal(), WAIT));
        assert!(matches!(task.status(), DecodeStatus::Failed(_)));
        assert!((task.progress() - 0.25).abs() < 1e-6);

        let mut regions = Vec::new();
        let mut scratch = Vec::new();
        assert_eq!(task.upload_pending(&mut regions, &mut scratch).uploaded, 1);
    }

    #[test]
    fn test_partial_width_regions_use_scratch() {
        let runtime = test_runtime();
        let codec = FakeCodec::new();
        let renderer = Arc::new(SoftwareRenderer::new());

        let task = DecodeTask::launch(
            runtime.handle(),
            "test.png",
            open(&codec, "4 2 tiles"),
            RGBA8,
            renderer.clone(),
        )
        .unwrap();

        assert!(wait_until(|| task.status().is_terminal(), WAIT));

        let mut regions = Vec::new();
        let mut scratch = Vec::new();
        let outcome = task.upload_pending(&mut regions, &mut scratch);
        assert_eq!(outcome, UploadOutcome { uploaded: 4, failed: 0 });

        let pixels = renderer.pixels(task.resource()).unwrap();
        // pixel (3, 1) came from a right-half tile
        assert_eq!(&pixels[28..32], &[3, 1, 0, 255]);
        // pixel (0, 1) came from a left-half tile
        assert_eq!(&pixels[16..20], &[0, 1, 0, 255]);
    }

    #[test]
    fn test_prepared_decode_frees_unless_launched() {
        let runtime = test_runtime();
        let codec = FakeCodec::new();
        let renderer = Arc::new(SoftwareRenderer::new());

        let abandoned =
            DecodeTask::prepare("test.png", open(&codec, "2 2"), RGBA8, renderer.clone()).unwrap();
        assert_eq!(renderer.resident(), 1);
        drop(abandoned);
        assert_eq!(renderer.resident(), 0);

        let task = DecodeTask::prepare("test.png", open(&codec, "2 2"), RGBA8, renderer.clone())
            .unwrap()
            .launch(runtime.handle());
        assert!(wait_until(|| task.status().is_terminal(), WAIT));
        assert!(renderer.contains(task.resource()));
        assert_eq!(renderer.resident(), 1);
    }

    #[test]
    fn test_zero_sized_header_is_rejected() {
        let runtime = test_runtime();
        let codec = FakeCodec::new();
        let renderer = Arc::new(SoftwareRenderer::new());

        let result = DecodeTask::launch(
            runtime.handle(),
            "test.png",
            open(&codec, "0 0"),
            RGBA8,
            renderer.clone(),
        );

        assert!(matches!(result, Err(CoreError::UnreadableHeader { .. })));
        assert_eq!(renderer.resident(), 0);
    }
}
