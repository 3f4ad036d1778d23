//! ``src/test_support.rs``
//! ============================================================================
//! # Shared Test Fixtures
//!
//! `FakeCodec` decodes text files of the form
//! `"<width> <height> [float] [linear] [bits=N] [block] [fail] [tiles]"`:
//!
//! - `block`: the decoder publishes nothing and spins until cancelled
//! - `fail`: the first row is published, then the decode errors out
//! - `tiles`: each row is published as a left and a right half
//!
//! Rows are otherwise published one at a time. 8-bit pixels are
//! `[x, y, 0, 255]`; float layouts are filled with the row number.

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;

use crate::cache::texture_cache::TextureCache;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::fs::memory::MemoryFileSystem;
use crate::fs::vfs::ReadSeek;
use crate::image::codec::{ImageCodec, ImageDecoder};
use crate::image::format::{ImageHeader, PixelLayout, Rect, Region, SourceFormat};
use crate::image::surface::Surface;
use crate::render::software::SoftwareRenderer;

pub(crate) fn test_runtime() -> Runtime {
    Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

/// Polls `condition` every millisecond until it holds or `timeout` passes.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[derive(Debug, Default)]
pub(crate) struct FakeCodec {
    /// Decoders currently inside `decode`
    pub active: Arc<AtomicUsize>,
    /// Decodes that ended by observing cancellation
    pub stopped: Arc<AtomicUsize>,
}

impl FakeCodec {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FakeImage {
    block: bool,
    fail: bool,
    tiles: bool,
}

fn parse(text: &str) -> Option<(ImageHeader, FakeImage)> {
    let mut words = text.split_whitespace();
    let width: u32 = words.next()?.parse().ok()?;
    let height: u32 = words.next()?.parse().ok()?;

    let mut header = ImageHeader {
        width,
        height,
        ..ImageHeader::default()
    };
    let mut image = FakeImage::default();
    let mut bits = None;

    for word in words {
        match word {
            "float" => header.format.float = true,
            "linear" => header.linear = true,
            "block" => image.block = true,
            "fail" => image.fail = true,
            "tiles" => image.tiles = true,
            other => bits = other.strip_prefix("bits=").and_then(|n| n.parse().ok()).or(bits),
        }
    }

    header.format = SourceFormat {
        bits_per_pixel: bits.unwrap_or(if header.format.float { 128 } else { 32 }),
        float: header.format.float,
    };
    Some((header, image))
}

impl ImageCodec for FakeCodec {
    fn is_decodable(&self, extension: &str) -> bool {
        matches!(
            extension.to_ascii_lowercase().as_str(),
            "png" | "jpg" | "jpeg" | "exr"
        )
    }

    fn open(&self, name: &str, mut stream: Box<dyn ReadSeek>) -> CoreResult<Box<dyn ImageDecoder>> {
        let mut text = String::new();
        stream
            .read_to_string(&mut text)
            .map_err(|e| CoreError::unreadable_header(name, e))?;

        let (header, image) =
            parse(&text).ok_or_else(|| CoreError::unreadable_header(name, "no dimensions"))?;

        Ok(Box::new(FakeDecoder {
            name: name.to_string(),
            header,
            image,
            active: Arc::clone(&self.active),
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

struct FakeDecoder {
    name: String,
    header: ImageHeader,
    image: FakeImage,
    active: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
}

impl FakeDecoder {
    fn run(
        &self,
        target: &Surface,
        sink: &mut dyn FnMut(Region),
        cancel: &CancellationToken,
    ) -> CoreResult<()> {
        if self.image.block {
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            return Err(CoreError::Cancelled);
        }

        let width = target.width();
        let height = target.height();
        let row_share = 1.0 / height as f32;

        for y in 0..height {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            if self.image.fail && y == 1 {
                return Err(CoreError::decode(&self.name, "truncated stream"));
            }

            target.write_rows(y, &fill_row(target.layout(), width, y))?;

            if self.image.tiles && width >= 2 {
                let half = width / 2;
                sink(Region {
                    rect: Rect::new(0, y, half, 1),
                    progress: row_share / 2.0,
                });
                sink(Region {
                    rect: Rect::new(half, y, width - half, 1),
                    progress: row_share / 2.0,
                });
            } else {
                sink(Region {
                    rect: Rect::new(0, y, width, 1),
                    progress: row_share,
                });
            }
        }

        Ok(())
    }
}

impl ImageDecoder for FakeDecoder {
    fn header(&self) -> &ImageHeader {
        &self.header
    }

    fn decode(
        self: Box<Self>,
        target: &Surface,
        sink: &mut dyn FnMut(Region),
        cancel: &CancellationToken,
    ) -> CoreResult<()> {
        self.active.fetch_add(1, Ordering::SeqCst);
        let result = self.run(target, sink, cancel);
        self.active.fetch_sub(1, Ordering::SeqCst);

        if matches!(result, Err(CoreError::Cancelled)) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

fn fill_row(layout: PixelLayout, width: u32, y: u32) -> Vec<u8> {
    match layout {
        PixelLayout::Rgba8 { .. } => (0..width)
            .flat_map(|x| [x as u8, y as u8, 0, 255])
            .collect(),
        other => vec![y as u8; width as usize * other.bytes_per_pixel()],
    }
}

/// A texture cache over an in-memory tree with the fake codec and a software renderer.
pub(crate) struct CacheFixture {
    pub cache: TextureCache,
    pub codec: Arc<FakeCodec>,
    pub renderer: Arc<SoftwareRenderer>,
    // dropped last: the cache joins jobs running on it
    _runtime: Runtime,
}

pub(crate) fn cache_fixture(capacity: usize, build: impl FnOnce(&MemoryFileSystem)) -> CacheFixture {
    let runtime = test_runtime();
    let memory = MemoryFileSystem::new();
    build(&memory);

    let mut config = Config::default();
    config.cache.capacity = capacity;
    config.indexer.first_entry_poll = Duration::from_millis(5);
    config.indexer.name_poll = Duration::from_millis(1);

    let codec = Arc::new(FakeCodec::new());
    let renderer = Arc::new(SoftwareRenderer::new());
    let cache = TextureCache::new(
        &config,
        runtime.handle().clone(),
        Arc::new(memory),
        codec.clone(),
        renderer.clone(),
    )
    .unwrap();

    CacheFixture {
        cache,
        codec,
        renderer,
        _runtime: runtime,
    }
}
