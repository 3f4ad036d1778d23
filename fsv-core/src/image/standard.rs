//! ``src/image/standard.rs``
//! ============================================================================
//! # Standard Codec: `image` Crate Backed Decoding
//!
//! `open` reads only as far as the header and rewinds; the rest of the stream
//! is read by the decode job. The `image` crate decodes a file in one call, so
//! progressive behaviour is produced at publication time: the decoded pixels are converted to the
//! resident layout and copied into the surface in horizontal bands, each band
//! reported as one region. Cancellation is checked before decoding and
//! between bands.
//!
//! Float sources (OpenEXR, Radiance HDR, float TIFF) are reported linear;
//! everything else is treated as gamma encoded. `image` widens every float
//! source to 32-bit channels, so the half-float layout is only chosen here
//! when `cache.half_float_max_bits` is raised to 96 or above.

use std::io::{BufReader, Seek};

use half::f16;
use image::{ColorType, DynamicImage, ImageDecoder as _, ImageFormat, ImageReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{CoreError, CoreResult};
use crate::fs::vfs::{ReadSeek, extension_of};
use crate::image::codec::{ImageCodec, ImageDecoder};
use crate::image::format::{ImageHeader, PixelLayout, Rect, Region, SourceFormat};
use crate::image::surface::Surface;

#[derive(Debug, Clone, Copy)]
pub struct StandardCodec {
    band_rows: u32,
}

impl StandardCodec {
    #[must_use]
    pub const fn new(band_rows: u32) -> Self {
        Self {
            band_rows: if band_rows == 0 { 1 } else { band_rows },
        }
    }
}

impl Default for StandardCodec {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ImageCodec for StandardCodec {
    fn is_decodable(&self, extension: &str) -> bool {
        ImageFormat::from_extension(extension).is_some_and(|format| format.reading_enabled())
    }

    #[instrument(level = "debug", skip(self, stream))]
    fn open(&self, name: &str, stream: Box<dyn ReadSeek>) -> CoreResult<Box<dyn ImageDecoder>> {
        let mut stream = BufReader::new(stream);
        let (format, header) = read_header(name, &mut stream)?;
        stream
            .rewind()
            .map_err(|e| CoreError::unreadable_header(name, e))?;

        debug!(
            marker = "DECODE_TASK",
            operation_type = "header_read",
            name = name,
            width = header.width,
            height = header.height,
            bits_per_pixel = header.format.bits_per_pixel,
            float = header.format.float,
            "Read image header"
        );

        Ok(Box::new(StandardDecoder {
            name: name.to_string(),
            stream,
            format,
            header,
            band_rows: self.band_rows,
        }))
    }
}

/// Reads the header through a borrowed stream; the decoder built here is dropped.
fn read_header(
    name: &str,
    stream: &mut BufReader<Box<dyn ReadSeek>>,
) -> CoreResult<(ImageFormat, ImageHeader)> {
    let mut reader = ImageReader::new(stream)
        .with_guessed_format()
        .map_err(|e| CoreError::unreadable_header(name, e))?;

    if reader.format().is_none()
        && let Some(hint) = extension_of(name).and_then(ImageFormat::from_extension)
    {
        reader.set_format(hint);
    }

    let format = reader
        .format()
        .ok_or_else(|| CoreError::unreadable_header(name, "unrecognised format"))?;

    let decoder = reader
        .into_decoder()
        .map_err(|e| CoreError::unreadable_header(name, e))?;

    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();
    let float = is_float(color);

    Ok((
        format,
        ImageHeader {
            width,
            height,
            format: SourceFormat {
                bits_per_pixel: color.bits_per_pixel(),
                float,
            },
            linear: float,
        },
    ))
}

const fn is_float(color: ColorType) -> bool {
    matches!(color, ColorType::Rgb32F | ColorType::Rgba32F)
}

struct StandardDecoder {
    name: String,
    stream: BufReader<Box<dyn ReadSeek>>,
    format: ImageFormat,
    header: ImageHeader,
    band_rows: u32,
}

impl ImageDecoder for StandardDecoder {
    fn header(&self) -> &ImageHeader {
        &self.header
    }

    fn decode(
        self: Box<Self>,
        target: &Surface,
        sink: &mut dyn FnMut(Region),
        cancel: &CancellationToken,
    ) -> CoreResult<()> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let Self {
            name,
            stream,
            format,
            band_rows,
            ..
        } = *self;

        let mut reader = ImageReader::new(stream);
        reader.set_format(format);
        let image = reader.decode().map_err(|e| CoreError::decode(&name, e))?;

        if image.width() != target.width() || image.height() != target.height() {
            return Err(CoreError::decode(
                &name,
                format!(
                    "decoded {}x{} but header promised {}x{}",
                    image.width(),
                    image.height(),
                    target.width(),
                    target.height()
                ),
            ));
        }

        let pixels = convert(&image, target.layout());
        drop(image);

        publish_bands(&pixels, target, band_rows, sink, cancel)
    }
}

/// Copies `pixels` into `target` band by band, reporting each band as a region.
fn publish_bands(
    pixels: &[u8],
    target: &Surface,
    band_rows: u32,
    sink: &mut dyn FnMut(Region),
    cancel: &CancellationToken,
) -> CoreResult<()> {
    let height = target.height();
    let stride = target.stride();
    let band_rows = band_rows.max(1);

    let mut y: u32 = 0;
    while y < height {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let rows = band_rows.min(height - y);
        let start = y as usize * stride;
        let end = start + rows as usize * stride;
        target.write_rows(y, &pixels[start..end])?;

        #[expect(clippy::cast_precision_loss, reason = "progress is approximate")]
        let progress = rows as f32 / height as f32;

        sink(Region {
            rect: Rect::new(0, y, target.width(), rows),
            progress,
        });

        y += rows;
    }

    Ok(())
}

/// Converts a decoded image into the tightly packed bytes of `layout`.
fn convert(image: &DynamicImage, layout: PixelLayout) -> Vec<u8> {
    match layout {
        PixelLayout::Rgba8 { .. } => image.to_rgba8().into_raw(),

        PixelLayout::RgbaF32 => bytemuck::cast_slice(image.to_rgba32f().as_raw()).to_vec(),

        PixelLayout::RgbaF16 => image
            .to_rgba32f()
            .as_raw()
            .iter()
            .flat_map(|&value| f16::from_f32(value).to_ne_bytes())
            .collect(),
    }
}
