//! Converts decoded still images into stream pixel buffers.
//!
//! Conversion happens in two steps. [`PixelBufferConverter::prepare`] runs
//! once per streaming session: it scales the image to the stream size,
//! mirrors it and encodes it. [`PixelBufferConverter::draw`] runs once per
//! tick and copies the prepared pixels into a pooled buffer.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Rgba, RgbaImage};
use tracing::debug;

use crate::assets::ImageState;
use crate::error::ConversionError;
use crate::frame::FormatDescriptor;
use crate::pixel::{BufferPool, PixelBuffer};

/// Mirrors an image around its vertical axis.
///
/// The output sink's x axis runs opposite to the source image's.
pub fn mirror_horizontal(image: &mut RgbaImage) {
    imageops::flip_horizontal_in_place(image);
}

/// A still image already scaled, mirrored and encoded for one stream format.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    format: FormatDescriptor,
    state: ImageState,
    data: Arc<[u8]>,
}

impl PreparedImage {
    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    /// State of the asset the pixels came from.
    pub fn state(&self) -> ImageState {
        self.state
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Builds pixel buffers in the stream's format from decoded images.
#[derive(Debug, Clone)]
pub struct PixelBufferConverter {
    format: FormatDescriptor,
    filter: FilterType,
}

impl PixelBufferConverter {
    pub fn new(format: FormatDescriptor) -> Self {
        Self {
            format,
            filter: FilterType::Triangle,
        }
    }

    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    /// Scales `image` to fill the stream exactly, mirrors and encodes it.
    pub fn prepare(&self, image: &DynamicImage, state: ImageState) -> Result<PreparedImage, ConversionError> {
        let (width, height) = (self.format.width, self.format.height);
        let mut rgba = image.to_rgba8();
        if rgba.dimensions() != (width, height) {
            debug!(
                "Scaling {} image from {}x{} to {}x{}",
                state,
                rgba.width(),
                rgba.height(),
                width,
                height
            );
            rgba = imageops::resize(&rgba, width, height, self.filter);
        }

        mirror_horizontal(&mut rgba);

        let mut data = vec![0u8; self.format.frame_len()];
        self.format.encoding.encode_rgba(rgba.as_raw(), &mut data)?;

        Ok(PreparedImage {
            format: self.format,
            state,
            data: data.into(),
        })
    }

    /// Draws a prepared image into a buffer checked out from `pool`.
    ///
    /// The buffer is locked only while drawing. On failure the buffer goes
    /// back to the pool and no partial frame escapes.
    pub fn draw(&self, prepared: &PreparedImage, pool: &BufferPool) -> Result<PixelBuffer, ConversionError> {
        if prepared.format != self.format || pool.format() != &self.format {
            return Err(ConversionError::FormatMismatch {
                encoding: self.format.encoding,
                expected: self.format.frame_len(),
                actual: prepared.data.len(),
            });
        }

        let mut buffer = pool.checkout()?;
        {
            let mut pixels = buffer.lock();
            let len = pixels.len();
            // Every supported encoding is 4 x 8-bit, so an RGBA view works as context
            let mut context = ImageBuffer::<Rgba<u8>, &mut [u8]>::from_raw(
                self.format.width,
                self.format.height,
                &mut pixels[..],
            )
            .ok_or(ConversionError::DrawContext {
                width: self.format.width,
                height: self.format.height,
                len,
            })?;

            let target: &mut [u8] = &mut context;
            if target.len() != prepared.data.len() {
                return Err(ConversionError::FormatMismatch {
                    encoding: self.format.encoding,
                    expected: target.len(),
                    actual: prepared.data.len(),
                });
            }
            target.copy_from_slice(&prepared.data);
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use crate::frame::PixelEncoding;

    fn format(width: u32, height: u32, encoding: PixelEncoding) -> FormatDescriptor {
        FormatDescriptor {
            width,
            height,
            encoding,
            frame_rate: 1,
        }
    }

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| Rgba([(x * 40) as u8, (y * 60) as u8, 7, 255]))
    }

    #[test]
    fn test_mirror_twice_restores_original() {
        let original = gradient(5, 3);
        let mut image = original.clone();
        mirror_horizontal(&mut image);
        assert_ne!(image, original);
        mirror_horizontal(&mut image);
        assert_eq!(image, original);
    }

    #[test]
    fn test_draw_applies_mirror_exactly_once() {
        let fmt = format(4, 2, PixelEncoding::Rgba);
        let converter = PixelBufferConverter::new(fmt);
        let pool = BufferPool::new(fmt, 2).unwrap();
        let source = gradient(4, 2);

        let prepared = converter
            .prepare(&DynamicImage::ImageRgba8(source.clone()), ImageState::Clear)
            .unwrap();
        let buffer = converter.draw(&prepared, &pool).unwrap();

        let drawn = RgbaImage::from_raw(4, 2, buffer.as_bytes().to_vec()).unwrap();
        assert_eq!(drawn, imageops::flip_horizontal(&source));
        assert!(!buffer.is_locked());
    }

    #[test]
    fn test_output_matches_stream_geometry_for_any_source_size() {
        let fmt = format(8, 6, PixelEncoding::Bgra);
        let converter = PixelBufferConverter::new(fmt);
        let pool = BufferPool::new(fmt, 1).unwrap();

        for (w, h) in [(3, 3), (16, 4), (8, 6), (1, 20)] {
            let source = DynamicImage::ImageRgba8(gradient(w, h));
            let prepared = converter.prepare(&source, ImageState::Obstructed).unwrap();
            let buffer = converter.draw(&prepared, &pool).unwrap();

            assert_eq!(buffer.format(), &fmt);
            assert_eq!(buffer.as_bytes().len(), 8 * 6 * 4);
            assert_eq!(prepared.state(), ImageState::Obstructed);
        }
    }

    #[test]
    fn test_bgra_encoding_is_applied() {
        let fmt = format(1, 1, PixelEncoding::Bgra);
        let converter = PixelBufferConverter::new(fmt);
        let pool = BufferPool::new(fmt, 1).unwrap();
        let source = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([200, 100, 50, 255])));

        let prepared = converter.prepare(&source, ImageState::Clear).unwrap();
        let buffer = converter.draw(&prepared, &pool).unwrap();
        assert_eq!(buffer.as_bytes(), &[50, 100, 200, 255]);
    }

    #[test]
    fn test_exhausted_pool_aborts_draw() {
        let fmt = format(2, 2, PixelEncoding::Bgra);
        let converter = PixelBufferConverter::new(fmt);
        let pool = BufferPool::new(fmt, 1).unwrap();
        let prepared = converter
            .prepare(&DynamicImage::ImageRgba8(gradient(2, 2)), ImageState::Clear)
            .unwrap();

        let _held = converter.draw(&prepared, &pool).unwrap();
        let err = converter.draw(&prepared, &pool).unwrap_err();
        assert!(matches!(err, ConversionError::Pool(PoolError::Exhausted { capacity: 1 })));
    }

    #[test]
    fn test_prepared_image_for_other_format_is_rejected() {
        let small = format(2, 2, PixelEncoding::Bgra);
        let large = format(4, 4, PixelEncoding::Bgra);
        let prepared = PixelBufferConverter::new(small)
            .prepare(&DynamicImage::ImageRgba8(gradient(2, 2)), ImageState::Clear)
            .unwrap();

        let pool = BufferPool::new(large, 1).unwrap();
        let err = PixelBufferConverter::new(large).draw(&prepared, &pool).unwrap_err();
        assert!(matches!(err, ConversionError::FormatMismatch { .. }));
        assert_eq!(pool.in_flight(), 0);
    }
}
