//! Stream format descriptors, pixel encodings and the timed frame type.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::assets::ImageState;
use crate::clock::HostTime;
use crate::error::ConversionError;
use crate::pixel::PixelBuffer;

/// 32-bit pixel encodings the stream can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelEncoding {
    /// B G R A byte order (kCVPixelFormatType_32BGRA)
    Bgra,
    /// A R G B byte order (kCVPixelFormatType_32ARGB)
    Argb,
    /// R G B A byte order
    Rgba,
}

impl PixelEncoding {
    /// Every supported encoding packs one pixel into 4 bytes.
    pub const fn bytes_per_pixel(&self) -> usize {
        4
    }

    /// CoreVideo-style four character code for the encoding.
    pub const fn fourcc(&self) -> u32 {
        match self {
            PixelEncoding::Bgra => u32::from_be_bytes(*b"BGRA"),
            PixelEncoding::Argb => 0x0000_0020,
            PixelEncoding::Rgba => u32::from_be_bytes(*b"RGBA"),
        }
    }

    /// Writes RGBA pixels from `rgba` into `dst` using this encoding.
    pub fn encode_rgba(&self, rgba: &[u8], dst: &mut [u8]) -> Result<(), ConversionError> {
        let mismatch = ConversionError::FormatMismatch {
            encoding: *self,
            expected: dst.len(),
            actual: rgba.len(),
        };
        if rgba.len() != dst.len() {
            return Err(mismatch);
        }
        let src: &[[u8; 4]] = bytemuck::try_cast_slice(rgba).map_err(|_| mismatch)?;
        let dst: &mut [[u8; 4]] = bytemuck::try_cast_slice_mut(dst).map_err(|_| {
            ConversionError::FormatMismatch {
                encoding: *self,
                expected: rgba.len(),
                actual: rgba.len(),
            }
        })?;

        match self {
            // Fast path: same byte order
            PixelEncoding::Rgba => dst.copy_from_slice(src),
            PixelEncoding::Bgra => {
                for (d, &[r, g, b, a]) in dst.iter_mut().zip(src) {
                    *d = [b, g, r, a];
                }
            }
            PixelEncoding::Argb => {
                for (d, &[r, g, b, a]) in dst.iter_mut().zip(src) {
                    *d = [a, r, g, b];
                }
            }
        }
        Ok(())
    }

    /// Reads pixels in this encoding back into RGBA byte order.
    pub fn decode_to_rgba(&self, data: &[u8]) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(data.len());
        for px in data.chunks_exact(4) {
            let [r, g, b, a] = match self {
                PixelEncoding::Rgba => [px[0], px[1], px[2], px[3]],
                PixelEncoding::Bgra => [px[2], px[1], px[0], px[3]],
                PixelEncoding::Argb => [px[1], px[2], px[3], px[0]],
            };
            rgba.extend_from_slice(&[r, g, b, a]);
        }
        rgba
    }
}

/// Rational time value, `value / timescale` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: i32,
}

impl MediaTime {
    pub const fn new(value: i64, timescale: i32) -> Self {
        Self { value, timescale }
    }

    pub fn as_secs_f64(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.value as f64 / self.timescale as f64
    }

    pub fn as_nanos(&self) -> u64 {
        if self.timescale <= 0 || self.value < 0 {
            return 0;
        }
        (self.value as u128 * 1_000_000_000 / self.timescale as u128) as u64
    }
}

/// The single format a stream offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub width: u32,
    pub height: u32,
    pub encoding: PixelEncoding,
    /// Frames per second; both duration bounds are `1 / frame_rate`.
    pub frame_rate: u32,
}

impl FormatDescriptor {
    pub fn bytes_per_row(&self) -> usize {
        self.width as usize * self.encoding.bytes_per_pixel()
    }

    /// Size in bytes of one frame in this format.
    pub fn frame_len(&self) -> usize {
        self.bytes_per_row() * self.height as usize
    }

    pub fn frame_duration(&self) -> MediaTime {
        MediaTime::new(1, self.frame_rate as i32)
    }

    pub fn min_frame_duration(&self) -> MediaTime {
        self.frame_duration()
    }

    pub fn max_frame_duration(&self) -> MediaTime {
        self.frame_duration()
    }
}

/// A synthesized frame ready for dispatch.
///
/// Frames only exist for successful conversions; the pixel buffer returns to
/// its pool when the frame is dropped.
#[derive(Debug)]
pub struct Frame {
    buffer: PixelBuffer,
    presentation: HostTime,
    state: ImageState,
    sequence: u64,
}

impl Frame {
    pub fn new(buffer: PixelBuffer, presentation: HostTime, state: ImageState, sequence: u64) -> Self {
        Self {
            buffer,
            presentation,
            state,
            sequence,
        }
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.buffer.format().width
    }

    pub fn height(&self) -> u32 {
        self.buffer.format().height
    }

    pub fn encoding(&self) -> PixelEncoding {
        self.buffer.format().encoding
    }

    /// Host clock time the frame represents.
    pub fn presentation_time(&self) -> HostTime {
        self.presentation
    }

    /// Image state the pixels were built from.
    pub fn state(&self) -> ImageState {
        self.state
    }

    /// Tick index within the streaming session that produced the frame.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True if the buffer has exactly the given format's geometry and encoding.
    pub fn matches(&self, format: &FormatDescriptor) -> bool {
        let own = self.buffer.format();
        own.width == format.width
            && own.height == format.height
            && own.encoding == format.encoding
            && self.buffer.as_bytes().len() == format.frame_len()
    }

    /// Copies the pixels into an RGBA image, keeping the stream orientation.
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        let rgba = self.encoding().decode_to_rgba(self.buffer.as_bytes());
        RgbaImage::from_raw(self.width(), self.height(), rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_to_bgra_encoding() {
        let rgba = vec![255, 0, 0, 255, 0, 255, 0, 128];
        let mut bgra = vec![0; 8];
        PixelEncoding::Bgra.encode_rgba(&rgba, &mut bgra).unwrap();

        // Red pixel
        assert_eq!(&bgra[0..4], &[0, 0, 255, 255]);
        // Green pixel keeps its alpha
        assert_eq!(&bgra[4..8], &[0, 255, 0, 128]);
        assert_eq!(PixelEncoding::Bgra.decode_to_rgba(&bgra), rgba);
    }

    #[test]
    fn test_argb_puts_alpha_first() {
        let rgba = vec![10, 20, 30, 40];
        let mut argb = vec![0; 4];
        PixelEncoding::Argb.encode_rgba(&rgba, &mut argb).unwrap();
        assert_eq!(argb, vec![40, 10, 20, 30]);
    }

    #[test]
    fn test_encode_rejects_length_mismatch() {
        let rgba = vec![0u8; 8];
        let mut dst = vec![0u8; 12];
        let err = PixelEncoding::Bgra.encode_rgba(&rgba, &mut dst).unwrap_err();
        assert!(matches!(err, ConversionError::FormatMismatch { expected: 12, actual: 8, .. }));
    }

    #[test]
    fn test_format_geometry() {
        let format = FormatDescriptor {
            width: 1080,
            height: 720,
            encoding: PixelEncoding::Bgra,
            frame_rate: 1,
        };
        assert_eq!(format.bytes_per_row(), 4320);
        assert_eq!(format.frame_len(), 4320 * 720);
        assert_eq!(format.frame_duration(), MediaTime::new(1, 1));
        assert_eq!(format.max_frame_duration().as_nanos(), 1_000_000_000);
        assert_eq!(PixelEncoding::Bgra.fourcc(), 0x4247_5241);
    }
}
