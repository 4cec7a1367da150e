//! Linux stream sink that writes frames to a v4l2loopback device.
//!
//! Requires the v4l2loopback kernel module to be loaded.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use tracing::{debug, info, warn};

use super::{StreamSink, TimedSample};
use crate::frame::{FormatDescriptor, PixelEncoding};

/// Default v4l2loopback device path.
const DEFAULT_DEVICE: &str = "/dev/video10";

// V4L2 Constants
const VIDIOC_S_FMT: u64 = 0xC0D05605; // _IOWR('V', 5, struct v4l2_format)
const V4L2_BUF_TYPE_VIDEO_OUTPUT: u32 = 2;
const V4L2_FIELD_NONE: u32 = 1;
const V4L2_COLORSPACE_SRGB: u32 = 8;

#[repr(C)]
struct v4l2_format {
    type_: u32,
    fmt: v4l2_format_union,
}

#[repr(C)]
union v4l2_format_union {
    pix: v4l2_pix_format,
    raw_data: [u8; 200],
    _align: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct v4l2_pix_format {
    width: u32,
    height: u32,
    pixelformat: u32,
    field: u32,
    bytesperline: u32,
    sizeimage: u32,
    colorspace: u32,
    priv_: u32,
    flags: u32,
    ycbcr_enc: u32,
    quantization: u32,
    xfer_func: u32,
}

/// V4L2 fourcc with the same byte order in memory as `encoding`.
fn v4l2_pixel_format(encoding: PixelEncoding) -> u32 {
    match encoding {
        PixelEncoding::Bgra => u32::from_le_bytes(*b"AR24"),
        PixelEncoding::Argb => u32::from_le_bytes(*b"BA24"),
        PixelEncoding::Rgba => u32::from_le_bytes(*b"AB24"),
    }
}

/// Configuration for the loopback sink.
#[derive(Debug, Clone)]
pub struct V4l2LoopbackConfig {
    /// Device path (e.g., /dev/video10)
    pub device: PathBuf,
    pub format: FormatDescriptor,
}

impl V4l2LoopbackConfig {
    pub fn new(format: FormatDescriptor) -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            format,
        }
    }
}

/// Stream sink backed by a v4l2loopback output device.
pub struct V4l2LoopbackSink {
    config: V4l2LoopbackConfig,
    device: File,
}

impl V4l2LoopbackSink {
    pub fn new(config: V4l2LoopbackConfig) -> Result<Self> {
        let device = Self::open_and_configure_device(&config)?;

        info!(
            "Loopback sink on {} ({}x{} {:?} @ {} fps)",
            config.device.display(),
            config.format.width,
            config.format.height,
            config.format.encoding,
            config.format.frame_rate
        );
        Ok(Self { config, device })
    }

    fn open_and_configure_device(config: &V4l2LoopbackConfig) -> Result<File> {
        let path = &config.device;
        if !path.exists() {
            bail!(
                "v4l2loopback device '{}' not found. \n\
                Make sure v4l2loopback is loaded:\n  \
                sudo modprobe v4l2loopback devices=1 video_nr=10 card_label=\"OffcutsCam\" exclusive_caps=1",
                path.display()
            );
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| anyhow!("Failed to open v4l2loopback device '{}': {}", path.display(), e))?;

        let format = &config.format;
        let pix = v4l2_pix_format {
            width: format.width,
            height: format.height,
            pixelformat: v4l2_pixel_format(format.encoding),
            field: V4L2_FIELD_NONE,
            bytesperline: format.bytes_per_row() as u32,
            sizeimage: format.frame_len() as u32,
            colorspace: V4L2_COLORSPACE_SRGB,
            priv_: 0,
            flags: 0,
            ycbcr_enc: 0,
            quantization: 0,
            xfer_func: 0,
        };
        let mut fmt = v4l2_format {
            type_: V4L2_BUF_TYPE_VIDEO_OUTPUT,
            fmt: v4l2_format_union { pix },
        };

        // SAFETY: fd is open for the lifetime of `file`, fmt is a valid v4l2_format.
        let result = unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_S_FMT as _, &mut fmt) };
        if result < 0 {
            warn!(
                "Failed to set v4l2 format: {}. Output might be incorrect.",
                std::io::Error::last_os_error()
            );
        } else {
            debug!("Set v4l2 format to {:?} {}x{}", format.encoding, format.width, format.height);
        }

        Ok(file)
    }
}

impl StreamSink for V4l2LoopbackSink {
    fn send(&mut self, sample: &TimedSample<'_>) -> Result<()> {
        if !sample.frame.matches(&self.config.format) {
            bail!("frame does not match the configured loopback format");
        }
        self.device.write_all(sample.frame.buffer().as_bytes()).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                return anyhow!("v4l2loopback buffer full");
            }
            anyhow!("Failed to write to v4l2loopback: {}", e)
        })
    }
}

impl Drop for V4l2LoopbackSink {
    fn drop(&mut self) {
        debug!("Loopback sink on {} closed", self.config.device.display());
    }
}
