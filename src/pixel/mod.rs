//! Pixel buffers: pooling and image conversion.

mod converter;
mod pool;

pub use converter::{mirror_horizontal, PixelBufferConverter, PreparedImage};
pub use pool::{BufferPool, PixelBuffer, PixelBufferLock};
