//! Fixed-capacity pool of frame-sized pixel buffers.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::PoolError;
use crate::frame::FormatDescriptor;

struct PoolShared {
    format: FormatDescriptor,
    capacity: usize,
    free: Mutex<Vec<Box<[u8]>>>,
}

/// Pre-allocated pixel buffers matching one stream format.
///
/// Checkout never allocates and never waits: when every buffer is in flight
/// it fails with [`PoolError::Exhausted`]. Buffers go back to the pool when
/// the [`PixelBuffer`] is dropped.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    pub fn new(format: FormatDescriptor, capacity: usize) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        if format.frame_len() == 0 {
            return Err(PoolError::EmptyFormat {
                width: format.width,
                height: format.height,
            });
        }

        let free = (0..capacity)
            .map(|_| vec![0u8; format.frame_len()].into_boxed_slice())
            .collect();
        debug!(
            "Allocated {} pixel buffers of {}x{} {:?}",
            capacity, format.width, format.height, format.encoding
        );

        Ok(Self {
            shared: Arc::new(PoolShared {
                format,
                capacity,
                free: Mutex::new(free),
            }),
        })
    }

    pub fn format(&self) -> &FormatDescriptor {
        &self.shared.format
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Buffers currently checked out.
    pub fn in_flight(&self) -> usize {
        self.shared.capacity - self.shared.free.lock().len()
    }

    /// Takes a buffer out of the pool.
    pub fn checkout(&self) -> Result<PixelBuffer, PoolError> {
        let data = self.shared.free.lock().pop().ok_or(PoolError::Exhausted {
            capacity: self.shared.capacity,
        })?;
        Ok(PixelBuffer {
            data,
            locked: false,
            pool: self.shared.clone(),
        })
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("format", &self.shared.format)
            .field("capacity", &self.shared.capacity)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// A pooled, frame-sized pixel buffer.
pub struct PixelBuffer {
    data: Box<[u8]>,
    locked: bool,
    pool: Arc<PoolShared>,
}

impl PixelBuffer {
    pub fn format(&self) -> &FormatDescriptor {
        &self.pool.format
    }

    pub fn bytes_per_row(&self) -> usize {
        self.pool.format.bytes_per_row()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Read access to the pixel bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Locks the buffer for writing. The lock is released when the guard drops.
    pub fn lock(&mut self) -> PixelBufferLock<'_> {
        self.locked = true;
        PixelBufferLock { buffer: self }
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.pool.format.width)
            .field("height", &self.pool.format.height)
            .field("encoding", &self.pool.format.encoding)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Drop for PixelBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.free.lock().push(data);
    }
}

/// Write access to a locked [`PixelBuffer`].
pub struct PixelBufferLock<'a> {
    buffer: &'a mut PixelBuffer,
}

impl Deref for PixelBufferLock<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buffer.data
    }
}

impl DerefMut for PixelBufferLock<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.data
    }
}

impl Drop for PixelBufferLock<'_> {
    fn drop(&mut self) {
        self.buffer.locked = false;
    }
}
