//! Builds streaming sessions: load the active asset, convert it once, then
//! stamp and dispatch one pooled frame per clock tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::assets::{AssetBundle, ImageState};
use crate::clock::{FrameClock, Tick};
use crate::device::streaming::SessionFactory;
use crate::frame::Frame;
use crate::output::OutputBackend;
use crate::pixel::{BufferPool, PixelBufferConverter, PreparedImage};

/// Frame counters across all sessions of a device.
#[derive(Debug, Default)]
pub struct PipelineStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
}

impl PipelineStats {
    /// Frames the output accepted.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Ticks that produced no frame because conversion or delivery failed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Ticks skipped because the image state changed under a running session.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

pub type SharedOutput = Arc<Mutex<Box<dyn OutputBackend>>>;

/// Session factory that drives a [`FrameClock`] from still images.
pub struct FramePipeline {
    assets: AssetBundle,
    converter: PixelBufferConverter,
    pool: BufferPool,
    output: SharedOutput,
    state: Arc<Mutex<ImageState>>,
    period: Duration,
    stats: Arc<PipelineStats>,
}

impl FramePipeline {
    pub fn new(
        assets: AssetBundle,
        converter: PixelBufferConverter,
        pool: BufferPool,
        output: SharedOutput,
        state: Arc<Mutex<ImageState>>,
    ) -> Self {
        let period = FrameClock::period_for(converter.format().frame_rate);
        Self {
            assets,
            converter,
            pool,
            output,
            state,
            period,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    fn prepare(&self, state: ImageState) -> Option<PreparedImage> {
        let image = self.assets.load(state).ok()?;
        match self.converter.prepare(&image, state) {
            Ok(prepared) => Some(prepared),
            Err(e) => {
                warn!("Could not convert {} image: {}", state, e);
                None
            }
        }
    }
}

impl SessionFactory for FramePipeline {
    type Session = FrameClock;

    fn launch(&self) -> Option<FrameClock> {
        let state = *self.state.lock();
        let prepared = self.prepare(state)?;

        let mut emitter = FrameEmitter {
            prepared,
            converter: self.converter.clone(),
            pool: self.pool.clone(),
            output: self.output.clone(),
            state: self.state.clone(),
            stats: self.stats.clone(),
        };

        match FrameClock::start(self.period, move |tick| emitter.emit(tick)) {
            Ok(clock) => {
                debug!("Frame clock launched for {} image", state);
                Some(clock)
            }
            Err(e) => {
                error!("Could not start frame clock thread: {}", e);
                None
            }
        }
    }
}

/// Per-session state owned by the clock thread.
struct FrameEmitter {
    prepared: PreparedImage,
    converter: PixelBufferConverter,
    pool: BufferPool,
    output: SharedOutput,
    state: Arc<Mutex<ImageState>>,
    stats: Arc<PipelineStats>,
}

impl FrameEmitter {
    fn emit(&mut self, tick: Tick) {
        // A toggle replaces this session shortly; never emit the old image after it.
        let current = *self.state.lock();
        if current != self.prepared.state() {
            debug!("Skipping tick {}, image state is now {}", tick.index, current);
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let buffer = match self.converter.draw(&self.prepared, &self.pool) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Dropping tick {}: {}", tick.index, e);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let frame = Frame::new(buffer, tick.fired_at, current, tick.index);
        match self.output.lock().deliver(frame) {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Frame {} not delivered: {}", tick.index, e);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
