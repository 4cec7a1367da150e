//! Periodic frame clock.
//!
//! The clock owns a dedicated thread that fires a tick callback immediately on
//! start and then on a fixed deadline schedule. Deadlines are computed from
//! the previous deadline, not from when the callback returned, so the period
//! does not drift. Missed deadlines are coalesced into one late tick.

mod host_time;

pub use host_time::HostTime;

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::device::Session;

/// One firing of the frame clock.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// Zero-based tick index since the clock started
    pub index: u64,
    /// Host time at which the tick fired
    pub fired_at: HostTime,
}

/// A running periodic timer. Dropping it cancels the timer.
pub struct FrameClock {
    period: Duration,
    cancel_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl FrameClock {
    /// Converts a frame rate into the clock period.
    pub fn period_for(frame_rate: u32) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(frame_rate.max(1)))
    }

    /// Starts the clock. The first tick fires immediately.
    pub fn start<F>(period: Duration, mut on_tick: F) -> io::Result<Self>
    where
        F: FnMut(Tick) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let ticks = Arc::new(AtomicU64::new(0));
        let tick_count = ticks.clone();

        let handle = thread::Builder::new()
            .name("frame-clock".to_string())
            .spawn(move || {
                raise_thread_priority();

                let mut deadline = Instant::now();
                let mut index = 0u64;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match cancel_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        // Cancelled: sender sent or dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    trace!("Frame clock tick {}", index);
                    on_tick(Tick {
                        index,
                        fired_at: HostTime::now(),
                    });
                    tick_count.fetch_add(1, Ordering::SeqCst);
                    index += 1;

                    deadline += period;
                    let now = Instant::now();
                    if deadline + period < now {
                        warn!("Frame clock fell behind by {:?}, skipping missed ticks", now - deadline);
                        deadline = now;
                    }
                }
                debug!("Frame clock stopped after {} ticks", index);
            })?;

        debug!("Frame clock started with period {:?}", period);
        Ok(Self {
            period,
            cancel_tx: Some(cancel_tx),
            handle: Some(handle),
            ticks,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of ticks that have completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the clock. No tick fires after this returns, unless called from
    /// within a tick, in which case the clock exits once that tick completes.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(cancel_tx) = self.cancel_tx.take() else {
            return;
        };
        let _ = cancel_tx.send(());
        drop(cancel_tx);

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Cancelled from our own tick; the loop exits on its own.
                return;
            }
            if handle.join().is_err() {
                warn!("Frame clock thread panicked");
            }
        }
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Session for FrameClock {
    fn cancel(self) {
        self.stop();
    }
}

#[cfg(target_os = "macos")]
fn raise_thread_priority() {
    // SAFETY: only adjusts the QoS class of the calling thread.
    let result = unsafe {
        libc::pthread_set_qos_class_self_np(libc::qos_class_t::QOS_CLASS_USER_INTERACTIVE, 0)
    };
    if result != 0 {
        debug!("Could not raise frame clock QoS (error {})", result);
    }
}

#[cfg(not(target_os = "macos"))]
fn raise_thread_priority() {}
