//! Observer mode: frames go to an in-process callback on a worker thread.

use std::io;
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::{OutputBackend, OutputMode};
use crate::error::DeliveryError;
use crate::frame::Frame;

type Callback = Box<dyn FnMut(Frame) + Send>;

/// Single-slot frame callback. Setting a new callback replaces the old one.
///
/// The callback runs with the slot locked, so it must not call back into
/// the same observer.
#[derive(Clone, Default)]
pub struct FrameObserver {
    slot: Arc<Mutex<Option<Callback>>>,
}

impl FrameObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<F>(&self, callback: F)
    where
        F: FnMut(Frame) + Send + 'static,
    {
        *self.slot.lock() = Some(Box::new(callback));
    }

    pub fn clear(&self) {
        self.slot.lock().take();
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Hands `frame` to the callback. Returns false if none is set.
    fn notify(&self, frame: Frame) -> bool {
        match self.slot.lock().as_mut() {
            Some(callback) => {
                callback(frame);
                true
            }
            None => false,
        }
    }
}

/// Output that queues frames for a [`FrameObserver`].
///
/// The queue is bounded. A full queue drops the new frame instead of
/// stalling the frame clock.
pub struct ObserverOutput {
    tx: Option<SyncSender<Frame>>,
    handle: Option<JoinHandle<()>>,
    observer: FrameObserver,
}

impl ObserverOutput {
    pub const DEFAULT_QUEUE_DEPTH: usize = 2;

    pub fn new(observer: FrameObserver, queue_depth: usize) -> io::Result<Self> {
        let (tx, rx) = sync_channel::<Frame>(queue_depth.max(1));
        let worker = observer.clone();

        let handle = thread::Builder::new()
            .name("frame-observer".to_string())
            .spawn(move || {
                while let Ok(frame) = rx.recv() {
                    let sequence = frame.sequence();
                    if !worker.notify(frame) {
                        trace!("No observer set, frame {} discarded", sequence);
                    }
                }
                debug!("Frame observer worker stopped");
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            observer,
        })
    }

    pub fn observer(&self) -> &FrameObserver {
        &self.observer
    }
}

impl OutputBackend for ObserverOutput {
    fn deliver(&mut self, frame: Frame) -> Result<(), DeliveryError> {
        let tx = self.tx.as_ref().ok_or(DeliveryError::ObserverGone)?;
        tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::ObserverBusy,
            TrySendError::Disconnected(_) => DeliveryError::ObserverGone,
        })
    }

    fn mode(&self) -> OutputMode {
        OutputMode::Observer
    }
}

impl Drop for ObserverOutput {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Frame observer thread panicked");
            }
        }
    }
}
