//! Consumer reference counting around one shared frame producer.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// A running frame producer. Cancelling it releases its timer.
pub trait Session: Send {
    fn cancel(self);
}

/// Builds a fresh producer for a streaming session.
pub trait SessionFactory: Send + Sync {
    type Session: Session;

    /// Loads whatever the session needs and starts it.
    ///
    /// `None` means the session could not be started (missing asset, failed
    /// conversion); the failure has already been logged.
    fn launch(&self) -> Option<Self::Session>;
}

/// Observable phase of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingPhase {
    /// No consumers, no clock.
    Idle,
    /// Consumers attached and the clock is running.
    Streaming,
    /// Consumers attached but the last launch failed, so no frames flow.
    Degraded,
}

struct Lifecycle<S> {
    counter: u32,
    session: Option<S>,
}

/// Starts the producer for the first consumer and stops it after the last.
///
/// All transitions happen under one lock, so `start`, `stop` and `restart`
/// may be called from any thread.
pub struct StreamingStateMachine<F: SessionFactory> {
    factory: F,
    lifecycle: Mutex<Lifecycle<F::Session>>,
}

impl<F: SessionFactory> StreamingStateMachine<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            lifecycle: Mutex::new(Lifecycle {
                counter: 0,
                session: None,
            }),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Registers a consumer. Returns the new consumer count.
    pub fn start(&self) -> u32 {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.counter = lifecycle.counter.saturating_add(1);

        if lifecycle.counter == 1 {
            if let Some(stale) = lifecycle.session.take() {
                stale.cancel();
            }
            lifecycle.session = self.factory.launch();
            match lifecycle.session {
                Some(_) => info!("Streaming started"),
                None => warn!("Streaming requested but no frame source could be started"),
            }
        } else {
            debug!("Consumer attached, {} active", lifecycle.counter);
        }
        lifecycle.counter
    }

    /// Unregisters a consumer. Returns the new consumer count.
    ///
    /// Extra calls are clamped at zero and never cancel twice.
    pub fn stop(&self) -> u32 {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.counter > 1 {
            lifecycle.counter -= 1;
            debug!("Consumer detached, {} still active", lifecycle.counter);
            return lifecycle.counter;
        }

        lifecycle.counter = 0;
        if let Some(session) = lifecycle.session.take() {
            session.cancel();
            info!("Streaming stopped");
        }
        0
    }

    /// Tears the producer down and launches a new one, keeping the consumer
    /// count. While idle there is nothing to restart and this does nothing.
    pub fn restart(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.counter == 0 {
            debug!("Restart requested while idle, nothing to do");
            return;
        }

        if let Some(session) = lifecycle.session.take() {
            session.cancel();
        }
        lifecycle.session = self.factory.launch();
        match lifecycle.session {
            Some(_) => info!("Streaming restarted for {} consumer(s)", lifecycle.counter),
            None => warn!("Streaming restart failed, stream stays empty until the next restart"),
        }
    }

    pub fn counter(&self) -> u32 {
        self.lifecycle.lock().counter
    }

    /// True while a producer session is running.
    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().session.is_some()
    }

    pub fn phase(&self) -> StreamingPhase {
        let lifecycle = self.lifecycle.lock();
        match (lifecycle.counter, lifecycle.session.is_some()) {
            (0, _) => StreamingPhase::Idle,
            (_, true) => StreamingPhase::Streaming,
            (_, false) => StreamingPhase::Degraded,
        }
    }
}
