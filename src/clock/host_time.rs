//! Monotonic host clock used for presentation timestamps.

use std::fmt;

/// Nanoseconds on the monotonic host clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostTime(u64);

impl HostTime {
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Reads the host clock.
    ///
    /// macOS uses `CLOCK_UPTIME_RAW`, the clock CoreMedia's host time clock is
    /// based on. Linux uses `CLOCK_MONOTONIC`.
    #[cfg(any(target_os = "macos", target_os = "linux"))]
    pub fn now() -> Self {
        #[cfg(target_os = "macos")]
        const CLOCK: libc::clockid_t = libc::CLOCK_UPTIME_RAW;
        #[cfg(target_os = "linux")]
        const CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;

        let mut time_info = libc::timespec { tv_sec: 0, tv_nsec: 0 };
        // SAFETY: time_info is a valid, writable timespec.
        unsafe { libc::clock_gettime(CLOCK, &mut time_info) };
        let ns = time_info.tv_sec as u64 * 1_000_000_000 + time_info.tv_nsec as u64;
        Self(ns)
    }

    /// Reads the host clock, measured from the first call in this process.
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    pub fn now() -> Self {
        use std::sync::OnceLock;
        use std::time::Instant;

        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        let origin = ORIGIN.get_or_init(Instant::now);
        // Zero means "no timestamp"
        Self(origin.elapsed().as_nanos() as u64 + 1)
    }

    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }
}

impl fmt::Display for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}
