//! Sink mode: frames become timed samples sent to a stream sink.

use std::fmt;

use anyhow::Result;
use tracing::trace;

use super::{OutputBackend, OutputMode};
use crate::error::DeliveryError;
use crate::frame::{FormatDescriptor, Frame, MediaTime};

/// Discontinuity flags carried with each sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Discontinuity(u32);

impl Discontinuity {
    pub const NONE: Self = Self(0);
    pub const UNKNOWN: Self = Self(1);
    pub const TIME: Self = Self(1 << 1);
    pub const SAMPLE_DROPPED: Self = Self(1 << 6);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Discontinuity {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A frame packaged with its timing for a stream sink.
pub struct TimedSample<'a> {
    pub frame: &'a Frame,
    pub discontinuity: Discontinuity,
    /// Presentation time on the host clock, in nanoseconds
    pub host_time_ns: u64,
    pub duration: MediaTime,
}

impl fmt::Debug for TimedSample<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedSample")
            .field("sequence", &self.frame.sequence())
            .field("state", &self.frame.state())
            .field("discontinuity", &self.discontinuity)
            .field("host_time_ns", &self.host_time_ns)
            .finish()
    }
}

/// Destination for timed samples, such as a host's stream queue or a
/// loopback video device.
pub trait StreamSink: Send {
    fn send(&mut self, sample: &TimedSample<'_>) -> Result<()>;
}

impl<S: StreamSink + ?Sized> StreamSink for Box<S> {
    fn send(&mut self, sample: &TimedSample<'_>) -> Result<()> {
        (**self).send(sample)
    }
}

/// Packages frames for one stream format and sends them to a sink.
pub struct SinkOutput<S> {
    sink: S,
    format: FormatDescriptor,
}

impl<S: StreamSink> SinkOutput<S> {
    pub fn new(sink: S, format: FormatDescriptor) -> Self {
        Self { sink, format }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Wraps a frame as a sample with no discontinuity.
    pub fn package<'a>(&self, frame: &'a Frame) -> Result<TimedSample<'a>, DeliveryError> {
        if !frame.matches(&self.format) {
            return Err(DeliveryError::Packaging(format!(
                "frame is {}x{} {:?}, stream expects {}x{} {:?}",
                frame.width(),
                frame.height(),
                frame.encoding(),
                self.format.width,
                self.format.height,
                self.format.encoding
            )));
        }
        let host_time_ns = frame.presentation_time().as_nanos();
        if host_time_ns == 0 {
            return Err(DeliveryError::Packaging("frame has no presentation time".to_string()));
        }

        Ok(TimedSample {
            frame,
            discontinuity: Discontinuity::NONE,
            host_time_ns,
            duration: self.format.frame_duration(),
        })
    }
}

impl<S: StreamSink> OutputBackend for SinkOutput<S> {
    fn deliver(&mut self, frame: Frame) -> Result<(), DeliveryError> {
        let sample = self.package(&frame)?;
        trace!("Sending sample {:?}", sample);
        self.sink
            .send(&sample)
            .map_err(|e| DeliveryError::Sink(format!("{:#}", e)))
    }

    fn mode(&self) -> OutputMode {
        OutputMode::Sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ImageState;
    use crate::clock::HostTime;
    use crate::frame::PixelEncoding;
    use crate::pixel::BufferPool;

    fn format(width: u32) -> FormatDescriptor {
        FormatDescriptor {
            width,
            height: 2,
            encoding: PixelEncoding::Bgra,
            frame_rate: 1,
        }
    }

    #[derive(Default)]
    struct Recorder {
        samples: Vec<(u64, u64, Discontinuity)>,
        fail: bool,
    }

    impl StreamSink for Recorder {
        fn send(&mut self, sample: &TimedSample<'_>) -> Result<()> {
            if self.fail {
                anyhow::bail!("queue full");
            }
            self.samples
                .push((sample.frame.sequence(), sample.host_time_ns, sample.discontinuity));
            Ok(())
        }
    }

    #[test]
    fn test_frames_are_sent_with_host_timestamp() {
        let pool = BufferPool::new(format(2), 1).unwrap();
        let mut output = SinkOutput::new(Recorder::default(), format(2));

        let frame = Frame::new(pool.checkout().unwrap(), HostTime::from_nanos(42), ImageState::Clear, 3);
        output.deliver(frame).unwrap();

        assert_eq!(output.sink().samples, vec![(3, 42, Discontinuity::NONE)]);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_mismatched_frame_fails_packaging() {
        let pool = BufferPool::new(format(4), 1).unwrap();
        let mut output = SinkOutput::new(Recorder::default(), format(2));

        let frame = Frame::new(pool.checkout().unwrap(), HostTime::from_nanos(1), ImageState::Clear, 0);
        let err = output.deliver(frame).unwrap_err();
        assert!(matches!(err, DeliveryError::Packaging(_)));
        assert!(output.sink().samples.is_empty());
    }

    #[test]
    fn test_sink_failure_is_reported() {
        let pool = BufferPool::new(format(2), 1).unwrap();
        let recorder = Recorder {
            fail: true,
            ..Default::default()
        };
        let mut output = SinkOutput::new(recorder, format(2));

        let frame = Frame::new(pool.checkout().unwrap(), HostTime::from_nanos(1), ImageState::Clear, 0);
        match output.deliver(frame) {
            Err(DeliveryError::Sink(message)) => assert!(message.contains("queue full")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_discontinuity_flags() {
        let flags = Discontinuity::TIME | Discontinuity::SAMPLE_DROPPED;
        assert!(flags.contains(Discontinuity::TIME));
        assert!(!flags.contains(Discontinuity::UNKNOWN));
        assert!(Discontinuity::NONE.is_empty());
        assert_eq!(Discontinuity::default(), Discontinuity::NONE);
    }
}
