//! Output stage
//!
//! - Sink trait, live driver channel, tee and null sinks ([`sink`])
//! - Signed 8-bit IQ capture with JSON manifest ([`capture`])

pub mod capture;
pub mod sink;

pub use capture::{CaptureManifest, CaptureSink};
pub use sink::{
    live_sink, IqSink, LiveSink, LiveSinkReceiver, NullSink, SinkError, SinkEvent, SinkSettings,
    TeeSink,
};
