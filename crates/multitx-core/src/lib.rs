//! Multitx Core - NBFM signal chain, combiner, and output sinks
//!
//! This library turns several independent audio playlists into one composite
//! complex-baseband waveform for narrowband FM transmission by an SDR. Each
//! channel runs its own decode → resample → gate → tone → modulate → shift
//! chain; the channels meet only in the combiner, which feeds an output sink.

pub mod audio;
pub mod config;
pub mod dsp;
pub mod output;
pub mod pipeline;
pub mod session;
pub mod stats;

pub use config::{ChannelConfig, ConfigError, SessionConfig, TransmitterConfig};
pub use output::sink::{IqSink, SinkError, SinkSettings};
pub use session::{ClockMode, SessionError, SessionHandle, Transmitter};
pub use stats::{SessionStats, StatsSnapshot};

/// Complex baseband sample type used throughout the signal chain
pub use rustfft::num_complex::Complex;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default transmit (RF baseband) sample rate in Hz
pub const DEFAULT_TX_SAMPLE_RATE: u32 = 2_000_000;

/// Default common audio/modulation sample rate in Hz
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Default full-scale FM deviation in Hz
pub const DEFAULT_DEVIATION_HZ: f64 = 3_000.0;

/// Samples per decoded PCM frame handed out by a playlist
pub const PCM_FRAME_SIZE: usize = 4096;
