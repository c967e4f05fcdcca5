//! Multitx - multi-channel NBFM composite synthesizer
//!
//! This library re-exports the signal chain, configuration, output sinks
//! and statistics from `multitx-core`.

pub use multitx_core::audio;
pub use multitx_core::config;
pub use multitx_core::dsp;
pub use multitx_core::output;
pub use multitx_core::pipeline;
pub use multitx_core::session;
pub use multitx_core::stats;

pub use multitx_core::{
    ChannelConfig, ClockMode, Complex, ConfigError, IqSink, SessionConfig, SessionError,
    SessionHandle, SessionStats, SinkError, SinkSettings, StatsSnapshot, Transmitter,
    TransmitterConfig,
};
pub use multitx_core::{
    BUILD_DATE, DEFAULT_AUDIO_SAMPLE_RATE, DEFAULT_DEVIATION_HZ, DEFAULT_TX_SAMPLE_RATE,
    PCM_FRAME_SIZE, VERSION,
};
