//! Session configuration
//!
//! A session is described by one [`SessionConfig`] JSON document holding the
//! shared [`TransmitterConfig`] and one [`ChannelConfig`] per channel. The
//! document is loaded and validated once before streaming starts and is
//! read-only for the rest of the session.

use crate::dsp::tone::DcsCode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fraction of the transmit sample rate usable on each side of the center
pub const USABLE_BANDWIDTH_FRACTION: f64 = 0.45;

/// Highest frequency accepted as a sub-audible CTCSS tone
pub const MAX_CTCSS_HZ: f64 = 300.0;

/// Standard DCS/CDCSS bit rate
pub const DEFAULT_DCS_BAUD: f64 = 134.4;

/// Default tone amplitude as a fraction of full-scale modulation
pub const DEFAULT_TONE_LEVEL: f32 = 0.2;

/// Errors detected while loading or validating a session configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read session config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse session config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("At least one channel must be configured")]
    NoChannels,

    #[error("Channel id {0} is used more than once")]
    DuplicateChannel(u32),

    #[error("Invalid {name}: {value} Hz")]
    InvalidSampleRate { name: &'static str, value: u32 },

    #[error("Transmit sample rate {tx} Hz is below the audio sample rate {audio} Hz")]
    TxRateBelowAudioRate { tx: u32, audio: u32 },

    #[error("Invalid transmitter setting {name}: {value}")]
    InvalidSetting { name: &'static str, value: f64 },

    #[error("Channel {channel}: invalid {name}: {value}")]
    InvalidChannelValue {
        channel: u32,
        name: &'static str,
        value: f64,
    },

    #[error(
        "Channel {channel}: offset {offset_hz} Hz does not fit the usable span (|offset| <= {limit_hz} Hz)"
    )]
    OffsetOutOfRange {
        channel: u32,
        offset_hz: f64,
        limit_hz: f64,
    },

    #[error("Channel {channel}: invalid tone settings: {reason}")]
    InvalidTone { channel: u32, reason: String },

    #[error("Invalid DCS code '{code}': {reason}")]
    InvalidDcsCode { code: String, reason: String },

    #[error("Channel {channel}: gate close threshold {close} exceeds open threshold {open}")]
    GateThresholds { channel: u32, open: f32, close: f32 },

    #[error("Channel {channel}: invalid gate setting {name}: {value}")]
    InvalidGate {
        channel: u32,
        name: &'static str,
        value: f64,
    },
}

fn default_tx_sample_rate() -> u32 {
    crate::DEFAULT_TX_SAMPLE_RATE
}

fn default_audio_sample_rate() -> u32 {
    crate::DEFAULT_AUDIO_SAMPLE_RATE
}

fn default_deviation_hz() -> f64 {
    crate::DEFAULT_DEVIATION_HZ
}

fn default_master_scale() -> f32 {
    0.6
}

fn default_tx_gain_db() -> f32 {
    10.0
}

fn default_block_size() -> usize {
    16_384
}

fn default_decoder_timeout_ms() -> u64 {
    500
}

fn default_queue_seconds() -> f32 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_unity() -> f32 {
    1.0
}

fn default_dcs_baud() -> f64 {
    DEFAULT_DCS_BAUD
}

/// Shared transmitter settings, immutable for the lifetime of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitterConfig {
    /// RF center frequency the sink is tuned to (Hz)
    pub center_frequency_hz: f64,
    /// Composite output sample rate (Hz)
    #[serde(default = "default_tx_sample_rate")]
    pub tx_sample_rate: u32,
    /// Common audio/modulation sample rate (Hz)
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,
    /// Full-scale FM deviation (Hz), unless a channel overrides it
    #[serde(default = "default_deviation_hz")]
    pub deviation_hz: f64,
    /// Composite amplitude scale
    #[serde(default = "default_master_scale")]
    pub master_scale: f32,
    /// Gain handed to the sink (dB)
    #[serde(default = "default_tx_gain_db")]
    pub tx_gain_db: f32,
    /// Divide the master scale by the total mix weight (at least 1)
    #[serde(default = "default_true")]
    pub normalize_mix: bool,
    /// Composite samples per sink push
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// How long a capture-mode block waits for a lagging decoder
    #[serde(default = "default_decoder_timeout_ms")]
    pub decoder_timeout_ms: u64,
    /// Depth of each channel's decoded audio queue (seconds)
    #[serde(default = "default_queue_seconds")]
    pub queue_seconds: f32,
}

impl TransmitterConfig {
    /// Transmitter settings with defaults around the given center frequency
    pub fn new(center_frequency_hz: f64) -> Self {
        Self {
            center_frequency_hz,
            tx_sample_rate: default_tx_sample_rate(),
            audio_sample_rate: default_audio_sample_rate(),
            deviation_hz: default_deviation_hz(),
            master_scale: default_master_scale(),
            tx_gain_db: default_tx_gain_db(),
            normalize_mix: true,
            block_size: default_block_size(),
            decoder_timeout_ms: default_decoder_timeout_ms(),
            queue_seconds: default_queue_seconds(),
        }
    }

    /// Largest usable distance from the center frequency (Hz)
    pub fn usable_span_hz(&self) -> f64 {
        self.tx_sample_rate as f64 * USABLE_BANDWIDTH_FRACTION
    }

    /// Capacity of one channel's audio queue in samples
    pub fn queue_capacity(&self) -> usize {
        ((self.audio_sample_rate as f32 * self.queue_seconds) as usize).max(crate::PCM_FRAME_SIZE)
    }
}

/// Where a channel sits in the spectrum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencySpec {
    /// Offset from the shared center frequency (Hz)
    OffsetHz(f64),
    /// Absolute RF frequency (Hz)
    AbsoluteHz(f64),
}

/// How loud a squelch tone is
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneLevel {
    /// Fraction of full-scale modulation
    Fraction(f32),
    /// Target deviation contributed by the tone (Hz)
    DeviationHz(f64),
}

impl Default for ToneLevel {
    fn default() -> Self {
        ToneLevel::Fraction(DEFAULT_TONE_LEVEL)
    }
}

impl ToneLevel {
    /// Normalized amplitude for a channel with the given full-scale deviation
    pub fn amplitude(&self, deviation_hz: f64) -> f32 {
        match *self {
            ToneLevel::Fraction(level) => level,
            ToneLevel::DeviationHz(hz) => (hz / deviation_hz) as f32,
        }
    }
}

/// CTCSS tone settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtcssConfig {
    pub frequency_hz: f64,
    #[serde(default)]
    pub level: ToneLevel,
}

/// DCS/CDCSS code settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcsConfig {
    /// Octal code with optional `D` prefix and `N`/`I` suffix, e.g. `D023N`
    pub code: String,
    #[serde(default = "default_dcs_baud")]
    pub baud_rate: f64,
    #[serde(default)]
    pub level: ToneLevel,
    /// Complement every other repetition of the code word
    #[serde(default = "default_true")]
    pub alternate_polarity: bool,
}

/// Sub-audible signalling for a channel; at most one kind is active
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneConfig {
    #[default]
    None,
    Ctcss(CtcssConfig),
    Dcs(DcsConfig),
}

/// Whether the squelch tone follows the channel's audio gain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneScaling {
    /// Tone is injected at its configured level regardless of gain
    #[default]
    Fixed,
    /// Tone is multiplied by the channel gain along with the audio
    ChannelGain,
}

/// Audio activity gate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub enabled: bool,
    /// RMS at or above which the gate opens
    pub open_threshold: f32,
    /// RMS below which the gate closes
    pub close_threshold: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    /// Length of the sliding RMS window
    pub analysis_ms: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            open_threshold: 0.015,
            close_threshold: 0.014,
            attack_ms: 4.0,
            release_ms: 200.0,
            analysis_ms: 1000.0,
        }
    }
}

/// Per-channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: u32,
    /// Ordered audio files
    #[serde(default)]
    pub playlist: Vec<PathBuf>,
    /// Restart the playlist after the last entry instead of going silent
    #[serde(default = "default_true")]
    pub loop_playlist: bool,
    /// Linear audio gain applied before modulation
    #[serde(default = "default_unity")]
    pub gain: f32,
    /// Linear weight of this channel in the composite
    #[serde(default = "default_unity")]
    pub mix_weight: f32,
    pub frequency: FrequencySpec,
    /// Full-scale deviation override (Hz)
    #[serde(default)]
    pub deviation_hz: Option<f64>,
    #[serde(default)]
    pub tone: ToneConfig,
    #[serde(default)]
    pub tone_scaling: ToneScaling,
    #[serde(default)]
    pub gate: GateConfig,
}

impl ChannelConfig {
    /// Channel with default settings and an empty playlist
    pub fn new(id: u32, frequency: FrequencySpec) -> Self {
        Self {
            id,
            playlist: Vec::new(),
            loop_playlist: true,
            gain: 1.0,
            mix_weight: 1.0,
            frequency,
            deviation_hz: None,
            tone: ToneConfig::None,
            tone_scaling: ToneScaling::Fixed,
            gate: GateConfig::default(),
        }
    }

    /// Baseband offset of this channel from the shared center (Hz)
    pub fn offset_hz(&self, tx: &TransmitterConfig) -> f64 {
        match self.frequency {
            FrequencySpec::OffsetHz(offset) => offset,
            FrequencySpec::AbsoluteHz(freq) => freq - tx.center_frequency_hz,
        }
    }

    /// Absolute RF frequency of this channel (Hz)
    pub fn rf_frequency_hz(&self, tx: &TransmitterConfig) -> f64 {
        tx.center_frequency_hz + self.offset_hz(tx)
    }

    /// Effective full-scale deviation (Hz)
    pub fn deviation_hz(&self, tx: &TransmitterConfig) -> f64 {
        self.deviation_hz.unwrap_or(tx.deviation_hz)
    }

    fn validate(&self, tx: &TransmitterConfig) -> Result<(), ConfigError> {
        let channel = self.id;
        let bad_value = |name: &'static str, value: f64| ConfigError::InvalidChannelValue {
            channel,
            name,
            value,
        };

        if !self.gain.is_finite() || self.gain < 0.0 {
            return Err(bad_value("gain", self.gain as f64));
        }
        if !self.mix_weight.is_finite() || self.mix_weight < 0.0 {
            return Err(bad_value("mix weight", self.mix_weight as f64));
        }

        let deviation = self.deviation_hz(tx);
        if !deviation.is_finite() || deviation <= 0.0 {
            return Err(bad_value("deviation", deviation));
        }

        let offset = self.offset_hz(tx);
        if !offset.is_finite() {
            return Err(bad_value("frequency offset", offset));
        }
        let limit = tx.usable_span_hz() - deviation;
        if offset.abs() > limit {
            return Err(ConfigError::OffsetOutOfRange {
                channel,
                offset_hz: offset,
                limit_hz: limit.max(0.0),
            });
        }

        self.validate_tone(tx, deviation)?;
        self.validate_gate()
    }

    fn validate_tone(&self, tx: &TransmitterConfig, deviation: f64) -> Result<(), ConfigError> {
        let channel = self.id;
        let check_level = |level: &ToneLevel| {
            let amplitude = level.amplitude(deviation);
            if amplitude.is_finite() && amplitude > 0.0 && amplitude <= 1.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidTone {
                    channel,
                    reason: format!("tone amplitude {amplitude} is outside (0, 1]"),
                })
            }
        };

        match &self.tone {
            ToneConfig::None => Ok(()),
            ToneConfig::Ctcss(ctcss) => {
                if !(ctcss.frequency_hz > 0.0 && ctcss.frequency_hz <= MAX_CTCSS_HZ) {
                    return Err(ConfigError::InvalidTone {
                        channel,
                        reason: format!(
                            "CTCSS frequency {} Hz is outside (0, {MAX_CTCSS_HZ}]",
                            ctcss.frequency_hz
                        ),
                    });
                }
                check_level(&ctcss.level)
            }
            ToneConfig::Dcs(dcs) => {
                DcsCode::parse(&dcs.code).map_err(|e| ConfigError::InvalidTone {
                    channel,
                    reason: e.to_string(),
                })?;
                let max_baud = tx.audio_sample_rate as f64 / 4.0;
                if !(dcs.baud_rate > 0.0 && dcs.baud_rate <= max_baud) {
                    return Err(ConfigError::InvalidTone {
                        channel,
                        reason: format!("DCS baud rate {} is outside (0, {max_baud}]", dcs.baud_rate),
                    });
                }
                check_level(&dcs.level)
            }
        }
    }

    fn validate_gate(&self) -> Result<(), ConfigError> {
        let channel = self.id;
        let gate = &self.gate;
        let non_negative = |name: &'static str, value: f32| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidGate {
                    channel,
                    name,
                    value: value as f64,
                })
            }
        };

        non_negative("open_threshold", gate.open_threshold)?;
        non_negative("close_threshold", gate.close_threshold)?;
        non_negative("attack_ms", gate.attack_ms)?;
        non_negative("release_ms", gate.release_ms)?;
        if !(gate.analysis_ms.is_finite() && gate.analysis_ms > 0.0) {
            return Err(ConfigError::InvalidGate {
                channel,
                name: "analysis_ms",
                value: gate.analysis_ms as f64,
            });
        }
        if gate.close_threshold > gate.open_threshold {
            return Err(ConfigError::GateThresholds {
                channel,
                open: gate.open_threshold,
                close: gate.close_threshold,
            });
        }
        Ok(())
    }
}

/// Complete, validated description of a transmit session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub transmitter: TransmitterConfig,
    pub channels: Vec<ChannelConfig>,
}

impl SessionConfig {
    /// Load a session from a JSON file and validate it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&contents)?;
        tracing::info!(
            path = %path.display(),
            channels = config.channels.len(),
            "Loaded session config"
        );
        Ok(config)
    }

    /// Parse a session from JSON text and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting before streaming starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tx = &self.transmitter;

        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        if tx.audio_sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate {
                name: "audio sample rate",
                value: tx.audio_sample_rate,
            });
        }
        if tx.tx_sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate {
                name: "transmit sample rate",
                value: tx.tx_sample_rate,
            });
        }
        if tx.tx_sample_rate < tx.audio_sample_rate {
            return Err(ConfigError::TxRateBelowAudioRate {
                tx: tx.tx_sample_rate,
                audio: tx.audio_sample_rate,
            });
        }
        if !tx.center_frequency_hz.is_finite() || tx.center_frequency_hz < 0.0 {
            return Err(ConfigError::InvalidSetting {
                name: "center_frequency_hz",
                value: tx.center_frequency_hz,
            });
        }
        if !(tx.deviation_hz.is_finite() && tx.deviation_hz > 0.0) {
            return Err(ConfigError::InvalidSetting {
                name: "deviation_hz",
                value: tx.deviation_hz,
            });
        }
        if !(tx.master_scale > 0.0 && tx.master_scale <= 4.0) {
            return Err(ConfigError::InvalidSetting {
                name: "master_scale",
                value: tx.master_scale as f64,
            });
        }
        if tx.block_size == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "block_size",
                value: 0.0,
            });
        }
        if !(tx.queue_seconds.is_finite() && tx.queue_seconds > 0.0) {
            return Err(ConfigError::InvalidSetting {
                name: "queue_seconds",
                value: tx.queue_seconds as f64,
            });
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.id) {
                return Err(ConfigError::DuplicateChannel(channel.id));
            }
            channel.validate(tx)?;
        }

        Ok(())
    }

    /// Human-readable description of the session, one line per item
    pub fn summary_lines(&self) -> Vec<String> {
        let tx = &self.transmitter;
        let mut lines = vec![format!(
            "center={:.4} MHz tx_sr={} audio_sr={} deviation={} Hz master_scale={} gain={} dB",
            tx.center_frequency_hz / 1e6,
            tx.tx_sample_rate,
            tx.audio_sample_rate,
            tx.deviation_hz,
            tx.master_scale,
            tx.tx_gain_db
        )];

        for channel in &self.channels {
            let tone = match &channel.tone {
                ToneConfig::None => "none".to_string(),
                ToneConfig::Ctcss(ctcss) => format!("CTCSS {:.1} Hz", ctcss.frequency_hz),
                ToneConfig::Dcs(dcs) => format!("DCS {}", dcs.code),
            };
            lines.push(format!(
                "channel {}: {:.5} MHz (offset {:+.0} Hz) gain={} weight={} tone={} files={} loop={}",
                channel.id,
                channel.rf_frequency_hz(tx) / 1e6,
                channel.offset_hz(tx),
                channel.gain,
                channel.mix_weight,
                tone,
                channel.playlist.len(),
                channel.loop_playlist
            ));
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(channels: Vec<ChannelConfig>) -> SessionConfig {
        SessionConfig {
            transmitter: TransmitterConfig::new(462_600_000.0),
            channels,
        }
    }

    #[test]
    fn test_transmitter_defaults() {
        let tx = TransmitterConfig::new(100e6);
        assert_eq!(tx.tx_sample_rate, 2_000_000);
        assert_eq!(tx.audio_sample_rate, 48_000);
        assert_eq!(tx.deviation_hz, 3_000.0);
        assert!(tx.normalize_mix);
        assert_eq!(tx.queue_capacity(), 96_000);
    }

    #[test]
    fn test_absolute_frequency_offset() {
        let tx = TransmitterConfig::new(462_600_000.0);
        let ch = ChannelConfig::new(1, FrequencySpec::AbsoluteHz(462_562_500.0));
        assert!((ch.offset_hz(&tx) + 37_500.0).abs() < 1e-6);
        assert!((ch.rf_frequency_hz(&tx) - 462_562_500.0).abs() < 1e-6);
    }

    #[test]
    fn test_tone_level_from_deviation() {
        let level = ToneLevel::DeviationHz(600.0);
        assert!((level.amplitude(3_000.0) - 0.2).abs() < 1e-6);
        assert_eq!(ToneLevel::default().amplitude(3_000.0), DEFAULT_TONE_LEVEL);
    }

    #[test]
    fn test_valid_session() {
        let config = session(vec![
            ChannelConfig::new(1, FrequencySpec::OffsetHz(-12_500.0)),
            ChannelConfig::new(2, FrequencySpec::OffsetHz(12_500.0)),
        ]);
        assert!(config.validate().is_ok());
        assert_eq!(config.summary_lines().len(), 3);
    }

    #[test]
    fn test_no_channels_rejected() {
        assert!(matches!(session(vec![]).validate(), Err(ConfigError::NoChannels)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let config = session(vec![
            ChannelConfig::new(1, FrequencySpec::OffsetHz(0.0)),
            ChannelConfig::new(1, FrequencySpec::OffsetHz(25_000.0)),
        ]);
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateChannel(1))));
    }

    #[test]
    fn test_offset_beyond_span_rejected() {
        let config = session(vec![ChannelConfig::new(3, FrequencySpec::OffsetHz(899_000.0))]);
        match config.validate() {
            Err(ConfigError::OffsetOutOfRange { channel, limit_hz, .. }) => {
                assert_eq!(channel, 3);
                assert!((limit_hz - 897_000.0).abs() < 1e-6);
            }
            other => panic!("expected offset error, got {other:?}"),
        }
    }

    #[test]
    fn test_gate_close_above_open_rejected() {
        let mut ch = ChannelConfig::new(1, FrequencySpec::OffsetHz(0.0));
        ch.gate.open_threshold = 0.01;
        ch.gate.close_threshold = 0.02;
        assert!(matches!(
            session(vec![ch]).validate(),
            Err(ConfigError::GateThresholds { channel: 1, .. })
        ));
    }

    #[test]
    fn test_bad_dcs_code_rejected() {
        let mut ch = ChannelConfig::new(1, FrequencySpec::OffsetHz(0.0));
        ch.tone = ToneConfig::Dcs(DcsConfig {
            code: "089".to_string(),
            baud_rate: DEFAULT_DCS_BAUD,
            level: ToneLevel::default(),
            alternate_polarity: false,
        });
        assert!(matches!(
            session(vec![ch]).validate(),
            Err(ConfigError::InvalidTone { channel: 1, .. })
        ));
    }

    #[test]
    fn test_ctcss_out_of_band_rejected() {
        let mut ch = ChannelConfig::new(1, FrequencySpec::OffsetHz(0.0));
        ch.tone = ToneConfig::Ctcss(CtcssConfig {
            frequency_hz: 1_000.0,
            level: ToneLevel::default(),
        });
        assert!(session(vec![ch]).validate().is_err());
    }

    #[test]
    fn test_tx_rate_below_audio_rate_rejected() {
        let mut config = session(vec![ChannelConfig::new(1, FrequencySpec::OffsetHz(0.0))]);
        config.transmitter.tx_sample_rate = 22_050;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TxRateBelowAudioRate { .. })
        ));
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{
            "transmitter": { "center_frequency_hz": 462600000.0 },
            "channels": [
                { "id": 1, "frequency": { "offset_hz": -25000.0 }, "playlist": ["a.wav"] }
            ]
        }"#;
        let config = SessionConfig::from_json(json).unwrap();
        let ch = &config.channels[0];
        assert!(ch.loop_playlist);
        assert_eq!(ch.gain, 1.0);
        assert_eq!(ch.tone, ToneConfig::None);
        assert_eq!(ch.tone_scaling, ToneScaling::Fixed);
        assert_eq!(ch.gate, GateConfig::default());
        assert_eq!(config.transmitter.block_size, 16_384);
    }

    #[test]
    fn test_json_tone_variants() {
        let json = r#"{
            "transmitter": { "center_frequency_hz": 462600000.0 },
            "channels": [
                { "id": 1, "frequency": { "offset_hz": 0.0 },
                  "tone": { "ctcss": { "frequency_hz": 67.0, "level": { "deviation_hz": 500.0 } } } },
                { "id": 2, "frequency": { "absolute_hz": 462612500.0 },
                  "tone": { "dcs": { "code": "D023N" } }, "tone_scaling": "channel_gain" }
            ]
        }"#;
        let config = SessionConfig::from_json(json).unwrap();
        assert!(matches!(config.channels[0].tone, ToneConfig::Ctcss(_)));
        match &config.channels[1].tone {
            ToneConfig::Dcs(dcs) => {
                assert_eq!(dcs.baud_rate, DEFAULT_DCS_BAUD);
                assert!(dcs.alternate_polarity);
            }
            other => panic!("expected DCS, got {other:?}"),
        }
        assert_eq!(config.channels[1].tone_scaling, ToneScaling::ChannelGain);
    }

    #[test]
    fn test_json_both_frequency_forms_rejected() {
        let json = r#"{
            "transmitter": { "center_frequency_hz": 462600000.0 },
            "channels": [
                { "id": 1, "frequency": { "offset_hz": 0.0, "absolute_hz": 462600000.0 } }
            ]
        }"#;
        assert!(matches!(
            SessionConfig::from_json(json),
            Err(ConfigError::Parse(_))
        ));
    }
}
