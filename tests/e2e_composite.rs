//! E2E tests for the multi-channel composite
//!
//! Channels must add linearly, keep to their own part of the spectrum, and
//! clip (counted, never fatal) only when the sum exceeds full scale.

use multitx::audio::decoder::{DecodeError, DecoderOpener, MemoryOpener, PcmDecoder};
use multitx::config::{CtcssConfig, FrequencySpec, ToneConfig, ToneLevel};
use multitx::dsp::spectrum::{fm_discriminate, isolate_channel, tone_magnitude, Spectrum};
use multitx::{ChannelConfig, ClockMode, Complex, SessionConfig, Transmitter, TransmitterConfig};
use std::f64::consts::TAU;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TX_RATE: u32 = 240_000;

fn transmitter(master_scale: f32, normalize: bool) -> TransmitterConfig {
    let mut tx = TransmitterConfig::new(162.0e6);
    tx.tx_sample_rate = TX_RATE;
    tx.master_scale = master_scale;
    tx.normalize_mix = normalize;
    tx.block_size = 8_192;
    tx
}

fn tone_channel(id: u32, offset: f64, tone_hz: f64) -> ChannelConfig {
    let mut channel = ChannelConfig::new(id, FrequencySpec::OffsetHz(offset));
    channel.tone = ToneConfig::Ctcss(CtcssConfig {
        frequency_hz: tone_hz,
        level: ToneLevel::Fraction(0.5),
    });
    channel
}

fn render(tx: TransmitterConfig, channels: Vec<ChannelConfig>, samples: usize) -> Vec<Complex<f32>> {
    let config = SessionConfig {
        transmitter: tx,
        channels,
    };
    let mut transmitter =
        Transmitter::start(config, Arc::new(MemoryOpener::new()), ClockMode::Live).unwrap();
    let mut out = vec![Complex::new(0.0, 0.0); samples];
    for chunk in out.chunks_mut(8_192) {
        transmitter.render_block(chunk);
    }
    out
}

/// Without normalization the composite is exactly the sum of its channels
#[test]
fn test_composite_is_sum_of_channels() {
    let a = tone_channel(1, -60_000.0, 100.0);
    let b = tone_channel(2, 35_000.0, 151.4);

    let both = render(transmitter(0.4, false), vec![a.clone(), b.clone()], 32_768);
    let only_a = render(transmitter(0.4, false), vec![a], 32_768);
    let only_b = render(transmitter(0.4, false), vec![b], 32_768);

    for ((c, x), y) in both.iter().zip(&only_a).zip(&only_b) {
        let diff = c - (x + y);
        assert!(diff.norm() < 1e-5, "composite deviates from sum by {}", diff.norm());
    }
}

/// Each channel's energy stays near its own offset
#[test]
fn test_channels_occupy_their_own_bands() {
    let channels = vec![
        tone_channel(1, -60_000.0, 100.0),
        tone_channel(2, 0.0, 123.0),
        tone_channel(3, 50_000.0, 203.5),
    ];
    let out = render(transmitter(0.9, true), channels, 65_536);
    let spectrum = Spectrum::of_complex(&out, TX_RATE);
    let total = spectrum.total_power();

    let mut captured = 0.0;
    for offset in [-60_000.0, 0.0, 50_000.0] {
        let band = spectrum.band_power(offset - 5_000.0, offset + 5_000.0);
        assert!(
            (band / total - 1.0 / 3.0).abs() < 0.02,
            "channel at {offset} Hz holds {:.3} of the power",
            band / total
        );
        captured += band;
    }
    assert!(captured / total > 0.99);
}

/// Normalization divides the master scale by the total weight
#[test]
fn test_normalized_mix_never_clips() {
    let channels = (1..=4)
        .map(|id| ChannelConfig::new(id, FrequencySpec::OffsetHz(0.0)))
        .collect();
    let out = render(transmitter(1.0, true), channels, 16_384);

    // Four in-phase carriers at a quarter each sum to exactly full scale
    for s in &out {
        assert!(s.re.abs() <= 1.0 && s.im.abs() <= 1.0);
        assert!((s.norm() - 1.0).abs() < 1e-4);
    }
}

/// Overdriving the mix clips I and Q to full scale and counts it
#[test]
fn test_overdriven_mix_is_clipped_and_counted() {
    let channels: Vec<ChannelConfig> = (1..=3)
        .map(|id| ChannelConfig::new(id, FrequencySpec::OffsetHz(0.0)))
        .collect();
    let config = SessionConfig {
        transmitter: transmitter(1.0, false),
        channels,
    };
    let mut transmitter =
        Transmitter::start(config, Arc::new(MemoryOpener::new()), ClockMode::Live).unwrap();

    let mut out = vec![Complex::new(0.0, 0.0); 4_096];
    let report = transmitter.render_block(&mut out);

    assert_eq!(report.samples, 4_096);
    assert_eq!(report.clipped, 4_096);
    assert!((report.peak - 3.0).abs() < 1e-4);
    for s in &out {
        assert!(s.re.abs() <= 1.0 && s.im.abs() <= 1.0);
    }

    let snapshot = transmitter.stats().snapshot();
    assert_eq!(snapshot.clipped_samples, 4_096);
    assert_eq!(snapshot.samples_emitted, 4_096);
}

/// A stopped channel drops out of the composite, the rest keep going
#[test]
fn test_stopped_channel_leaves_composite() {
    let config = SessionConfig {
        transmitter: transmitter(0.5, false),
        channels: vec![
            ChannelConfig::new(1, FrequencySpec::OffsetHz(-20_000.0)),
            ChannelConfig::new(2, FrequencySpec::OffsetHz(20_000.0)),
        ],
    };
    let mut transmitter =
        Transmitter::start(config, Arc::new(MemoryOpener::new()), ClockMode::Live).unwrap();
    let mut out = vec![Complex::new(0.0, 0.0); 8_192];
    transmitter.render_block(&mut out);

    transmitter.stop_channel(1).unwrap();
    transmitter.render_block(&mut out);

    let spectrum = Spectrum::of_complex(&out, TX_RATE);
    assert!((spectrum.peak_frequency() - 20_000.0).abs() <= spectrum.bin_hz());
    let left = spectrum.band_power(-25_000.0, -15_000.0);
    assert!(left / spectrum.total_power() < 1e-4);

    let snapshot = transmitter.stats().snapshot();
    assert!(snapshot.channels.iter().any(|c| c.id == 1 && c.stopped));
    assert!(transmitter.stop_channel(9).is_err());
}

/// Decoder that takes far longer than the block deadline for every read
struct StalledDecoder;

impl PcmDecoder for StalledDecoder {
    fn sample_rate(&self) -> u32 {
        48_000
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError> {
        std::thread::sleep(Duration::from_millis(400));
        let n = out.len().min(480);
        out[..n].fill(0.0);
        Ok(n)
    }
}

/// Serves `stalled.pcm` from [`StalledDecoder`] and everything else from memory
struct StallingOpener {
    clips: MemoryOpener,
}

impl DecoderOpener for StallingOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PcmDecoder>, DecodeError> {
        if path == Path::new("stalled.pcm") {
            return Ok(Box::new(StalledDecoder));
        }
        self.clips.open(path)
    }
}

/// A decoder that misses the deadline costs only its own channel
#[test]
fn test_stalled_decoder_degrades_to_silence() {
    let clips = MemoryOpener::new();
    let program: Vec<f32> = (0..48_000)
        .map(|n| 0.5 * (TAU * 1_000.0 * n as f64 / 48_000.0).sin() as f32)
        .collect();
    clips.insert("program.pcm", 48_000, program);
    let opener = StallingOpener { clips };

    let mut healthy = ChannelConfig::new(1, FrequencySpec::OffsetHz(-60_000.0));
    healthy.playlist = vec!["program.pcm".into()];
    healthy.gate.enabled = false;
    let mut stalled = ChannelConfig::new(2, FrequencySpec::OffsetHz(60_000.0));
    stalled.playlist = vec!["stalled.pcm".into()];
    stalled.gate.enabled = false;

    let mut tx = transmitter(0.8, true);
    tx.block_size = 24_000;
    tx.decoder_timeout_ms = 50;
    let deviation = tx.deviation_hz;
    let config = SessionConfig {
        transmitter: tx,
        channels: vec![healthy, stalled],
    };
    let mut transmitter = Transmitter::start(config, Arc::new(opener), ClockMode::Virtual).unwrap();

    let started = Instant::now();
    let mut out = vec![Complex::new(0.0, 0.0); 120_000];
    for chunk in out.chunks_mut(24_000) {
        transmitter.render_block(chunk);
    }
    // Five blocks, each waiting at most the timeout on the stalled channel
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());

    let stats = transmitter.stats();
    assert_eq!(stats.channel(1).unwrap().underflow_samples(), 0);
    assert!(stats.channel(2).unwrap().underflow_samples() > 20_000);

    // Neighbors 120 kHz apart fall in a null of the 10-sample average
    let healthy_freq = fm_discriminate(&isolate_channel(&out, -60_000.0, TX_RATE, 10), 24_000);
    let level = tone_magnitude(&healthy_freq[1_000..], 1_000.0, 24_000);
    assert!(
        (level as f64 - 0.5 * deviation).abs() < 0.05 * deviation,
        "healthy channel tone {level} Hz"
    );

    // The stalled carrier only picks up the neighbor's leakage
    let stalled_freq = fm_discriminate(&isolate_channel(&out, 60_000.0, TX_RATE, 10), 24_000);
    let body = &stalled_freq[1_000..];
    let leak = tone_magnitude(body, 1_000.0, 24_000);
    assert!(leak < 50.0, "stalled channel tone {leak} Hz");
    let rms = (body.iter().map(|f| f * f).sum::<f32>() / body.len() as f32).sqrt();
    assert!(rms < 100.0, "stalled channel deviation rms {rms} Hz");
}
