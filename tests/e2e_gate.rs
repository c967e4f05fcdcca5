//! E2E tests for the audio activity gate
//!
//! Drives a channel with a burst of program audio followed by silence and
//! follows the gate through attack, open, release and closed.

use multitx::audio::decoder::MemoryOpener;
use multitx::audio::gate::GatePhase;
use multitx::config::{FrequencySpec, GateConfig};
use multitx::dsp::spectrum::fm_discriminate;
use multitx::{ChannelConfig, ClockMode, Complex, SessionConfig, Transmitter, TransmitterConfig};
use std::f64::consts::TAU;
use std::sync::Arc;

const TX_RATE: u32 = 240_000;
const AUDIO_RATE: u32 = 48_000;
/// 50 ms of transmit samples
const CHUNK: usize = 12_000;

/// 0.5 s of 1 kHz at half scale, then 0.5 s of silence
fn burst() -> Vec<f32> {
    let half = AUDIO_RATE as usize / 2;
    (0..half * 2)
        .map(|i| {
            if i < half {
                0.5 * (TAU * 1_000.0 * i as f64 / AUDIO_RATE as f64).sin() as f32
            } else {
                0.0
            }
        })
        .collect()
}

fn gated_channel(gate: GateConfig) -> (Transmitter, u32) {
    let opener = MemoryOpener::new();
    opener.insert("burst", AUDIO_RATE, burst());

    let mut channel = ChannelConfig::new(3, FrequencySpec::OffsetHz(0.0));
    channel.playlist = vec!["burst".into()];
    channel.loop_playlist = false;
    channel.gate = gate;

    let mut tx = TransmitterConfig::new(446.0e6);
    tx.tx_sample_rate = TX_RATE;
    tx.audio_sample_rate = AUDIO_RATE;
    let config = SessionConfig {
        transmitter: tx,
        channels: vec![channel],
    };
    let transmitter = Transmitter::start(config, Arc::new(opener), ClockMode::Virtual).unwrap();
    (transmitter, 3)
}

fn fast_gate() -> GateConfig {
    GateConfig {
        enabled: true,
        open_threshold: 0.015,
        close_threshold: 0.014,
        attack_ms: 4.0,
        release_ms: 200.0,
        analysis_ms: 100.0,
    }
}

fn peak_deviation(freq: &[f32], from_s: f64, to_s: f64) -> f32 {
    let from = (from_s * TX_RATE as f64) as usize;
    let to = (to_s * TX_RATE as f64) as usize;
    freq[from..to].iter().fold(0.0f32, |m, f| m.max(f.abs()))
}

#[test]
fn test_gate_follows_program_activity() {
    let (mut transmitter, id) = gated_channel(fast_gate());
    let stats = transmitter.stats();

    let mut out = vec![Complex::new(0.0, 0.0); CHUNK * 20];
    let mut phases = Vec::new();
    for chunk in out.chunks_mut(CHUNK) {
        transmitter.render_block(chunk);
        phases.push(stats.channel(id).map(|c| c.gate_phase()));
    }

    // phases[i] is the state after (i + 1) * 50 ms; the 100 ms window holds
    // the gate open for about 0.1 s after the burst, then 200 ms of release
    assert_eq!(phases[0], Some(GatePhase::Open));
    assert_eq!(phases[4], Some(GatePhase::Open));
    assert_eq!(phases[8], Some(GatePhase::Open));
    assert_eq!(phases[10], Some(GatePhase::Open));
    assert_eq!(phases[13], Some(GatePhase::Release));
    assert_eq!(phases[17], Some(GatePhase::Closed));

    let freq = fm_discriminate(&out, TX_RATE);
    // Opens within the 4 ms attack of the burst starting
    let early = peak_deviation(&freq, 0.006, 0.05);
    assert!((early - 1_500.0).abs() < 20.0, "early deviation {early} Hz");
    // Half-scale audio at 3 kHz full-scale deviation
    let open = peak_deviation(&freq, 0.2, 0.45);
    assert!((open - 1_500.0).abs() < 20.0, "open deviation {open} Hz");
    // Silent again once released
    assert!(peak_deviation(&freq, 0.85, 0.99) < 1.0);
}

/// A burst that starts between window boundaries still opens within the attack time
#[test]
fn test_gate_opens_on_late_burst() {
    let opener = MemoryOpener::new();
    // 37 ms of silence, then half-scale 1 kHz
    let lead = (AUDIO_RATE as f64 * 0.037) as usize;
    let mut audio = vec![0.0f32; lead];
    audio.extend((0..AUDIO_RATE as usize / 4).map(|i| {
        0.5 * (TAU * 1_000.0 * i as f64 / AUDIO_RATE as f64).sin() as f32
    }));
    opener.insert("late", AUDIO_RATE, audio);

    let mut channel = ChannelConfig::new(5, FrequencySpec::OffsetHz(0.0));
    channel.playlist = vec!["late".into()];
    channel.loop_playlist = false;
    channel.gate = fast_gate();
    let mut tx = TransmitterConfig::new(446.0e6);
    tx.tx_sample_rate = TX_RATE;
    tx.audio_sample_rate = AUDIO_RATE;
    let config = SessionConfig {
        transmitter: tx,
        channels: vec![channel],
    };
    let mut transmitter =
        Transmitter::start(config, Arc::new(opener), ClockMode::Virtual).unwrap();

    let mut out = vec![Complex::new(0.0, 0.0); CHUNK * 4];
    for chunk in out.chunks_mut(CHUNK) {
        transmitter.render_block(chunk);
    }

    let freq = fm_discriminate(&out, TX_RATE);
    assert!(peak_deviation(&freq, 0.0, 0.036) < 1.0);
    let opened = peak_deviation(&freq, 0.043, 0.1);
    assert!((opened - 1_500.0).abs() < 20.0, "deviation {opened} Hz");
}

#[test]
fn test_disabled_gate_passes_audio_immediately() {
    let (mut transmitter, _) = gated_channel(GateConfig {
        enabled: false,
        ..fast_gate()
    });

    let mut out = vec![Complex::new(0.0, 0.0); CHUNK * 2];
    for chunk in out.chunks_mut(CHUNK) {
        transmitter.render_block(chunk);
    }

    let freq = fm_discriminate(&out, TX_RATE);
    let early = peak_deviation(&freq, 0.0, 0.09);
    assert!((early - 1_500.0).abs() < 20.0, "early deviation {early} Hz");
}

#[test]
fn test_gate_state_is_reported_in_snapshot() {
    let (mut transmitter, id) = gated_channel(fast_gate());

    let mut out = vec![Complex::new(0.0, 0.0); CHUNK];
    for _ in 0..5 {
        transmitter.render_block(&mut out);
    }

    let snapshot = transmitter.stats().snapshot();
    let channel = snapshot.channels.iter().find(|c| c.id == id).unwrap();
    assert_eq!(channel.gate_phase, GatePhase::Open);
    assert!((channel.gate_rms - 0.3536).abs() < 0.01, "rms {}", channel.gate_rms);
}
