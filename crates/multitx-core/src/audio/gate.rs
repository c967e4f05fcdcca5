//! Audio activity gate
//!
//! Mutes the channel's program audio between items so the carrier is not
//! modulated by hiss or low-level noise. Loudness is the RMS over a sliding
//! window of the last `analysis_ms`, re-evaluated on every sample; the open
//! and close thresholds form a hysteresis band so the gate does not chatter
//! around a single level. Transitions ramp the gain linearly over the
//! attack and release times.

use crate::config::GateConfig;
use serde::Serialize;

/// Where the gate envelope is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum GatePhase {
    Closed = 0,
    Attack = 1,
    Open = 2,
    Release = 3,
}

impl GatePhase {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => GatePhase::Attack,
            2 => GatePhase::Open,
            3 => GatePhase::Release,
            _ => GatePhase::Closed,
        }
    }
}

/// Observable gate state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateState {
    /// Current gain, 0.0 (closed) to 1.0 (open)
    pub envelope: f32,
    pub phase: GatePhase,
    /// Running RMS over the analysis window
    pub rms: f32,
}

/// Sliding mean of squared samples
///
/// Samples not yet seen count as silence, so a fresh window reads low and
/// fills up as audio arrives.
#[derive(Debug, Clone)]
struct RmsWindow {
    squares: Vec<f32>,
    head: usize,
    sum: f64,
}

impl RmsWindow {
    fn new(len: usize) -> Self {
        Self {
            squares: vec![0.0; len.max(1)],
            head: 0,
            sum: 0.0,
        }
    }

    fn len(&self) -> usize {
        self.squares.len()
    }

    #[inline]
    fn push(&mut self, sample: f32) -> f32 {
        let square = sample * sample;
        let oldest = std::mem::replace(&mut self.squares[self.head], square);
        self.sum += square as f64 - oldest as f64;
        self.head += 1;
        if self.head == self.squares.len() {
            self.head = 0;
            // Resum once per lap so add/subtract rounding cannot accumulate
            self.sum = self.squares.iter().map(|&s| s as f64).sum();
        }
        (self.sum.max(0.0) / self.squares.len() as f64).sqrt() as f32
    }
}

#[derive(Debug, Clone)]
pub struct ActivityGate {
    enabled: bool,
    open_threshold: f32,
    close_threshold: f32,
    attack_step: f32,
    release_step: f32,
    window: RmsWindow,
    state: GateState,
}

/// Per-sample envelope increment for a ramp lasting `ms`; zero-length ramps jump
fn ramp_step(ms: f32, sample_rate: u32) -> f32 {
    let samples = (ms as f64 * sample_rate as f64 / 1000.0).round();
    if samples < 1.0 {
        1.0
    } else {
        (1.0 / samples) as f32
    }
}

impl ActivityGate {
    pub fn new(config: &GateConfig, sample_rate: u32) -> Self {
        let window_len = (config.analysis_ms as f64 * sample_rate as f64 / 1000.0).round() as usize;
        let state = if config.enabled {
            GateState {
                envelope: 0.0,
                phase: GatePhase::Closed,
                rms: 0.0,
            }
        } else {
            GateState {
                envelope: 1.0,
                phase: GatePhase::Open,
                rms: 0.0,
            }
        };

        Self {
            enabled: config.enabled,
            open_threshold: config.open_threshold,
            close_threshold: config.close_threshold,
            attack_step: ramp_step(config.attack_ms, sample_rate),
            release_step: ramp_step(config.release_ms, sample_rate),
            window: RmsWindow::new(window_len),
            state,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn phase(&self) -> GatePhase {
        self.state.phase
    }

    /// Samples in the RMS analysis window
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Gate one sample
    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        if !self.enabled {
            return sample;
        }

        let rms = self.window.push(sample);
        self.evaluate(rms);
        self.advance();
        sample * self.state.envelope
    }

    fn evaluate(&mut self, rms: f32) {
        self.state.rms = rms;
        match self.state.phase {
            GatePhase::Closed | GatePhase::Release if rms >= self.open_threshold => {
                self.state.phase = GatePhase::Attack;
            }
            GatePhase::Open | GatePhase::Attack if rms < self.close_threshold => {
                self.state.phase = GatePhase::Release;
            }
            _ => {}
        }
    }

    /// Step the envelope; ramps end within half a step of their target
    fn advance(&mut self) {
        match self.state.phase {
            GatePhase::Attack => {
                self.state.envelope += self.attack_step;
                if self.state.envelope >= 1.0 - 0.5 * self.attack_step {
                    self.state.envelope = 1.0;
                    self.state.phase = GatePhase::Open;
                }
            }
            GatePhase::Release => {
                self.state.envelope -= self.release_step;
                if self.state.envelope <= 0.5 * self.release_step {
                    self.state.envelope = 0.0;
                    self.state.phase = GatePhase::Closed;
                }
            }
            GatePhase::Open | GatePhase::Closed => {}
        }
    }
}
