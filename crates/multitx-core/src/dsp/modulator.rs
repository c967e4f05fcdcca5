//! Phase-continuous narrowband FM modulator
//!
//! The modulator integrates instantaneous frequency at the audio rate:
//! `phase += 2π · deviation · x / audio_rate`. The pipeline runs faster than
//! that (the transmit rate), so each audio step is spread across the
//! transmit ticks that fall inside it by interpolating the phase linearly
//! between the previous and the next accumulated value. Linear phase
//! interpolation keeps the instantaneous frequency constant within a step,
//! which preserves the deviation exactly.

use crate::dsp::wrap_phase;
use rustfft::num_complex::Complex;
use std::f64::consts::TAU;

/// Modulator phase memory carried from one block to the next
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModulatorState {
    /// Accumulated phase at the start of the current audio step (radians)
    pub phase: f64,
    /// Phase advance over the current audio step (radians)
    pub step: f64,
}

/// NBFM modulator for one channel
#[derive(Debug, Clone)]
pub struct NbfmModulator {
    /// Radians per audio sample per unit of input
    sensitivity: f64,
    state: ModulatorState,
    /// Inputs beyond full scale since the last [`Self::take_over_deviation`]
    over_deviation: u64,
}

impl NbfmModulator {
    pub fn new(deviation_hz: f64, audio_sample_rate: u32) -> Self {
        Self {
            sensitivity: TAU * deviation_hz / audio_sample_rate as f64,
            state: ModulatorState::default(),
            over_deviation: 0,
        }
    }

    /// Start the next audio step: accumulate the previous step and load `sample`
    ///
    /// Input past [-1, 1] deviates beyond the configured maximum. It is
    /// modulated as is and counted.
    #[inline]
    pub fn load(&mut self, sample: f32) {
        if sample.abs() > 1.0 {
            self.over_deviation += 1;
        }
        self.state.phase = wrap_phase(self.state.phase + self.state.step);
        self.state.step = self.sensitivity * sample as f64;
    }

    /// Unit phasor at fraction `frac` (0.0..1.0) through the current audio step
    #[inline]
    pub fn interpolate(&self, frac: f64) -> Complex<f32> {
        let (sin, cos) = (self.state.phase + frac * self.state.step).sin_cos();
        Complex::new(cos as f32, sin as f32)
    }

    /// Modulate a block at the audio rate, one output per input sample
    pub fn process(&mut self, input: &[f32], output: &mut Vec<Complex<f32>>) {
        output.reserve(input.len());
        for &x in input {
            self.load(x);
            output.push(self.interpolate(0.0));
        }
    }

    /// Current phase memory
    pub fn state(&self) -> ModulatorState {
        self.state
    }

    /// Restore phase memory, e.g. after a channel was rebuilt
    pub fn restore(&mut self, state: ModulatorState) {
        self.state = state;
    }

    /// Accumulated phase at the start of the current step (radians)
    pub fn phase(&self) -> f64 {
        self.state.phase
    }

    /// Over-deviated inputs since the previous call
    pub fn take_over_deviation(&mut self) -> u64 {
        std::mem::take(&mut self.over_deviation)
    }
}
