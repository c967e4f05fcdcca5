//! Baseband frequency shifter
//!
//! Multiplies a complex stream by `e^{jφ}` with `φ` advanced by
//! `2π · offset / rate` per sample. The phase lives in an `f64` accumulator
//! that is wrapped every sample, so the oscillator neither drifts in
//! amplitude nor loses precision over long sessions.

use crate::dsp::wrap_phase;
use rustfft::num_complex::Complex;
use std::f64::consts::TAU;

#[derive(Debug, Clone)]
pub struct FrequencyShifter {
    offset_hz: f64,
    phase: f64,
    step: f64,
}

impl FrequencyShifter {
    pub fn new(offset_hz: f64, sample_rate: u32) -> Self {
        Self {
            offset_hz,
            phase: 0.0,
            step: TAU * offset_hz / sample_rate as f64,
        }
    }

    /// Shift one sample
    #[inline]
    pub fn shift(&mut self, sample: Complex<f32>) -> Complex<f32> {
        if self.step == 0.0 {
            return sample;
        }
        let (sin, cos) = self.phase.sin_cos();
        self.phase = wrap_phase(self.phase + self.step);
        sample * Complex::new(cos as f32, sin as f32)
    }

    /// Shift a block in place
    pub fn process(&mut self, block: &mut [Complex<f32>]) {
        for sample in block {
            *sample = self.shift(*sample);
        }
    }

    pub fn offset_hz(&self) -> f64 {
        self.offset_hz
    }

    /// Current oscillator phase (radians)
    pub fn phase(&self) -> f64 {
        self.phase
    }
}
