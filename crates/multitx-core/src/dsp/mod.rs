//! Per-sample signal processing
//!
//! - Sub-audible CTCSS/DCS generation ([`tone`])
//! - Phase-continuous NBFM modulation ([`modulator`])
//! - Baseband frequency shifting ([`shifter`])
//! - FFT and discriminator helpers for diagnostics ([`spectrum`])

pub mod modulator;
pub mod shifter;
pub mod spectrum;
pub mod tone;

use std::f64::consts::{PI, TAU};

/// Wrap a phase in radians into [-π, π]
#[inline]
pub fn wrap_phase(phase: f64) -> f64 {
    if (-PI..=PI).contains(&phase) {
        phase
    } else {
        phase - TAU * ((phase + PI) / TAU).floor()
    }
}
