//! Composite combiner
//!
//! Sums the per-channel transmit-rate streams into one composite:
//! `out = scale · Σ w_c · s_c`, then clips I and Q independently to
//! [-1, 1]. Clipping is counted and reported, never fatal.

use rustfft::num_complex::Complex;
use std::time::{Duration, Instant};

/// Minimum spacing between clipping warnings
const CLIP_WARN_INTERVAL: Duration = Duration::from_secs(1);

/// What happened while mixing one block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MixReport {
    pub samples: usize,
    /// Samples where I or Q had to be clipped
    pub clipped: usize,
    /// Largest |I| or |Q| before clipping
    pub peak: f32,
}

#[derive(Debug)]
pub struct Combiner {
    scale: f32,
    clipped_total: u64,
    clipped_since_warn: u64,
    last_warn: Option<Instant>,
}

impl Combiner {
    /// `weights` are the mix weights of every channel in the session
    pub fn new(master_scale: f32, normalize: bool, weights: &[f32]) -> Self {
        let scale = if normalize {
            let total: f32 = weights.iter().map(|w| w.abs()).sum();
            master_scale / total.max(1.0)
        } else {
            master_scale
        };
        tracing::debug!(scale, normalize, channels = weights.len(), "Combiner configured");

        Self {
            scale,
            clipped_total: 0,
            clipped_since_warn: 0,
            last_warn: None,
        }
    }

    /// Overall factor applied to the weighted sum
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn clipped_total(&self) -> u64 {
        self.clipped_total
    }

    /// Mix `(weight, block)` inputs into `out`
    ///
    /// Every block must be at least `out.len()` long.
    pub fn mix<'a>(
        &mut self,
        inputs: impl IntoIterator<Item = (f32, &'a [Complex<f32>])>,
        out: &mut [Complex<f32>],
    ) -> MixReport {
        out.fill(Complex::new(0.0, 0.0));
        for (weight, block) in inputs {
            let gain = weight * self.scale;
            if gain == 0.0 {
                continue;
            }
            for (o, s) in out.iter_mut().zip(block.iter()) {
                *o += s * gain;
            }
        }

        let mut report = MixReport {
            samples: out.len(),
            ..MixReport::default()
        };
        for s in out.iter_mut() {
            let peak = s.re.abs().max(s.im.abs());
            report.peak = report.peak.max(peak);
            if peak > 1.0 {
                s.re = s.re.clamp(-1.0, 1.0);
                s.im = s.im.clamp(-1.0, 1.0);
                report.clipped += 1;
            }
        }

        if report.clipped > 0 {
            self.note_clipping(report.clipped as u64, report.peak);
        }
        report
    }

    fn note_clipping(&mut self, clipped: u64, peak: f32) {
        self.clipped_total += clipped;
        self.clipped_since_warn += clipped;

        let due = self
            .last_warn
            .map(|t| t.elapsed() >= CLIP_WARN_INTERVAL)
            .unwrap_or(true);
        if due {
            tracing::warn!(
                clipped = self.clipped_since_warn,
                total = self.clipped_total,
                peak,
                "Composite clipping, lower master_scale or channel weights"
            );
            self.clipped_since_warn = 0;
            self.last_warn = Some(Instant::now());
        }
    }
}
