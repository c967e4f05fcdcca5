//! Spectrum and discriminator helpers
//!
//! Diagnostics for where energy ends up in the composite: which offset a
//! channel occupies, how far it deviates, whether a squelch tone is present
//! in the demodulated audio.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::TAU;

/// Power spectrum of a complex (or real) block
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Power per FFT bin, in FFT order (DC, positive, then negative frequencies)
    power: Vec<f32>,
    sample_rate: f64,
}

impl Spectrum {
    /// Hann-windowed FFT of a complex block, zero-padded to a power of two
    pub fn of_complex(samples: &[Complex<f32>], sample_rate: u32) -> Self {
        let fft_size = samples.len().max(2).next_power_of_two();
        let window = hann(samples.len());

        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .zip(window.iter())
            .map(|(s, w)| s * *w)
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(fft_size)
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        fft.process(&mut buffer);

        Self {
            power: buffer.iter().map(|c| c.norm_sqr()).collect(),
            sample_rate: sample_rate as f64,
        }
    }

    /// Spectrum of a real block; only the positive half is meaningful
    pub fn of_real(samples: &[f32], sample_rate: u32) -> Self {
        let complex: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
        Self::of_complex(&complex, sample_rate)
    }

    pub fn len(&self) -> usize {
        self.power.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }

    /// Frequency resolution (Hz per bin)
    pub fn bin_hz(&self) -> f64 {
        self.sample_rate / self.power.len() as f64
    }

    /// Signed center frequency of bin `k` (Hz)
    pub fn frequency_of(&self, k: usize) -> f64 {
        let n = self.power.len();
        let signed = if k < n / 2 { k as f64 } else { k as f64 - n as f64 };
        signed * self.bin_hz()
    }

    /// Frequency of the strongest bin (Hz)
    pub fn peak_frequency(&self) -> f64 {
        let (k, _) = self
            .power
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (k, &p)| if p > best.1 { (k, p) } else { best });
        self.frequency_of(k)
    }

    /// Total power in the band `[low_hz, high_hz]`
    pub fn band_power(&self, low_hz: f64, high_hz: f64) -> f64 {
        self.power
            .iter()
            .enumerate()
            .filter(|(k, _)| {
                let f = self.frequency_of(*k);
                f >= low_hz && f <= high_hz
            })
            .map(|(_, &p)| p as f64)
            .sum()
    }

    pub fn total_power(&self) -> f64 {
        self.power.iter().map(|&p| p as f64).sum()
    }
}

fn hann(len: usize) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|n| (0.5 - 0.5 * (TAU * n as f64 / (len - 1) as f64).cos()) as f32)
        .collect()
}

/// Instantaneous frequency of a complex stream (Hz), one value per sample pair
///
/// This is the quadrature FM discriminator: `arg(s[n] · conj(s[n-1]))`
/// scaled to Hz.
pub fn fm_discriminate(samples: &[Complex<f32>], sample_rate: u32) -> Vec<f32> {
    let scale = sample_rate as f64 / TAU;
    samples
        .windows(2)
        .map(|pair| ((pair[1] * pair[0].conj()).arg() as f64 * scale) as f32)
        .collect()
}

/// Mix a stream down by `offset_hz` and average it to a lower rate
///
/// A boxcar decimator is enough to isolate one channel for diagnostics when
/// the neighbors are well separated.
pub fn isolate_channel(
    samples: &[Complex<f32>],
    offset_hz: f64,
    sample_rate: u32,
    decimation: usize,
) -> Vec<Complex<f32>> {
    let step = -TAU * offset_hz / sample_rate as f64;
    let decimation = decimation.max(1);

    samples
        .iter()
        .enumerate()
        .map(|(n, s)| {
            let (sin, cos) = (step * n as f64).sin_cos();
            s * Complex::new(cos as f32, sin as f32)
        })
        .collect::<Vec<_>>()
        .chunks_exact(decimation)
        .map(|chunk| chunk.iter().sum::<Complex<f32>>() / decimation as f32)
        .collect()
}

/// Magnitude of a single frequency component in a real block (Goertzel-style DFT bin)
pub fn tone_magnitude(samples: &[f32], frequency_hz: f64, sample_rate: u32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let step = TAU * frequency_hz / sample_rate as f64;
    let acc = samples
        .iter()
        .enumerate()
        .fold(Complex::new(0.0f64, 0.0), |acc, (n, &s)| {
            let (sin, cos) = (step * n as f64).sin_cos();
            acc + Complex::new(cos, -sin) * s as f64
        });
    (2.0 * acc.norm() / samples.len() as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn complex_tone(freq: f64, rate: u32, len: usize) -> Vec<Complex<f32>> {
        (0..len)
            .map(|n| {
                let (sin, cos) = (TAU * freq * n as f64 / rate as f64).sin_cos();
                Complex::new(cos as f32, sin as f32)
            })
            .collect()
    }

    #[test]
    fn test_peak_frequency_signed() {
        let rate = 1_024_000;
        let spectrum = Spectrum::of_complex(&complex_tone(-25_000.0, rate, 4_096), rate);
        assert!((spectrum.peak_frequency() + 25_000.0).abs() <= spectrum.bin_hz());
    }

    #[test]
    fn test_band_power_concentrated() {
        let rate = 1_024_000;
        let spectrum = Spectrum::of_complex(&complex_tone(10_000.0, rate, 4_096), rate);
        let band = spectrum.band_power(8_000.0, 12_000.0);
        assert!(band / spectrum.total_power() > 0.99);
    }

    #[test]
    fn test_discriminator_reads_frequency() {
        let rate = 48_000;
        let freq = fm_discriminate(&complex_tone(1_500.0, rate, 100), rate);
        assert_eq!(freq.len(), 99);
        for f in freq {
            assert_relative_eq!(f, 1_500.0, epsilon = 0.5);
        }
    }

    #[test]
    fn test_isolate_channel_moves_to_dc() {
        let rate = 2_000_000;
        let iso = isolate_channel(&complex_tone(50_000.0, rate, 40_000), 50_000.0, rate, 40);
        assert_eq!(iso.len(), 1_000);
        for s in &iso {
            assert_relative_eq!(s.re, 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_tone_magnitude() {
        let rate = 8_000;
        let samples: Vec<f32> = (0..8_000)
            .map(|n| 0.3 * (TAU * 100.0 * n as f64 / rate as f64).sin() as f32)
            .collect();
        assert_relative_eq!(tone_magnitude(&samples, 100.0, rate), 0.3, epsilon = 1e-3);
        assert!(tone_magnitude(&samples, 250.0, rate) < 1e-3);
    }
}
