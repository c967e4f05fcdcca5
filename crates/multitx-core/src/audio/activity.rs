//! Audio duty-cycle report
//!
//! Measures how much of a file actually carries program audio: the file is
//! cut into fixed chunks and a chunk counts as active when its RMS reaches
//! the threshold. Useful for choosing gate thresholds per playlist.

use super::decoder::{DecodeError, DecoderOpener};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Chunking and threshold for a duty-cycle measurement
#[derive(Debug, Clone, Copy)]
pub struct ActivitySettings {
    pub chunk_ms: f32,
    /// Normalized RMS at or above which a chunk is active
    pub threshold: f32,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self {
            chunk_ms: 1000.0,
            threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityReport {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub duration_seconds: f64,
    pub active_seconds: f64,
    pub duty_cycle_percent: f64,
}

impl ActivityReport {
    pub const CSV_HEADER: &'static str =
        "path,sample_rate,duration_seconds,active_seconds,duty_cycle_percent";

    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{:.3},{:.3},{:.2}",
            self.path.display(),
            self.sample_rate,
            self.duration_seconds,
            self.active_seconds,
            self.duty_cycle_percent
        )
    }
}

/// Accumulates chunk RMS over a stream of samples
#[derive(Debug)]
struct ChunkMeter {
    chunk_len: usize,
    threshold: f64,
    sum_squares: f64,
    count: usize,
    total: u64,
    active: u64,
}

impl ChunkMeter {
    fn new(settings: &ActivitySettings, sample_rate: u32) -> Self {
        let chunk_len = (settings.chunk_ms as f64 * sample_rate as f64 / 1000.0).round() as usize;
        Self {
            chunk_len: chunk_len.max(1),
            threshold: settings.threshold as f64,
            sum_squares: 0.0,
            count: 0,
            total: 0,
            active: 0,
        }
    }

    fn feed(&mut self, samples: &[f32]) {
        for &s in samples {
            self.sum_squares += (s as f64) * (s as f64);
            self.count += 1;
            if self.count == self.chunk_len {
                self.close_chunk();
            }
        }
    }

    fn close_chunk(&mut self) {
        if self.count == 0 {
            return;
        }
        let rms = (self.sum_squares / self.count as f64).sqrt();
        self.total += self.count as u64;
        if rms >= self.threshold {
            self.active += self.count as u64;
        }
        self.sum_squares = 0.0;
        self.count = 0;
    }

    /// Counts the trailing partial chunk too
    fn finish(mut self) -> (u64, u64) {
        self.close_chunk();
        (self.total, self.active)
    }
}

fn report(path: PathBuf, sample_rate: u32, total: u64, active: u64) -> ActivityReport {
    let rate = sample_rate.max(1) as f64;
    let duty_cycle_percent = if total == 0 {
        0.0
    } else {
        active as f64 / total as f64 * 100.0
    };
    ActivityReport {
        path,
        sample_rate,
        duration_seconds: total as f64 / rate,
        active_seconds: active as f64 / rate,
        duty_cycle_percent,
    }
}

/// Duty cycle of an in-memory signal
pub fn analyze_samples(
    samples: &[f32],
    sample_rate: u32,
    settings: &ActivitySettings,
) -> ActivityReport {
    let mut meter = ChunkMeter::new(settings, sample_rate);
    meter.feed(samples);
    let (total, active) = meter.finish();
    report(PathBuf::new(), sample_rate, total, active)
}

/// Duty cycle of one file, decoded through `opener`
pub fn analyze_file(
    opener: &dyn DecoderOpener,
    path: &Path,
    settings: &ActivitySettings,
) -> Result<ActivityReport, DecodeError> {
    let mut decoder = opener.open(path)?;
    let sample_rate = decoder.sample_rate();
    if sample_rate == 0 {
        return Err(DecodeError::Corrupt(format!(
            "{} has a zero sample rate",
            path.display()
        )));
    }

    let mut meter = ChunkMeter::new(settings, sample_rate);
    let mut buffer = vec![0.0f32; crate::PCM_FRAME_SIZE];
    loop {
        let n = decoder.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        meter.feed(&buffer[..n]);
    }

    let (total, active) = meter.finish();
    tracing::debug!(path = %path.display(), total, active, "Measured audio activity");
    Ok(report(path.to_path_buf(), sample_rate, total, active))
}
