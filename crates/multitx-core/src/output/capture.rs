//! Capture sink
//!
//! Writes the composite as interleaved signed 8-bit IQ (`<base>.cs8`), the
//! format SDR transmit tools replay directly, plus a JSON manifest
//! (`<base>.json`) describing the RF settings and sample count.

use super::sink::{IqSink, SinkError, SinkSettings};
use chrono::{DateTime, Utc};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sample format tag stored in the manifest
pub const CAPTURE_FORMAT: &str = "cs8";

/// Sidecar description of a capture file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureManifest {
    pub format: String,
    pub center_frequency_hz: f64,
    pub sample_rate: u32,
    pub gain_db: f32,
    pub sample_count: u64,
    pub created_at: DateTime<Utc>,
    pub generator: String,
}

impl CaptureManifest {
    pub fn load(path: &Path) -> Result<Self, SinkError> {
        let file = File::open(path).map_err(|source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// Quantize one component to a signed byte
#[inline]
pub fn quantize(x: f32) -> i8 {
    (x * 127.0).round().clamp(-127.0, 127.0) as i8
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub struct CaptureSink {
    data_path: PathBuf,
    manifest_path: PathBuf,
    writer: Option<BufWriter<File>>,
    settings: Option<SinkSettings>,
    sample_count: u64,
    created_at: DateTime<Utc>,
    scratch: Vec<u8>,
}

impl CaptureSink {
    /// Capture to `<base>.cs8` and `<base>.json`; nothing is created until `configure`
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            data_path: with_suffix(base, ".cs8"),
            manifest_path: with_suffix(base, ".json"),
            writer: None,
            settings: None,
            sample_count: 0,
            created_at: Utc::now(),
            scratch: Vec::new(),
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> SinkError {
        tracing::error!(path = %path.display(), error = %source, "Capture write failed");
        SinkError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write_manifest(&self) -> Result<(), SinkError> {
        let settings = self.settings.ok_or(SinkError::NotConfigured)?;
        let manifest = CaptureManifest {
            format: CAPTURE_FORMAT.to_string(),
            center_frequency_hz: settings.center_frequency_hz,
            sample_rate: settings.sample_rate,
            gain_db: settings.gain_db,
            sample_count: self.sample_count,
            created_at: self.created_at,
            generator: format!("multitx {}", crate::VERSION),
        };

        let file = File::create(&self.manifest_path)
            .map_err(|e| self.io_error(&self.manifest_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &manifest)?;
        writer
            .flush()
            .map_err(|e| self.io_error(&self.manifest_path, e))
    }
}

impl IqSink for CaptureSink {
    fn configure(&mut self, settings: &SinkSettings) -> Result<(), SinkError> {
        if let Some(parent) = self.data_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }
        let file = File::create(&self.data_path).map_err(|e| self.io_error(&self.data_path, e))?;
        self.writer = Some(BufWriter::new(file));
        self.settings = Some(*settings);
        self.sample_count = 0;
        self.write_manifest()?;

        tracing::info!(
            path = %self.data_path.display(),
            center_hz = settings.center_frequency_hz,
            sample_rate = settings.sample_rate,
            "Capturing composite"
        );
        Ok(())
    }

    fn push(&mut self, block: &[Complex<f32>]) -> Result<(), SinkError> {
        self.scratch.clear();
        self.scratch.reserve(block.len() * 2);
        for s in block {
            self.scratch.push(quantize(s.re) as u8);
            self.scratch.push(quantize(s.im) as u8);
        }

        let writer = self.writer.as_mut().ok_or(SinkError::NotConfigured)?;
        if let Err(e) = writer.write_all(&self.scratch) {
            return Err(self.io_error(&self.data_path, e));
        }
        self.sample_count += block.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                return Err(self.io_error(&self.data_path, e));
            }
        }
        self.write_manifest()?;
        tracing::info!(
            path = %self.data_path.display(),
            samples = self.sample_count,
            "Capture finished"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "capture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SinkSettings {
        SinkSettings {
            center_frequency_hz: 446.0e6,
            sample_rate: 2_000_000,
            gain_db: 12.0,
        }
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(1.0), 127);
        assert_eq!(quantize(-1.0), -127);
        assert_eq!(quantize(0.5), 64);
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(3.0), 127);
    }

    #[test]
    fn test_capture_writes_iq_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CaptureSink::new(dir.path().join("nested").join("cap.v1"));
        sink.configure(&settings()).unwrap();
        sink.push(&[Complex::new(1.0, -1.0), Complex::new(0.5, 0.0)]).unwrap();
        sink.push(&[Complex::new(0.0, 0.25)]).unwrap();
        sink.finish().unwrap();

        assert!(sink.data_path().ends_with("cap.v1.cs8"));
        let bytes = std::fs::read(sink.data_path()).unwrap();
        let iq: Vec<i8> = bytes.iter().map(|&b| b as i8).collect();
        assert_eq!(iq, vec![127, -127, 64, 0, 0, 32]);

        let manifest = CaptureManifest::load(sink.manifest_path()).unwrap();
        assert_eq!(manifest.format, "cs8");
        assert_eq!(manifest.sample_count, 3);
        assert_eq!(manifest.sample_rate, 2_000_000);
        assert_eq!(manifest.center_frequency_hz, 446.0e6);
    }

    #[test]
    fn test_push_before_configure_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CaptureSink::new(dir.path().join("cap"));
        assert!(matches!(
            sink.push(&[Complex::new(0.0, 0.0)]),
            Err(SinkError::NotConfigured)
        ));
    }

    #[test]
    fn test_unwritable_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let mut sink = CaptureSink::new(blocker.join("cap"));
        assert!(matches!(
            sink.configure(&settings()),
            Err(SinkError::Io { .. })
        ));
    }
}
