//! Decoded-audio interface
//!
//! The signal chain never parses container formats itself. It asks a
//! [`DecoderOpener`] for a [`PcmDecoder`] per playlist entry and pulls mono
//! `f32` PCM in [-1, 1] from it. [`FileOpener`] handles WAV through `hound`
//! and MP3 through `symphonia`; [`MemoryOpener`] serves synthetic or
//! preloaded audio.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Errors raised while opening or reading a playlist entry
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),

    #[error("MP3 decode error: {0}")]
    Mp3(#[from] SymphoniaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported audio format: {0}")]
    Unsupported(PathBuf),

    #[error("No audio registered for {0}")]
    NotFound(PathBuf),

    #[error("Corrupt audio stream: {0}")]
    Corrupt(String),
}

/// A stream of mono PCM samples at a fixed rate
pub trait PcmDecoder: Send {
    /// Native sample rate of the stream (Hz)
    fn sample_rate(&self) -> u32;

    /// Fill `out` with the next samples; returns the count, 0 at end of stream
    fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError>;
}

/// Turns a playlist entry into a decoder
pub trait DecoderOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn PcmDecoder>, DecodeError>;
}

/// Streaming WAV decoder; multi-channel files are averaged to mono
pub struct WavDecoder {
    reader: hound::WavReader<BufReader<File>>,
    sample_rate: u32,
    channels: usize,
    format: hound::SampleFormat,
    scale: f32,
}

impl WavDecoder {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels == 0 {
            return Err(DecodeError::Corrupt(format!(
                "{} declares zero channels",
                path.display()
            )));
        }

        let scale = match spec.sample_format {
            hound::SampleFormat::Int => 1.0 / (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32,
            hound::SampleFormat::Float => 1.0,
        };

        Ok(Self {
            reader,
            sample_rate: spec.sample_rate,
            channels: spec.channels as usize,
            format: spec.sample_format,
            scale,
        })
    }
}

/// Average interleaved frames from `samples` into `out`; stops at end of stream
fn read_frames<S, I>(
    samples: &mut I,
    channels: usize,
    out: &mut [f32],
    to_f32: impl Fn(S) -> f32,
) -> Result<usize, DecodeError>
where
    I: Iterator<Item = Result<S, hound::Error>>,
{
    for (written, slot) in out.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for _ in 0..channels {
            match samples.next() {
                Some(sample) => acc += to_f32(sample?),
                None => return Ok(written),
            }
        }
        *slot = acc / channels as f32;
    }
    Ok(out.len())
}

impl PcmDecoder for WavDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError> {
        let channels = self.channels;
        let scale = self.scale;
        match self.format {
            hound::SampleFormat::Int => {
                let mut samples = self.reader.samples::<i32>();
                read_frames(&mut samples, channels, out, |s| s as f32 * scale)
            }
            hound::SampleFormat::Float => {
                let mut samples = self.reader.samples::<f32>();
                read_frames(&mut samples, channels, out, |s| s)
            }
        }
    }
}

/// Streaming MP3 decoder; multi-channel frames are averaged to mono
pub struct Mp3Decoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    sample_rate: u32,
    /// Mono samples of the last decoded packet
    pending: Vec<f32>,
    position: usize,
    finished: bool,
}

impl Mp3Decoder {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        hint.with_extension("mp3");
        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let detected = symphonia::default::get_probe().format(
            &hint,
            mss,
            &format_opts,
            &MetadataOptions::default(),
        )?;
        let reader = detected.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Corrupt(format!("{} has no audio track", path.display())))?;
        let track_id = track.id;
        let params = track.codec_params.clone();
        let sample_rate = params.sample_rate.ok_or_else(|| {
            DecodeError::Corrupt(format!("{} does not declare a sample rate", path.display()))
        })?;

        let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
        tracing::debug!(path = %path.display(), sample_rate, "Opened MP3 stream");

        Ok(Self {
            reader,
            decoder,
            track_id,
            sample_rate,
            pending: Vec::new(),
            position: 0,
            finished: false,
        })
    }

    /// Decode the next packet of our track into `pending`; `false` at end of stream
    fn decode_packet(&mut self) -> Result<bool, DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    tracing::warn!(error = %msg, "Skipping corrupt MP3 frame");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);
            let mut buffer = SampleBuffer::<f32>::new(frames as u64, spec);
            buffer.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending.extend(
                buffer
                    .samples()
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
            self.position = 0;
            return Ok(true);
        }
    }
}

impl PcmDecoder for Mp3Decoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError> {
        let mut written = 0;
        while written < out.len() {
            if self.position == self.pending.len() {
                if self.finished || !self.decode_packet()? {
                    self.finished = true;
                    break;
                }
            }
            let n = (self.pending.len() - self.position).min(out.len() - written);
            out[written..written + n]
                .copy_from_slice(&self.pending[self.position..self.position + n]);
            self.position += n;
            written += n;
        }
        Ok(written)
    }
}

/// Opens playlist entries from disk, choosing a decoder by file extension
#[derive(Debug, Default, Clone, Copy)]
pub struct FileOpener;

impl DecoderOpener for FileOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PcmDecoder>, DecodeError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("wav") | Some("wave") => Ok(Box::new(WavDecoder::open(path)?)),
            Some("mp3") => Ok(Box::new(Mp3Decoder::open(path)?)),
            _ => Err(DecodeError::Unsupported(path.to_path_buf())),
        }
    }
}

/// In-memory PCM stream
#[derive(Debug, Clone)]
pub struct MemoryDecoder {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    position: usize,
    /// Report a read error once the samples run out instead of ending cleanly
    fail_at_end: bool,
}

impl MemoryDecoder {
    pub fn new(samples: Arc<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            position: 0,
            fail_at_end: false,
        }
    }
}

impl PcmDecoder for MemoryDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError> {
        let remaining = &self.samples[self.position..];
        if remaining.is_empty() && self.fail_at_end {
            return Err(DecodeError::Corrupt("stream truncated".to_string()));
        }
        let n = remaining.len().min(out.len());
        out[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    fail_at_end: bool,
}

/// Serves registered in-memory clips by path
///
/// Paths that were never registered fail to open, which makes this handy
/// for exercising the skip-and-continue behavior of playlists.
#[derive(Debug, Default)]
pub struct MemoryOpener {
    entries: RwLock<HashMap<PathBuf, MemoryEntry>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip under `path`
    pub fn insert(&self, path: impl Into<PathBuf>, sample_rate: u32, samples: Vec<f32>) {
        self.insert_entry(path.into(), sample_rate, samples, false);
    }

    /// Register a clip whose stream errors after its last sample
    pub fn insert_corrupt(&self, path: impl Into<PathBuf>, sample_rate: u32, samples: Vec<f32>) {
        self.insert_entry(path.into(), sample_rate, samples, true);
    }

    fn insert_entry(&self, path: PathBuf, sample_rate: u32, samples: Vec<f32>, fail_at_end: bool) {
        let entry = MemoryEntry {
            samples: Arc::new(samples),
            sample_rate,
            fail_at_end,
        };
        // A poisoned map only means a writer panicked mid-insert; the map itself is intact
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(path, entry);
    }
}

impl DecoderOpener for MemoryOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PcmDecoder>, DecodeError> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = entries
            .get(path)
            .ok_or_else(|| DecodeError::NotFound(path.to_path_buf()))?;

        let mut decoder = MemoryDecoder::new(Arc::clone(&entry.samples), entry.sample_rate);
        decoder.fail_at_end = entry.fail_at_end;
        Ok(Box::new(decoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: &[Vec<i16>]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &s in frame {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_wav_mono_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 1, 22_050, &[vec![16_384], vec![-32_768], vec![0]]);

        let mut decoder = FileOpener.open(&path).unwrap();
        assert_eq!(decoder.sample_rate(), 22_050);

        let mut out = [0.0f32; 8];
        assert_eq!(decoder.read(&mut out).unwrap(), 3);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] + 1.0).abs() < 1e-6);
        assert_eq!(decoder.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_wav_stereo_averaged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.WAV");
        write_wav(&path, 2, 48_000, &[vec![16_384, 0], vec![8_192, 8_192]]);

        let mut decoder = FileOpener.open(&path).unwrap();
        let mut out = [0.0f32; 4];
        assert_eq!(decoder.read(&mut out).unwrap(), 2);
        assert!((out[0] - 0.25).abs() < 1e-6);
        assert!((out[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_wav_reads_in_small_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.wav");
        let frames: Vec<Vec<i16>> = (0..10).map(|i| vec![i * 100]).collect();
        write_wav(&path, 1, 8_000, &frames);

        let mut decoder = FileOpener.open(&path).unwrap();
        let mut out = [0.0f32; 4];
        let mut total = 0;
        loop {
            let n = decoder.read(&mut out).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 10);
    }

    /// MPEG-1 Layer III, 128 kbit/s, 44.1 kHz, mono; zeroed side info and main data decode to silence
    fn write_silent_mp3(path: &Path, frames: usize) {
        const FRAME_LEN: usize = 417;
        let mut bytes = Vec::with_capacity(frames * FRAME_LEN);
        for _ in 0..frames {
            bytes.extend_from_slice(&[0xFF, 0xFB, 0x90, 0xC4]);
            bytes.resize(bytes.len() + FRAME_LEN - 4, 0);
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_mp3_decodes_to_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiet.MP3");
        write_silent_mp3(&path, 20);

        let mut decoder = FileOpener.open(&path).unwrap();
        assert_eq!(decoder.sample_rate(), 44_100);

        let mut out = [1.0f32; 1_000];
        let mut total = 0;
        loop {
            let n = decoder.read(&mut out).unwrap();
            if n == 0 {
                break;
            }
            assert!(out[..n].iter().all(|s| s.abs() < 1e-6));
            total += n;
        }
        assert!(total >= 1_152 * 18 && total <= 1_152 * 20, "decoded {total} samples");
        assert_eq!(decoder.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_unsupported_and_garbage_files() {
        let dir = tempfile::tempdir().unwrap();
        let ogg = dir.path().join("song.ogg");
        std::fs::write(&ogg, b"OggS").unwrap();
        assert!(matches!(FileOpener.open(&ogg), Err(DecodeError::Unsupported(_))));

        let truncated = dir.path().join("song.mp3");
        std::fs::write(&truncated, b"ID3").unwrap();
        assert!(FileOpener.open(&truncated).is_err());

        let garbage = dir.path().join("broken.wav");
        std::fs::write(&garbage, b"not a wav file").unwrap();
        assert!(FileOpener.open(&garbage).is_err());
    }

    #[test]
    fn test_memory_opener() {
        let opener = MemoryOpener::new();
        opener.insert("a", 16_000, vec![0.1, 0.2, 0.3]);
        opener.insert_corrupt("b", 16_000, vec![0.5]);

        let mut a = opener.open(Path::new("a")).unwrap();
        let mut out = [0.0f32; 2];
        assert_eq!(a.read(&mut out).unwrap(), 2);
        assert_eq!(a.read(&mut out).unwrap(), 1);
        assert_eq!(a.read(&mut out).unwrap(), 0);

        let mut b = opener.open(Path::new("b")).unwrap();
        assert_eq!(b.read(&mut out).unwrap(), 1);
        assert!(b.read(&mut out).is_err());

        assert!(matches!(
            opener.open(Path::new("missing")),
            Err(DecodeError::NotFound(_))
        ));
    }
}
