//! Sample rate conversion for decoded audio
//!
//! Wraps a `rubato` sinc resampler in a streaming interface. Input of any
//! length is queued and converted in fixed chunks, the filter delay is
//! trimmed from the front of the output, and [`Resampler::flush`] drains the
//! tail so `n` input samples always come out as `n · target / source`
//! samples, aligned with the input.

use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};
use thiserror::Error;

/// Input frames per conversion call
const CHUNK_FRAMES: usize = 1024;

#[derive(Error, Debug)]
pub enum ResamplerError {
    #[error("Cannot convert {from} Hz to {to} Hz: {source}")]
    Construction {
        from: u32,
        to: u32,
        #[source]
        source: rubato::ResamplerConstructionError,
    },

    #[error("Resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// Mono streaming resampler from a file's native rate to the audio rate
pub struct Resampler {
    source_rate: u32,
    target_rate: u32,
    /// `None` when the rates match
    inner: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
    /// Leading output samples still owed to the filter delay
    delay_left: usize,
    consumed: u64,
    produced: u64,
}

impl Resampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self, ResamplerError> {
        let source_rate = source_rate.max(1);
        let target_rate = target_rate.max(1);

        let inner = if source_rate == target_rate {
            None
        } else {
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 160,
                window: WindowFunction::BlackmanHarris2,
            };
            let ratio = target_rate as f64 / source_rate as f64;
            let sinc = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, 1).map_err(
                |source| ResamplerError::Construction {
                    from: source_rate,
                    to: target_rate,
                    source,
                },
            )?;
            Some(sinc)
        };

        let delay_left = inner.as_ref().map(|r| r.output_delay()).unwrap_or(0);
        Ok(Self {
            source_rate,
            target_rate,
            inner,
            pending: Vec::with_capacity(CHUNK_FRAMES * 2),
            delay_left,
            consumed: 0,
            produced: 0,
        })
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Convert `input`, appending every output sample that is ready to `output`
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) -> Result<(), ResamplerError> {
        let Some(inner) = self.inner.as_mut() else {
            output.extend_from_slice(input);
            return Ok(());
        };

        self.pending.extend_from_slice(input);
        self.consumed += input.len() as u64;

        let mut start = 0;
        while self.pending.len() - start >= inner.input_frames_next() {
            let end = start + inner.input_frames_next();
            let converted = inner.process(&[&self.pending[start..end]][..], None)?;
            start = end;
            emit(
                &converted[0],
                &mut self.delay_left,
                &mut self.produced,
                u64::MAX,
                output,
            );
        }
        self.pending.drain(..start);
        Ok(())
    }

    /// Emit the tail still held in the filter and reset to a silent start
    pub fn flush(&mut self, output: &mut Vec<f32>) -> Result<(), ResamplerError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };

        let source = self.source_rate as u64;
        let expected = (self.consumed * self.target_rate as u64 + source / 2) / source;

        let mut first = true;
        while self.produced < expected {
            let converted = if first {
                first = false;
                inner.process_partial(Some(&[self.pending.as_slice()][..]), None)?
            } else {
                inner.process_partial(None::<&[&[f32]]>, None)?
            };
            if converted[0].is_empty() {
                break;
            }
            emit(
                &converted[0],
                &mut self.delay_left,
                &mut self.produced,
                expected,
                output,
            );
        }

        self.reset();
        Ok(())
    }

    /// Drop queued input and filter state, start over from silence
    pub fn reset(&mut self) {
        self.pending.clear();
        self.consumed = 0;
        self.produced = 0;
        self.delay_left = match self.inner.as_mut() {
            Some(inner) => {
                inner.reset();
                inner.output_delay()
            }
            None => 0,
        };
    }
}

/// Append `converted` past the remaining delay, stopping once `produced` hits `limit`
fn emit(
    converted: &[f32],
    delay_left: &mut usize,
    produced: &mut u64,
    limit: u64,
    output: &mut Vec<f32>,
) {
    let skip = (*delay_left).min(converted.len());
    *delay_left -= skip;
    let room = limit.saturating_sub(*produced).min(usize::MAX as u64) as usize;
    let take = (converted.len() - skip).min(room);
    output.extend_from_slice(&converted[skip..skip + take]);
    *produced += take as u64;
}
