//! One channel's DSP chain at the transmit rate
//!
//! Audio samples enter at the audio rate and pass through the activity
//! gate, the tone injector and the modulator. The modulator phase is then
//! interpolated across the transmit ticks of each audio period and shifted
//! to the channel's offset. Tick timing is kept as an exact fraction
//! (`audio_rate / tx_rate`), so the number of audio samples a block
//! consumes is known before it is rendered.

use crate::audio::gate::{ActivityGate, GateState};
use crate::config::{ChannelConfig, ConfigError, ToneScaling, TransmitterConfig};
use crate::dsp::modulator::NbfmModulator;
use crate::dsp::shifter::FrequencyShifter;
use crate::dsp::tone::ToneInjector;
use rustfft::num_complex::Complex;

pub struct ChannelPipeline {
    id: u32,
    gain: f32,
    tone_gain: f32,
    mix_weight: f32,
    gate: ActivityGate,
    tone: Option<ToneInjector>,
    modulator: NbfmModulator,
    shifter: FrequencyShifter,
    audio_rate: u64,
    tx_rate: u64,
    /// Position inside the current audio period, in units of 1/tx_rate
    tick: u64,
}

impl ChannelPipeline {
    pub fn new(channel: &ChannelConfig, tx: &TransmitterConfig) -> Result<Self, ConfigError> {
        let deviation = channel.deviation_hz(tx);
        let tone = ToneInjector::from_config(&channel.tone, deviation, tx.audio_sample_rate)?;
        let tone_gain = match channel.tone_scaling {
            ToneScaling::Fixed => 1.0,
            ToneScaling::ChannelGain => channel.gain,
        };

        Ok(Self {
            id: channel.id,
            gain: channel.gain,
            tone_gain,
            mix_weight: channel.mix_weight,
            gate: ActivityGate::new(&channel.gate, tx.audio_sample_rate),
            tone,
            modulator: NbfmModulator::new(deviation, tx.audio_sample_rate),
            shifter: FrequencyShifter::new(channel.offset_hz(tx), tx.tx_sample_rate),
            audio_rate: tx.audio_sample_rate as u64,
            tx_rate: tx.tx_sample_rate as u64,
            // The first tick always starts a new audio period
            tick: tx.tx_sample_rate as u64,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn mix_weight(&self) -> f32 {
        self.mix_weight
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn offset_hz(&self) -> f64 {
        self.shifter.offset_hz()
    }

    /// Audio samples since the last call whose modulation input exceeded full scale
    pub fn take_over_deviation(&mut self) -> u64 {
        self.modulator.take_over_deviation()
    }

    /// Audio samples consumed by the next `ticks` transmit samples
    pub fn audio_needed(&self, ticks: usize) -> usize {
        if ticks == 0 {
            return 0;
        }
        ((self.tick + (ticks as u64 - 1) * self.audio_rate) / self.tx_rate) as usize
    }

    /// Modulation input for one audio sample: gated, scaled audio plus tone
    #[inline]
    fn condition(&mut self, sample: f32) -> f32 {
        let gated = self.gate.process(sample);
        let tone = self.tone.as_mut().map(|t| t.next_sample()).unwrap_or(0.0);
        gated * self.gain + tone * self.tone_gain
    }

    /// Render `out.len()` transmit samples from `audio`
    ///
    /// `audio` should hold [`Self::audio_needed`] samples; missing samples are
    /// treated as silence.
    pub fn render(&mut self, audio: &[f32], out: &mut [Complex<f32>]) {
        let mut audio = audio.iter().copied();
        let tx_rate = self.tx_rate as f64;

        for slot in out.iter_mut() {
            if self.tick >= self.tx_rate {
                self.tick -= self.tx_rate;
                let sample = audio.next().unwrap_or(0.0);
                let input = self.condition(sample);
                self.modulator.load(input);
            }
            let phasor = self.modulator.interpolate(self.tick as f64 / tx_rate);
            *slot = self.shifter.shift(phasor);
            self.tick += self.audio_rate;
        }
    }
}
