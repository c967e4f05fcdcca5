//! Sub-audible squelch tone generation
//!
//! Produces the CTCSS sine or the DCS/CDCSS code stream that is added to a
//! channel's gated audio. The generators run continuously and never look at
//! the activity gate, so receivers keep their squelch open through pauses.

use crate::config::{ConfigError, CtcssConfig, DcsConfig, ToneConfig};
use crate::dsp::wrap_phase;
use std::f64::consts::TAU;

/// Length of a DCS code word in bits
pub const DCS_WORD_BITS: usize = 23;

/// Golay(23,12) parity rows, one per data bit
const GOLAY_PARITY_ROWS: [u16; 12] = [
    0b11110000101,
    0b01111000011,
    0b00111100011,
    0b10011110001,
    0b11001111000,
    0b11100111100,
    0b01110011110,
    0b00111001111,
    0b10001100111,
    0b11000110011,
    0b11100011001,
    0b11110001100,
];

/// A parsed DCS code such as `023`, `D023N` or `754I`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DcsCode {
    value: u16,
    inverted: bool,
}

impl DcsCode {
    /// Parse a code with optional `D` prefix and `N`/`I` suffix
    ///
    /// # Example
    /// ```
    /// use multitx_core::dsp::tone::DcsCode;
    ///
    /// let code = DcsCode::parse("D23I").unwrap();
    /// assert_eq!(code.digits(), "023");
    /// assert!(code.is_inverted());
    /// ```
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidDcsCode {
            code: text.to_string(),
            reason: reason.to_string(),
        };

        let upper = text.trim().to_ascii_uppercase();
        let mut body = upper.strip_prefix('D').unwrap_or(&upper);
        let mut inverted = false;
        if let Some(stripped) = body.strip_suffix('I') {
            inverted = true;
            body = stripped;
        } else if let Some(stripped) = body.strip_suffix('N') {
            body = stripped;
        }

        if body.is_empty() {
            return Err(invalid("no octal digits"));
        }
        if body.len() > 3 {
            return Err(invalid("more than three octal digits"));
        }
        if !body.chars().all(|c| ('0'..='7').contains(&c)) {
            return Err(invalid("expected octal digits"));
        }

        let value = u16::from_str_radix(body, 8).map_err(|_| invalid("expected octal digits"))?;
        Ok(Self { value, inverted })
    }

    /// Zero-padded three digit octal form
    pub fn digits(&self) -> String {
        format!("{:03o}", self.value)
    }

    /// Whether the inverted (`I`) form was requested
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// The 23-bit transmitted word: 12 data bits followed by 11 Golay parity bits
    pub fn word(&self) -> [bool; DCS_WORD_BITS] {
        let mut data = [false; 12];
        for digit in 0..3 {
            let octal = (self.value >> (3 * (2 - digit))) & 0x7;
            for bit in 0..3 {
                data[digit * 3 + bit] = (octal >> (2 - bit)) & 0x1 == 1;
            }
        }

        let [a, b, c, d, e, f, g, h, i, ..] = data;
        data[9] = a ^ d ^ e ^ g;
        data[10] = b ^ e ^ f ^ h;
        data[11] = c ^ f ^ g ^ i;

        let parity = data
            .iter()
            .zip(GOLAY_PARITY_ROWS.iter())
            .filter(|(bit, _)| **bit)
            .fold(0u16, |acc, (_, row)| acc ^ row);

        let mut word = [false; DCS_WORD_BITS];
        word[..12].copy_from_slice(&data);
        for (k, slot) in word[12..].iter_mut().enumerate() {
            *slot = (parity >> k) & 0x1 == 1;
        }

        if self.inverted {
            for bit in &mut word {
                *bit = !*bit;
            }
        }
        word
    }
}

/// Continuous CTCSS sine
#[derive(Debug, Clone)]
pub struct CtcssGenerator {
    phase: f64,
    step: f64,
    amplitude: f32,
}

impl CtcssGenerator {
    pub fn new(frequency_hz: f64, amplitude: f32, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency_hz / sample_rate as f64,
            amplitude,
        }
    }

    pub fn next_sample(&mut self) -> f32 {
        let sample = self.amplitude * self.phase.sin() as f32;
        self.phase = wrap_phase(self.phase + self.step);
        sample
    }
}

/// Repeating DCS code word as a smoothed NRZ bit stream
#[derive(Debug, Clone)]
pub struct DcsGenerator {
    word: [bool; DCS_WORD_BITS],
    bit_index: usize,
    /// Position inside the current bit, 0.0..1.0
    bit_clock: f64,
    bit_step: f64,
    amplitude: f32,
    alternate_polarity: bool,
    odd_repetition: bool,
    /// Two cascaded one-pole low-pass stages
    smooth: [f32; 2],
    smooth_coeff: f32,
}

impl DcsGenerator {
    pub fn new(
        code: DcsCode,
        baud_rate: f64,
        amplitude: f32,
        alternate_polarity: bool,
        sample_rate: u32,
    ) -> Self {
        let word = code.word();
        let cutoff = 2.0 * baud_rate;
        let smooth_coeff = 1.0 - (-TAU * cutoff / sample_rate as f64).exp();
        let initial = if word[0] { amplitude } else { -amplitude };

        Self {
            word,
            bit_index: 0,
            bit_clock: 0.0,
            bit_step: baud_rate / sample_rate as f64,
            amplitude,
            alternate_polarity,
            odd_repetition: false,
            smooth: [initial; 2],
            smooth_coeff: smooth_coeff as f32,
        }
    }

    pub fn next_sample(&mut self) -> f32 {
        let mut bit = self.word[self.bit_index];
        if self.alternate_polarity && self.odd_repetition {
            bit = !bit;
        }
        let target = if bit { self.amplitude } else { -self.amplitude };

        self.smooth[0] += self.smooth_coeff * (target - self.smooth[0]);
        self.smooth[1] += self.smooth_coeff * (self.smooth[0] - self.smooth[1]);

        self.bit_clock += self.bit_step;
        if self.bit_clock >= 1.0 {
            self.bit_clock -= 1.0;
            self.bit_index += 1;
            if self.bit_index == DCS_WORD_BITS {
                self.bit_index = 0;
                self.odd_repetition = !self.odd_repetition;
            }
        }

        self.smooth[1]
    }

    /// Index of the bit currently being sent
    pub fn bit_index(&self) -> usize {
        self.bit_index
    }

    pub fn word(&self) -> &[bool; DCS_WORD_BITS] {
        &self.word
    }
}

/// A channel's squelch signalling source
#[derive(Debug, Clone)]
pub enum ToneInjector {
    Ctcss(CtcssGenerator),
    Dcs(DcsGenerator),
}

impl ToneInjector {
    /// Build the injector for a channel, or `None` when no tone is configured
    pub fn from_config(
        tone: &ToneConfig,
        deviation_hz: f64,
        sample_rate: u32,
    ) -> Result<Option<Self>, ConfigError> {
        let injector = match tone {
            ToneConfig::None => None,
            ToneConfig::Ctcss(CtcssConfig {
                frequency_hz,
                level,
            }) => Some(ToneInjector::Ctcss(CtcssGenerator::new(
                *frequency_hz,
                level.amplitude(deviation_hz),
                sample_rate,
            ))),
            ToneConfig::Dcs(DcsConfig {
                code,
                baud_rate,
                level,
                alternate_polarity,
            }) => Some(ToneInjector::Dcs(DcsGenerator::new(
                DcsCode::parse(code)?,
                *baud_rate,
                level.amplitude(deviation_hz),
                *alternate_polarity,
                sample_rate,
            ))),
        };
        Ok(injector)
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        match self {
            ToneInjector::Ctcss(gen) => gen.next_sample(),
            ToneInjector::Dcs(gen) => gen.next_sample(),
        }
    }

    /// Peak amplitude in normalized modulation units
    pub fn amplitude(&self) -> f32 {
        match self {
            ToneInjector::Ctcss(gen) => gen.amplitude,
            ToneInjector::Dcs(gen) => gen.amplitude,
        }
    }
}
