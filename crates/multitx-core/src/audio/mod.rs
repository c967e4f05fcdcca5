//! Audio side of each channel
//!
//! - Decoder interface and WAV/MP3/in-memory implementations ([`decoder`])
//! - Playlist traversal with looping and skip-on-error ([`playlist`])
//! - Sinc rate conversion through `rubato` ([`resampler`])
//! - Bounded queue and decode thread per channel ([`feed`])
//! - Sliding RMS activity gate with attack/release ramps ([`gate`])
//! - Duty-cycle report for audio files ([`activity`])

pub mod activity;
pub mod decoder;
pub mod feed;
pub mod gate;
pub mod playlist;
pub mod resampler;
