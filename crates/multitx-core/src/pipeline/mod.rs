//! Transmit-rate signal path
//!
//! - Per-channel gate → tone → modulate → shift chain ([`channel`])
//! - Weighted sum and clipping of all channels ([`combiner`])

pub mod channel;
pub mod combiner;

pub use channel::ChannelPipeline;
pub use combiner::{Combiner, MixReport};
