//! Live session statistics
//!
//! Counters are plain atomics so the output thread, the decode threads and
//! any observer can touch them without locking. [`SessionStats::snapshot`]
//! collects them into a serializable [`StatsSnapshot`].

use crate::audio::gate::GatePhase;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Counters for one channel
#[derive(Debug)]
pub struct ChannelStats {
    id: u32,
    underflow_samples: AtomicU64,
    /// Audio samples that drove the modulator past full deviation
    over_deviation_samples: AtomicU64,
    skipped_entries: AtomicU64,
    loops: AtomicU64,
    silent: AtomicBool,
    stopped: AtomicBool,
    gate_phase: AtomicU8,
    /// f32 bits of the last gate RMS measurement
    gate_rms: AtomicU32,
}

impl ChannelStats {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            underflow_samples: AtomicU64::new(0),
            over_deviation_samples: AtomicU64::new(0),
            skipped_entries: AtomicU64::new(0),
            loops: AtomicU64::new(0),
            silent: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            gate_phase: AtomicU8::new(GatePhase::Closed as u8),
            gate_rms: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn add_underflow(&self, samples: u64) {
        if samples > 0 {
            self.underflow_samples.fetch_add(samples, Ordering::Relaxed);
        }
    }

    pub fn underflow_samples(&self) -> u64 {
        self.underflow_samples.load(Ordering::Relaxed)
    }

    pub fn add_over_deviation(&self, samples: u64) {
        self.over_deviation_samples.fetch_add(samples, Ordering::Relaxed);
    }

    pub fn over_deviation_samples(&self) -> u64 {
        self.over_deviation_samples.load(Ordering::Relaxed)
    }

    /// Mirror the playlist cursor counters
    pub fn set_playlist(&self, skipped_entries: u64, loops: u64, silent: bool) {
        self.skipped_entries.store(skipped_entries, Ordering::Relaxed);
        self.loops.store(loops, Ordering::Relaxed);
        self.silent.store(silent, Ordering::Relaxed);
    }

    pub fn skipped_entries(&self) -> u64 {
        self.skipped_entries.load(Ordering::Relaxed)
    }

    pub fn loops(&self) -> u64 {
        self.loops.load(Ordering::Relaxed)
    }

    pub fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn set_gate(&self, phase: GatePhase, rms: f32) {
        self.gate_phase.store(phase as u8, Ordering::Relaxed);
        self.gate_rms.store(rms.to_bits(), Ordering::Relaxed);
    }

    pub fn gate_phase(&self) -> GatePhase {
        GatePhase::from_u8(self.gate_phase.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            id: self.id,
            underflow_samples: self.underflow_samples(),
            over_deviation_samples: self.over_deviation_samples(),
            skipped_entries: self.skipped_entries(),
            loops: self.loops(),
            silent: self.silent.load(Ordering::Relaxed),
            stopped: self.stopped.load(Ordering::Relaxed),
            gate_phase: self.gate_phase(),
            gate_rms: f32::from_bits(self.gate_rms.load(Ordering::Relaxed)),
        }
    }
}

/// Counters for a whole session
#[derive(Debug)]
pub struct SessionStats {
    started_at: DateTime<Utc>,
    samples_emitted: AtomicU64,
    blocks_emitted: AtomicU64,
    clipped_samples: AtomicU64,
    channels: Vec<Arc<ChannelStats>>,
}

impl SessionStats {
    pub fn new(channel_ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            started_at: Utc::now(),
            samples_emitted: AtomicU64::new(0),
            blocks_emitted: AtomicU64::new(0),
            clipped_samples: AtomicU64::new(0),
            channels: channel_ids
                .into_iter()
                .map(|id| Arc::new(ChannelStats::new(id)))
                .collect(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record one composite block handed to the sink
    pub fn record_block(&self, samples: u64, clipped: u64) {
        self.samples_emitted.fetch_add(samples, Ordering::Relaxed);
        self.blocks_emitted.fetch_add(1, Ordering::Relaxed);
        if clipped > 0 {
            self.clipped_samples.fetch_add(clipped, Ordering::Relaxed);
        }
    }

    pub fn samples_emitted(&self) -> u64 {
        self.samples_emitted.load(Ordering::Relaxed)
    }

    pub fn clipped_samples(&self) -> u64 {
        self.clipped_samples.load(Ordering::Relaxed)
    }

    pub fn channel(&self, id: u32) -> Option<&Arc<ChannelStats>> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn channels(&self) -> &[Arc<ChannelStats>] {
        &self.channels
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            samples_emitted: self.samples_emitted(),
            blocks_emitted: self.blocks_emitted.load(Ordering::Relaxed),
            clipped_samples: self.clipped_samples(),
            channels: self.channels.iter().map(|c| c.snapshot()).collect(),
        }
    }
}

/// Point-in-time copy of one channel's counters
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub id: u32,
    pub underflow_samples: u64,
    pub over_deviation_samples: u64,
    pub skipped_entries: u64,
    pub loops: u64,
    pub silent: bool,
    pub stopped: bool,
    pub gate_phase: GatePhase,
    pub gate_rms: f32,
}

/// Point-in-time copy of the session counters
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub samples_emitted: u64,
    pub blocks_emitted: u64,
    pub clipped_samples: u64,
    pub channels: Vec<ChannelSnapshot>,
}

impl StatsSnapshot {
    /// Seconds of composite output at the given transmit rate
    pub fn emitted_seconds(&self, tx_sample_rate: u32) -> f64 {
        self.samples_emitted as f64 / tx_sample_rate.max(1) as f64
    }
}
