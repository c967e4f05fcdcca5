//! Sink push interface
//!
//! The output thread configures a sink once with the session's RF settings,
//! then pushes composite blocks in order. A sink error ends the session.

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by output sinks; all of them stop the session
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode capture manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Radio driver disconnected")]
    Disconnected,

    #[error("Radio driver did not accept samples for {0:?}")]
    Stalled(Duration),

    #[error("Radio driver fault: {0}")]
    Fault(String),

    #[error("Sink received samples before it was configured")]
    NotConfigured,
}

/// RF parameters handed to a sink before streaming
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SinkSettings {
    pub center_frequency_hz: f64,
    pub sample_rate: u32,
    pub gain_db: f32,
}

/// Destination for the composite stream
pub trait IqSink: Send {
    /// Called once before the first block
    fn configure(&mut self, settings: &SinkSettings) -> Result<(), SinkError>;

    /// Accept the next block of composite samples
    fn push(&mut self, block: &[Complex<f32>]) -> Result<(), SinkError>;

    /// Called once after the last block
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Messages delivered to a radio driver through a [`LiveSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Configure(SinkSettings),
    Block(Vec<Complex<f32>>),
    Finish,
}

type FaultSlot = Arc<Mutex<Option<String>>>;

fn take_fault(slot: &FaultSlot) -> Option<String> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

/// Sink feeding an external radio driver over a bounded channel
///
/// `push` blocks while the driver is behind, up to the stall timeout.
pub struct LiveSink {
    sender: crossbeam_channel::Sender<SinkEvent>,
    fault: FaultSlot,
    stall_timeout: Duration,
    configured: bool,
}

/// Driver side of a [`LiveSink`]
pub struct LiveSinkReceiver {
    receiver: crossbeam_channel::Receiver<SinkEvent>,
    fault: FaultSlot,
}

/// Create a live sink holding up to `capacity` blocks in flight
pub fn live_sink(capacity: usize, stall_timeout: Duration) -> (LiveSink, LiveSinkReceiver) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    let fault: FaultSlot = Arc::new(Mutex::new(None));
    (
        LiveSink {
            sender,
            fault: Arc::clone(&fault),
            stall_timeout,
            configured: false,
        },
        LiveSinkReceiver { receiver, fault },
    )
}

impl LiveSink {
    fn send(&self, event: SinkEvent) -> Result<(), SinkError> {
        if let Some(fault) = take_fault(&self.fault) {
            return Err(SinkError::Fault(fault));
        }
        self.sender
            .send_timeout(event, self.stall_timeout)
            .map_err(|e| match e {
                crossbeam_channel::SendTimeoutError::Timeout(_) => {
                    SinkError::Stalled(self.stall_timeout)
                }
                crossbeam_channel::SendTimeoutError::Disconnected(_) => SinkError::Disconnected,
            })
    }
}

impl IqSink for LiveSink {
    fn configure(&mut self, settings: &SinkSettings) -> Result<(), SinkError> {
        self.send(SinkEvent::Configure(*settings))?;
        self.configured = true;
        tracing::info!(
            center_hz = settings.center_frequency_hz,
            sample_rate = settings.sample_rate,
            gain_db = settings.gain_db,
            "Live sink configured"
        );
        Ok(())
    }

    fn push(&mut self, block: &[Complex<f32>]) -> Result<(), SinkError> {
        if !self.configured {
            return Err(SinkError::NotConfigured);
        }
        self.send(SinkEvent::Block(block.to_vec()))
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.send(SinkEvent::Finish)
    }

    fn name(&self) -> &str {
        "live"
    }
}

impl LiveSinkReceiver {
    /// Next event, blocking; `None` once the sink is gone and drained
    pub fn recv(&self) -> Option<SinkEvent> {
        self.receiver.recv().ok()
    }

    /// Next event if one arrives within `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SinkEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Blocks waiting to be taken by the driver
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Report a driver failure (e.g. transmit underrun); the next push fails with it
    pub fn report_fault(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(fault = %message, "Radio driver reported a fault");
        match self.fault.lock() {
            Ok(mut guard) => *guard = Some(message),
            Err(poisoned) => *poisoned.into_inner() = Some(message),
        }
    }
}

/// Forwards every call to several sinks, stopping at the first error
pub struct TeeSink {
    sinks: Vec<Box<dyn IqSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Box<dyn IqSink>>) -> Self {
        Self { sinks }
    }
}

impl IqSink for TeeSink {
    fn configure(&mut self, settings: &SinkSettings) -> Result<(), SinkError> {
        self.sinks.iter_mut().try_for_each(|s| s.configure(settings))
    }

    fn push(&mut self, block: &[Complex<f32>]) -> Result<(), SinkError> {
        self.sinks.iter_mut().try_for_each(|s| s.push(block))
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.sinks.iter_mut().try_for_each(|s| s.finish())
    }

    fn name(&self) -> &str {
        "tee"
    }
}

/// Discards samples, counting them
#[derive(Debug, Default)]
pub struct NullSink {
    pub samples: u64,
    pub settings: Option<SinkSettings>,
}

impl IqSink for NullSink {
    fn configure(&mut self, settings: &SinkSettings) -> Result<(), SinkError> {
        self.settings = Some(*settings);
        Ok(())
    }

    fn push(&mut self, block: &[Complex<f32>]) -> Result<(), SinkError> {
        self.samples += block.len() as u64;
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}
