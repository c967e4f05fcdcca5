//! Transmit session lifecycle
//!
//! [`Transmitter::start`] validates the configuration, builds every channel
//! pipeline and starts one decode thread per channel. Blocks are rendered
//! either directly with [`Transmitter::render_block`] or by the `tx-output`
//! thread started with [`Transmitter::spawn`], which pushes them into a sink
//! until stopped, until a sample limit is reached, or until the sink fails.

use crate::audio::decoder::DecoderOpener;
use crate::audio::feed::{audio_feed, spawn_producer, AudioFeed, ProducerHandle};
use crate::audio::playlist::PlaylistSource;
use crate::config::{ConfigError, SessionConfig};
use crate::output::sink::{IqSink, SinkError, SinkSettings};
use crate::pipeline::{ChannelPipeline, Combiner, MixReport};
use crate::stats::{ChannelStats, SessionStats, StatsSnapshot};
use rustfft::num_complex::Complex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Minimum spacing between over-deviation warnings per channel
const OVER_DEVIATION_WARN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Output sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown channel id {0}")]
    UnknownChannel(u32),

    #[error("Output thread panicked: {0}")]
    Panicked(String),
}

/// How the output path paces itself against the decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockMode {
    /// Real-time streaming: never wait, substitute silence when audio is late
    #[default]
    Live,
    /// Offline rendering: wait for decoders up to the configured timeout
    Virtual,
}

struct Channel {
    pipeline: ChannelPipeline,
    feed: AudioFeed,
    producer: Option<ProducerHandle>,
    stats: Arc<ChannelStats>,
    stopped: bool,
    audio: Vec<f32>,
    block: Vec<Complex<f32>>,
    last_over_warn: Option<Instant>,
}

impl Channel {
    fn stop(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
        self.stopped = true;
        self.stats.mark_stopped();
    }

    /// Pull this block's audio from the feed, waiting only in virtual-clock mode
    fn fetch_audio(&mut self, needed: usize, clock: ClockMode, timeout: Duration) {
        self.audio.clear();
        self.audio.resize(needed, 0.0);

        if clock == ClockMode::Virtual
            && self.feed.available() < needed
            && !self.feed.is_finished()
            && !self.feed.wait_for(needed, timeout)
            && !self.feed.is_finished()
        {
            tracing::warn!(
                channel = self.pipeline.id(),
                needed,
                available = self.feed.available(),
                timeout_ms = timeout.as_millis() as u64,
                "Decoder fell behind, padding block with silence"
            );
        }

        // Silence after the playlist is exhausted is expected, not an underflow
        let finished = self.feed.is_finished();
        let underflow = self.feed.pull(&mut self.audio);
        if !finished {
            self.stats.add_underflow(underflow as u64);
        }
    }

    /// Count audio plus tone that drove the modulator past full deviation
    fn note_over_deviation(&mut self) {
        let count = self.pipeline.take_over_deviation();
        if count == 0 {
            return;
        }
        self.stats.add_over_deviation(count);

        let due = self
            .last_over_warn
            .map(|t| t.elapsed() >= OVER_DEVIATION_WARN_INTERVAL)
            .unwrap_or(true);
        if due {
            tracing::warn!(
                channel = self.pipeline.id(),
                samples = count,
                total = self.stats.over_deviation_samples(),
                "Modulation exceeds configured deviation, lower gain or tone level"
            );
            self.last_over_warn = Some(Instant::now());
        }
    }
}

/// A running multi-channel transmit session
pub struct Transmitter {
    config: Arc<SessionConfig>,
    channels: Vec<Channel>,
    combiner: Combiner,
    clock: ClockMode,
    stats: Arc<SessionStats>,
    decoder_timeout: Duration,
}

impl Transmitter {
    /// Validate `config`, build every channel and start the decode threads
    pub fn start(
        config: SessionConfig,
        opener: Arc<dyn DecoderOpener>,
        clock: ClockMode,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        for line in config.summary_lines() {
            tracing::info!("{line}");
        }

        let config = Arc::new(config);
        let tx = &config.transmitter;
        let stats = Arc::new(SessionStats::new(config.channels.iter().map(|c| c.id)));

        let mut channels = Vec::with_capacity(config.channels.len());
        for channel_config in &config.channels {
            let pipeline = ChannelPipeline::new(channel_config, tx)?;
            let channel_stats = stats
                .channel(channel_config.id)
                .cloned()
                .unwrap_or_else(|| Arc::new(ChannelStats::new(channel_config.id)));

            let (producer, feed) = audio_feed(tx.queue_capacity());
            let source = PlaylistSource::new(
                channel_config.id,
                channel_config.playlist.clone(),
                channel_config.loop_playlist,
                Arc::clone(&opener),
                crate::PCM_FRAME_SIZE,
            );
            let handle = spawn_producer(
                source,
                tx.audio_sample_rate,
                producer,
                Arc::clone(&channel_stats),
            )
            .map_err(|source| SessionError::Spawn {
                name: format!("playlist-{}", channel_config.id),
                source,
            })?;

            channels.push(Channel {
                pipeline,
                feed,
                producer: Some(handle),
                stats: channel_stats,
                stopped: false,
                audio: Vec::new(),
                block: Vec::new(),
                last_over_warn: None,
            });
        }

        let weights: Vec<f32> = config.channels.iter().map(|c| c.mix_weight).collect();
        let combiner = Combiner::new(tx.master_scale, tx.normalize_mix, &weights);
        let decoder_timeout = Duration::from_millis(tx.decoder_timeout_ms);

        tracing::info!(
            channels = channels.len(),
            clock = ?clock,
            tx_sample_rate = tx.tx_sample_rate,
            "Transmitter started"
        );

        Ok(Self {
            config,
            channels,
            combiner,
            clock,
            stats,
            decoder_timeout,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    /// Settings every sink is configured with
    pub fn sink_settings(&self) -> SinkSettings {
        let tx = &self.config.transmitter;
        SinkSettings {
            center_frequency_hz: tx.center_frequency_hz,
            sample_rate: tx.tx_sample_rate,
            gain_db: tx.tx_gain_db,
        }
    }

    /// Render the next `out.len()` composite samples
    pub fn render_block(&mut self, out: &mut [Complex<f32>]) -> MixReport {
        let ticks = out.len();
        let clock = self.clock;
        let timeout = self.decoder_timeout;

        for channel in self.channels.iter_mut().filter(|c| !c.stopped) {
            let needed = channel.pipeline.audio_needed(ticks);
            channel.fetch_audio(needed, clock, timeout);

            channel.block.resize(ticks, Complex::new(0.0, 0.0));
            channel.pipeline.render(&channel.audio, &mut channel.block[..ticks]);
            channel.note_over_deviation();

            let gate = channel.pipeline.gate_state();
            channel.stats.set_gate(gate.phase, gate.rms);
        }

        let inputs = self
            .channels
            .iter()
            .filter(|c| !c.stopped)
            .map(|c| (c.pipeline.mix_weight(), &c.block[..ticks]));
        let report = self.combiner.mix(inputs, out);

        self.stats.record_block(ticks as u64, report.clipped as u64);
        report
    }

    /// Silence one channel for the rest of the session
    pub fn stop_channel(&mut self, id: u32) -> Result<(), SessionError> {
        let channel = self
            .channels
            .iter_mut()
            .find(|c| c.pipeline.id() == id)
            .ok_or(SessionError::UnknownChannel(id))?;
        if !channel.stopped {
            channel.stop();
            tracing::info!(channel = id, "Channel stopped");
        }
        Ok(())
    }

    /// Wait (up to the decoder timeout) for each channel to queue one block of audio
    fn prime(&self) {
        let ticks = self.config.transmitter.block_size;
        for channel in self.channels.iter().filter(|c| !c.stopped) {
            let needed = channel.pipeline.audio_needed(ticks);
            channel.feed.wait_for(needed, self.decoder_timeout);
        }
    }

    /// Stream into `sink` on the calling thread until `stop`, `limit` samples, or a sink error
    pub fn run(
        &mut self,
        sink: &mut dyn IqSink,
        limit: Option<u64>,
        stop: &AtomicBool,
    ) -> Result<StatsSnapshot, SessionError> {
        sink.configure(&self.sink_settings())?;
        self.prime();

        let block_size = self.config.transmitter.block_size;
        let mut buffer = vec![Complex::new(0.0f32, 0.0); block_size];
        let mut emitted: u64 = 0;
        tracing::info!(sink = sink.name(), block_size, limit = ?limit, "Streaming started");

        while !stop.load(Ordering::Acquire) {
            let n = match limit {
                Some(limit) => (limit.saturating_sub(emitted)).min(block_size as u64) as usize,
                None => block_size,
            };
            if n == 0 {
                break;
            }

            self.render_block(&mut buffer[..n]);
            if let Err(e) = sink.push(&buffer[..n]) {
                tracing::error!(sink = sink.name(), error = %e, "Sink failed, stopping session");
                // Close out what was written so far; the push error is the one reported
                if let Err(finish) = sink.finish() {
                    tracing::warn!(sink = sink.name(), error = %finish, "Sink finish failed after error");
                }
                return Err(e.into());
            }
            emitted += n as u64;
        }

        sink.finish()?;
        let snapshot = self.stats.snapshot();
        tracing::info!(
            samples = snapshot.samples_emitted,
            seconds = snapshot.emitted_seconds(self.config.transmitter.tx_sample_rate),
            clipped = snapshot.clipped_samples,
            "Streaming finished"
        );
        Ok(snapshot)
    }

    /// Stop every decode thread
    pub fn shutdown(&mut self) {
        for channel in &mut self.channels {
            if let Some(mut producer) = channel.producer.take() {
                producer.stop();
            }
        }
    }

    /// Run the session on the `tx-output` thread
    pub fn spawn(
        self,
        sink: Box<dyn IqSink>,
        limit: Option<u64>,
    ) -> Result<SessionHandle, SessionError> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&stop_flag);
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);
        let stats = self.stats();

        let thread = std::thread::Builder::new()
            .name("tx-output".into())
            .spawn(move || {
                let mut transmitter = self;
                let mut sink = sink;
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    transmitter.run(sink.as_mut(), limit, &flag_clone)
                }));
                transmitter.shutdown();
                running_clone.store(false, Ordering::Release);

                match result {
                    Ok(outcome) => outcome,
                    Err(panic_info) => {
                        let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = panic_info.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        tracing::error!(panic = %msg, "Output thread PANICKED");
                        Err(SessionError::Panicked(msg))
                    }
                }
            })
            .map_err(|source| SessionError::Spawn {
                name: "tx-output".to_string(),
                source,
            })?;

        Ok(SessionHandle {
            stop_flag,
            running,
            stats,
            thread: Some(thread),
        })
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to a session running on the `tx-output` thread
pub struct SessionHandle {
    stop_flag: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
    thread: Option<std::thread::JoinHandle<Result<StatsSnapshot, SessionError>>>,
}

impl SessionHandle {
    /// Ask the output thread to stop after the current block
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait for the output thread and return its outcome
    pub fn wait(mut self) -> Result<StatsSnapshot, SessionError> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(SessionError::Panicked("output thread".to_string()))),
            None => Ok(self.stats.snapshot()),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }
}
