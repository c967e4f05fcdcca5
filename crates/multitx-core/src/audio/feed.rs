//! Decoded audio queue between a channel's decode thread and the output path
//!
//! Each channel gets a bounded `HeapRb<f32>` of resampled audio. The
//! producer thread fills it from the playlist and sleeps while it is full;
//! the output path drains it and substitutes silence when it runs dry.

use super::playlist::PlaylistSource;
use super::resampler::{Resampler, ResamplerError};
use crate::stats::ChannelStats;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Poll interval while a queue is full (producer) or short (virtual clock)
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Writing half of a channel's audio queue
pub struct FeedProducer {
    producer: HeapProd<f32>,
    finished: Arc<AtomicBool>,
}

/// Reading half of a channel's audio queue
pub struct AudioFeed {
    consumer: HeapCons<f32>,
    finished: Arc<AtomicBool>,
}

/// Create a queue holding up to `capacity` samples
pub fn audio_feed(capacity: usize) -> (FeedProducer, AudioFeed) {
    let ring = HeapRb::<f32>::new(capacity.max(1));
    let (producer, consumer) = ring.split();
    let finished = Arc::new(AtomicBool::new(false));
    (
        FeedProducer {
            producer,
            finished: Arc::clone(&finished),
        },
        AudioFeed { consumer, finished },
    )
}

impl FeedProducer {
    /// Push as much of `samples` as fits; returns the count written
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    pub fn vacant(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Push all of `samples`, sleeping while the queue is full
    ///
    /// Returns `false` if `stop` was raised before everything was queued.
    pub fn push_all(&mut self, samples: &[f32], stop: &AtomicBool) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            offset += self.producer.push_slice(&samples[offset..]);
            if offset < samples.len() {
                if stop.load(Ordering::Acquire) {
                    return false;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
        true
    }

    /// Signal that no more audio will arrive
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

impl AudioFeed {
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// The producer has exited and will not push again
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Fill `out` from the queue, padding with silence; returns the underflow count
    pub fn pull(&mut self, out: &mut [f32]) -> usize {
        let read = self.consumer.pop_slice(out);
        out[read..].fill(0.0);
        out.len() - read
    }

    /// Wait until `samples` are queued, the producer finishes, or `timeout` passes
    ///
    /// Returns `true` when the samples are available.
    pub fn wait_for(&self, samples: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.available() >= samples {
                return true;
            }
            if self.is_finished() || Instant::now() >= deadline {
                return self.available() >= samples;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Handle to a running decode thread
pub struct ProducerHandle {
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ProducerHandle {
    /// Ask the decode thread to exit and wait for it
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }

    pub fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the `playlist-<id>` thread that decodes, resamples and queues audio
pub fn spawn_producer(
    source: PlaylistSource,
    target_rate: u32,
    feed: FeedProducer,
    stats: Arc<ChannelStats>,
) -> std::io::Result<ProducerHandle> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let flag_clone = Arc::clone(&stop_flag);
    let channel = stats.id();

    let thread = std::thread::Builder::new()
        .name(format!("playlist-{channel}"))
        .spawn(move || {
            let finished = Arc::clone(&feed.finished);
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                producer_loop(source, target_rate, feed, &stats, &flag_clone);
            }));
            // Consumers must never wait on a dead producer
            finished.store(true, Ordering::Release);
            match result {
                Ok(()) => tracing::debug!(channel, "Playlist thread exited"),
                Err(panic_info) => {
                    let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    tracing::error!(channel, panic = %msg, "Playlist thread PANICKED, channel is now silent");
                }
            }
        })?;

    Ok(ProducerHandle {
        stop_flag,
        thread: Some(thread),
    })
}

fn producer_loop(
    mut source: PlaylistSource,
    target_rate: u32,
    mut feed: FeedProducer,
    stats: &ChannelStats,
    stop: &AtomicBool,
) {
    let channel = stats.id();
    let mut resampler: Option<Resampler> = None;
    let mut resampled: Vec<f32> = Vec::with_capacity(crate::PCM_FRAME_SIZE * 2);

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }

        let step = match source.next_frame() {
            Some(frame) => convert_frame(
                &mut resampler,
                frame.samples,
                frame.sample_rate,
                target_rate,
                channel,
                &mut resampled,
            )
            .map(|()| false),
            None => match resampler.as_mut() {
                Some(r) => r.flush(&mut resampled).map(|()| true),
                None => Ok(true),
            },
        };
        let exhausted = match step {
            Ok(exhausted) => exhausted,
            Err(e) => {
                tracing::error!(channel, error = %e, "Resampler failed, channel is now silent");
                true
            }
        };

        let cursor = source.cursor();
        stats.set_playlist(cursor.skipped_entries, cursor.loops, source.is_silent());

        if !feed.push_all(&resampled, stop) {
            break;
        }
        resampled.clear();

        if exhausted {
            break;
        }
    }

    feed.finish();
}

/// Resample one decoded frame, rebuilding the converter when the file rate changes
fn convert_frame(
    resampler: &mut Option<Resampler>,
    samples: &[f32],
    sample_rate: u32,
    target_rate: u32,
    channel: u32,
    out: &mut Vec<f32>,
) -> Result<(), ResamplerError> {
    let rebuild = resampler
        .as_ref()
        .map(|r| r.source_rate() != sample_rate)
        .unwrap_or(true);
    if rebuild {
        if let Some(old) = resampler.as_mut() {
            old.flush(out)?;
        }
        tracing::debug!(
            channel,
            from = sample_rate,
            to = target_rate,
            "Resampler configured"
        );
        *resampler = Some(Resampler::new(sample_rate, target_rate)?);
    }
    match resampler.as_mut() {
        Some(r) => r.process(samples, out),
        None => Ok(()),
    }
}
