//! Playlist traversal
//!
//! [`PlaylistSource`] walks a channel's ordered file list and hands out
//! decoded PCM frames. Bad entries are skipped, the list optionally loops,
//! and once the source goes [`PlaybackStatus::Silent`] it stays silent.

use super::decoder::{DecoderOpener, PcmDecoder};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Whether a playlist still produces audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Playing,
    Silent,
}

/// Position within a playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistCursor {
    /// Entry currently being decoded
    pub file_index: usize,
    /// Samples already read from that entry
    pub sample_offset: u64,
    pub status: PlaybackStatus,
    /// Completed passes over the whole list
    pub loops: u64,
    /// Entries that failed to open or decode
    pub skipped_entries: u64,
}

/// A block of decoded samples at the native rate of its file
#[derive(Debug)]
pub struct PcmFrame<'a> {
    pub sample_rate: u32,
    pub samples: &'a [f32],
}

pub struct PlaylistSource {
    channel: u32,
    entries: Vec<PathBuf>,
    loop_playlist: bool,
    opener: Arc<dyn DecoderOpener>,
    decoder: Option<Box<dyn PcmDecoder>>,
    cursor: PlaylistCursor,
    /// Samples produced since the current pass started
    pass_samples: u64,
    frame: Vec<f32>,
}

impl PlaylistSource {
    pub fn new(
        channel: u32,
        entries: Vec<PathBuf>,
        loop_playlist: bool,
        opener: Arc<dyn DecoderOpener>,
        frame_size: usize,
    ) -> Self {
        let status = if entries.is_empty() {
            tracing::info!(channel, "Empty playlist, channel carries tone only");
            PlaybackStatus::Silent
        } else {
            PlaybackStatus::Playing
        };

        Self {
            channel,
            entries,
            loop_playlist,
            opener,
            decoder: None,
            cursor: PlaylistCursor {
                file_index: 0,
                sample_offset: 0,
                status,
                loops: 0,
                skipped_entries: 0,
            },
            pass_samples: 0,
            frame: vec![0.0; frame_size.max(1)],
        }
    }

    pub fn cursor(&self) -> &PlaylistCursor {
        &self.cursor
    }

    pub fn is_silent(&self) -> bool {
        self.cursor.status == PlaybackStatus::Silent
    }

    fn go_silent(&mut self) {
        self.decoder = None;
        self.cursor.status = PlaybackStatus::Silent;
    }

    fn skip_current(&mut self) {
        self.decoder = None;
        self.cursor.skipped_entries += 1;
        self.cursor.file_index += 1;
    }

    /// Move to the start of the next pass, or go silent
    fn end_of_pass(&mut self) {
        let channel = self.channel;
        if !self.loop_playlist {
            tracing::info!(channel, "Playlist finished, channel is now silent");
            self.go_silent();
        } else if self.pass_samples == 0 {
            tracing::error!(
                channel,
                skipped = self.cursor.skipped_entries,
                "No playable audio in playlist, channel is now silent"
            );
            self.go_silent();
        } else {
            self.cursor.file_index = 0;
            self.cursor.loops += 1;
            self.pass_samples = 0;
            tracing::debug!(channel, loops = self.cursor.loops, "Playlist looped");
        }
    }

    /// Open the entry under the cursor, skipping entries that cannot be opened
    fn open_current(&mut self) {
        let channel = self.channel;
        let path = &self.entries[self.cursor.file_index];
        match self.opener.open(path) {
            Ok(decoder) if decoder.sample_rate() == 0 => {
                tracing::warn!(channel, path = %path.display(), "Skipping entry with zero sample rate");
                self.skip_current();
            }
            Ok(decoder) => {
                tracing::debug!(
                    channel,
                    path = %path.display(),
                    sample_rate = decoder.sample_rate(),
                    "Opened playlist entry"
                );
                self.decoder = Some(decoder);
                self.cursor.sample_offset = 0;
            }
            Err(e) => {
                tracing::warn!(channel, path = %path.display(), error = %e, "Skipping unreadable entry");
                self.skip_current();
            }
        }
    }

    /// Next block of decoded audio, or `None` once the channel is silent
    pub fn next_frame(&mut self) -> Option<PcmFrame<'_>> {
        loop {
            if self.is_silent() {
                return None;
            }

            if self.decoder.is_none() {
                if self.cursor.file_index >= self.entries.len() {
                    self.end_of_pass();
                    continue;
                }
                self.open_current();
                continue;
            }

            let (sample_rate, result) = match self.decoder.as_mut() {
                Some(decoder) => (decoder.sample_rate(), decoder.read(&mut self.frame)),
                None => continue,
            };

            match result {
                Ok(0) => {
                    self.decoder = None;
                    self.cursor.file_index += 1;
                }
                Ok(n) => {
                    self.cursor.sample_offset += n as u64;
                    self.pass_samples += n as u64;
                    return Some(PcmFrame {
                        sample_rate,
                        samples: &self.frame[..n],
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        channel = self.channel,
                        path = %self.entries[self.cursor.file_index].display(),
                        offset = self.cursor.sample_offset,
                        error = %e,
                        "Decode failed, skipping rest of entry"
                    );
                    self.skip_current();
                }
            }
        }
    }
}
