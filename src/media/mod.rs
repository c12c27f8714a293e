// SPDX-License-Identifier: MPL-2.0
//! Container access and the stream descriptions shared by both decode paths.
//!
//! The [`Demuxer`] trait is the seam between the dispatch loop and the
//! container library; [`container::FfmpegInput`] is the production reader.

pub mod container;

use crate::error::{Error, Result};
use std::sync::OnceLock;

pub use container::FfmpegInput;

/// Result of the one-time FFmpeg initialization.
static FFMPEG_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize FFmpeg with appropriate log level.
///
/// Safe to call multiple times; a failure on the first call is reported to
/// every later caller as well. The FFmpeg log level is lowered to ERROR so
/// container warnings don't flood the terminal.
pub fn init_ffmpeg() -> Result<()> {
    FFMPEG_INIT
        .get_or_init(|| {
            ffmpeg_next::init().map_err(|e| format!("FFmpeg initialization failed: {e}"))?;
            ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
            Ok(())
        })
        .clone()
        .map_err(Error::Io)
}

/// Kind of elementary stream the player cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

/// Description of one elementary stream inside a container.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Index of the stream within the container; packets carry the same index.
    pub index: usize,
    pub kind: StreamKind,
    /// Seconds per timestamp tick.
    pub time_base: f64,
    /// Short codec name (e.g. "h264", "aac").
    pub codec_name: String,
}

impl StreamInfo {
    /// Converts a raw timestamp in this stream's time base to seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn ticks_to_secs(&self, ticks: i64) -> f64 {
        ticks as f64 * self.time_base
    }
}

/// Pixel dimensions of the video frames, fixed for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one tightly packed row of RGBA pixels.
    pub fn rgba_row_bytes(self) -> usize {
        self.width as usize * 4
    }

    /// Bytes in a full tightly packed RGBA frame.
    pub fn rgba_len(self) -> usize {
        self.rgba_row_bytes() * self.height as usize
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Reads a container packet by packet.
///
/// Implementations choose the "best" stream of each kind and yield packets
/// tagged with their stream index. End of input and read errors both end
/// the packet sequence.
pub trait Demuxer {
    type Packet;

    /// Returns the preferred stream of the given kind, if any.
    fn best_stream(&self, kind: StreamKind) -> Option<StreamInfo>;

    /// Reads the next packet, or `None` once input is exhausted.
    fn next_packet(&mut self) -> Option<Self::Packet>;

    /// Returns the index of the stream a packet belongs to.
    fn stream_index(packet: &Self::Packet) -> usize;
}
