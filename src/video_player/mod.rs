// SPDX-License-Identifier: MPL-2.0
//! Video playback engine.
//!
//! This module provides the two decode paths (FFmpeg video to RGBA, FFmpeg
//! audio to s16 stereo), the cpal audio sink, the presentation clock and the
//! single-threaded [`Player`] that ties them together.

pub mod audio;
pub mod audio_output;
mod backend;
mod decoder;
mod player;
pub mod sync;
pub mod time_units;

pub use audio::{AudioDecoder, FfmpegAudioDecoder, PcmChunk};
pub use audio_output::{
    AudioSink, AudioVoice, BufferCompletion, CpalVoice, PcmBuffer, ReleaseOnEnd,
};
pub use backend::{FfmpegBackend, MediaBackend};
pub use decoder::{copy_rgba_rows, FfmpegVideoDecoder, VideoDecoder, VideoFrame};
pub use player::{ExitReason, PlaybackSummary, Player};
pub use sync::{MonotonicClock, Pacing, PlaybackClock, SyncMode, TimeSource};
