// SPDX-License-Identifier: MPL-2.0
//! Factory for the collaborators a playback session is built from.

use super::audio::{AudioDecoder, FfmpegAudioDecoder};
use super::audio_output::{AudioVoice, BufferCompletion, CpalVoice};
use super::decoder::{FfmpegVideoDecoder, VideoDecoder};
use crate::config::PlaybackSettings;
use crate::display::{DisplaySink, WindowDisplay};
use crate::error::{Error, Result, VideoError};
use crate::media::{Demuxer, FfmpegInput, FrameSize, StreamInfo};
use std::path::Path;
use std::sync::Arc;

/// Opens every handle a session needs. All handles release themselves on
/// drop; the player never calls explicit close functions.
pub trait MediaBackend {
    type Packet;
    type Input: Demuxer<Packet = Self::Packet>;
    type Video: VideoDecoder<Packet = Self::Packet>;
    type Audio: AudioDecoder<Packet = Self::Packet>;
    type Voice: AudioVoice;
    type Display: DisplaySink;

    /// Opens and probes a media file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened or parsed.
    fn open_input(&self, path: &Path) -> Result<Self::Input>;

    /// Opens the video decoder and RGBA converter for `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Video`] if the decoder or converter cannot be created.
    fn open_video_decoder(&self, input: &Self::Input, stream: &StreamInfo) -> Result<Self::Video>;

    /// Opens a window sized to `size`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Display`] on window or GPU setup failure.
    fn open_display(
        &self,
        title: &str,
        size: FrameSize,
        settings: &PlaybackSettings,
    ) -> Result<Self::Display>;

    /// Opens the default audio device. Finished buffers go to `completion`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if no usable device exists.
    fn open_voice(&self, completion: Arc<dyn BufferCompletion>) -> Result<Self::Voice>;

    /// Opens the audio decoder for `stream`, resampling to `output_rate`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if the decoder or resampler cannot be created.
    fn open_audio_decoder(
        &self,
        input: &Self::Input,
        stream: &StreamInfo,
        output_rate: u32,
    ) -> Result<Self::Audio>;
}

/// FFmpeg demuxing and decoding, cpal output, winit + wgpu display.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    type Packet = ffmpeg_next::Packet;
    type Input = FfmpegInput;
    type Video = FfmpegVideoDecoder;
    type Audio = FfmpegAudioDecoder;
    type Voice = CpalVoice;
    type Display = WindowDisplay;

    fn open_input(&self, path: &Path) -> Result<Self::Input> {
        FfmpegInput::open(path)
    }

    fn open_video_decoder(&self, input: &Self::Input, stream: &StreamInfo) -> Result<Self::Video> {
        let parameters = input.parameters(stream.index).ok_or_else(|| {
            VideoError::DecoderOpen(format!("stream {} has no parameters", stream.index))
        })?;
        FfmpegVideoDecoder::open(parameters, stream)
    }

    fn open_display(
        &self,
        title: &str,
        size: FrameSize,
        settings: &PlaybackSettings,
    ) -> Result<Self::Display> {
        WindowDisplay::open(title, size, settings.vsync)
    }

    fn open_voice(&self, completion: Arc<dyn BufferCompletion>) -> Result<Self::Voice> {
        CpalVoice::open(completion)
    }

    fn open_audio_decoder(
        &self,
        input: &Self::Input,
        stream: &StreamInfo,
        output_rate: u32,
    ) -> Result<Self::Audio> {
        let parameters = input
            .parameters(stream.index)
            .ok_or_else(|| Error::Audio(format!("stream {} has no parameters", stream.index)))?;
        FfmpegAudioDecoder::open(parameters, stream, output_rate)
    }
}
