// SPDX-License-Identifier: MPL-2.0
//! Playback session and the single-threaded dispatch loop.
//!
//! One thread reads packets, routes them to the matching decode path, paces
//! and presents video, and pushes audio to the device. The only other thread
//! is the audio device's callback.

use super::audio::AudioDecoder;
use super::audio_output::{AudioSink, AudioVoice, BufferCompletion, ReleaseOnEnd};
use super::backend::MediaBackend;
use super::decoder::VideoDecoder;
use super::sync::{Pacing, PlaybackClock, SyncMode, TimeSource};
use super::time_units::secs_to_millis;
use crate::config::PlaybackSettings;
use crate::display::{self, DisplayControl, DisplaySink};
use crate::error::{Result, VideoError};
use crate::media::{Demuxer, StreamKind};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Why playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    EndOfInput,
    WindowClosed,
    EscapePressed,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::EndOfInput => write!(f, "end of input"),
            ExitReason::WindowClosed => write!(f, "window closed"),
            ExitReason::EscapePressed => write!(f, "escape pressed"),
        }
    }
}

/// Counters reported when playback ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub exit_reason: ExitReason,
    pub frames_presented: u64,
    /// Frames presented behind schedule.
    pub late_frames: u64,
    /// Frames skipped by the converter or the display.
    pub rejected_frames: u64,
    pub audio_buffers_submitted: u64,
    pub audio_frames_dropped: u64,
    /// Submits that waited on a full device queue.
    pub audio_stalls: u64,
    /// Device callbacks that found no queued audio.
    pub audio_underruns: u64,
}

impl PlaybackSummary {
    fn new(exit_reason: ExitReason) -> Self {
        Self {
            exit_reason,
            frames_presented: 0,
            late_frames: 0,
            rejected_frames: 0,
            audio_buffers_submitted: 0,
            audio_frames_dropped: 0,
            audio_stalls: 0,
            audio_underruns: 0,
        }
    }
}

/// Decoder plus device voice. Decoder (and its resampler) drops first.
struct AudioSession<B: MediaBackend> {
    stream_index: usize,
    decoder: B::Audio,
    sink: AudioSink<B::Voice>,
}

impl<B: MediaBackend> AudioSession<B> {
    /// Decodes one packet (or drains on `None`) and submits all produced PCM.
    fn feed<T: TimeSource + ?Sized>(&mut self, packet: Option<&B::Packet>, time: &T) {
        match packet {
            Some(packet) => {
                if !self.decoder.send_packet(packet) {
                    return;
                }
            }
            None => self.decoder.send_eof(),
        }
        while let Some(chunk) = self.decoder.receive_pcm() {
            self.sink.submit(&chunk, time);
        }
    }
}

/// Everything one playback owns.
///
/// Field order is teardown order: video decoder and converter, audio decoder
/// and resampler, audio voice, window, container.
struct Session<B: MediaBackend> {
    video: B::Video,
    audio: Option<AudioSession<B>>,
    display: B::Display,
    input: B::Input,
    video_stream: usize,
}

/// Plays media files through a [`MediaBackend`].
pub struct Player<'a, B: MediaBackend> {
    backend: &'a B,
    settings: PlaybackSettings,
    completion: Arc<dyn BufferCompletion>,
}

impl<'a, B: MediaBackend> Player<'a, B> {
    pub fn new(backend: &'a B, settings: PlaybackSettings) -> Self {
        Self {
            backend,
            settings,
            completion: Arc::new(ReleaseOnEnd),
        }
    }

    /// Replaces the handler that receives finished audio buffers.
    #[must_use]
    pub fn with_completion(mut self, completion: Arc<dyn BufferCompletion>) -> Self {
        self.completion = completion;
        self
    }

    /// Plays `path` to the end, or until the window is closed or Escape is
    /// pressed. All handles are released before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, has no video stream,
    /// or its video decoder or window cannot be created. Audio setup
    /// failures only disable audio.
    pub fn play<T: TimeSource + ?Sized>(&self, path: &Path, time: &T) -> Result<PlaybackSummary> {
        let mut session = self.open_session(path)?;
        let summary = self.run(&mut session, time);
        log::debug!("Tearing down playback session");
        drop(session);
        Ok(summary)
    }

    fn open_session(&self, path: &Path) -> Result<Session<B>> {
        let input = self.backend.open_input(path)?;

        let stream = input
            .best_stream(StreamKind::Video)
            .ok_or(VideoError::NoVideoStream)?;
        let video = self.backend.open_video_decoder(&input, &stream)?;
        let size = video.size();
        log::info!(
            "Video stream #{}: {} {}x{}",
            stream.index,
            stream.codec_name,
            size.width,
            size.height
        );

        let title = display::window_title(self.settings.window_title.as_deref(), path);
        let display = self.backend.open_display(&title, size, &self.settings)?;

        let audio = if self.settings.audio_enabled {
            self.open_audio(&input)
        } else {
            log::info!("Audio disabled by configuration");
            None
        };

        if audio.is_some() && self.settings.sync_mode == SyncMode::Video {
            log::warn!(
                "Audio and video are paced independently and may drift on long files; \
                 use --sync audio to follow the audio clock"
            );
        }

        Ok(Session {
            video,
            audio,
            display,
            input,
            video_stream: stream.index,
        })
    }

    fn open_audio(&self, input: &B::Input) -> Option<AudioSession<B>> {
        let stream = input.best_stream(StreamKind::Audio)?;

        let mut voice = match self.backend.open_voice(Arc::clone(&self.completion)) {
            Ok(voice) => voice,
            Err(e) => {
                log::warn!("Audio disabled: {e}");
                return None;
            }
        };
        if let Err(e) = voice.start() {
            log::warn!("Audio disabled: {e}");
            return None;
        }
        let output_rate = voice.sample_rate();

        let decoder = match self
            .backend
            .open_audio_decoder(input, &stream, output_rate)
        {
            Ok(decoder) => decoder,
            Err(e) => {
                log::warn!("Audio disabled: {e}");
                return None;
            }
        };
        let sink = AudioSink::new(voice, &self.settings);

        log::info!(
            "Audio stream #{}: {} resampled to {output_rate} Hz stereo",
            stream.index,
            stream.codec_name
        );
        Some(AudioSession {
            stream_index: stream.index,
            decoder,
            sink,
        })
    }

    fn run<T: TimeSource + ?Sized>(&self, session: &mut Session<B>, time: &T) -> PlaybackSummary {
        let mut clock = PlaybackClock::from_settings(&self.settings);
        let mut summary = PlaybackSummary::new(ExitReason::EndOfInput);

        let exit_reason = loop {
            let Some(packet) = session.input.next_packet() else {
                break drain(session, &mut clock, &mut summary, time);
            };
            let index = <B::Input as Demuxer>::stream_index(&packet);

            if index == session.video_stream {
                if !session.video.send_packet(&packet) {
                    continue;
                }
                if let Some(reason) = present_frames(session, &mut clock, &mut summary, time) {
                    break reason;
                }
            } else if let Some(audio) = session
                .audio
                .as_mut()
                .filter(|audio| audio.stream_index == index)
            {
                audio.feed(Some(&packet), time);
            }
        };

        summary.exit_reason = exit_reason;
        summary.rejected_frames += session.video.rejected_frames();
        if let Some(audio) = session.audio.as_ref() {
            summary.audio_buffers_submitted = audio.sink.buffers_submitted();
            summary.audio_frames_dropped = audio.decoder.dropped_frames();
            summary.audio_stalls = audio.sink.stalls();
            summary.audio_underruns = audio.sink.underruns();
        }

        log::info!(
            "Playback ended ({}): {} frames presented, {} late, {} rejected; \
             {} audio buffers submitted, {} audio frames dropped, {} stalls, {} underruns",
            summary.exit_reason,
            summary.frames_presented,
            summary.late_frames,
            summary.rejected_frames,
            summary.audio_buffers_submitted,
            summary.audio_frames_dropped,
            summary.audio_stalls,
            summary.audio_underruns
        );
        summary
    }
}

/// Flushes both decoders once input is exhausted.
fn drain<B: MediaBackend, T: TimeSource + ?Sized>(
    session: &mut Session<B>,
    clock: &mut PlaybackClock,
    summary: &mut PlaybackSummary,
    time: &T,
) -> ExitReason {
    if let Some(audio) = session.audio.as_mut() {
        audio.feed(None, time);
    }
    session.video.send_eof();
    present_frames(session, clock, summary, time).unwrap_or(ExitReason::EndOfInput)
}

/// Paces and presents every frame the video decoder has ready, polling the
/// window after each. Returns the exit reason if the user asked to stop.
fn present_frames<B: MediaBackend, T: TimeSource + ?Sized>(
    session: &mut Session<B>,
    clock: &mut PlaybackClock,
    summary: &mut PlaybackSummary,
    time: &T,
) -> Option<ExitReason> {
    let Session {
        video,
        audio,
        display,
        ..
    } = session;

    while let Some(frame) = video.receive_frame() {
        let audio_position = audio.as_ref().and_then(|audio| audio.sink.position_secs());
        if let Pacing::Late(behind) = clock.pace(frame.pts_secs, time, audio_position) {
            summary.late_frames += 1;
            log::trace!(
                "Frame at {:?}s is {:.1}ms late",
                frame.pts_secs,
                secs_to_millis(behind.as_secs_f64())
            );
        }

        match display.present(&frame) {
            Ok(()) => summary.frames_presented += 1,
            Err(e) => {
                summary.rejected_frames += 1;
                log::warn!("{e}");
            }
        }

        match display.poll_events() {
            DisplayControl::Continue => {}
            DisplayControl::CloseRequested => return Some(ExitReason::WindowClosed),
            DisplayControl::EscapePressed => return Some(ExitReason::EscapePressed),
        }
    }
    None
}
