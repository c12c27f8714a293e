// SPDX-License-Identifier: MPL-2.0
//! Audio output using cpal.
//!
//! PCM reaches the device as independently allocated [`PcmBuffer`]s. Ownership
//! moves into the voice on [`AudioVoice::submit`], and the device hands each
//! buffer to the session's [`BufferCompletion`] once it has been played.
//! Buffers still queued when the voice stops take the same path, so every
//! buffer is released exactly once.
//!
//! Flow control lives in [`AudioSink`]: before each submit it waits while the
//! voice already holds the configured maximum of pending buffers.

use super::audio::{PcmChunk, BYTES_PER_FRAME, BYTES_PER_SAMPLE, OUTPUT_CHANNELS};
use super::sync::TimeSource;
use crate::config::PlaybackSettings;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// A heap-allocated block of interleaved s16 stereo PCM.
///
/// Not `Clone`: there is exactly one owner at any time.
#[derive(Debug)]
pub struct PcmBuffer {
    id: u64,
    bytes: Box<[u8]>,
}

impl PcmBuffer {
    /// Copies `bytes` into a new buffer with a process-unique id.
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            bytes: bytes.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of whole stereo frames in the buffer.
    pub fn frames(&self) -> usize {
        self.bytes.len() / BYTES_PER_FRAME
    }

    /// Reads the stereo frame at `index` as (left, right).
    fn frame(&self, index: usize) -> (i16, i16) {
        let offset = index * BYTES_PER_FRAME;
        let left = i16::from_ne_bytes([self.bytes[offset], self.bytes[offset + 1]]);
        let right = i16::from_ne_bytes([
            self.bytes[offset + BYTES_PER_SAMPLE],
            self.bytes[offset + BYTES_PER_SAMPLE + 1],
        ]);
        (left, right)
    }
}

/// Receives every buffer once the device is done with it.
///
/// Called from the device's callback thread. Implementations must not call
/// back into the voice.
pub trait BufferCompletion: Send + Sync {
    fn on_buffer_end(&self, buffer: PcmBuffer);
}

/// Completion handler that simply frees each buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReleaseOnEnd;

impl BufferCompletion for ReleaseOnEnd {
    fn on_buffer_end(&self, buffer: PcmBuffer) {
        log::trace!("Releasing audio buffer {}", buffer.id());
        drop(buffer);
    }
}

/// A hardware voice that plays queued PCM buffers asynchronously.
pub trait AudioVoice {
    /// Sample rate the device runs at. PCM must already be at this rate.
    fn sample_rate(&self) -> u32;

    /// Queues a buffer for playback, taking ownership of it.
    fn submit(&mut self, buffer: PcmBuffer);

    /// Buffers queued but not yet fully played.
    fn pending(&self) -> usize;

    /// Stereo frames the device has consumed since creation.
    fn frames_played(&self) -> u64;

    /// Device callbacks that ran out of queued PCM and output silence.
    fn underruns(&self) -> u64;

    /// Starts or resumes output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if the device refuses to start.
    fn start(&mut self) -> Result<()>;

    /// Stops output and releases every queued buffer through the completion
    /// handler.
    fn stop(&mut self);
}

/// Bounded submitter in front of an [`AudioVoice`].
pub struct AudioSink<V: AudioVoice> {
    voice: V,
    max_pending: usize,
    poll: Duration,
    audio_epoch: Option<f64>,
    submitted: u64,
    stalls: u64,
}

impl<V: AudioVoice> AudioSink<V> {
    pub fn new(voice: V, settings: &PlaybackSettings) -> Self {
        Self {
            voice,
            max_pending: settings.max_pending_buffers.max(1),
            poll: settings.backpressure_poll,
            audio_epoch: None,
            submitted: 0,
            stalls: 0,
        }
    }

    /// Copies `chunk` into a new buffer and submits it, first sleeping in
    /// poll-sized steps while the voice is saturated.
    ///
    /// The wait is unbounded; it ends only when the device drains a buffer.
    /// Empty chunks are ignored.
    pub fn submit<T: TimeSource + ?Sized>(&mut self, chunk: &PcmChunk<'_>, time: &T) {
        if chunk.frames == 0 || chunk.bytes.is_empty() {
            return;
        }

        let pending = self.voice.pending();
        if pending >= self.max_pending {
            self.stalls += 1;
            log::debug!("Audio queue full ({pending} pending), waiting for the device");
            while self.voice.pending() >= self.max_pending {
                time.sleep(self.poll);
            }
        }

        if self.audio_epoch.is_none() {
            self.audio_epoch = Some(chunk.pts_secs.unwrap_or(0.0));
        }
        self.voice.submit(PcmBuffer::new(chunk.bytes));
        self.submitted += 1;
    }

    /// Stream time of the sample the device is currently playing.
    ///
    /// `None` before any audio has played and whenever the queue is empty:
    /// a starved device plays silence, so its position no longer moves.
    #[allow(clippy::cast_precision_loss)]
    pub fn position_secs(&self) -> Option<f64> {
        let epoch = self.audio_epoch?;
        if self.voice.pending() == 0 {
            return None;
        }
        let played = self.voice.frames_played();
        let rate = self.voice.sample_rate();
        (played > 0 && rate > 0).then(|| epoch + played as f64 / f64::from(rate))
    }

    pub fn buffers_submitted(&self) -> u64 {
        self.submitted
    }

    /// Number of submits that had to wait for the device.
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    pub fn underruns(&self) -> u64 {
        self.voice.underruns()
    }
}

/// Buffer queue shared with the device callback.
#[derive(Default)]
struct PlaybackQueue {
    buffers: VecDeque<PcmBuffer>,
    /// Next frame to play in the front buffer.
    cursor: usize,
}

struct VoiceShared {
    queue: Mutex<PlaybackQueue>,
    pending: AtomicUsize,
    frames_played: AtomicU64,
    underruns: AtomicU64,
    completion: Arc<dyn BufferCompletion>,
}

impl VoiceShared {
    fn new(completion: Arc<dyn BufferCompletion>) -> Self {
        Self {
            queue: Mutex::new(PlaybackQueue::default()),
            pending: AtomicUsize::new(0),
            frames_played: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            completion,
        }
    }

    fn push(&self, buffer: PcmBuffer) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.buffers.push_back(buffer);
        self.pending.fetch_add(1, Ordering::Release);
    }

    /// Fills one device callback worth of interleaved output.
    fn fill<T: cpal::SizedSample + cpal::FromSample<i16>>(&self, data: &mut [T], channels: usize) {
        let silence = T::from_sample(0i16);
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let mut played = 0u64;
        let mut starved = false;

        for out in data.chunks_mut(channels) {
            match self.next_frame(&mut queue) {
                Some((left, right)) => {
                    played += 1;
                    map_stereo_frame(left, right, out, silence);
                }
                None => {
                    starved = true;
                    out.fill(silence);
                }
            }
        }

        self.frames_played.fetch_add(played, Ordering::Release);
        if starved {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Pops the next stereo frame, releasing buffers as they finish.
    fn next_frame(&self, queue: &mut PlaybackQueue) -> Option<(i16, i16)> {
        loop {
            let front = queue.buffers.front()?;
            if queue.cursor < front.frames() {
                let frame = front.frame(queue.cursor);
                queue.cursor += 1;
                return Some(frame);
            }
            self.finish_front(queue);
        }
    }

    fn finish_front(&self, queue: &mut PlaybackQueue) {
        queue.cursor = 0;
        if let Some(buffer) = queue.buffers.pop_front() {
            self.pending.fetch_sub(1, Ordering::Release);
            self.completion.on_buffer_end(buffer);
        }
    }

    /// Releases every queued buffer through the completion handler.
    fn flush(&self) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        while !queue.buffers.is_empty() {
            self.finish_front(&mut queue);
        }
    }
}

/// Writes one stereo frame onto a device frame of any channel count.
///
/// Mono devices get the average of both channels; channels beyond the
/// first two get silence.
fn map_stereo_frame<T: Copy + cpal::FromSample<i16>>(left: i16, right: i16, out: &mut [T], silence: T) {
    match out {
        [] => {}
        [mono] => {
            #[allow(clippy::cast_possible_truncation)]
            let mixed = ((i32::from(left) + i32::from(right)) / 2) as i16;
            *mono = T::from_sample(mixed);
        }
        [l, r, rest @ ..] => {
            *l = T::from_sample(left);
            *r = T::from_sample(right);
            rest.fill(silence);
        }
    }
}

/// [`AudioVoice`] on the system's default output device.
///
/// Field order is drop order: the stream is torn down before the shared
/// queue. [`Drop`] stops output and flushes pending buffers first.
pub struct CpalVoice {
    stream: cpal::Stream,
    shared: Arc<VoiceShared>,
    sample_rate: u32,
}

impl CpalVoice {
    /// Opens a stream on the default output device with its default config.
    ///
    /// The stream starts paused; call [`AudioVoice::start`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if no device exists, its configuration cannot
    /// be read, its sample format is not f32, i16 or u16, or the stream
    /// cannot be built.
    pub fn open(completion: Arc<dyn BufferCompletion>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("No audio output device found".to_string()))?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::Audio(format!("Failed to get audio config: {e}")))?;

        let sample_rate = supported_config.sample_rate();
        let channels = supported_config.channels();
        let sample_format = supported_config.sample_format();
        let config: cpal::StreamConfig = supported_config.into();

        let shared = Arc::new(VoiceShared::new(completion));

        let stream = match sample_format {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, &shared)?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, &shared)?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, &shared)?,
            other => {
                return Err(Error::Audio(format!(
                    "Unsupported audio sample format: {other}"
                )))
            }
        };

        // Some hosts start streams on creation.
        if let Err(e) = stream.pause() {
            log::debug!("Audio stream could not be paused after creation: {e}");
        }
        log::info!("Audio device: {sample_rate} Hz, {channels} channels, {sample_format}");

        Ok(Self {
            stream,
            shared,
            sample_rate,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<i16>>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        shared: &Arc<VoiceShared>,
    ) -> Result<cpal::Stream> {
        let shared = Arc::clone(shared);
        let channels = usize::from(config.channels.max(1));
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    shared.fill(data, channels);
                },
                |err| {
                    log::warn!("Audio output error: {err}");
                },
                None,
            )
            .map_err(|e| Error::Audio(format!("Failed to build audio stream: {e}")))
    }

}

impl AudioVoice for CpalVoice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn submit(&mut self, buffer: PcmBuffer) {
        self.shared.push(buffer);
    }

    fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    fn frames_played(&self) -> u64 {
        self.shared.frames_played.load(Ordering::Acquire)
    }

    fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| Error::Audio(format!("Failed to start audio stream: {e}")))
    }

    fn stop(&mut self) {
        if let Err(e) = self.stream.pause() {
            log::debug!("Failed to pause audio stream: {e}");
        }
        self.shared.flush();
    }
}

impl Drop for CpalVoice {
    fn drop(&mut self) {
        self.stop();
    }
}

// PcmBuffer::frame reads exactly two channels.
const _: () = assert!(OUTPUT_CHANNELS == 2);
