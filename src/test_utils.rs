// SPDX-License-Identifier: MPL-2.0
//! Test utilities: float assertions, a manual clock and an instrumented
//! in-memory media backend.
//!
//! The float assertions re-export the `approx` crate's macros, which handle
//! floating-point precision issues that `assert_eq!` cannot.

// Re-export approx macros for convenient use in tests
pub use approx::assert_abs_diff_eq;

use crate::config::PlaybackSettings;
use crate::display::{DisplayControl, DisplaySink};
use crate::error::{Error, Result};
use crate::media::{Demuxer, FrameSize, StreamInfo, StreamKind};
use crate::video_player::audio::BYTES_PER_FRAME;
use crate::video_player::{
    AudioDecoder, AudioVoice, BufferCompletion, MediaBackend, PcmBuffer, PcmChunk, TimeSource,
    VideoDecoder, VideoFrame,
};
use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==========================================================================
// Clock
// ==========================================================================

/// [`TimeSource`] that only moves when slept on or advanced.
///
/// Clones share the same timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
    slept: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward without counting it as sleep.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn total_slept(&self) -> Duration {
        self.slept.get()
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        self.slept.set(self.slept.get() + duration);
    }
}

// ==========================================================================
// Buffer completion
// ==========================================================================

/// Completion handler that records every released buffer id.
#[derive(Debug, Default)]
pub struct TrackingCompletion {
    state: Mutex<TrackingState>,
}

#[derive(Debug, Default)]
struct TrackingState {
    released: HashSet<u64>,
    duplicates: Vec<u64>,
}

impl TrackingCompletion {
    pub fn released(&self) -> usize {
        self.state.lock().unwrap().released.len()
    }

    /// Ids released more than once.
    pub fn duplicates(&self) -> Vec<u64> {
        self.state.lock().unwrap().duplicates.clone()
    }
}

impl BufferCompletion for TrackingCompletion {
    fn on_buffer_end(&self, buffer: PcmBuffer) {
        let mut state = self.state.lock().unwrap();
        if !state.released.insert(buffer.id()) {
            state.duplicates.push(buffer.id());
        }
    }
}

// ==========================================================================
// Fake media backend
// ==========================================================================

const VIDEO_STREAM: usize = 0;
const AUDIO_STREAM: usize = 1;
const FAKE_FRAME_SIZE: FrameSize = FrameSize {
    width: 4,
    height: 2,
};
const FAKE_PCM_FRAMES: usize = 256;
const FAKE_DEVICE_RATE: u32 = 48_000;
/// Fake device plays one buffer per this much clock time.
const FAKE_BUFFER_PERIOD: Duration = Duration::from_millis(5);

/// Description of the file a [`FakeBackend`] pretends to open.
#[derive(Debug, Clone, Default)]
pub struct FakeMedia {
    video_pts: Option<Vec<Option<f64>>>,
    audio_packets: usize,
    empty_audio_packets: usize,
    audio_first: bool,
    present_cost: Duration,
    control_after: Option<(usize, DisplayControl)>,
    failing_voice: bool,
    failing_display: bool,
}

impl FakeMedia {
    pub fn with_video_frames(timestamps: &[f64]) -> Self {
        Self::with_video_pts(&timestamps.iter().copied().map(Some).collect::<Vec<_>>())
    }

    pub fn with_video_pts(timestamps: &[Option<f64>]) -> Self {
        Self {
            video_pts: Some(timestamps.to_vec()),
            ..Self::default()
        }
    }

    pub fn audio_only(packets: usize) -> Self {
        Self {
            audio_packets: packets,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_audio_packets(mut self, packets: usize) -> Self {
        self.audio_packets = packets;
        self
    }

    /// The first `packets` audio packets decode to zero PCM frames.
    #[must_use]
    pub fn with_empty_audio_packets(mut self, packets: usize) -> Self {
        self.empty_audio_packets = packets;
        self
    }

    /// Puts every audio packet ahead of the video in the container.
    #[must_use]
    pub fn with_audio_first(mut self) -> Self {
        self.audio_first = true;
        self
    }

    /// Each present advances the clock by this long.
    #[must_use]
    pub fn with_present_cost_ms(mut self, ms: u64) -> Self {
        self.present_cost = Duration::from_millis(ms);
        self
    }

    /// The window reports `control` once `presents` frames have been shown.
    #[must_use]
    pub fn with_control_after(mut self, presents: usize, control: DisplayControl) -> Self {
        self.control_after = Some((presents, control));
        self
    }

    #[must_use]
    pub fn with_failing_voice(mut self) -> Self {
        self.failing_voice = true;
        self
    }

    #[must_use]
    pub fn with_failing_display(mut self) -> Self {
        self.failing_display = true;
        self
    }

    fn packets(&self) -> VecDeque<FakePacket> {
        let video = self.video_pts.iter().flatten().map(|&pts| FakePacket {
            stream: VIDEO_STREAM,
            pts,
            empty: false,
        });
        #[allow(clippy::cast_precision_loss)]
        let audio = (0..self.audio_packets).map(|i| FakePacket {
            stream: AUDIO_STREAM,
            pts: Some(i as f64 * 0.02),
            empty: i < self.empty_audio_packets,
        });
        if self.audio_first {
            audio.chain(video).collect()
        } else {
            video.chain(audio).collect()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FakePacket {
    stream: usize,
    pts: Option<f64>,
    /// Audio packet that decodes to no samples.
    empty: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    live: i64,
    drop_log: Vec<&'static str>,
    presented: Vec<(Option<f64>, Duration)>,
    displays_opened: usize,
    voices_opened: usize,
    max_pending_seen: usize,
}

/// Counts a live handle until dropped, then logs its name.
struct HandleGuard {
    name: &'static str,
    state: Rc<RefCell<FakeState>>,
}

impl HandleGuard {
    fn new(name: &'static str, state: &Rc<RefCell<FakeState>>) -> Self {
        state.borrow_mut().live += 1;
        Self {
            name,
            state: Rc::clone(state),
        }
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.live -= 1;
        state.drop_log.push(self.name);
    }
}

/// In-memory [`MediaBackend`] that records what the player does with it.
pub struct FakeBackend {
    media: FakeMedia,
    clock: ManualClock,
    state: Rc<RefCell<FakeState>>,
}

impl FakeBackend {
    pub fn new(media: FakeMedia) -> Self {
        Self {
            media,
            clock: ManualClock::new(),
            state: Rc::default(),
        }
    }

    /// The clock the fake display and voice observe.
    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    pub fn live_handles(&self) -> i64 {
        self.state.borrow().live
    }

    pub fn take_drop_log(&self) -> Vec<&'static str> {
        std::mem::take(&mut self.state.borrow_mut().drop_log)
    }

    pub fn presented_timestamps(&self) -> Vec<f64> {
        self.state
            .borrow()
            .presented
            .iter()
            .filter_map(|(pts, _)| *pts)
            .collect()
    }

    /// Clock time at each present.
    pub fn presented_at(&self) -> Vec<Duration> {
        self.state
            .borrow()
            .presented
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn displays_opened(&self) -> usize {
        self.state.borrow().displays_opened
    }

    pub fn voices_opened(&self) -> usize {
        self.state.borrow().voices_opened
    }

    pub fn max_pending_seen(&self) -> usize {
        self.state.borrow().max_pending_seen
    }
}

pub struct FakeInput {
    packets: VecDeque<FakePacket>,
    has_video: bool,
    has_audio: bool,
    _guard: HandleGuard,
}

impl Demuxer for FakeInput {
    type Packet = FakePacket;

    fn best_stream(&self, kind: StreamKind) -> Option<StreamInfo> {
        let index = match kind {
            StreamKind::Video if self.has_video => VIDEO_STREAM,
            StreamKind::Audio if self.has_audio => AUDIO_STREAM,
            _ => return None,
        };
        Some(StreamInfo {
            index,
            kind,
            time_base: 1.0 / 90_000.0,
            codec_name: "fake".to_string(),
        })
    }

    fn next_packet(&mut self) -> Option<Self::Packet> {
        self.packets.pop_front()
    }

    fn stream_index(packet: &Self::Packet) -> usize {
        packet.stream
    }
}

pub struct FakeVideoDecoder {
    ready: VecDeque<Option<f64>>,
    rgba: Vec<u8>,
    _guard: HandleGuard,
}

impl VideoDecoder for FakeVideoDecoder {
    type Packet = FakePacket;

    fn size(&self) -> FrameSize {
        FAKE_FRAME_SIZE
    }

    fn send_packet(&mut self, packet: &Self::Packet) -> bool {
        self.ready.push_back(packet.pts);
        true
    }

    fn send_eof(&mut self) {}

    fn receive_frame(&mut self) -> Option<VideoFrame<'_>> {
        let pts_secs = self.ready.pop_front()?;
        Some(VideoFrame {
            rgba: &self.rgba,
            size: FAKE_FRAME_SIZE,
            pts_secs,
        })
    }

    fn rejected_frames(&self) -> u64 {
        0
    }
}

pub struct FakeAudioDecoder {
    ready: VecDeque<FakePacket>,
    pcm: Vec<u8>,
    _guard: HandleGuard,
}

impl AudioDecoder for FakeAudioDecoder {
    type Packet = FakePacket;

    fn output_rate(&self) -> u32 {
        FAKE_DEVICE_RATE
    }

    fn send_packet(&mut self, packet: &Self::Packet) -> bool {
        self.ready.push_back(*packet);
        true
    }

    fn send_eof(&mut self) {}

    fn receive_pcm(&mut self) -> Option<PcmChunk<'_>> {
        let packet = self.ready.pop_front()?;
        let (bytes, frames) = if packet.empty {
            (&self.pcm[..0], 0)
        } else {
            (&self.pcm[..], FAKE_PCM_FRAMES)
        };
        Some(PcmChunk {
            bytes,
            frames,
            pts_secs: packet.pts,
        })
    }

    fn dropped_frames(&self) -> u64 {
        0
    }
}

/// Voice whose device finishes one buffer per [`FAKE_BUFFER_PERIOD`] of
/// clock time. A period with nothing queued counts as an underrun.
pub struct FakeVoice {
    clock: ManualClock,
    queue: RefCell<VecDeque<PcmBuffer>>,
    drained_until: Cell<Duration>,
    frames_played: Cell<u64>,
    underruns: Cell<u64>,
    completion: Arc<dyn BufferCompletion>,
    state: Rc<RefCell<FakeState>>,
    _guard: HandleGuard,
}

impl FakeVoice {
    fn drain(&self) {
        let mut queue = self.queue.borrow_mut();
        while self.clock.now() >= self.drained_until.get() + FAKE_BUFFER_PERIOD {
            self.drained_until
                .set(self.drained_until.get() + FAKE_BUFFER_PERIOD);
            match queue.pop_front() {
                Some(buffer) => {
                    self.frames_played
                        .set(self.frames_played.get() + buffer.frames() as u64);
                    self.completion.on_buffer_end(buffer);
                }
                None => self.underruns.set(self.underruns.get() + 1),
            }
        }
    }
}

impl AudioVoice for FakeVoice {
    fn sample_rate(&self) -> u32 {
        FAKE_DEVICE_RATE
    }

    fn submit(&mut self, buffer: PcmBuffer) {
        let mut queue = self.queue.borrow_mut();
        queue.push_back(buffer);
        let mut state = self.state.borrow_mut();
        state.max_pending_seen = state.max_pending_seen.max(queue.len());
    }

    fn pending(&self) -> usize {
        self.drain();
        self.queue.borrow().len()
    }

    fn frames_played(&self) -> u64 {
        self.frames_played.get()
    }

    fn underruns(&self) -> u64 {
        self.underruns.get()
    }

    fn start(&mut self) -> Result<()> {
        self.drained_until.set(self.clock.now());
        Ok(())
    }

    fn stop(&mut self) {
        for buffer in self.queue.borrow_mut().drain(..) {
            self.completion.on_buffer_end(buffer);
        }
    }
}

impl Drop for FakeVoice {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct FakeDisplay {
    clock: ManualClock,
    present_cost: Duration,
    control_after: Option<(usize, DisplayControl)>,
    presents: usize,
    state: Rc<RefCell<FakeState>>,
    _guard: HandleGuard,
}

impl DisplaySink for FakeDisplay {
    fn present(&mut self, frame: &VideoFrame<'_>) -> Result<()> {
        assert_eq!(frame.rgba.len(), frame.size.rgba_len());
        self.state
            .borrow_mut()
            .presented
            .push((frame.pts_secs, self.clock.now()));
        self.presents += 1;
        self.clock.advance(self.present_cost);
        Ok(())
    }

    fn poll_events(&mut self) -> DisplayControl {
        match self.control_after {
            Some((after, control)) if self.presents >= after => control,
            _ => DisplayControl::Continue,
        }
    }
}

impl MediaBackend for FakeBackend {
    type Packet = FakePacket;
    type Input = FakeInput;
    type Video = FakeVideoDecoder;
    type Audio = FakeAudioDecoder;
    type Voice = FakeVoice;
    type Display = FakeDisplay;

    fn open_input(&self, _path: &Path) -> Result<Self::Input> {
        Ok(FakeInput {
            packets: self.media.packets(),
            has_video: self.media.video_pts.is_some(),
            has_audio: self.media.audio_packets > 0,
            _guard: HandleGuard::new("input", &self.state),
        })
    }

    fn open_video_decoder(
        &self,
        _input: &Self::Input,
        _stream: &StreamInfo,
    ) -> Result<Self::Video> {
        Ok(FakeVideoDecoder {
            ready: VecDeque::new(),
            rgba: vec![0x80; FAKE_FRAME_SIZE.rgba_len()],
            _guard: HandleGuard::new("video decoder", &self.state),
        })
    }

    fn open_display(
        &self,
        _title: &str,
        _size: FrameSize,
        _settings: &PlaybackSettings,
    ) -> Result<Self::Display> {
        if self.media.failing_display {
            return Err(Error::Display("no display in tests".to_string()));
        }
        self.state.borrow_mut().displays_opened += 1;
        Ok(FakeDisplay {
            clock: self.clock.clone(),
            present_cost: self.media.present_cost,
            control_after: self.media.control_after,
            presents: 0,
            state: Rc::clone(&self.state),
            _guard: HandleGuard::new("display", &self.state),
        })
    }

    fn open_voice(&self, completion: Arc<dyn BufferCompletion>) -> Result<Self::Voice> {
        if self.media.failing_voice {
            return Err(Error::Audio("no audio device in tests".to_string()));
        }
        self.state.borrow_mut().voices_opened += 1;
        Ok(FakeVoice {
            clock: self.clock.clone(),
            queue: RefCell::new(VecDeque::new()),
            drained_until: Cell::new(Duration::ZERO),
            frames_played: Cell::new(0),
            underruns: Cell::new(0),
            completion,
            state: Rc::clone(&self.state),
            _guard: HandleGuard::new("voice", &self.state),
        })
    }

    fn open_audio_decoder(
        &self,
        _input: &Self::Input,
        _stream: &StreamInfo,
        output_rate: u32,
    ) -> Result<Self::Audio> {
        assert_eq!(output_rate, FAKE_DEVICE_RATE);
        Ok(FakeAudioDecoder {
            ready: VecDeque::new(),
            pcm: vec![0; FAKE_PCM_FRAMES * BYTES_PER_FRAME],
            _guard: HandleGuard::new("audio decoder", &self.state),
        })
    }
}
