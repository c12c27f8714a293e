// SPDX-License-Identifier: MPL-2.0
//! Audio decode path: one decoder plus one resampler.
//!
//! Output is always interleaved signed 16-bit stereo at the device's sample
//! rate, which is fixed once when the path is opened.

use crate::error::{Error, Result};
use crate::media::StreamInfo;

/// Output channel count.
pub const OUTPUT_CHANNELS: usize = 2;

/// Bytes per output sample (s16).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes per interleaved output frame.
pub const BYTES_PER_FRAME: usize = OUTPUT_CHANNELS * BYTES_PER_SAMPLE;

/// Extra frames reserved on top of the rate-scaled estimate, covering
/// samples the resampler holds back between calls.
pub const RESAMPLE_HEADROOM: usize = 32;

/// Worst-case output frame count when converting `in_samples` frames from
/// `in_rate` to `out_rate`: `ceil(in_samples * out_rate / in_rate) + 32`.
///
/// ```
/// use lens_player::video_player::audio::max_output_samples;
///
/// assert_eq!(max_output_samples(1024, 44_100, 48_000), 1115 + 32);
/// assert_eq!(max_output_samples(1024, 48_000, 48_000), 1024 + 32);
/// ```
pub fn max_output_samples(in_samples: usize, in_rate: u32, out_rate: u32) -> usize {
    if in_rate == 0 {
        return in_samples + RESAMPLE_HEADROOM;
    }
    let scaled = (in_samples as u64 * u64::from(out_rate)).div_ceil(u64::from(in_rate));
    usize::try_from(scaled).unwrap_or(usize::MAX - RESAMPLE_HEADROOM) + RESAMPLE_HEADROOM
}

/// A block of converted PCM, valid until the next call into its decoder.
#[derive(Debug, Clone, Copy)]
pub struct PcmChunk<'a> {
    /// Interleaved s16 stereo, native endian.
    pub bytes: &'a [u8],
    /// Number of stereo frames in `bytes`.
    pub frames: usize,
    /// Presentation timestamp of the first frame, in seconds.
    pub pts_secs: Option<f64>,
}

/// Decodes compressed audio packets into device-ready PCM.
pub trait AudioDecoder {
    type Packet;

    /// Device sample rate the output is resampled to.
    fn output_rate(&self) -> u32;

    /// Feeds one packet. Returns false if the decoder rejected it.
    fn send_packet(&mut self, packet: &Self::Packet) -> bool;

    /// Signals end of input so buffered frames can be drained.
    fn send_eof(&mut self);

    /// Returns the next converted block, or `None` when the decoder needs
    /// more input. Frames that convert to zero samples are skipped and counted.
    fn receive_pcm(&mut self) -> Option<PcmChunk<'_>>;

    /// Number of decoded frames dropped during conversion.
    fn dropped_frames(&self) -> u64;
}

/// FFmpeg-backed [`AudioDecoder`].
///
/// Field order is drop order: decoder, then resampler.
pub struct FfmpegAudioDecoder {
    decoder: ffmpeg_next::decoder::Audio,
    resampler: ffmpeg_next::software::resampling::Context,
    stream: StreamInfo,
    output_rate: u32,
    decoded: ffmpeg_next::frame::Audio,
    converted: ffmpeg_next::frame::Audio,
    converted_capacity: usize,
    scratch: Vec<u8>,
    dropped: u64,
}

impl FfmpegAudioDecoder {
    /// Opens a decoder for the given stream and a resampler to `output_rate`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if the decoder or resampler cannot be created.
    pub fn open(
        parameters: ffmpeg_next::codec::Parameters,
        stream: &StreamInfo,
        output_rate: u32,
    ) -> Result<Self> {
        let context = ffmpeg_next::codec::context::Context::from_parameters(parameters)
            .map_err(|e| Error::Audio(format!("Failed to create codec context: {e}")))?;
        let decoder = context.decoder().audio().map_err(|e| {
            Error::Audio(format!(
                "Failed to open {} audio decoder: {e}",
                stream.codec_name
            ))
        })?;

        let resampler = ffmpeg_next::software::resampling::Context::get(
            decoder.format(),
            decoder.channel_layout(),
            decoder.rate(),
            ffmpeg_next::format::Sample::I16(ffmpeg_next::format::sample::Type::Packed),
            ffmpeg_next::ChannelLayout::STEREO,
            output_rate,
        )
        .map_err(|e| Error::Audio(format!("Failed to create resampler: {e}")))?;

        Ok(Self {
            decoder,
            resampler,
            stream: stream.clone(),
            output_rate,
            decoded: ffmpeg_next::frame::Audio::empty(),
            converted: ffmpeg_next::frame::Audio::empty(),
            converted_capacity: 0,
            scratch: Vec::new(),
            dropped: 0,
        })
    }

    /// Resamples `self.decoded` into the scratch buffer. Returns the frame count.
    fn convert(&mut self) -> std::result::Result<usize, String> {
        let needed = max_output_samples(
            self.decoded.samples(),
            self.decoded.rate(),
            self.output_rate,
        );
        if needed > self.converted_capacity {
            self.converted = ffmpeg_next::frame::Audio::new(
                ffmpeg_next::format::Sample::I16(ffmpeg_next::format::sample::Type::Packed),
                needed,
                ffmpeg_next::ChannelLayout::STEREO,
            );
            self.converted_capacity = needed;
        }
        // The resampler treats nb_samples as the output capacity.
        self.converted.set_samples(self.converted_capacity);

        self.resampler
            .run(&self.decoded, &mut self.converted)
            .map_err(|e| format!("resampling failed: {e}"))?;

        let frames = self.converted.samples();
        if frames == 0 {
            return Ok(0);
        }

        let len = frames * BYTES_PER_FRAME;
        let plane = self.converted.data(0);
        if plane.len() < len {
            return Err(format!(
                "resampled plane holds {} bytes, expected {len}",
                plane.len()
            ));
        }
        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }
        self.scratch[..len].copy_from_slice(&plane[..len]);
        Ok(frames)
    }

    fn pts_secs(&self) -> Option<f64> {
        self.decoded
            .timestamp()
            .map(|ticks| self.stream.ticks_to_secs(ticks))
    }
}

impl AudioDecoder for FfmpegAudioDecoder {
    type Packet = ffmpeg_next::Packet;

    fn output_rate(&self) -> u32 {
        self.output_rate
    }

    fn send_packet(&mut self, packet: &Self::Packet) -> bool {
        match self.decoder.send_packet(packet) {
            Ok(()) => true,
            Err(e) => {
                log::trace!("Audio packet rejected: {e}");
                false
            }
        }
    }

    fn send_eof(&mut self) {
        if let Err(e) = self.decoder.send_eof() {
            log::trace!("Audio decoder flush failed: {e}");
        }
    }

    fn receive_pcm(&mut self) -> Option<PcmChunk<'_>> {
        loop {
            self.decoder.receive_frame(&mut self.decoded).ok()?;
            match self.convert() {
                Ok(0) => {
                    log::trace!("Dropping audio frame: resampler produced no samples");
                    self.dropped += 1;
                }
                Ok(frames) => {
                    return Some(PcmChunk {
                        bytes: &self.scratch[..frames * BYTES_PER_FRAME],
                        frames,
                        pts_secs: self.pts_secs(),
                    });
                }
                Err(reason) => {
                    log::trace!("Dropping audio frame: {reason}");
                    self.dropped += 1;
                }
            }
        }
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}
