// SPDX-License-Identifier: MPL-2.0
//! Video decode path: one decoder plus one RGBA converter.
//!
//! Frames are converted at the source resolution into a single long-lived
//! scratch buffer. A [`VideoFrame`] borrows that buffer, so at most one
//! decoded frame exists at a time and there is no frame queue.

use crate::error::{Result, VideoError};
use crate::media::{FrameSize, StreamInfo};

/// A decoded RGBA frame, valid until the next call into its decoder.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    /// Tightly packed RGBA rows, `size.rgba_len()` bytes.
    pub rgba: &'a [u8],
    pub size: FrameSize,
    /// Presentation timestamp in seconds, if the frame carried one.
    pub pts_secs: Option<f64>,
}

/// Decodes compressed video packets into RGBA frames.
pub trait VideoDecoder {
    type Packet;

    /// Fixed output size, taken from the stream parameters at open time.
    fn size(&self) -> FrameSize;

    /// Feeds one packet. Returns false if the decoder rejected it.
    fn send_packet(&mut self, packet: &Self::Packet) -> bool;

    /// Signals end of input so buffered frames can be drained.
    fn send_eof(&mut self);

    /// Returns the next converted frame, or `None` when the decoder needs
    /// more input. Frames that fail conversion are skipped and counted.
    fn receive_frame(&mut self) -> Option<VideoFrame<'_>>;

    /// Number of frames skipped because conversion failed or the frame size
    /// no longer matched the session.
    fn rejected_frames(&self) -> u64;
}

/// Copies `size.height` rows of RGBA pixels out of a strided plane into `dst`.
///
/// `dst` is resized to exactly `size.rgba_len()` bytes; its allocation is
/// reused across calls. Returns false if `src` is too short for the given
/// stride, in which case `dst` contents are unspecified.
pub fn copy_rgba_rows(src: &[u8], stride: usize, size: FrameSize, dst: &mut Vec<u8>) -> bool {
    let row_bytes = size.rgba_row_bytes();
    let height = size.height as usize;
    if stride < row_bytes {
        return false;
    }
    if height > 0 && src.len() < stride * (height - 1) + row_bytes {
        return false;
    }

    dst.resize(size.rgba_len(), 0);
    if stride == row_bytes {
        dst.copy_from_slice(&src[..size.rgba_len()]);
        return true;
    }

    for (y, row) in dst.chunks_exact_mut(row_bytes).enumerate() {
        let row_start = y * stride;
        row.copy_from_slice(&src[row_start..row_start + row_bytes]);
    }
    true
}

/// FFmpeg-backed [`VideoDecoder`] with a bilinear RGBA scaler.
///
/// Field order is drop order: decoder, then converter.
pub struct FfmpegVideoDecoder {
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    size: FrameSize,
    stream: StreamInfo,
    decoded: ffmpeg_next::frame::Video,
    converted: ffmpeg_next::frame::Video,
    rgba: Vec<u8>,
    rejected: u64,
}

impl FfmpegVideoDecoder {
    /// Opens a decoder for the given stream parameters.
    ///
    /// # Errors
    ///
    /// Returns [`VideoError::UnsupportedCodec`] or [`VideoError::DecoderOpen`]
    /// if no decoder can be opened, and [`VideoError::Conversion`] if the
    /// native pixel format cannot be converted to RGBA.
    pub fn open(parameters: ffmpeg_next::codec::Parameters, stream: &StreamInfo) -> Result<Self> {
        let context = ffmpeg_next::codec::context::Context::from_parameters(parameters)
            .map_err(|e| VideoError::from_message(&e.to_string()))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| VideoError::from_message(&format!("{} decoder: {e}", stream.codec_name)))?;

        let size = FrameSize::new(decoder.width(), decoder.height());
        if size.is_empty() {
            return Err(VideoError::DecoderOpen(format!(
                "invalid frame size {}x{}",
                size.width, size.height
            ))
            .into());
        }

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            size.width,
            size.height,
            ffmpeg_next::format::Pixel::RGBA,
            size.width,
            size.height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| VideoError::Conversion(format!("Failed to create scaler: {e}")))?;

        Ok(Self {
            decoder,
            scaler,
            size,
            stream: stream.clone(),
            decoded: ffmpeg_next::frame::Video::empty(),
            converted: ffmpeg_next::frame::Video::empty(),
            rgba: Vec::with_capacity(size.rgba_len()),
            rejected: 0,
        })
    }

    /// Converts the frame in `self.decoded` into the RGBA scratch buffer.
    fn convert(&mut self) -> std::result::Result<(), String> {
        let decoded_size = FrameSize::new(self.decoded.width(), self.decoded.height());
        if decoded_size != self.size {
            return Err(format!(
                "frame size changed to {}x{} (session is {}x{})",
                decoded_size.width, decoded_size.height, self.size.width, self.size.height
            ));
        }

        self.scaler
            .run(&self.decoded, &mut self.converted)
            .map_err(|e| format!("scaling failed: {e}"))?;

        let stride = self.converted.stride(0);
        if copy_rgba_rows(self.converted.data(0), stride, self.size, &mut self.rgba) {
            Ok(())
        } else {
            Err(format!("converted plane too short for stride {stride}"))
        }
    }

    fn pts_secs(&self) -> Option<f64> {
        self.decoded
            .timestamp()
            .map(|ticks| self.stream.ticks_to_secs(ticks))
    }
}

impl VideoDecoder for FfmpegVideoDecoder {
    type Packet = ffmpeg_next::Packet;

    fn size(&self) -> FrameSize {
        self.size
    }

    fn send_packet(&mut self, packet: &Self::Packet) -> bool {
        match self.decoder.send_packet(packet) {
            Ok(()) => true,
            Err(e) => {
                log::trace!("Video packet rejected: {e}");
                false
            }
        }
    }

    fn send_eof(&mut self) {
        if let Err(e) = self.decoder.send_eof() {
            log::trace!("Video decoder flush failed: {e}");
        }
    }

    fn receive_frame(&mut self) -> Option<VideoFrame<'_>> {
        loop {
            self.decoder.receive_frame(&mut self.decoded).ok()?;
            match self.convert() {
                Ok(()) => {
                    return Some(VideoFrame {
                        rgba: &self.rgba,
                        size: self.size,
                        pts_secs: self.pts_secs(),
                    });
                }
                Err(reason) => {
                    log::trace!("Skipping video frame: {reason}");
                    self.rejected += 1;
                }
            }
        }
    }

    fn rejected_frames(&self) -> u64 {
        self.rejected
    }
}
