// SPDX-License-Identifier: MPL-2.0
//! `FFmpeg` container reader.

use super::{init_ffmpeg, Demuxer, StreamInfo, StreamKind};
use crate::error::{Error, Result};
use std::path::Path;

/// An opened media file, read one packet at a time.
pub struct FfmpegInput {
    input: ffmpeg_next::format::context::Input,
}

impl FfmpegInput {
    /// Opens a media file and probes its streams.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if FFmpeg cannot be initialized or the file
    /// cannot be opened or parsed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        init_ffmpeg()?;

        let path = path.as_ref();
        let input = ffmpeg_next::format::input(&path)
            .map_err(|e| Error::Io(format!("Failed to open {}: {e}", path.display())))?;

        Ok(Self { input })
    }

    /// Codec parameters of a stream, used to open its decoder.
    pub(crate) fn parameters(&self, index: usize) -> Option<ffmpeg_next::codec::Parameters> {
        self.input.stream(index).map(|stream| stream.parameters())
    }

    fn describe(stream: &ffmpeg_next::format::stream::Stream<'_>, kind: StreamKind) -> StreamInfo {
        let time_base = stream.time_base();
        let time_base = if time_base.denominator() == 0 {
            0.0
        } else {
            f64::from(time_base.numerator()) / f64::from(time_base.denominator())
        };

        StreamInfo {
            index: stream.index(),
            kind,
            time_base,
            codec_name: stream.parameters().id().name().to_string(),
        }
    }
}

impl Demuxer for FfmpegInput {
    type Packet = ffmpeg_next::Packet;

    fn best_stream(&self, kind: StreamKind) -> Option<StreamInfo> {
        let media_type = match kind {
            StreamKind::Video => ffmpeg_next::media::Type::Video,
            StreamKind::Audio => ffmpeg_next::media::Type::Audio,
        };
        self.input
            .streams()
            .best(media_type)
            .map(|stream| Self::describe(&stream, kind))
    }

    fn next_packet(&mut self) -> Option<Self::Packet> {
        let mut packet = ffmpeg_next::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Some(packet),
            Err(ffmpeg_next::Error::Eof) => None,
            Err(e) => {
                log::warn!("Stopping on container read error: {e}");
                None
            }
        }
    }

    fn stream_index(packet: &Self::Packet) -> usize {
        packet.stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_fails_for_nonexistent_file() {
        let result = FfmpegInput::open("/nonexistent/video.mp4");
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn open_fails_for_garbage_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("garbage.mp4");
        std::fs::write(&path, b"definitely not a media container").unwrap();

        assert!(FfmpegInput::open(&path).is_err());
    }

    #[test]
    fn sample_file_exposes_video_stream_and_packets() {
        let path = "tests/data/sample.mp4";
        if !Path::new(path).exists() {
            eprintln!("Test video not found, skipping test");
            return;
        }

        let mut input = FfmpegInput::open(path).unwrap();
        let video = input.best_stream(StreamKind::Video).expect("video stream");
        assert_eq!(video.kind, StreamKind::Video);
        assert!(video.time_base > 0.0);

        let packet = input.next_packet().expect("at least one packet");
        assert!(input.parameters(FfmpegInput::stream_index(&packet)).is_some());
    }
}
