// SPDX-License-Identifier: MPL-2.0
//! `lens_player` is a minimal media player built on FFmpeg, wgpu and cpal.
//!
//! It decodes one video and one audio stream from a container, shows the
//! video in a fixed-size window paced by presentation timestamps, and plays
//! the audio on the default output device.

#![doc(html_root_url = "https://docs.rs/lens_player/0.1.0")]

pub mod config;
pub mod display;
pub mod error;
pub mod media;
pub mod video_player;

#[cfg(test)]
pub(crate) mod test_utils;
