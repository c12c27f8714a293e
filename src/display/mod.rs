// SPDX-License-Identifier: MPL-2.0
//! Display sink: a window showing one RGBA texture.
//!
//! The dispatch loop only sees [`DisplaySink`]; [`WindowDisplay`] is the
//! winit + wgpu implementation.

pub mod renderer;
pub mod window;

pub use window::WindowDisplay;

use crate::config::DEFAULT_WINDOW_TITLE;
use crate::error::Result;
use crate::video_player::VideoFrame;
use std::path::Path;

/// What the user asked for since the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayControl {
    #[default]
    Continue,
    CloseRequested,
    EscapePressed,
}

/// Presents decoded frames and reports window input.
pub trait DisplaySink {
    /// Uploads `frame` and presents it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Display`] if the frame cannot be
    /// presented. The caller treats this as a per-frame anomaly.
    fn present(&mut self, frame: &VideoFrame<'_>) -> Result<()>;

    /// Processes pending window events without blocking.
    fn poll_events(&mut self) -> DisplayControl;
}

/// Resolves the window title: the configured one, else the file name.
pub fn window_title(configured: Option<&str>, path: &Path) -> String {
    configured
        .map(str::to_string)
        .or_else(|| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| DEFAULT_WINDOW_TITLE.to_string())
}
