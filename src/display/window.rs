// SPDX-License-Identifier: MPL-2.0
//! winit window driven by polling from the playback thread.
//!
//! The event loop is never run; it is pumped once after every present with a
//! zero timeout, so decoding, pacing and presentation stay on one thread.

use super::renderer::{FrameRenderer, RenderOutcome};
use super::{DisplayControl, DisplaySink};
use crate::error::{Error, Result};
use crate::media::FrameSize;
use crate::video_player::VideoFrame;
use std::sync::Arc;
use std::time::Duration;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

/// Upper bound on pumps spent waiting for the platform to create the window.
const CREATE_ATTEMPTS: u32 = 200;
const CREATE_PUMP_TIMEOUT: Duration = Duration::from_millis(10);

/// Maps a key press to a playback control.
fn control_for_key(key: &Key, state: ElementState) -> Option<DisplayControl> {
    match (key, state) {
        (Key::Named(NamedKey::Escape), ElementState::Pressed) => {
            Some(DisplayControl::EscapePressed)
        }
        _ => None,
    }
}

/// Event handler state. Renderer is declared before the window so the
/// surface is released first.
struct WindowState {
    title: String,
    frame_size: FrameSize,
    vsync: bool,
    renderer: Option<FrameRenderer>,
    window: Option<Arc<Window>>,
    setup_error: Option<Error>,
    control: DisplayControl,
}

impl WindowState {
    fn create(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.title.as_str())
            .with_inner_size(PhysicalSize::new(
                self.frame_size.width,
                self.frame_size.height,
            ))
            .with_resizable(false);

        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|e| Error::Display(format!("Failed to create window: {e}")))?,
        );

        let renderer = pollster::block_on(FrameRenderer::new(
            Arc::clone(&window),
            self.frame_size,
            self.vsync,
        ))?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.setup_error.is_some() {
            return;
        }
        if let Err(e) = self.create(event_loop) {
            self.setup_error = Some(e);
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.control = DisplayControl::CloseRequested;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let Some(control) = control_for_key(&event.logical_key, event.state) {
                    self.control = control;
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            _ => {}
        }
    }
}

/// [`DisplaySink`] backed by a native window.
///
/// Only one may exist per process: winit refuses to recreate its event loop.
pub struct WindowDisplay {
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl WindowDisplay {
    /// Opens a non-resizable window of exactly `frame_size` pixels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Display`] if the event loop, window or GPU surface
    /// cannot be created.
    pub fn open(title: &str, frame_size: FrameSize, vsync: bool) -> Result<Self> {
        let mut event_loop = EventLoop::new()
            .map_err(|e| Error::Display(format!("Failed to create event loop: {e}")))?;

        let mut state = WindowState {
            title: title.to_string(),
            frame_size,
            vsync,
            renderer: None,
            window: None,
            setup_error: None,
            control: DisplayControl::Continue,
        };

        for _ in 0..CREATE_ATTEMPTS {
            let status = event_loop.pump_app_events(Some(CREATE_PUMP_TIMEOUT), &mut state);
            if let Some(e) = state.setup_error.take() {
                return Err(e);
            }
            if state.renderer.is_some() {
                log::info!(
                    "Window opened: {}x{} \"{}\"",
                    frame_size.width,
                    frame_size.height,
                    state.title
                );
                return Ok(Self { state, event_loop });
            }
            if let PumpStatus::Exit(code) = status {
                return Err(Error::Display(format!(
                    "Event loop exited during setup (code {code})"
                )));
            }
        }

        Err(Error::Display("Window was not created in time".to_string()))
    }
}

impl DisplaySink for WindowDisplay {
    fn present(&mut self, frame: &VideoFrame<'_>) -> Result<()> {
        if frame.size != self.state.frame_size {
            return Err(Error::Display(format!(
                "Frame is {}x{}, window is {}x{}",
                frame.size.width,
                frame.size.height,
                self.state.frame_size.width,
                self.state.frame_size.height
            )));
        }

        let (Some(renderer), Some(window)) =
            (self.state.renderer.as_mut(), self.state.window.as_ref())
        else {
            return Err(Error::Display("Window is closed".to_string()));
        };

        renderer.upload(frame.rgba)?;
        match renderer.render(|| window.pre_present_notify())? {
            RenderOutcome::Presented => {}
            RenderOutcome::Skipped => log::trace!("Frame skipped while surface recovered"),
        }
        Ok(())
    }

    fn poll_events(&mut self) -> DisplayControl {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        if let PumpStatus::Exit(_) = status {
            self.state.control = DisplayControl::CloseRequested;
        }
        self.state.control
    }
}
