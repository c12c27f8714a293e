// SPDX-License-Identifier: MPL-2.0
//! Presentation pacing for video frames.
//!
//! The [`PlaybackClock`] anchors a timeline at the first displayed video
//! frame: its PTS becomes the epoch and the monotonic time at that instant the
//! anchor. Every later frame is due at `anchor + (pts - epoch)`.
//!
//! # Synchronization Modes
//!
//! - [`SyncMode::Video`] paces video against its own first timestamp. Audio
//!   plays on the device's clock with no cross-correction, so the two streams
//!   can drift apart over a long file.
//! - [`SyncMode::Audio`] compares each video PTS against the audio device's
//!   playback position while the device has audio queued. Before the first
//!   audio plays, and after the queue runs dry, it runs on wall time from the
//!   most recent anchor.
//!
//! ```text
//!  first frame          frame n
//!      │                   │
//!  epoch_pts ────────── pts_n          stream time
//!      │   target = pts_n - epoch_pts
//!  anchor ──────────── now             monotonic time
//!          lead = target - (now - anchor)
//! ```

use super::time_units::{duration_to_secs, secs_to_duration};
use crate::config::PlaybackSettings;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Which clock video presentation follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Pace video against its own first timestamp.
    #[default]
    Video,
    /// Pace video against the audio device's playback position.
    Audio,
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(SyncMode::Video),
            "audio" => Ok(SyncMode::Audio),
            other => Err(Error::Config(format!(
                "unknown sync mode '{other}' (expected 'video' or 'audio')"
            ))),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Video => write!(f, "video"),
            SyncMode::Audio => write!(f, "audio"),
        }
    }
}

/// Monotonic time source with the ability to block.
///
/// `now` is measured from an arbitrary fixed origin; only differences matter.
pub trait TimeSource {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock [`TimeSource`] backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// What the clock decided for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Frame is due now (within slack). Also used for the anchoring frame.
    OnTime,
    /// Frame was early; the clock slept this long (already clamped).
    Waited(Duration),
    /// Frame is behind schedule by this much; it is still presented.
    Late(Duration),
    /// Frame carries no timestamp and is presented immediately.
    Untimed,
}

#[derive(Debug, Clone, Copy)]
struct Epoch {
    pts_secs: f64,
    anchor: Duration,
}

/// Video presentation clock.
///
/// Uninitialized until the first timed frame is scheduled; running after.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    mode: SyncMode,
    slack: Duration,
    max_sleep: Duration,
    epoch: Option<Epoch>,
}

impl PlaybackClock {
    #[must_use]
    pub fn new(mode: SyncMode, slack: Duration, max_sleep: Duration) -> Self {
        Self {
            mode,
            slack,
            max_sleep,
            epoch: None,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &PlaybackSettings) -> Self {
        Self::new(
            settings.sync_mode,
            settings.pacing_slack,
            settings.max_pacing_sleep,
        )
    }

    /// Signed lead of a frame in seconds: positive when early.
    ///
    /// Anchors the timeline on the first call and returns `0.0` for that
    /// frame. `audio_position` is only consulted in [`SyncMode::Audio`];
    /// each reading moves the anchor to it, so when the position goes away
    /// wall time continues from the last audio reading.
    pub fn lead_secs(&mut self, pts_secs: f64, now: Duration, audio_position: Option<f64>) -> f64 {
        if let (SyncMode::Audio, Some(position)) = (self.mode, audio_position) {
            self.epoch = Some(Epoch {
                pts_secs: position,
                anchor: now,
            });
            return pts_secs - position;
        }

        let epoch = *self.epoch.get_or_insert(Epoch {
            pts_secs,
            anchor: now,
        });

        let target = pts_secs - epoch.pts_secs;
        let wall = duration_to_secs(now.saturating_sub(epoch.anchor));
        target - wall
    }

    /// Decides how to pace a frame without blocking.
    pub fn schedule(
        &mut self,
        pts_secs: Option<f64>,
        now: Duration,
        audio_position: Option<f64>,
    ) -> Pacing {
        let Some(pts_secs) = pts_secs.filter(|pts| pts.is_finite()) else {
            return Pacing::Untimed;
        };

        let lead = self.lead_secs(pts_secs, now, audio_position);
        let slack = duration_to_secs(self.slack);

        if lead > slack {
            Pacing::Waited(secs_to_duration(lead).min(self.max_sleep))
        } else if lead < -slack {
            Pacing::Late(secs_to_duration(-lead))
        } else {
            Pacing::OnTime
        }
    }

    /// Schedules a frame and sleeps on `time` if it is early.
    pub fn pace<T: TimeSource + ?Sized>(
        &mut self,
        pts_secs: Option<f64>,
        time: &T,
        audio_position: Option<f64>,
    ) -> Pacing {
        let pacing = self.schedule(pts_secs, time.now(), audio_position);
        if let Pacing::Waited(duration) = pacing {
            time.sleep(duration);
        }
        pacing
    }
}
