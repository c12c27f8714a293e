// SPDX-License-Identifier: MPL-2.0
//! Centralized default values for all configuration constants.
//!
//! This module serves as the single source of truth for default values
//! used across the player. Constants are organized by category.
//!
//! # Categories
//!
//! - **Audio Queue**: Bounded device queue and backpressure polling
//! - **Pacing**: Video presentation slack and sleep clamping
//! - **Window**: Display defaults

// ==========================================================================
// Audio Queue Defaults
// ==========================================================================

/// Maximum number of PCM buffers pending on the audio device before the
/// submitter blocks.
pub const DEFAULT_MAX_PENDING_BUFFERS: usize = 48;

/// Minimum allowed pending-buffer threshold.
pub const MIN_MAX_PENDING_BUFFERS: usize = 1;

/// Maximum allowed pending-buffer threshold.
pub const MAX_MAX_PENDING_BUFFERS: usize = 1024;

/// Sleep between pending-count polls while the device queue is saturated (ms).
pub const DEFAULT_BACKPRESSURE_POLL_MS: u64 = 2;

/// Minimum backpressure poll interval (ms).
pub const MIN_BACKPRESSURE_POLL_MS: u64 = 1;

/// Maximum backpressure poll interval (ms).
pub const MAX_BACKPRESSURE_POLL_MS: u64 = 100;

// ==========================================================================
// Pacing Defaults
// ==========================================================================

/// A frame ahead of schedule by no more than this is presented immediately (ms).
pub const DEFAULT_PACING_SLACK_MS: u64 = 3;

/// Maximum allowed pacing slack (ms).
pub const MAX_PACING_SLACK_MS: u64 = 100;

/// Longest single pacing sleep (ms). Protects against timestamp gaps.
pub const DEFAULT_MAX_PACING_SLEEP_MS: u64 = 300;

/// Minimum allowed pacing sleep clamp (ms).
pub const MIN_MAX_PACING_SLEEP_MS: u64 = 1;

/// Maximum allowed pacing sleep clamp (ms).
pub const MAX_MAX_PACING_SLEEP_MS: u64 = 5000;

// ==========================================================================
// Window Defaults
// ==========================================================================

/// Window title used when neither config nor file name provides one.
pub const DEFAULT_WINDOW_TITLE: &str = "player";

/// Whether presentation waits for vertical blank.
pub const DEFAULT_VSYNC: bool = true;

// ==========================================================================
// Compile-time Validation
// ==========================================================================

const _: () = {
    assert!(MIN_MAX_PENDING_BUFFERS > 0);
    assert!(DEFAULT_MAX_PENDING_BUFFERS >= MIN_MAX_PENDING_BUFFERS);
    assert!(DEFAULT_MAX_PENDING_BUFFERS <= MAX_MAX_PENDING_BUFFERS);

    assert!(MIN_BACKPRESSURE_POLL_MS > 0);
    assert!(DEFAULT_BACKPRESSURE_POLL_MS >= MIN_BACKPRESSURE_POLL_MS);
    assert!(DEFAULT_BACKPRESSURE_POLL_MS <= MAX_BACKPRESSURE_POLL_MS);

    assert!(DEFAULT_PACING_SLACK_MS <= MAX_PACING_SLACK_MS);
    assert!(DEFAULT_MAX_PACING_SLEEP_MS >= MIN_MAX_PACING_SLEEP_MS);
    assert!(DEFAULT_MAX_PACING_SLEEP_MS <= MAX_MAX_PACING_SLEEP_MS);
    assert!(DEFAULT_PACING_SLACK_MS < DEFAULT_MAX_PACING_SLEEP_MS);
};
