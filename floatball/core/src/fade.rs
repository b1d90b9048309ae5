//! Fade Transitions - Two-Phase Show/Hide Sequencing
//!
//! The presentation layer animates opacity itself; this module decides *when*
//! it is told to, and when the surface is actually shown or hidden around
//! those signals.
//!
//! # Sequences
//!
//! ```text
//! fade_in:   FadeOut (reset) ─► show ─► wait settle ─► FadeIn ─► wait duration
//! fade_out:  FadeOut ─► wait duration ─► hide (unless destroyed meanwhile)
//! ```
//!
//! The reset plus settle delay gives the client one rendered invisible frame
//! before the entrance animation starts. Without it the reveal jump-cuts.
//!
//! Fades are never cancelled. Once started they run to completion or until
//! the surface is destroyed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::surface::{SurfaceHandle, SurfaceSignal};

/// Default pause between the reset signal and the entrance signal
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Default animation duration
pub const DEFAULT_FADE_DURATION: Duration = Duration::from_millis(300);

/// Durations used by fade sequences
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionTiming {
    /// Pause after the reset signal so the baseline can render
    pub settle_delay: Duration,
    /// How long an entrance animation runs
    pub fade_in: Duration,
    /// How long an exit animation runs
    pub fade_out: Duration,
}

impl Default for TransitionTiming {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            fade_in: DEFAULT_FADE_DURATION,
            fade_out: DEFAULT_FADE_DURATION,
        }
    }
}

/// Drives fade sequences on surfaces
#[derive(Clone, Copy, Debug, Default)]
pub struct FadeController {
    timing: TransitionTiming,
}

impl FadeController {
    /// Controller with the given timing
    #[must_use]
    pub const fn new(timing: TransitionTiming) -> Self {
        Self { timing }
    }

    /// Timing in use
    #[must_use]
    pub const fn timing(&self) -> TransitionTiming {
        self.timing
    }

    /// Reveal `surface` with the configured entrance duration
    pub async fn fade_in(&self, surface: &dyn SurfaceHandle) {
        self.fade_in_for(surface, self.timing.fade_in).await;
    }

    /// Reveal `surface`, waiting `duration` for the animation to finish
    pub async fn fade_in_for(&self, surface: &dyn SurfaceHandle, duration: Duration) {
        if surface.is_destroyed() {
            return;
        }
        tracing::trace!(surface = %surface.kind(), ?duration, "Fade in");

        surface.notify(SurfaceSignal::FadeOut);
        surface.show();
        tokio::time::sleep(self.timing.settle_delay).await;
        surface.notify(SurfaceSignal::FadeIn);
        tokio::time::sleep(duration).await;
    }

    /// Conceal `surface` with the configured exit duration
    pub async fn fade_out(&self, surface: &dyn SurfaceHandle) {
        self.fade_out_for(surface, self.timing.fade_out).await;
    }

    /// Conceal `surface`, waiting `duration` before hiding it
    pub async fn fade_out_for(&self, surface: &dyn SurfaceHandle, duration: Duration) {
        if surface.is_destroyed() {
            return;
        }
        tracing::trace!(surface = %surface.kind(), ?duration, "Fade out");

        surface.notify(SurfaceSignal::FadeOut);
        tokio::time::sleep(duration).await;
        // Destruction may have raced in while we waited
        if !surface.is_destroyed() {
            surface.hide();
        }
    }
}
