//! Toggle Coordinator - Swapping the Visible Surface
//!
//! A toggle swaps which of the two surfaces is showing, keeping their
//! trailing edges aligned so the control appears to grow into the panel and
//! shrink back.
//!
//! # State Machine
//!
//! ```text
//!            request_toggle()
//!   ┌──────┐ ───────────────► ┌───────────────┐
//!   │ Idle │                  │ Transitioning │ ── request_toggle() ─► Rejected
//!   └──────┘ ◄─────────────── └───────────────┘
//!            guard dropped (success, error, or panic)
//! ```
//!
//! Overlapping toggles are dropped, never queued. The gate is released by a
//! guard's `Drop`, so no exit path can leave it stuck.
//!
//! # Geometry
//!
//! ```text
//! expand:   companion.x = primary.x - companion.width + primary.width
//! collapse: primary.x   = companion.x + companion.width - primary.width
//! ```
//!
//! Each direction hides the visible surface first, moves the other one while
//! it is invisible, then reveals it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoordinatorError;
use crate::fade::FadeController;
use crate::surface::{SurfaceHandle, SurfaceKind, SurfaceSignal};
use crate::surface_registry::SurfaceRegistry;

/// Whether a toggle is in flight
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleState {
    /// No toggle running
    Idle,
    /// A toggle is running; new requests are rejected
    Transitioning,
}

/// What a toggle request did
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    /// Companion is now showing
    Expanded,
    /// Primary is now showing
    Collapsed,
    /// Another toggle was already running
    Rejected,
    /// Primary does not exist or is destroyed
    Unavailable,
}

impl ToggleOutcome {
    /// Whether Companion is visible after this outcome
    #[must_use]
    pub const fn companion_visible(self) -> bool {
        matches!(self, Self::Expanded)
    }
}

/// Process-wide "transition in progress" flag
#[derive(Clone, Debug, Default)]
pub struct TransitionGate {
    busy: Arc<AtomicBool>,
}

impl TransitionGate {
    /// A gate in the idle state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the gate if it is idle
    ///
    /// Returns `None` while another holder is inside.
    #[must_use]
    pub fn try_enter(&self) -> Option<TransitionGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TransitionGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ToggleState {
        if self.busy.load(Ordering::Acquire) {
            ToggleState::Transitioning
        } else {
            ToggleState::Idle
        }
    }
}

/// Holds the gate until dropped
#[derive(Debug)]
pub struct TransitionGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Runs toggle and focus requests against the registry
#[derive(Clone, Debug)]
pub struct ToggleCoordinator {
    registry: SurfaceRegistry,
    fades: FadeController,
    gate: TransitionGate,
}

impl ToggleCoordinator {
    /// Coordinator over `registry` using `fades` for transitions
    #[must_use]
    pub fn new(registry: SurfaceRegistry, fades: FadeController) -> Self {
        Self {
            registry,
            fades,
            gate: TransitionGate::new(),
        }
    }

    /// Current toggle state
    #[must_use]
    pub fn state(&self) -> ToggleState {
        self.gate.state()
    }

    /// Swap which surface is visible
    ///
    /// Rejected immediately while another toggle runs. The gate is not touched
    /// when Primary is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if Companion had to be created and creation failed.
    /// The gate is released either way.
    pub async fn request_toggle(&self) -> Result<ToggleOutcome, CoordinatorError> {
        if self.registry.live(SurfaceKind::Primary).is_none() {
            return Ok(ToggleOutcome::Unavailable);
        }

        let Some(_guard) = self.gate.try_enter() else {
            tracing::info!("Toggle already in progress, ignoring request");
            return Ok(ToggleOutcome::Rejected);
        };

        let companion = self.registry.ensure(SurfaceKind::Companion).await?;

        let outcome = if companion.is_visible() {
            self.collapse(companion.as_ref()).await
        } else {
            self.expand(companion.as_ref()).await
        };
        tracing::info!(outcome = ?outcome, "Toggle finished");
        Ok(outcome)
    }

    async fn collapse(&self, companion: &dyn SurfaceHandle) -> ToggleOutcome {
        let origin = companion.position();
        let companion_width = i64::from(companion.size().width);

        self.fades.fade_out(companion).await;

        if let Some(primary) = self.registry.live(SurfaceKind::Primary) {
            let target = origin.shifted_x(companion_width - i64::from(primary.size().width));
            tracing::debug!(from = %origin, to = %target, "Collapsing to primary");

            primary.set_position(target);
            primary.focus();
            self.fades.fade_in(primary.as_ref()).await;
            primary.notify(SurfaceSignal::CompanionVisible(false));
        }
        ToggleOutcome::Collapsed
    }

    async fn expand(&self, companion: &dyn SurfaceHandle) -> ToggleOutcome {
        let Some(primary) = self.registry.live(SurfaceKind::Primary) else {
            return ToggleOutcome::Unavailable;
        };

        let origin = primary.position();
        let target =
            origin.shifted_x(i64::from(primary.size().width) - i64::from(companion.size().width));
        tracing::debug!(from = %origin, to = %target, "Expanding to companion");

        self.fades.fade_out(primary.as_ref()).await;

        companion.set_position(target);
        companion.focus();
        self.fades.fade_in(companion).await;
        primary.notify(SurfaceSignal::CompanionVisible(true));

        ToggleOutcome::Expanded
    }

    /// Focus Companion if it exists
    ///
    /// Independent of the toggle state. Returns whether Companion was live.
    #[must_use]
    pub fn request_focus(&self) -> bool {
        match self.registry.live(SurfaceKind::Companion) {
            Some(companion) => {
                companion.focus();
                true
            }
            None => false,
        }
    }
}
