//! Surfaces
//!
//! A surface is one overlay window-equivalent: it has a position, a size, and
//! a visibility flag, and it can be told to play presentation signals. The
//! coordinator never looks inside a surface; everything goes through
//! [`SurfaceHandle`].
//!
//! # Stale Handles
//!
//! Destruction is terminal. Every operation on a destroyed surface is a
//! silent no-op so that late async work (a fade finishing after teardown, a
//! drag tick racing a close) never has to special-case it.

mod headless;

pub use headless::{HeadlessSurface, HeadlessSurfaceFactory};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channels::Channel;
use crate::geometry::{Position, Size};

/// Which of the two coordinated surfaces this is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    /// The persistent floating control
    Primary,
    /// The on-demand input panel
    Companion,
}

impl SurfaceKind {
    /// Short lowercase name used in logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Companion => "companion",
        }
    }

    /// The other surface
    #[must_use]
    pub const fn counterpart(self) -> Self {
        match self {
            Self::Primary => Self::Companion,
            Self::Companion => Self::Primary,
        }
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Presentation signals pushed from the coordinator to a surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceSignal {
    /// Start the entrance animation
    FadeIn,
    /// Start the exit animation, or reset to the invisible baseline
    FadeOut,
    /// Whether the Companion surface is now showing
    CompanionVisible(bool),
}

impl SurfaceSignal {
    /// Channel this signal is delivered on
    #[must_use]
    pub const fn channel(self) -> Channel {
        match self {
            Self::FadeIn => Channel::FadeIn,
            Self::FadeOut => Channel::FadeOut,
            Self::CompanionVisible(_) => Channel::InputVisible,
        }
    }

    /// Payload carried alongside the channel name
    #[must_use]
    pub fn payload(self) -> serde_json::Value {
        match self {
            Self::FadeIn | Self::FadeOut => serde_json::Value::Null,
            Self::CompanionVisible(visible) => serde_json::Value::Bool(visible),
        }
    }
}

/// Always-on-top tier a surface is created at
///
/// Platforms disagree on which tier reliably stays above everything else, so
/// the Primary surface picks one per platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopmostLevel {
    /// Above ordinary floating panels
    Floating,
    /// Pop-up menu tier (highest reliable tier on macOS)
    PopUpMenu,
    /// Screen-saver tier with a relative sub-level
    ScreenSaver {
        /// Offset within the tier
        relative_level: i32,
    },
}

impl TopmostLevel {
    /// Highest reliable tier for the platform this was compiled for
    #[must_use]
    pub const fn highest_for_platform() -> Self {
        if cfg!(target_os = "macos") {
            Self::PopUpMenu
        } else {
            Self::ScreenSaver { relative_level: 1 }
        }
    }
}

/// How to create a surface
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSpec {
    /// Initial size
    pub size: Size,
    /// Initial top-left position
    pub position: Position,
    /// Always-on-top tier
    pub topmost: TopmostLevel,
    /// Whether the surface may take keyboard focus
    pub focusable: bool,
    /// Whether to hide the surface from the taskbar
    pub skip_taskbar: bool,
}

impl SurfaceSpec {
    /// Defaults for the floating control
    #[must_use]
    pub fn primary() -> Self {
        Self {
            size: Size::new(40, 40),
            position: Position::default(),
            topmost: TopmostLevel::highest_for_platform(),
            focusable: true,
            skip_taskbar: true,
        }
    }

    /// Defaults for the input panel
    #[must_use]
    pub fn companion() -> Self {
        Self {
            size: Size::new(180, 40),
            position: Position::default(),
            topmost: TopmostLevel::Floating,
            focusable: true,
            skip_taskbar: false,
        }
    }

    /// Default spec for a surface kind
    #[must_use]
    pub fn for_kind(kind: SurfaceKind) -> Self {
        match kind {
            SurfaceKind::Primary => Self::primary(),
            SurfaceKind::Companion => Self::companion(),
        }
    }
}

/// Errors raised by surface backends
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The backend could not create the surface
    #[error("failed to create {kind} surface: {reason}")]
    CreationFailed {
        /// Which surface was being created
        kind: SurfaceKind,
        /// Backend-specific reason
        reason: String,
    },

    /// The platform refused to focus the surface
    #[error("{0} surface refused focus")]
    FocusRefused(SurfaceKind),
}

/// Opaque reference to one overlay surface
///
/// Implementations must make every method a no-op once
/// [`is_destroyed`](Self::is_destroyed) returns true, and `show`/`hide` must be
/// idempotent.
pub trait SurfaceHandle: Send + Sync + fmt::Debug {
    /// Which surface this is
    fn kind(&self) -> SurfaceKind;

    /// Current top-left position
    fn position(&self) -> Position;

    /// Move to an absolute position
    fn set_position(&self, position: Position);

    /// Current outer size
    fn size(&self) -> Size;

    /// Make the surface visible
    fn show(&self);

    /// Make the surface invisible
    fn hide(&self);

    /// Whether the surface is currently visible
    fn is_visible(&self) -> bool;

    /// Whether the surface has been destroyed
    fn is_destroyed(&self) -> bool;

    /// Destroy the surface (terminal)
    fn destroy(&self);

    /// Bring the surface to the front of its always-on-top tier
    ///
    /// Best-effort: other always-on-top windows can cover the surface, and
    /// the platform may ignore the request.
    fn raise(&self);

    /// Deliver a presentation signal
    fn notify(&self, signal: SurfaceSignal);

    /// Ask the platform for keyboard focus
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses focus.
    fn try_focus(&self) -> Result<(), SurfaceError>;

    /// Best-effort focus; refusals are swallowed
    fn focus(&self) {
        if let Err(e) = self.try_focus() {
            tracing::debug!(surface = %self.kind(), error = %e, "Focus refused, ignoring");
        }
    }
}
