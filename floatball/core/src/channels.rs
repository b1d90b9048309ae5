//! Channel Allow-List
//!
//! Presentation clients are untrusted. Every message they send, every request
//! they make, and every event pushed to them travels on a named channel, and
//! only the names listed here ever cross the boundary.
//!
//! # Design Philosophy
//!
//! - Each channel belongs to exactly one direction.
//! - Unknown names are dropped quietly. The client gets no error to probe with
//!   and the coordinator never sees the message.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which way a channel carries traffic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelDirection {
    /// Fire-and-forget, client to coordinator
    Send,
    /// Request/response, client to coordinator
    Invoke,
    /// Events, coordinator to client
    Listen,
}

impl fmt::Display for ChannelDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Send => "send",
            Self::Invoke => "invoke",
            Self::Listen => "listen",
        };
        f.write_str(name)
    }
}

/// Every channel a client may use
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Move the caller's surface to `{x, y}`
    SetPosition,
    /// Begin following the pointer
    DragStart,
    /// Stop following the pointer
    DragStop,
    /// Restore the main application window
    RestoreMain,
    /// Minimize the main application into the overlay
    MinimizeToMini,
    /// Quit the hosting process
    Quit,
    /// Toggle client developer tools
    ToggleDevtools,
    /// Forward a log line `{level, args}`
    Log,
    /// Query the caller's surface position
    GetPosition,
    /// Swap which surface is visible
    InputToggle,
    /// Focus the Companion surface
    InputFocus,
    /// Pointer entered the surface
    MouseEnter,
    /// Pointer left the surface
    MouseLeave,
    /// Companion is expanding
    InputExpand,
    /// Companion is collapsing
    InputCollapse,
    /// Play the entrance animation
    FadeIn,
    /// Play the exit animation or reset to invisible
    FadeOut,
    /// Companion visibility changed
    InputVisible,
}

impl Channel {
    /// All channels, grouped by direction
    pub const ALL: [Self; 18] = [
        Self::SetPosition,
        Self::DragStart,
        Self::DragStop,
        Self::RestoreMain,
        Self::MinimizeToMini,
        Self::Quit,
        Self::ToggleDevtools,
        Self::Log,
        Self::GetPosition,
        Self::InputToggle,
        Self::InputFocus,
        Self::MouseEnter,
        Self::MouseLeave,
        Self::InputExpand,
        Self::InputCollapse,
        Self::FadeIn,
        Self::FadeOut,
        Self::InputVisible,
    ];

    /// Wire name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SetPosition => "app:window:set-position",
            Self::DragStart => "app:drag:start",
            Self::DragStop => "app:drag:stop",
            Self::RestoreMain => "app:window:restore-main",
            Self::MinimizeToMini => "app:window:minimize-to-mini",
            Self::Quit => "app:quit",
            Self::ToggleDevtools => "app:toggle-devtools",
            Self::Log => "app:log",
            Self::GetPosition => "app:window:get-position",
            Self::InputToggle => "app:input:toggle",
            Self::InputFocus => "app:input:focus",
            Self::MouseEnter => "app:window:mouse-enter",
            Self::MouseLeave => "app:window:mouse-leave",
            Self::InputExpand => "input:expand",
            Self::InputCollapse => "input:collapse",
            Self::FadeIn => "window:fade-in",
            Self::FadeOut => "window:fade-out",
            Self::InputVisible => "input:visible",
        }
    }

    /// Direction this channel is allowed in
    #[must_use]
    pub const fn direction(self) -> ChannelDirection {
        match self {
            Self::SetPosition
            | Self::DragStart
            | Self::DragStop
            | Self::RestoreMain
            | Self::MinimizeToMini
            | Self::Quit
            | Self::ToggleDevtools
            | Self::Log => ChannelDirection::Send,
            Self::GetPosition | Self::InputToggle | Self::InputFocus => ChannelDirection::Invoke,
            Self::MouseEnter
            | Self::MouseLeave
            | Self::InputExpand
            | Self::InputCollapse
            | Self::FadeIn
            | Self::FadeOut
            | Self::InputVisible => ChannelDirection::Listen,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The fixed per-direction allow-list
#[derive(Clone, Debug)]
pub struct ChannelAllowList {
    by_name: HashMap<(ChannelDirection, &'static str), Channel>,
}

impl Default for ChannelAllowList {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelAllowList {
    /// Build the allow-list from [`Channel::ALL`]
    #[must_use]
    pub fn new() -> Self {
        let by_name = Channel::ALL
            .iter()
            .map(|c| ((c.direction(), c.name()), *c))
            .collect();
        Self { by_name }
    }

    /// Resolve `name` if it is allowed in `direction`
    ///
    /// Anything else is dropped; only a trace line records it.
    #[must_use]
    pub fn permit(&self, direction: ChannelDirection, name: &str) -> Option<Channel> {
        let channel = self.by_name.get(&(direction, name)).copied();
        if channel.is_none() {
            tracing::trace!(direction = %direction, channel = name, "Dropped unlisted channel");
        }
        channel
    }

    /// Whether an already-resolved channel may travel in `direction`
    #[must_use]
    pub fn allows(&self, direction: ChannelDirection, channel: Channel) -> bool {
        self.by_name.contains_key(&(direction, channel.name()))
    }

    /// Channel names allowed in `direction`
    #[must_use]
    pub fn names(&self, direction: ChannelDirection) -> Vec<&'static str> {
        Channel::ALL
            .iter()
            .filter(|c| c.direction() == direction)
            .map(|c| c.name())
            .collect()
    }
}
