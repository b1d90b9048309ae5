//! Wire Messages
//!
//! Frames exchanged between a presentation client and the coordinator when
//! they run in separate processes.
//!
//! # Design Philosophy
//!
//! Clients are renderers. They report what the user did (a channel message, a
//! pointer move) and render what they are told (signals). Channel names are
//! carried as plain strings; the coordinator validates them against the
//! allow-list, so a client speaking a newer or hostile dialect is simply
//! ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::surface::{SurfaceKind, SurfaceSignal};

/// Frames sent by a client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceFrame {
    /// Declare which surface this client renders
    Attach {
        /// The surface this client drives
        surface: SurfaceKind,
    },

    /// Fire-and-forget message
    Send {
        /// Channel name
        channel: String,
        /// Channel payload
        #[serde(default)]
        payload: Value,
    },

    /// Request expecting a [`CoordinatorFrame::Reply`]
    Invoke {
        /// Client-chosen correlation ID
        request_id: u64,
        /// Channel name
        channel: String,
        /// Channel payload
        #[serde(default)]
        payload: Value,
    },

    /// Global pointer position
    Pointer {
        /// Horizontal screen coordinate
        x: f64,
        /// Vertical screen coordinate
        y: f64,
    },

    /// The client's surface lost keyboard focus
    Blur,

    /// Client is going away
    Detach,
}

/// Frames sent to a client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorFrame {
    /// Attach acknowledged
    Attached {
        /// The surface the client is now bound to
        surface: SurfaceKind,
    },

    /// Answer to an [`SurfaceFrame::Invoke`]
    Reply {
        /// Correlation ID from the request
        request_id: u64,
        /// Result value; `null` when the request was dropped
        value: Value,
    },

    /// Presentation signal for the client's surface
    Signal {
        /// Listen channel name
        channel: String,
        /// Signal payload
        #[serde(default)]
        payload: Value,
    },
}

impl CoordinatorFrame {
    /// Frame carrying `signal`
    #[must_use]
    pub fn signal(signal: SurfaceSignal) -> Self {
        Self::Signal {
            channel: signal.channel().name().to_string(),
            payload: signal.payload(),
        }
    }
}

/// Severity of a forwarded client log line
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
    /// Plain log; also used for unrecognised levels
    #[default]
    #[serde(other)]
    Log,
}

/// Payload of the log channel
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogPayload {
    /// Severity
    #[serde(default)]
    pub level: LogLevel,
    /// Values to print, space separated
    #[serde(default)]
    pub args: Vec<Value>,
}

impl LogPayload {
    /// Arguments joined into one line
    ///
    /// Strings are printed bare; other values as JSON.
    #[must_use]
    pub fn message(&self) -> String {
        self.args
            .iter()
            .map(|arg| match arg {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
