//! Transport Layer for Client-Coordinator IPC
//!
//! When presentation clients run out of process they talk to the coordinator
//! over a Unix domain socket carrying checksummed frames (see [`frame`]).
//!
//! # Security
//!
//! - The daemon checks the peer UID with `SO_PEERCRED`
//! - Socket files are created owner-only
//! - No network exposure

pub mod frame;

use std::path::PathBuf;

use thiserror::Error;

pub use frame::{encode, read_frame, write_frame, MAX_FRAME_SIZE};

/// Errors from the frame transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Payload does not match its checksum
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the header
        expected: u32,
        /// Checksum of the received payload
        actual: u32,
    },

    /// Frame exceeds [`MAX_FRAME_SIZE`]
    #[error("Frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Announced or actual payload size
        size: usize,
        /// Limit
        max: usize,
    },
}

/// Default daemon socket path
///
/// `$XDG_RUNTIME_DIR/floatball/overlay.sock` where a runtime dir exists,
/// otherwise under the system temp dir.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("floatball")
        .join("overlay.sock")
}
