//! TOML Configuration File Support
//!
//! Loads overlay settings from `~/.config/floatball/overlay.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [timing]
//! settle_delay_ms = 50
//! fade_in_ms = 300
//! fade_out_ms = 300
//!
//! [drag]
//! sample_interval_ms = 16
//!
//! [surfaces]
//! primary_width = 40
//! primary_height = 40
//! primary_x = 1000
//! primary_y = 500
//! companion_width = 180
//! companion_height = 40
//!
//! [daemon]
//! socket_path = "/run/user/1000/floatball/overlay.sock"
//! max_connections = 8
//! ```
//!
//! # Environment Variables
//!
//! - `FLOATBALL_SETTLE_DELAY_MS`
//! - `FLOATBALL_FADE_IN_MS`
//! - `FLOATBALL_FADE_OUT_MS`
//! - `FLOATBALL_DRAG_INTERVAL_MS`
//! - `FLOATBALL_SOCKET`

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drag::DEFAULT_SAMPLE_INTERVAL;
use crate::fade::TransitionTiming;
use crate::surface::SurfaceSpec;
use crate::transport::default_socket_path;

/// Default cap on simultaneously connected clients
pub const DEFAULT_MAX_CONNECTIONS: usize = 8;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[timing]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingToml {
    /// Pause before the entrance animation, milliseconds
    pub settle_delay_ms: Option<u64>,
    /// Entrance animation duration, milliseconds
    pub fade_in_ms: Option<u64>,
    /// Exit animation duration, milliseconds
    pub fade_out_ms: Option<u64>,
}

/// `[drag]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DragToml {
    /// Pointer sampling interval, milliseconds
    pub sample_interval_ms: Option<u64>,
}

/// `[surfaces]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfacesToml {
    /// Primary width in pixels
    pub primary_width: Option<u32>,
    /// Primary height in pixels
    pub primary_height: Option<u32>,
    /// Primary initial x
    pub primary_x: Option<i32>,
    /// Primary initial y
    pub primary_y: Option<i32>,
    /// Companion width in pixels
    pub companion_width: Option<u32>,
    /// Companion height in pixels
    pub companion_height: Option<u32>,
}

/// `[daemon]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonToml {
    /// Unix socket path
    pub socket_path: Option<String>,
    /// Maximum simultaneous clients
    pub max_connections: Option<usize>,
}

/// Root of the TOML file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayToml {
    /// Fade timing
    pub timing: TimingToml,
    /// Drag sampling
    pub drag: DragToml,
    /// Surface geometry
    pub surfaces: SurfacesToml,
    /// Daemon settings
    pub daemon: DaemonToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved overlay configuration
#[derive(Clone, Debug)]
pub struct OverlayConfig {
    /// Fade timing
    pub timing: TransitionTiming,
    /// Drag sampling interval
    pub drag_sample_interval: Duration,
    /// How the Primary surface is created
    pub primary: SurfaceSpec,
    /// How the Companion surface is created
    pub companion: SurfaceSpec,
    /// Daemon socket path
    pub socket_path: PathBuf,
    /// Daemon client cap
    pub max_connections: usize,
    /// File the config was read from, if any
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            timing: TransitionTiming::default(),
            drag_sample_interval: DEFAULT_SAMPLE_INTERVAL,
            primary: SurfaceSpec::primary(),
            companion: SurfaceSpec::companion(),
            socket_path: default_socket_path(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl OverlayConfig {
    /// Default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest-priority source that contributed a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the source (used by tests and override layers)
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check values that would break the coordinator
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a zero sampling interval
    /// or a zero surface dimension.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drag_sample_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "drag sample interval must be non-zero".to_string(),
            ));
        }
        if self.primary.size.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "primary surface size must be non-zero, got {}x{}",
                self.primary.size.width, self.primary.size.height
            )));
        }
        if self.companion.size.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "companion surface size must be non-zero, got {}x{}",
                self.companion.size.width, self.companion.size.height
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/floatball/overlay.toml` or the platform
/// equivalent.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("floatball").join("overlay.toml"))
}

/// Load configuration from the default path and the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed,
/// or the result fails validation. A missing file is not an error.
pub fn load_config() -> Result<OverlayConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from `path` (if given) and the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed,
/// or the result fails validation. A missing file is not an error.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<OverlayConfig, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

fn load_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<OverlayConfig, ConfigError> {
    let mut config = OverlayConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: OverlayToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;
    Ok(config)
}

fn apply_toml_config(config: &mut OverlayConfig, toml: &OverlayToml) {
    if let Some(ms) = toml.timing.settle_delay_ms {
        config.timing.settle_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.timing.fade_in_ms {
        config.timing.fade_in = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.timing.fade_out_ms {
        config.timing.fade_out = Duration::from_millis(ms);
    }

    if let Some(ms) = toml.drag.sample_interval_ms {
        config.drag_sample_interval = Duration::from_millis(ms);
    }

    let surfaces = &toml.surfaces;
    if let Some(width) = surfaces.primary_width {
        config.primary.size.width = width;
    }
    if let Some(height) = surfaces.primary_height {
        config.primary.size.height = height;
    }
    if let Some(x) = surfaces.primary_x {
        config.primary.position.x = x;
    }
    if let Some(y) = surfaces.primary_y {
        config.primary.position.y = y;
    }
    if let Some(width) = surfaces.companion_width {
        config.companion.size.width = width;
    }
    if let Some(height) = surfaces.companion_height {
        config.companion.size.height = height;
    }

    if let Some(ref path) = toml.daemon.socket_path {
        config.socket_path = PathBuf::from(path);
    }
    if let Some(max) = toml.daemon.max_connections {
        config.max_connections = max;
    }
}

fn env_millis(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = env(key)?;
    match raw.parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            tracing::warn!(var = key, value = %raw, "Ignoring non-numeric environment value");
            None
        }
    }
}

fn apply_env_config(config: &mut OverlayConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(d) = env_millis(&env, "FLOATBALL_SETTLE_DELAY_MS") {
        config.timing.settle_delay = d;
        config.source = ConfigSource::Env;
    }
    if let Some(d) = env_millis(&env, "FLOATBALL_FADE_IN_MS") {
        config.timing.fade_in = d;
        config.source = ConfigSource::Env;
    }
    if let Some(d) = env_millis(&env, "FLOATBALL_FADE_OUT_MS") {
        config.timing.fade_out = d;
        config.source = ConfigSource::Env;
    }
    if let Some(d) = env_millis(&env, "FLOATBALL_DRAG_INTERVAL_MS") {
        config.drag_sample_interval = d;
        config.source = ConfigSource::Env;
    }
    if let Some(path) = env("FLOATBALL_SOCKET") {
        config.socket_path = PathBuf::from(path);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Socket path override
    pub socket_path: Option<PathBuf>,

    /// Client cap override
    pub max_connections: Option<usize>,

    /// Drag sampling interval override (milliseconds)
    pub drag_interval_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set socket path override
    #[must_use]
    pub fn with_socket_path(mut self, path: PathBuf) -> Self {
        self.socket_path = Some(path);
        self
    }

    /// Set client cap override
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Set drag sampling interval override
    #[must_use]
    pub fn with_drag_interval_ms(mut self, ms: u64) -> Self {
        self.drag_interval_ms = Some(ms);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut OverlayConfig) {
        if self.socket_path.is_some()
            || self.max_connections.is_some()
            || self.drag_interval_ms.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref path) = self.socket_path {
            config.socket_path = path.clone();
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        if let Some(ms) = self.drag_interval_ms {
            config.drag_sample_interval = Duration::from_millis(ms);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
