//! Floatball Core - Dual-Surface Overlay Coordination
//!
//! This crate keeps two always-on-top overlay surfaces in step: a small
//! floating control (the **Primary** surface, "the ball") and an on-demand
//! input panel (the **Companion** surface). It owns their positions,
//! visibility, and fade transitions while the user drags the ball around or
//! toggles between the two.
//!
//! Rendering is somebody else's job. Surfaces are reached through the
//! [`SurfaceHandle`] trait, and the presentation layer only ever hears
//! "reset", "animate in", and "companion visible" signals.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    Presentation clients                          │
//! │        ┌───────────────┐              ┌───────────────┐          │
//! │        │ Primary (ball)│              │ Companion     │          │
//! │        └───────┬───────┘              └───────┬───────┘          │
//! │                └──────────────┬───────────────┘                  │
//! │                 channel name + payload (allow-listed)            │
//! └───────────────────────────────┼──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                      OverlayCoordinator                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐            │
//! │  │ DragTracker  │  │ToggleCoord.  │  │PositionFacade│            │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘            │
//! │         │          ┌──────┴───────┐         │                    │
//! │         │          │FadeController│         │                    │
//! │         │          └──────┬───────┘         │                    │
//! │  ┌──────┴─────────────────┴─────────────────┴────────┐           │
//! │  │   SurfaceRegistry (SurfaceKind -> SurfaceHandle)  │           │
//! │  └───────────────────────────────────────────────────┘           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use floatball_core::{
//!     HeadlessSurfaceFactory, OverlayConfig, OverlayCoordinator, SharedPointer, SourceId,
//!     SurfaceKind,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OverlayConfig::default();
//!     let factory = Arc::new(HeadlessSurfaceFactory::new());
//!     let pointer = SharedPointer::new();
//!     let coordinator = OverlayCoordinator::new(&config, factory, Arc::new(pointer));
//!
//!     coordinator.start().await?;
//!
//!     let ball = SourceId::new();
//!     coordinator.attach(ball, SurfaceKind::Primary).await?;
//!
//!     let visible = coordinator
//!         .handle_invoke(ball, "app:input:toggle", serde_json::Value::Null)
//!         .await;
//!     assert_eq!(visible, Some(serde_json::Value::Bool(true)));
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`geometry`]: Screen positions, sizes, pointer points
//! - [`surface`]: The surface handle contract and the headless backend
//! - [`surface_registry`]: Tagged registry of live surfaces and source bindings
//! - [`fade`]: Two-phase fade-in / fade-out sequencing
//! - [`drag`]: Pointer-polling drag sessions
//! - [`toggle`]: The Primary/Companion toggle state machine
//! - [`position`]: Position query/set facade
//! - [`pointer`]: Global pointer sources
//! - [`channels`]: Channel names and the allow-list trust boundary
//! - [`messages`]: Wire frames between clients and the coordinator
//! - [`coordinator`]: Command dispatch tying everything together
//! - [`config`]: TOML/env/CLI configuration loading
//! - [`transport`]: Length-prefixed frame codec

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod config;
pub mod coordinator;
pub mod drag;
pub mod error;
pub mod fade;
pub mod geometry;
pub mod messages;
pub mod pointer;
pub mod position;
pub mod surface;
pub mod surface_registry;
pub mod toggle;
pub mod transport;

// Re-exports for convenience
pub use channels::{Channel, ChannelAllowList, ChannelDirection};
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, OverlayConfig, OverlayToml,
};
pub use coordinator::OverlayCoordinator;
pub use drag::DragTracker;
pub use error::CoordinatorError;
pub use fade::{FadeController, TransitionTiming};
pub use geometry::{PointerPoint, Position, Size};
pub use messages::{CoordinatorFrame, LogLevel, LogPayload, SurfaceFrame};
pub use pointer::{PointerSource, SharedPointer};
pub use position::PositionFacade;
pub use surface::{
    HeadlessSurface, HeadlessSurfaceFactory, SurfaceError, SurfaceHandle, SurfaceKind,
    SurfaceSignal, SurfaceSpec, TopmostLevel,
};
pub use surface_registry::{SourceId, SurfaceFactory, SurfaceRegistry};
pub use toggle::{ToggleCoordinator, ToggleOutcome, ToggleState, TransitionGate};
