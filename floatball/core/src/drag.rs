//! Drag Tracker - Pointer-Following Sessions
//!
//! While a drag is active the surface follows the global pointer. Each session
//! samples the pointer on a fixed interval (about one display frame) and
//! places the surface at
//!
//! ```text
//! round(start_position + (pointer_now - start_pointer))
//! ```
//!
//! Positions are always computed from the session's starting point, never
//! from the previous tick, so rounding error cannot accumulate.
//!
//! # Sessions
//!
//! - Keyed by [`SourceId`]; at most one per source.
//! - Starting a drag for a source replaces (and cancels) its previous session.
//! - A session whose surface is found destroyed ends itself quietly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::geometry::{PointerPoint, Position};
use crate::pointer::PointerSource;
use crate::surface::{SurfaceHandle, SurfaceKind};
use crate::surface_registry::SourceId;

/// Default pointer sampling interval
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(16);

/// One active drag
#[derive(Debug)]
struct DragSession {
    generation: u64,
    target: SurfaceKind,
    sampler: AbortHandle,
}

impl Drop for DragSession {
    fn drop(&mut self) {
        self.sampler.abort();
    }
}

/// Owns every active drag session
#[derive(Clone)]
pub struct DragTracker {
    pointer: Arc<dyn PointerSource>,
    sessions: Arc<DashMap<SourceId, DragSession>>,
    interval: Duration,
    next_generation: Arc<AtomicU64>,
}

impl DragTracker {
    /// Tracker sampling `pointer` every `interval`
    #[must_use]
    pub fn new(pointer: Arc<dyn PointerSource>, interval: Duration) -> Self {
        Self {
            pointer,
            sessions: Arc::new(DashMap::new()),
            interval,
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Sampling interval in use
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start dragging `surface` on behalf of `source`
    ///
    /// Any session `source` already had is cancelled first. The first sample
    /// is taken one interval from now. Must be called within a Tokio runtime.
    pub fn start_drag(&self, source: SourceId, surface: Arc<dyn SurfaceHandle>) {
        if self.sessions.remove(&source).is_some() {
            tracing::debug!(source = %source, "Replacing active drag session");
        }
        if surface.is_destroyed() {
            return;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let target = surface.kind();
        let start_pointer = self.pointer.cursor_position();
        let start_position = surface.position();

        let sampler = tokio::spawn(follow_pointer(
            Arc::clone(&self.pointer),
            surface,
            start_pointer,
            start_position,
            self.interval,
            Arc::clone(&self.sessions),
            source,
            generation,
        ))
        .abort_handle();

        self.sessions.insert(
            source,
            DragSession {
                generation,
                target,
                sampler,
            },
        );
        tracing::debug!(
            source = %source,
            surface = %target,
            start = %start_position,
            "Drag started"
        );
    }

    /// Stop the drag for `source`; a no-op if there is none
    pub fn stop_drag(&self, source: &SourceId) {
        if let Some((_, session)) = self.sessions.remove(source) {
            tracing::debug!(source = %source, surface = %session.target, "Drag stopped");
        }
    }

    /// Stop every active drag
    pub fn stop_all(&self) {
        let count = self.sessions.len();
        self.sessions.clear();
        if count > 0 {
            tracing::debug!(count, "All drags stopped");
        }
    }

    /// Whether `source` has an active drag
    #[must_use]
    pub fn is_dragging(&self, source: &SourceId) -> bool {
        self.sessions.contains_key(source)
    }

    /// Number of active drag sessions
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl std::fmt::Debug for DragTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragTracker")
            .field("interval", &self.interval)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::too_many_arguments)]
async fn follow_pointer(
    pointer: Arc<dyn PointerSource>,
    surface: Arc<dyn SurfaceHandle>,
    start_pointer: PointerPoint,
    start_position: Position,
    period: Duration,
    sessions: Arc<DashMap<SourceId, DragSession>>,
    source: SourceId,
    generation: u64,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if surface.is_destroyed() {
            // Only remove our own session; a newer one may have replaced it.
            sessions.remove_if(&source, |_, session| session.generation == generation);
            tracing::debug!(source = %source, "Drag target destroyed, session ended");
            break;
        }

        let (dx, dy) = pointer.cursor_position() - start_pointer;
        surface.set_position(start_position.displaced(dx, dy));
    }
}
