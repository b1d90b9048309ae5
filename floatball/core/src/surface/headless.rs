//! Headless Surface Backend
//!
//! An in-memory [`SurfaceHandle`] used when no native windowing backend is
//! attached: the daemon, integration tests, and scripted clients. Geometry and
//! visibility live in a lock; presentation signals go out on a broadcast
//! channel so any number of attached clients can render them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::{SurfaceError, SurfaceHandle, SurfaceKind, SurfaceSignal, SurfaceSpec};
use crate::geometry::{Position, Size};
use crate::surface_registry::SurfaceFactory;

/// Buffered signals per surface before slow subscribers start lagging
const SIGNAL_CAPACITY: usize = 64;

#[derive(Debug)]
struct HeadlessState {
    position: Position,
    size: Size,
    visible: bool,
    destroyed: bool,
    focused: bool,
    raises: usize,
}

/// In-memory surface
#[derive(Debug)]
pub struct HeadlessSurface {
    kind: SurfaceKind,
    spec: SurfaceSpec,
    state: RwLock<HeadlessState>,
    signals: broadcast::Sender<SurfaceSignal>,
}

impl HeadlessSurface {
    /// Create a hidden surface with its own signal channel
    #[must_use]
    pub fn new(kind: SurfaceKind, spec: SurfaceSpec) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self::with_signals(kind, spec, signals)
    }

    /// Create a hidden surface publishing on an existing signal channel
    #[must_use]
    pub fn with_signals(
        kind: SurfaceKind,
        spec: SurfaceSpec,
        signals: broadcast::Sender<SurfaceSignal>,
    ) -> Self {
        let state = HeadlessState {
            position: spec.position,
            size: spec.size,
            visible: false,
            destroyed: false,
            focused: false,
            raises: 0,
        };
        Self {
            kind,
            spec,
            state: RwLock::new(state),
            signals,
        }
    }

    /// Subscribe to this surface's presentation signals
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceSignal> {
        self.signals.subscribe()
    }

    /// Spec the surface was created from
    #[must_use]
    pub fn spec(&self) -> &SurfaceSpec {
        &self.spec
    }

    /// Whether the surface currently holds focus
    #[must_use]
    pub fn is_focused(&self) -> bool {
        self.state.read().focused
    }

    /// How many times the surface has been raised
    #[must_use]
    pub fn raise_count(&self) -> usize {
        self.state.read().raises
    }
}

impl SurfaceHandle for HeadlessSurface {
    fn kind(&self) -> SurfaceKind {
        self.kind
    }

    fn position(&self) -> Position {
        self.state.read().position
    }

    fn set_position(&self, position: Position) {
        let mut state = self.state.write();
        if !state.destroyed {
            state.position = position;
        }
    }

    fn size(&self) -> Size {
        self.state.read().size
    }

    fn show(&self) {
        let mut state = self.state.write();
        if !state.destroyed {
            state.visible = true;
        }
    }

    fn hide(&self) {
        let mut state = self.state.write();
        if !state.destroyed {
            state.visible = false;
            state.focused = false;
        }
    }

    fn is_visible(&self) -> bool {
        let state = self.state.read();
        !state.destroyed && state.visible
    }

    fn is_destroyed(&self) -> bool {
        self.state.read().destroyed
    }

    fn destroy(&self) {
        let mut state = self.state.write();
        if !state.destroyed {
            state.destroyed = true;
            state.visible = false;
            state.focused = false;
            tracing::debug!(surface = %self.kind, "Headless surface destroyed");
        }
    }

    fn raise(&self) {
        let mut state = self.state.write();
        if !state.destroyed {
            state.raises += 1;
        }
    }

    fn notify(&self, signal: SurfaceSignal) {
        if self.is_destroyed() {
            return;
        }
        // No subscribers is fine: nobody is rendering this surface yet.
        let _ = self.signals.send(signal);
    }

    fn try_focus(&self) -> Result<(), SurfaceError> {
        let mut state = self.state.write();
        if state.destroyed {
            return Ok(());
        }
        if !self.spec.focusable {
            return Err(SurfaceError::FocusRefused(self.kind));
        }
        state.focused = true;
        Ok(())
    }
}

/// Factory producing [`HeadlessSurface`]s
///
/// Owns one signal hub per surface kind, so clients can subscribe to a
/// surface's signals before it exists and keep their subscription across
/// re-creation.
#[derive(Debug)]
pub struct HeadlessSurfaceFactory {
    primary_signals: broadcast::Sender<SurfaceSignal>,
    companion_signals: broadcast::Sender<SurfaceSignal>,
    created: AtomicUsize,
}

impl Default for HeadlessSurfaceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessSurfaceFactory {
    /// Create a factory with empty signal hubs
    #[must_use]
    pub fn new() -> Self {
        let (primary_signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (companion_signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            primary_signals,
            companion_signals,
            created: AtomicUsize::new(0),
        }
    }

    /// Subscribe to signals for every surface of `kind` this factory creates
    #[must_use]
    pub fn subscribe(&self, kind: SurfaceKind) -> broadcast::Receiver<SurfaceSignal> {
        self.hub(kind).subscribe()
    }

    /// Number of surfaces created so far
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn hub(&self, kind: SurfaceKind) -> &broadcast::Sender<SurfaceSignal> {
        match kind {
            SurfaceKind::Primary => &self.primary_signals,
            SurfaceKind::Companion => &self.companion_signals,
        }
    }
}

#[async_trait]
impl SurfaceFactory for HeadlessSurfaceFactory {
    async fn create(
        &self,
        kind: SurfaceKind,
        spec: &SurfaceSpec,
    ) -> Result<Arc<dyn SurfaceHandle>, SurfaceError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            surface = %kind,
            width = spec.size.width,
            height = spec.size.height,
            topmost = ?spec.topmost,
            "Creating headless surface"
        );
        let surface = HeadlessSurface::with_signals(kind, spec.clone(), self.hub(kind).clone());
        Ok(Arc::new(surface))
    }
}
