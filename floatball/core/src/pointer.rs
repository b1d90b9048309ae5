//! Global pointer sources

use std::sync::Arc;

use parking_lot::RwLock;

use crate::geometry::PointerPoint;

/// Where the pointer is right now, in global screen coordinates
pub trait PointerSource: Send + Sync {
    /// Current pointer position
    fn cursor_position(&self) -> PointerPoint;
}

/// Pointer position fed from outside
///
/// Clients report pointer motion and the drag tracker samples the latest
/// value. Clones share the same position.
#[derive(Clone, Debug, Default)]
pub struct SharedPointer {
    point: Arc<RwLock<PointerPoint>>,
}

impl SharedPointer {
    /// Pointer starting at the origin
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer starting at `(x, y)`
    #[must_use]
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            point: Arc::new(RwLock::new(PointerPoint::new(x, y))),
        }
    }

    /// Record a new pointer position
    pub fn move_to(&self, x: f64, y: f64) {
        *self.point.write() = PointerPoint::new(x, y);
    }
}

impl PointerSource for SharedPointer {
    fn cursor_position(&self) -> PointerPoint {
        *self.point.read()
    }
}
