//! Position queries and moves on behalf of a source

use crate::geometry::Position;
use crate::surface_registry::{SourceId, SurfaceRegistry};

/// Reads and writes the position of whichever surface a source drives
#[derive(Clone, Debug)]
pub struct PositionFacade {
    registry: SurfaceRegistry,
}

impl PositionFacade {
    /// Facade over `registry`
    #[must_use]
    pub fn new(registry: SurfaceRegistry) -> Self {
        Self { registry }
    }

    /// Position of the source's surface, or the origin if there is none
    #[must_use]
    pub fn position_of(&self, source: &SourceId) -> Position {
        self.registry
            .resolve(source)
            .map(|surface| surface.position())
            .unwrap_or_default()
    }

    /// Move the source's surface to `(x, y)`, rounded to whole pixels
    ///
    /// Returns the position applied, or `None` if the source has no live
    /// surface.
    pub fn move_to(&self, source: &SourceId, x: f64, y: f64) -> Option<Position> {
        let surface = self.registry.resolve(source)?;
        let target = Position::rounded(x, y);
        surface.set_position(target);
        Some(target)
    }
}
