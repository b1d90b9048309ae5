//! Screen Geometry
//!
//! Integer screen coordinates for surfaces and fractional coordinates for the
//! pointer. Surfaces always land on whole pixels; the pointer may not (high
//! DPI scaling), so conversions go through [`Position::rounded`].

use std::fmt;
use std::ops::Sub;

use serde::{Deserialize, Serialize};

/// Top-left corner of a surface in screen coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal screen coordinate
    pub x: i32,
    /// Vertical screen coordinate
    pub y: i32,
}

impl Position {
    /// Create a position from integer coordinates
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Round fractional coordinates to the nearest whole pixel
    ///
    /// Halves round away from zero. Values outside the `i32` range saturate.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn rounded(x: f64, y: f64) -> Self {
        Self {
            x: x.round() as i32,
            y: y.round() as i32,
        }
    }

    /// Position displaced by a fractional delta, rounded
    #[must_use]
    pub fn displaced(self, dx: f64, dy: f64) -> Self {
        Self::rounded(f64::from(self.x) + dx, f64::from(self.y) + dy)
    }

    /// Position moved horizontally by `dx`, clamped to the `i32` range
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn shifted_x(self, dx: i64) -> Self {
        let x = (i64::from(self.x) + dx).clamp(i64::from(i32::MIN), i64::from(i32::MAX));
        Self { x: x as i32, y: self.y }
    }

    /// Coordinates as an `[x, y]` pair
    #[must_use]
    pub const fn to_array(self) -> [i32; 2] {
        [self.x, self.y]
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Outer size of a surface in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Size {
    /// Create a size
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Global pointer location, possibly between pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerPoint {
    /// Horizontal screen coordinate
    pub x: f64,
    /// Vertical screen coordinate
    pub y: f64,
}

impl PointerPoint {
    /// Create a pointer point
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Sub for PointerPoint {
    type Output = (f64, f64);

    fn sub(self, rhs: Self) -> Self::Output {
        (self.x - rhs.x, self.y - rhs.y)
    }
}
