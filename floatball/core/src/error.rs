//! Coordinator errors

use thiserror::Error;

use crate::surface::SurfaceError;

/// Errors from coordinator operations that can genuinely fail
///
/// Stale handles, refused focus, rejected toggles, a missing Primary, and
/// unlisted channels are not errors and never show up here.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A surface backend failed
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}
