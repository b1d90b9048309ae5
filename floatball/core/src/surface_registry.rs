//! Surface Registry - Tagged Surface Ownership
//!
//! Holds the two coordinated surfaces under explicit [`SurfaceKind`] tags and
//! maps each input source (a connected presentation client) to the surface it
//! drives. Nothing in the coordinator compares handles to work out "which
//! surface is this"; it asks the registry.
//!
//! # Architecture
//!
//! ```text
//!                       SurfaceRegistry
//!        ┌──────────────────────────────────────────────┐
//!        │ Primary   -> Arc<dyn SurfaceHandle>          │
//!        │ Companion -> Arc<dyn SurfaceHandle> (lazy)   │
//!        │ HashMap<SourceId, SurfaceKind>               │
//!        │   - wrapped in Arc<RwLock<>>                 │
//!        └──────────────────────┬───────────────────────┘
//!                               │ creates via
//!                        dyn SurfaceFactory
//! ```
//!
//! # Lifecycle
//!
//! - Primary is created once at startup.
//! - Companion is created the first time it is needed and recreated if it was
//!   destroyed in the meantime.
//! - Destroying Primary destroys Companion too.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::surface::{SurfaceError, SurfaceHandle, SurfaceKind, SurfaceSpec};

/// Identity of one input source (one connected presentation client)
///
/// Each source is assigned a unique ID when it connects. Drag sessions are
/// keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(u64);

impl SourceId {
    /// Create a new unique source ID
    #[must_use]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src-{}", self.0)
    }
}

/// Creates surfaces on demand
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    /// Create a hidden surface of `kind` from `spec`
    async fn create(
        &self,
        kind: SurfaceKind,
        spec: &SurfaceSpec,
    ) -> Result<Arc<dyn SurfaceHandle>, SurfaceError>;
}

#[derive(Default)]
struct RegistryInner {
    primary: Option<Arc<dyn SurfaceHandle>>,
    companion: Option<Arc<dyn SurfaceHandle>>,
    bindings: HashMap<SourceId, SurfaceKind>,
}

impl RegistryInner {
    fn slot(&self, kind: SurfaceKind) -> &Option<Arc<dyn SurfaceHandle>> {
        match kind {
            SurfaceKind::Primary => &self.primary,
            SurfaceKind::Companion => &self.companion,
        }
    }

    fn slot_mut(&mut self, kind: SurfaceKind) -> &mut Option<Arc<dyn SurfaceHandle>> {
        match kind {
            SurfaceKind::Primary => &mut self.primary,
            SurfaceKind::Companion => &mut self.companion,
        }
    }
}

/// Registry of the coordinated surfaces
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SurfaceRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    factory: Arc<dyn SurfaceFactory>,
    primary_spec: SurfaceSpec,
    companion_spec: SurfaceSpec,
}

impl SurfaceRegistry {
    /// Create an empty registry with default surface specs
    #[must_use]
    pub fn new(factory: Arc<dyn SurfaceFactory>) -> Self {
        Self::with_specs(factory, SurfaceSpec::primary(), SurfaceSpec::companion())
    }

    /// Create an empty registry with explicit surface specs
    #[must_use]
    pub fn with_specs(
        factory: Arc<dyn SurfaceFactory>,
        primary_spec: SurfaceSpec,
        companion_spec: SurfaceSpec,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            factory,
            primary_spec,
            companion_spec,
        }
    }

    /// Spec used when creating `kind`
    #[must_use]
    pub fn spec(&self, kind: SurfaceKind) -> &SurfaceSpec {
        match kind {
            SurfaceKind::Primary => &self.primary_spec,
            SurfaceKind::Companion => &self.companion_spec,
        }
    }

    /// Registered handle for `kind`, destroyed or not
    #[must_use]
    pub fn get(&self, kind: SurfaceKind) -> Option<Arc<dyn SurfaceHandle>> {
        self.inner.read().slot(kind).clone()
    }

    /// Registered handle for `kind` if it is still alive
    #[must_use]
    pub fn live(&self, kind: SurfaceKind) -> Option<Arc<dyn SurfaceHandle>> {
        self.get(kind).filter(|s| !s.is_destroyed())
    }

    /// Register an already-created surface under its own kind
    ///
    /// Returns the handle it replaced, if any.
    pub fn insert(&self, surface: Arc<dyn SurfaceHandle>) -> Option<Arc<dyn SurfaceHandle>> {
        let kind = surface.kind();
        let previous = self.inner.write().slot_mut(kind).replace(surface);
        tracing::info!(surface = %kind, "Surface registered");
        previous
    }

    /// Return the live surface for `kind`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the factory fails to create the surface.
    pub async fn ensure(&self, kind: SurfaceKind) -> Result<Arc<dyn SurfaceHandle>, SurfaceError> {
        if let Some(surface) = self.live(kind) {
            return Ok(surface);
        }

        let created = self.factory.create(kind, self.spec(kind)).await?;

        let mut inner = self.inner.write();
        let slot = inner.slot_mut(kind);
        if let Some(existing) = slot.as_ref().filter(|s| !s.is_destroyed()) {
            // Lost a creation race; keep the surface that is already registered.
            let existing = Arc::clone(existing);
            created.destroy();
            return Ok(existing);
        }
        *slot = Some(Arc::clone(&created));
        tracing::info!(surface = %kind, "Surface created");
        Ok(created)
    }

    /// Destroy `kind` and clear its slot
    ///
    /// Destroying Primary also destroys Companion.
    pub fn destroy(&self, kind: SurfaceKind) {
        let doomed: Vec<Arc<dyn SurfaceHandle>> = {
            let mut inner = self.inner.write();
            match kind {
                SurfaceKind::Primary => [inner.primary.take(), inner.companion.take()]
                    .into_iter()
                    .flatten()
                    .collect(),
                SurfaceKind::Companion => inner.companion.take().into_iter().collect(),
            }
        };
        for surface in doomed {
            surface.destroy();
            tracing::info!(surface = %surface.kind(), "Surface destroyed");
        }
    }

    /// Bind an input source to the surface it drives
    pub fn bind(&self, source: SourceId, kind: SurfaceKind) {
        self.inner.write().bindings.insert(source, kind);
        tracing::debug!(source = %source, surface = %kind, "Source bound");
    }

    /// Remove a source binding
    pub fn unbind(&self, source: &SourceId) -> Option<SurfaceKind> {
        let kind = self.inner.write().bindings.remove(source);
        if let Some(kind) = kind {
            tracing::debug!(source = %source, surface = %kind, "Source unbound");
        }
        kind
    }

    /// Which surface a source drives
    #[must_use]
    pub fn kind_of(&self, source: &SourceId) -> Option<SurfaceKind> {
        self.inner.read().bindings.get(source).copied()
    }

    /// The live surface a source drives
    #[must_use]
    pub fn resolve(&self, source: &SourceId) -> Option<Arc<dyn SurfaceHandle>> {
        let inner = self.inner.read();
        let kind = inner.bindings.get(source)?;
        inner.slot(*kind).clone().filter(|s| !s.is_destroyed())
    }

    /// Number of bound sources
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.inner.read().bindings.len()
    }
}

impl fmt::Debug for SurfaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SurfaceRegistry")
            .field("primary", &inner.primary.is_some())
            .field("companion", &inner.companion.is_some())
            .field("sources", &inner.bindings.len())
            .finish_non_exhaustive()
    }
}
