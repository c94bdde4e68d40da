//! Copy-on-publish versioned artifact store.
//!
//! Each artifact kind lives in a slot holding an `Arc` to the current
//! immutable version. `acquire_read` copies that pointer under a read lock
//! held just long enough for the clone; `publish` validates outside the lock,
//! then takes the write lock only to swap the pointer and bump the version
//! counter. A reader that acquired before a publish keeps its version until
//! the handle drops; the last drop frees it.

use crate::artifacts::types::{
    ArtifactContent, ArtifactKind, ModelArtifact, ScriptSet, WorldStateView,
};
use crate::config::EngineConfig;
use crate::governor::order::{GovernorError, LockGovernor, Subsystem};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Publish rejected for {kind}: {reason}")]
    PublishRejected { kind: ArtifactKind, reason: String },

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to the artifact store.
pub type SharedArtifactStore = Arc<ArtifactStore>;

/// One immutable published version.
#[derive(Debug)]
pub struct Versioned<T> {
    pub version: u64,
    pub published_at: DateTime<Utc>,
    pub content: T,
}

/// A read handle pinning one version. Release is `Drop`.
#[derive(Debug, Clone)]
pub struct ReadHandle<T>(Arc<Versioned<T>>);

impl<T> ReadHandle<T> {
    /// Version id this handle pins.
    pub fn version(&self) -> u64 {
        self.0.version
    }

    /// When this version was published.
    pub fn published_at(&self) -> DateTime<Utc> {
        self.0.published_at
    }
}

impl<T> std::ops::Deref for ReadHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0.content
    }
}

/// Slot holding the current version of one artifact kind.
struct Slot<T> {
    current: RwLock<Arc<Versioned<T>>>,
}

impl<T: ArtifactContent> Slot<T> {
    fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(Versioned {
                version: 0,
                published_at: Utc::now(),
                content: initial,
            })),
        }
    }

    fn acquire(&self) -> StoreResult<ReadHandle<T>> {
        let guard = self.current.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(ReadHandle(Arc::clone(&guard)))
    }

    fn publish(&self, content: T) -> StoreResult<u64> {
        // Validate before touching the lock; failed content never swaps in.
        if let Err(reason) = content.validate() {
            warn!(kind = %T::kind(), %reason, "Artifact publish rejected");
            return Err(StoreError::PublishRejected {
                kind: T::kind(),
                reason,
            });
        }

        let mut guard = self.current.write().map_err(|_| StoreError::LockPoisoned)?;
        let version = guard.version + 1;
        *guard = Arc::new(Versioned {
            version,
            published_at: Utc::now(),
            content,
        });
        debug!(kind = %T::kind(), version, "Artifact published");
        Ok(version)
    }

    fn current_version(&self) -> StoreResult<u64> {
        Ok(self
            .current
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .version)
    }
}

/// Read handles for everything a predictor consumes during one call.
///
/// Acquired at call start, released (dropped) at call end, so a concurrent
/// hot-swap never invalidates data mid-call.
#[derive(Clone)]
pub struct ArtifactHandles {
    pub world: ReadHandle<WorldStateView>,
    pub model: ReadHandle<ModelArtifact>,
    pub scripts: ReadHandle<ScriptSet>,
}

/// The store owning all shared artifact slots.
pub struct ArtifactStore {
    world: Slot<WorldStateView>,
    model: Slot<ModelArtifact>,
    scripts: Slot<ScriptSet>,
    config: Slot<EngineConfig>,
}

impl ArtifactStore {
    /// Create a store seeded with empty artifacts and the given config.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            world: Slot::new(WorldStateView::empty()),
            model: Slot::new(ModelArtifact::empty()),
            scripts: Slot::new(ScriptSet::empty()),
            config: Slot::new(config),
        }
    }

    /// Create a shared reference to this store.
    pub fn shared(self) -> SharedArtifactStore {
        Arc::new(self)
    }

    /// Acquire all predictor-facing handles at once.
    pub fn acquire_all(&self) -> StoreResult<ArtifactHandles> {
        Ok(ArtifactHandles {
            world: self.world.acquire()?,
            model: self.model.acquire()?,
            scripts: self.scripts.acquire()?,
        })
    }

    pub fn acquire_world(&self) -> StoreResult<ReadHandle<WorldStateView>> {
        self.world.acquire()
    }

    pub fn acquire_model(&self) -> StoreResult<ReadHandle<ModelArtifact>> {
        self.model.acquire()
    }

    pub fn acquire_scripts(&self) -> StoreResult<ReadHandle<ScriptSet>> {
        self.scripts.acquire()
    }

    pub fn acquire_config(&self) -> StoreResult<ReadHandle<EngineConfig>> {
        self.config.acquire()
    }

    pub fn publish_world(&self, view: WorldStateView) -> StoreResult<u64> {
        self.world.publish(view)
    }

    pub fn publish_model(&self, model: ModelArtifact) -> StoreResult<u64> {
        self.model.publish(model)
    }

    pub fn publish_scripts(&self, scripts: ScriptSet) -> StoreResult<u64> {
        self.scripts.publish(scripts)
    }

    pub fn publish_config(&self, config: EngineConfig) -> StoreResult<u64> {
        self.config.publish(config)
    }

    /// Current version id for an artifact kind.
    pub fn current_version(&self, kind: ArtifactKind) -> StoreResult<u64> {
        match kind {
            ArtifactKind::WorldState => self.world.current_version(),
            ArtifactKind::Model => self.model.current_version(),
            ArtifactKind::ScriptSet => self.scripts.current_version(),
            ArtifactKind::Config => self.config.current_version(),
        }
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Error type for governed publishes.
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Governor(#[from] GovernorError),
}

/// Writer-facing publish entry point.
///
/// Every hot-swap writer goes through here: each publish first takes the
/// matching subsystem lock from the governor, so concurrent writers of one
/// kind serialize under the global rank order and a stuck swap shows up in
/// the watchdog's held-lock scan. Readers never touch these locks; the
/// store's internal `RwLock` alone keeps the pointer swap atomic for them.
#[derive(Clone)]
pub struct GovernedPublisher {
    store: SharedArtifactStore,
    governor: LockGovernor,
    max_wait: Duration,
}

impl GovernedPublisher {
    pub fn new(store: SharedArtifactStore, governor: LockGovernor, max_wait: Duration) -> Self {
        Self {
            store,
            governor,
            max_wait,
        }
    }

    pub fn publish_world(&self, view: WorldStateView) -> Result<u64, SwapError> {
        let _ticket =
            self.governor
                .acquire(Subsystem::WorldSwap, self.max_wait, "publisher::world")?;
        Ok(self.store.publish_world(view)?)
    }

    pub fn publish_model(&self, model: ModelArtifact) -> Result<u64, SwapError> {
        let _ticket =
            self.governor
                .acquire(Subsystem::ModelSwap, self.max_wait, "publisher::model")?;
        Ok(self.store.publish_model(model)?)
    }

    pub fn publish_scripts(&self, scripts: ScriptSet) -> Result<u64, SwapError> {
        let _ticket =
            self.governor
                .acquire(Subsystem::ScriptSwap, self.max_wait, "publisher::scripts")?;
        Ok(self.store.publish_scripts(scripts)?)
    }

    pub fn publish_config(&self, config: EngineConfig) -> Result<u64, SwapError> {
        let _ticket =
            self.governor
                .acquire(Subsystem::Config, self.max_wait, "publisher::config")?;
        Ok(self.store.publish_config(config)?)
    }
}
