//! Versioned shared artifacts.
//!
//! Predictors read three kinds of shared, occasionally-replaced data: the
//! active world-state view, the active learned-model weights, and the active
//! generated-script set. Each is published as an immutable version; readers
//! pin the version they started with and never observe a partial update.

pub mod store;
pub mod types;

pub use store::{
    ArtifactHandles, ArtifactStore, GovernedPublisher, ReadHandle, SharedArtifactStore,
    StoreError, StoreResult, SwapError, Versioned,
};
pub use types::{
    ArtifactContent, ArtifactKind, ModelArtifact, Script, ScriptSet, ScriptTrigger,
    WorldStateView, MODEL_FEATURE_COUNT,
};
