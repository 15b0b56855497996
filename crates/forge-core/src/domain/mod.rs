//! Domain model (versions, components, manifests, dispatch requests, errors).

pub mod component;
pub mod dispatch;
pub mod errors;
pub mod ids;
pub mod manifest;
pub mod state;
pub mod version;

pub use component::{ComponentDecl, ComponentKind, ComponentRecord, FilterDecl, FilterRule, LaunchMode};
pub use dispatch::{BroadcastResult, DispatchRequest, REDIRECT_MARKER_KEY, RedirectMarker};
pub use errors::{
    ActivationError, BrokerError, DispatchError, ErrorKind, HookError, InstallError, LoadError,
    LoadStage, OptimizationError, ReleaseError, StoreError, ValidationError,
};
pub use ids::ReleaseId;
pub use manifest::{HostManifest, Identity, PatchManifest};
pub use state::PipelineState;
pub use version::{BASE_SENTINEL, Version, VersionPointer, VersionSlots, VersionTag};
