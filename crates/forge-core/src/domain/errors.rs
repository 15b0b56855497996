//! Errors - エラー型と分類
//!
//! | 種類 | 扱い |
//! |------|------|
//! | ValidationError | 常に致命的、何も適用しない |
//! | InstallError | 致命的、状態を永続化しないことで巻き戻す |
//! | OptimizationError | 非致命的、ログのみ |
//! | ActivationError | 直前バージョンへのポインタ swap を引き起こす |
//! | DispatchError | その dispatch だけを捨てる |

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::component::ComponentKind;

/// ErrorKind は運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 一時的なエラー（後でやり直せば通る）
    Transient,
    /// 恒久的なエラー（入力を直さない限り通らない）
    Permanent,
    /// インフラエラー（ファイルシステム、ストア）
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("artifact not found: {0}")]
    ArtifactMissing(PathBuf),

    #[error("unreadable metadata at {path}: {reason}")]
    UnreadableMetadata { path: PathBuf, reason: String },

    #[error("package identity mismatch: host={host}, artifact={artifact}")]
    PackageMismatch { host: String, artifact: String },

    #[error("signing identity mismatch for package {package}")]
    SignerMismatch { package: String },

    #[error("invalid version id {0:?}")]
    InvalidVersionId(String),

    #[error("unsafe entry path {0:?} in artifact")]
    UnsafeEntryPath(String),

    #[error("version {id} is already installed with a different digest")]
    DigestConflict { id: String },

    #[error("installed artifact of {id} does not match its recorded digest")]
    DigestMismatch { id: String },
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to create {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to copy artifact to {path}: {source}")]
    Copy { path: PathBuf, source: io::Error },

    #[error("failed to digest {path}: {source}")]
    Digest { path: PathBuf, source: io::Error },

    #[error("install task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("unpack failed: {0}")]
    Unpack(String),

    #[error("ahead-of-time compilation failed: {0}")]
    Compile(String),
}

/// Which loader a [`LoadError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Unpack,
    Code,
    Resources,
    NativeLibraries,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStage::Unpack => "unpack",
            LoadStage::Code => "code",
            LoadStage::Resources => "resources",
            LoadStage::NativeLibraries => "native_libraries",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("missing entry {0}")]
    MissingEntry(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("re-validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{stage} loader failed: {source}")]
    Load {
        stage: LoadStage,
        #[source]
        source: LoadError,
    },

    #[error("state store failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("placeholder {placeholder} received a request without redirect marker")]
    MissingMarker { placeholder: String },

    #[error("{kind} {name} is neither host-declared nor patch-only")]
    UnknownTarget { kind: ComponentKind, name: String },

    #[error("cannot resolve {name} in the merged code units")]
    Unresolvable { name: String },

    #[error("{name} failed: {reason}")]
    ComponentFailed { name: String, reason: String },

    #[error("placeholder {placeholder} cannot serve a {requested} dispatch")]
    RoleMismatch {
        placeholder: String,
        requested: ComponentKind,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("corrupt store file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Failure of a platform broker call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("rejected by platform: {0}")]
    Rejected(String),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Failure at the capability-injection seam.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("{broker} substitution unsupported on platform api {api_level}")]
    Unsupported { broker: &'static str, api_level: u32 },

    #[error("{broker} substitution failed: {reason}")]
    Substitution {
        broker: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("another release is in flight")]
    Busy,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("failed to persist version state: {0}")]
    Persist(#[from] StoreError),
}

impl ReleaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReleaseError::Busy => ErrorKind::Transient,
            ReleaseError::Validation(_) => ErrorKind::Permanent,
            ReleaseError::Install(_) | ReleaseError::Persist(_) => ErrorKind::Infrastructure,
        }
    }
}
