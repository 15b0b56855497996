//! Artifact handling: bundle format, validation, installation and on-disk layout.

pub mod bundle;
pub mod installer;
pub mod layout;
pub mod validator;

pub use self::bundle::{ArtifactBundle, BundleEntry};
pub use self::installer::{ArtifactInstaller, digest_file};
pub use self::layout::ForgeLayout;
pub use self::validator::ArtifactValidator;
