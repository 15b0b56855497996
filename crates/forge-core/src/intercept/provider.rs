//! Provider installation: patch-only providers are handed to the
//! platform's own installer, bound to the host package.

use tracing::info;

use crate::domain::BrokerError;
use crate::ports::{ProviderDescriptor, ProviderHost};
use crate::registry::ComponentRegistry;

pub fn provider_descriptors(registry: &ComponentRegistry, package: &str) -> Vec<ProviderDescriptor> {
    registry
        .patch_providers()
        .into_iter()
        .filter_map(|record| {
            Some(ProviderDescriptor {
                authority: record.authority?,
                name: record.qualified_name,
                package: package.to_string(),
            })
        })
        .collect()
}

/// Install every patch-only provider; returns how many were handed over.
pub fn install_providers(
    host: &dyn ProviderHost,
    registry: &ComponentRegistry,
    package: &str,
) -> Result<usize, BrokerError> {
    let descriptors = provider_descriptors(registry, package);
    if descriptors.is_empty() {
        return Ok(0);
    }
    host.install_providers(&descriptors)?;
    info!(count = descriptors.len(), "patch providers installed");
    Ok(descriptors.len())
}
