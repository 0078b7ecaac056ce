//! Discovery coordination: fans providers out across regions and
//! aggregates the results into a catalog.
//!
//! All calls are awaited sequentially so result ordering and failure
//! attribution are deterministic. A failure for one (service, region)
//! pair is recorded on the catalog and never aborts the rest of the run.

use crate::config::Settings;
use crate::error::DiscoveryError;
use crate::model::{ResourceCatalog, GLOBAL_REGION};
use crate::provider::ProviderRegistry;
use tracing::{debug, info, warn};

pub struct DiscoveryCoordinator<'a> {
    registry: &'a ProviderRegistry,
    settings: &'a Settings,
}

impl<'a> DiscoveryCoordinator<'a> {
    pub fn new(registry: &'a ProviderRegistry, settings: &'a Settings) -> Self {
        Self { registry, settings }
    }

    /// Run one discovery pass over all enabled services and configured
    /// regions. Global services are discovered exactly once regardless of
    /// how many regions are configured.
    pub async fn discover(&self) -> ResourceCatalog {
        let regions = self.settings.regions();
        info!(
            regions = regions.len(),
            providers = self.registry.len(),
            "Starting resource discovery"
        );

        let mut resources = Vec::new();
        let mut failures: Vec<DiscoveryError> = Vec::new();

        for provider in self.registry.iter() {
            let service = provider.service();
            if !self.settings.service_enabled(&service) {
                debug!(service = %service, "Service disabled, skipping discovery");
                continue;
            }

            if provider.is_global() {
                match provider.discover(GLOBAL_REGION).await {
                    Ok(found) => {
                        info!(service = %service, count = found.len(), "Discovered global service");
                        resources.extend(found);
                    }
                    Err(e) => {
                        warn!(service = %service, error = %e, "Discovery failed");
                        failures.push(e);
                    }
                }
                continue;
            }

            for region in regions {
                match provider.discover(region).await {
                    Ok(found) => {
                        debug!(
                            service = %service,
                            region = %region,
                            count = found.len(),
                            "Discovered region"
                        );
                        resources.extend(found);
                    }
                    Err(e) => {
                        warn!(service = %service, region = %region, error = %e, "Discovery failed");
                        failures.push(e);
                    }
                }
            }
        }

        info!(
            resources = resources.len(),
            failures = failures.len(),
            "Discovery pass complete"
        );
        ResourceCatalog::from_discovery(resources, failures)
    }
}
