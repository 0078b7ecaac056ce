//! Service-provider abstraction and the per-family implementations.
//!
//! A provider knows how to discover resources of one service family in a
//! region and how to delete a single resource. The coordinator and the
//! execution engine depend only on the `ServiceProvider` trait, never on
//! a concrete provider type.

mod cloudwatch;
mod context;
mod ec2;
mod elb;
mod rds;
mod s3;

pub use cloudwatch::CloudWatchProvider;
pub use context::AwsContext;
pub use ec2::Ec2Provider;
pub use elb::ElbProvider;
pub use rds::RdsProvider;
pub use s3::S3Provider;

use crate::error::{DeletionError, DiscoveryError};
use crate::model::{Resource, Service};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One resource family's discovery and deletion capability.
///
/// `discover` returns an empty list for regions the service does not
/// support; it only fails when the backend itself is unreachable.
/// `delete` is all-or-nothing for the given resource: on failure no side
/// effects are assumed.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    fn service(&self) -> Service;

    /// Whether the family is region-less (discovered exactly once).
    fn is_global(&self) -> bool {
        false
    }

    async fn discover(&self, region: &str) -> Result<Vec<Resource>, DiscoveryError>;

    async fn delete(&self, resource: &Resource) -> Result<(), DeletionError>;
}

/// Lookup of providers keyed by service, built once at startup.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<Service, Arc<dyn ServiceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard AWS provider set.
    pub fn standard(ctx: &AwsContext) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Ec2Provider::new(ctx.clone())));
        registry.register(Arc::new(S3Provider::new(ctx.clone())));
        registry.register(Arc::new(RdsProvider::new(ctx.clone())));
        registry.register(Arc::new(ElbProvider::new(ctx.clone())));
        registry.register(Arc::new(CloudWatchProvider::new(ctx.clone())));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn ServiceProvider>) {
        self.providers.insert(provider.service(), provider);
    }

    pub fn get(&self, service: &Service) -> Option<&Arc<dyn ServiceProvider>> {
        self.providers.get(service)
    }

    /// Providers in service order (deterministic).
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ServiceProvider>> {
        self.providers.values()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
