//! Shared test doubles and fixture helpers.
//!
//! Compiled into the library so integration tests can use the same
//! mocks as unit tests.

use crate::error::{DeletionError, DeletionFailure, DiscoveryError, SafetyGateRejection};
use crate::model::{Resource, ResourceKey, Service};
use crate::provider::ServiceProvider;
use crate::safety::{AccountId, AccountInfo, Environment, SafetyGate};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub fn key(service: Service, region: &str, id: &str) -> ResourceKey {
    ResourceKey::new(service, region, id)
}

/// Minimal resource fixture: empty name and status, no metadata.
pub fn resource(service: Service, region: &str, id: &str, deps: &[&str]) -> Resource {
    Resource {
        key: key(service, region, id),
        kind: "test".to_string(),
        name: String::new(),
        status: String::new(),
        raw_metadata: BTreeMap::new(),
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
    }
}

/// Scripted provider recording every discover and delete call.
pub struct MockProvider {
    service: Service,
    global: bool,
    resources: BTreeMap<String, Vec<Resource>>,
    failing_regions: BTreeSet<String>,
    failing_deletes: BTreeSet<String>,
    cancel_on_delete: Option<(String, CancellationToken)>,
    discover_calls: Mutex<Vec<String>>,
    delete_calls: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            global: false,
            resources: BTreeMap::new(),
            failing_regions: BTreeSet::new(),
            failing_deletes: BTreeSet::new(),
            cancel_on_delete: None,
            discover_calls: Mutex::new(Vec::new()),
            delete_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub fn with_resources(mut self, region: &str, resources: Vec<Resource>) -> Self {
        self.resources.insert(region.to_string(), resources);
        self
    }

    /// Make discovery in `region` fail.
    pub fn failing_in(mut self, region: &str) -> Self {
        self.failing_regions.insert(region.to_string());
        self
    }

    /// Make deletion of the resource with this id fail.
    pub fn failing_delete(mut self, id: &str) -> Self {
        self.failing_deletes.insert(id.to_string());
        self
    }

    /// Cancel the token from inside the delete call for this id, after
    /// recording it. The deletion itself still succeeds.
    pub fn cancelling_on_delete(mut self, id: &str, token: CancellationToken) -> Self {
        self.cancel_on_delete = Some((id.to_string(), token));
        self
    }

    /// Regions discover was called with, in call order.
    pub fn discover_calls(&self) -> Vec<String> {
        self.discover_calls.lock().unwrap().clone()
    }

    /// Resource ids delete was called with, in call order.
    pub fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceProvider for MockProvider {
    fn service(&self) -> Service {
        self.service.clone()
    }

    fn is_global(&self) -> bool {
        self.global
    }

    async fn discover(&self, region: &str) -> Result<Vec<Resource>, DiscoveryError> {
        self.discover_calls.lock().unwrap().push(region.to_string());

        if self.failing_regions.contains(region) {
            return Err(DiscoveryError::new(
                self.service.clone(),
                region,
                anyhow!("simulated API failure"),
            ));
        }
        Ok(self.resources.get(region).cloned().unwrap_or_default())
    }

    async fn delete(&self, resource: &Resource) -> Result<(), DeletionError> {
        self.delete_calls
            .lock()
            .unwrap()
            .push(resource.key.id.clone());

        if let Some((id, token)) = &self.cancel_on_delete {
            if id == &resource.key.id {
                token.cancel();
            }
        }

        if self.failing_deletes.contains(&resource.key.id) {
            return Err(DeletionError::new(
                resource.key.clone(),
                DeletionFailure::InUse,
                "simulated deletion failure",
            ));
        }
        Ok(())
    }
}

enum GateBehavior {
    Approve,
    RejectProtected,
    Decline,
}

/// Gate with a fixed answer, counting confirmation prompts.
pub struct StaticGate {
    behavior: GateBehavior,
    confirms: AtomicUsize,
}

impl StaticGate {
    pub fn approving() -> Self {
        Self {
            behavior: GateBehavior::Approve,
            confirms: AtomicUsize::new(0),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            behavior: GateBehavior::RejectProtected,
            confirms: AtomicUsize::new(0),
        }
    }

    pub fn declining() -> Self {
        Self {
            behavior: GateBehavior::Decline,
            confirms: AtomicUsize::new(0),
        }
    }

    pub fn confirm_count(&self) -> usize {
        self.confirms.load(Ordering::SeqCst)
    }

    fn account() -> AccountInfo {
        AccountInfo {
            account_id: AccountId("111122223333".to_string()),
            arn: "arn:aws:iam::111122223333:user/fixture".to_string(),
            user_id: "AIDATEST".to_string(),
            profile: None,
            environment: Environment::Unknown,
        }
    }
}

#[async_trait]
impl SafetyGate for StaticGate {
    async fn verify_profile(&self) -> Result<AccountInfo, SafetyGateRejection> {
        match self.behavior {
            GateBehavior::RejectProtected => Err(SafetyGateRejection::ProtectedAccount {
                account_id: "111122223333".to_string(),
            }),
            _ => Ok(Self::account()),
        }
    }

    fn is_environment_protected(&self, _account: &AccountInfo) -> bool {
        false
    }

    fn confirm(&self, _prompt: &str) -> bool {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        matches!(self.behavior, GateBehavior::Approve)
    }
}
