//! Plan execution: walks a deletion plan strictly in order, with
//! gating, dry-run support, per-resource failure isolation, and
//! cancellation between resources.

use crate::error::{DeletionError, DeletionFailure, SafetyGateRejection};
use crate::model::{ResourceCatalog, ResourceKey};
use crate::plan::DeletionPlan;
use crate::provider::ProviderRegistry;
use crate::safety::SafetyGate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Engine lifecycle for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Gating,
    Executing,
    Done,
    Aborted,
}

/// Why an execution attempt stopped before completing the plan.
#[derive(Debug, Clone)]
pub enum AbortReason {
    GateRejected(SafetyGateRejection),
    Cancelled,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::GateRejected(rejection) => write!(f, "safety gate: {rejection}"),
            AbortReason::Cancelled => write!(f, "cancelled by operator"),
        }
    }
}

/// Outcome recorded for one plan entry.
#[derive(Debug)]
pub enum ItemOutcome {
    /// Provider deletion succeeded.
    Succeeded,
    /// Dry-run: success recorded without calling the provider.
    Simulated,
    /// Provider rejected the deletion; the batch continued.
    Failed(DeletionError),
    /// Never reached because the run aborted first.
    NotAttempted,
}

/// Result of one engine invocation, rendered by the caller.
#[derive(Debug)]
pub struct ExecutionSummary {
    pub dry_run: bool,
    pub final_state: EngineState,
    pub aborted: Option<AbortReason>,
    pub outcomes: Vec<(ResourceKey, ItemOutcome)>,
}

impl ExecutionSummary {
    pub fn attempted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, ItemOutcome::NotAttempted))
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::Succeeded | ItemOutcome::Simulated))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn not_attempted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::NotAttempted))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ResourceKey, &DeletionError)> {
        self.outcomes.iter().filter_map(|(k, o)| match o {
            ItemOutcome::Failed(e) => Some((k, e)),
            _ => None,
        })
    }
}

/// Options for one execution attempt.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Simulate outcomes without calling providers or the safety gate.
    pub dry_run: bool,
}

pub struct ExecutionEngine<'a> {
    registry: &'a ProviderRegistry,
    gate: &'a dyn SafetyGate,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(registry: &'a ProviderRegistry, gate: &'a dyn SafetyGate) -> Self {
        Self { registry, gate }
    }

    /// Execute a plan against the catalog it was computed from.
    ///
    /// Real runs consult the safety gate first; any rejection aborts with
    /// zero deletions attempted. During execution a single resource's
    /// failure is recorded and the batch continues. The cancellation
    /// token is checked between resources, never mid-call.
    pub async fn execute(
        &self,
        plan: &DeletionPlan,
        catalog: &ResourceCatalog,
        options: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> ExecutionSummary {
        if !options.dry_run {
            debug!("Consulting safety gate");
            if let Err(rejection) = self.gate_check().await {
                warn!(reason = %rejection, "Safety gate rejected execution");
                return Self::aborted_summary(plan, options, AbortReason::GateRejected(rejection));
            }
        }

        info!(
            resources = plan.len(),
            dry_run = options.dry_run,
            "Executing deletion plan"
        );

        let mut outcomes: Vec<(ResourceKey, ItemOutcome)> = Vec::with_capacity(plan.len());
        let mut aborted = None;

        for (index, key) in plan.ordered.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(completed = index, remaining = plan.len() - index, "Execution cancelled");
                aborted = Some(AbortReason::Cancelled);
                outcomes.extend(
                    plan.ordered[index..]
                        .iter()
                        .map(|k| (k.clone(), ItemOutcome::NotAttempted)),
                );
                break;
            }

            let outcome = self.delete_one(key, catalog, options).await;
            outcomes.push((key.clone(), outcome));
        }

        let final_state = if aborted.is_some() {
            EngineState::Aborted
        } else {
            EngineState::Done
        };

        let summary = ExecutionSummary {
            dry_run: options.dry_run,
            final_state,
            aborted,
            outcomes,
        };
        info!(
            attempted = summary.attempted(),
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Execution finished"
        );
        summary
    }

    async fn gate_check(&self) -> Result<(), SafetyGateRejection> {
        let account = self.gate.verify_profile().await?;

        let prompt = if self.gate.is_environment_protected(&account) {
            format!(
                "Account {} ({} environment) is NOT on the safe list. \
                 Deleting resources here may be destructive.",
                account.account_id, account.environment
            )
        } else {
            format!("About to delete resources in account {}.", account.account_id)
        };

        if !self.gate.confirm(&prompt) {
            return Err(SafetyGateRejection::Declined);
        }
        Ok(())
    }

    async fn delete_one(
        &self,
        key: &ResourceKey,
        catalog: &ResourceCatalog,
        options: &ExecuteOptions,
    ) -> ItemOutcome {
        if options.dry_run {
            debug!(key = %key, "[dry run] would delete");
            return ItemOutcome::Simulated;
        }

        let Some(resource) = catalog.get(key) else {
            return ItemOutcome::Failed(DeletionError::new(
                key.clone(),
                DeletionFailure::NotFound,
                "resource missing from catalog",
            ));
        };

        let Some(provider) = self.registry.get(&key.service) else {
            return ItemOutcome::Failed(DeletionError::new(
                key.clone(),
                DeletionFailure::Other,
                format!("no provider registered for service {}", key.service),
            ));
        };

        match provider.delete(resource).await {
            Ok(()) => {
                info!(key = %key, "Deleted");
                ItemOutcome::Succeeded
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Deletion failed, continuing");
                ItemOutcome::Failed(e)
            }
        }
    }

    fn aborted_summary(
        plan: &DeletionPlan,
        options: &ExecuteOptions,
        reason: AbortReason,
    ) -> ExecutionSummary {
        ExecutionSummary {
            dry_run: options.dry_run,
            final_state: EngineState::Aborted,
            aborted: Some(reason),
            outcomes: plan
                .ordered
                .iter()
                .map(|k| (k.clone(), ItemOutcome::NotAttempted))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyGraph;
    use crate::model::{ResourceCatalog, Service};
    use crate::plan;
    use crate::testing::{key, resource, MockProvider, StaticGate};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn fixture() -> (ResourceCatalog, DeletionPlan) {
        let catalog = ResourceCatalog::from_discovery(
            vec![
                resource(Service::Ec2, "us-east-1", "i-1", &["vpc-1"]),
                resource(Service::Ec2, "us-east-1", "v-1", &["i-1"]),
            ],
            Vec::new(),
        );
        let graph = DependencyGraph::build(&catalog);
        let selection: BTreeSet<_> = catalog.keys().cloned().collect();
        let plan = plan::plan(&catalog, &graph, &selection).unwrap();
        (catalog, plan)
    }

    fn registry_with(provider: Arc<MockProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(provider);
        registry
    }

    #[tokio::test]
    async fn dry_run_simulates_everything_and_calls_no_provider() {
        let (catalog, plan) = fixture();
        let provider = Arc::new(MockProvider::new(Service::Ec2));
        let registry = registry_with(provider.clone());
        let gate = StaticGate::approving();

        let engine = ExecutionEngine::new(&registry, &gate);
        let summary = engine
            .execute(
                &plan,
                &catalog,
                &ExecuteOptions { dry_run: true },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.final_state, EngineState::Done);
        assert_eq!(summary.attempted(), 2);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 0);
        assert!(provider.delete_calls().is_empty());
        assert_eq!(gate.confirm_count(), 0, "dry run never consults the gate");
    }

    #[tokio::test]
    async fn real_run_deletes_in_plan_order() {
        let (catalog, plan) = fixture();
        let provider = Arc::new(MockProvider::new(Service::Ec2));
        let registry = registry_with(provider.clone());
        let gate = StaticGate::approving();

        let engine = ExecutionEngine::new(&registry, &gate);
        let summary = engine
            .execute(
                &plan,
                &catalog,
                &ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(
            provider.delete_calls(),
            vec!["v-1".to_string(), "i-1".to_string()],
            "volume deleted before the instance it depends on"
        );
    }

    #[tokio::test]
    async fn failed_deletion_does_not_stop_the_batch() {
        let (catalog, plan) = fixture();
        let provider = Arc::new(MockProvider::new(Service::Ec2).failing_delete("v-1"));
        let registry = registry_with(provider.clone());
        let gate = StaticGate::approving();

        let engine = ExecutionEngine::new(&registry, &gate);
        let summary = engine
            .execute(
                &plan,
                &catalog,
                &ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.final_state, EngineState::Done);
        assert_eq!(summary.attempted(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.succeeded(), 1);
        // i-1 still attempted after v-1 failed.
        assert_eq!(
            provider.delete_calls(),
            vec!["v-1".to_string(), "i-1".to_string()]
        );
        let (failed_key, _) = summary.failures().next().unwrap();
        assert_eq!(failed_key, &key(Service::Ec2, "us-east-1", "v-1"));
    }

    #[tokio::test]
    async fn gate_rejection_aborts_with_nothing_attempted() {
        let (catalog, plan) = fixture();
        let provider = Arc::new(MockProvider::new(Service::Ec2));
        let registry = registry_with(provider.clone());
        let gate = StaticGate::rejecting();

        let engine = ExecutionEngine::new(&registry, &gate);
        let summary = engine
            .execute(
                &plan,
                &catalog,
                &ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.final_state, EngineState::Aborted);
        assert!(matches!(
            summary.aborted,
            Some(AbortReason::GateRejected(SafetyGateRejection::ProtectedAccount { .. }))
        ));
        assert_eq!(summary.attempted(), 0);
        assert_eq!(summary.not_attempted(), 2);
        assert!(provider.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn declined_confirmation_aborts() {
        let (catalog, plan) = fixture();
        let provider = Arc::new(MockProvider::new(Service::Ec2));
        let registry = registry_with(provider.clone());
        let gate = StaticGate::declining();

        let engine = ExecutionEngine::new(&registry, &gate);
        let summary = engine
            .execute(
                &plan,
                &catalog,
                &ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            summary.aborted,
            Some(AbortReason::GateRejected(SafetyGateRejection::Declined))
        ));
        assert!(provider.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn cancellation_before_start_attempts_nothing() {
        let (catalog, plan) = fixture();
        let provider = Arc::new(MockProvider::new(Service::Ec2));
        let registry = registry_with(provider.clone());
        let gate = StaticGate::approving();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let engine = ExecutionEngine::new(&registry, &gate);
        let summary = engine
            .execute(&plan, &catalog, &ExecuteOptions::default(), &cancel)
            .await;

        assert_eq!(summary.final_state, EngineState::Aborted);
        assert!(matches!(summary.aborted, Some(AbortReason::Cancelled)));
        assert_eq!(summary.not_attempted(), 2);
        assert!(provider.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_batch_keeps_completed_outcomes() {
        let (catalog, plan) = fixture();
        let cancel = CancellationToken::new();
        // The plan orders v-1 first; cancelling during its deletion must
        // still record it as succeeded and skip the rest.
        let provider =
            Arc::new(MockProvider::new(Service::Ec2).cancelling_on_delete("v-1", cancel.clone()));
        let registry = registry_with(provider.clone());
        let gate = StaticGate::approving();

        let engine = ExecutionEngine::new(&registry, &gate);
        let summary = engine
            .execute(&plan, &catalog, &ExecuteOptions::default(), &cancel)
            .await;

        assert_eq!(summary.final_state, EngineState::Aborted);
        assert!(matches!(summary.aborted, Some(AbortReason::Cancelled)));
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.not_attempted(), 1);
        let (first_key, first_outcome) = &summary.outcomes[0];
        assert_eq!(first_key, &key(Service::Ec2, "us-east-1", "v-1"));
        assert!(matches!(first_outcome, ItemOutcome::Succeeded));
        assert_eq!(provider.delete_calls(), vec!["v-1".to_string()]);
    }

    #[tokio::test]
    async fn missing_provider_records_a_failure_and_continues() {
        let (catalog, plan) = fixture();
        // Registry without the EC2 provider.
        let registry = ProviderRegistry::new();
        let gate = StaticGate::approving();

        let engine = ExecutionEngine::new(&registry, &gate);
        let summary = engine
            .execute(
                &plan,
                &catalog,
                &ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.final_state, EngineState::Done);
        assert_eq!(summary.failed(), 2);
    }
}
