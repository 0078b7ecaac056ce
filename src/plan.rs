//! Deletion planning: dependents-first ordering over a selection.
//!
//! The planner is pure: it reads the catalog and graph, produces an
//! ordered plan plus warnings, and performs no deletion.

use crate::error::CyclicDependencyError;
use crate::graph::DependencyGraph;
use crate::model::{ResourceCatalog, ResourceKey, Service};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// An ordered deletion plan for one selection.
///
/// `ordered` lists resources dependents-first: for every dependency edge
/// A -> B inside the selection, A appears strictly before B. `warnings`
/// maps a selected resource to the *unselected* resources that
/// transitively depend on it; deleting it would strand them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionPlan {
    pub ordered: Vec<ResourceKey>,
    pub warnings: BTreeMap<ResourceKey, BTreeSet<ResourceKey>>,
}

impl DeletionPlan {
    /// Selected resources that still have live, unselected dependents.
    pub fn blocked(&self) -> impl Iterator<Item = &ResourceKey> {
        self.warnings.keys()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Sort key for deterministic tie-breaking: (service, region, name, id).
type TieBreak = (Service, String, String, String);

fn tie_break(catalog: &ResourceCatalog, key: &ResourceKey) -> TieBreak {
    let name = catalog
        .get(key)
        .map(|r| r.name.clone())
        .unwrap_or_default();
    (
        key.service.clone(),
        key.region.clone(),
        name,
        key.id.clone(),
    )
}

/// Produce a deletion plan for `selection`.
///
/// Performs a reverse topological sort (iterative Kahn's algorithm)
/// restricted to the subgraph induced by the selection: a resource is
/// ready once every selected resource depending on it has already been
/// ordered. Ties break by (service, region, name) ascending so planning
/// is idempotent. A cycle inside the selection fails the whole request
/// with `CyclicDependencyError`; no partial plan is returned.
pub fn plan(
    catalog: &ResourceCatalog,
    graph: &DependencyGraph,
    selection: &BTreeSet<ResourceKey>,
) -> Result<DeletionPlan, CyclicDependencyError> {
    // Remaining selected dependents per selected node. A node with zero
    // remaining dependents is safe to delete next.
    let mut pending: BTreeMap<&ResourceKey, usize> = BTreeMap::new();
    for key in selection {
        let count = graph
            .dependents_of(key)
            .filter(|d| selection.contains(d))
            .count();
        pending.insert(key, count);
    }

    let mut ready: BTreeSet<(TieBreak, &ResourceKey)> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(&key, _)| (tie_break(catalog, key), key))
        .collect();

    let mut ordered = Vec::with_capacity(selection.len());

    while let Some((_, key)) = ready.pop_first() {
        ordered.push(key.clone());
        pending.remove(key);

        // Releasing this node unblocks the selected resources it depends on.
        for dep in graph.dependencies_of(key) {
            if let Some(count) = pending.get_mut(dep) {
                *count -= 1;
                if *count == 0 {
                    ready.insert((tie_break(catalog, dep), dep));
                }
            }
        }
    }

    if ordered.len() < selection.len() {
        let keys: Vec<ResourceKey> = pending.keys().map(|k| (*k).clone()).collect();
        debug!(count = keys.len(), "Selection contains a dependency cycle");
        return Err(CyclicDependencyError { keys });
    }

    // Warnings: unselected transitive dependents of each selected resource.
    let mut warnings = BTreeMap::new();
    for key in selection {
        let unselected: BTreeSet<ResourceKey> = graph
            .transitive_dependents(key)
            .into_iter()
            .filter(|d| !selection.contains(d))
            .collect();
        if !unselected.is_empty() {
            warnings.insert(key.clone(), unselected);
        }
    }

    Ok(DeletionPlan { ordered, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Resource, ResourceCatalog, Service};
    use crate::testing::{key, resource};

    fn setup(resources: Vec<Resource>) -> (ResourceCatalog, DependencyGraph) {
        let catalog = ResourceCatalog::from_discovery(resources, Vec::new());
        let graph = DependencyGraph::build(&catalog);
        (catalog, graph)
    }

    fn select(keys: &[&ResourceKey]) -> BTreeSet<ResourceKey> {
        keys.iter().map(|k| (*k).clone()).collect()
    }

    /// i1 depends on a dangling vpc1, v1 depends on i1.
    fn instance_volume_catalog() -> (ResourceCatalog, DependencyGraph) {
        setup(vec![
            resource(Service::Ec2, "us-east-1", "i-1", &["vpc-1"]),
            resource(Service::Ec2, "us-east-1", "v-1", &["i-1"]),
        ])
    }

    #[test]
    fn volume_ordered_before_its_instance() {
        let (catalog, graph) = instance_volume_catalog();
        let i1 = key(Service::Ec2, "us-east-1", "i-1");
        let v1 = key(Service::Ec2, "us-east-1", "v-1");

        let result = plan(&catalog, &graph, &select(&[&i1, &v1])).unwrap();

        let pos_v1 = result.ordered.iter().position(|k| k == &v1).unwrap();
        let pos_i1 = result.ordered.iter().position(|k| k == &i1).unwrap();
        assert!(pos_v1 < pos_i1, "dependent must be deleted first");
        assert!(result.warnings.is_empty(), "both selected, no warnings");
    }

    #[test]
    fn unselected_dependent_produces_warning() {
        let (catalog, graph) = instance_volume_catalog();
        let i1 = key(Service::Ec2, "us-east-1", "i-1");
        let v1 = key(Service::Ec2, "us-east-1", "v-1");

        let result = plan(&catalog, &graph, &select(&[&i1])).unwrap();

        assert_eq!(result.ordered, vec![i1.clone()]);
        let warned: BTreeSet<ResourceKey> = result.warnings[&i1].clone();
        assert_eq!(warned, select(&[&v1]));
        assert_eq!(result.blocked().collect::<Vec<_>>(), vec![&i1]);
    }

    #[test]
    fn every_selected_edge_is_respected() {
        let (catalog, graph) = setup(vec![
            resource(Service::Ec2, "us-east-1", "vpc-1", &[]),
            resource(Service::Ec2, "us-east-1", "subnet-1", &["vpc-1"]),
            resource(Service::Ec2, "us-east-1", "i-1", &["vpc-1", "subnet-1"]),
            resource(Service::Ec2, "us-east-1", "v-1", &["i-1"]),
            resource(Service::Elb, "us-east-1", "lb-1", &["vpc-1"]),
        ]);
        let selection: BTreeSet<ResourceKey> = catalog.keys().cloned().collect();

        let result = plan(&catalog, &graph, &selection).unwrap();
        assert_eq!(result.ordered.len(), selection.len());

        let position: std::collections::BTreeMap<&ResourceKey, usize> = result
            .ordered
            .iter()
            .enumerate()
            .map(|(i, k)| (k, i))
            .collect();
        for k in &selection {
            for dep in graph.dependencies_of(k) {
                if selection.contains(dep) {
                    assert!(
                        position[k] < position[dep],
                        "{k} must be ordered before its dependency {dep}"
                    );
                }
            }
        }
    }

    #[test]
    fn planning_is_deterministic() {
        let (catalog, graph) = setup(vec![
            resource(Service::S3, crate::model::GLOBAL_REGION, "bucket-b", &[]),
            resource(Service::S3, crate::model::GLOBAL_REGION, "bucket-a", &[]),
            resource(Service::Ec2, "us-east-1", "i-1", &[]),
            resource(Service::Ec2, "eu-west-1", "i-2", &[]),
        ]);
        let selection: BTreeSet<ResourceKey> = catalog.keys().cloned().collect();

        let first = plan(&catalog, &graph, &selection).unwrap();
        let second = plan(&catalog, &graph, &selection).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unrelated_resources_tie_break_by_service_region_name() {
        let (catalog, graph) = setup(vec![
            resource(Service::S3, crate::model::GLOBAL_REGION, "bucket-1", &[]),
            resource(Service::Ec2, "us-east-1", "i-1", &[]),
            resource(Service::Ec2, "eu-west-1", "i-2", &[]),
        ]);
        let selection: BTreeSet<ResourceKey> = catalog.keys().cloned().collect();

        let result = plan(&catalog, &graph, &selection).unwrap();
        assert_eq!(
            result.ordered,
            vec![
                key(Service::Ec2, "eu-west-1", "i-2"),
                key(Service::Ec2, "us-east-1", "i-1"),
                key(Service::S3, crate::model::GLOBAL_REGION, "bucket-1"),
            ]
        );
    }

    #[test]
    fn cycle_fails_with_no_partial_plan() {
        let (catalog, graph) = setup(vec![
            resource(Service::Ec2, "us-east-1", "x-1", &["y-1"]),
            resource(Service::Ec2, "us-east-1", "y-1", &["x-1"]),
        ]);
        let x = key(Service::Ec2, "us-east-1", "x-1");
        let y = key(Service::Ec2, "us-east-1", "y-1");

        let err = plan(&catalog, &graph, &select(&[&x, &y])).unwrap_err();
        let mut implicated = err.keys.clone();
        implicated.sort();
        assert_eq!(implicated, vec![x, y]);
    }

    #[test]
    fn acyclic_nodes_outside_the_cycle_do_not_rescue_it() {
        let (catalog, graph) = setup(vec![
            resource(Service::Ec2, "us-east-1", "x-1", &["y-1"]),
            resource(Service::Ec2, "us-east-1", "y-1", &["x-1"]),
            resource(Service::Ec2, "us-east-1", "i-1", &[]),
        ]);
        let selection: BTreeSet<ResourceKey> = catalog.keys().cloned().collect();

        let err = plan(&catalog, &graph, &selection).unwrap_err();
        assert_eq!(err.keys.len(), 2, "only the cyclic subset is implicated");
    }

    #[test]
    fn empty_selection_plans_empty() {
        let (catalog, graph) = instance_volume_catalog();
        let result = plan(&catalog, &graph, &BTreeSet::new()).unwrap();
        assert!(result.is_empty());
        assert!(result.warnings.is_empty());
    }
}
