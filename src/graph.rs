//! Directed dependency graph over catalog resource keys.
//!
//! Edge `A -> B` means A depends on B: B must outlive A, so A is deleted
//! first. Built once per catalog and read-only afterwards; dependents are
//! derived here at build time and never taken from resource metadata.

use crate::model::{ResourceCatalog, ResourceKey};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// key -> keys it depends on
    dependencies: BTreeMap<ResourceKey, BTreeSet<ResourceKey>>,
    /// key -> keys that depend on it (inverse of `dependencies`)
    dependents: BTreeMap<ResourceKey, BTreeSet<ResourceKey>>,
}

impl DependencyGraph {
    /// Build the graph from a catalog.
    ///
    /// Candidate identifiers in `depends_on` resolve through an id index
    /// over the whole catalog; candidates that match nothing (cross-region,
    /// out-of-scope service, already deleted) are dropped silently.
    pub fn build(catalog: &ResourceCatalog) -> Self {
        // First key in catalog order wins when two resources share an id.
        let mut id_index: BTreeMap<&str, &ResourceKey> = BTreeMap::new();
        for resource in catalog.resources() {
            id_index.entry(resource.key.id.as_str()).or_insert(&resource.key);
        }

        let mut dependencies: BTreeMap<ResourceKey, BTreeSet<ResourceKey>> = BTreeMap::new();
        let mut dependents: BTreeMap<ResourceKey, BTreeSet<ResourceKey>> = BTreeMap::new();

        for resource in catalog.resources() {
            for candidate in &resource.depends_on {
                let Some(target) = id_index.get(candidate.as_str()) else {
                    debug!(
                        key = %resource.key,
                        candidate = %candidate,
                        "Dropping dangling dependency candidate"
                    );
                    continue;
                };
                if **target == resource.key {
                    continue;
                }
                dependencies
                    .entry(resource.key.clone())
                    .or_default()
                    .insert((*target).clone());
                dependents
                    .entry((*target).clone())
                    .or_default()
                    .insert(resource.key.clone());
            }
        }

        Self {
            dependencies,
            dependents,
        }
    }

    /// Keys `key` directly depends on.
    pub fn dependencies_of<'a>(&'a self, key: &ResourceKey) -> impl Iterator<Item = &'a ResourceKey> {
        self.dependencies.get(key).into_iter().flatten()
    }

    /// Keys that directly depend on `key`.
    pub fn dependents_of<'a>(&'a self, key: &ResourceKey) -> impl Iterator<Item = &'a ResourceKey> {
        self.dependents.get(key).into_iter().flatten()
    }

    /// All keys reachable by following dependent edges from `key`.
    ///
    /// Terminates on cyclic graphs via the visited set; `key` itself is
    /// excluded unless it sits on a cycle back to itself.
    pub fn transitive_dependents(&self, key: &ResourceKey) -> BTreeSet<ResourceKey> {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<&ResourceKey> = self.dependents_of(key).collect();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            queue.extend(self.dependents_of(current));
        }

        visited
    }

    /// Number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceCatalog, Service};
    use crate::testing::{key, resource};

    fn catalog(resources: Vec<crate::model::Resource>) -> ResourceCatalog {
        ResourceCatalog::from_discovery(resources, Vec::new())
    }

    #[test]
    fn edges_resolve_and_dangling_candidates_drop() {
        // i1 depends on vpc1 (absent) and sub1 (present); v1 depends on i1.
        let c = catalog(vec![
            resource(Service::Ec2, "us-east-1", "i-1", &["vpc-1", "subnet-1"]),
            resource(Service::Ec2, "us-east-1", "subnet-1", &[]),
            resource(Service::Ec2, "us-east-1", "v-1", &["i-1"]),
        ]);
        let graph = DependencyGraph::build(&c);

        assert_eq!(graph.edge_count(), 2);

        let i1 = key(Service::Ec2, "us-east-1", "i-1");
        let deps: Vec<_> = graph.dependencies_of(&i1).collect();
        assert_eq!(deps, vec![&key(Service::Ec2, "us-east-1", "subnet-1")]);
    }

    #[test]
    fn dependents_are_the_exact_inverse_of_dependencies() {
        let c = catalog(vec![
            resource(Service::Ec2, "us-east-1", "vpc-1", &[]),
            resource(Service::Ec2, "us-east-1", "i-1", &["vpc-1"]),
            resource(Service::Ec2, "us-east-1", "i-2", &["vpc-1"]),
            resource(Service::Ec2, "us-east-1", "v-1", &["i-1"]),
        ]);
        let graph = DependencyGraph::build(&c);

        // Symmetry invariant: j in dependents_of(k) iff k in dependencies_of(j).
        for k in c.keys() {
            for j in graph.dependents_of(k) {
                assert!(
                    graph.dependencies_of(j).any(|d| d == k),
                    "{j} listed as dependent of {k} but lacks the forward edge"
                );
            }
            for d in graph.dependencies_of(k) {
                assert!(
                    graph.dependents_of(d).any(|j| j == k),
                    "{k} depends on {d} but is missing from its dependents"
                );
            }
        }
    }

    #[test]
    fn transitive_dependents_follow_chains() {
        let c = catalog(vec![
            resource(Service::Ec2, "us-east-1", "vpc-1", &[]),
            resource(Service::Ec2, "us-east-1", "i-1", &["vpc-1"]),
            resource(Service::Ec2, "us-east-1", "v-1", &["i-1"]),
        ]);
        let graph = DependencyGraph::build(&c);

        let reached = graph.transitive_dependents(&key(Service::Ec2, "us-east-1", "vpc-1"));
        assert!(reached.contains(&key(Service::Ec2, "us-east-1", "i-1")));
        assert!(reached.contains(&key(Service::Ec2, "us-east-1", "v-1")));
        assert_eq!(reached.len(), 2);
    }

    #[test]
    fn transitive_dependents_terminate_on_cycles() {
        let c = catalog(vec![
            resource(Service::Ec2, "us-east-1", "x-1", &["y-1"]),
            resource(Service::Ec2, "us-east-1", "y-1", &["x-1"]),
        ]);
        let graph = DependencyGraph::build(&c);

        let reached = graph.transitive_dependents(&key(Service::Ec2, "us-east-1", "x-1"));
        // y depends on x, and x depends on y, so x reaches both via the cycle.
        assert!(reached.contains(&key(Service::Ec2, "us-east-1", "y-1")));
        assert!(reached.contains(&key(Service::Ec2, "us-east-1", "x-1")));
    }

    #[test]
    fn id_collisions_resolve_to_the_first_key() {
        // Same bare id under two services; ec2 sorts before s3.
        let c = catalog(vec![
            resource(Service::Ec2, "us-east-1", "shared-id", &[]),
            resource(Service::S3, "global", "shared-id", &[]),
            resource(Service::Ec2, "us-east-1", "i-1", &["shared-id"]),
        ]);
        let graph = DependencyGraph::build(&c);

        let i1 = key(Service::Ec2, "us-east-1", "i-1");
        let deps: Vec<_> = graph.dependencies_of(&i1).collect();
        assert_eq!(deps, vec![&key(Service::Ec2, "us-east-1", "shared-id")]);
    }

    #[test]
    fn self_references_are_ignored() {
        let c = catalog(vec![resource(Service::Ec2, "us-east-1", "i-1", &["i-1"])]);
        let graph = DependencyGraph::build(&c);
        assert_eq!(graph.edge_count(), 0);
    }
}
