//! Core resource model: services, resource keys, resources, and the catalog
//! produced by a discovery pass.

use crate::error::DiscoveryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Region string used for services that are not region-scoped (e.g. S3).
pub const GLOBAL_REGION: &str = "global";

/// AWS service families known to the cleanup tool.
///
/// The set is open: services without a registered provider round-trip
/// through `Other` so a catalog can carry resources the tool cannot
/// itself discover or delete.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Service {
    Ec2,
    S3,
    Rds,
    Lambda,
    Elb,
    CloudWatch,
    Other(String),
}

impl Service {
    pub fn as_str(&self) -> &str {
        match self {
            Service::Ec2 => "ec2",
            Service::S3 => "s3",
            Service::Rds => "rds",
            Service::Lambda => "lambda",
            Service::Elb => "elb",
            Service::CloudWatch => "cloudwatch",
            Service::Other(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ec2" => Service::Ec2,
            "s3" => Service::S3,
            "rds" => Service::Rds,
            "lambda" => Service::Lambda,
            "elb" => Service::Elb,
            "cloudwatch" => Service::CloudWatch,
            other => Service::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Service> for String {
    fn from(s: Service) -> String {
        s.as_str().to_string()
    }
}

impl From<String> for Service {
    fn from(s: String) -> Service {
        Service::parse(&s)
    }
}

/// Composite key identifying one resource: (service, region, id).
///
/// Provider-assigned ids are unique within (service, region). Keys are
/// ordered so BTree collections iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub service: Service,
    pub region: String,
    pub id: String,
}

impl ResourceKey {
    pub fn new(service: Service, region: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            service,
            region: region.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.service, self.region, self.id)
    }
}

/// One discovered AWS resource and its locally-known relationships.
///
/// `depends_on` holds *candidate* identifier strings taken from the
/// resource's own metadata (a VPC id on an instance, an instance id on a
/// volume). Candidates may reference resources outside the catalog; the
/// dependency graph drops those silently. The inverse relation
/// (dependents) is always derived by the graph and never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub key: ResourceKey,
    /// Sub-type within the service, e.g. "instance", "volume", "bucket".
    pub kind: String,
    /// Human label, may be empty.
    pub name: String,
    /// Provider-reported lifecycle status, informational only.
    pub status: String,
    /// Provider-specific fields, opaque to the graph.
    pub raw_metadata: BTreeMap<String, String>,
    /// Candidate identifiers of resources this one requires to exist.
    pub depends_on: BTreeSet<String>,
}

impl Resource {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.key.id
        } else {
            &self.name
        }
    }
}

/// The complete result of one discovery pass.
///
/// Created fresh per run and immutable once published: the dependency
/// graph, planner, and engine all read the same snapshot. Iteration over
/// `resources()` follows key order, not discovery order; callers that
/// care about discovery order use `in_discovery_order()`.
#[derive(Debug)]
pub struct ResourceCatalog {
    resources: BTreeMap<ResourceKey, Resource>,
    discovery_order: Vec<ResourceKey>,
    failures: Vec<DiscoveryError>,
    discovered_at: DateTime<Utc>,
}

impl ResourceCatalog {
    /// Assemble a catalog from discovery results.
    ///
    /// Duplicate keys keep the first occurrence; later duplicates are
    /// logged and dropped so the catalog stays internally consistent.
    pub fn from_discovery(resources: Vec<Resource>, failures: Vec<DiscoveryError>) -> Self {
        let mut map = BTreeMap::new();
        let mut order = Vec::with_capacity(resources.len());

        for resource in resources {
            let key = resource.key.clone();
            if map.contains_key(&key) {
                debug!(key = %key, "Duplicate resource key in discovery results, keeping first");
                continue;
            }
            map.insert(key.clone(), resource);
            order.push(key);
        }

        Self {
            resources: map,
            discovery_order: order,
            failures,
            discovered_at: Utc::now(),
        }
    }

    /// When this snapshot was assembled.
    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.resources.get(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.resources.keys()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Resources in the order providers reported them.
    pub fn in_discovery_order(&self) -> impl Iterator<Item = &Resource> {
        self.discovery_order.iter().filter_map(|k| self.resources.get(k))
    }

    pub fn by_service<'a>(&'a self, service: &'a Service) -> impl Iterator<Item = &'a Resource> {
        self.resources.values().filter(move |r| &r.key.service == service)
    }

    pub fn by_region<'a>(&'a self, region: &'a str) -> impl Iterator<Item = &'a Resource> {
        self.resources.values().filter(move |r| r.key.region == region)
    }

    /// Per-(service, region) discovery failures recorded during the pass.
    pub fn failures(&self) -> &[DiscoveryError] {
        &self.failures
    }
}
