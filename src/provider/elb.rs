//! Elastic Load Balancing (v2) discovery and deletion: load balancers and
//! target groups. Both are identified by ARN.

use super::{AwsContext, ServiceProvider};
use crate::error::{DeletionError, DeletionFailure, DiscoveryError};
use crate::model::{Resource, ResourceKey, Service};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_elasticloadbalancingv2::error::{ProvideErrorMetadata, SdkError};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const KIND_LOAD_BALANCER: &str = "load-balancer";
pub const KIND_TARGET_GROUP: &str = "target-group";

pub struct ElbProvider {
    ctx: AwsContext,
}

impl ElbProvider {
    pub fn new(ctx: AwsContext) -> Self {
        Self { ctx }
    }

    async fn discover_load_balancers(&self, region: &str) -> Result<Vec<Resource>> {
        let client = self.ctx.elb_client(region);
        let response = client
            .describe_load_balancers()
            .send()
            .await
            .context("describing load balancers")?;

        let mut resources = Vec::new();
        for lb in response.load_balancers() {
            let Some(arn) = lb.load_balancer_arn() else {
                continue;
            };

            let mut depends_on = BTreeSet::new();
            let mut metadata = BTreeMap::new();
            if let Some(vpc_id) = lb.vpc_id() {
                depends_on.insert(vpc_id.to_string());
                metadata.insert("vpc_id".to_string(), vpc_id.to_string());
            }
            if let Some(kind) = lb.r#type() {
                metadata.insert("lb_type".to_string(), kind.as_str().to_string());
            }

            resources.push(Resource {
                key: ResourceKey::new(Service::Elb, region, arn),
                kind: KIND_LOAD_BALANCER.to_string(),
                name: lb.load_balancer_name().unwrap_or_default().to_string(),
                status: lb
                    .state()
                    .and_then(|s| s.code())
                    .map(|c| c.as_str().to_string())
                    .unwrap_or_default(),
                raw_metadata: metadata,
                depends_on,
            });
        }

        debug!(region = %region, count = resources.len(), "Found load balancers");
        Ok(resources)
    }

    async fn discover_target_groups(&self, region: &str) -> Result<Vec<Resource>> {
        let client = self.ctx.elb_client(region);
        let response = client
            .describe_target_groups()
            .send()
            .await
            .context("describing target groups")?;

        let mut resources = Vec::new();
        for tg in response.target_groups() {
            let Some(arn) = tg.target_group_arn() else {
                continue;
            };

            let mut depends_on = BTreeSet::new();
            let mut metadata = BTreeMap::new();
            if let Some(vpc_id) = tg.vpc_id() {
                depends_on.insert(vpc_id.to_string());
                metadata.insert("vpc_id".to_string(), vpc_id.to_string());
            }
            metadata.insert(
                "load_balancer_arns".to_string(),
                tg.load_balancer_arns().join(","),
            );

            resources.push(Resource {
                key: ResourceKey::new(Service::Elb, region, arn),
                kind: KIND_TARGET_GROUP.to_string(),
                name: tg.target_group_name().unwrap_or_default().to_string(),
                status: String::new(),
                raw_metadata: metadata,
                depends_on,
            });
        }

        debug!(region = %region, count = resources.len(), "Found target groups");
        Ok(resources)
    }
}

#[async_trait]
impl ServiceProvider for ElbProvider {
    fn service(&self) -> Service {
        Service::Elb
    }

    async fn discover(&self, region: &str) -> Result<Vec<Resource>, DiscoveryError> {
        let mut resources = Vec::new();
        let found = async {
            resources.extend(self.discover_load_balancers(region).await?);
            resources.extend(self.discover_target_groups(region).await?);
            Ok::<_, anyhow::Error>(())
        }
        .await;

        match found {
            Ok(()) => {
                link_load_balancers(&mut resources);
                Ok(resources)
            }
            Err(cause) => Err(DiscoveryError::new(Service::Elb, region, cause)),
        }
    }

    async fn delete(&self, resource: &Resource) -> Result<(), DeletionError> {
        let client = self.ctx.elb_client(&resource.key.region);
        let arn = resource.key.id.as_str();

        match resource.kind.as_str() {
            KIND_LOAD_BALANCER => client
                .delete_load_balancer()
                .load_balancer_arn(arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| deletion_error(&resource.key, e)),
            KIND_TARGET_GROUP => client
                .delete_target_group()
                .target_group_arn(arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| deletion_error(&resource.key, e)),
            other => Err(DeletionError::new(
                resource.key.clone(),
                DeletionFailure::Other,
                format!("unsupported ELB resource kind: {other}"),
            )),
        }
    }
}

/// Listeners on a load balancer reference target groups, so a target
/// group can only be deleted once the load balancers using it are gone.
/// The API reports the association on the target group side; flip it so
/// the load balancer is the one ordered first.
fn link_load_balancers(resources: &mut [Resource]) {
    let associations: Vec<(String, Vec<String>)> = resources
        .iter()
        .filter(|r| r.kind == KIND_TARGET_GROUP)
        .filter_map(|tg| {
            let arns = tg.raw_metadata.get("load_balancer_arns")?;
            if arns.is_empty() {
                return None;
            }
            Some((
                tg.key.id.clone(),
                arns.split(',').map(str::to_string).collect(),
            ))
        })
        .collect();

    for (tg_arn, lb_arns) in associations {
        for resource in resources.iter_mut() {
            if resource.kind == KIND_LOAD_BALANCER && lb_arns.contains(&resource.key.id) {
                resource.depends_on.insert(tg_arn.clone());
            }
        }
    }
}

fn deletion_error<E>(key: &ResourceKey, err: SdkError<E>) -> DeletionError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{err:?}"));
    DeletionError::classified(key.clone(), code.as_deref(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::resource;

    #[test]
    fn load_balancer_ordered_before_its_target_groups() {
        let mut lb = resource(Service::Elb, "us-east-1", "arn:lb-1", &[]);
        lb.kind = KIND_LOAD_BALANCER.to_string();
        let mut tg = resource(Service::Elb, "us-east-1", "arn:tg-1", &[]);
        tg.kind = KIND_TARGET_GROUP.to_string();
        tg.raw_metadata
            .insert("load_balancer_arns".to_string(), "arn:lb-1".to_string());
        let mut detached = resource(Service::Elb, "us-east-1", "arn:tg-2", &[]);
        detached.kind = KIND_TARGET_GROUP.to_string();
        detached
            .raw_metadata
            .insert("load_balancer_arns".to_string(), String::new());

        let mut resources = vec![lb, tg, detached];
        link_load_balancers(&mut resources);

        assert!(resources[0].depends_on.contains("arn:tg-1"));
        assert!(!resources[0].depends_on.contains("arn:tg-2"));
        assert!(resources[1].depends_on.is_empty());
    }
}
