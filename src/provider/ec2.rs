//! EC2 discovery and deletion: instances, EBS volumes, security groups.

use super::{AwsContext, ServiceProvider};
use crate::error::{DeletionError, DeletionFailure, DiscoveryError};
use crate::model::{Resource, ResourceKey, Service};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::Tag;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const KIND_INSTANCE: &str = "instance";
pub const KIND_VOLUME: &str = "volume";
pub const KIND_SECURITY_GROUP: &str = "security-group";

pub struct Ec2Provider {
    ctx: AwsContext,
}

impl Ec2Provider {
    pub fn new(ctx: AwsContext) -> Self {
        Self { ctx }
    }

    async fn discover_instances(&self, region: &str) -> Result<Vec<Resource>> {
        let client = self.ctx.ec2_client(region);
        let response = client
            .describe_instances()
            .send()
            .await
            .context("describing EC2 instances")?;

        let mut resources = Vec::new();
        for reservation in response.reservations() {
            for instance in reservation.instances() {
                let Some(instance_id) = instance.instance_id() else {
                    continue;
                };
                let status = instance
                    .state()
                    .and_then(|s| s.name())
                    .map(|n| n.as_str().to_string())
                    .unwrap_or_default();
                if status == "terminated" {
                    continue;
                }

                let mut depends_on = BTreeSet::new();
                let mut metadata = BTreeMap::new();
                if let Some(vpc_id) = instance.vpc_id() {
                    depends_on.insert(vpc_id.to_string());
                    metadata.insert("vpc_id".to_string(), vpc_id.to_string());
                }
                if let Some(subnet_id) = instance.subnet_id() {
                    depends_on.insert(subnet_id.to_string());
                    metadata.insert("subnet_id".to_string(), subnet_id.to_string());
                }
                if let Some(instance_type) = instance.instance_type() {
                    metadata.insert("instance_type".to_string(), instance_type.as_str().to_string());
                }

                resources.push(Resource {
                    key: ResourceKey::new(Service::Ec2, region, instance_id),
                    kind: KIND_INSTANCE.to_string(),
                    name: name_from_tags(instance.tags()),
                    status,
                    raw_metadata: metadata,
                    depends_on,
                });
            }
        }

        debug!(region = %region, count = resources.len(), "Found EC2 instances");
        Ok(resources)
    }

    async fn discover_volumes(&self, region: &str) -> Result<Vec<Resource>> {
        let client = self.ctx.ec2_client(region);
        let response = client
            .describe_volumes()
            .send()
            .await
            .context("describing EBS volumes")?;

        let mut resources = Vec::new();
        for volume in response.volumes() {
            let Some(volume_id) = volume.volume_id() else {
                continue;
            };

            let mut depends_on = BTreeSet::new();
            let mut metadata = BTreeMap::new();
            if let Some(instance_id) = volume.attachments().first().and_then(|a| a.instance_id()) {
                depends_on.insert(instance_id.to_string());
                metadata.insert("instance_id".to_string(), instance_id.to_string());
            }
            if let Some(size) = volume.size() {
                metadata.insert("size_gib".to_string(), size.to_string());
            }
            if let Some(volume_type) = volume.volume_type() {
                metadata.insert("volume_type".to_string(), volume_type.as_str().to_string());
            }

            resources.push(Resource {
                key: ResourceKey::new(Service::Ec2, region, volume_id),
                kind: KIND_VOLUME.to_string(),
                name: name_from_tags(volume.tags()),
                status: volume
                    .state()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
                raw_metadata: metadata,
                depends_on,
            });
        }

        debug!(region = %region, count = resources.len(), "Found EBS volumes");
        Ok(resources)
    }

    async fn discover_security_groups(&self, region: &str) -> Result<Vec<Resource>> {
        let client = self.ctx.ec2_client(region);
        let response = client
            .describe_security_groups()
            .send()
            .await
            .context("describing security groups")?;

        let mut resources = Vec::new();
        for sg in response.security_groups() {
            let Some(group_id) = sg.group_id() else {
                continue;
            };
            // The default group cannot be deleted.
            if sg.group_name() == Some("default") {
                continue;
            }

            let mut depends_on = BTreeSet::new();
            let mut metadata = BTreeMap::new();
            if let Some(vpc_id) = sg.vpc_id() {
                depends_on.insert(vpc_id.to_string());
                metadata.insert("vpc_id".to_string(), vpc_id.to_string());
            }

            resources.push(Resource {
                key: ResourceKey::new(Service::Ec2, region, group_id),
                kind: KIND_SECURITY_GROUP.to_string(),
                name: sg.group_name().unwrap_or_default().to_string(),
                status: String::new(),
                raw_metadata: metadata,
                depends_on,
            });
        }

        debug!(region = %region, count = resources.len(), "Found security groups");
        Ok(resources)
    }
}

#[async_trait]
impl ServiceProvider for Ec2Provider {
    fn service(&self) -> Service {
        Service::Ec2
    }

    async fn discover(&self, region: &str) -> Result<Vec<Resource>, DiscoveryError> {
        let mut resources = Vec::new();
        let found = async {
            resources.extend(self.discover_instances(region).await?);
            resources.extend(self.discover_volumes(region).await?);
            resources.extend(self.discover_security_groups(region).await?);
            Ok::<_, anyhow::Error>(())
        }
        .await;

        match found {
            Ok(()) => Ok(resources),
            Err(cause) => Err(DiscoveryError::new(Service::Ec2, region, cause)),
        }
    }

    async fn delete(&self, resource: &Resource) -> Result<(), DeletionError> {
        let client = self.ctx.ec2_client(&resource.key.region);
        let id = resource.key.id.as_str();

        match resource.kind.as_str() {
            KIND_INSTANCE => client
                .terminate_instances()
                .instance_ids(id)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| deletion_error(&resource.key, e)),
            KIND_VOLUME => client
                .delete_volume()
                .volume_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| deletion_error(&resource.key, e)),
            KIND_SECURITY_GROUP => client
                .delete_security_group()
                .group_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| deletion_error(&resource.key, e)),
            other => Err(DeletionError::new(
                resource.key.clone(),
                DeletionFailure::Other,
                format!("unsupported EC2 resource kind: {other}"),
            )),
        }
    }
}

/// Build a classified `DeletionError` from an EC2 SDK error.
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

/// Extract the Name tag, empty string when absent.
fn name_from_tags(tags: &[Tag]) -> String {
    tags.iter()
        .find(|t| t.key() == Some("Name"))
        .and_then(|t| t.value())
        .unwrap_or_default()
        .to_string()
}
