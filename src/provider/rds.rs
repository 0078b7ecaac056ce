//! RDS database instance discovery and deletion.

use super::{AwsContext, ServiceProvider};
use crate::error::{DeletionError, DeletionFailure, DiscoveryError};
use crate::model::{Resource, ResourceKey, Service};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_rds::error::{ProvideErrorMetadata, SdkError};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const KIND_DB_INSTANCE: &str = "db-instance";

pub struct RdsProvider {
    ctx: AwsContext,
}

impl RdsProvider {
    pub fn new(ctx: AwsContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ServiceProvider for RdsProvider {
    fn service(&self) -> Service {
        Service::Rds
    }

    async fn discover(&self, region: &str) -> Result<Vec<Resource>, DiscoveryError> {
        let client = self.ctx.rds_client(region);
        let response = client
            .describe_db_instances()
            .send()
            .await
            .context("describing RDS instances")
            .map_err(|cause| DiscoveryError::new(Service::Rds, region, cause))?;

        let mut resources = Vec::new();
        for db in response.db_instances() {
            let Some(id) = db.db_instance_identifier() else {
                continue;
            };

            let mut depends_on = BTreeSet::new();
            let mut metadata = BTreeMap::new();
            if let Some(vpc_id) = db.db_subnet_group().and_then(|g| g.vpc_id()) {
                depends_on.insert(vpc_id.to_string());
                metadata.insert("vpc_id".to_string(), vpc_id.to_string());
            }
            if let Some(engine) = db.engine() {
                metadata.insert("engine".to_string(), engine.to_string());
            }
            if let Some(class) = db.db_instance_class() {
                metadata.insert("instance_class".to_string(), class.to_string());
            }

            resources.push(Resource {
                key: ResourceKey::new(Service::Rds, region, id),
                kind: KIND_DB_INSTANCE.to_string(),
                name: db.db_name().unwrap_or(id).to_string(),
                status: db.db_instance_status().unwrap_or_default().to_string(),
                raw_metadata: metadata,
                depends_on,
            });
        }

        debug!(region = %region, count = resources.len(), "Found RDS instances");
        Ok(resources)
    }

    async fn delete(&self, resource: &Resource) -> Result<(), DeletionError> {
        if resource.kind != KIND_DB_INSTANCE {
            return Err(DeletionError::new(
                resource.key.clone(),
                DeletionFailure::Other,
                format!("unsupported RDS resource kind: {}", resource.kind),
            ));
        }

        let client = self.ctx.rds_client(&resource.key.region);
        client
            .delete_db_instance()
            .db_instance_identifier(&resource.key.id)
            .skip_final_snapshot(true)
            .send()
            .await
            .map(|_| ())
            .map_err(|e: SdkError<_>| {
                let code = e.code().map(str::to_string);
                let message = e
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{e:?}"));
                DeletionError::classified(resource.key.clone(), code.as_deref(), message)
            })
    }
}
