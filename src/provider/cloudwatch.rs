//! CloudWatch discovery and deletion: metric alarms and log groups.

use super::{AwsContext, ServiceProvider};
use crate::error::{DeletionError, DeletionFailure, DiscoveryError};
use crate::model::{Resource, ResourceKey, Service};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const KIND_ALARM: &str = "alarm";
pub const KIND_LOG_GROUP: &str = "log-group";

pub struct CloudWatchProvider {
    ctx: AwsContext,
}

impl CloudWatchProvider {
    pub fn new(ctx: AwsContext) -> Self {
        Self { ctx }
    }

    async fn discover_alarms(&self, region: &str) -> Result<Vec<Resource>> {
        let client = self.ctx.cloudwatch_client(region);
        let response = client
            .describe_alarms()
            .send()
            .await
            .context("describing CloudWatch alarms")?;

        let mut resources = Vec::new();
        for alarm in response.metric_alarms() {
            let Some(name) = alarm.alarm_name() else {
                continue;
            };
            let mut metadata = BTreeMap::new();
            if let Some(metric) = alarm.metric_name() {
                metadata.insert("metric_name".to_string(), metric.to_string());
            }

            resources.push(Resource {
                key: ResourceKey::new(Service::CloudWatch, region, name),
                kind: KIND_ALARM.to_string(),
                name: name.to_string(),
                status: alarm
                    .state_value()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
                raw_metadata: metadata,
                depends_on: BTreeSet::new(),
            });
        }

        debug!(region = %region, count = resources.len(), "Found CloudWatch alarms");
        Ok(resources)
    }

    async fn discover_log_groups(&self, region: &str) -> Result<Vec<Resource>> {
        let client = self.ctx.logs_client(region);
        let response = client
            .describe_log_groups()
            .send()
            .await
            .context("describing log groups")?;

        let mut resources = Vec::new();
        for group in response.log_groups() {
            let Some(name) = group.log_group_name() else {
                continue;
            };
            let mut metadata = BTreeMap::new();
            if let Some(bytes) = group.stored_bytes() {
                metadata.insert("stored_bytes".to_string(), bytes.to_string());
            }

            resources.push(Resource {
                key: ResourceKey::new(Service::CloudWatch, region, name),
                kind: KIND_LOG_GROUP.to_string(),
                name: name.to_string(),
                status: String::new(),
                raw_metadata: metadata,
                depends_on: BTreeSet::new(),
            });
        }

        debug!(region = %region, count = resources.len(), "Found log groups");
        Ok(resources)
    }
}

#[async_trait]
impl ServiceProvider for CloudWatchProvider {
    fn service(&self) -> Service {
        Service::CloudWatch
    }

    async fn discover(&self, region: &str) -> Result<Vec<Resource>, DiscoveryError> {
        let mut resources = Vec::new();
        let found = async {
            resources.extend(self.discover_alarms(region).await?);
            resources.extend(self.discover_log_groups(region).await?);
            Ok::<_, anyhow::Error>(())
        }
        .await;

        match found {
            Ok(()) => Ok(resources),
            Err(cause) => Err(DiscoveryError::new(Service::CloudWatch, region, cause)),
        }
    }

    async fn delete(&self, resource: &Resource) -> Result<(), DeletionError> {
        let region = resource.key.region.as_str();
        let id = resource.key.id.as_str();

        match resource.kind.as_str() {
            KIND_ALARM => {
                use aws_sdk_cloudwatch::error::ProvideErrorMetadata;
                self.ctx
                    .cloudwatch_client(region)
                    .delete_alarms()
                    .alarm_names(id)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        let code = e.code().map(str::to_string);
                        let message = e
                            .message()
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("{e:?}"));
                        DeletionError::classified(resource.key.clone(), code.as_deref(), message)
                    })
            }
            KIND_LOG_GROUP => {
                use aws_sdk_cloudwatchlogs::error::ProvideErrorMetadata;
                self.ctx
                    .logs_client(region)
                    .delete_log_group()
                    .log_group_name(id)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        let code = e.code().map(str::to_string);
                        let message = e
                            .message()
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("{e:?}"));
                        DeletionError::classified(resource.key.clone(), code.as_deref(), message)
                    })
            }
            other => Err(DeletionError::new(
                resource.key.clone(),
                DeletionFailure::Other,
                format!("unsupported CloudWatch resource kind: {other}"),
            )),
        }
    }
}
