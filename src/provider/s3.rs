//! S3 bucket discovery and deletion. Buckets are global: listed once per
//! discovery pass under the `global` pseudo-region.

use super::{AwsContext, ServiceProvider};
use crate::error::{DeletionError, DiscoveryError};
use crate::model::{Resource, ResourceKey, Service, GLOBAL_REGION};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const KIND_BUCKET: &str = "bucket";

pub struct S3Provider {
    ctx: AwsContext,
}

impl S3Provider {
    pub fn new(ctx: AwsContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ServiceProvider for S3Provider {
    fn service(&self) -> Service {
        Service::S3
    }

    fn is_global(&self) -> bool {
        true
    }

    async fn discover(&self, region: &str) -> Result<Vec<Resource>, DiscoveryError> {
        let client = self.ctx.s3_client();
        let response = client
            .list_buckets()
            .send()
            .await
            .context("listing S3 buckets")
            .map_err(|cause| DiscoveryError::new(Service::S3, region, cause))?;

        let mut resources = Vec::new();
        for bucket in response.buckets() {
            let Some(name) = bucket.name() else {
                continue;
            };
            let mut metadata = BTreeMap::new();
            if let Some(created) = bucket.creation_date() {
                metadata.insert("creation_date".to_string(), created.to_string());
            }

            resources.push(Resource {
                key: ResourceKey::new(Service::S3, GLOBAL_REGION, name),
                kind: KIND_BUCKET.to_string(),
                name: name.to_string(),
                status: "available".to_string(),
                raw_metadata: metadata,
                depends_on: BTreeSet::new(),
            });
        }

        debug!(count = resources.len(), "Found S3 buckets");
        Ok(resources)
    }

    async fn delete(&self, resource: &Resource) -> Result<(), DeletionError> {
        delete_bucket_with(&self.ctx.s3_client(), &resource.key).await
    }
}

/// Empty the bucket, then delete it. AWS rejects delete-bucket with
/// `BucketNotEmpty` while any object remains.
async fn delete_bucket_with(
    client: &aws_sdk_s3::Client,
    key: &ResourceKey,
) -> Result<(), DeletionError> {
    let bucket = key.id.as_str();

    let mut continuation_token = None;
    loop {
        let mut request = client.list_objects_v2().bucket(bucket);
        if let Some(token) = &continuation_token {
            request = request.continuation_token(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| deletion_error(key, e))?;

        for object in response.contents() {
            if let Some(object_key) = object.key() {
                debug!(bucket = %bucket, key = %object_key, "Deleting object");
                client
                    .delete_object()
                    .bucket(bucket)
                    .key(object_key)
                    .send()
                    .await
                    .map_err(|e| deletion_error(key, e))?;
            }
        }

        if response.is_truncated() == Some(true) {
            continuation_token = response.next_continuation_token().map(str::to_string);
        } else {
            break;
        }
    }

    client
        .delete_bucket()
        .bucket(bucket)
        .send()
        .await
        .map(|_| ())
        .map_err(|e| deletion_error(key, e))
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
