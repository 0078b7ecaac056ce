//! Error taxonomy for discovery, planning, and execution.
//!
//! Errors scoped to one unit of work (one region's discovery, one
//! resource's deletion) are recorded and the run continues; only an
//! invalid plan (cycle) or a safety-gate rejection aborts a whole step.
//! AWS SDK failures are classified by error code rather than by string
//! matching on the Debug format.

use crate::model::{ResourceKey, Service};
use thiserror::Error;

/// A provider could not reach its backend for one (service, region) pair.
///
/// Non-fatal to the discovery run; the coordinator records it on the
/// catalog and keeps going.
#[derive(Debug, Error)]
#[error("discovery failed for {service} in {region}: {cause}")]
pub struct DiscoveryError {
    pub service: Service,
    pub region: String,
    pub cause: anyhow::Error,
}

impl DiscoveryError {
    pub fn new(service: Service, region: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            service,
            region: region.into(),
            cause,
        }
    }
}

/// Why a single deletion was rejected by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionFailure {
    /// Resource no longer exists.
    NotFound,
    /// Caller lacks permission for the delete call.
    PermissionDenied,
    /// Resource still has live dependents on the provider side.
    InUse,
    /// Rate limit hit.
    Throttled,
    /// Anything else the backend reported.
    Other,
}

impl DeletionFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            DeletionFailure::NotFound => "not found",
            DeletionFailure::PermissionDenied => "permission denied",
            DeletionFailure::InUse => "in use",
            DeletionFailure::Throttled => "throttled",
            DeletionFailure::Other => "error",
        }
    }
}

/// One resource's deletion failed.
///
/// Non-fatal to the batch: the engine records it and moves to the next
/// resource. A failed call is assumed to have had no side effects.
#[derive(Debug, Error)]
#[error("failed to delete {key} ({}): {message}", kind.as_str())]
pub struct DeletionError {
    pub key: ResourceKey,
    pub kind: DeletionFailure,
    pub message: String,
}

impl DeletionError {
    pub fn new(key: ResourceKey, kind: DeletionFailure, message: impl Into<String>) -> Self {
        Self {
            key,
            kind,
            message: message.into(),
        }
    }

    /// Build a `DeletionError` from an AWS error code and message.
    pub fn classified(key: ResourceKey, code: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(key, classify_deletion_failure(code), message)
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidVolume.NotFound",
    "InvalidGroup.NotFound",
    "NoSuchBucket",
    "NoSuchEntity",
    "DBInstanceNotFound",
    "LoadBalancerNotFound",
    "TargetGroupNotFound",
    "ResourceNotFound",
    "ResourceNotFoundException",
];

/// Known AWS error codes for permission failures
const PERMISSION_CODES: &[&str] = &["UnauthorizedOperation", "AccessDenied", "AccessDeniedException"];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Known AWS error codes for dependency violations (resource still in use)
const IN_USE_CODES: &[&str] = &[
    "DependencyViolation",
    "VolumeInUse",
    "BucketNotEmpty",
    "InvalidDBInstanceState",
    "ResourceInUse",
];

/// Classify an AWS SDK error code into a deletion failure category.
pub fn classify_deletion_failure(code: Option<&str>) -> DeletionFailure {
    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => DeletionFailure::NotFound,
        Some(c) if PERMISSION_CODES.contains(&c) => DeletionFailure::PermissionDenied,
        Some(c) if THROTTLING_CODES.contains(&c) => DeletionFailure::Throttled,
        Some(c) if IN_USE_CODES.contains(&c) => DeletionFailure::InUse,
        _ => DeletionFailure::Other,
    }
}

/// The selected resources contain a dependency cycle.
///
/// Fatal to planning for that selection only; the operator must adjust
/// the selection. No partial plan is produced.
#[derive(Debug, Error)]
#[error("cyclic dependency among selected resources: {}", keys.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", "))]
pub struct CyclicDependencyError {
    /// Keys that could not be ordered, sorted for determinism.
    pub keys: Vec<ResourceKey>,
}

/// The safety gate refused to let an execution attempt proceed.
///
/// Fatal to that attempt, not to the session: nothing is deleted.
#[derive(Debug, Clone, Error)]
pub enum SafetyGateRejection {
    #[error("account {account_id} is on the protected list")]
    ProtectedAccount { account_id: String },

    #[error("could not verify AWS identity: {message}")]
    VerificationFailed { message: String },

    #[error("operator declined the confirmation prompt")]
    Declined,
}

/// The session refused an operation because an execution holds the catalog.
#[derive(Debug, Error)]
#[error("an execution is in progress; the catalog cannot be {operation}")]
pub struct SessionBusy {
    pub operation: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Service;

    #[test]
    fn not_found_codes_classify() {
        for code in NOT_FOUND_CODES {
            assert_eq!(
                classify_deletion_failure(Some(code)),
                DeletionFailure::NotFound,
                "expected NotFound for {code}"
            );
        }
    }

    #[test]
    fn permission_codes_classify() {
        for code in PERMISSION_CODES {
            assert_eq!(
                classify_deletion_failure(Some(code)),
                DeletionFailure::PermissionDenied
            );
        }
    }

    #[test]
    fn in_use_and_throttling_codes_classify() {
        for code in IN_USE_CODES {
            assert_eq!(classify_deletion_failure(Some(code)), DeletionFailure::InUse);
        }
        for code in THROTTLING_CODES {
            assert_eq!(
                classify_deletion_failure(Some(code)),
                DeletionFailure::Throttled
            );
        }
    }

    #[test]
    fn unknown_and_missing_codes_classify_as_other() {
        assert_eq!(
            classify_deletion_failure(Some("SomeNewError")),
            DeletionFailure::Other
        );
        assert_eq!(classify_deletion_failure(None), DeletionFailure::Other);
    }

    #[test]
    fn cyclic_error_names_the_keys() {
        let err = CyclicDependencyError {
            keys: vec![
                ResourceKey::new(Service::Ec2, "us-east-1", "i-1"),
                ResourceKey::new(Service::Ec2, "us-east-1", "i-2"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("ec2:us-east-1:i-1"));
        assert!(msg.contains("ec2:us-east-1:i-2"));
    }
}
