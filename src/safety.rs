//! Account safety gate consulted before any real deletion.
//!
//! The gate verifies the caller's identity via STS, refuses accounts on
//! the protected list, treats accounts missing from the safe list as
//! protected environments, and requires a typed confirmation.

use crate::error::SafetyGateRejection;
use crate::provider::AwsContext;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::info;

/// Strongly-typed AWS account ID (12-digit string).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub struct AccountId(pub String);

/// Deployment environment inferred for an account, from the account
/// lists first and ARN keywords second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Environment {
    #[display("safe")]
    Safe,
    #[display("protected")]
    Protected,
    #[display("production")]
    Production,
    #[display("staging")]
    Staging,
    #[display("development")]
    Development,
    #[display("testing")]
    Testing,
    #[display("unknown")]
    Unknown,
}

/// Verified identity of the caller for one session.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub account_id: AccountId,
    pub arn: String,
    pub user_id: String,
    pub profile: Option<String>,
    pub environment: Environment,
}

/// Safe/protected account lists, persisted as JSON in the config dir.
///
/// Protected accounts are hard-refused. Accounts on neither list are
/// treated as protected *environments*: deletion is allowed but only
/// after explicit confirmation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub safe_accounts: BTreeSet<AccountId>,
    pub protected_accounts: BTreeSet<AccountId>,
}

impl SafetyConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading safety config from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing safety config from {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("serializing safety config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("writing safety config to {}", path.display()))?;
        Ok(())
    }

    pub fn is_protected(&self, account: &AccountId) -> bool {
        self.protected_accounts.contains(account)
    }

    pub fn is_safe(&self, account: &AccountId) -> bool {
        self.safe_accounts.contains(account)
    }

    pub fn add_safe(&mut self, account: AccountId) {
        self.safe_accounts.insert(account);
    }

    pub fn add_protected(&mut self, account: AccountId) {
        self.protected_accounts.insert(account);
    }

    pub fn remove_safe(&mut self, account: &AccountId) -> bool {
        self.safe_accounts.remove(account)
    }

    /// Infer the environment for an account. The explicit lists take
    /// precedence; otherwise the caller ARN is scanned for environment
    /// keywords.
    pub fn classify(&self, account: &AccountId, arn: &str) -> Environment {
        let arn = arn.to_ascii_lowercase();
        let mentions = |keywords: &[&str]| keywords.iter().any(|k| arn.contains(k));

        if self.is_protected(account) {
            Environment::Protected
        } else if self.is_safe(account) {
            Environment::Safe
        } else if mentions(&["prod", "production"]) {
            Environment::Production
        } else if mentions(&["stage", "staging"]) {
            Environment::Staging
        } else if mentions(&["dev", "development"]) {
            Environment::Development
        } else if mentions(&["test", "testing"]) {
            Environment::Testing
        } else {
            Environment::Unknown
        }
    }

    pub fn remove_protected(&mut self, account: &AccountId) -> bool {
        self.protected_accounts.remove(account)
    }
}

/// Contract the execution engine consults before real deletions.
#[async_trait]
pub trait SafetyGate: Send + Sync {
    /// Verify the caller's identity; rejects protected accounts.
    async fn verify_profile(&self) -> Result<AccountInfo, SafetyGateRejection>;

    /// Whether the account's environment requires extra caution
    /// (not on the safe list).
    fn is_environment_protected(&self, account: &AccountInfo) -> bool;

    /// Ask the operator for confirmation. Blocks the calling thread.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Production gate: STS identity check, account lists, and a typed
/// "DELETE" confirmation read from stdin.
pub struct AccountGate {
    ctx: AwsContext,
    config: SafetyConfig,
}

impl AccountGate {
    pub fn new(ctx: AwsContext, config: SafetyConfig) -> Self {
        Self { ctx, config }
    }
}

#[async_trait]
impl SafetyGate for AccountGate {
    async fn verify_profile(&self) -> Result<AccountInfo, SafetyGateRejection> {
        let sts = self.ctx.sts_client();
        let identity = sts.get_caller_identity().send().await.map_err(|e| {
            SafetyGateRejection::VerificationFailed {
                message: format!("STS GetCallerIdentity failed: {e}"),
            }
        })?;

        let account_id = identity
            .account()
            .map(|a| AccountId(a.to_string()))
            .ok_or_else(|| SafetyGateRejection::VerificationFailed {
                message: "no account id in STS response".to_string(),
            })?;

        if self.config.is_protected(&account_id) {
            return Err(SafetyGateRejection::ProtectedAccount {
                account_id: account_id.to_string(),
            });
        }

        let arn = identity.arn().unwrap_or_default().to_string();
        let environment = self.config.classify(&account_id, &arn);
        info!(account_id = %account_id, environment = %environment, "AWS account verified");
        Ok(AccountInfo {
            account_id,
            arn,
            user_id: identity.user_id().unwrap_or_default().to_string(),
            profile: self.ctx.profile().map(str::to_string),
            environment,
        })
    }

    fn is_environment_protected(&self, account: &AccountInfo) -> bool {
        account.environment != Environment::Safe
    }

    fn confirm(&self, prompt: &str) -> bool {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "{prompt}\nType DELETE to confirm: ");
        let _ = stderr.flush();

        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        line.trim() == "DELETE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("safety.json");

        let mut config = SafetyConfig::default();
        config.add_safe(AccountId("111111111111".to_string()));
        config.add_protected(AccountId("999999999999".to_string()));
        config.save_to(&path).unwrap();

        let loaded = SafetyConfig::load_from(&path).unwrap();
        assert!(loaded.is_safe(&AccountId("111111111111".to_string())));
        assert!(loaded.is_protected(&AccountId("999999999999".to_string())));
    }

    #[test]
    fn missing_safety_file_loads_empty_lists() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SafetyConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.safe_accounts.is_empty());
        assert!(loaded.protected_accounts.is_empty());
    }

    #[test]
    fn arn_keywords_classify_the_environment() {
        let config = SafetyConfig::default();
        let id = AccountId("123456789012".to_string());

        let cases = [
            ("arn:aws:iam::123456789012:user/prod-deployer", Environment::Production),
            ("arn:aws:iam::123456789012:role/staging-ci", Environment::Staging),
            ("arn:aws:iam::123456789012:user/dev-alice", Environment::Development),
            ("arn:aws:iam::123456789012:role/testing-runner", Environment::Testing),
            ("arn:aws:iam::123456789012:user/alice", Environment::Unknown),
        ];
        for (arn, expected) in cases {
            assert_eq!(config.classify(&id, arn), expected, "arn {arn}");
        }
    }

    #[test]
    fn account_lists_take_precedence_over_arn_keywords() {
        let mut config = SafetyConfig::default();
        let id = AccountId("123456789012".to_string());
        let prod_arn = "arn:aws:iam::123456789012:user/prod-deployer";

        config.add_safe(id.clone());
        assert_eq!(config.classify(&id, prod_arn), Environment::Safe);

        config.add_protected(id.clone());
        assert_eq!(config.classify(&id, prod_arn), Environment::Protected);
    }

    #[test]
    fn list_membership_add_remove() {
        let mut config = SafetyConfig::default();
        let id = AccountId("123456789012".to_string());

        config.add_safe(id.clone());
        assert!(config.is_safe(&id));
        assert!(config.remove_safe(&id));
        assert!(!config.is_safe(&id));
        assert!(!config.remove_safe(&id));
    }
}
