//! Settings for a cleanup session: regions to scan and the
//! enabled-services map, with optional persistence under the user's
//! config directory.
//!
//! Configuration is loaded once at session start and passed explicitly;
//! nothing here is global state.

use crate::model::Service;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fallback region list used when neither the config file nor the CLI
/// provides one.
pub const DEFAULT_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-central-1",
    "eu-west-1",
    "eu-west-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ap-south-1",
    "sa-east-1",
    "ca-central-1",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Regions scanned by regional services, in scan order.
    regions: Vec<String>,
    /// Service name -> enabled. Services absent from the map are enabled;
    /// an explicit `false` blacklists the service from discovery.
    services: BTreeMap<String, bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            regions: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
            services: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn set_regions(&mut self, regions: Vec<String>) {
        self.regions = regions;
    }

    pub fn service_enabled(&self, service: &Service) -> bool {
        self.services.get(service.as_str()).copied().unwrap_or(true)
    }

    pub fn set_service_enabled(&mut self, service: Service, enabled: bool) {
        self.services.insert(service.as_str().to_string(), enabled);
    }

    /// Load settings from the default config file, falling back to
    /// defaults when the file does not exist.
    pub fn load_or_default() -> Result<Self> {
        let Some(path) = config_file_path() else {
            return Ok(Self::default());
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing settings from {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("serializing settings")?;
        std::fs::write(path, raw)
            .with_context(|| format!("writing settings to {}", path.display()))?;
        Ok(())
    }
}

/// Path of the settings file under the platform config directory.
pub fn config_file_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "aws-cleanup").map(|dirs| dirs.config_dir().join("config.json"))
}

/// Path of the account safety list file under the platform config directory.
pub fn safety_file_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "aws-cleanup").map(|dirs| dirs.config_dir().join("safety.json"))
}
