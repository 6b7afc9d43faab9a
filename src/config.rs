//! Configuration Management
//!
//! Loads `osacct.yaml` once per run. Values are overridden by command-line
//! flags in `main.rs` and then validated for the domains that will run.

use crate::openstack::{AuthOptions, EndpointOptions};
use crate::pipeline::Domain;
use crate::record::{RecordLabels, StorageLabels};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "osacct.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("required configuration value `{0}` is not set")]
    Missing(&'static str),
    #[error("unknown storage kind `{0}` in storage.accounted")]
    UnknownStorageKind(String),
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
    #[error("storage.accounted enables no storage kind")]
    NoStorageKinds,
}

/// Records window as configured
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Relative period ending now, e.g. `30days` or `1week 2days`
    pub for_period: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    pub tags: Vec<String>,
    pub ignore_tags: bool,
    pub default_tag: Option<String>,
}

/// Labels of the VM and network domains
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub site_name: String,
    pub cloud_type: String,
    pub cloud_compute_service: Option<String>,
}

impl SiteConfig {
    pub fn labels(&self) -> RecordLabels {
        RecordLabels {
            site_name: self.site_name.clone(),
            cloud_type: self.cloud_type.clone(),
            cloud_compute_service: self.cloud_compute_service.clone().filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub site: String,
    pub accounted: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            site: String::new(),
            accounted: vec!["all".to_string()],
        }
    }
}

/// Storage sub-kinds enabled for collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageKinds {
    pub images: bool,
    pub shares: bool,
    pub volumes: bool,
    pub swift: bool,
}

impl StorageKinds {
    pub fn all() -> Self {
        Self {
            images: true,
            shares: true,
            volumes: true,
            swift: true,
        }
    }

    /// Parse the `accounted` list
    pub fn parse<S: AsRef<str>>(accounted: &[S]) -> Result<Self, ConfigError> {
        let mut kinds = Self::default();
        for kind in accounted {
            match kind.as_ref().trim() {
                "all" => kinds = Self::all(),
                "image" | "images" => kinds.images = true,
                "sharedFileSystem" | "manila" | "share" | "shares" => kinds.shares = true,
                "volume" | "volumes" => kinds.volumes = true,
                "swift" => kinds.swift = true,
                other => return Err(ConfigError::UnknownStorageKind(other.to_string())),
            }
        }
        Ok(kinds)
    }

    pub fn is_empty(&self) -> bool {
        !(self.images || self.shares || self.volumes || self.swift)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    pub site_name: String,
    /// Substring of a flavor name marking it as accelerator-backed
    pub flavor_marker: String,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            site_name: String::new(),
            flavor_marker: "nvidia".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub requests_per_second: u32,
    pub max_in_flight: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            requests_per_second: crate::sink::limiter::DEFAULT_RATE,
            max_in_flight: 64,
        }
    }
}

/// Run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of this client instance, sent as the first frame of every session
    pub identifier: String,
    /// Collector endpoint
    pub endpoint: String,
    pub identity_endpoint: String,
    pub debug: bool,
    pub log_path: Option<PathBuf>,
    pub records: RecordsWindow,
    pub tags: TagConfig,
    pub auth: AuthOptions,
    pub endpoint_options: EndpointOptions,
    pub vm: SiteConfig,
    pub network: SiteConfig,
    pub storage: StorageConfig,
    pub gpu: GpuConfig,
    pub limits: Limits,
}

impl Config {
    /// Locations searched, in order, when no explicit path is given
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("config").join(CONFIG_FILE),
            PathBuf::from("/etc/osacct").join(CONFIG_FILE),
        ];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".osacct").join(CONFIG_FILE));
        }
        paths
    }

    /// Load from `path`, or from the first existing search path.
    /// Without any file the defaults are returned.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let found = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::search_paths().into_iter().find(|p| p.is_file()),
        };

        let Some(path) = found else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Check the values every run needs plus those of the given domains
    pub fn validate(&self, domains: &[Domain]) -> Result<(), ConfigError> {
        require(&self.identifier, "identifier")?;
        require(&self.endpoint, "endpoint")?;
        require(&self.identity_endpoint, "identity_endpoint")?;

        if self.limits.requests_per_second == 0 {
            return Err(ConfigError::Zero("limits.requests_per_second"));
        }
        if self.limits.max_in_flight == 0 {
            return Err(ConfigError::Zero("limits.max_in_flight"));
        }

        for domain in domains {
            match domain {
                Domain::Vm => {
                    require(&self.vm.site_name, "vm.site_name")?;
                    require(&self.vm.cloud_type, "vm.cloud_type")?;
                }
                Domain::Network => {
                    require(&self.network.site_name, "network.site_name")?;
                    require(&self.network.cloud_type, "network.cloud_type")?;
                }
                Domain::Storage => {
                    require(&self.storage.site, "storage.site")?;
                    if self.storage_kinds()?.is_empty() {
                        return Err(ConfigError::NoStorageKinds);
                    }
                }
                Domain::Gpu => {
                    require(&self.gpu.site_name, "gpu.site_name")?;
                    require(&self.gpu.flavor_marker, "gpu.flavor_marker")?;
                }
            }
        }
        Ok(())
    }

    pub fn storage_kinds(&self) -> Result<StorageKinds, ConfigError> {
        StorageKinds::parse(&self.storage.accounted)
    }

    pub fn storage_labels(&self) -> StorageLabels {
        StorageLabels {
            site: Some(self.storage.site.clone()).filter(|s| !s.is_empty()),
            storage_system: self.identity_endpoint.clone(),
        }
    }

    /// Every effective value as `(key, value)`, with secrets masked
    pub fn effective_values(&self) -> Vec<(&'static str, String)> {
        fn opt<T: std::fmt::Display>(value: &Option<T>) -> String {
            value.as_ref().map(|v| v.to_string()).unwrap_or_default()
        }
        fn secret(value: &Option<String>) -> String {
            match value.as_deref() {
                Some(v) if !v.is_empty() => "********".to_string(),
                _ => String::new(),
            }
        }

        let auth = &self.auth;
        vec![
            ("identifier", self.identifier.clone()),
            ("endpoint", self.endpoint.clone()),
            ("identity_endpoint", self.identity_endpoint.clone()),
            ("debug", self.debug.to_string()),
            ("log_path", self.log_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default()),
            ("records.from", opt(&self.records.from)),
            ("records.to", opt(&self.records.to)),
            ("records.for_period", opt(&self.records.for_period)),
            ("tags.tags", self.tags.tags.join(",")),
            ("tags.ignore_tags", self.tags.ignore_tags.to_string()),
            ("tags.default_tag", opt(&self.tags.default_tag)),
            ("auth.username", opt(&auth.username)),
            ("auth.user_id", opt(&auth.user_id)),
            ("auth.password", secret(&auth.password)),
            ("auth.domain_id", opt(&auth.domain_id)),
            ("auth.domain_name", opt(&auth.domain_name)),
            ("auth.token_id", secret(&auth.token_id)),
            ("auth.application_credential_id", opt(&auth.application_credential_id)),
            ("auth.application_credential_name", opt(&auth.application_credential_name)),
            ("auth.application_credential_secret", secret(&auth.application_credential_secret)),
            ("auth.project_id", opt(&auth.project_id)),
            ("auth.project_name", opt(&auth.project_name)),
            ("auth.project_domain_id", opt(&auth.project_domain_id)),
            ("auth.project_domain_name", opt(&auth.project_domain_name)),
            ("endpoint_options.region", opt(&self.endpoint_options.region)),
            ("endpoint_options.interface", self.endpoint_options.interface.as_str().to_string()),
            ("vm.site_name", self.vm.site_name.clone()),
            ("vm.cloud_type", self.vm.cloud_type.clone()),
            ("vm.cloud_compute_service", opt(&self.vm.cloud_compute_service)),
            ("network.site_name", self.network.site_name.clone()),
            ("network.cloud_type", self.network.cloud_type.clone()),
            ("network.cloud_compute_service", opt(&self.network.cloud_compute_service)),
            ("storage.site", self.storage.site.clone()),
            ("storage.accounted", self.storage.accounted.join(",")),
            ("gpu.site_name", self.gpu.site_name.clone()),
            ("gpu.flavor_marker", self.gpu.flavor_marker.clone()),
            ("limits.requests_per_second", self.limits.requests_per_second.to_string()),
            ("limits.max_in_flight", self.limits.max_in_flight.to_string()),
        ]
    }

    pub fn log_effective(&self) {
        for (key, value) in self.effective_values() {
            tracing::debug!(key, value = %value, "configuration value");
        }
    }
}

fn require(value: &str, key: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(key))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
identifier: osacct-brno
endpoint: https://collector.example:9623
identity_endpoint: https://keystone.example:5000/v3
records:
  for_period: 30days
tags:
  tags: [prod, billing]
auth:
  username: accounting
  password: hunter2
  domain_name: Default
endpoint_options:
  region: brno
  interface: internal
vm:
  site_name: CESNET
  cloud_type: OpenStack
storage:
  site: CESNET-storage
  accounted: [image, manila]
limits:
  requests_per_second: 10
"#;

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.identifier, "osacct-brno");
        assert_eq!(config.records.for_period.as_deref(), Some("30days"));
        assert_eq!(config.tags.tags, vec!["prod", "billing"]);
        assert_eq!(config.endpoint_options.interface.as_str(), "internal");
        assert_eq!(config.limits.requests_per_second, 10);
        assert_eq!(config.limits.max_in_flight, 64);
        assert_eq!(config.gpu.flavor_marker, "nvidia");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("absent.yaml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"limits: [not, a, map]").unwrap();
        assert!(matches!(Config::load(Some(file.path())), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_per_domain() {
        let config = Config::from_yaml(SAMPLE).unwrap();

        assert!(config.validate(&[Domain::Vm, Domain::Storage]).is_ok());
        assert!(matches!(
            config.validate(&[Domain::Network]),
            Err(ConfigError::Missing("network.site_name"))
        ));
        assert!(matches!(
            config.validate(&[Domain::Gpu]),
            Err(ConfigError::Missing("gpu.site_name"))
        ));
    }

    #[test]
    fn test_empty_storage_selection_is_rejected() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.storage.accounted.clear();

        assert!(matches!(
            config.validate(&[Domain::Storage]),
            Err(ConfigError::NoStorageKinds)
        ));
        assert!(config.validate(&[Domain::Vm]).is_ok());
    }

    #[test]
    fn test_validate_global_values() {
        let config = Config::default();
        assert!(matches!(config.validate(&[]), Err(ConfigError::Missing("identifier"))));
    }

    #[test]
    fn test_storage_kind_aliases() {
        let kinds = StorageKinds::parse(&["image", "sharedFileSystem"]).unwrap();
        assert_eq!(
            kinds,
            StorageKinds {
                images: true,
                shares: true,
                volumes: false,
                swift: false
            }
        );
        assert_eq!(StorageKinds::parse(&["all"]).unwrap(), StorageKinds::all());
        assert!(StorageKinds::parse::<&str>(&[]).unwrap().is_empty());
        assert!(matches!(
            StorageKinds::parse(&["tape"]),
            Err(ConfigError::UnknownStorageKind(_))
        ));
    }

    #[test]
    fn test_secrets_are_masked() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let values = config.effective_values();

        let password = values.iter().find(|(k, _)| *k == "auth.password").unwrap();
        assert_eq!(password.1, "********");
        assert!(values.iter().all(|(_, v)| !v.contains("hunter2")));

        let token = values.iter().find(|(k, _)| *k == "auth.token_id").unwrap();
        assert_eq!(token.1, "");
    }

    #[test]
    fn test_example_config_is_valid_for_every_domain() {
        use crate::openstack::Interface;

        let content = include_str!("../config/osacct.example.yaml");
        let config = Config::from_yaml(content).unwrap();

        config.validate(&Domain::ALL).unwrap();
        assert_eq!(config.endpoint_options.interface, Interface::Public);
        assert!(config.storage_kinds().unwrap().swift);
    }
}
