//! Resource models
//!
//! Plain data types deserialized from OpenStack API responses. Only the
//! fields used for accounting are kept; everything else is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Flavor extra specs (`os-extra_specs`)
pub type ExtraSpecs = HashMap<String, String>;

/// Billing tenant
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Identity user
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Compute flavor
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Flavor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vcpus: u32,
    /// RAM in MiB
    #[serde(default)]
    pub ram: u64,
    /// Root disk in GiB
    #[serde(default)]
    pub disk: u64,
}

/// One address attached to a server network
#[derive(Debug, Clone, Deserialize)]
pub struct ServerAddress {
    pub addr: String,
    #[serde(default)]
    pub version: Option<u8>,
}

/// Compute server (nova `servers/detail` entry)
#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
    /// `{"id": ...}` or, on newer microversions, the embedded flavor
    #[serde(default)]
    pub flavor: Value,
    /// `{"id": ...}` or an empty string for volume-backed servers
    #[serde(default)]
    pub image: Value,
    #[serde(default)]
    pub addresses: HashMap<String, Vec<ServerAddress>>,
}

impl Server {
    /// Flavor id referenced by the server, if any
    pub fn flavor_id(&self) -> Option<&str> {
        self.flavor
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Image id the server was booted from, if any
    pub fn image_id(&self) -> Option<&str> {
        self.image
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// All addresses across every attached network
    pub fn all_addresses(&self) -> impl Iterator<Item = &str> {
        self.addresses
            .values()
            .flat_map(|list| list.iter().map(|a| a.addr.as_str()))
    }
}

/// Floating IP (nova `os-floating-ips` entry)
#[derive(Debug, Clone, Deserialize)]
pub struct FloatingIp {
    #[serde(default)]
    pub id: String,
    pub ip: String,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
}

/// Glance image
#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    /// Size in bytes, null while the image is queued
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Manila share
#[derive(Debug, Clone, Deserialize)]
pub struct Share {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Size in GiB
    #[serde(default)]
    pub size: u64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Cinder volume
#[derive(Debug, Clone, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Size in GiB
    #[serde(default)]
    pub size: u64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Swift container summary
#[derive(Debug, Clone, Deserialize)]
pub struct SwiftContainer {
    pub name: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub bytes: u64,
}

/// OpenStack services disagree on timestamp formats: nova and glance send
/// RFC 3339, cinder and manila send naive ISO 8601 in UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
