//! OpenStack Client
//!
//! Main client for interacting with OpenStack APIs, combining authentication,
//! endpoint discovery and HTTP functionality. [`OpenStackClient`] is one
//! authenticated session; [`OpenStackProvider`] owns the run-scoped session
//! and mints project-scoped ones.

use super::auth::{authenticate, AuthOptions, EndpointOptions, Token};
use super::http::OsHttpClient;
use super::pager::{extract_items, fetch_all, NextPage};
use super::projects;
use crate::resource::{
    CloudProvider, ExtraSpecs, Flavor, FloatingIp, Image, Project, ProjectSession, Server, Share,
    SwiftContainer, User, Volume,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Re-authenticate this long before the token actually expires
const TOKEN_EXPIRY_BUFFER: chrono::Duration = chrono::Duration::minutes(5);

/// Page size for swift container listings
const SWIFT_PAGE_LIMIT: usize = 1000;

const COMPUTE: &[&str] = &["compute"];
const IMAGE: &[&str] = &["image"];
const SHARE: &[&str] = &["sharev2", "share"];
const VOLUME: &[&str] = &["volumev3", "block-storage", "volume"];
const OBJECT_STORE: &[&str] = &["object-store"];

/// One authenticated OpenStack session
#[derive(Clone)]
pub struct OpenStackClient {
    http: OsHttpClient,
    identity_endpoint: String,
    auth: AuthOptions,
    endpoint_options: EndpointOptions,
    token: Arc<RwLock<Arc<Token>>>,
}

impl OpenStackClient {
    /// Authenticate and create a new client
    pub async fn connect(
        http: OsHttpClient,
        identity_endpoint: &str,
        auth: AuthOptions,
        endpoint_options: EndpointOptions,
    ) -> Result<Self> {
        let identity_endpoint = identity_endpoint.trim_end_matches('/').to_string();
        let token = authenticate(&http, &identity_endpoint, &auth).await?;

        Ok(Self {
            http,
            identity_endpoint,
            auth,
            endpoint_options,
            token: Arc::new(RwLock::new(Arc::new(token))),
        })
    }

    /// Get a valid token, re-authenticating when the cached one is about to expire
    async fn current_token(&self) -> Result<Arc<Token>> {
        {
            let cached = self.token.read().await;
            let fresh = cached
                .expires_at
                .map_or(true, |expires| Utc::now() + TOKEN_EXPIRY_BUFFER < expires);
            if fresh {
                return Ok(cached.clone());
            }
        }

        let mut cached = self.token.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(expires) = cached.expires_at {
            if Utc::now() + TOKEN_EXPIRY_BUFFER < expires {
                return Ok(cached.clone());
            }
        }
        tracing::debug!("Cached token expired, re-authenticating");
        let token = Arc::new(authenticate(&self.http, &self.identity_endpoint, &self.auth).await?);
        *cached = token.clone();
        Ok(token)
    }

    /// Make an authenticated GET request
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.current_token().await?;
        self.http.get(url, &token.value).await
    }

    async fn endpoint(&self, types: &[&str]) -> Result<String> {
        let token = self.current_token().await?;
        token
            .catalog
            .endpoint_for(types, &self.endpoint_options)
            .with_context(|| {
                format!(
                    "no {} endpoint for service {:?} in the catalog",
                    self.endpoint_options.interface.as_str(),
                    types
                )
            })
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build Identity API URL
    pub fn identity_url(&self, path: &str) -> String {
        format!("{}/{}", self.identity_endpoint, path)
    }

    /// Build Compute API URL
    pub async fn compute_url(&self, path: &str) -> Result<String> {
        Ok(format!("{}/{}", self.endpoint(COMPUTE).await?, path))
    }

    /// Image service root; glance publishes it unversioned, but some clouds add `/v2`
    pub async fn image_root(&self) -> Result<String> {
        let endpoint = self.endpoint(IMAGE).await?;
        Ok(endpoint.trim_end_matches("/v2").to_string())
    }

    /// Build Shared File Systems API URL
    pub async fn share_url(&self, path: &str) -> Result<String> {
        Ok(format!("{}/{}", self.endpoint(SHARE).await?, path))
    }

    /// Build Block Storage API URL
    pub async fn volume_url(&self, path: &str) -> Result<String> {
        Ok(format!("{}/{}", self.endpoint(VOLUME).await?, path))
    }

    /// Object Storage account URL
    pub async fn object_store_url(&self) -> Result<String> {
        self.endpoint(OBJECT_STORE).await
    }
}

#[async_trait]
impl ProjectSession for OpenStackClient {
    async fn list_servers(&self) -> Result<Vec<Server>> {
        let url = self.compute_url("servers/detail").await?;
        fetch_all(self, &url, "servers", NextPage::Links, "").await
    }

    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        let url = self.compute_url("flavors/detail?is_public=None").await?;
        fetch_all(self, &url, "flavors", NextPage::Links, "").await
    }

    async fn flavor_extra_specs(&self, flavor_id: &str) -> Result<ExtraSpecs> {
        let url = self
            .compute_url(&format!("flavors/{}/os-extra_specs", urlencoding::encode(flavor_id)))
            .await?;
        let response = self.get(&url).await?;
        match response.get("extra_specs") {
            Some(specs) => serde_json::from_value(specs.clone()).context("Failed to parse extra specs"),
            None => Ok(ExtraSpecs::new()),
        }
    }

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>> {
        let url = self.compute_url("os-floating-ips").await?;
        fetch_all(self, &url, "floating_ips", NextPage::None, "").await
    }

    async fn list_images(&self, owner: &str) -> Result<Vec<Image>> {
        let root = self.image_root().await?;
        let url = format!("{}/v2/images?owner={}", root, urlencoding::encode(owner));
        fetch_all(self, &url, "images", NextPage::Relative, &root).await
    }

    async fn list_shares(&self, project_id: &str) -> Result<Vec<Share>> {
        let url = self
            .share_url(&format!("shares/detail?project_id={}", urlencoding::encode(project_id)))
            .await?;
        fetch_all(self, &url, "shares", NextPage::Links, "").await
    }

    async fn list_volumes(&self, project_id: &str) -> Result<Vec<Volume>> {
        let url = self
            .volume_url(&format!("volumes/detail?project_id={}", urlencoding::encode(project_id)))
            .await?;
        fetch_all(self, &url, "volumes", NextPage::Links, "").await
    }

    async fn list_containers(&self) -> Result<Vec<SwiftContainer>> {
        let account = self.object_store_url().await?;
        let mut containers: Vec<SwiftContainer> = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = format!("{}?format=json&limit={}", account, SWIFT_PAGE_LIMIT);
            if let Some(ref m) = marker {
                url.push_str(&format!("&marker={}", urlencoding::encode(m)));
            }

            // Swift returns a bare array instead of an object
            let response = self.get(&url).await?;
            let raw_len = response.as_array().map_or(0, Vec::len);
            let raw_last = response
                .as_array()
                .and_then(|entries| entries.last())
                .and_then(|entry| entry.get("name"))
                .and_then(|v| v.as_str())
                .map(String::from);
            let page: Vec<SwiftContainer> = match response {
                Value::Null => Vec::new(),
                other => extract_items(&serde_json::json!({ "containers": other }), "containers")?,
            };

            // Paging follows the raw listing, skipped entries included
            let full_page = raw_len >= SWIFT_PAGE_LIMIT;
            marker = raw_last.or_else(|| page.last().map(|c| c.name.clone()));
            containers.extend(page);

            if !full_page {
                break;
            }
        }

        Ok(containers)
    }
}

/// Run-scoped provider: one admin session plus per-project rebinding
#[derive(Clone)]
pub struct OpenStackProvider {
    admin: OpenStackClient,
    base_auth: AuthOptions,
    users_domain: Option<String>,
}

impl OpenStackProvider {
    /// Authenticate the run credentials. Failure here is fatal for the run.
    pub async fn connect(
        identity_endpoint: &str,
        auth: AuthOptions,
        endpoint_options: EndpointOptions,
    ) -> Result<Self> {
        let http = OsHttpClient::new()?;
        let users_domain = auth.domain_id.clone().filter(|d| !d.is_empty());
        let admin = OpenStackClient::connect(http, identity_endpoint, auth.clone(), endpoint_options)
            .await
            .context("Failed to initialize OpenStack credentials")?;

        Ok(Self {
            admin,
            base_auth: auth,
            users_domain,
        })
    }
}

#[async_trait]
impl CloudProvider for OpenStackProvider {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        projects::list_available_projects(&self.admin).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let url = match self.users_domain {
            Some(ref domain) => self
                .admin
                .identity_url(&format!("users?domain_id={}", urlencoding::encode(domain))),
            None => self.admin.identity_url("users"),
        };
        fetch_all(&self.admin, &url, "users", NextPage::Links, "").await
    }

    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        ProjectSession::list_flavors(&self.admin).await
    }

    async fn scoped_session(&self, project: &Project) -> Result<Arc<dyn ProjectSession>> {
        let auth = self.base_auth.rescoped(project);
        let client = OpenStackClient::connect(
            self.admin.http.clone(),
            &self.admin.identity_endpoint,
            auth,
            self.admin.endpoint_options.clone(),
        )
        .await
        .with_context(|| format!("Failed to authenticate scoped to project {}", project.id))?;

        Ok(Arc::new(client))
    }
}
