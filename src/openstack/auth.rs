//! OpenStack Authentication
//!
//! Issues Keystone v3 tokens from password, token or application
//! credentials and keeps the service catalog that comes with them.

use super::http::{OsHttpClient, SUBJECT_TOKEN_HEADER};
use crate::resource::Project;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Credentials and scope sent to Keystone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthOptions {
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub password: Option<String>,
    pub domain_id: Option<String>,
    pub domain_name: Option<String>,
    pub token_id: Option<String>,
    pub application_credential_id: Option<String>,
    pub application_credential_name: Option<String>,
    pub application_credential_secret: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub project_domain_id: Option<String>,
    pub project_domain_name: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl AuthOptions {
    /// The same credentials scoped to `project`.
    ///
    /// Scoping by id is unambiguous across domains, so the name and domain
    /// hints are replaced rather than merged.
    pub fn rescoped(&self, project: &Project) -> Self {
        Self {
            project_id: Some(project.id.clone()),
            project_name: Some(project.name.clone()),
            project_domain_id: (!project.domain_id.is_empty()).then(|| project.domain_id.clone()),
            project_domain_name: None,
            ..self.clone()
        }
    }

    fn user_domain(&self) -> Option<Value> {
        if let Some(id) = non_empty(&self.domain_id) {
            Some(json!({ "id": id }))
        } else {
            non_empty(&self.domain_name).map(|name| json!({ "name": name }))
        }
    }

    fn identity(&self) -> Result<Value> {
        if let Some(secret) = non_empty(&self.application_credential_secret) {
            let mut credential = Map::new();
            credential.insert("secret".into(), json!(secret));
            if let Some(id) = non_empty(&self.application_credential_id) {
                credential.insert("id".into(), json!(id));
            } else if let Some(name) = non_empty(&self.application_credential_name) {
                credential.insert("name".into(), json!(name));
                credential.insert("user".into(), self.user_ref()?);
            } else {
                anyhow::bail!("application credential secret given without id or name");
            }
            return Ok(json!({
                "methods": ["application_credential"],
                "application_credential": credential,
            }));
        }

        if let Some(token) = non_empty(&self.token_id) {
            return Ok(json!({
                "methods": ["token"],
                "token": { "id": token },
            }));
        }

        let password = non_empty(&self.password).context("no password, token or application credential configured")?;
        let mut user = self.user_ref()?;
        if let Value::Object(ref mut map) = user {
            map.insert("password".into(), json!(password));
        }
        Ok(json!({
            "methods": ["password"],
            "password": { "user": user },
        }))
    }

    fn user_ref(&self) -> Result<Value> {
        if let Some(id) = non_empty(&self.user_id) {
            return Ok(json!({ "id": id }));
        }
        let name = non_empty(&self.username).context("neither user id nor username configured")?;
        let mut user = Map::new();
        user.insert("name".into(), json!(name));
        if let Some(domain) = self.user_domain() {
            user.insert("domain".into(), domain);
        }
        Ok(Value::Object(user))
    }

    fn scope(&self) -> Option<Value> {
        // Application credentials carry their own scope
        if non_empty(&self.application_credential_secret).is_some() {
            return None;
        }
        if let Some(id) = non_empty(&self.project_id) {
            return Some(json!({ "project": { "id": id } }));
        }
        let name = non_empty(&self.project_name)?;
        let domain = if let Some(id) = non_empty(&self.project_domain_id) {
            json!({ "id": id })
        } else if let Some(name) = non_empty(&self.project_domain_name) {
            json!({ "name": name })
        } else {
            self.user_domain()?
        };
        Some(json!({ "project": { "name": name, "domain": domain } }))
    }

    /// Body of `POST /v3/auth/tokens`
    pub fn token_request(&self) -> Result<Value> {
        let mut auth = Map::new();
        auth.insert("identity".into(), self.identity()?);
        if let Some(scope) = self.scope() {
            auth.insert("scope".into(), scope);
        }
        Ok(json!({ "auth": auth }))
    }
}

/// Which published endpoint of a service to talk to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    #[default]
    Public,
    Internal,
    Admin,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Admin => "admin",
        }
    }
}

/// Endpoint selection options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOptions {
    pub region: Option<String>,
    pub interface: Interface,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

/// Service catalog returned with a token
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    entries: Vec<CatalogEntry>,
}

impl ServiceCatalog {
    /// Find the endpoint URL of the first service type in `types` that is
    /// published on the requested interface (and region, when given).
    pub fn endpoint_for(&self, types: &[&str], options: &EndpointOptions) -> Option<String> {
        let region = non_empty(&options.region);
        types.iter().find_map(|wanted| {
            self.entries
                .iter()
                .filter(|entry| entry.service_type == *wanted)
                .flat_map(|entry| entry.endpoints.iter())
                .find(|ep| {
                    ep.interface == options.interface.as_str()
                        && region.map_or(true, |r| {
                            ep.region.as_deref() == Some(r) || ep.region_id.as_deref() == Some(r)
                        })
                })
                .map(|ep| ep.url.trim_end_matches('/').to_string())
        })
    }
}

/// An issued token and its catalog
#[derive(Debug, Clone)]
pub struct Token {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub catalog: ServiceCatalog,
}

/// Authenticate against Keystone v3
pub async fn authenticate(
    http: &OsHttpClient,
    identity_endpoint: &str,
    options: &AuthOptions,
) -> Result<Token> {
    let url = format!("{}/auth/tokens", identity_endpoint.trim_end_matches('/'));
    let body = options.token_request()?;

    let (headers, response) = http
        .post_for_headers(&url, &body)
        .await
        .context("Failed to authenticate against the identity service")?;

    let value = headers
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .context("identity service returned no token")?
        .to_string();

    let token = response.get("token").cloned().unwrap_or(Value::Null);
    let expires_at = token
        .get("expires_at")
        .and_then(|v| v.as_str())
        .and_then(crate::resource::model::timestamp::parse);
    let catalog = match token.get("catalog") {
        Some(catalog) => serde_json::from_value(catalog.clone()).context("Failed to parse service catalog")?,
        None => ServiceCatalog::default(),
    };

    tracing::debug!(
        project = options.project_id.as_deref().or(options.project_name.as_deref()).unwrap_or("-"),
        expires_at = ?expires_at,
        "token issued"
    );

    Ok(Token {
        value,
        expires_at,
        catalog,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password_options() -> AuthOptions {
        AuthOptions {
            username: Some("accounting".into()),
            password: Some("secret".into()),
            domain_name: Some("Default".into()),
            project_name: Some("admin".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_password_request_with_project_name_scope() {
        let body = password_options().token_request().unwrap();

        assert_eq!(body["auth"]["identity"]["methods"][0], "password");
        assert_eq!(body["auth"]["identity"]["password"]["user"]["name"], "accounting");
        assert_eq!(body["auth"]["identity"]["password"]["user"]["domain"]["name"], "Default");
        assert_eq!(body["auth"]["scope"]["project"]["name"], "admin");
        assert_eq!(body["auth"]["scope"]["project"]["domain"]["name"], "Default");
    }

    #[test]
    fn test_rescoped_binds_project_id() {
        let project = Project {
            id: "p-123".into(),
            name: "physics".into(),
            domain_id: "d-1".into(),
            tags: vec![],
        };
        let base = password_options();
        let scoped = base.rescoped(&project);

        let body = scoped.token_request().unwrap();
        assert_eq!(body["auth"]["scope"]["project"]["id"], "p-123");
        assert_eq!(scoped.username, base.username);
        // The base options are left untouched
        assert_eq!(base.project_id, None);
    }

    #[test]
    fn test_application_credential_has_no_scope() {
        let options = AuthOptions {
            application_credential_id: Some("ac-1".into()),
            application_credential_secret: Some("s".into()),
            project_id: Some("p".into()),
            ..Default::default()
        };
        let body = options.token_request().unwrap();

        assert_eq!(body["auth"]["identity"]["methods"][0], "application_credential");
        assert!(body["auth"].get("scope").is_none());
    }

    #[test]
    fn test_missing_credentials_is_an_error() {
        assert!(AuthOptions::default().token_request().is_err());
    }

    #[test]
    fn test_catalog_selects_interface_and_region() {
        let catalog: ServiceCatalog = serde_json::from_value(json!([
            {
                "type": "compute",
                "endpoints": [
                    {"interface": "public", "region": "brno", "url": "https://nova.brno/v2.1/"},
                    {"interface": "internal", "region": "brno", "url": "http://nova.internal/v2.1"},
                    {"interface": "public", "region": "ostrava", "url": "https://nova.ostrava/v2.1"}
                ]
            }
        ]))
        .unwrap();

        let options = EndpointOptions {
            region: Some("ostrava".into()),
            interface: Interface::Public,
        };
        assert_eq!(
            catalog.endpoint_for(&["compute"], &options).as_deref(),
            Some("https://nova.ostrava/v2.1")
        );

        let internal = EndpointOptions {
            region: None,
            interface: Interface::Internal,
        };
        assert_eq!(
            catalog.endpoint_for(&["compute"], &internal).as_deref(),
            Some("http://nova.internal/v2.1")
        );
        assert!(catalog.endpoint_for(&["image"], &options).is_none());
    }
}
