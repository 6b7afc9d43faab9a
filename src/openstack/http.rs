//! HTTP utilities for OpenStack REST API calls

use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Header carrying the token on every authenticated request
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Header carrying a freshly issued token on `POST /auth/tokens`
pub const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for OpenStack API calls
#[derive(Clone)]
pub struct OsHttpClient {
    client: Client,
}

impl OsHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("osacct/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Make an authenticated GET request
    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(AUTH_TOKEN_HEADER, token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(anyhow::anyhow!("API request failed: {} ({})", status, url));
        }

        // Swift answers 204 with an empty body for an account without containers
        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).context("Failed to parse response JSON")
    }

    /// Make an unauthenticated POST and return the response headers with the
    /// parsed body. Used for token issuance.
    pub async fn post_for_headers(&self, url: &str, body: &Value) -> Result<(HeaderMap, Value)> {
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let response_body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(anyhow::anyhow!("API request failed: {} ({})", status, url));
        }

        if response_body.is_empty() {
            return Ok((headers, Value::Null));
        }

        let value = serde_json::from_str(&response_body).context("Failed to parse response JSON")?;
        Ok((headers, value))
    }
}

/// Format an OpenStack API error for display
pub fn format_api_error(error: &anyhow::Error) -> String {
    let error_str = error.to_string();

    if error_str.contains("401") {
        return "Authentication failed. Check the configured credentials.".to_string();
    }
    if error_str.contains("403") {
        return "Permission denied. Check the role assignments of the accounting user.".to_string();
    }
    if error_str.contains("404") {
        return "Resource not found.".to_string();
    }
    if error_str.contains("429") || error_str.contains("413") {
        return "Rate limit exceeded. Please try again later.".to_string();
    }
    if error_str.contains("500") || error_str.contains("503") {
        return "OpenStack service temporarily unavailable. Please try again.".to_string();
    }

    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(120)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
