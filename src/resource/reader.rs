//! Retrying readers
//!
//! Every remote list/get goes through [`RetryPolicy::read`]: a fixed number
//! of attempts separated by a fixed delay, no backoff growth and no jitter.
//! Whether exhaustion is fatal is the caller's decision.

use super::model::{ExtraSpecs, Flavor, FloatingIp, Image, Project, Server, Share, SwiftContainer, User, Volume};
use super::provider::{CloudProvider, ProjectSession};
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Attempts per remote call
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Pause between two attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bounded retry for one remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or attempts are exhausted, returning the
    /// last error in the latter case.
    pub async fn read<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        what,
                        attempt,
                        attempts,
                        error = %e,
                        "remote call failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Reader bound to the run credentials
#[derive(Clone)]
pub struct RunReader {
    provider: Arc<dyn CloudProvider>,
    policy: RetryPolicy,
}

impl RunReader {
    pub fn new(provider: Arc<dyn CloudProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn provider(&self) -> &Arc<dyn CloudProvider> {
        &self.provider
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn list_available_projects(&self) -> Result<Vec<Project>> {
        self.policy
            .read("projects", || self.provider.list_projects())
            .await
    }

    pub async fn list_all_users(&self) -> Result<Vec<User>> {
        self.policy.read("users", || self.provider.list_users()).await
    }

    pub async fn list_all_flavors(&self) -> Result<Vec<Flavor>> {
        self.policy
            .read("flavors", || self.provider.list_flavors())
            .await
    }
}

/// Reader bound to one project's session
#[derive(Clone)]
pub struct ScopedReader {
    session: Arc<dyn ProjectSession>,
    project: Project,
    policy: RetryPolicy,
}

impl ScopedReader {
    pub fn new(session: Arc<dyn ProjectSession>, project: Project, policy: RetryPolicy) -> Self {
        Self {
            session,
            project,
            policy,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub async fn list_all_servers(&self) -> Result<Vec<Server>> {
        self.policy
            .read("servers", || self.session.list_servers())
            .await
    }

    pub async fn list_all_flavors(&self) -> Result<Vec<Flavor>> {
        self.policy
            .read("flavors", || self.session.list_flavors())
            .await
    }

    pub async fn list_flavor_extra_specs(&self, flavor_id: &str) -> Result<ExtraSpecs> {
        self.policy
            .read("flavor extra specs", || self.session.flavor_extra_specs(flavor_id))
            .await
    }

    pub async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>> {
        self.policy
            .read("floating ips", || self.session.list_floating_ips())
            .await
    }

    pub async fn list_all_images(&self) -> Result<Vec<Image>> {
        let owner = self.project.id.as_str();
        self.policy
            .read("images", || self.session.list_images(owner))
            .await
    }

    pub async fn list_all_shares(&self) -> Result<Vec<Share>> {
        let project_id = self.project.id.as_str();
        self.policy
            .read("shares", || self.session.list_shares(project_id))
            .await
    }

    pub async fn list_all_volumes(&self) -> Result<Vec<Volume>> {
        let project_id = self.project.id.as_str();
        self.policy
            .read("volumes", || self.session.list_volumes(project_id))
            .await
    }

    pub async fn list_all_swift_containers(&self) -> Result<Vec<SwiftContainer>> {
        self.policy
            .read("swift containers", || self.session.list_containers())
            .await
    }
}
