//! Cloud provider seams
//!
//! The pipeline never talks HTTP directly. It is written against these two
//! traits; [`crate::openstack`] implements them for a real cloud and the
//! tests implement them with in-memory fakes.

use super::model::{ExtraSpecs, Flavor, FloatingIp, Image, Project, Server, Share, SwiftContainer, User, Volume};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Run-scoped access to the cloud, authenticated once per process.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Projects the run credentials can access
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Users visible to the run credentials
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Flavors visible to the run credentials
    async fn list_flavors(&self) -> Result<Vec<Flavor>>;

    /// Re-authenticate the run credentials scoped to one project.
    ///
    /// Every call yields a fresh session; two projects never share one.
    async fn scoped_session(&self, project: &Project) -> Result<Arc<dyn ProjectSession>>;
}

/// Project-scoped access, produced by [`CloudProvider::scoped_session`].
///
/// Every list operation returns all pages.
#[async_trait]
pub trait ProjectSession: Send + Sync {
    async fn list_servers(&self) -> Result<Vec<Server>>;

    async fn list_flavors(&self) -> Result<Vec<Flavor>>;

    async fn flavor_extra_specs(&self, flavor_id: &str) -> Result<ExtraSpecs>;

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>>;

    async fn list_images(&self, owner: &str) -> Result<Vec<Image>>;

    async fn list_shares(&self, project_id: &str) -> Result<Vec<Share>>;

    async fn list_volumes(&self, project_id: &str) -> Result<Vec<Volume>>;

    async fn list_containers(&self) -> Result<Vec<SwiftContainer>>;
}
