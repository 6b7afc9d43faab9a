//! OpenStack Projects
//!
//! Functions for listing the projects the run credentials can access.

use super::client::OpenStackClient;
use super::pager::{fetch_all, NextPage};
use crate::resource::Project;
use anyhow::Result;

/// List all projects available to the authenticated user
pub async fn list_available_projects(client: &OpenStackClient) -> Result<Vec<Project>> {
    let url = client.identity_url("auth/projects");
    let projects: Vec<Project> = fetch_all(client, &url, "projects", NextPage::Links, "").await?;

    tracing::debug!("Listed {} available projects", projects.len());
    Ok(projects)
}

