//! Project enumeration

use crate::config::TagConfig;
use crate::resource::{Project, RunReader};
use anyhow::{Context, Result};
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Which projects take part in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    All,
    /// Projects carrying at least one of these tags
    Any(HashSet<String>),
}

impl TagFilter {
    /// `ignore_tags` wins, then an explicit tag list, then the default tag
    pub fn from_config(tags: &TagConfig) -> Self {
        if tags.ignore_tags {
            return Self::All;
        }
        let explicit: HashSet<String> = tags.tags.iter().filter(|t| !t.is_empty()).cloned().collect();
        if !explicit.is_empty() {
            return Self::Any(explicit);
        }
        match tags.default_tag.as_deref().filter(|t| !t.is_empty()) {
            Some(tag) => Self::Any(HashSet::from([tag.to_string()])),
            None => Self::All,
        }
    }

    pub fn accepts(&self, project_tags: &[String]) -> bool {
        match self {
            Self::All => true,
            Self::Any(wanted) if wanted.is_empty() => true,
            Self::Any(wanted) => project_tags.iter().any(|t| wanted.contains(t)),
        }
    }
}

/// List every available project and keep those the filter accepts.
/// Failure here is fatal for the run.
pub async fn list_projects(reader: &RunReader, filter: &TagFilter) -> Result<Vec<Project>> {
    let projects = reader
        .list_available_projects()
        .await
        .context("Failed to list available projects")?;

    let total = projects.len();
    let accepted: Vec<Project> = projects.into_iter().filter(|p| filter.accepts(&p.tags)).collect();

    tracing::info!(total, accepted = accepted.len(), "projects enumerated");
    Ok(accepted)
}

/// Push projects into the collector's channel; dropping `tx` closes it
pub async fn feed(projects: Vec<Project>, tx: mpsc::Sender<Project>) {
    for project in projects {
        if tx.send(project).await.is_err() {
            tracing::warn!("collector stopped before all projects were fed");
            return;
        }
    }
}
