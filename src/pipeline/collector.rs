//! Resource collection
//!
//! One worker per project. Each worker rebinds the run credentials to its
//! project, lists the domain's resource kinds and pushes raw items to the
//! shared output channel. Failures are logged and only cost the items of
//! the failing project or kind.

use super::fanout::FanOut;
use crate::config::StorageKinds;
use crate::resource::{
    CloudProvider, Flavor, Project, RawResourceItem, RetryPolicy, ScopedReader, StorageObject,
};
use futures::future::join_all;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What to list in each project
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectKind {
    Vm,
    Gpu { flavor_marker: String },
    Network,
    Storage(StorageKinds),
}

pub struct Collector {
    pub provider: Arc<dyn CloudProvider>,
    pub policy: RetryPolicy,
    pub kind: CollectKind,
    pub max_in_flight: usize,
}

type Output = mpsc::Sender<RawResourceItem>;

impl Collector {
    /// Collect every project from `projects`. The output channel closes once
    /// the last worker is done and `out` has been dropped.
    pub async fn run(self, mut projects: mpsc::Receiver<Project>, out: Output) {
        let kind = Arc::new(self.kind);
        let mut fanout = FanOut::new("collect", self.max_in_flight);

        while let Some(project) = projects.recv().await {
            let provider = self.provider.clone();
            let kind = kind.clone();
            let out = out.clone();
            let policy = self.policy;
            fanout
                .spawn(async move { collect_project(provider, policy, &kind, project, out).await })
                .await;
        }

        fanout.join().await;
    }
}

async fn collect_project(
    provider: Arc<dyn CloudProvider>,
    policy: RetryPolicy,
    kind: &CollectKind,
    project: Project,
    out: Output,
) {
    let session = match policy
        .read("scoped session", || provider.scoped_session(&project))
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(project = %project.id, error = %e, "error creating scoped session, skipping project");
            return;
        }
    };

    let reader = ScopedReader::new(session, project, policy);
    match kind {
        CollectKind::Vm => collect_servers(&reader, &out).await,
        CollectKind::Gpu { flavor_marker } => collect_gpus(&reader, flavor_marker, &out).await,
        CollectKind::Network => collect_floating_ips(&reader, &out).await,
        CollectKind::Storage(kinds) => collect_storage(&reader, *kinds, &out).await,
    }
}

fn by_id(flavors: Vec<Flavor>) -> HashMap<String, Flavor> {
    flavors
        .into_iter()
        .filter(|f| !f.id.is_empty())
        .map(|f| (f.id.clone(), f))
        .collect()
}

async fn collect_servers(reader: &ScopedReader, out: &Output) {
    let project = reader.project();
    let servers = match reader.list_all_servers().await {
        Ok(servers) => servers,
        Err(e) => {
            tracing::error!(project = %project.id, error = %e, "error listing servers");
            return;
        }
    };

    let flavors = match reader.list_all_flavors().await {
        Ok(flavors) => by_id(flavors),
        Err(e) => {
            tracing::warn!(project = %project.id, error = %e, "error listing flavors, servers sent without flavor");
            HashMap::new()
        }
    };

    tracing::debug!(project = %project.id, count = servers.len(), "servers listed");
    for server in servers {
        let flavor = server.flavor_id().and_then(|id| flavors.get(id).cloned());
        if out.send(RawResourceItem::ServerFlavor { server, flavor }).await.is_err() {
            return;
        }
    }
}

async fn collect_gpus(reader: &ScopedReader, marker: &str, out: &Output) {
    let project = reader.project();
    let flavors = match reader.list_all_flavors().await {
        Ok(flavors) => by_id(flavors),
        Err(e) => {
            tracing::error!(project = %project.id, error = %e, "error listing flavors");
            return;
        }
    };

    if !flavors.values().any(|f| f.name.contains(marker)) {
        tracing::debug!(project = %project.id, marker, "no accelerator flavors");
        return;
    }

    let servers = match reader.list_all_servers().await {
        Ok(servers) => servers,
        Err(e) => {
            tracing::error!(project = %project.id, error = %e, "error listing servers");
            return;
        }
    };

    for server in servers {
        let Some(flavor_id) = server.flavor_id().map(String::from) else {
            tracing::warn!(project = %project.id, id = %server.id, "server has no flavor id, skipping");
            continue;
        };

        // Unknown flavors are usually deleted accelerator flavors still in use
        let candidate = flavors.get(&flavor_id).map_or(true, |f| f.name.contains(marker));
        if !candidate {
            continue;
        }

        let extra_specs = match reader.list_flavor_extra_specs(&flavor_id).await {
            Ok(specs) => specs,
            Err(e) => {
                tracing::error!(project = %project.id, id = %server.id, flavor = %flavor_id, error = %e, "error listing extra specs");
                continue;
            }
        };

        let item = RawResourceItem::Gpu {
            project: project.clone(),
            server,
            extra_specs,
        };
        if out.send(item).await.is_err() {
            return;
        }
    }
}

async fn collect_floating_ips(reader: &ScopedReader, out: &Output) {
    let project = reader.project();
    match reader.list_floating_ips().await {
        Ok(floating_ips) => {
            let item = RawResourceItem::NetUser {
                project: project.clone(),
                floating_ips,
            };
            if out.send(item).await.is_err() {
                tracing::warn!(project = %project.id, "filter stopped receiving");
            }
        }
        Err(e) => tracing::error!(project = %project.id, error = %e, "error listing floating ips"),
    }
}

async fn emit_storage(reader: &ScopedReader, objects: Vec<StorageObject>, out: &Output) {
    for object in objects {
        let item = RawResourceItem::Storage {
            project: reader.project().clone(),
            object,
        };
        if out.send(item).await.is_err() {
            return;
        }
    }
}

/// One concurrent branch per enabled sub-kind, all joined before returning
async fn collect_storage(reader: &ScopedReader, kinds: StorageKinds, out: &Output) {
    let project_id = reader.project().id.as_str();
    let mut branches = Vec::new();

    if kinds.images {
        branches.push(
            async {
                match reader.list_all_images().await {
                    Ok(images) => emit_storage(reader, images.into_iter().map(StorageObject::Image).collect(), out).await,
                    Err(e) => tracing::error!(project = %project_id, kind = "image", error = %e, "error listing images"),
                }
            }
            .boxed(),
        );
    }
    if kinds.shares {
        branches.push(
            async {
                match reader.list_all_shares().await {
                    Ok(shares) => emit_storage(reader, shares.into_iter().map(StorageObject::Share).collect(), out).await,
                    Err(e) => tracing::error!(project = %project_id, kind = "share", error = %e, "error listing shares"),
                }
            }
            .boxed(),
        );
    }
    if kinds.volumes {
        branches.push(
            async {
                match reader.list_all_volumes().await {
                    Ok(volumes) => emit_storage(reader, volumes.into_iter().map(StorageObject::Volume).collect(), out).await,
                    Err(e) => tracing::error!(project = %project_id, kind = "volume", error = %e, "error listing volumes"),
                }
            }
            .boxed(),
        );
    }
    if kinds.swift {
        branches.push(
            async {
                match reader.list_all_swift_containers().await {
                    Ok(containers) => {
                        emit_storage(reader, containers.into_iter().map(StorageObject::Container).collect(), out).await
                    }
                    Err(e) => tracing::error!(project = %project_id, kind = "swift", error = %e, "error listing swift containers"),
                }
            }
            .boxed(),
        );
    }

    join_all(branches).await;
}
