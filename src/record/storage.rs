//! Storage records
//!
//! Sizes are reported in bytes. Volumes and shares are sized in GiB by
//! their services and converted here.

use super::non_empty;
use crate::resource::{Project, StorageObject};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

const GIB: u64 = 1024 * 1024 * 1024;

/// Labels stamped on every storage record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageLabels {
    pub site: Option<String>,
    /// Identity endpoint the objects were read from
    pub storage_system: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageRecord {
    pub record_id: Uuid,
    pub create_time: DateTime<Utc>,
    pub storage_system: String,
    pub site: Option<String>,
    pub storage_share: Option<String>,
    pub storage_media: Option<String>,
    pub file_count: Option<String>,
    pub local_user: Option<String>,
    pub local_group: Option<String>,
    pub user_identity: Option<String>,
    pub group: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub resource_capacity_used: u64,
    pub logical_capacity_used: Option<u64>,
    pub resource_capacity_allocated: Option<u64>,
}

/// Name of `id` from the user map, falling back to the id itself
fn identity_of(users: &HashMap<String, String>, id: Option<&str>) -> Option<String> {
    let id = id.filter(|s| !s.is_empty())?;
    Some(users.get(id).cloned().unwrap_or_else(|| id.to_string()))
}

pub fn build(
    project: &Project,
    object: &StorageObject,
    users: &HashMap<String, String>,
    labels: &StorageLabels,
    now: DateTime<Utc>,
) -> StorageRecord {
    let (size, file_count, local_user, local_group, user_identity) = match object {
        StorageObject::Image(image) => (
            image.size.unwrap_or(0),
            image.file.clone(),
            image.owner.clone(),
            non_empty(&project.id),
            identity_of(users, image.owner.as_deref()),
        ),
        StorageObject::Share(share) => (
            share.size.saturating_mul(GIB),
            Some("1".to_string()),
            share.project_id.clone(),
            non_empty(&project.id),
            identity_of(users, share.project_id.as_deref()),
        ),
        StorageObject::Volume(volume) => (
            volume.size.saturating_mul(GIB),
            Some("1".to_string()),
            volume.user_id.clone(),
            non_empty(&project.id),
            identity_of(users, volume.user_id.as_deref()),
        ),
        StorageObject::Container(container) => (
            container.bytes,
            Some(container.count.to_string()),
            non_empty(&project.id),
            non_empty(&project.domain_id),
            non_empty(&project.name),
        ),
    };

    StorageRecord {
        record_id: Uuid::new_v4(),
        create_time: now,
        storage_system: labels.storage_system.clone(),
        site: labels.site.clone(),
        storage_share: Some(object.kind().to_string()),
        storage_media: Some("disk".to_string()),
        file_count,
        local_user,
        local_group,
        user_identity,
        group: non_empty(&project.name),
        start_time: object.created().unwrap_or(now),
        end_time: now,
        resource_capacity_used: size,
        logical_capacity_used: Some(size),
        resource_capacity_allocated: Some(size),
    }
}
