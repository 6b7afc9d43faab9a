//! Virtual machine records

use super::{ip, non_empty, RecordLabels};
use crate::resource::{Flavor, Server};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Usage of one server, measured from its creation until now
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmRecord {
    pub vm_uuid: String,
    pub site_name: String,
    pub cloud_compute_service: Option<String>,
    pub machine_name: String,
    pub local_user_id: Option<String>,
    pub local_group_id: Option<String>,
    pub global_user_name: Option<String>,
    pub fqan: Option<String>,
    pub status: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Seconds
    pub suspend_duration: i64,
    /// Seconds
    pub wall_duration: i64,
    /// Seconds, `wall_duration * cpu_count`
    pub cpu_duration: i64,
    pub cpu_count: u32,
    pub public_ip_count: Option<u64>,
    /// MiB
    pub memory: Option<u64>,
    /// GiB
    pub disk: Option<u64>,
    pub image_id: Option<String>,
    pub cloud_type: String,
}

pub fn build(
    server: &Server,
    flavor: Option<&Flavor>,
    users: &HashMap<String, String>,
    labels: &RecordLabels,
    now: DateTime<Utc>,
) -> VmRecord {
    let start_time = server.created;
    let end_time = now;

    let wall_duration = (now - start_time).num_seconds();
    let suspend_duration = (wall_duration - (end_time - start_time).num_seconds()).max(0);

    let cpu_count = flavor.map_or(0, |f| f.vcpus);
    let memory = flavor.map(|f| f.ram).filter(|m| *m != 0);
    let disk = flavor.map(|f| f.disk).filter(|d| *d != 0);

    let public_ips = ip::count_public(server.all_addresses()).ipv4;

    VmRecord {
        vm_uuid: server.id.clone(),
        site_name: labels.site_name.clone(),
        cloud_compute_service: labels.cloud_compute_service.clone(),
        machine_name: server.name.clone(),
        local_user_id: non_empty(&server.user_id),
        local_group_id: non_empty(&server.tenant_id),
        global_user_name: users.get(&server.user_id).and_then(|name| non_empty(name)),
        fqan: fqan(&server.tenant_id),
        status: non_empty(&server.status),
        start_time,
        end_time,
        suspend_duration,
        wall_duration,
        cpu_duration: wall_duration * i64::from(cpu_count),
        cpu_count,
        public_ip_count: (public_ips > 0).then_some(u64::from(public_ips)),
        memory,
        disk,
        image_id: server.image_id().map(String::from),
        cloud_type: labels.cloud_type.clone(),
    }
}

fn fqan(tenant_id: &str) -> Option<String> {
    (!tenant_id.is_empty()).then(|| format!("/{}/Role=NULL/Capability=NULL", tenant_id))
}
