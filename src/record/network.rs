//! Public IP records

use super::{ip, RecordLabels};
use crate::resource::{FloatingIp, Project};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const IPV4: &str = "IPv4";
pub const IPV6: &str = "IPv6";

/// Number of public addresses of one family held by a project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpRecord {
    pub measurement_time: DateTime<Utc>,
    pub site_name: String,
    pub cloud_compute_service: Option<String>,
    pub cloud_type: String,
    pub local_user: String,
    pub local_group: String,
    pub global_user_name: String,
    pub fqan: String,
    pub ip_type: String,
    pub ip_count: u32,
}

/// One record per family with at least one public address
pub fn build(
    project: &Project,
    floating_ips: &[FloatingIp],
    labels: &RecordLabels,
    now: DateTime<Utc>,
) -> Vec<IpRecord> {
    let counts = ip::count_public(floating_ips.iter().map(|f| f.ip.as_str()));

    [(IPV4, counts.ipv4), (IPV6, counts.ipv6)]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(ip_type, ip_count)| IpRecord {
            measurement_time: now,
            site_name: labels.site_name.clone(),
            cloud_compute_service: labels.cloud_compute_service.clone(),
            cloud_type: labels.cloud_type.clone(),
            local_user: project.id.clone(),
            local_group: project.domain_id.clone(),
            global_user_name: project.name.clone(),
            fqan: format!("/{}/Role=NULL/Capability=NULL", project.domain_id),
            ip_type: ip_type.to_string(),
            ip_count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fip(ip: &str) -> FloatingIp {
        FloatingIp {
            id: format!("fip-{ip}"),
            ip: ip.to_string(),
            pool: Some("public".into()),
            instance_id: None,
        }
    }

    fn project() -> Project {
        Project {
            id: "p-1".into(),
            name: "astro".into(),
            domain_id: "d-1".into(),
            tags: vec![],
        }
    }

    #[test]
    fn test_mixed_addresses_yield_single_ipv4_record() {
        let ips = vec![fip("10.0.0.1"), fip("8.8.8.8"), fip("::1")];
        let records = build(&project(), &ips, &RecordLabels::default(), Utc::now());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ip_type, IPV4);
        assert_eq!(records[0].ip_count, 1);
        assert_eq!(records[0].fqan, "/d-1/Role=NULL/Capability=NULL");
    }

    #[test]
    fn test_both_families() {
        let ips = vec![fip("147.251.9.9"), fip("2001:718:1::5"), fip("2001:718:1::6")];
        let records = build(&project(), &ips, &RecordLabels::default(), Utc::now());

        let v6 = records.iter().find(|r| r.ip_type == IPV6).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(v6.ip_count, 2);
    }

    #[test]
    fn test_no_public_addresses_no_records() {
        let records = build(&project(), &[fip("192.168.0.1")], &RecordLabels::default(), Utc::now());
        assert!(records.is_empty());
    }
}
