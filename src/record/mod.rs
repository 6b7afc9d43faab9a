//! Accounting records
//!
//! Flat, serializable structs sent to the collector, one per billable unit.
//! Builders are pure functions of a raw item, the identity maps, the
//! configured labels and the instant the record is taken, so they can be
//! tested without a clock.

pub mod gpu;
pub mod ip;
pub mod network;
pub mod storage;
pub mod vm;

use serde::Serialize;

pub use gpu::GpuRecord;
pub use network::IpRecord;
pub use storage::{StorageLabels, StorageRecord};
pub use vm::VmRecord;

/// Any record the preparer can send
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AccountingRecord {
    Vm(VmRecord),
    Ip(IpRecord),
    Storage(StorageRecord),
    Gpu(GpuRecord),
}

impl AccountingRecord {
    /// Identifier used in log lines
    pub fn id(&self) -> String {
        match self {
            Self::Vm(r) => r.vm_uuid.clone(),
            Self::Ip(r) => format!("{}/{}", r.local_user, r.ip_type),
            Self::Storage(r) => r.record_id.to_string(),
            Self::Gpu(r) => r.associated_record.clone(),
        }
    }
}

/// Site labels stamped on VM, network and GPU records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordLabels {
    pub site_name: String,
    pub cloud_type: String,
    pub cloud_compute_service: Option<String>,
}

/// `None` for an empty string
pub(crate) fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
