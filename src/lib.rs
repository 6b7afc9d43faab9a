//! osacct - accounting client for OpenStack
//!
//! Extracts billable usage (servers, floating IPs, storage objects, GPU
//! servers) from every accounted project and streams it to a collector,
//! one session per record domain.

pub mod config;
pub mod openstack;
pub mod pipeline;
pub mod record;
pub mod resource;
pub mod sink;

/// Version reported by `--version` and in the HTTP user agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
