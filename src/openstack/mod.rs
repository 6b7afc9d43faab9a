//! OpenStack API interaction module
//!
//! This module provides the concrete [`CloudProvider`](crate::resource::CloudProvider)
//! used by the binary: Keystone authentication, service catalog lookup,
//! paginated listing and per-project session rebinding.
//!
//! # Module Structure
//!
//! - [`auth`] - Keystone v3 token issuance and the service catalog
//! - [`client`] - Authenticated client and the run-scoped provider
//! - [`http`] - HTTP utilities for REST API calls
//! - [`pager`] - Walking paginated list responses
//! - [`projects`] - Project listing
//!
//! # Example
//!
//! ```ignore
//! use osacct::openstack::client::OpenStackProvider;
//!
//! async fn example(auth: AuthOptions) -> anyhow::Result<()> {
//!     let provider = OpenStackProvider::connect("https://keystone:5000/v3", auth, Default::default()).await?;
//!     let projects = provider.list_projects().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod pager;
pub mod projects;

pub use auth::{AuthOptions, EndpointOptions, Interface};
pub use client::{OpenStackClient, OpenStackProvider};
