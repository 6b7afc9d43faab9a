//! Resource abstraction layer
//!
//! This module describes what the pipeline moves around: the data pulled
//! out of the cloud and the seams through which it is pulled.
//!
//! # Architecture
//!
//! - [`model`] - Plain data types deserialized from API responses
//! - [`provider`] - The [`CloudProvider`]/[`ProjectSession`] traits the
//!   pipeline is written against
//! - [`reader`] - Retrying readers wrapping every remote call
//!
//! # Raw items
//!
//! Collectors emit [`RawResourceItem`]s. Each variant is self-contained: it
//! carries the owning project or the resolved flavor so later stages never
//! need to call back into the cloud.

pub mod model;
pub mod provider;
pub mod reader;

use chrono::{DateTime, Utc};

pub use model::{
    ExtraSpecs, Flavor, FloatingIp, Image, Project, Server, Share, SwiftContainer, User, Volume,
};
pub use provider::{CloudProvider, ProjectSession};
pub use reader::{RetryPolicy, RunReader, ScopedReader};

/// A storage object owned by a project
#[derive(Debug, Clone)]
pub enum StorageObject {
    Image(Image),
    Share(Share),
    Volume(Volume),
    Container(SwiftContainer),
}

impl StorageObject {
    /// Short kind label, also used as the record's storage share
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Share(_) => "share",
            Self::Volume(_) => "volume",
            Self::Container(_) => "swift",
        }
    }

    /// Identifier used in log lines
    pub fn id(&self) -> &str {
        match self {
            Self::Image(i) => &i.id,
            Self::Share(s) => &s.id,
            Self::Volume(v) => &v.id,
            Self::Container(c) => &c.name,
        }
    }

    /// When the object was created; swift does not report it
    pub fn created(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Image(i) => Some(i.created_at),
            Self::Share(s) => Some(s.created_at),
            Self::Volume(v) => Some(v.created_at),
            Self::Container(_) => None,
        }
    }
}

/// One unit of work flowing from the collector to the preparer
#[derive(Debug, Clone)]
pub enum RawResourceItem {
    /// A server with its flavor, when the flavor could be resolved
    ServerFlavor {
        server: Server,
        flavor: Option<Flavor>,
    },
    /// An accelerator-backed server with its flavor extra specs
    Gpu {
        project: Project,
        server: Server,
        extra_specs: ExtraSpecs,
    },
    /// All floating IPs held by one project
    NetUser {
        project: Project,
        floating_ips: Vec<FloatingIp>,
    },
    /// One storage object
    Storage {
        project: Project,
        object: StorageObject,
    },
}

impl RawResourceItem {
    /// Identifier used in log lines
    pub fn id(&self) -> &str {
        match self {
            Self::ServerFlavor { server, .. } | Self::Gpu { server, .. } => &server.id,
            Self::NetUser { project, .. } => &project.id,
            Self::Storage { object, .. } => object.id(),
        }
    }

    /// Creation instant checked against the records window.
    ///
    /// Only VM servers are windowed; GPU usage is accounted per calendar
    /// month and network/storage records are point-in-time snapshots.
    pub fn window_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::ServerFlavor { server, .. } => Some(server.created),
            Self::Gpu { .. } | Self::NetUser { .. } | Self::Storage { .. } => None,
        }
    }
}
