//! Accounting pipeline
//!
//! One [`Pipeline`] run per record domain:
//!
//! ```text
//! enumerate -> collect (per project) -> window filter (per item) -> prepare (per item) -> sink
//!                                                                      ^
//!                                                   identity resolver -'
//! ```
//!
//! Stages are connected by capacity-1 channels and each closes its output
//! only after all of its workers are done, so the end of the preparer's
//! input means every project has been fully collected.

pub mod collector;
pub mod enumerator;
pub mod fanout;
pub mod identity;
pub mod preparer;
pub mod window;

use crate::config::{Config, ConfigError};
use crate::resource::{CloudProvider, RetryPolicy, RunReader};
use crate::sink::{RateLimiter, RecordSink, SinkError, SinkWriter};
use chrono::Utc;
use collector::{CollectKind, Collector};
use enumerator::TagFilter;
use preparer::{Preparer, RecordBuilder};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use window::{Window, WindowError};

/// Stage channels hand over one item at a time
const STAGE_CHANNEL_CAPACITY: usize = 1;

/// A record domain, each with its own sink session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Vm,
    Network,
    Storage,
    Gpu,
}

impl Domain {
    pub const ALL: [Domain; 4] = [Domain::Vm, Domain::Network, Domain::Storage, Domain::Gpu];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vm => "vm",
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Gpu => "gpu",
        }
    }

    /// Collector path segment the domain's stream is posted to
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Vm => "vms",
            Self::Network => "ips",
            Self::Storage => "storages",
            Self::Gpu => "gpus",
        }
    }

    /// Network records carry project data only
    fn needs_identity(&self) -> bool {
        !matches!(self, Self::Network)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures that abort a domain run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("project enumeration failed: {0:#}")]
    Enumeration(anyhow::Error),
    #[error("record stream was not acknowledged: {0}")]
    Finish(#[from] SinkError),
}

/// Summary logged at the end of a domain run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub domain: Domain,
    pub projects: usize,
    pub items: u64,
    pub records_sent: u64,
    pub send_failures: u64,
    pub finished: bool,
}

pub struct Pipeline {
    domain: Domain,
    config: Arc<Config>,
    provider: Arc<dyn CloudProvider>,
    sink: Arc<dyn RecordSink>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        domain: Domain,
        config: Arc<Config>,
        provider: Arc<dyn CloudProvider>,
        sink: Arc<dyn RecordSink>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            domain,
            config,
            provider,
            sink,
            limiter,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn collect_kind(&self) -> Result<CollectKind, ConfigError> {
        Ok(match self.domain {
            Domain::Vm => CollectKind::Vm,
            Domain::Network => CollectKind::Network,
            Domain::Storage => CollectKind::Storage(self.config.storage_kinds()?),
            Domain::Gpu => CollectKind::Gpu {
                flavor_marker: self.config.gpu.flavor_marker.clone(),
            },
        })
    }

    fn record_builder(&self) -> RecordBuilder {
        RecordBuilder {
            vm: self.config.vm.labels(),
            network: self.config.network.labels(),
            storage: self.config.storage_labels(),
            gpu_site_name: self.config.gpu.site_name.clone(),
        }
    }

    pub async fn run(self) -> Result<RunReport, PipelineError> {
        let domain = self.domain;
        let max_in_flight = self.config.limits.max_in_flight;

        // Everything that can be rejected up front is checked before any traffic
        let window = Window::resolve(&self.config.records, Utc::now())?;
        let kind = self.collect_kind()?;
        let tag_filter = TagFilter::from_config(&self.config.tags);
        tracing::debug!(%domain, from = %window.from, to = %window.to, "records window");

        let reader = RunReader::new(self.provider.clone(), self.policy);
        let identity = domain.needs_identity().then(|| identity::spawn(reader.clone()));

        let projects = match enumerator::list_projects(&reader, &tag_filter).await {
            Ok(projects) => projects,
            Err(e) => {
                if let Some(handle) = identity {
                    handle.abort();
                }
                return Err(PipelineError::Enumeration(e));
            }
        };
        let project_count = projects.len();

        let (project_tx, project_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let (raw_tx, raw_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let (accepted_tx, accepted_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);

        let collector = Collector {
            provider: self.provider.clone(),
            policy: self.policy,
            kind,
            max_in_flight,
        };

        let feeder = tokio::spawn(enumerator::feed(projects, project_tx));
        let collecting = tokio::spawn(collector.run(project_rx, raw_tx));
        let filtering = tokio::spawn(window::run(window, raw_rx, accepted_tx, max_in_flight));

        let writer = Arc::new(SinkWriter::new(
            self.sink.clone(),
            self.limiter.clone(),
            self.config.identifier.clone(),
        ));
        let preparer = Preparer {
            writer,
            builder: Arc::new(self.record_builder()),
            max_in_flight,
        };
        let prepared = preparer.run(identity, accepted_rx).await;

        for (stage, handle) in [("feed", feeder), ("collect", collecting), ("filter", filtering)] {
            if let Err(e) = handle.await {
                tracing::error!(%domain, stage, error = %e, "stage task failed");
            }
        }

        let prepared = prepared?;
        let report = RunReport {
            domain,
            projects: project_count,
            items: prepared.items,
            records_sent: prepared.records_sent,
            send_failures: prepared.send_failures,
            finished: prepared.finished,
        };
        tracing::info!(
            %domain,
            projects = report.projects,
            items = report.items,
            records_sent = report.records_sent,
            send_failures = report.send_failures,
            "accounting run finished"
        );
        Ok(report)
    }
}
