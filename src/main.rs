use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use osacct::config::Config;
use osacct::openstack::http::format_api_error;
use osacct::openstack::OpenStackProvider;
use osacct::pipeline::{Domain, Pipeline};
use osacct::resource::CloudProvider;
use osacct::sink::{HttpStreamSink, RateLimiter, RecordSink};
use osacct::VERSION;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Accounting client for OpenStack
///
/// Extracts data about virtual machines, floating IPs, storage and GPUs,
/// filters it and streams it to the collector. Without a subcommand every
/// domain is accounted.
#[derive(Parser, Debug)]
#[command(name = "osacct", version, about, long_about = None)]
struct Args {
    /// Configuration file (default: searched in ./config, /etc/osacct, ~/.osacct)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Identifier of this client instance
    #[arg(short, long, global = true)]
    identifier: Option<String>,

    /// Collector endpoint
    #[arg(short, long, global = true)]
    endpoint: Option<String>,

    /// OpenStack identity endpoint
    #[arg(short = 'o', long, global = true)]
    identity_endpoint: Option<String>,

    /// Account resources created from this time (RFC 3339)
    #[arg(short = 'f', long, global = true)]
    records_from: Option<DateTime<Utc>>,

    /// Account resources created until this time (RFC 3339)
    #[arg(short = 't', long, global = true)]
    records_to: Option<DateTime<Utc>>,

    /// Account resources created during this period before now, e.g. "30days"
    #[arg(short = 'p', long, global = true)]
    records_for_period: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Write logs to this file instead of stdout
    #[arg(long, global = true)]
    log_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Extract virtual machine data
    Vm,
    /// Extract public IP data
    Network,
    /// Extract storage data
    Storage,
    /// Extract GPU data
    Gpu,
}

impl Command {
    fn domain(self) -> Domain {
        match self {
            Command::Vm => Domain::Vm,
            Command::Network => Domain::Network,
            Command::Storage => Domain::Storage,
            Command::Gpu => Domain::Gpu,
        }
    }
}

impl Args {
    /// Command-line values win over the configuration file
    fn apply(&self, config: &mut Config) {
        if let Some(ref identifier) = self.identifier {
            config.identifier = identifier.clone();
        }
        if let Some(ref endpoint) = self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(ref identity_endpoint) = self.identity_endpoint {
            config.identity_endpoint = identity_endpoint.clone();
        }
        if self.records_from.is_some() {
            config.records.from = self.records_from;
        }
        if self.records_to.is_some() {
            config.records.to = self.records_to;
        }
        if self.records_for_period.is_some() {
            config.records.for_period = self.records_for_period.clone();
        }
        if self.debug {
            config.debug = true;
        }
        if self.log_path.is_some() {
            config.log_path = self.log_path.clone();
        }
    }

    fn domains(&self) -> Vec<Domain> {
        match self.command {
            Some(command) => vec![command.domain()],
            None => Domain::ALL.to_vec(),
        }
    }
}

fn setup_logging(debug: bool, log_path: Option<&Path>) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some(log_path) = log_path else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    Ok(Some(guard))
}

/// Returns whether every domain run succeeded
async fn run(args: Args) -> Result<bool> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    let _log_guard = setup_logging(config.debug, config.log_path.as_deref())?;
    tracing::info!(version = VERSION, "osacct started");
    if config.debug {
        config.log_effective();
    }

    let domains = args.domains();
    config.validate(&domains)?;
    let config = Arc::new(config);

    let provider = OpenStackProvider::connect(
        &config.identity_endpoint,
        config.auth.clone(),
        config.endpoint_options.clone(),
    )
    .await
    .inspect_err(|e| tracing::error!(error = %format_api_error(e), "error authenticating"))?;
    let provider: Arc<dyn CloudProvider> = Arc::new(provider);

    let limiter = Arc::new(RateLimiter::new(config.limits.requests_per_second));
    // No overall timeout: a stream lives as long as its domain run
    let sink_client = reqwest::Client::builder()
        .user_agent(concat!("osacct/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create collector HTTP client")?;

    let runs = domains.iter().map(|&domain| {
        let config = config.clone();
        let provider = provider.clone();
        let limiter = limiter.clone();
        let sink_client = sink_client.clone();
        async move {
            let sink: Arc<dyn RecordSink> =
                Arc::new(HttpStreamSink::new(sink_client, &config.endpoint, domain.collection())?);
            let report = Pipeline::new(domain, config, provider, sink, limiter).run().await?;
            anyhow::Ok(report)
        }
    });

    let mut all_ok = true;
    for (domain, result) in domains.iter().zip(join_all(runs).await) {
        if let Err(e) = result {
            tracing::error!(%domain, error = %format!("{e:#}"), "accounting run failed");
            all_ok = false;
        }
    }
    Ok(all_ok)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal error");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
