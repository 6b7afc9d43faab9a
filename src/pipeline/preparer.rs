//! Record assembly and delivery

use super::fanout::FanOut;
use super::identity::{self, IdentityMaps};
use crate::record::{self, AccountingRecord, RecordLabels, StorageLabels};
use crate::resource::RawResourceItem;
use crate::sink::{SinkError, SinkWriter};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Labels for every record kind
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    pub vm: RecordLabels,
    pub network: RecordLabels,
    pub storage: StorageLabels,
    pub gpu_site_name: String,
}

impl RecordBuilder {
    pub fn build(&self, item: &RawResourceItem, identity: &IdentityMaps, now: DateTime<Utc>) -> Vec<AccountingRecord> {
        match item {
            RawResourceItem::ServerFlavor { server, flavor } => {
                let flavor = flavor
                    .as_ref()
                    .or_else(|| server.flavor_id().and_then(|id| identity.flavors.get(id)));
                vec![AccountingRecord::Vm(record::vm::build(
                    server,
                    flavor,
                    &identity.users,
                    &self.vm,
                    now,
                ))]
            }
            RawResourceItem::Gpu {
                project,
                server,
                extra_specs,
            } => vec![AccountingRecord::Gpu(record::gpu::build(
                project,
                server,
                extra_specs,
                &identity.users,
                &self.gpu_site_name,
                now,
            ))],
            RawResourceItem::NetUser { project, floating_ips } => {
                record::network::build(project, floating_ips, &self.network, now)
                    .into_iter()
                    .map(AccountingRecord::Ip)
                    .collect()
            }
            RawResourceItem::Storage { project, object } => vec![AccountingRecord::Storage(record::storage::build(
                project,
                object,
                &identity.users,
                &self.storage,
                now,
            ))],
        }
    }
}

/// Counters of one preparer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareReport {
    pub items: u64,
    pub records_sent: u64,
    pub send_failures: u64,
    pub finished: bool,
}

pub struct Preparer {
    pub writer: Arc<SinkWriter>,
    pub builder: Arc<RecordBuilder>,
    pub max_in_flight: usize,
}

impl Preparer {
    /// Consume accepted items until the channel closes, then finish the
    /// session if it was started. Only the finish can fail the run.
    pub async fn run(
        self,
        identity: Option<JoinHandle<IdentityMaps>>,
        mut input: mpsc::Receiver<RawResourceItem>,
    ) -> Result<PrepareReport, SinkError> {
        let maps = Arc::new(identity::wait(identity).await);
        let items = Arc::new(AtomicU64::new(0));
        let mut fanout = FanOut::new("prepare", self.max_in_flight);

        while let Some(item) = input.recv().await {
            items.fetch_add(1, Ordering::Relaxed);
            let writer = self.writer.clone();
            let builder = self.builder.clone();
            let maps = maps.clone();
            fanout
                .spawn(async move { prepare_item(&writer, &builder, &maps, item).await })
                .await;
        }

        fanout.join().await;

        let finished = self.writer.is_started();
        if finished {
            self.writer.finish().await?;
        }

        Ok(PrepareReport {
            items: items.load(Ordering::Relaxed),
            records_sent: self.writer.records_sent(),
            send_failures: self.writer.send_failures(),
            finished,
        })
    }
}

async fn prepare_item(writer: &SinkWriter, builder: &RecordBuilder, identity: &IdentityMaps, item: RawResourceItem) {
    let records = builder.build(&item, identity, Utc::now());
    if records.is_empty() {
        tracing::debug!(id = %item.id(), "item produced no records");
        return;
    }

    if let Err(e) = writer.ensure_started().await {
        tracing::error!(id = %item.id(), error = %e, "error sending identifier, dropping item");
        return;
    }

    for record in records {
        if let Err(e) = writer.send(&record).await {
            tracing::error!(id = %record.id(), error = %e, "error sending record");
        }
    }
}
