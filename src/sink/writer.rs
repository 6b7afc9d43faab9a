//! Rate-limited sink writer
//!
//! Owns the session state of one domain run. The stream is opened and the
//! identifier sent lazily, on the first record, so a run without records
//! never touches the sink.

use super::{RateLimiter, RecordSink, SinkError};
use crate::record::AccountingRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct SinkWriter {
    sink: Arc<dyn RecordSink>,
    limiter: Arc<RateLimiter>,
    identifier: String,
    opened: OnceCell<()>,
    identified: OnceCell<()>,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl SinkWriter {
    pub fn new(sink: Arc<dyn RecordSink>, limiter: Arc<RateLimiter>, identifier: impl Into<String>) -> Self {
        Self {
            sink,
            limiter,
            identifier: identifier.into(),
            opened: OnceCell::new(),
            identified: OnceCell::new(),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Open the stream and send the identifier, once.
    ///
    /// Concurrent callers wait for the one in progress. A failed attempt
    /// leaves the cell empty so the next caller tries again.
    pub async fn ensure_started(&self) -> Result<(), SinkError> {
        self.identified
            .get_or_try_init(|| async {
                self.opened.get_or_try_init(|| self.sink.open()).await?;
                self.limiter.acquire().await;
                self.sink.send_identifier(&self.identifier).await?;
                tracing::debug!(identifier = %self.identifier, "identifier sent");
                Ok::<(), SinkError>(())
            })
            .await
            .map(|_| ())
    }

    /// Whether the identifier went out, which is what obliges a finish
    pub fn is_started(&self) -> bool {
        self.identified.initialized()
    }

    pub async fn send(&self, record: &AccountingRecord) -> Result<(), SinkError> {
        self.limiter.acquire().await;
        match self.sink.send(record).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Close the session and wait for the acknowledgment
    pub async fn finish(&self) -> Result<(), SinkError> {
        if !self.is_started() {
            return Ok(());
        }
        self.sink.finish().await
    }

    pub fn records_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
