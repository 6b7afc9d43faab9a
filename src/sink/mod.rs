//! Record sink
//!
//! A sink session is one client-streaming call: an identifier frame, any
//! number of record frames, then a half-close answered by exactly one
//! acknowledgment.
//!
//! - [`limiter`] - Token bucket shared by every domain
//! - [`writer`] - Session bookkeeping and pacing in front of a sink
//! - [`http`] - NDJSON over one chunked HTTP request

pub mod http;
pub mod limiter;
pub mod writer;

use crate::record::AccountingRecord;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use self::http::HttpStreamSink;
pub use limiter::RateLimiter;
pub use writer::SinkWriter;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open stream: {0}")]
    Open(String),
    #[error("stream is not open")]
    NotOpen,
    #[error("failed to send frame: {0}")]
    Send(String),
    #[error("failed to close stream: {0}")]
    Finish(String),
    #[error("collector rejected the stream: {status} {body}")]
    Rejected { status: u16, body: String },
}

/// One outbound message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Frame<'a> {
    Identifier(&'a str),
    Record(&'a AccountingRecord),
}

impl Frame<'_> {
    /// Newline-terminated JSON
    pub fn to_line(&self) -> Result<Vec<u8>, SinkError> {
        let mut line = serde_json::to_vec(self).map_err(|e| SinkError::Send(e.to_string()))?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Destination of one domain's records
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Establish the streaming session
    async fn open(&self) -> Result<(), SinkError>;

    /// Send the frame naming the reporting client
    async fn send_identifier(&self, identifier: &str) -> Result<(), SinkError>;

    async fn send(&self, record: &AccountingRecord) -> Result<(), SinkError>;

    /// Half-close and wait for the acknowledgment
    async fn finish(&self) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::IpRecord;
    use chrono::Utc;

    #[test]
    fn test_identifier_frame_line() {
        let line = Frame::Identifier("osacct-brno").to_line().unwrap();
        assert_eq!(line, b"{\"identifier\":\"osacct-brno\"}\n");
    }

    #[test]
    fn test_record_frame_wraps_record() {
        let record = AccountingRecord::Ip(IpRecord {
            measurement_time: Utc::now(),
            site_name: "site".into(),
            cloud_compute_service: None,
            cloud_type: "OpenStack".into(),
            local_user: "p".into(),
            local_group: "d".into(),
            global_user_name: "n".into(),
            fqan: "/d/Role=NULL/Capability=NULL".into(),
            ip_type: "IPv4".into(),
            ip_count: 3,
        });
        let line = Frame::Record(&record).to_line().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&line).unwrap();

        assert_eq!(value["record"]["ip_count"], 3);
        assert_eq!(value["record"]["ip_type"], "IPv4");
    }
}
