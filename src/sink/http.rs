//! HTTP streaming sink
//!
//! The whole session is a single chunked `POST` whose body is fed from a
//! channel, one JSON line per frame. Dropping the sender ends the body; the
//! response to the request is the acknowledgment.

use super::{Frame, RecordSink, SinkError};
use crate::record::AccountingRecord;
use async_trait::async_trait;
use reqwest::{Body, Client, Response};
use std::io;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use url::Url;

const NDJSON: &str = "application/x-ndjson";

/// Frames buffered between the writer and the request body
const BODY_BUFFER: usize = 16;

struct OpenStream {
    tx: mpsc::Sender<Result<Vec<u8>, io::Error>>,
    response: JoinHandle<reqwest::Result<Response>>,
}

pub struct HttpStreamSink {
    client: Client,
    url: Url,
    stream: Mutex<Option<OpenStream>>,
}

impl HttpStreamSink {
    /// Sink posting to `{endpoint}/v1/{collection}`
    pub fn new(client: Client, endpoint: &str, collection: &str) -> Result<Self, SinkError> {
        let base = format!("{}/", endpoint.trim_end_matches('/'));
        let url = Url::parse(&base)
            .and_then(|base| base.join(&format!("v1/{}", collection)))
            .map_err(|e| SinkError::Open(format!("invalid collector endpoint {}: {}", endpoint, e)))?;

        Ok(Self {
            client,
            url,
            stream: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn write_line(&self, line: Vec<u8>) -> Result<(), SinkError> {
        let guard = self.stream.lock().await;
        let stream = guard.as_ref().ok_or(SinkError::NotOpen)?;
        stream
            .tx
            .send(Ok(line))
            .await
            .map_err(|_| SinkError::Send("collector closed the stream".into()))
    }
}

#[async_trait]
impl RecordSink for HttpStreamSink {
    async fn open(&self) -> Result<(), SinkError> {
        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel::<Result<Vec<u8>, io::Error>>(BODY_BUFFER);
        let body = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });

        let request = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, NDJSON)
            .body(Body::wrap_stream(body));

        tracing::debug!(url = %self.url, "opening record stream");
        let response = tokio::spawn(async move { request.send().await });

        *guard = Some(OpenStream { tx, response });
        Ok(())
    }

    async fn send_identifier(&self, identifier: &str) -> Result<(), SinkError> {
        self.write_line(Frame::Identifier(identifier).to_line()?).await
    }

    async fn send(&self, record: &AccountingRecord) -> Result<(), SinkError> {
        self.write_line(Frame::Record(record).to_line()?).await
    }

    async fn finish(&self) -> Result<(), SinkError> {
        let OpenStream { tx, response } = self.stream.lock().await.take().ok_or(SinkError::NotOpen)?;
        drop(tx);

        let response = response
            .await
            .map_err(|e| SinkError::Finish(e.to_string()))?
            .map_err(|e| SinkError::Finish(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(url = %self.url, %status, "record stream acknowledged");
        Ok(())
    }
}
