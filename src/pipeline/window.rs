//! Records window
//!
//! The closed interval `[from, to]` that decides whether a resource is in
//! scope, computed once per run.

use super::fanout::FanOut;
use crate::config::RecordsWindow;
use crate::resource::RawResourceItem;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("records.for_period cannot be combined with records.from or records.to")]
    Conflict,
    #[error("invalid records.for_period `{value}`: {source}")]
    InvalidPeriod {
        value: String,
        source: humantime::DurationError,
    },
    #[error("records.for_period `{0}` is out of range")]
    PeriodOutOfRange(String),
    #[error("records.from {from} is later than records.to {to}")]
    Inverted { from: DateTime<Utc>, to: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    pub fn resolve(records: &RecordsWindow, now: DateTime<Utc>) -> Result<Self, WindowError> {
        let period = records.for_period.as_deref().map(str::trim).filter(|p| !p.is_empty());

        if let Some(period) = period {
            if records.from.is_some() || records.to.is_some() {
                return Err(WindowError::Conflict);
            }
            let parsed = humantime::parse_duration(period).map_err(|source| WindowError::InvalidPeriod {
                value: period.to_string(),
                source,
            })?;
            let span = Duration::from_std(parsed).map_err(|_| WindowError::PeriodOutOfRange(period.to_string()))?;
            let from = now
                .checked_sub_signed(span)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            return Ok(Self { from, to: now });
        }

        let from = records.from.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let to = records.to.unwrap_or(now);
        if from > to {
            return Err(WindowError::Inverted { from, to });
        }
        Ok(Self { from, to })
    }

    /// Whether a resource created at `created` is in scope. The end of the
    /// resource is taken as `to`.
    pub fn accepts(&self, created: DateTime<Utc>) -> bool {
        let end = self.to;
        self.contains(created) && self.contains(end)
    }

    fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant <= self.to
    }

    /// Items without a windowed instant always pass
    pub fn admits(&self, item: &RawResourceItem) -> bool {
        item.window_instant().map_or(true, |created| self.accepts(created))
    }
}

/// Filter stage: one worker per item, output closes after the last one
pub async fn run(
    window: Window,
    mut input: mpsc::Receiver<RawResourceItem>,
    out: mpsc::Sender<RawResourceItem>,
    max_in_flight: usize,
) {
    let window = Arc::new(window);
    let mut fanout = FanOut::new("filter", max_in_flight);

    while let Some(item) = input.recv().await {
        let window = window.clone();
        let out = out.clone();
        fanout
            .spawn(async move {
                if !window.admits(&item) {
                    tracing::debug!(id = %item.id(), "outside records window");
                    return;
                }
                if out.send(item).await.is_err() {
                    tracing::warn!("preparer stopped receiving");
                }
            })
            .await;
    }

    fanout.join().await;
}
