//! GPU records
//!
//! Accelerators are accounted per calendar month: the available duration
//! counts from the later of the server's creation and the first instant of
//! the current UTC month.

use super::non_empty;
use crate::resource::{ExtraSpecs, Project, Server};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;

pub const SPEC_COUNT: &str = "Accelerator:Number";
pub const SPEC_CORES: &str = "hw:cpu_cores";
pub const SPEC_TYPE: &str = "Accelerator:Type";
pub const SPEC_MODEL: &str = "Accelerator:Model";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuRecord {
    pub measurement_month: u32,
    pub measurement_year: i32,
    pub associated_record_type: String,
    pub associated_record: String,
    pub global_user_name: Option<String>,
    pub fqan: String,
    pub site_name: String,
    pub count: f32,
    pub cores: Option<u32>,
    pub active_duration: Option<u64>,
    pub available_duration: u64,
    #[serde(rename = "type")]
    pub gpu_type: String,
    pub model: Option<String>,
}

/// First instant of the month `now` falls in, UTC
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

fn parse_spec(specs: &ExtraSpecs, key: &str, server_id: &str) -> Option<f64> {
    let raw = specs.get(key)?;
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            tracing::error!(id = server_id, key, value = %raw, "error parsing accelerator extra spec");
            None
        }
    }
}

/// `count * score` when it is a whole non-negative number
fn whole_cores(count: f64, score: f64) -> Option<u32> {
    let cores = count * score;
    (cores >= 0.0 && cores.fract() == 0.0 && cores <= f64::from(u32::MAX)).then_some(cores as u32)
}

pub fn build(
    project: &Project,
    server: &Server,
    extra_specs: &ExtraSpecs,
    users: &HashMap<String, String>,
    site_name: &str,
    now: DateTime<Utc>,
) -> GpuRecord {
    let accounted_from = server.created.max(month_start(now));
    let available = (now - accounted_from).num_seconds().max(0) as u64;

    let count = parse_spec(extra_specs, SPEC_COUNT, &server.id);
    let score = parse_spec(extra_specs, SPEC_CORES, &server.id);
    let cores = count.zip(score).and_then(|(c, s)| whole_cores(c, s));

    GpuRecord {
        measurement_month: now.month(),
        measurement_year: now.year(),
        associated_record_type: "cloud".to_string(),
        associated_record: server.id.clone(),
        global_user_name: users.get(&server.user_id).and_then(|name| non_empty(name)),
        fqan: project.name.clone(),
        site_name: site_name.to_string(),
        count: count.unwrap_or(0.0) as f32,
        cores,
        active_duration: Some(available),
        available_duration: available,
        gpu_type: extra_specs.get(SPEC_TYPE).cloned().unwrap_or_default(),
        model: extra_specs.get(SPEC_MODEL).and_then(|m| non_empty(m)),
    }
}
