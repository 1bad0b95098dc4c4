// File: report.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use chrono::{DateTime, Local};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Result, Write};
use std::time::Duration;

use crate::attack::{AttackOutcome, AttackPlan, SyncTimings};

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub index: usize,
    pub method: String,
    pub url: String,
    pub stream_id: Option<u64>,
    pub status: Option<u16>,
    pub content_length: Option<u64>,
    pub body_length: usize,
    pub body_sha256: Option<String>,
    pub uncompressed: bool,
    /// Set when the status arrived but the body did not read cleanly.
    pub body_error: Option<String>,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimingReport {
    pub head_phase_ms: f64,
    pub sleep_ms: f64,
    pub tail_phase_ms: f64,
    pub tail_spread_us: f64,
}

impl From<&SyncTimings> for TimingReport {
    fn from(timings: &SyncTimings) -> Self {
        Self {
            head_phase_ms: millis(timings.head_phase),
            sleep_ms: millis(timings.sleep),
            tail_phase_ms: millis(timings.tail_phase),
            tail_spread_us: timings.tail_spread.as_secs_f64() * 1_000_000.0,
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceReport {
    pub mode: String,
    pub generated_at: DateTime<Local>,
    pub tail_bytes: usize,
    pub sync_delay_ms: u128,
    pub timings: TimingReport,
    pub status_counts: BTreeMap<String, usize>,
    pub distinct_bodies: usize,
    pub entries: Vec<ReportEntry>,
}

impl RaceReport {
    /// Summarizes `outcome`. Bodies must already be filled to show up in the
    /// digests.
    pub fn from_outcome(plan: &AttackPlan, outcome: &AttackOutcome, baseline: bool) -> Self {
        let mut entries = Vec::with_capacity(plan.requests().len());
        for (index, req) in plan.requests().iter().enumerate() {
            let mut entry = ReportEntry {
                index,
                method: req.method().to_string(),
                url: req.url().to_string(),
                stream_id: None,
                status: None,
                content_length: None,
                body_length: 0,
                body_sha256: None,
                uncompressed: false,
                body_error: None,
                failure: None,
            };
            if let Some(response) = outcome.responses.get(&index) {
                let body = response.body().buffered();
                entry.stream_id = Some(response.stream_id());
                entry.status = Some(response.status().as_u16());
                entry.content_length = response.content_length();
                entry.body_length = body.len();
                entry.uncompressed = response.is_uncompressed();
                match response.body_error() {
                    Some(e) => entry.body_error = Some(e.to_string()),
                    None => entry.body_sha256 = Some(body_digest(body)),
                }
            } else if let Some(failure) = outcome.failures.get(&index) {
                entry.stream_id = failure.stream_id;
                entry.failure = Some(format!("{}: {}", failure.stage, failure.error));
            }
            entries.push(entry);
        }

        let mut status_counts = BTreeMap::new();
        for entry in &entries {
            let key = match entry.status {
                Some(code) => code.to_string(),
                None => "failed".to_string(),
            };
            *status_counts.entry(key).or_insert(0) += 1;
        }
        let mut digests: Vec<&String> = entries
            .iter()
            .filter_map(|e| e.body_sha256.as_ref())
            .collect();
        digests.sort();
        digests.dedup();

        Self {
            mode: if baseline { "baseline" } else { "race" }.to_string(),
            generated_at: Local::now(),
            tail_bytes: plan.tail_bytes(),
            sync_delay_ms: plan.sync_delay().as_millis(),
            timings: TimingReport::from(&outcome.timings),
            status_counts,
            distinct_bodies: digests.len(),
            entries,
        }
    }
}

pub fn body_digest(body: &[u8]) -> String {
    Sha256::digest(body)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format: {}", other)),
        }
    }
}

pub struct ReportGenerator;

impl ReportGenerator {
    pub fn generate_report(report: &RaceReport, output_path: &str, format: ReportFormat) -> Result<()> {
        let content = Self::render(report, format)?;
        let mut file = File::create(output_path)?;
        writeln!(file, "{}", content)?;
        Ok(())
    }

    pub fn render(report: &RaceReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(Self::render_text(report)),
            ReportFormat::Json => serde_json::to_string_pretty(report)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }

    pub fn render_text(report: &RaceReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "h3race {} report", report.mode);
        let _ = writeln!(out, "Date: {}", report.generated_at.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(
            out,
            "Requests: {}  tail bytes: {}  sync delay: {}ms",
            report.entries.len(),
            report.tail_bytes,
            report.sync_delay_ms
        );
        let t = &report.timings;
        let _ = writeln!(
            out,
            "Heads: {:.2}ms  sleep: {:.2}ms  tails: {:.2}ms  tail spread: {:.1}us",
            t.head_phase_ms, t.sleep_ms, t.tail_phase_ms, t.tail_spread_us
        );
        let _ = writeln!(out);

        for entry in &report.entries {
            let stream = entry
                .stream_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            match (&entry.status, &entry.failure) {
                (Some(status), _) => {
                    let detail = match (&entry.body_error, &entry.body_sha256) {
                        (Some(e), _) => format!("body error: {}", e),
                        (None, Some(digest)) => {
                            format!("sha256:{}", &digest[..digest.len().min(16)])
                        }
                        (None, None) => String::new(),
                    };
                    let _ = writeln!(
                        out,
                        "#{:<3} stream {:<5} HTTP {}  {} bytes{}  {}",
                        entry.index,
                        stream,
                        status,
                        entry.body_length,
                        if entry.uncompressed { " (gunzipped)" } else { "" },
                        detail
                    );
                }
                (None, Some(failure)) => {
                    let _ = writeln!(
                        out,
                        "#{:<3} stream {:<5} FAILED {}",
                        entry.index, stream, failure
                    );
                }
                (None, None) => {
                    let _ = writeln!(out, "#{:<3} stream {:<5} no result", entry.index, stream);
                }
            }
        }

        let _ = writeln!(out);
        let counts: Vec<String> = report
            .status_counts
            .iter()
            .map(|(status, count)| format!("{} x{}", status, count))
            .collect();
        let _ = writeln!(out, "Status summary: {}", counts.join(", "));
        let _ = write!(out, "Distinct bodies: {}", report.distinct_bodies);
        out
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
