// File: cli.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use clap::Parser;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::AttackConfig;
use crate::error::{RaceError, RaceResult};
use crate::report::ReportFormat;
use crate::request::Request;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[arg(short = 'u', long = "url", help = "Target URL (https://host[:port]/path)")]
    pub url: Option<String>,

    #[arg(short = 'X', long = "method", default_value = "POST")]
    pub method: String,

    #[arg(
        short = 'H',
        long = "header",
        help = "Request header as 'Name: value', repeatable"
    )]
    pub headers: Vec<String>,

    #[arg(short = 'd', long = "data", conflicts_with = "data_file")]
    pub data: Option<String>,

    #[arg(long = "data-file", help = "Read the request body from a file")]
    pub data_file: Option<PathBuf>,

    #[arg(
        long = "requests-file",
        conflicts_with = "url",
        help = "JSON array of {url, method, headers, body} requests"
    )]
    pub requests_file: Option<PathBuf>,

    #[arg(short = 'n', long = "count", default_value_t = 2, help = "Copies of the request")]
    pub count: usize,

    #[arg(long = "tail-bytes", default_value_t = 1, help = "Body bytes withheld per request")]
    pub tail_bytes: usize,

    #[arg(long = "sync-delay", default_value_t = 100, help = "Pause before the release in ms")]
    pub sync_delay: u64,

    #[arg(
        long = "read-timeout",
        default_value_t = 10000,
        help = "Per-stream response deadline in ms, 0 waits forever"
    )]
    pub read_timeout: u64,

    #[arg(long = "connect-timeout", default_value_t = 5000)]
    pub connect_timeout: u64,

    #[arg(long = "concurrent-tails", help = "Flush tails concurrently instead of in order")]
    pub concurrent_tails: bool,

    #[arg(long = "no-gzip", help = "Do not ask for gzip responses")]
    pub no_gzip: bool,

    #[arg(long = "user-agent")]
    pub user_agent: Option<String>,

    #[arg(long = "insecure", short = 'k', help = "Skip certificate verification")]
    pub insecure: bool,

    #[arg(long = "baseline", help = "Also send the requests unsplit for comparison")]
    pub baseline: bool,

    #[arg(long = "format", default_value = "text")]
    pub format: ReportFormat,

    #[arg(short = 'o', long = "output", help = "Write the report to a file")]
    pub output: Option<PathBuf>,

    #[arg(long = "log-level", default_value = "warn")]
    pub log_level: String,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long = "no-color", help = "Disable colored output")]
    pub no_color: bool,
}

/// One entry of a `--requests-file`.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEntry {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

fn default_method() -> String {
    "POST".to_string()
}

impl RequestEntry {
    pub fn build(&self) -> RaceResult<Request> {
        let mut req = Request::new(&self.method, &self.url)?;
        for (name, value) in &self.headers {
            req = req.with_header(name, value)?;
        }
        Ok(req.with_body(self.body.as_bytes()))
    }
}

pub fn parse_requests_file(content: &str) -> RaceResult<Vec<Request>> {
    let entries: Vec<RequestEntry> = serde_json::from_str(content)
        .map_err(|e| RaceError::InvalidRequest(format!("requests file: {}", e)))?;
    entries.iter().map(RequestEntry::build).collect()
}

/// Splits `Name: value` at the first colon.
pub fn parse_header_arg(raw: &str) -> RaceResult<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| RaceError::InvalidRequest(format!("header {:?} has no ':'", raw)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(RaceError::InvalidRequest(format!(
            "header {:?} has an empty name",
            raw
        )));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl Cli {
    /// Builds the request list: the requests file, or `count` copies of the
    /// request described by the flags. `body` is the already loaded body.
    pub fn build_requests(&self, body: Option<Vec<u8>>) -> RaceResult<Vec<Request>> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| RaceError::InvalidRequest("--url or --requests-file is required".to_string()))?;
        let mut req = Request::new(&self.method, url)?;
        for raw in &self.headers {
            let (name, value) = parse_header_arg(raw)?;
            req = req.append_header(&name, &value)?;
        }
        if let Some(body) = body.or_else(|| self.data.as_ref().map(|d| d.as_bytes().to_vec())) {
            req = req.with_body(body);
        }
        Ok(vec![req; self.count])
    }

    pub fn attack_config(&self) -> AttackConfig {
        let mut config = AttackConfig::new();
        config.set_tail_bytes(self.tail_bytes);
        config.set_sync_delay(Duration::from_millis(self.sync_delay));
        config.set_read_timeout(match self.read_timeout {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        });
        config.set_connect_timeout(Duration::from_millis(self.connect_timeout));
        config.set_request_gzip(!self.no_gzip);
        config.set_concurrent_tails(self.concurrent_tails);
        config.set_insecure(self.insecure);
        if let Some(user_agent) = &self.user_agent {
            config.set_user_agent(user_agent.clone());
        }
        config
    }
}
