// File: main.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use colored::*;
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use h3race::attack::{AttackOrchestrator, AttackPlan};
use h3race::cli::{parse_requests_file, Cli};
use h3race::report::{RaceReport, ReportEntry, ReportGenerator};
use h3race::request::Request;
use h3race::transport::quic::{QuicConnection, QuicOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    if cli.no_color {
        colored::control::set_override(false);
    }

    let requests = load_requests(&cli)?;
    let config = cli.attack_config();
    let plan = AttackPlan::from_config(requests, &config);
    let target = plan
        .requests()
        .first()
        .map(|req| req.url().clone())
        .ok_or_else(|| anyhow!("Nothing to send: request count is 0"))?;
    if plan
        .requests()
        .iter()
        .any(|req| req.url().host_str() != target.host_str() || req.url().port() != target.port())
    {
        warn!("Requests target several origins; all are sent to {}", target);
    }

    let options = QuicOptions {
        connect_timeout: config.connect_timeout(),
        insecure: config.insecure(),
    };
    let connection = Arc::new(
        QuicConnection::connect(&target, &options)
            .await
            .with_context(|| format!("Could not establish HTTP/3 connection to {}", target))?,
    );
    info!("Connected to {}", connection.remote_address());

    let orchestrator = AttackOrchestrator::new(connection.clone(), &config);
    let mut reports = Vec::new();

    let outcome = orchestrator.run(&plan).await?;
    reports.push(RaceReport::from_outcome(&plan, &outcome, false));

    if cli.baseline {
        let outcome = orchestrator.run_baseline(&plan).await?;
        reports.push(RaceReport::from_outcome(&plan, &outcome, true));
    }

    for report in &reports {
        print_summary(report);
    }

    if let Some(output) = &cli.output {
        for report in &reports {
            let path = report_path(output, &report.mode);
            ReportGenerator::generate_report(report, &path.to_string_lossy(), cli.format)
                .with_context(|| format!("Could not write report to {}", path.display()))?;
            println!("Report written to {}", path.display().to_string().cyan());
        }
    }

    drop(orchestrator);
    if let Ok(connection) = Arc::try_unwrap(connection) {
        connection.close().await;
    }
    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::from_str(&cli.log_level)
            .map_err(|_| anyhow!("Invalid log level: {}", cli.log_level))?
    };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("Could not initialize logger")?;
    Ok(())
}

fn load_requests(cli: &Cli) -> Result<Vec<Request>> {
    if let Some(path) = &cli.requests_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let requests = parse_requests_file(&content)?;
        if requests.is_empty() {
            bail!("{} contains no requests", path.display());
        }
        return Ok(requests);
    }

    let body = match &cli.data_file {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("Could not read {}", path.display()))?,
        ),
        None => None,
    };
    Ok(cli.build_requests(body)?)
}

/// The race report goes to `output`; a baseline report gets `.baseline` in
/// front of the extension.
fn report_path(output: &Path, mode: &str) -> PathBuf {
    if mode != "baseline" {
        return output.to_path_buf();
    }
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "report".to_string());
    let name = match output.extension() {
        Some(ext) => format!("{}.baseline.{}", stem, ext.to_string_lossy()),
        None => format!("{}.baseline", stem),
    };
    output.with_file_name(name)
}

fn status_label(entry: &ReportEntry) -> ColoredString {
    match entry.status {
        Some(code @ 200..=299) => code.to_string().green(),
        Some(code @ 300..=499) => code.to_string().yellow(),
        Some(code) => code.to_string().red(),
        None => "FAILED".red().bold(),
    }
}

fn print_summary(report: &RaceReport) {
    println!();
    println!(
        "{} {} requests, {} byte tails, {}ms delay",
        format!("[{}]", report.mode).bold(),
        report.entries.len(),
        report.tail_bytes,
        report.sync_delay_ms
    );
    let t = &report.timings;
    println!(
        "  heads {:.2}ms | sleep {:.2}ms | tails {:.2}ms | spread {}",
        t.head_phase_ms,
        t.sleep_ms,
        t.tail_phase_ms,
        format!("{:.1}us", t.tail_spread_us).cyan()
    );

    for entry in &report.entries {
        let detail = match (&entry.failure, &entry.body_sha256) {
            (Some(failure), _) => failure.red().to_string(),
            (None, None) if entry.body_error.is_some() => format!(
                "{} bytes  {}",
                entry.body_length,
                entry.body_error.as_deref().unwrap_or_default().yellow()
            ),
            (None, Some(digest)) => format!(
                "{} bytes  sha256:{}",
                entry.body_length,
                &digest[..digest.len().min(16)]
            ),
            (None, None) => String::new(),
        };
        println!("  #{:<3} {:>6}  {}", entry.index, status_label(entry), detail);
    }

    let counts: Vec<String> = report
        .status_counts
        .iter()
        .map(|(status, count)| format!("{} x{}", status, count))
        .collect();
    println!("  statuses: {}", counts.join(", "));
    let distinct = report.distinct_bodies.to_string();
    println!(
        "  distinct bodies: {}",
        if report.distinct_bodies > 1 {
            distinct.yellow()
        } else {
            distinct.normal()
        }
    );
}
