//! `ferry run` — one full sync invocation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use ferry_sync::pipeline::{self, RunOptions, RunSummary};
use ferry_sync::SftpTransport;

/// Arguments for `ferry run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the config file (default: ~/.ferry/ferry.yaml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Plan and report without provisioning, transferring, or committing.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the machine-readable run summary.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let path = super::config_path(self.config)?;
        let (config, rule_errors) = ferry_core::config::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;

        let transport = SftpTransport::new(config.transport.clone());
        let options = RunOptions {
            dry_run: self.dry_run,
        };
        let summary = pipeline::run(&config, &rule_errors, &transport, &options)
            .context("sync run failed")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&summary, self.dry_run);
        }

        let failed: Vec<&str> = summary
            .destinations
            .iter()
            .filter(|d| d.failure.is_some())
            .map(|d| d.destination.as_str())
            .collect();
        if !failed.is_empty() {
            bail!(
                "{} destination(s) failed: {}; their files stay eligible for the next run",
                failed.len(),
                failed.join(", ")
            );
        }
        Ok(())
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };

    for message in &summary.rule_errors {
        println!("{} {message}", "!".yellow().bold());
    }

    if summary.destinations.is_empty() {
        println!("{prefix}nothing to do — no destinations planned");
        return;
    }

    for report in &summary.destinations {
        if let Some(failure) = &report.failure {
            println!(
                "{} '{}' {}",
                "✗".red().bold(),
                report.destination,
                failure.red()
            );
            continue;
        }

        let shipped = if dry_run {
            &report.would_transfer
        } else {
            &report.transferred
        };
        println!(
            "{prefix}{} '{}' — {} transferred, {} unchanged, {} rejected",
            "✓".green().bold(),
            report.destination,
            shipped.len(),
            report.skipped.len(),
            report.rejected.len(),
        );
        for filename in shipped {
            let mark = if dry_run { "~" } else { "✎" };
            println!("  {mark}  {filename}");
        }
        for filename in &report.skipped {
            println!("  ·  {filename}");
        }
        for rejected in &report.rejected {
            println!(
                "  {}  {} — {}",
                "✗".yellow(),
                rejected.filename,
                rejected.reason
            );
        }
    }
}
