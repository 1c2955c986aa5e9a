//! `ferry check` — validate the config and list its rules.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

/// Arguments for `ferry check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the config file (default: ~/.ferry/ferry.yaml).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let path = super::config_path(self.config)?;
        let (config, rule_errors) = ferry_core::config::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;

        println!(
            "{} — {} valid rule(s), signature: {}, stability: {}",
            path.display(),
            config.rules.len(),
            config.signature,
            config.stability.method,
        );
        for rule in &config.rules {
            println!(
                "  {}  {} ({}) -> {}:{}",
                "✓".green(),
                rule.local_dir.display(),
                rule.pattern,
                rule.destination,
                rule.remote_dir,
            );
        }
        for error in &rule_errors {
            println!(
                "  {}  rule {}: {}",
                "✗".red().bold(),
                error.index,
                error.message
            );
        }

        if !rule_errors.is_empty() {
            bail!("{} invalid rule(s)", rule_errors.len());
        }
        Ok(())
    }
}
