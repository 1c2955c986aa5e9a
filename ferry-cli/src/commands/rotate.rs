//! `ferry rotate` — force a retention pass outside a sync run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use chrono::Utc;

use ferry_sync::retention;

/// Arguments for `ferry rotate`.
#[derive(Args, Debug)]
pub struct RotateArgs {
    /// Path to the config file (default: ~/.ferry/ferry.yaml).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl RotateArgs {
    pub fn run(self) -> Result<()> {
        let path = super::config_path(self.config)?;
        let (config, _) = ferry_core::config::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;

        retention::rotate_all(&config.state_dir, &config.retention, Utc::now());
        println!(
            "rotation pass complete under {} (log window {}d, archive window {}d)",
            config.state_dir.display(),
            config.retention.max_log_age_days,
            config.retention.max_archive_age_days,
        );
        Ok(())
    }
}
