//! `ferry history` — recent successful transfers for one destination.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use ferry_core::Destination;
use ferry_sync::HistoryStore;

/// Arguments for `ferry history`.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Destination to inspect, as user@host.
    pub destination: String,

    /// Path to the config file (default: ~/.ferry/ferry.yaml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Show at most this many of the most recent records.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "synced at")]
    timestamp: String,
    #[tabled(rename = "local dir")]
    local_dir: String,
    filename: String,
    signature: String,
}

impl HistoryArgs {
    pub fn run(self) -> Result<()> {
        let destination: Destination = self
            .destination
            .parse()
            .map_err(|e: String| anyhow!(e))?;

        let path = super::config_path(self.config)?;
        let (config, _) = ferry_core::config::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;

        let store = HistoryStore::open(&config.state_dir, &destination);
        let records = store
            .records()
            .with_context(|| format!("failed to read history for {destination}"))?;
        let recent = records.iter().rev().take(self.limit).collect::<Vec<_>>();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&recent)?);
            return Ok(());
        }

        if recent.is_empty() {
            println!("no history for '{destination}'");
            return Ok(());
        }

        let rows: Vec<HistoryRow> = recent
            .iter()
            .map(|r| HistoryRow {
                timestamp: r.timestamp.to_rfc3339(),
                local_dir: r.local_dir.display().to_string(),
                filename: r.filename.clone(),
                signature: shorten(r.signature.as_str()),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn shorten(signature: &str) -> String {
    if signature.len() <= 12 {
        signature.to_owned()
    } else {
        format!("{}…", &signature[..12])
    }
}
