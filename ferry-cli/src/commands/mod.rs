//! Subcommand implementations.

pub mod check;
pub mod history;
pub mod rotate;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Resolve `--config`, falling back to `~/.ferry/ferry.yaml`.
pub(crate) fn config_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => ferry_core::config::default_config_path()
            .context("could not determine default config path"),
    }
}
