//! # ferry-core
//!
//! Domain types and configuration for Ferry: sync rules, destinations,
//! run-wide policy choices, and the YAML config loader with per-rule
//! validation.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, RuleError};
pub use error::ConfigError;
pub use types::{
    Destination, HostName, RetentionSettings, SignatureMethod, StabilityMethod,
    StabilitySettings, SyncRule, TransportSettings, UserName,
};
