//! Shared types and configuration for the lineage research workspace.

pub mod config;
pub mod types;

pub use config::{config_dir, config_file, ApiConfig, ChromeConfig, Config, DatabaseConfig};
pub use types::{
    CandidateRecord, ErrorKind, Outcome, Payload, Person, Query, ANCIENT_CUTOFF_YEAR,
    DEFAULT_BIRTH_YEAR,
};
