//! Shared types, error model, and configuration for reelfill.
//!
//! This crate is the foundation depended on by all other reelfill crates.
//! It provides:
//! - [`ReelfillError`]: the unified error type
//! - Domain types ([`MovieRecord`], [`LocalId`], [`WorkItem`], [`ErrorRecord`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, PathsConfig, PipelineConfig, PipelineSection, TmdbConfig, TmdbSettings, api_key,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{ReelfillError, Result};
pub use types::{
    ErrorRecord, LinkRow, LocalId, MovieRecord, Participant, RatingStats, RunId, WorkItem,
};
