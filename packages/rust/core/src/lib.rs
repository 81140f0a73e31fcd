//! Resumable concurrent enrichment for reelfill.
//!
//! This crate holds the checkpoint store, the resume index, the remote
//! enricher, the missing-id sink and the worker-pool orchestrator that ties
//! them together (`run_enrichment`).

pub mod checkpoint;
pub mod enrich;
pub mod input;
pub mod missing;
pub mod pipeline;
pub mod resume;
