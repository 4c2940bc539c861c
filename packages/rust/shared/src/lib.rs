//! Shared types, error model, and configuration for CardComply.
//!
//! This crate is the foundation depended on by all other CardComply crates.
//! It provides:
//! - [`CardComplyError`] — the unified error type
//! - Domain types ([`LinkCandidate`], [`ExtractedContent`], [`EnrichmentResult`])
//! - Configuration ([`AppConfig`], [`EnrichConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EnrichConfig, EnrichmentConfig, RetentionConfig, ServerConfig, load_config_from,
    resolve_data_dir, resolve_public_url,
};
pub use error::{CardComplyError, Result};
pub use types::{AnswerMap, EnrichmentResult, ExtractedContent, LinkCandidate, SourceKind};
