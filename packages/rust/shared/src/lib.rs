//! Shared types, error model, and configuration for fieldmap.
//!
//! This crate is the foundation depended on by all other fieldmap crates.
//! It provides:
//! - [`FieldMapError`]: the unified error type
//! - Domain types ([`IndexDocument`], [`FetchCategory`])
//! - Configuration ([`AppConfig`], [`MappingOptions`], [`CrawlOptions`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ColumnMatch, CrawlConfig, CrawlOptions, MappingConfig, MappingOptions,
    ParserConfig, ParserOptions, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{FieldMapError, Result};
pub use types::{FetchCategory, IndexDocument};
