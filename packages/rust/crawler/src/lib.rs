//! Crawl worker for rules that fetch a URL.
//!
//! This crate provides:
//! - [`CrawlMaster`]: bounded, rate-limited fetch pool; implements
//!   [`fieldmap_mapping::CrawlGateway`]
//! - [`CrawlHandle`]: observes one fetch through its [`FetchState`]
//! - [`compute_hash`]: SHA-256 of a response body

mod fetch;
mod master;

pub use fetch::{FIELD_CONTENT_HASH, FIELD_FETCHED_AT, FIELD_URL, compute_hash};
pub use master::{CrawlHandle, CrawlMaster, FetchState};
