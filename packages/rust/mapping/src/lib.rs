//! Rule-driven mapping of query rows to index documents.
//!
//! This crate provides:
//! - [`TargetRule`] and [`MappingTable`]: the column-to-field rules and their XML form
//! - [`transform`]: the entity/tag/pattern text passes
//! - [`gateway`]: traits for the file parser and crawl services a rule can call
//! - [`RowMapper`]: applies a table to one [`Row`]

pub mod gateway;
pub mod mapper;
pub mod row;
pub mod table;
pub mod target;
pub mod transform;
mod xml;

pub use gateway::{CrawlGateway, CrawlOutcome, FetchHandle, NoCrawl, NoFetch, Parser, ParserGateway};
pub use mapper::{ROW_FETCH_CATEGORY, RowMapper, RowReport};
pub use row::{RecordRow, Row};
pub use table::{MappingLink, MappingTable};
pub use target::{FindPattern, TargetRule};
