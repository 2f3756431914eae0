//! fieldmap CLI: rule-driven mapping of query rows to index documents.
//!
//! Reads an XML mapping table and a JSON array of rows, and writes one
//! JSON document per row.

mod commands;
mod rows;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
