//! CLI command definitions, routing, and tracing setup.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use tracing::{info, warn};

use fieldmap_crawler::CrawlMaster;
use fieldmap_mapping::{CrawlGateway, MappingTable, NoCrawl, ParserGateway, RowMapper, TargetRule};
use fieldmap_parser::ParserRegistry;
use fieldmap_shared::{
    AppConfig, CrawlOptions, MappingOptions, ParserOptions, init_config, load_config,
    load_config_from,
};

use crate::rows::{JsonRow, load_rows};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// fieldmap: map query rows to index documents.
#[derive(Parser)]
#[command(
    name = "fieldmap",
    version,
    about = "Map query rows to multi-valued index documents using XML column rules.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.fieldmap/fieldmap.toml).
    #[arg(long, global = true, env = "FIELDMAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Map every row of a JSON array into an index document.
    Map {
        /// XML mapping table.
        #[arg(long)]
        rules: PathBuf,

        /// JSON array of row objects.
        #[arg(long)]
        rows: PathBuf,

        /// Output file, one JSON document per line (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Abort on the first row that fails instead of skipping it.
        #[arg(long)]
        fail_fast: bool,
    },

    /// Mapping table management.
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Mapping table subcommands.
#[derive(Subcommand)]
pub(crate) enum RulesAction {
    /// Load and validate a mapping table.
    Check {
        /// XML mapping table.
        path: PathBuf,

        /// Print the table re-serialized.
        #[arg(long)]
        print: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "fieldmap=info",
        1 => "fieldmap=debug",
        _ => "fieldmap=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Map {
            rules,
            rows,
            out,
            fail_fast,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_map(&config, &rules, &rows, out.as_deref(), fail_fast).await
        }
        Command::Rules { action } => match action {
            RulesAction::Check { path, print } => cmd_rules_check(&path, print),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// map
// ---------------------------------------------------------------------------

/// Totals of one batch run.
#[derive(Debug, Default, PartialEq, Eq)]
struct BatchSummary {
    mapped: usize,
    failed: usize,
    extraction_faults: usize,
    crawl_timeouts: usize,
}

async fn cmd_map(
    config: &AppConfig,
    rules: &Path,
    rows: &Path,
    out: Option<&Path>,
    fail_fast: bool,
) -> Result<()> {
    let table = MappingTable::load(rules)?;
    table.validate()?;
    let rows = load_rows(rows)?;

    info!(
        rules = table.len(),
        rows = rows.len(),
        crawl = table.has_crawl_target(),
        "mapping rows"
    );

    let mut writer: Box<dyn Write> = match out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(|e| eyre!("cannot create {}: {e}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let progress = ProgressBar::new(rows.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let parsers = ParserRegistry::new(ParserOptions::from(config));
    let options = MappingOptions::from(config);

    let summary = if table.has_crawl_target() {
        let master = CrawlMaster::new(CrawlOptions::from(config))?;
        let mapper = RowMapper::new(&parsers, &master, options);
        map_rows(&mapper, &table, &rows, &mut writer, fail_fast, &progress).await?
    } else {
        let mapper = RowMapper::new(&parsers, &NoCrawl, options);
        map_rows(&mapper, &table, &rows, &mut writer, fail_fast, &progress).await?
    };
    writer.flush()?;
    progress.finish_and_clear();

    info!(
        mapped = summary.mapped,
        failed = summary.failed,
        extraction_faults = summary.extraction_faults,
        crawl_timeouts = summary.crawl_timeouts,
        "mapping complete"
    );

    eprintln!();
    eprintln!("  Rows mapped:       {}", summary.mapped);
    eprintln!("  Rows failed:       {}", summary.failed);
    eprintln!("  Extraction faults: {}", summary.extraction_faults);
    eprintln!("  Crawl timeouts:    {}", summary.crawl_timeouts);
    if let Some(path) = out {
        eprintln!("  Output:            {}", path.display());
    }
    eprintln!();

    Ok(())
}

/// Map each row and write its document as one JSON line.
async fn map_rows<P, C>(
    mapper: &RowMapper<'_, P, C>,
    table: &MappingTable,
    rows: &[Map<String, Value>],
    writer: &mut dyn Write,
    fail_fast: bool,
    progress: &ProgressBar,
) -> Result<BatchSummary>
where
    P: ParserGateway,
    C: CrawlGateway,
{
    let mut summary = BatchSummary::default();

    for (index, object) in rows.iter().enumerate() {
        progress.set_message(format!("row {index}"));

        match mapper.build_document(table, &JsonRow::new(object)).await {
            Ok((document, report)) => {
                serde_json::to_writer(&mut *writer, &document)?;
                writeln!(writer)?;
                summary.mapped += 1;
                summary.extraction_faults += report.extraction_faults;
                summary.crawl_timeouts += report.crawl_timeouts;
            }
            Err(e) if fail_fast => return Err(eyre!("row {index}: {e}")),
            Err(e) => {
                warn!(row = index, error = %e, "row skipped");
                summary.failed += 1;
            }
        }

        progress.inc(1);
    }

    Ok(summary)
}

// ---------------------------------------------------------------------------
// rules / config
// ---------------------------------------------------------------------------

fn cmd_rules_check(path: &Path, print: bool) -> Result<()> {
    let table = MappingTable::load(path)?;
    table.validate()?;

    println!("{}: {}", path.display(), describe_table(&table));
    for link in table.rules() {
        println!("  {}", describe_link(&link.source, &link.target));
    }

    if print {
        println!();
        println!("{}", table.to_xml()?);
    }

    Ok(())
}

/// Rule count plus the side effects the table needs.
fn describe_table(table: &MappingTable) -> String {
    let mut line = format!("{} rules", table.len());
    if table.has_file_target() {
        line.push_str(", parses files");
    }
    if table.has_crawl_target() {
        line.push_str(", crawls pages");
    }
    line
}

/// One-line summary of a rule.
fn describe_link(source: &str, rule: &TargetRule) -> String {
    let mut flags = Vec::new();
    if rule.remove_tag() {
        flags.push("remove-tag".to_string());
    }
    if rule.convert_html_entities() {
        flags.push("entities".to_string());
    }
    if rule.file_path() {
        match rule.file_path_prefix() {
            Some(prefix) => flags.push(format!("file:{prefix}")),
            None => flags.push("file".to_string()),
        }
    }
    if rule.crawl_url() {
        flags.push("crawl".to_string());
    }
    if let Some(find) = rule.find_regex() {
        flags.push(format!("regex:{find}"));
    }

    let mut line = format!("{source} -> {}", rule.target_name());
    if !flags.is_empty() {
        line.push_str(&format!(" [{}]", flags.join(", ")));
    }
    line
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::parse_rows;

    fn table() -> MappingTable {
        MappingTable::new()
            .with("id", TargetRule::new("id"))
            .with("body", TargetRule::new("text").with_remove_tag(true))
    }

    async fn run_batch(rows: &str, fail_fast: bool) -> (Result<BatchSummary>, String) {
        let rows = parse_rows(rows).unwrap();
        let parsers = ParserRegistry::default();
        let mapper = RowMapper::new(&parsers, &NoCrawl, MappingOptions::default());
        let mut out = Vec::new();
        let result = map_rows(&mapper, &table(), &rows, &mut out, fail_fast, &ProgressBar::hidden()).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn cli_parses_map_command() {
        let cli = Cli::try_parse_from([
            "fieldmap", "-v", "map", "--rules", "r.xml", "--rows", "rows.json", "--fail-fast",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Map { rules, fail_fast, out, .. } => {
                assert_eq!(rules, PathBuf::from("r.xml"));
                assert!(fail_fast);
                assert!(out.is_none());
            }
            _ => panic!("expected map command"),
        }
    }

    #[tokio::test]
    async fn writes_one_line_per_row() {
        let (result, out) = run_batch(
            r#"[{"id": 1, "body": "<p>one</p>"}, {"id": 2, "body": null}]"#,
            false,
        )
        .await;

        let summary = result.unwrap();
        assert_eq!(summary.mapped, 2);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"id":["1"],"text":["one"]}"#);
        assert_eq!(lines[1], r#"{"id":["2"]}"#);
    }

    #[tokio::test]
    async fn failing_row_is_skipped() {
        let (result, out) = run_batch(r#"[{"id": [1]}, {"id": 3}]"#, false).await;
        let summary = result.unwrap();
        assert_eq!(summary.mapped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(out.trim(), r#"{"id":["3"]}"#);
    }

    #[tokio::test]
    async fn fail_fast_stops_the_batch() {
        let (result, out) = run_batch(r#"[{"id": [1]}, {"id": 3}]"#, true).await;
        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("row 0"));
        assert!(out.is_empty());
    }

    #[test]
    fn describes_rule_flags() {
        let rule = TargetRule::new("body")
            .with_remove_tag(true)
            .with_file_path(Some("/data/"))
            .with_regex(r"\d+", Some("#"))
            .unwrap();
        assert_eq!(
            describe_link("src", &rule),
            r"src -> body [remove-tag, file:/data/, regex:\d+]"
        );
        assert_eq!(describe_link("a", &TargetRule::new("b")), "a -> b");
    }

    #[test]
    fn describes_table_side_effects() {
        let table = MappingTable::new().with("a", TargetRule::new("a"));
        assert_eq!(describe_table(&table), "1 rules");

        let table = table
            .with("doc", TargetRule::new("doc").with_file_path(None::<String>))
            .with("link", TargetRule::new("page").with_crawl_url(true));
        assert_eq!(describe_table(&table), "3 rules, parses files, crawls pages");
    }
}
