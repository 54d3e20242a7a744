//! Schemascope CLI - focused relationship mapping from the command line
//!
//! Usage:
//!   schemascope map [-p <patterns>] [-d <depth>] [--refresh] <source>
//!   schemascope path <from> <to> [-p <patterns>] [--max-depth <n>] <source>
//!   schemascope tables [search] [--info <table>] <source>
//!   schemascope cache stats|list|clear
//!
//! A source is `--snapshot <catalog.json>`, `--sqlite <file.db>`, or a
//! connection from the config file (`--connection <name>`, else the default
//! connection, else `SCHEMASCOPE_DB_*` environment variables).
//!
//! Examples:
//!   schemascope map --sqlite app.db -p user,role -d 1
//!   schemascope path user_account role --sqlite app.db -p user
//!   schemascope cache clear --namespace path

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use schemascope::cache::{CacheError, CacheStats, CacheStore, MappingSummary, Namespace};
use schemascope::config::{
    ConnectionConfig, ConnectionError, ConnectionIdentity, Driver, Settings, SettingsError,
};
use schemascope::graph::{MappingGraph, PathQuery, PathResult};
use schemascope::mapper::{CacheStatsReport, FocusedMapper, MapperSettings};
use schemascope::metadata::{
    IntrospectError, IntrospectResult, RawForeignKey, RawTable, SchemaIntrospector,
    SqliteIntrospector, StaticIntrospector,
};
use schemascope::{ConfigurationError, MapperError};

#[derive(Parser)]
#[command(name = "schemascope")]
#[command(about = "Focused relationship mapping and path finding for relational databases")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to $SCHEMASCOPE_CONFIG, ./schemascope.toml, user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache database path (overrides the config file)
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or load) the focused graph for a set of table patterns
    Map {
        #[command(flatten)]
        mapping: MapArgs,

        /// Print the graph as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find foreign-key paths between two tables of the focused graph
    Path {
        /// Table to start from
        from: String,

        /// Table to reach
        to: String,

        #[command(flatten)]
        mapping: MapArgs,

        /// Maximum hops per path
        #[arg(long)]
        max_depth: Option<usize>,

        /// Maximum number of paths
        #[arg(long)]
        max_results: Option<usize>,

        /// Also return paths longer than the shortest
        #[arg(long)]
        all_lengths: bool,

        /// Print the paths as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search tables of the focused graph, or show one table in detail
    Tables {
        /// Case-insensitive substring of the table name
        search: Option<String>,

        /// Show columns and relationships of this table
        #[arg(long)]
        info: Option<String>,

        #[command(flatten)]
        mapping: MapArgs,
    },

    /// Inspect or clear the cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Entry counts, sizes and ages per namespace
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// List cached mappings
    List {
        #[arg(long)]
        json: bool,
    },

    /// Remove cached entries
    Clear {
        /// Namespace to clear
        #[arg(long, value_enum, default_value = "all")]
        namespace: NamespaceArg,

        /// Remove only this entry (requires a single namespace)
        #[arg(long)]
        fingerprint: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum NamespaceArg {
    All,
    Mapping,
    Path,
}

impl NamespaceArg {
    fn namespaces(self) -> Vec<Namespace> {
        match self {
            NamespaceArg::All => Namespace::ALL.to_vec(),
            NamespaceArg::Mapping => vec![Namespace::Mapping],
            NamespaceArg::Path => vec![Namespace::Path],
        }
    }
}

/// Where the catalog comes from.
#[derive(Args)]
struct SourceArgs {
    /// JSON catalog snapshot
    #[arg(long, conflicts_with_all = ["sqlite", "connection"])]
    snapshot: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, conflicts_with = "connection")]
    sqlite: Option<PathBuf>,

    /// Named connection from the config file
    #[arg(long)]
    connection: Option<String>,
}

/// Pattern set and depth of the focused graph.
#[derive(Args)]
struct MapArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Table-name patterns, comma separated (defaults from config)
    #[arg(short, long = "pattern", value_delimiter = ',')]
    patterns: Vec<String>,

    /// Foreign-key hops to follow from matched tables
    #[arg(short, long)]
    depth: Option<usize>,

    /// Ignore any cached graph and introspect again
    #[arg(long)]
    refresh: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Mapper(#[from] MapperError),

    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

impl From<CacheError> for CliError {
    fn from(err: CacheError) -> Self {
        CliError::Mapper(err.into())
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        CliError::Mapper(err.into())
    }
}

impl From<IntrospectError> for CliError {
    fn from(err: IntrospectError) -> Self {
        CliError::Mapper(err.into())
    }
}

impl From<ConnectionError> for CliError {
    fn from(err: ConnectionError) -> Self {
        CliError::Mapper(ConfigurationError::from(err).into())
    }
}

type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Introspection sources
// ============================================================================

enum Source {
    Snapshot(StaticIntrospector),
    Sqlite(SqliteIntrospector),
}

#[async_trait]
impl SchemaIntrospector for Source {
    async fn list_tables(&self) -> IntrospectResult<Vec<RawTable>> {
        match self {
            Source::Snapshot(inner) => inner.list_tables().await,
            Source::Sqlite(inner) => inner.list_tables().await,
        }
    }

    async fn list_foreign_keys(&self) -> IntrospectResult<Vec<RawForeignKey>> {
        match self {
            Source::Snapshot(inner) => inner.list_foreign_keys().await,
            Source::Sqlite(inner) => inner.list_foreign_keys().await,
        }
    }
}

fn absolute(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn open_source(args: &SourceArgs, settings: &Settings) -> CliResult<(Source, ConnectionIdentity)> {
    if let Some(path) = &args.snapshot {
        let introspector = StaticIntrospector::from_snapshot_file(path)?;
        return Ok((
            Source::Snapshot(introspector),
            ConnectionIdentity::snapshot(absolute(path)),
        ));
    }
    if let Some(path) = &args.sqlite {
        let introspector = SqliteIntrospector::new(absolute(path));
        let identity = introspector.identity();
        return Ok((Source::Sqlite(introspector), identity));
    }

    let config = match &args.connection {
        Some(name) => settings.get_connection(name)?.resolve()?,
        None => match settings.default_connection() {
            Some((name, connection)) => {
                tracing::debug!(connection = name, "using default connection");
                connection.resolve()?
            }
            None => ConnectionConfig::from_env()?,
        },
    };
    source_for(config)
}

fn source_for(config: ConnectionConfig) -> CliResult<(Source, ConnectionIdentity)> {
    let identity = config.identity();
    let source = match config.driver {
        Driver::Sqlite => Source::Sqlite(SqliteIntrospector::new(&config.database)),
        Driver::Snapshot => {
            Source::Snapshot(StaticIntrospector::from_snapshot_file(&config.database)?)
        }
        Driver::Postgres | Driver::MySql => {
            return Err(ConnectionError::UnsupportedDriver(format!(
                "{} has no built-in introspector; capture a catalog snapshot and pass --snapshot",
                config.driver
            ))
            .into())
        }
    };
    Ok((source, identity))
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> CliResult<()> {
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    let store = Arc::new(open_store(cli.cache.as_deref(), &settings)?);

    match cli.command {
        Commands::Map { mapping, json } => {
            let (mapper, graph) = map(&mapping, &settings, store).await?;
            if json {
                print_json(&graph)?;
            } else {
                print_graph(mapper.connection(), &graph);
            }
        }
        Commands::Path {
            from,
            to,
            mapping,
            max_depth,
            max_results,
            all_lengths,
            json,
        } => {
            let (mapper, graph) = map(&mapping, &settings, store).await?;
            let defaults = mapper.settings().default_query();
            let query = PathQuery {
                max_depth: max_depth.unwrap_or(defaults.max_depth),
                max_results: max_results.unwrap_or(defaults.max_results),
                shortest_only: defaults.shortest_only && !all_lengths,
            };
            let paths = mapper.find_paths_with(&graph, &from, &to, &query)?;
            if json {
                print_json(&paths)?;
            } else {
                print_paths(&from, &to, &query, &paths);
            }
        }
        Commands::Tables {
            search,
            info,
            mapping,
        } => {
            let (_, graph) = map(&mapping, &settings, store).await?;
            match info {
                Some(table) => print_table_info(&graph, &table)?,
                None => {
                    for name in graph.search_tables(search.as_deref().unwrap_or("")) {
                        println!("{}", name);
                    }
                }
            }
        }
        Commands::Cache { command } => run_cache(command, &store)?,
    }

    Ok(())
}

fn open_store(override_path: Option<&Path>, settings: &Settings) -> CliResult<CacheStore> {
    let path = match override_path {
        Some(path) => path.to_path_buf(),
        None => match settings.cache.resolved_path()? {
            Some(path) => path,
            None => CacheStore::cache_path()?,
        },
    };
    Ok(CacheStore::open(path, settings.cache.busy_timeout())?)
}

async fn map(
    args: &MapArgs,
    settings: &Settings,
    store: Arc<CacheStore>,
) -> CliResult<(FocusedMapper<Source>, MappingGraph)> {
    let (source, identity) = open_source(&args.source, settings)?;
    let mapper =
        FocusedMapper::new(source, identity, store).with_settings(MapperSettings::from(settings));

    let patterns = if args.patterns.is_empty() {
        settings.mapping.patterns.clone()
    } else {
        args.patterns.clone()
    };
    let depth = args.depth.unwrap_or(settings.mapping.expansion_depth);

    let graph = if args.refresh {
        mapper.refresh_mapping(patterns.as_slice(), depth).await?
    } else {
        mapper.map_focused(patterns.as_slice(), depth).await?
    };
    for warning in graph.warnings() {
        eprintln!("warning: {}", warning);
    }
    Ok((mapper, graph))
}

fn run_cache(command: CacheCommand, store: &CacheStore) -> CliResult<()> {
    match command {
        CacheCommand::Stats { json } => {
            let report = CacheStatsReport {
                mapping: store.stats(Namespace::Mapping)?,
                path: store.stats(Namespace::Path)?,
            };
            if json {
                print_json(&report)?;
            } else {
                if let Some(path) = store.path() {
                    println!("Cache: {}", path.display());
                }
                print_stats(Namespace::Mapping, &report.mapping);
                print_stats(Namespace::Path, &report.path);
            }
        }
        CacheCommand::List { json } => {
            let summaries = store.mappings().summaries()?;
            if json {
                print_json(&summaries)?;
            } else if summaries.is_empty() {
                println!("No cached mappings.");
            } else {
                for summary in &summaries {
                    print_summary(summary);
                }
            }
        }
        CacheCommand::Clear {
            namespace,
            fingerprint,
        } => match (namespace, fingerprint) {
            (NamespaceArg::All, Some(_)) => {
                return Err(CliError::Usage(
                    "--fingerprint needs --namespace mapping or --namespace path".to_string(),
                ))
            }
            (namespace, Some(fingerprint)) => {
                for ns in namespace.namespaces() {
                    let removed = store.invalidate(ns, &fingerprint)?;
                    println!("{}: {}", ns, if removed { "removed" } else { "not found" });
                }
            }
            (namespace, None) => {
                for ns in namespace.namespaces() {
                    let removed = store.clear(ns)?;
                    println!("{}: removed {} entries", ns, removed);
                }
            }
        },
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_graph(connection: &ConnectionIdentity, graph: &MappingGraph) {
    println!(
        "Mapping of {} (patterns: {}; depth {})",
        connection,
        graph.patterns(),
        graph.expansion_depth()
    );
    println!();

    println!("Tables ({}):", graph.table_count());
    for node in graph.nodes() {
        if node.matched_by_pattern() {
            println!("  * {}", node.name);
        } else {
            println!("    {}  (+{} hop)", node.name, node.hops);
        }
    }
    println!();

    println!("Relationships ({}):", graph.edge_count());
    for edge in graph.edges() {
        println!("  {}", edge);
    }
    println!();
    println!("fingerprint: {}", graph.fingerprint());
}

fn print_paths(from: &str, to: &str, query: &PathQuery, paths: &[PathResult]) {
    if paths.is_empty() {
        println!(
            "No path between {} and {} within {} hops.",
            from, to, query.max_depth
        );
        return;
    }
    println!("{} path(s) from {} to {}:", paths.len(), from, to);
    for (i, path) in paths.iter().enumerate() {
        println!("  {}. [{} hops] {}", i + 1, path.len(), path);
    }
}

fn print_table_info(graph: &MappingGraph, table: &str) -> CliResult<()> {
    let info = graph
        .table_info(table)
        .ok_or_else(|| MapperError::UnknownTable(table.to_string()))?;

    println!("{}", info.table.name);
    if info.table.columns.is_empty() {
        println!("  (no column information)");
    }
    for column in &info.table.columns {
        let mut flags = Vec::new();
        if column.primary_key {
            flags.push("pk");
        }
        if !column.nullable {
            flags.push("not null");
        }
        println!(
            "  {:<24} {:<16} {}",
            column.name,
            column.data_type,
            flags.join(", ")
        );
    }

    if !info.outbound.is_empty() {
        println!("References:");
        for edge in &info.outbound {
            println!("  {}", edge);
        }
    }
    if !info.inbound.is_empty() {
        println!("Referenced by:");
        for edge in &info.inbound {
            println!("  {}", edge);
        }
    }
    Ok(())
}

fn print_stats(namespace: Namespace, stats: &CacheStats) {
    let oldest = stats
        .oldest_entry_age
        .map(|age| format!(", oldest {} ago", format_age(age)))
        .unwrap_or_default();
    println!(
        "{:<8} {} entries, {} bytes{}",
        namespace.as_str(),
        stats.entry_count,
        stats.total_size_bytes,
        oldest
    );
}

fn print_summary(summary: &MappingSummary) {
    let short = summary.fingerprint.get(..12).unwrap_or(&summary.fingerprint);
    println!(
        "{}  {}  [{}] depth {}  {} tables, {} relationships, {} ago",
        short,
        summary.key.connection,
        summary.key.patterns.join(", "),
        summary.key.expansion_depth,
        summary.table_count,
        summary.edge_count,
        format_age(summary.age)
    );
}

fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m", secs / 60),
        3600..=86399 => format!("{}h", secs / 3600),
        _ => format!("{}d", secs / 86400),
    }
}
