// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `bom-cfp`: shard setup, dataset import and parts-tree footprint refresh.
//!
//! Results go to stdout; tracing output goes to stderr (`RUST_LOG` filters it).

mod render;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bom_app_core::shards::DEFAULT_BUSY_TIMEOUT_MS;
use bom_app_core::{read_state_change_report, ConfigService, ShardsConfig, SHARDS_CONFIG_KEY};
use bom_config_fs::FsConfigStore;
use bom_core::{PartId, ShardId};
use bom_shard::{
    read_dataset_dir, refresh_parts_tree, RefreshOptions, ShardEndpoint, ShardSet, SqliteShard,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "bom-cfp",
    author,
    version,
    about = "Parts-tree carbon footprint tools",
    disable_help_subcommand = true
)]
struct Cli {
    /// Directory holding `shards.json` (defaults to the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create one shard's tables and indices
    Init(ShardArgs),
    /// Import a CSV dataset directory into one shard
    Load(LoadArgs),
    /// Store the shard endpoints in the config directory
    Configure(ConfigureArgs),
    /// Recompute footprints and hashes under a root part and write them back
    Refresh(RefreshArgs),
    /// Summarize a state-change report
    Report(ReportArgs),
}

#[derive(Args, Debug)]
struct ShardArgs {
    /// Shard letter (A, B or C)
    #[arg(long)]
    shard: ShardId,
    /// SQLite database file
    #[arg(long)]
    path: PathBuf,
}

#[derive(Args, Debug)]
struct LoadArgs {
    #[command(flatten)]
    target: ShardArgs,
    /// Directory holding `assemblerS.csv`, `parts_treeS.csv` and `cfpvalS.csv`
    #[arg(long)]
    dir: PathBuf,
    /// Delete the shard's rows before importing
    #[arg(long)]
    replace: bool,
}

#[derive(Args, Debug)]
struct ConfigureArgs {
    /// Shards live at `DIR/A.db`, `DIR/B.db` and `DIR/C.db`
    #[arg(long)]
    shard_dir: PathBuf,
    /// SQLite busy timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_BUSY_TIMEOUT_MS)]
    busy_timeout_ms: u64,
}

#[derive(Args, Debug)]
struct RefreshArgs {
    /// Root part id
    #[arg(long)]
    root: String,
    /// Shard endpoints JSON file (same layout as `shards.json`)
    #[arg(long, conflicts_with = "shard_dir")]
    config: Option<PathBuf>,
    /// Shards live at `DIR/A.db`, `DIR/B.db` and `DIR/C.db`
    #[arg(long)]
    shard_dir: Option<PathBuf>,
    /// Compute without writing back
    #[arg(long)]
    dry_run: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Report JSON file
    file: PathBuf,
    /// Database bound to the intermediate-database placeholder
    /// (defaults to the report's `intermediateDBName`)
    #[arg(long)]
    intermediate_db: Option<String>,
    /// Rename a database in the replace query, as `FROM=TO`
    #[arg(long, value_parser = parse_rename)]
    rename: Option<(String, String)>,
    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

fn parse_rename(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((from, to)) if !from.is_empty() && !to.is_empty() => {
            Ok((from.to_owned(), to.to_owned()))
        }
        _ => Err(format!("expected FROM=TO, got {s:?}")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config_dir = cli.config_dir.as_deref();
    match cli.command {
        Commands::Init(args) => run_init(&args),
        Commands::Load(args) => run_load(&args),
        Commands::Configure(args) => run_configure(config_dir, &args),
        Commands::Refresh(args) => run_refresh(config_dir, &args),
        Commands::Report(args) => run_report(&args),
    }
}

fn config_service(dir: Option<&Path>) -> Result<ConfigService<FsConfigStore>> {
    let store = match dir {
        Some(dir) => FsConfigStore::at(dir),
        None => FsConfigStore::new(),
    }
    .context("opening config directory")?;
    Ok(ConfigService::new(store))
}

fn run_init(args: &ShardArgs) -> Result<()> {
    let shard = SqliteShard::new(args.shard, &args.path);
    shard
        .create_schema()
        .with_context(|| format!("creating shard {} at {}", args.shard, args.path.display()))?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "shard {} ready at {}", args.shard, args.path.display())?;
    Ok(())
}

fn run_load(args: &LoadArgs) -> Result<()> {
    let target = &args.target;
    let shard = SqliteShard::new(target.shard, &target.path);
    shard.create_schema()?;
    if args.replace {
        shard.clear()?;
        info!(shard = %target.shard, "existing rows cleared");
    }
    let tables = read_dataset_dir(&args.dir, target.shard)?;
    shard
        .insert_tables(&tables)
        .with_context(|| format!("importing {} into shard {}", args.dir.display(), target.shard))?;
    let mut out = std::io::stdout().lock();
    writeln!(
        out,
        "shard {}: {} parts-tree rows, {} CO2 rows, {} assembler rows",
        target.shard,
        tables.edges.len(),
        tables.co2.len(),
        tables.assemblers.len()
    )?;
    Ok(())
}

fn run_configure(config_dir: Option<&Path>, args: &ConfigureArgs) -> Result<()> {
    let dir = std::path::absolute(&args.shard_dir)
        .with_context(|| format!("resolving {}", args.shard_dir.display()))?;
    let mut cfg = ShardsConfig::in_dir(dir);
    for endpoint in [&mut cfg.a, &mut cfg.b, &mut cfg.c] {
        endpoint.busy_timeout_ms = args.busy_timeout_ms;
    }
    let service = config_service(config_dir)?;
    service.save(SHARDS_CONFIG_KEY, &cfg)?;
    let mut out = std::io::stdout().lock();
    writeln!(
        out,
        "shard endpoints saved to {}",
        service.store().base().join(format!("{SHARDS_CONFIG_KEY}.json")).display()
    )?;
    Ok(())
}

fn resolve_shards(config_dir: Option<&Path>, args: &RefreshArgs) -> Result<ShardsConfig> {
    if let Some(file) = &args.config {
        let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
        return serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing {}", file.display()));
    }
    if let Some(dir) = &args.shard_dir {
        return Ok(ShardsConfig::in_dir(dir));
    }
    match config_service(config_dir)?.load::<ShardsConfig>(SHARDS_CONFIG_KEY)? {
        Some(cfg) => Ok(cfg),
        None => bail!(
            "no shard endpoints configured; pass --config or --shard-dir, \
             or run `bom-cfp configure`"
        ),
    }
}

fn open_shards(cfg: &ShardsConfig) -> Result<ShardSet> {
    let set = ShardSet::try_from_fn(|shard| {
        let endpoint = cfg.endpoint(shard);
        let sqlite = SqliteShard::new(shard, &endpoint.path)
            .with_busy_timeout(Duration::from_millis(endpoint.busy_timeout_ms));
        Ok(Arc::new(sqlite) as Arc<dyn ShardEndpoint>)
    })?;
    Ok(set)
}

fn run_refresh(config_dir: Option<&Path>, args: &RefreshArgs) -> Result<()> {
    let cfg = resolve_shards(config_dir, args)?;
    let shards = open_shards(&cfg)?;
    let root = PartId::from(args.root.as_str());
    let options = RefreshOptions {
        dry_run: args.dry_run,
    };
    let refresh = refresh_parts_tree(&root, &shards, &options)
        .with_context(|| format!("refreshing parts tree of {root}"))?;

    let mut out = std::io::stdout().lock();
    match args.format {
        Format::Table => render::refresh_table(&mut out, &refresh),
        Format::Json => render::refresh_json(&mut out, &refresh),
    }
}

fn run_report(args: &ReportArgs) -> Result<()> {
    let report = read_state_change_report(&args.file)?;
    let db = args
        .intermediate_db
        .as_deref()
        .unwrap_or(&report.intermediate_db_name);
    let rename = args.rename.as_ref().map(|(from, to)| (from.as_str(), to.as_str()));
    let query = report.replace_query_for(db, rename);

    let mut out = std::io::stdout().lock();
    match args.format {
        Format::Table => render::report_table(&mut out, &report, query.as_deref()),
        Format::Json => render::report_json(&mut out, &report, query.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_needs_both_sides() {
        assert_eq!(
            parse_rename("benchbase=scratch"),
            Ok(("benchbase".to_owned(), "scratch".to_owned()))
        );
        assert!(parse_rename("benchbase").is_err());
        assert!(parse_rename("=x").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
