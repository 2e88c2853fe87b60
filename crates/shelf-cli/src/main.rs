use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shelf_core::CatalogKind;
use shelf_storage::{migrate_legacy, XlsxCatalogStore};
use shelf_sync::{run_sync_once, RunMode, SyncConfig, SyncRunSummary};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "shelfsync=info,shelf_sync=info,shelf_remote=info,shelf_storage=info";

#[derive(Debug, Parser)]
#[command(name = "shelfsync")]
#[command(about = "Keeps a local catalog workbook and a remote record database in step")]
struct Cli {
    /// Catalog workbook (or legacy JSON) path, overrides CATALOG_FILE.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    /// `projects` or `papers`, overrides SHELF_KIND.
    #[arg(long, global = true, value_parser = parse_kind)]
    kind: Option<CatalogKind>,
    /// Print the run summary as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create and update remote records from the local catalog.
    Sync {
        #[arg(long, value_parser = parse_mode)]
        mode: Option<RunMode>,
        #[arg(long)]
        merge_from_remote: bool,
        #[arg(long)]
        force_title: bool,
        #[arg(long)]
        align_categories: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Align local references and categories with the remote, read-only.
    Reconcile {
        #[arg(long)]
        dry_run: bool,
    },
    /// Convert a legacy JSON catalog into a workbook.
    Migrate {
        #[arg(long)]
        from: Option<PathBuf>,
    },
}

fn parse_kind(raw: &str) -> Result<CatalogKind, String> {
    CatalogKind::parse(raw).ok_or_else(|| format!("unknown catalog kind `{raw}`"))
}

fn parse_mode(raw: &str) -> Result<RunMode, String> {
    RunMode::parse(raw).ok_or_else(|| format!("unknown sync mode `{raw}`"))
}

fn load_config(cli: &Cli) -> Result<SyncConfig> {
    if cli.kind.is_none() && cli.catalog.is_none() {
        return Ok(SyncConfig::from_env()?);
    }
    let kind = cli.kind.map(|k| k.as_str().to_string());
    let catalog = cli
        .catalog
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());
    let config = SyncConfig::from_lookup(|name| match name {
        "SHELF_KIND" if kind.is_some() => kind.clone(),
        "CATALOG_FILE" if catalog.is_some() => catalog.clone(),
        _ => std::env::var(name).ok(),
    })?;
    Ok(config)
}

fn print_summary(summary: &SyncRunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!(
        "sync complete: run_id={} mode={} catalog={}{}",
        summary.run_id,
        summary.mode,
        summary.catalog_path,
        if summary.saved { "" } else { " (not saved)" }
    );
    println!(
        "  created={} updated={} skipped={} failed={} not_found={}",
        summary.created, summary.updated, summary.skipped, summary.failed, summary.not_found
    );
    println!(
        "  recovered={} cleared_references={} duplicate_remote_keys={} degraded_index={}",
        summary.recovered,
        summary.cleared_references,
        summary.duplicate_remote_keys,
        summary.degraded_index
    );
    if summary.schema_unavailable {
        println!("  remote schema unavailable, items were not sent");
    }
    let merge = &summary.merge;
    if merge.inserted + merge.merged + merge.moved > 0 {
        println!(
            "  merge: inserted={} merged={} moved={} new_categories={}",
            merge.inserted, merge.merged, merge.moved, merge.created_categories
        );
    }
    let alignment = &summary.alignment;
    if alignment.moved + alignment.skipped > 0 {
        println!(
            "  alignment: moved={} new_categories={} skipped={}",
            alignment.moved, alignment.created_categories, alignment.skipped
        );
    }
    if summary.mode == RunMode::ReconcileOnly {
        let r = &summary.reconcile;
        println!(
            "  reconcile: filled={} cleared={} moved={} new_categories={} unmatched={}",
            r.filled, r.cleared, r.moved, r.created_categories, r.unmatched
        );
    }
    if summary.migrated {
        println!("  legacy catalog migrated to workbook");
    }
    Ok(())
}

fn migrate(cli: &Cli, from: Option<PathBuf>) -> Result<()> {
    let kind = match cli.kind {
        Some(kind) => kind,
        None => std::env::var("SHELF_KIND")
            .ok()
            .and_then(|raw| CatalogKind::parse(&raw))
            .unwrap_or_default(),
    };
    let requested = cli
        .catalog
        .clone()
        .or_else(|| std::env::var("CATALOG_FILE").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(kind.default_catalog_file()));
    let target = XlsxCatalogStore::new(&requested, kind).workbook_path();
    let legacy = from.unwrap_or_else(|| target.with_file_name(kind.legacy_file_name()));
    if !legacy.exists() {
        bail!("legacy catalog {} does not exist", legacy.display());
    }
    let loaded = migrate_legacy(&legacy, &target, kind)
        .with_context(|| format!("migrating {}", legacy.display()))?;
    println!(
        "migrated {} items in {} categories into {}",
        loaded.catalog.item_count(),
        loaded.catalog.categories().len(),
        loaded.path.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let mut cli = Cli::parse();
    let command = cli.command.take().unwrap_or(Commands::Sync {
        mode: None,
        merge_from_remote: false,
        force_title: false,
        align_categories: false,
        dry_run: false,
    });

    match command {
        Commands::Migrate { from } => migrate(&cli, from)?,
        Commands::Sync {
            mode,
            merge_from_remote,
            force_title,
            align_categories,
            dry_run,
        } => {
            let mut config = load_config(&cli)?;
            if let Some(mode) = mode {
                config.mode = mode;
            }
            config.merge_from_remote |= merge_from_remote;
            config.force_title |= force_title;
            config.align_categories |= align_categories;
            config.dry_run = dry_run;
            let summary = run_sync_once(config).await?;
            print_summary(&summary, cli.json)?;
        }
        Commands::Reconcile { dry_run } => {
            let mut config = load_config(&cli)?;
            config.mode = RunMode::ReconcileOnly;
            config.dry_run = dry_run;
            let summary = run_sync_once(config).await?;
            print_summary(&summary, cli.json)?;
        }
    }

    Ok(())
}
