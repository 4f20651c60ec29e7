//! Command-line entry point for the desktop layout reorganizer.
//!
//! # Responsibility
//! - Parse arguments, build the run configuration and start logging.
//! - Print stage reports; every decision lives in `deskfold_core`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use deskfold_core::{
    category_stats, default_log_level, harvest_app_names, init_logging, restore_layout,
    Pipeline, ReorganizeOptions, ReorganizeReport, RunConfig,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Reorganize a home-screen backup into category folders
#[derive(Parser, Debug)]
#[command(name = "deskfold", author, version, about, long_about = None)]
struct Cli {
    /// Directory holding `Data/<timestamp>/Layout` backups
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    work_dir: PathBuf,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log directory; defaults to `<work-dir>/logs`
    #[arg(long, value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rewrite the newest backup into category folders (default)
    Reorganize(ReorganizeArgs),
    /// Copy every `.bak` snapshot back over its original
    Restore,
    /// Show per-category package counts of the mapping file
    Stats(MappingArgs),
    /// Print `package -> title` pairs found in the backup as JSON
    Names,
}

#[derive(Args, Debug, Default)]
struct ReorganizeArgs {
    #[command(flatten)]
    mapping: MappingArgs,

    /// Plan only; snapshot and write nothing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug, Default)]
struct MappingArgs {
    /// Category mapping file; defaults to `<work-dir>/app_categories.json`
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            log::error!("event=cli_failed module=cli status=error error={err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| cli.work_dir.join("logs"));
    if let Err(err) = init_logging(&level, &log_dir) {
        eprintln!("warning: file logging disabled: {err}");
    }

    match cli.command.unwrap_or(Command::Reorganize(ReorganizeArgs::default())) {
        Command::Reorganize(args) => {
            let config = build_config(&cli.work_dir, args.mapping.config)?;
            reorganize(&config, args.dry_run)
        }
        Command::Restore => {
            let config = build_config(&cli.work_dir, None)?;
            restore(&config)
        }
        Command::Stats(args) => {
            let config = build_config(&cli.work_dir, args.config)?;
            stats(&config)
        }
        Command::Names => {
            let config = build_config(&cli.work_dir, None)?;
            let names = harvest_app_names(&config).context("failed to read app names")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&names).context("failed to serialize names")?
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_config(work_dir: &Path, mapping: Option<PathBuf>) -> Result<RunConfig> {
    RunConfig::builder(work_dir)
        .mapping_path(mapping)
        .build()
        .context("invalid configuration")
}

fn reorganize(config: &RunConfig, dry_run: bool) -> Result<ExitCode> {
    let mut pipeline = Pipeline::new(config);
    let report = pipeline
        .reorganize(ReorganizeOptions {
            dry_run,
            modified: None,
        })
        .with_context(|| format!("reorganize stopped at stage `{}`", pipeline.stage()))?;

    print_plan(&report);
    if report.dry_run {
        println!("dry run: nothing was written");
        return Ok(ExitCode::SUCCESS);
    }
    print_commit(&report);

    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    match &report.verification {
        Some(verification) if !verification.is_consistent() => {
            for issue in verification.issues() {
                println!("verify: {issue}");
            }
            Ok(ExitCode::FAILURE)
        }
        _ => {
            println!("verify: ok");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_plan(report: &ReorganizeReport) {
    let plan = &report.plan;
    println!(
        "backup {} ({} tables)",
        report.timestamp,
        report.variant.as_str()
    );
    println!(
        "plan: {} folders, {} apps, {} kept on screen 0, {} screens",
        plan.folder_count(),
        plan.app_count(),
        plan.retained.len(),
        plan.screen_count
    );
    for folder in &plan.folders {
        println!(
            "  {:<16} screen {} cell ({}, {})  {} apps",
            folder.label, folder.screen, folder.cell_x, folder.cell_y, folder.child_count
        );
    }
}

fn print_commit(report: &ReorganizeReport) {
    if let Some(primary) = &report.primary {
        println!(
            "store: {} items -> {}, {} screens -> {}",
            primary.items, primary.items_table, primary.screens, primary.screens_table
        );
    }
    match &report.mirror {
        Some(mirror) => println!("mirror: {} items -> {}", mirror.items, mirror.items_table),
        None => println!("mirror: none"),
    }
    if let Some(markup) = &report.markup {
        println!(
            "markup: {} documents, {} applications, {} folders",
            markup.paths.len(),
            markup.applications,
            markup.folders
        );
    }
    if let Some(archive) = &report.archive {
        println!(
            "archive: {} mode, {} members, {} bytes",
            archive.mode.as_str(),
            archive.members_written,
            archive.bytes
        );
    }
}

fn restore(config: &RunConfig) -> Result<ExitCode> {
    let report = restore_layout(config).context("restore failed")?;
    if report.nothing_to_restore() {
        println!("nothing to restore: no snapshot files found");
        return Ok(ExitCode::SUCCESS);
    }

    for path in &report.restored {
        println!("restored {}", path.display());
    }
    for failure in &report.failures {
        println!(
            "failed {}: {}",
            failure.snapshot.display(),
            failure.message
        );
    }
    println!(
        "restored {} file(s), {} failure(s)",
        report.restored.len(),
        report.failures.len()
    );
    Ok(if report.failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn stats(config: &RunConfig) -> Result<ExitCode> {
    let stats = category_stats(config).context("failed to load category mapping")?;
    for (label, count) in &stats.categories {
        println!("{label:<16} {count:>4}");
    }
    println!("{:<16} {:>4}", "unclassified", stats.unclassified);
    println!("{:<16} {:>4}", "total", stats.total);
    Ok(ExitCode::SUCCESS)
}
