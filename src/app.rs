//! Command dispatch for the safedupe binary.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};

use crate::actions::{self, ActionKind, ActionReport, PlannedAction};
use crate::checkpoint::CheckpointStore;
use crate::cli::{
    ActionArg, CheckpointCommand, Cli, Commands, DedupeArgs, OutputFormat, RollbackArgs, ScanArgs,
    ScanOptions, SnapshotsArgs,
};
use crate::config::Config;
use crate::duplicates::{group_by_digest, DuplicateGroup, HashedEntry, ProcessStats, Processor};
use crate::error::ExitCode;
use crate::logging::init_logging;
use crate::output::json::write_json;
use crate::output::{text, JsonOutput, ScanSummary, TextOutput};
use crate::progress::Progress;
use crate::rollback::{ProtectedError, RollbackManager};
use crate::scanner::WalkStats;
use crate::store::{persist_entries, SqliteRepository};

/// Run the command described by `cli`.
///
/// # Errors
///
/// Returns any failure that should end the process with a non-zero code.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);

    let config = Config::load(cli.config.as_deref())?;
    log::debug!("Data directory: {}", config.data_dir.display());

    match &cli.command {
        Commands::Scan(args) => run_scan(args, &config, cli.quiet),
        Commands::Dedupe(args) => run_dedupe(args, &config, cli.quiet),
        Commands::Rollback(args) => run_rollback(args, &config),
        Commands::Transactions => {
            let transactions = manager_for(&config).list_transactions()?;
            text::write_transactions(&mut io::stdout().lock(), &transactions)?;
            Ok(ExitCode::Success)
        }
        Commands::Snapshots(args) => run_snapshots(args, &config),
        Commands::Checkpoint(CheckpointCommand::Clear { root }) => {
            let store = CheckpointStore::new(config.checkpoint_dir());
            if store.cleanup(root)? {
                println!("Removed checkpoint for {}", root.display());
            } else {
                println!("No checkpoint stored for {}", root.display());
            }
            Ok(ExitCode::Success)
        }
    }
}

/// Everything a scan produced.
struct ScanOutcome {
    entries: Vec<HashedEntry>,
    groups: Vec<DuplicateGroup>,
    summary: ScanSummary,
}

fn manager_for(config: &Config) -> RollbackManager {
    RollbackManager::new(&config.data_dir).with_retention(config.snapshot_retention)
}

fn processor_for(options: &ScanOptions, config: &Config) -> Result<Processor> {
    let mut walker = config.walker_config();
    if options.no_archives {
        walker.expand_archives = false;
    }
    if options.skip_hidden {
        walker.skip_hidden = true;
    }
    walker.ignore_patterns.extend(options.exclude.iter().cloned());

    let algorithm = options.algorithm.map_or(config.hash_algorithm, Into::into);
    let mut processor = Processor::new(walker);
    processor
        .set_algorithm(algorithm.name())
        .context("Unsupported hash algorithm")?;
    processor.set_buffer_size(config.buffer_size);
    Ok(processor)
}

fn scan(options: &ScanOptions, config: &Config, show_progress: bool) -> Result<ScanOutcome> {
    let started = Instant::now();
    let mut processor = processor_for(options, config)?;
    let progress = Progress::new(!show_progress);

    let mut entries = Vec::new();
    let mut walk = WalkStats::default();
    let mut stats = ProcessStats::default();

    if options.resume {
        let checkpoints = CheckpointStore::new(config.checkpoint_dir());
        for root in &options.paths {
            let found = processor
                .process_resumable(root, &checkpoints, None, Some(&progress))
                .with_context(|| format!("Cannot scan {}", root.display()))?;
            entries.extend(found);
            accumulate(&mut walk, &mut stats, &processor);
        }
    } else {
        entries = processor
            .process_roots(&options.paths, None, Some(&progress))
            .context("Scan failed")?;
        accumulate(&mut walk, &mut stats, &processor);
    }

    let resolved = processor.detect_duplicates(&mut entries);
    log::info!(
        "{} duplicate(s) in {} group(s) among {} entries",
        resolved.duplicates,
        resolved.groups,
        entries.len()
    );
    let groups = group_by_digest(&entries);
    let summary = ScanSummary::from_run(
        &entries,
        &groups,
        walk,
        stats,
        processor.algorithm(),
        started.elapsed(),
    );
    Ok(ScanOutcome {
        entries,
        groups,
        summary,
    })
}

fn accumulate(walk: &mut WalkStats, stats: &mut ProcessStats, processor: &Processor) {
    let w = processor.walk_statistics();
    walk.file_count += w.file_count;
    walk.dir_count += w.dir_count;
    walk.error_count += w.error_count;

    let p = processor.statistics();
    stats.hashed += p.hashed;
    stats.reused += p.reused;
    stats.failed += p.failed;
    stats.bytes_hashed += p.bytes_hashed;
}

fn run_scan(args: &ScanArgs, config: &Config, quiet: bool) -> Result<ExitCode> {
    let show_progress = !quiet && args.output == OutputFormat::Text;
    let outcome = scan(&args.scan, config, show_progress)?;

    if let Some(db) = &args.db {
        let path = if db.as_os_str().is_empty() {
            config.database_path()
        } else {
            db.clone()
        };
        let mut repo = SqliteRepository::open(&path)
            .with_context(|| format!("Cannot open database {}", path.display()))?;
        let stats = persist_entries(&mut repo, &outcome.entries).context("Cannot record scan results")?;
        log::info!("Recorded {} entries in {}", stats.stored, path.display());
    }

    let code = ExitCode::for_scan(outcome.summary.duplicate_files, outcome.summary.failures());
    let mut stdout = io::stdout().lock();
    match args.output {
        OutputFormat::Json => JsonOutput::new(&outcome.groups, &outcome.summary, code)
            .write_to(&mut stdout, true)
            .context("Cannot write JSON output")?,
        OutputFormat::Text if !quiet => TextOutput::new(&outcome.groups, &outcome.summary).write_to(&mut stdout)?,
        OutputFormat::Text => {}
    }
    Ok(code)
}

fn action_kind(args: &DedupeArgs) -> Result<ActionKind> {
    let target = || -> Result<PathBuf> {
        args.target
            .clone()
            .context("--target is required for move and copy")
    };
    Ok(match args.action {
        ActionArg::Delete => ActionKind::Delete,
        ActionArg::Move => ActionKind::Move { target_dir: target()? },
        ActionArg::Copy => ActionKind::Copy { target_dir: target()? },
    })
}

fn write_plan<W: Write>(writer: &mut W, plan: &[PlannedAction]) -> io::Result<()> {
    for action in plan {
        match action.destination() {
            Some(to) => writeln!(writer, "  {} -> {}", action.source.display(), to.display())?,
            None => writeln!(writer, "  {}", action.source.display())?,
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
}

fn run_dedupe(args: &DedupeArgs, config: &Config, quiet: bool) -> Result<ExitCode> {
    let kind = action_kind(args)?;
    if let Some(target) = kind_target(&kind) {
        ensure_outside_roots(target, &args.scan.paths)?;
    }

    let show_progress = !quiet && args.output == OutputFormat::Text;
    let outcome = scan(&args.scan, config, show_progress)?;
    let plan = actions::plan(&outcome.entries, &kind);
    if plan.is_empty() {
        if !quiet {
            println!("No duplicates to {}", kind.name());
        }
        return Ok(ExitCode::NoDuplicates);
    }

    if args.dry_run || !args.yes {
        if !quiet || args.dry_run {
            println!("Would {} {} file(s):", kind.name(), plan.len());
            write_plan(&mut io::stdout().lock(), &plan)?;
        }
        if args.dry_run || !confirm("Proceed?")? {
            return Ok(ExitCode::Success);
        }
    }

    let mut manager = manager_for(config);
    let report = match actions::execute(&plan, &mut manager) {
        Ok(report) => report,
        Err(ProtectedError::Operation(e)) => {
            return Err(anyhow::Error::new(e).context("Batch reverted, no file was changed"));
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Batch failed")),
    };

    print_report(args.output, &report, quiet)?;
    if outcome.summary.failures() > 0 {
        Ok(ExitCode::PartialSuccess)
    } else {
        Ok(ExitCode::Success)
    }
}

fn kind_target(kind: &ActionKind) -> Option<&Path> {
    match kind {
        ActionKind::Delete => None,
        ActionKind::Move { target_dir } | ActionKind::Copy { target_dir } => Some(target_dir),
    }
}

/// A target inside a scan root would be rescanned on the next run.
fn ensure_outside_roots(target: &Path, roots: &[PathBuf]) -> Result<()> {
    let target = target.canonicalize().unwrap_or_else(|_| target.to_path_buf());
    for root in roots {
        let root = root.canonicalize().unwrap_or_else(|_| root.clone());
        if target.starts_with(&root) {
            bail!(
                "Target {} lies inside scan root {}",
                target.display(),
                root.display()
            );
        }
    }
    Ok(())
}

fn print_report(format: OutputFormat, report: &ActionReport, quiet: bool) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(&mut io::stdout().lock(), report, true)?,
        OutputFormat::Text if !quiet => {
            println!("{}", report.summary());
            if let Some(id) = &report.transaction_id {
                println!("Transaction {} (undo with `safedupe rollback {}`)", id, id);
            }
        }
        OutputFormat::Text => {}
    }
    Ok(())
}

fn run_rollback(args: &RollbackArgs, config: &Config) -> Result<ExitCode> {
    let mut manager = manager_for(config);
    let report = manager
        .rollback_transaction(&args.transaction_id)
        .with_context(|| format!("Cannot roll back transaction {}", args.transaction_id))?;
    println!(
        "Rolled back {}: {} restored, {} removed, {} skipped",
        args.transaction_id, report.restored, report.removed, report.skipped
    );
    Ok(if report.skipped > 0 {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    })
}

fn run_snapshots(args: &SnapshotsArgs, config: &Config) -> Result<ExitCode> {
    let manager = manager_for(config);
    if args.prune {
        let removed = manager.prune_snapshots()?;
        println!("Pruned {} snapshot(s)", removed);
    }
    let snapshots = manager.list_snapshots()?;
    text::write_snapshots(&mut io::stdout().lock(), &snapshots)?;
    Ok(ExitCode::Success)
}
