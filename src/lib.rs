//! imgdedup - incremental duplicate image finder
//!
//! Keeps a persistent index of image fingerprints so that rescans only read
//! new or changed files, groups byte-identical images, and disposes of the
//! redundant copies one folder combination at a time.

pub mod actions;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod index;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytesize::ByteSize;
use yansi::Paint;

use crate::actions::{DisposalMode, DisposalReport};
use crate::cli::{
    ApplyArgs, Cli, Commands, ConfigArgs, DisposeArgs, ListArgs, PatternsArgs, RuleArgs, ScanArgs,
    ScriptArgs,
};
use crate::config::Config;
use crate::duplicates::{DisposalPlan, DisposalRule};
use crate::engine::DedupEngine;
use crate::error::ExitCode;
use crate::output::ScriptType;
use crate::progress::{ProgressSink, ScanProgress};
use crate::scanner::{index_key, AlwaysRehash, ScanSummary};

/// Run one parsed command line and report how it went.
///
/// # Errors
///
/// Any failure that stops the command; per-file problems are reported through
/// the exit code instead.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    if cli.no_color {
        yansi::disable();
    }
    logging::init_logging(cli.verbose, cli.quiet);

    if let Commands::Config(args) = &cli.command {
        return run_config(&cli, args);
    }

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = &cli.db {
        config.database = Some(db.clone());
    }

    match &cli.command {
        Commands::Scan(args) => run_scan(&cli, &mut config, args),
        Commands::List(args) => run_list(&cli, &config, args),
        Commands::Patterns(args) => run_patterns(&cli, &config, args),
        Commands::Apply(args) => run_apply(&cli, &config, args),
        Commands::Dispose(args) => run_dispose(&cli, &config, args),
        Commands::Script(args) => run_script(&cli, &config, args),
        Commands::Config(args) => run_config(&cli, args),
    }
}

fn open_engine(config: &Config) -> Result<DedupEngine> {
    DedupEngine::from_config(config).context("Failed to open the index")
}

fn run_scan(cli: &Cli, config: &mut Config, args: &ScanArgs) -> Result<ExitCode> {
    config.ignore_patterns.extend(args.ignore_patterns.iter().cloned());
    config.follow_symlinks |= args.follow_symlinks;
    config.skip_hidden |= args.skip_hidden;
    if let Some(threads) = args.io_threads {
        config.io_threads = threads;
    }
    if let Some(batch) = args.batch_size {
        config.batch_size = batch;
    }

    let shutdown = signal::install_handler();
    let mut engine = open_engine(config)?.with_shutdown_flag(shutdown.get_flag());
    if args.rehash {
        engine = engine.with_validator(Arc::new(AlwaysRehash));
    }

    let (sink, events) = ProgressSink::bounded(config.progress_buffer);
    let display = ScanProgress::new(cli.quiet || args.json).spawn(events);
    let result = engine.scan(&args.roots, &sink);
    drop(sink);
    let tally = display.join().unwrap_or_default();
    log::debug!(
        "Progress display saw {} files and {} problems",
        tally.files,
        tally.problems
    );

    let summary = result.context("Scan failed")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !cli.quiet {
        print_scan_summary(&summary);
    }
    Ok(ExitCode::for_scan(&summary))
}

fn print_scan_summary(summary: &ScanSummary) {
    let status = if summary.interrupted {
        "Scan interrupted".yellow().bold()
    } else {
        "Scan complete".green().bold()
    };
    println!(
        "{status}: {} files in {} root(s) ({:.1?})",
        summary.files_seen, summary.roots, summary.duration
    );
    println!(
        "  {} cached, {} new, {} changed, {} removed from index",
        summary.cached, summary.hashed_new, summary.hashed_updated, summary.pruned
    );
    if summary.has_errors() {
        println!(
            "  {}",
            format!(
                "{} unreadable, {} walk errors, {} write failures",
                summary.hash_failures, summary.walk_errors, summary.write_failures
            )
            .red()
        );
    }
    if summary.dropped_events > 0 {
        println!("  {} progress updates skipped", summary.dropped_events);
    }
    println!(
        "  {} duplicate group(s)",
        summary.duplicate_groups.bold()
    );
}

fn run_list(cli: &Cli, config: &Config, args: &ListArgs) -> Result<ExitCode> {
    let engine = open_engine(config)?;
    let page = engine
        .list_duplicates(args.offset(), Some(args.page_size as usize))
        .context("Failed to list duplicates")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else if !cli.quiet {
        for (i, group) in page.groups.iter().enumerate() {
            println!(
                "{} {} x {} ({} wasted) {}",
                format!("#{}", page.offset + i + 1).bold(),
                group.len(),
                ByteSize::b(group.size),
                ByteSize::b(group.wasted_space()),
                group.digest.get(..12).unwrap_or(group.digest.as_str()).dim()
            );
            for path in group.paths() {
                println!("    {path}");
            }
        }
        println!(
            "Page {} of {} ({} groups, {} files in total)",
            args.page,
            page.total_pages().max(1),
            page.total_groups,
            page.total_files
        );
    }

    if page.total_groups == 0 {
        return Ok(ExitCode::NoDuplicates);
    }
    Ok(ExitCode::Success)
}

fn run_patterns(cli: &Cli, config: &Config, args: &PatternsArgs) -> Result<ExitCode> {
    let engine = open_engine(config)?;
    let patterns = engine
        .list_folder_patterns()
        .context("Failed to list folder patterns")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&patterns)?);
    } else if !cli.quiet {
        for pattern in &patterns {
            println!(
                "{} groups, {} files: {}",
                pattern.duplicate_count.bold(),
                pattern.total_files,
                pattern.id.cyan()
            );
            for folder in &pattern.folders {
                println!("    {folder}");
            }
        }
    }

    if patterns.is_empty() {
        return Ok(ExitCode::NoDuplicates);
    }
    Ok(ExitCode::Success)
}

fn run_apply(cli: &Cli, config: &Config, args: &ApplyArgs) -> Result<ExitCode> {
    let rules = collect_rules(&args.rules)?;
    let mode = args
        .disposal
        .mode(config.trash_dir.as_deref())
        .map_err(anyhow::Error::msg)?;

    let engine = open_engine(config)?;
    let plan = engine
        .plan_batch_rules(&rules)
        .context("Failed to resolve rules")?;

    if args.dry_run {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else if !cli.quiet {
            print_plan(&plan);
        }
        return Ok(ExitCode::Success);
    }

    log_mode(&mode);
    let report = engine
        .apply_plan(&plan, &mode)
        .context("Failed to apply rules")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !cli.quiet {
        print_report(&report);
    }
    if !plan.rejected.is_empty() {
        return Ok(ExitCode::PartialSuccess);
    }
    Ok(ExitCode::for_disposal(&report))
}

fn print_plan(plan: &DisposalPlan) {
    for path in &plan.paths {
        println!("would dispose: {path}");
    }
    for rejected in &plan.rejected {
        println!(
            "{} {} keeps {}, which holds no copy of {}",
            "rejected:".yellow(),
            rejected.pattern_id,
            rejected.keep_folder,
            rejected.digest
        );
    }
    println!(
        "{} files from {} groups; {} groups without a rule",
        plan.paths.len(),
        plan.groups_matched,
        plan.groups_untouched
    );
}

fn run_dispose(cli: &Cli, config: &Config, args: &DisposeArgs) -> Result<ExitCode> {
    let mode = args
        .disposal
        .mode(config.trash_dir.as_deref())
        .map_err(anyhow::Error::msg)?;
    let engine = open_engine(config)?;
    log_mode(&mode);
    let report = engine
        .dispose_files(&args.paths, &mode)
        .context("Failed to dispose of files")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !cli.quiet {
        print_report(&report);
    }
    Ok(ExitCode::for_disposal(&report))
}

fn log_mode(mode: &DisposalMode) {
    if mode.is_permanent() {
        log::warn!("Disposal mode: {}", mode.describe());
    } else {
        log::info!("Disposal mode: {}", mode.describe());
    }
}

fn print_report(report: &DisposalReport) {
    for (path, reason) in &report.failures {
        println!("{} {path}: {reason}", "failed:".red());
    }
    let summary = report.summary();
    if report.all_succeeded() {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.yellow());
    }
}

fn run_script(cli: &Cli, config: &Config, args: &ScriptArgs) -> Result<ExitCode> {
    let engine = open_engine(config)?;
    let mut paths: Vec<String> = args.paths.iter().map(|p| index_key(p)).collect();

    let rules = collect_rules(&args.rules)?;
    if !rules.is_empty() {
        let plan = engine
            .plan_batch_rules(&rules)
            .context("Failed to resolve rules")?;
        paths.extend(plan.paths);
    }
    let mut seen = HashSet::new();
    paths.retain(|path| seen.insert(path.clone()));

    let script_type = args.shell.map_or_else(ScriptType::detect, ScriptType::from);
    let written = engine
        .write_script(&paths, &args.output_dir, args.trash_dir.as_deref(), script_type)
        .context("Failed to write script")?;
    if !cli.quiet {
        println!(
            "Wrote {} ({} files). Run it with --confirm to move them.",
            written.display().bold(),
            paths.len()
        );
    }
    Ok(ExitCode::Success)
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<ExitCode> {
    if args.init {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => Config::default_path()?,
        };
        if path.exists() && !args.force {
            bail!(
                "{} already exists; use --force to overwrite it",
                path.display()
            );
        }
        Config::default().save(&path)?;
        if !cli.quiet {
            println!("Wrote default configuration to {}", path.display());
        }
        return Ok(ExitCode::Success);
    }

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = &cli.db {
        config.database = Some(db.clone());
    }
    if config.database.is_none() {
        config.database = Config::default_database().ok();
    }
    print!("{}", config.to_toml()?);
    Ok(ExitCode::Success)
}

/// Rules from `--rule` flags followed by those in the `--rules` file.
fn collect_rules(args: &RuleArgs) -> Result<Vec<DisposalRule>> {
    let mut rules = args.rules.clone();
    if let Some(file) = &args.rules_file {
        rules.extend(read_rules_file(file)?);
    }
    Ok(rules)
}

/// Parse a rules file: one `PATTERN=>FOLDER` per line, `#` comments.
///
/// # Errors
///
/// Fails if the file cannot be read or a line is not a valid rule.
pub fn read_rules_file(path: &Path) -> Result<Vec<DisposalRule>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules from {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| {
            line.parse::<DisposalRule>()
                .with_context(|| format!("{}:{n}", path.display()))
        })
        .collect()
}
