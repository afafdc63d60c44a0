//! Command-line interface definitions for imgdedup.
//!
//! # Example
//!
//! ```bash
//! # Index two photo trees
//! imgdedup scan ~/Pictures /mnt/backup/photos
//!
//! # Review duplicates, 50 groups per page
//! imgdedup list --page 2
//!
//! # See which folder combinations the duplicates fall into
//! imgdedup patterns
//!
//! # Keep the copies under ~/Pictures for one pattern, trash the rest
//! imgdedup apply --rule '/home/me/Pictures|/mnt/backup/photos=>/home/me/Pictures'
//!
//! # Or write a script to review and run later
//! imgdedup script --rules rules.txt --output-dir ./cleanup
//! ```

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::actions::DisposalMode;
use crate::duplicates::DisposalRule;
use crate::output::ScriptType;

/// Incremental duplicate image finder.
///
/// imgdedup keeps a persistent index of image fingerprints so rescans only
/// read new or changed files, groups identical images, and cleans them up one
/// folder combination at a time.
#[derive(Debug, Parser)]
#[command(name = "imgdedup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file to use instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Index database to use instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan directories and update the index
    Scan(ScanArgs),
    /// List duplicate groups page by page
    List(ListArgs),
    /// List folder patterns across all duplicate groups
    Patterns(PatternsArgs),
    /// Apply keep-folder rules to folder patterns
    Apply(ApplyArgs),
    /// Dispose of specific files
    Dispose(DisposeArgs),
    /// Write a removal script instead of disposing directly
    Script(ScriptArgs),
    /// Show or initialize the configuration
    Config(ConfigArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directories to scan, in order
    #[arg(value_name = "ROOT", required = true)]
    pub roots: Vec<PathBuf>,

    /// Glob patterns to ignore (can be specified multiple times)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Follow symbolic links during scan
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Number of hashing threads
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Files per index round trip
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Re-read every file instead of trusting unchanged size and mtime
    #[arg(long)]
    pub rehash: bool,

    /// Print the scan summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the list subcommand.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub page: u64,

    /// Groups per page
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..))]
    pub page_size: u64,

    /// Print the page as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    /// Offset of the first group on the requested page.
    #[must_use]
    pub fn offset(&self) -> usize {
        ((self.page - 1) * self.page_size) as usize
    }
}

/// Arguments for the patterns subcommand.
#[derive(Debug, Args)]
pub struct PatternsArgs {
    /// Print the patterns as JSON
    #[arg(long)]
    pub json: bool,
}

/// Where keep-folder rules come from.
#[derive(Debug, Args)]
pub struct RuleArgs {
    /// Rule of the form 'PATTERN=>KEEP_FOLDER' (can be specified multiple times)
    #[arg(long = "rule", value_name = "RULE")]
    pub rules: Vec<DisposalRule>,

    /// File with one rule per line; blank lines and lines starting with # are skipped
    #[arg(long = "rules", value_name = "FILE")]
    pub rules_file: Option<PathBuf>,
}

/// How files are disposed of.
#[derive(Debug, Args)]
pub struct DisposalArgs {
    /// Move files into this directory
    #[arg(long, value_name = "DIR")]
    pub trash_dir: Option<PathBuf>,

    /// Move files to the system recycle bin
    #[arg(long, conflicts_with = "trash_dir")]
    pub system_trash: bool,

    /// Delete files permanently
    ///
    /// Warning: Files cannot be recovered after permanent deletion.
    #[arg(long, conflicts_with_all = ["trash_dir", "system_trash"])]
    pub permanent: bool,

    /// Confirm permanent deletion
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl DisposalArgs {
    /// Pick the disposal mode.
    ///
    /// Without flags, the configured trash directory is used if there is one,
    /// else the system recycle bin.
    ///
    /// # Errors
    ///
    /// `--permanent` without `--yes`.
    pub fn mode(&self, configured_trash: Option<&Path>) -> Result<DisposalMode, String> {
        if self.permanent {
            if !self.yes {
                return Err("--permanent deletes files for good; add --yes to confirm".to_string());
            }
            return Ok(DisposalMode::Delete);
        }
        if self.system_trash {
            return Ok(DisposalMode::SystemTrash);
        }
        match self.trash_dir.as_deref().or(configured_trash) {
            Some(dir) => Ok(DisposalMode::TrashDir(dir.to_path_buf())),
            None => Ok(DisposalMode::SystemTrash),
        }
    }
}

/// Arguments for the apply subcommand.
#[derive(Debug, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub rules: RuleArgs,

    #[command(flatten)]
    pub disposal: DisposalArgs,

    /// Show what would be disposed of without touching any file
    #[arg(long)]
    pub dry_run: bool,

    /// Print the plan or report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the dispose subcommand.
#[derive(Debug, Args)]
pub struct DisposeArgs {
    /// Files to dispose of
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub disposal: DisposalArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the script subcommand.
#[derive(Debug, Args)]
pub struct ScriptArgs {
    /// Files to put in the script
    #[arg(value_name = "PATH", required_unless_present_any = ["rules", "rules_file"])]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub rules: RuleArgs,

    /// Directory the script is written to
    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Directory the script moves files into (default: OUTPUT_DIR/trash)
    #[arg(long, value_name = "DIR")]
    pub trash_dir: Option<PathBuf>,

    /// Script flavor (default: PowerShell on Windows, POSIX shell elsewhere)
    #[arg(long, value_enum)]
    pub shell: Option<ShellArg>,
}

/// Script flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShellArg {
    Posix,
    Powershell,
}

impl From<ShellArg> for ScriptType {
    fn from(shell: ShellArg) -> Self {
        match shell {
            ShellArg::Posix => ScriptType::Posix,
            ShellArg::Powershell => ScriptType::PowerShell,
        }
    }
}

/// Arguments for the config subcommand.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Write the default configuration file
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    pub force: bool,
}
