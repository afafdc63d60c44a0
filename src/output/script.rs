//! Removal script generation.
//!
//! Instead of disposing of files directly, the user can export the selection as
//! a script, read it, and run it later.
//!
//! # Features
//!
//! * **Multi-platform**: POSIX shell (`remove_duplicates.sh`) and PowerShell
//!   (`remove_duplicates.ps1`).
//! * **Safety-first**: scripts default to a dry run and only move files when
//!   given `--confirm`. Files are moved into a trash directory, never deleted.
//! * **No overwrites**: a name already present in the trash directory gets a
//!   timestamp suffix.
//! * **Robust escaping**: every path is single-quoted for its shell.
//!
//! # Usage
//!
//! ```no_run
//! use imgdedup::output::script::{write_script_file, ScriptType};
//! use std::path::Path;
//!
//! let paths = vec!["/photos/backup/IMG_0001.jpg".to_string()];
//! let script = write_script_file(Path::new("/tmp/out"), &paths, None, ScriptType::detect())?;
//! println!("Wrote {}", script.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::scanner::path_utils::key_to_path;

/// Type of script to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    /// POSIX-compliant shell script (sh/bash/zsh)
    Posix,
    /// PowerShell script
    PowerShell,
}

impl ScriptType {
    /// Detect the appropriate script type for the current platform.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(windows) {
            Self::PowerShell
        } else {
            Self::Posix
        }
    }

    /// File name the script is saved under.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Posix => "remove_duplicates.sh",
            Self::PowerShell => "remove_duplicates.ps1",
        }
    }
}

/// Errors writing a script file.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Nothing to put in the script.
    #[error("no files selected for the script")]
    NoFiles,

    /// The output directory does not exist.
    #[error("output directory not found: {0}")]
    MissingOutputDir(PathBuf),

    /// Writing the script failed.
    #[error("cannot write script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Formatter for a removal script.
pub struct ScriptOutput<'a> {
    /// Files the script moves
    pub paths: &'a [String],
    /// Where the script moves them
    pub trash_dir: &'a Path,
    /// The type of script to generate
    pub script_type: ScriptType,
    /// Timestamp written into the header
    pub generated_at: DateTime<Local>,
}

impl<'a> ScriptOutput<'a> {
    #[must_use]
    pub fn new(paths: &'a [String], trash_dir: &'a Path, script_type: ScriptType) -> Self {
        Self {
            paths,
            trash_dir,
            script_type,
            generated_at: Local::now(),
        }
    }

    #[must_use]
    pub fn with_generated_at(mut self, generated_at: DateTime<Local>) -> Self {
        self.generated_at = generated_at;
        self
    }

    /// Write the generated script to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match self.script_type {
            ScriptType::Posix => self.write_posix(writer),
            ScriptType::PowerShell => self.write_powershell(writer),
        }
    }

    fn write_posix<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "#!/bin/sh")?;
        writeln!(writer, "# imgdedup duplicate removal script")?;
        writeln!(
            writer,
            "# Generated on: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer, "# Files to move: {}", self.paths.len())?;
        writeln!(writer, "#")?;
        writeln!(writer, "# Files are moved into the trash directory, not deleted.")?;
        writeln!(writer, "# Run with --confirm to move them.")?;
        writeln!(writer)?;

        writeln!(writer, "DRY_RUN=1")?;
        writeln!(writer, "if [ \"$1\" = \"--confirm\" ]; then")?;
        writeln!(writer, "    DRY_RUN=0")?;
        writeln!(writer, "fi")?;
        writeln!(writer)?;

        writeln!(
            writer,
            "TRASH_DIR={}",
            escape_posix(&self.trash_dir.to_string_lossy())
        )?;
        writeln!(writer, "MOVED=0")?;
        writeln!(writer, "FAILED=0")?;
        writeln!(writer)?;

        writeln!(writer, "move_file() {{")?;
        writeln!(writer, "    base=$(basename \"$1\")")?;
        writeln!(writer, "    dest=\"$TRASH_DIR/$base\"")?;
        writeln!(writer, "    if [ -e \"$dest\" ]; then")?;
        writeln!(writer, "        stamp=$(date +%Y%m%d_%H%M%S)")?;
        writeln!(writer, "        case \"$base\" in")?;
        writeln!(
            writer,
            "            ?*.*) dest=\"$TRASH_DIR/${{base%.*}}_$stamp.${{base##*.}}\" ;;"
        )?;
        writeln!(writer, "            *) dest=\"$TRASH_DIR/${{base}}_$stamp\" ;;")?;
        writeln!(writer, "        esac")?;
        writeln!(writer, "    fi")?;
        writeln!(writer, "    if [ \"$DRY_RUN\" -eq 1 ]; then")?;
        writeln!(writer, "        echo \"would move: $1\"")?;
        writeln!(writer, "    elif mv \"$1\" \"$dest\" 2>/dev/null; then")?;
        writeln!(writer, "        echo \"Moved: $1\"")?;
        writeln!(writer, "        MOVED=$((MOVED + 1))")?;
        writeln!(writer, "    else")?;
        writeln!(writer, "        echo \"Failed: $1\"")?;
        writeln!(writer, "        FAILED=$((FAILED + 1))")?;
        writeln!(writer, "    fi")?;
        writeln!(writer, "}}")?;
        writeln!(writer)?;

        writeln!(writer, "if [ \"$DRY_RUN\" -eq 1 ]; then")?;
        writeln!(writer, "    echo \"DRY RUN MODE. No files will be moved.\"")?;
        writeln!(writer, "    echo \"Run with --confirm to actually move files.\"")?;
        writeln!(writer, "    echo")?;
        writeln!(writer, "else")?;
        writeln!(writer, "    mkdir -p \"$TRASH_DIR\" || exit 1")?;
        writeln!(writer, "fi")?;
        writeln!(writer)?;

        for path in self.paths {
            writer.write_all(b"move_file ")?;
            writer.write_all(&posix_path_word(path))?;
            writeln!(writer)?;
        }
        writeln!(writer)?;

        writeln!(writer, "if [ \"$DRY_RUN\" -eq 0 ]; then")?;
        writeln!(
            writer,
            "    echo \"Done. Moved $MOVED files, $FAILED failed. Moved files are in: $TRASH_DIR\""
        )?;
        writeln!(writer, "else")?;
        writeln!(writer, "    echo \"Dry run complete. No files were moved.\"")?;
        writeln!(writer, "fi")?;

        Ok(())
    }

    fn write_powershell<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "# imgdedup duplicate removal script")?;
        writeln!(
            writer,
            "# Generated on: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer, "# Files to move: {}", self.paths.len())?;
        writeln!(writer, "#")?;
        writeln!(writer, "# Files are moved into the trash directory, not deleted.")?;
        writeln!(writer, "# Run with --confirm to move them.")?;
        writeln!(writer)?;

        writeln!(writer, "$DryRun = $true")?;
        writeln!(writer, "if ($args[0] -eq \"--confirm\") {{")?;
        writeln!(writer, "    $DryRun = $false")?;
        writeln!(writer, "}}")?;
        writeln!(writer)?;

        writeln!(
            writer,
            "$TrashDir = {}",
            escape_powershell(&powershell_path(&self.trash_dir.to_string_lossy()))
        )?;
        writeln!(writer, "$Moved = 0")?;
        writeln!(writer, "$Failed = 0")?;
        writeln!(writer)?;

        writeln!(writer, "function Move-Duplicate([string]$Source) {{")?;
        writeln!(writer, "    $Name = Split-Path -Path $Source -Leaf")?;
        writeln!(writer, "    $Dest = Join-Path $TrashDir $Name")?;
        writeln!(writer, "    if (Test-Path -LiteralPath $Dest) {{")?;
        writeln!(writer, "        $Stamp = Get-Date -Format 'yyyyMMdd_HHmmss_fff'")?;
        writeln!(
            writer,
            "        $Dest = Join-Path $TrashDir ([IO.Path]::GetFileNameWithoutExtension($Name) + '_' + $Stamp + [IO.Path]::GetExtension($Name))"
        )?;
        writeln!(writer, "    }}")?;
        writeln!(writer, "    if ($DryRun) {{")?;
        writeln!(writer, "        Write-Host \"would move: $Source\"")?;
        writeln!(writer, "        return")?;
        writeln!(writer, "    }}")?;
        writeln!(writer, "    try {{")?;
        writeln!(
            writer,
            "        Move-Item -LiteralPath $Source -Destination $Dest -ErrorAction Stop"
        )?;
        writeln!(writer, "        Write-Host \"Moved: $Source\" -ForegroundColor Green")?;
        writeln!(writer, "        $script:Moved++")?;
        writeln!(writer, "    }} catch {{")?;
        writeln!(
            writer,
            "        Write-Host \"Failed: $Source - $_\" -ForegroundColor Red"
        )?;
        writeln!(writer, "        $script:Failed++")?;
        writeln!(writer, "    }}")?;
        writeln!(writer, "}}")?;
        writeln!(writer)?;

        writeln!(writer, "if ($DryRun) {{")?;
        writeln!(writer, "    Write-Host \"DRY RUN MODE. No files will be moved.\"")?;
        writeln!(
            writer,
            "    Write-Host \"Run with --confirm to actually move files.\""
        )?;
        writeln!(writer, "    Write-Host \"\"")?;
        writeln!(writer, "}} elseif (-not (Test-Path -LiteralPath $TrashDir)) {{")?;
        writeln!(
            writer,
            "    New-Item -ItemType Directory -Path $TrashDir -Force | Out-Null"
        )?;
        writeln!(writer, "}}")?;
        writeln!(writer)?;

        for path in self.paths {
            writeln!(
                writer,
                "Move-Duplicate {}",
                escape_powershell(&powershell_path(path))
            )?;
        }
        writeln!(writer)?;

        writeln!(writer, "if (-not $DryRun) {{")?;
        writeln!(
            writer,
            "    Write-Host \"Done. Moved $Moved files, $Failed failed. Moved files are in: $TrashDir\" -ForegroundColor Cyan"
        )?;
        writeln!(writer, "}} else {{")?;
        writeln!(
            writer,
            "    Write-Host \"Dry run complete. No files were moved.\""
        )?;
        writeln!(writer, "}}")?;

        Ok(())
    }
}

/// Write a removal script for `paths` into `output_dir`.
///
/// The trash directory defaults to `<output_dir>/trash`. Returns the script's
/// path. POSIX scripts are made executable.
///
/// # Errors
///
/// [`ScriptError::NoFiles`] for an empty list, [`ScriptError::MissingOutputDir`]
/// when `output_dir` is not a directory, [`ScriptError::Io`] when writing fails.
pub fn write_script_file(
    output_dir: &Path,
    paths: &[String],
    trash_dir: Option<&Path>,
    script_type: ScriptType,
) -> Result<PathBuf, ScriptError> {
    if paths.is_empty() {
        return Err(ScriptError::NoFiles);
    }
    if !output_dir.is_dir() {
        return Err(ScriptError::MissingOutputDir(output_dir.to_path_buf()));
    }

    let default_trash = output_dir.join("trash");
    let trash_dir = trash_dir.unwrap_or(&default_trash);
    let script_path = output_dir.join(script_type.file_name());

    let mut contents = Vec::new();
    if script_type == ScriptType::PowerShell {
        // Windows PowerShell only reads UTF-8 with a byte order mark.
        contents.extend_from_slice(b"\xEF\xBB\xBF");
    }
    let io_err = |source| ScriptError::Io {
        path: script_path.clone(),
        source,
    };
    ScriptOutput::new(paths, trash_dir, script_type)
        .write_to(&mut contents)
        .map_err(io_err)?;
    fs::write(&script_path, &contents).map_err(io_err)?;
    make_executable(&script_path).map_err(io_err)?;

    log::info!(
        "Wrote {} ({} files)",
        script_path.display(),
        paths.len()
    );
    Ok(script_path)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn escape_posix(s: &str) -> String {
    // Wrap in single quotes, escape single quotes as '\''
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Single-quoted shell word naming the file behind an index key, byte for byte.
fn posix_path_word(key: &str) -> Vec<u8> {
    #[cfg(unix)]
    let raw = {
        use std::os::unix::ffi::OsStringExt;
        key_to_path(key).into_os_string().into_vec()
    };
    #[cfg(not(unix))]
    let raw = key_to_path(key).to_string_lossy().into_owned().into_bytes();

    let mut word = Vec::with_capacity(raw.len() + 2);
    word.push(b'\'');
    for byte in raw {
        if byte == b'\'' {
            word.extend_from_slice(b"'\\''");
        } else {
            word.push(byte);
        }
    }
    word.push(b'\'');
    word
}

fn escape_powershell(s: &str) -> String {
    // Wrap in single quotes, escape single quotes as ''
    format!("'{}'", s.replace('\'', "''"))
}

/// Drive-letter keys go back to backslash form; others are left alone so the
/// script also works under PowerShell on Unix.
fn powershell_path(path: &str) -> String {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        path.replace('/', "\\")
    } else {
        path.to_string()
    }
}
