use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use safe_patcher::config;
use safe_patcher::{
    telemetry, Match, OperationKind, OperationOptions, OperationRequest, OperationResult, SafePatcher,
};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "safe-patcher")]
#[command(about = "Guarded source-file mutation with automatic rollback", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (defaults to $SAFE_PATCHER_CONFIG, then ./safe-patcher.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the backup directory
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct MatchArgs {
    /// Treat the pattern as a regular expression
    #[arg(long)]
    regex: bool,

    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Whitespace-tolerant approximate matching
    #[arg(long)]
    fuzzy: bool,

    /// ast-grep pattern with $NAME / $$$BODY metavariables
    #[arg(long)]
    structural: bool,

    /// Language hint (overrides the file extension)
    #[arg(long)]
    lang: Option<String>,

    /// Only touch the first occurrence
    #[arg(long)]
    first_only: bool,

    /// Insert text as-is instead of matching the target's indentation
    #[arg(long)]
    no_preserve_indentation: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Show a unified diff of the change
    #[arg(long)]
    diff: bool,
}

impl MatchArgs {
    fn options(&self) -> OperationOptions {
        OperationOptions {
            use_regex: self.regex,
            case_sensitive: !self.ignore_case,
            language_hint: self.lang.clone(),
            preserve_indentation: !self.no_preserve_indentation,
            fuzzy: self.fuzzy,
            structural: self.structural,
            first_only: self.first_only,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Find every occurrence of a pattern
    Search {
        file: PathBuf,
        pattern: String,
        #[command(flatten)]
        args: MatchArgs,
    },

    /// Replace occurrences of a pattern
    Replace {
        file: PathBuf,
        pattern: String,
        replacement: String,
        #[command(flatten)]
        args: MatchArgs,
    },

    /// Insert lines before the first match
    InsertBefore {
        file: PathBuf,
        pattern: String,
        content: String,
        #[command(flatten)]
        args: MatchArgs,
    },

    /// Insert lines after the first match
    InsertAfter {
        file: PathBuf,
        pattern: String,
        content: String,
        #[command(flatten)]
        args: MatchArgs,
    },

    /// Delete occurrences of a pattern
    Delete {
        file: PathBuf,
        pattern: String,
        #[command(flatten)]
        args: MatchArgs,
    },

    /// Print the text of every match
    Extract {
        file: PathBuf,
        pattern: String,
        #[command(flatten)]
        args: MatchArgs,
    },

    /// Check a file's syntax and structure without modifying it
    Validate {
        file: PathBuf,
        #[arg(long)]
        lang: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Restore a file from its confirmed-valid snapshot, or the newest
    /// provisional one
    Restore { file: PathBuf },

    /// List the snapshots kept for a file
    Backups {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Remove provisional snapshots past the retention window
    Prune,

    /// Search every file under a directory
    Grep {
        root: PathBuf,
        pattern: String,
        #[command(flatten)]
        args: MatchArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = config::discover(cli.config.as_deref())?;
    if let Some(dir) = cli.backup_dir {
        settings.backup.directory = dir;
    }
    if let Err(e) = telemetry::initialise(&settings.logging) {
        eprintln!("{}", format!("Warning: logging disabled: {e}").yellow());
    }
    let patcher = SafePatcher::new(settings);

    match cli.command {
        Commands::Search { file, pattern, args } => {
            cmd_operation(&patcher, OperationKind::Search, file, pattern, String::new(), &args)
        }
        Commands::Replace {
            file,
            pattern,
            replacement,
            args,
        } => cmd_operation(&patcher, OperationKind::Replace, file, pattern, replacement, &args),
        Commands::InsertBefore {
            file,
            pattern,
            content,
            args,
        } => cmd_operation(&patcher, OperationKind::InsertBefore, file, pattern, content, &args),
        Commands::InsertAfter {
            file,
            pattern,
            content,
            args,
        } => cmd_operation(&patcher, OperationKind::InsertAfter, file, pattern, content, &args),
        Commands::Delete { file, pattern, args } => {
            cmd_operation(&patcher, OperationKind::Delete, file, pattern, String::new(), &args)
        }
        Commands::Extract { file, pattern, args } => {
            cmd_operation(&patcher, OperationKind::Extract, file, pattern, String::new(), &args)
        }
        Commands::Validate { file, lang, json } => cmd_validate(&patcher, &file, lang.as_deref(), json),
        Commands::Restore { file } => cmd_restore(&patcher, &file),
        Commands::Backups { file, json } => cmd_backups(&patcher, &file, json),
        Commands::Prune => cmd_prune(&patcher),
        Commands::Grep { root, pattern, args } => cmd_grep(&patcher, &root, &pattern, &args),
    }
}

/// Unified diff of a mutation, coloured per line.
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!("\n{}", format!("--- {} (original)", file.display()).dimmed());
    println!("{}", format!("+++ {} (modified)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_match(file: &Path, m: &Match, full_text: bool) {
    let location = format!("{}:{}:{}", file.display(), m.start_line, m.start_column);
    if full_text {
        println!("{}", location.cyan());
        println!("{}", m.text);
    } else {
        let first_line = m.text.lines().next().unwrap_or("");
        println!("{} {}{}{}", location.cyan(), m.before.dimmed(), first_line.bold(), m.after.dimmed());
    }
}

fn report_failure(file: &Path, result: &OperationResult) {
    let message = result
        .error
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "operation failed".to_string());
    eprintln!("{} {}: {}", "✗".red(), file.display(), message);
}

fn cmd_operation(
    patcher: &SafePatcher,
    kind: OperationKind,
    file: PathBuf,
    pattern: String,
    content: String,
    args: &MatchArgs,
) -> Result<()> {
    let before = if args.diff && !kind.is_read_only() {
        fs::read_to_string(&file).ok()
    } else {
        None
    };

    let request = OperationRequest::new(kind, file.clone(), pattern)
        .with_content(content)
        .with_options(args.options());
    let result = patcher.execute(&request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !result.is_success() {
        report_failure(&file, &result);
    } else if kind.is_read_only() {
        for m in &result.matches {
            print_match(&file, m, kind == OperationKind::Extract);
        }
    } else {
        match result.mutations_applied {
            0 => println!("{} {}: already up to date", "⊙".yellow(), file.display()),
            n => println!("{} {}: {} {} applied", "✓".green(), file.display(), n, kind),
        }
        if let Some(warnings) = result.metadata.get("warnings").and_then(|w| w.as_array()) {
            for warning in warnings.iter().filter_map(|w| w.as_str()) {
                eprintln!("  {} {}", "warning:".yellow(), warning);
            }
        }
        if let (Some(before), Some(after)) = (before.as_deref(), result.modified_content.as_deref()) {
            if before != after {
                display_diff(&file, before, after);
            }
        }
    }

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_validate(patcher: &SafePatcher, file: &Path, lang: Option<&str>, json: bool) -> Result<()> {
    let report = patcher.validate_file(file, lang)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_valid() {
        println!(
            "{} {}: valid ({})",
            "✓".green(),
            file.display(),
            report.syntax.language.as_deref().unwrap_or("delimiter check")
        );
    } else {
        eprintln!("{} {}: {} syntax error(s)", "✗".red(), file.display(), report.syntax.error_count());
        for error in &report.syntax.errors {
            eprintln!("  {}:{}: {}", error.line, error.column, error.message);
            eprintln!("    {}", error.context.dimmed());
        }
    }
    if !report.has_valid_snapshot && !json {
        println!("{}", "  no confirmed-valid snapshot recorded".dimmed());
    }

    if !report.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_restore(patcher: &SafePatcher, file: &Path) -> Result<()> {
    let snapshot = patcher
        .backups()
        .recover(file, None)
        .with_context(|| format!("no snapshot could restore {}", file.display()))?;
    patcher.cache().invalidate_path(file);
    println!(
        "{} {}: restored from {} snapshot taken {}",
        "✓".green(),
        file.display(),
        snapshot.class,
        snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

fn cmd_backups(patcher: &SafePatcher, file: &Path, json: bool) -> Result<()> {
    let snapshots = patcher.backups().list(file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }
    if snapshots.is_empty() {
        println!("{}", format!("No snapshots for {}", file.display()).yellow());
        return Ok(());
    }
    for snapshot in &snapshots {
        println!(
            "{:<6} {}  {:016x}  {}",
            snapshot.class.tag(),
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.content_hash,
            snapshot.location.display().to_string().dimmed()
        );
    }
    Ok(())
}

fn cmd_prune(patcher: &SafePatcher) -> Result<()> {
    let removed = patcher
        .backups()
        .prune_provisional(patcher.settings().provisional_retention())?;
    println!("{} removed {} stale provisional snapshot(s)", "✓".green(), removed);
    Ok(())
}

fn cmd_grep(patcher: &SafePatcher, root: &Path, pattern: &str, args: &MatchArgs) -> Result<()> {
    let found = patcher.search_tree(root, pattern, &args.options())?;

    if args.json {
        let entries: Vec<_> = found
            .iter()
            .map(|(path, matches)| serde_json::json!({ "path": path, "matches": matches }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (path, matches) in &found {
            for m in matches {
                print_match(path, m, false);
            }
        }
    }

    if found.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
