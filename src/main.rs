use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use diffmend::{
    validate_format, DiskStore, EscalationController, FixReport, GitApply, Patch, WorkspaceGuard,
};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "diffmend")]
#[command(about = "Patch reconciliation for machine-generated diffs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patches to a workspace through the escalation ladder
    Apply {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific patch file to apply (otherwise applies all in patches/)
        #[arg(short, long)]
        patch: Option<PathBuf>,

        /// Dry run - verify applicability without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Emit machine-readable JSON reports instead of human output
        #[arg(long)]
        json: bool,
    },

    /// Check whether patches would apply, without touching the tree
    Check {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific patch file to check (otherwise checks all in patches/)
        #[arg(short, long)]
        patch: Option<PathBuf>,
    },

    /// Parse a patch file and print its structure
    Parse {
        /// Patch file to inspect
        patch: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            workspace,
            patch,
            dry_run,
            diff,
            json,
        } => cmd_apply(workspace, patch, dry_run, diff, json),

        Commands::Check { workspace, patch } => cmd_apply(workspace, patch, true, false, false),

        Commands::Parse { patch } => cmd_parse(&patch),
    }
}

/// Helper: Discover all .patch/.diff files in a patches/ directory.
///
/// Discovery order:
/// 1. `<workspace>/patches` (allows keeping patch files alongside the target).
/// 2. `./patches` relative to the current working directory.
fn discover_patch_files(workspace: &Path) -> Result<Vec<PathBuf>> {
    let cwd_patches_dir = env::current_dir().ok().map(|cwd| cwd.join("patches"));
    let workspace_patches_dir = workspace.join("patches");

    let candidate_dirs: Vec<PathBuf> = std::iter::once(workspace_patches_dir.clone())
        .chain(cwd_patches_dir.into_iter())
        .collect();

    for patches_dir in candidate_dirs {
        if !patches_dir.exists() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&patches_dir).max_depth(1) {
            let entry = entry?;
            let ext = entry.path().extension().and_then(|s| s.to_str());
            if entry.file_type().is_file() && matches!(ext, Some("patch") | Some("diff")) {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "No .patch/.diff files found in either ./patches or {}/patches",
        workspace.display()
    )
}

/// Resolve workspace path using multiple detection strategies
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. DIFFMEND_WORKSPACE environment variable
/// 3. Current directory
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return Ok(path.canonicalize()?);
    }

    if let Ok(env_path) = env::var("DIFFMEND_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: DIFFMEND_WORKSPACE is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    let cwd = env::current_dir()?;
    println!(
        "{}",
        format!("Using current directory as workspace: {}", cwd.display()).dimmed()
    );
    Ok(cwd)
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &str, original: &str, modified: &str) {
    println!("\n{}", format!("--- {} (original)", file).dimmed());
    println!("{}", format!("+++ {} (patched)", file).dimmed());

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

#[derive(Serialize)]
struct PatchRunRecord {
    patch_file: String,
    #[serde(flatten)]
    report: FixReport,
}

fn cmd_apply(
    workspace: Option<PathBuf>,
    patch: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    json: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;

    let patch_files = if let Some(path) = patch {
        vec![path]
    } else {
        discover_patch_files(&workspace)?
    };

    if !json {
        println!("Workspace: {}", workspace.display());
        if dry_run {
            println!("{}", "[DRY RUN - no files will be modified]".cyan());
        }
        println!();
    }

    let native = GitApply;
    let mut total_applied = 0;
    let mut total_failed = 0;
    let mut records: Vec<PatchRunRecord> = Vec::new();

    for patch_file in patch_files {
        let patch_text = fs::read_to_string(&patch_file)?;
        let task = format!("apply {}", patch_file.display());

        // Capture file contents before applying (for diff output). Only
        // files the patch names, to avoid reading unrelated files in
        // large workspaces.
        let mut file_contents_before: HashMap<String, String> = HashMap::new();
        if show_diff {
            for rel in Patch::parse(&patch_text).paths() {
                let full = workspace.join(rel);
                if let Ok(content) = fs::read_to_string(&full) {
                    file_contents_before.insert(rel.to_string(), content);
                }
            }
        }

        let guard = WorkspaceGuard::new(&workspace)?;
        let mut store = if dry_run {
            DiskStore::dry_run(guard)
        } else {
            DiskStore::new(guard)
        };

        let controller = if dry_run {
            EscalationController::new(&native).dry_run()
        } else {
            EscalationController::new(&native)
        };

        let report = controller.run(&mut store, &workspace, &patch_text, &task);

        if json {
            records.push(PatchRunRecord {
                patch_file: patch_file.display().to_string(),
                report,
            });
            continue;
        }

        if report.success {
            let tier = report
                .succeeded_at
                .map(|s| s.label())
                .unwrap_or("unknown");
            let verb = if dry_run { "Would apply" } else { "Applied" };
            println!(
                "{} {}: {} via {} strategy",
                "✓".green(),
                patch_file.display(),
                verb,
                tier
            );
            for file in &report.modified_files {
                println!("    {}", file.dimmed());
            }
            for warning in &report.warnings {
                println!("    {} {}", "warning:".yellow(), warning);
            }
            total_applied += 1;

            if show_diff && !dry_run {
                for file in &report.modified_files {
                    if let Some(before) = file_contents_before.get(file) {
                        if let Ok(after) = fs::read_to_string(workspace.join(file)) {
                            if before != &after {
                                display_diff(file, before, &after);
                            }
                        }
                    }
                }
            }
        } else {
            eprintln!("{} {}: Failed", "✗".red(), patch_file.display());
            if let Some(error) = &report.error {
                for line in error.lines() {
                    eprintln!("  {}", line);
                }
            }
            total_failed += 1;
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        if records.iter().any(|r| !r.report.success) {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_parse(patch_path: &Path) -> Result<()> {
    let patch_text = fs::read_to_string(patch_path)?;

    if let Err(e) = validate_format(&patch_text) {
        eprintln!("{} {}", "✗".red(), e);
        std::process::exit(1);
    }

    let patch = Patch::parse(&patch_text);

    println!("{}", format!("{}", patch_path.display()).bold());
    println!(
        "  {} file(s), {} hunk(s)",
        patch.files.len(),
        patch.hunk_count()
    );

    for file in &patch.files {
        println!();
        println!("{}", file.path.bold());
        for (i, hunk) in file.hunks.iter().enumerate() {
            let header = if hunk.needs_header_synthesis {
                "header missing (will be synthesized from content)".yellow()
            } else {
                format!(
                    "@@ -{},{} +{},{} @@",
                    hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
                )
                .normal()
            };
            println!(
                "  hunk {}: {} ({} context, {} added, {} removed)",
                i + 1,
                header,
                hunk.lines.iter().filter(|l| l.is_context()).count(),
                hunk.lines.iter().filter(|l| l.is_added()).count(),
                hunk.lines.iter().filter(|l| l.is_removed()).count(),
            );
        }
    }

    Ok(())
}
