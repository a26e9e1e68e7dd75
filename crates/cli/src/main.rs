//! notemerge command-line tool.
//!
//! Merges files with the same engine the service uses, inspects pull
//! requests and the audit log, and generates / validates configuration.

mod merge;
mod prs;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use notemerge_core::config::AppConfig;
use notemerge_core::db::Database;
use notemerge_core::{Merger, PullRequestService};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// notemerge command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "notemerge",
    version,
    about = "Three-way merge and pull request inspection for notemerge"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "/etc/notemerge/config.toml")]
    config: PathBuf,

    /// Log level for diagnostics on stderr.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Three-way merge SOURCE into TARGET, both descended from BASE.
    ///
    /// Exits with status 1 when conflict markers were written. Marker labels
    /// come from the config file when it exists.
    Merge {
        base: PathBuf,
        target: PathBuf,
        source: PathBuf,

        /// Write the result here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Resolve every conflict by keeping one side.
        #[arg(long, value_enum)]
        take: Option<merge::Take>,
    },

    /// Inspect pull requests.
    Prs {
        #[command(subcommand)]
        action: PrsAction,
    },

    /// Show recent audit log entries.
    Audit {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./notemerge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

#[derive(Subcommand, Debug)]
enum PrsAction {
    /// List pull requests, newest first.
    List {
        /// Filter by status: open, merged, closed.
        #[arg(short, long)]
        status: Option<String>,

        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Show one pull request with its merge status and history.
    Show { id: String },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    debug!(config = %cli.config.display(), command = ?cli.command, "running command");
    match cli.command {
        Commands::Merge {
            base,
            target,
            source,
            output,
            take,
        } => {
            let merger = merger_for(&cli.config)?;
            let args = merge::MergeFiles {
                base,
                target,
                source,
                output,
                take,
            };
            let conflicted = merge::run(&merger, &args)?;
            Ok(if conflicted {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Init { output } => cmd_init(&output).map(|()| ExitCode::SUCCESS),
        Commands::Validate => cmd_validate(&cli.config).map(|()| ExitCode::SUCCESS),
        Commands::Prs { action } => {
            let config = load_config(&cli.config)?;
            let db = Arc::new(open_database(&config)?);
            match action {
                PrsAction::List { status, limit } => prs::list(&db, status.as_deref(), limit)?,
                PrsAction::Show { id } => {
                    let service =
                        PullRequestService::new(db.clone(), Merger::new(config.merge.marker_labels()));
                    prs::show(&service, &db, &id)?
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Audit { limit } => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;
            cmd_audit(&db, limit).map(|()| ExitCode::SUCCESS)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// Merger with the configured marker labels, or the defaults when no
/// config file exists.
fn merger_for(config_path: &Path) -> Result<Merger> {
    if !config_path.exists() {
        return Ok(Merger::default());
    }
    let config = AppConfig::load_from_file(config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;
    Ok(Merger::new(config.merge.marker_labels()))
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let db_path = config.daemon.database_path();
    debug!(path = %db_path.display(), "opening database");
    let db = Database::new(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    db.initialize().context("failed to initialize database")?;
    Ok(db)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, AppConfig::sample()).context("failed to write config file")?;
    info!(path = %output.display(), "configuration written");

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Set data_dir and the listen address");
    println!("  2. Optionally point admin_password_env at a variable holding the login password");
    println!("  3. Validate with: notemerge validate --config {}", output.display());
    println!("  4. Start the daemon: notemerge-daemon --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  [OK] Environment variable references processed");

    if let Err(e) = config.validate() {
        debug!(error = %e, "configuration rejected");
        println!("  [FAIL] Validation error: {}", e);
        anyhow::bail!("configuration validation failed");
    }
    println!("  [OK] All required fields are valid");

    println!();
    println!("Configuration summary:");
    println!("  Web listen    : {}", config.web.listen);
    println!(
        "  Login         : {}",
        if config.web.auth_enabled() {
            "password set"
        } else if config.web.admin_password_env.is_some() {
            "NOT SET (variable missing, X-User-Id header will be trusted)"
        } else {
            "disabled (X-User-Id header)"
        }
    );
    println!("  Session TTL   : {}h", config.web.session_ttl_hours);
    println!("  Data directory: {}", config.daemon.data_dir.display());
    println!("  Database      : {}", config.daemon.database_path().display());
    let labels = config.merge.marker_labels();
    println!("  Marker labels : {} / {} / {}", labels.source, labels.base, labels.target);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_audit(db: &Database, limit: u32) -> Result<()> {
    let entries = db
        .list_audit_log(limit)
        .context("failed to list audit entries")?;
    debug!(limit, count = entries.len(), "audit entries loaded");

    if entries.is_empty() {
        println!("No audit log entries found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Timestamp", "Action", "Actor", "Pull request", "Details"]);

    for entry in &entries {
        table.add_row(vec![
            entry.created_at.clone(),
            entry.action.clone(),
            entry.actor_id.clone(),
            entry.pull_request_id.clone().unwrap_or_else(|| "-".into()),
            truncate(entry.details.as_deref().unwrap_or(""), 50),
        ]);
    }

    println!("{table}");
    println!("{} entries shown", entries.len());

    Ok(())
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
