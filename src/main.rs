use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

mod archive;
mod backup;
mod config;
mod forge;
mod git;
mod observability;
mod retention;
mod storage;
mod timefmt;

#[cfg(test)]
mod tests;

use crate::backup::BackupEngine;
use crate::config::BackupConfig;

/// CLI arguments for forgevault
#[derive(Parser, Debug)]
#[command(version, about = "Unattended backups of git forge organisations into object storage", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./forgevault.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run one backup pass followed by a retention sweep (default)
    Run,
    /// Enforce the retention policy without taking a backup
    Sweep,
    /// Run backups in a loop at the configured interval
    Daemon,
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to ./forgevault.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => {
            run_init(output, force);
        }
        Some(Command::Sweep) => {
            run_sweep(args.config.as_deref()).await;
        }
        Some(Command::Daemon) => {
            run_daemon(args.config.as_deref()).await;
        }
        Some(Command::Run) | None => {
            run_backup(args.config.as_deref()).await;
        }
    }
}

/// Default configuration written by `forgevault init`.
fn default_config_toml() -> &'static str {
    r#"# forgevault configuration

[forge]
username = "${GITHUB_USERNAME}"
password = "${GITHUB_PASSWORD}"
# api_base = "https://api.github.com"
organisations = []

[storage.s3]
bucket = "${S3_BUCKET}"
region = "${AWS_REGION}"
# Credentials via env vars AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY
# or IAM role. For MinIO-compatible stores:
# endpoint = "http://localhost:9000"
# force_path_style = true

[retention]
keep_last_backup_days = 7

# [backup]
# scratch_dir = "repositories"
# interval_hours = 24
"#
}

/// Initialize a new configuration file
fn run_init(output: Option<String>, force: bool) {
    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("forgevault.toml"));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("Fill in the organisations list, then run:");
    println!("  forgevault run --config {}", output_path.display());
}

/// Resolve and load the configuration, exiting on any setup failure.
fn load_config(explicit_path: Option<&str>) -> BackupConfig {
    let path = match explicit_path {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from("forgevault.toml"),
    };

    if !path.exists() {
        eprintln!("Config file not found: {}", path.display());
        eprintln!("Run 'forgevault init' to create one.");
        std::process::exit(1);
    }

    match BackupConfig::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

/// Build the engine from configuration, exiting on any setup failure.
async fn build_engine(config: BackupConfig) -> BackupEngine {
    let config = Arc::new(config);

    let forge = match forge::ForgeClient::new(&config.forge) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "failed to construct forge client");
            std::process::exit(1);
        }
    };

    let source = Arc::new(git::GitCommandSource::new(&config.forge));
    let store = Arc::new(storage::S3ObjectStore::new(&config.storage.s3).await);

    BackupEngine::new(config, forge, source, store)
}

/// Run one backup pass.
///
/// The exit status reflects only fatal/setup failures; individual
/// repository misses are reported in the logs and do not fail the
/// process.
async fn run_backup(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    observability::init_tracing(&config.observability);

    let engine = build_engine(config).await;
    if let Err(e) = engine.run().await {
        tracing::error!(error = %e, "backup run aborted");
        std::process::exit(1);
    }
}

/// Enforce the retention policy without taking a backup.
async fn run_sweep(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    observability::init_tracing(&config.observability);

    let store = storage::S3ObjectStore::new(&config.storage.s3).await;
    if let Err(e) = retention::sweep(&store, config.retention.keep_last_backup_days).await {
        tracing::error!(error = %e, "retention sweep failed");
        std::process::exit(1);
    }
}

/// Run backups in a loop at the configured interval.
async fn run_daemon(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    observability::init_tracing(&config.observability);

    let engine = build_engine(config).await;
    backup::start_backup_worker(engine).await;
}
