//! Maintenance commands for the schedule store.
//!
//! Results are printed to stdout as JSON; logs go to stderr as JSON lines
//! filtered by `RUST_LOG`.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cap_std::{ambient_authority, fs::Dir};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use ortho_config::OrthoConfig;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::runtime::Builder;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

use transit_schedules::config::PersistenceSettings;
use transit_schedules::domain::ScheduleKey;
use transit_schedules::domain::ScheduleService;
use transit_schedules::domain::ports::StaticPathTopology;
use transit_schedules::outbound::persistence::{DbPool, DieselScheduleRepository, run_migrations};

/// `schedules-admin` command arguments.
#[derive(Debug, Parser)]
#[command(
    name = "schedules-admin",
    about = "Inspect and maintain stored transit schedules",
    version
)]
struct CliArgs {
    /// Database connection URL. Overrides `SCHEDULES_DB_DATABASE_URL`.
    #[arg(long = "database-url", value_name = "url", global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// List stored schedules.
    List {
        /// Only schedules of this line.
        #[arg(long, value_name = "uuid")]
        line: Option<Uuid>,
    },
    /// Print one schedule.
    Show {
        /// Surrogate key.
        id: i32,
    },
    /// Validate and store a schedule from a JSON file.
    Import {
        /// Editor payload.
        file: PathBuf,
        /// Node count of a path, checked against trip timing arrays.
        #[arg(
            long = "path-nodes",
            value_name = "uuid=count",
            value_parser = parse_path_nodes
        )]
        path_nodes: Vec<(Uuid, usize)>,
    },
    /// Delete a schedule with its periods and trips.
    Delete {
        /// Surrogate key, or the schedule UUID (deprecated).
        key: ScheduleKey,
    },
    /// Remove every stored schedule.
    Truncate,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(error) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .with_writer(std::io::stderr)
        .try_init()
    {
        warn!(error = %error, "tracing init failed");
    }

    let args = CliArgs::parse();
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build Tokio runtime")?;
    let output = runtime.block_on(run(args))?;
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &output)?;
    writeln!(stdout)?;
    Ok(())
}

async fn run(args: CliArgs) -> Result<Value> {
    let settings = PersistenceSettings::load_from_iter([OsString::from("schedules-admin")])
        .map_err(|error| eyre!("failed to load store settings: {error}"))?;
    let pool_config = settings.pool_config(args.database_url.as_deref())?;

    if matches!(args.command, Command::Migrate) {
        let url = pool_config.database_url().to_owned();
        let applied = tokio::task::spawn_blocking(move || run_migrations(&url))
            .await
            .wrap_err("migration task panicked")??;
        info!(count = applied.len(), "migrations complete");
        return Ok(json!({ "applied": applied }));
    }

    let pool = DbPool::new(pool_config)
        .await
        .wrap_err("failed to create database pool")?;
    let repository = Arc::new(DieselScheduleRepository::new(pool));
    let paths = match &args.command {
        Command::Import { path_nodes, .. } => StaticPathTopology::new(path_nodes.iter().copied()),
        _ => StaticPathTopology::default(),
    };
    let service = ScheduleService::new(repository, Arc::new(paths));

    match args.command {
        Command::Migrate => Err(eyre!("migrations are applied before the pool is built")),
        Command::List { line } => {
            let schedules = match line {
                Some(line_id) => service.read_for_line(line_id).await,
                None => service.collection().await,
            }
            .wrap_err("failed to list schedules")?;
            to_json(&schedules)
        }
        Command::Show { id } => {
            let schedule = service
                .read(id)
                .await
                .wrap_err_with(|| format!("failed to read schedule {id}"))?;
            to_json(&schedule)
        }
        Command::Import { file, .. } => {
            let payload = read_payload(&file)?;
            let id = service
                .import(payload)
                .await
                .wrap_err_with(|| format!("failed to import {}", file.display()))?;
            Ok(json!({ "integer_id": id }))
        }
        Command::Delete { key } => {
            let id = service
                .delete(key)
                .await
                .wrap_err_with(|| format!("failed to delete schedule {key}"))?;
            Ok(json!({ "integer_id": id }))
        }
        Command::Truncate => {
            service
                .repository()
                .truncate_schedules()
                .await
                .wrap_err("failed to truncate schedules")?;
            Ok(json!({ "truncated": true }))
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).wrap_err("failed to encode output")
}

fn read_payload(path: &Path) -> Result<Value> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("input path '{}' must name a file", path.display()))?;
    let directory = Dir::open_ambient_dir(parent, ambient_authority())
        .wrap_err_with(|| format!("open input parent directory '{}'", parent.display()))?;
    let mut file = directory
        .open(Path::new(file_name))
        .wrap_err_with(|| format!("open input file '{}'", path.display()))?;
    let mut raw = String::new();
    file.read_to_string(&mut raw)
        .wrap_err_with(|| format!("read input file '{}'", path.display()))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("'{}' is not JSON", path.display()))
}

fn parse_path_nodes(raw: &str) -> Result<(Uuid, usize), String> {
    let (path, count) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <uuid>=<count>, got `{raw}`"))?;
    let path_id = Uuid::parse_str(path.trim())
        .map_err(|error| format!("invalid path id `{path}`: {error}"))?;
    let nodes = count
        .trim()
        .parse::<usize>()
        .map_err(|error| format!("invalid node count `{count}`: {error}"))?;
    if nodes < 2 {
        return Err(format!("a path visits at least two nodes, got {nodes}"));
    }
    Ok((path_id, nodes))
}
