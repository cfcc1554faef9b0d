//! Helper binary `pg_embedded_setup_unpriv` invokes when tests run as root.
//!
//! The worker receives an operation (`setup`, `start` or `stop`) and the path
//! of a JSON [`WorkerPayload`]. The payload's environment is handed to a
//! second run of this binary through `std::process::Command`, so the
//! PostgreSQL tools it launches inherit it without mutating this process.

use std::env;
use std::ffi::{OsStr, OsString};
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use cap_std::{ambient_authority, fs::Dir};
use color_eyre::eyre::{Context, Report, Result, eyre};
use pg_embedded_setup_unpriv::worker::{PlainSecret, WorkerPayload};
use postgresql_embedded::PostgreSQL;
use tokio::runtime::Builder;

/// Set on the second run once the payload environment is in place.
const ENVIRONMENT_APPLIED: &str = "TRANSIT_PG_WORKER_ENV_APPLIED";

fn main() -> Result<()> {
    color_eyre::install()?;
    run_worker(env::args_os())
}

fn run_worker(mut args: impl Iterator<Item = OsString>) -> Result<()> {
    let _program = args.next();
    let op_arg = args
        .next()
        .ok_or_else(|| eyre!("missing operation argument"))?;
    let operation = Operation::parse(&op_arg)?;
    let config_path = PathBuf::from(
        args.next()
            .ok_or_else(|| eyre!("missing config path argument"))?,
    );
    if let Some(extra) = args.next() {
        return Err(eyre!(
            "unexpected extra argument: {}; expected only operation and config path",
            extra.to_string_lossy()
        ));
    }

    let payload = load_payload(&config_path)?;
    if payload.environment.is_empty() || env::var_os(ENVIRONMENT_APPLIED).is_some() {
        execute(operation, payload)
    } else {
        rerun_with_environment(operation, &config_path, payload.environment)
    }
}

fn load_payload(path: &Path) -> Result<WorkerPayload> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("worker config path {path:?} must name a file"))?;
    let directory = Dir::open_ambient_dir(parent, ambient_authority())
        .with_context(|| format!("failed to open worker config directory {parent:?}"))?;
    let mut raw = Vec::new();
    directory
        .open(Path::new(file_name))
        .and_then(|mut file| file.read_to_end(&mut raw))
        .with_context(|| format!("failed to read worker config at {path:?}"))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse worker config at {path:?}"))
}

fn rerun_with_environment(
    operation: Operation,
    config_path: &Path,
    environment: Vec<(String, Option<PlainSecret>)>,
) -> Result<()> {
    let program = env::current_exe().wrap_err("failed to locate pg_worker executable")?;
    let mut command = Command::new(program);
    command
        .arg(operation.to_string())
        .arg(config_path)
        .env(ENVIRONMENT_APPLIED, "1");
    for (key, value) in environment {
        match value {
            Some(value) => command.env(key, value.expose()),
            None => command.env_remove(key),
        };
    }
    let status = command
        .status()
        .with_context(|| format!("failed to rerun pg_worker {operation}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(eyre!("pg_worker {operation} exited with {status}"))
    }
}

fn execute(operation: Operation, payload: WorkerPayload) -> Result<()> {
    let settings = payload
        .settings
        .into_settings()
        .map_err(|err| Report::new(err).wrap_err("failed to rebuild postgres settings"))?;

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build pg_worker runtime")?;

    let mut postgres = PostgreSQL::new(settings);
    runtime
        .block_on(async move {
            match operation {
                Operation::Setup => postgres.setup().await,
                Operation::Start => postgres.start().await,
                Operation::Stop => postgres.stop().await,
            }
        })
        .with_context(|| format!("postgresql_embedded::{operation} failed"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Setup,
    Start,
    Stop,
}

impl Operation {
    fn parse(raw: &OsStr) -> Result<Self> {
        match raw.to_string_lossy().as_ref() {
            "setup" => Ok(Self::Setup),
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            other => Err(eyre!(
                "unknown pg_worker operation '{other}'; valid operations are setup, start, and stop"
            )),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Setup => "setup",
            Self::Start => "start",
            Self::Stop => "stop",
        })
    }
}
