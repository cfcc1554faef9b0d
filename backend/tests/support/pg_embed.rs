//! Embedded PostgreSQL for integration tests.
//!
//! One cluster is shared per test binary. Each test gets its own database
//! cloned from a template that already carries the schedule migrations, so
//! suites never observe each other's rows.
//!
//! Setup failures skip the calling test with a `SKIP-TEST-CLUSTER` marker
//! unless `SKIP_TEST_CLUSTER` is explicitly falsy, in which case they fail
//! it so CI breakage is not masked.

use std::any::Any;
use std::panic;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use pg_embedded_setup_unpriv::test_support::hash_directory;
use pg_embedded_setup_unpriv::{ClusterHandle, TemporaryDatabase};
use transit_schedules::outbound::persistence::run_migrations;
use uuid::Uuid;

static TEMPLATE_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const TEMPLATE_NAME_PREFIX: &str = "transit_schedules_template";
const RETRIES: usize = 5;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Whether `SKIP_TEST_CLUSTER` asks for setup failures to be fatal.
fn cluster_required() -> bool {
    std::env::var("SKIP_TEST_CLUSTER")
        .map(|value| matches!(value.to_lowercase().as_str(), "0" | "false" | "no"))
        .unwrap_or(false)
}

/// Report a cluster setup failure.
///
/// Prints a skip marker and returns `None`, or panics when the cluster is
/// required.
pub fn handle_cluster_setup_failure<T>(reason: impl std::fmt::Display) -> Option<T> {
    assert!(
        !cluster_required(),
        "test cluster setup failed: {reason}; unset SKIP_TEST_CLUSTER to skip"
    );
    eprintln!("SKIP-TEST-CLUSTER: {reason}");
    None
}

/// Text of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|message| (*message).to_owned()))
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

/// Start or join the shared cluster, reporting setup panics as errors.
///
/// Worker discovery in `pg_embedded_setup_unpriv` panics rather than
/// returning an error when no `pg_worker` binary can be found.
fn acquire_cluster() -> Result<&'static ClusterHandle, String> {
    panic::catch_unwind(pg_embedded_setup_unpriv::test_support::shared_cluster_handle)
        .map_err(|payload| format!("cluster setup panicked: {}", panic_message(&*payload)))?
        .map_err(|error| format!("{error:?}"))
}

/// Shared cluster for this test binary, started on first use.
pub fn shared_cluster() -> Result<&'static ClusterHandle, String> {
    let mut last_error = String::new();
    for attempt in 1..=RETRIES {
        match acquire_cluster() {
            Ok(handle) => return Ok(handle),
            Err(error) => last_error = format!("attempt {attempt}/{RETRIES}: {error}"),
        }
        if attempt < RETRIES {
            std::thread::sleep(RETRY_DELAY);
        }
    }
    Err(last_error)
}

fn migrations_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

fn template_database_name() -> Result<String, String> {
    let hash = hash_directory(migrations_dir()).map_err(|err| format!("hash migrations: {err}"))?;
    let short_hash = hash.get(..8).unwrap_or(&hash);
    Ok(format!("{TEMPLATE_NAME_PREFIX}_{short_hash}"))
}

/// Create the migrated template database unless it already exists.
fn ensure_template_database(cluster: &ClusterHandle) -> Result<String, String> {
    let template_name = template_database_name()?;
    let _lock = TEMPLATE_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|err| err.into_inner());

    let exists = cluster
        .database_exists(template_name.as_str())
        .map_err(|err| format!("template check: {err:?}"))?;
    if !exists {
        cluster
            .create_database(template_name.as_str())
            .map_err(|err| format!("create template: {err:?}"))?;
        let url = cluster.connection().database_url(&template_name);
        run_migrations(&url).map_err(|err| err.to_string())?;
    }
    Ok(template_name)
}

/// A fresh database cloned from the migrated template.
pub fn provision_template_database(cluster: &ClusterHandle) -> Result<TemporaryDatabase, String> {
    let mut last_error = String::from("no provisioning attempt made");
    for attempt in 1..=RETRIES {
        let provisioned = ensure_template_database(cluster).and_then(|template| {
            let name = format!("test_{}", Uuid::new_v4().simple());
            cluster
                .temporary_database_from_template(name.as_str(), template.as_str())
                .map_err(|err| format!("clone template: {err:?}"))
        });
        match provisioned {
            Ok(database) => return Ok(database),
            Err(error) => last_error = format!("attempt {attempt}/{RETRIES}: {error}"),
        }
        if attempt < RETRIES {
            std::thread::sleep(RETRY_DELAY);
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let owned = panic::catch_unwind(|| panic!("{} missing", "pg_worker"))
            .expect_err("closure panics");
        let literal = panic::catch_unwind(|| panic!("static message")).expect_err("closure panics");
        let other = panic::catch_unwind(|| panic::panic_any(7_u8)).expect_err("closure panics");

        assert_eq!(panic_message(&*owned), "pg_worker missing");
        assert_eq!(panic_message(&*literal), "static message");
        assert_eq!(panic_message(&*other), "non-string panic payload");
    }
}
