//! Shared helpers for the schedule integration suites.
//!
//! Integration tests compile as separate crates under `backend/tests/`, so
//! the embedded PostgreSQL plumbing lives here and each suite pulls it in
//! with `mod support;`.

pub mod pg_embed;

pub use pg_embed::{handle_cluster_setup_failure, provision_template_database, shared_cluster};

/// Render a `postgres` error with its SQLSTATE and message.
///
/// `postgres::Error`'s `Display` collapses server errors to `db error`.
pub fn format_postgres_error(error: &postgres::Error) -> String {
    match error.as_db_error() {
        Some(db_error) => format!(
            "postgres error {:?}: {}{}",
            db_error.code(),
            db_error.message(),
            db_error
                .detail()
                .map(|detail| format!("; detail: {detail}"))
                .unwrap_or_default()
        ),
        None => error.to_string(),
    }
}
