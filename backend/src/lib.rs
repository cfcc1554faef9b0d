//! Transit schedule persistence and reconciliation.
//!
//! - [`domain`]: the schedule aggregate, validation, reconciliation planning,
//!   ports and the schedule service
//! - [`outbound`]: PostgreSQL and in-memory repository adapters
//! - [`config`]: store connection settings

pub mod config;
pub mod domain;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
