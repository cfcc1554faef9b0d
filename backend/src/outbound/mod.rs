//! Outbound adapters implementing the schedule repository port.
//!
//! - **persistence**: PostgreSQL via Diesel, the production store
//! - **memory**: process-local store with the same constraints, used by
//!   tests and dry runs
//!
//! Adapters translate between schedule trees and their storage form; the
//! diff rules live in [`crate::domain::reconcile`].

pub mod memory;
pub mod persistence;
