//! Port for schedule persistence.
//!
//! The [`ScheduleRepository`] trait reads and writes whole schedule
//! aggregates. Writes reconcile the submitted tree against what the store
//! holds; see [`crate::domain::reconcile`] for the diff rules.
//!
//! Every operation that touches more than one row accepts
//! [`QueryOptions`]. Passing a transaction handle makes the call join the
//! caller's unit of work instead of opening its own.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::reconcile::ReconcileError;
use crate::domain::{Schedule, ScheduleKey, ScheduleValidator};

use super::define_port_error;

define_port_error! {
    /// Errors raised by schedule repository adapters.
    pub enum ScheduleRepositoryError {
        /// The store could not be reached.
        Connection {
            /// Adapter message.
            message: String,
        } => "schedule store connection failed: {message}",
        /// A query or mutation failed during execution.
        Query {
            /// Adapter message.
            message: String,
        } => "schedule store query failed: {message}",
        /// The aggregate is structurally invalid and was not written.
        Validation {
            /// Adapter message.
            message: String,
        } => "schedule is invalid: {message}",
        /// A surrogate or external identity is unusable.
        InvalidIdentifier {
            /// Adapter message.
            message: String,
        } => "invalid schedule identifier: {message}",
        /// A uniqueness constraint rejected the write.
        Conflict {
            /// Adapter message.
            message: String,
        } => "schedule conflicts with stored data: {message}",
        /// The addressed schedule is not stored.
        NotFound {
            /// Requested key, as given.
            key: String,
        } => "schedule {key} not found",
    }
}

impl From<ReconcileError> for ScheduleRepositoryError {
    fn from(error: ReconcileError) -> Self {
        Self::invalid_identifier(error.to_string())
    }
}

/// Reject an aggregate that fails the structural checks.
///
/// Adapters call this before writing; path topology is not consulted.
pub fn ensure_valid_structure(schedule: &Schedule) -> Result<(), ScheduleRepositoryError> {
    let report = ScheduleValidator::validate(schedule, None);
    if report.is_valid {
        return Ok(());
    }
    let summary = report
        .errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Err(ScheduleRepositoryError::validation(summary))
}

/// Optional transaction to join.
///
/// `QueryOptions::default()` lets the adapter acquire, commit and roll back
/// its own transaction. [`QueryOptions::within`] runs the call inside the
/// caller's transaction; the adapter never commits it, and a failed call
/// leaves no partial writes behind in it.
#[derive(Debug)]
pub struct QueryOptions<'a, T> {
    /// Caller-owned transaction handle.
    pub transaction: Option<&'a mut T>,
}

impl<T> Default for QueryOptions<'_, T> {
    fn default() -> Self {
        Self { transaction: None }
    }
}

impl<'a, T> QueryOptions<'a, T> {
    /// Join the given transaction.
    pub fn within(transaction: &'a mut T) -> Self {
        Self {
            transaction: Some(transaction),
        }
    }
}

/// Port for schedule storage and retrieval.
///
/// # Identity
///
/// Schedules, periods and trips are addressed by store-assigned surrogate
/// keys. A `Pending` schedule is inserted; a `Persisted` one is reconciled
/// against the stored tree. Deletion additionally accepts the legacy UUID
/// form of [`ScheduleKey`].
///
/// # Ordering
///
/// Reads return periods ordered by start hour and trips by departure time,
/// each with the surrogate key as tie-breaker.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Handle for a caller-owned transaction.
    type Transaction: Send;

    /// Whether a schedule with this surrogate key is stored.
    async fn exists(
        &self,
        id: i32,
        options: QueryOptions<'_, Self::Transaction>,
    ) -> Result<bool, ScheduleRepositoryError>;

    /// Read one schedule with its periods and trips.
    ///
    /// Returns [`ScheduleRepositoryError::NotFound`] when absent.
    async fn read(
        &self,
        id: i32,
        options: QueryOptions<'_, Self::Transaction>,
    ) -> Result<Schedule, ScheduleRepositoryError>;

    /// Read every schedule of a line. An unknown line yields an empty list.
    async fn read_for_line(&self, line_id: Uuid) -> Result<Vec<Schedule>, ScheduleRepositoryError>;

    /// Read every stored schedule, ordered by surrogate key.
    async fn collection(&self) -> Result<Vec<Schedule>, ScheduleRepositoryError>;

    /// Insert or reconcile a schedule and return its surrogate key.
    ///
    /// The whole tree is written atomically: on error nothing changes.
    async fn save(
        &self,
        schedule: &Schedule,
        options: QueryOptions<'_, Self::Transaction>,
    ) -> Result<i32, ScheduleRepositoryError>;

    /// Delete a schedule with its periods and trips, returning the surrogate
    /// key of the deleted row.
    async fn delete(
        &self,
        key: ScheduleKey,
        options: QueryOptions<'_, Self::Transaction>,
    ) -> Result<i32, ScheduleRepositoryError>;
}
