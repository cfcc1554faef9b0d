//! Schedule service: validation against path topology, persistence and
//! translation of store failures into domain errors.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::ports::{
    PathTopology, PathTopologyError, QueryOptions, ScheduleRepository, ScheduleRepositoryError,
};
use crate::domain::{
    DomainResult, Error, ErrorCode, IdentifierError, Schedule, ScheduleKey, ScheduleValidator,
    ValidationReport, decode_schedule,
};

/// Translate a repository failure into a domain error.
///
/// The repository error is kept as the source so callers can log it; they
/// should branch on [`Error::code`] only.
pub fn map_repository_error(error: ScheduleRepositoryError) -> Error {
    let mapped = match &error {
        ScheduleRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("schedule store unavailable: {message}"))
        }
        ScheduleRepositoryError::Query { message } => {
            Error::internal(format!("schedule store error: {message}"))
        }
        ScheduleRepositoryError::Validation { message } => {
            Error::invalid_request(format!("schedule is invalid: {message}"))
        }
        ScheduleRepositoryError::InvalidIdentifier { message } => {
            Error::invalid_identifier(format!("invalid schedule identifier: {message}"))
        }
        ScheduleRepositoryError::Conflict { message } => {
            Error::conflict(format!("schedule conflicts with stored data: {message}"))
        }
        ScheduleRepositoryError::NotFound { key } => {
            Error::not_found(format!("schedule {key} not found"))
        }
    };
    mapped.with_cause(error)
}

fn map_topology_error(error: PathTopologyError) -> Error {
    Error::service_unavailable(format!("path lookup failed: {error}")).with_cause(error)
}

fn validation_error(report: &ValidationReport) -> Error {
    let issues: Vec<Value> = report
        .errors
        .iter()
        .map(|issue| {
            json!({
                "messageKey": issue.message_key(),
                "message": issue.to_string(),
                "issue": issue,
            })
        })
        .collect();
    Error::new(
        ErrorCode::InvalidRequest,
        format!("schedule failed validation with {} issue(s)", issues.len()),
    )
    .with_details(json!({ "errors": issues }))
}

/// Application service over a schedule repository and a path topology.
#[derive(Clone)]
pub struct ScheduleService<R, P> {
    repository: Arc<R>,
    paths: Arc<P>,
}

impl<R, P> ScheduleService<R, P> {
    /// Create the service.
    pub fn new(repository: Arc<R>, paths: Arc<P>) -> Self {
        Self { repository, paths }
    }

    /// Underlying repository, for maintenance calls the service does not wrap.
    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }
}

impl<R, P> ScheduleService<R, P>
where
    R: ScheduleRepository,
    P: PathTopology,
{
    /// Validate a schedule, checking each trip against its path's node count.
    ///
    /// Trips whose path the topology does not know skip the node count check.
    pub async fn validate(&self, schedule: &Schedule) -> DomainResult<ValidationReport> {
        let path_ids: Vec<Uuid> = schedule
            .trips()
            .map(|trip| trip.path_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let counts: HashMap<Uuid, usize> = if path_ids.is_empty() {
            HashMap::new()
        } else {
            self.paths
                .node_counts(&path_ids)
                .await
                .map_err(map_topology_error)?
        };

        Ok(ScheduleValidator::validate_with(schedule, |trip| {
            counts.get(&trip.path_id).copied()
        }))
    }

    /// Validate and store a schedule in its own transaction.
    pub async fn save(&self, schedule: &Schedule) -> DomainResult<i32> {
        self.save_with(schedule, QueryOptions::default()).await
    }

    /// Validate and store a schedule inside the caller's transaction.
    pub async fn save_within(
        &self,
        schedule: &Schedule,
        transaction: &mut R::Transaction,
    ) -> DomainResult<i32> {
        self.save_with(schedule, QueryOptions::within(transaction))
            .await
    }

    async fn save_with(
        &self,
        schedule: &Schedule,
        options: QueryOptions<'_, R::Transaction>,
    ) -> DomainResult<i32> {
        let report = self.validate(schedule).await?;
        if !report.is_valid {
            debug!(
                schedule = %schedule.id,
                issues = report.errors.len(),
                "rejecting invalid schedule"
            );
            return Err(validation_error(&report));
        }

        let id = self
            .repository
            .save(schedule, options)
            .await
            .map_err(map_repository_error)?;
        info!(schedule = %schedule.id, integer_id = id, "schedule saved");
        Ok(id)
    }

    /// Decode an editor payload, then validate and store it.
    pub async fn import(&self, payload: Value) -> DomainResult<i32> {
        let schedule = decode_schedule(payload).map_err(|err| {
            let message = err.to_string();
            match err {
                IdentifierError::InvalidIdentifier { .. } => Error::invalid_identifier(message),
                IdentifierError::Malformed(_) => Error::invalid_request(message),
            }
            .with_cause(err)
        })?;
        self.save(&schedule).await
    }

    /// Whether a schedule with this surrogate key is stored.
    pub async fn exists(&self, id: i32) -> DomainResult<bool> {
        self.exists_with(id, QueryOptions::default()).await
    }

    /// Whether a schedule is visible inside the caller's transaction.
    pub async fn exists_within(
        &self,
        id: i32,
        transaction: &mut R::Transaction,
    ) -> DomainResult<bool> {
        self.exists_with(id, QueryOptions::within(transaction)).await
    }

    async fn exists_with(
        &self,
        id: i32,
        options: QueryOptions<'_, R::Transaction>,
    ) -> DomainResult<bool> {
        self.repository
            .exists(id, options)
            .await
            .map_err(map_repository_error)
    }

    /// Read one schedule.
    pub async fn read(&self, id: i32) -> DomainResult<Schedule> {
        self.read_with(id, QueryOptions::default()).await
    }

    /// Read one schedule as the caller's transaction sees it.
    pub async fn read_within(
        &self,
        id: i32,
        transaction: &mut R::Transaction,
    ) -> DomainResult<Schedule> {
        self.read_with(id, QueryOptions::within(transaction)).await
    }

    async fn read_with(
        &self,
        id: i32,
        options: QueryOptions<'_, R::Transaction>,
    ) -> DomainResult<Schedule> {
        self.repository
            .read(id, options)
            .await
            .map_err(map_repository_error)
    }

    /// Read every schedule of a line.
    pub async fn read_for_line(&self, line_id: Uuid) -> DomainResult<Vec<Schedule>> {
        self.repository
            .read_for_line(line_id)
            .await
            .map_err(map_repository_error)
    }

    /// Read every stored schedule.
    pub async fn collection(&self) -> DomainResult<Vec<Schedule>> {
        self.repository
            .collection()
            .await
            .map_err(map_repository_error)
    }

    /// Delete a schedule and everything under it.
    pub async fn delete(&self, key: ScheduleKey) -> DomainResult<i32> {
        self.delete_with(key, QueryOptions::default()).await
    }

    /// Delete a schedule inside the caller's transaction.
    pub async fn delete_within(
        &self,
        key: ScheduleKey,
        transaction: &mut R::Transaction,
    ) -> DomainResult<i32> {
        self.delete_with(key, QueryOptions::within(transaction))
            .await
    }

    async fn delete_with(
        &self,
        key: ScheduleKey,
        options: QueryOptions<'_, R::Transaction>,
    ) -> DomainResult<i32> {
        let id = self
            .repository
            .delete(key, options)
            .await
            .map_err(map_repository_error)?;
        info!(%key, integer_id = id, "schedule deleted");
        Ok(id)
    }
}

#[cfg(test)]
#[path = "schedule_service_tests.rs"]
mod tests;
