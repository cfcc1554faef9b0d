//! PostgreSQL-backed schedule repository.
//!
//! Every call runs inside a transaction. Without a caller transaction the
//! adapter checks out a pooled connection and opens one; with a caller
//! transaction it opens a nested one (a savepoint) on the caller's
//! connection, so a failed call rolls back its own writes while the outer
//! commit stays with the caller.
//!
//! Saves read the stored period and trip keys, plan the diff with
//! [`crate::domain::reconcile::plan`] and apply deletes before updates and
//! inserts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::scoped_futures::{ScopedBoxFuture, ScopedFutureExt as _};
use diesel_async::{AsyncConnection as _, AsyncPgConnection, RunQueryDsl};
use mockable::{Clock, DefaultClock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::ports::{
    QueryOptions, ScheduleRepository, ScheduleRepositoryError, ensure_valid_structure,
};
use crate::domain::reconcile::{ReconcilePlan, RowAction, StoredShape, plan};
use crate::domain::{Identity, Schedule, ScheduleKey, SchedulePeriod, ScheduleTrip};

use super::models::{
    NewPeriodRow, NewScheduleRow, NewTripRow, PeriodChangeset, PeriodRow, ScheduleChangeset,
    ScheduleRow, TripChangeset, TripRow,
};
use super::pool::{DbPool, PoolError};
use super::schema::{transit_schedule_periods, transit_schedule_trips, transit_schedules};

/// Failure inside a transaction body.
///
/// Diesel needs the body's error type to absorb its own errors; domain
/// failures raised mid-transaction ride along unchanged.
#[derive(Debug, thiserror::Error)]
enum TransactionError {
    #[error(transparent)]
    Diesel(#[from] diesel::result::Error),
    #[error(transparent)]
    Repository(ScheduleRepositoryError),
}

impl From<TransactionError> for ScheduleRepositoryError {
    fn from(error: TransactionError) -> Self {
        match error {
            TransactionError::Diesel(error) => map_diesel_error(error),
            TransactionError::Repository(error) => error,
        }
    }
}

fn map_pool_error(error: PoolError) -> ScheduleRepositoryError {
    ScheduleRepositoryError::connection(error.message())
}

/// Map Diesel errors to schedule repository errors.
fn map_diesel_error(error: diesel::result::Error) -> ScheduleRepositoryError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => debug!(
            ?kind,
            message = info.message(),
            constraint = info.constraint_name(),
            "diesel operation failed"
        ),
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            error = %error,
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            ScheduleRepositoryError::conflict(
                info.constraint_name()
                    .map_or_else(|| info.message().to_owned(), str::to_owned),
            )
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
            ScheduleRepositoryError::connection(info.message().to_owned())
        }
        DieselError::DatabaseError(_, info) => {
            ScheduleRepositoryError::query(info.message().to_owned())
        }
        DieselError::NotFound => ScheduleRepositoryError::query("record not found"),
        other => ScheduleRepositoryError::query(other.to_string()),
    }
}

/// Diesel-backed implementation of the schedule repository port.
#[derive(Clone)]
pub struct DieselScheduleRepository {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl DieselScheduleRepository {
    /// Create a repository stamping updates with the system clock.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use transit_schedules::outbound::persistence::{
    ///     DbPool, DieselScheduleRepository, PoolConfig,
    /// };
    ///
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let pool = DbPool::new(PoolConfig::new("postgres://localhost/schedules")).await?;
    /// let repository = DieselScheduleRepository::new(pool);
    /// # let _ = repository;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(pool: DbPool) -> Self {
        Self::with_clock(pool, Arc::new(DefaultClock))
    }

    /// Create a repository stamping updates with `clock`.
    pub fn with_clock(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Run `work` in a transaction, nested in the caller's when one is given.
    async fn run<'a, T, F>(
        &self,
        options: QueryOptions<'_, AsyncPgConnection>,
        work: F,
    ) -> Result<T, ScheduleRepositoryError>
    where
        F: for<'r> FnOnce(
                &'r mut AsyncPgConnection,
            ) -> ScopedBoxFuture<'a, 'r, Result<T, TransactionError>>
            + Send
            + 'a,
        T: Send + 'a,
    {
        let result = match options.transaction {
            Some(conn) => conn.transaction(work).await,
            None => {
                let mut pooled = self.pool.get().await.map_err(map_pool_error)?;
                let conn: &mut AsyncPgConnection = &mut pooled;
                conn.transaction(work).await
            }
        };
        result.map_err(ScheduleRepositoryError::from)
    }

    /// Remove every schedule, cascading to periods and trips.
    pub async fn truncate_schedules(&self) -> Result<(), ScheduleRepositoryError> {
        self.truncate("TRUNCATE TABLE transit_schedules CASCADE").await
    }

    /// Remove every period, cascading to trips.
    pub async fn truncate_schedule_periods(&self) -> Result<(), ScheduleRepositoryError> {
        self.truncate("TRUNCATE TABLE transit_schedule_periods CASCADE")
            .await
    }

    /// Remove every trip.
    pub async fn truncate_schedule_trips(&self) -> Result<(), ScheduleRepositoryError> {
        self.truncate("TRUNCATE TABLE transit_schedule_trips").await
    }

    async fn truncate(&self, statement: &'static str) -> Result<(), ScheduleRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::sql_query(statement)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        info!(statement, "truncated schedule table");
        Ok(())
    }

    /// Release this adapter's handle on the pool.
    ///
    /// Connections close once every clone of the pool is dropped; clones of
    /// this repository or of the pool keep it open.
    pub fn destroy(self) {
        let Self { pool, clock: _ } = self;
        let (connections, idle) = pool.status();
        debug!(connections, idle, "releasing schedule repository pool handle");
        drop(pool);
    }
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Attach periods and trips to the given schedule rows, keeping row order.
async fn assemble(
    conn: &mut AsyncPgConnection,
    schedule_rows: Vec<ScheduleRow>,
) -> QueryResult<Vec<Schedule>> {
    if schedule_rows.is_empty() {
        return Ok(Vec::new());
    }
    let schedule_ids: Vec<i32> = schedule_rows.iter().map(|row| row.id).collect();

    let period_rows: Vec<PeriodRow> = transit_schedule_periods::table
        .filter(transit_schedule_periods::schedule_id.eq_any(&schedule_ids))
        .order((
            transit_schedule_periods::start_at_hour.asc(),
            transit_schedule_periods::id.asc(),
        ))
        .select(PeriodRow::as_select())
        .load(conn)
        .await?;
    let period_ids: Vec<i32> = period_rows.iter().map(|row| row.id).collect();

    let trip_rows: Vec<TripRow> = if period_ids.is_empty() {
        Vec::new()
    } else {
        transit_schedule_trips::table
            .filter(transit_schedule_trips::schedule_period_id.eq_any(&period_ids))
            .order((
                transit_schedule_trips::departure_time_seconds.asc(),
                transit_schedule_trips::id.asc(),
            ))
            .select(TripRow::as_select())
            .load(conn)
            .await?
    };

    let mut trips_by_period: HashMap<i32, Vec<ScheduleTrip>> = HashMap::new();
    for row in trip_rows {
        trips_by_period
            .entry(row.schedule_period_id)
            .or_default()
            .push(ScheduleTrip::from(row));
    }

    let mut periods_by_schedule: HashMap<i32, Vec<SchedulePeriod>> = HashMap::new();
    for row in period_rows {
        let trips = trips_by_period.remove(&row.id).unwrap_or_default();
        periods_by_schedule
            .entry(row.schedule_id)
            .or_default()
            .push(row.into_period(trips));
    }

    Ok(schedule_rows
        .into_iter()
        .map(|row| {
            let periods = periods_by_schedule.remove(&row.id).unwrap_or_default();
            row.into_schedule(periods)
        })
        .collect())
}

async fn read_one(conn: &mut AsyncPgConnection, id: i32) -> Result<Schedule, TransactionError> {
    let row: Option<ScheduleRow> = transit_schedules::table
        .find(id)
        .select(ScheduleRow::as_select())
        .first(conn)
        .await
        .optional()?;
    let row = row.ok_or_else(|| {
        TransactionError::Repository(ScheduleRepositoryError::not_found(id.to_string()))
    })?;
    let mut schedules = assemble(conn, vec![row]).await?;
    schedules.pop().ok_or_else(|| {
        TransactionError::Repository(ScheduleRepositoryError::not_found(id.to_string()))
    })
}

async fn stored_shape(conn: &mut AsyncPgConnection, schedule_id: i32) -> QueryResult<StoredShape> {
    let period_ids: Vec<i32> = transit_schedule_periods::table
        .filter(transit_schedule_periods::schedule_id.eq(schedule_id))
        .select(transit_schedule_periods::id)
        .load(conn)
        .await?;
    let trip_ids: Vec<(i32, i32)> = transit_schedule_trips::table
        .inner_join(transit_schedule_periods::table)
        .filter(transit_schedule_periods::schedule_id.eq(schedule_id))
        .select((
            transit_schedule_trips::schedule_period_id,
            transit_schedule_trips::id,
        ))
        .load(conn)
        .await?;
    Ok(StoredShape::from_rows(period_ids, trip_ids))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

async fn save_tree(
    conn: &mut AsyncPgConnection,
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> Result<i32, TransactionError> {
    match schedule.identity {
        Identity::Pending => insert_tree(conn, schedule, now).await,
        Identity::Persisted(id) => update_tree(conn, id, schedule, now).await,
    }
}

async fn insert_tree(
    conn: &mut AsyncPgConnection,
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> Result<i32, TransactionError> {
    let occupied: bool = diesel::select(exists(
        transit_schedules::table
            .filter(transit_schedules::service_id.eq(schedule.service_id))
            .filter(transit_schedules::line_id.eq(schedule.line_id)),
    ))
    .get_result(conn)
    .await?;
    if occupied {
        return Err(TransactionError::Repository(
            ScheduleRepositoryError::conflict("transit_schedules_service_line_key"),
        ));
    }

    let writes = plan(schedule, &StoredShape::default())
        .map_err(|err| TransactionError::Repository(err.into()))?;
    let schedule_id: i32 = diesel::insert_into(transit_schedules::table)
        .values(NewScheduleRow::from(schedule))
        .returning(transit_schedules::id)
        .get_result(conn)
        .await?;
    apply_periods(conn, schedule_id, &writes, now).await?;
    Ok(schedule_id)
}

async fn update_tree(
    conn: &mut AsyncPgConnection,
    schedule_id: i32,
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> Result<i32, TransactionError> {
    let locked: Option<i32> = transit_schedules::table
        .find(schedule_id)
        .select(transit_schedules::id)
        .for_update()
        .get_result(conn)
        .await
        .optional()?;
    if locked.is_none() {
        return Err(TransactionError::Repository(
            ScheduleRepositoryError::not_found(schedule_id.to_string()),
        ));
    }

    let stored = stored_shape(conn, schedule_id).await?;
    let writes =
        plan(schedule, &stored).map_err(|err| TransactionError::Repository(err.into()))?;

    if !writes.deleted_trips.is_empty() {
        diesel::delete(
            transit_schedule_trips::table
                .filter(transit_schedule_trips::id.eq_any(&writes.deleted_trips)),
        )
        .execute(conn)
        .await?;
    }
    if !writes.deleted_periods.is_empty() {
        diesel::delete(
            transit_schedule_periods::table
                .filter(transit_schedule_periods::id.eq_any(&writes.deleted_periods)),
        )
        .execute(conn)
        .await?;
    }

    diesel::update(transit_schedules::table.find(schedule_id))
        .set(ScheduleChangeset::new(schedule, now))
        .execute(conn)
        .await?;
    apply_periods(conn, schedule_id, &writes, now).await?;
    Ok(schedule_id)
}

async fn apply_periods(
    conn: &mut AsyncPgConnection,
    schedule_id: i32,
    writes: &ReconcilePlan<'_>,
    now: DateTime<Utc>,
) -> Result<(), TransactionError> {
    for period_plan in &writes.periods {
        let period = period_plan.period;
        let period_id = match period_plan.action {
            RowAction::Insert => {
                diesel::insert_into(transit_schedule_periods::table)
                    .values(NewPeriodRow::new(period, schedule_id))
                    .returning(transit_schedule_periods::id)
                    .get_result::<i32>(conn)
                    .await?
            }
            RowAction::Update(period_id) => {
                diesel::update(transit_schedule_periods::table.find(period_id))
                    .set(PeriodChangeset::new(period, now))
                    .execute(conn)
                    .await?;
                period_id
            }
        };

        let mut inserts = Vec::new();
        for trip_plan in &period_plan.trips {
            match trip_plan.action {
                RowAction::Insert => inserts.push(NewTripRow::new(trip_plan.trip, period_id)),
                RowAction::Update(trip_id) => {
                    diesel::update(transit_schedule_trips::table.find(trip_id))
                        .set(TripChangeset::new(trip_plan.trip, now))
                        .execute(conn)
                        .await?;
                }
            }
        }
        if !inserts.is_empty() {
            diesel::insert_into(transit_schedule_trips::table)
                .values(&inserts)
                .execute(conn)
                .await?;
        }
    }
    Ok(())
}

fn check_submission(schedule: &Schedule) -> Result<(), ScheduleRepositoryError> {
    if let Identity::Persisted(id) = schedule.identity
        && id <= 0
    {
        return Err(ScheduleRepositoryError::invalid_identifier(format!(
            "schedule surrogate key must be positive, got {id}"
        )));
    }
    ensure_valid_structure(schedule)?;
    plan(schedule, &StoredShape::default())?;
    Ok(())
}

#[async_trait]
impl ScheduleRepository for DieselScheduleRepository {
    type Transaction = AsyncPgConnection;

    async fn exists(
        &self,
        id: i32,
        options: QueryOptions<'_, Self::Transaction>,
    ) -> Result<bool, ScheduleRepositoryError> {
        self.run(options, |conn| {
            async move {
                let found = diesel::select(exists(transit_schedules::table.find(id)))
                    .get_result::<bool>(conn)
                    .await?;
                Ok(found)
            }
            .scope_boxed()
        })
        .await
    }

    async fn read(
        &self,
        id: i32,
        options: QueryOptions<'_, Self::Transaction>,
    ) -> Result<Schedule, ScheduleRepositoryError> {
        self.run(options, |conn| async move { read_one(conn, id).await }.scope_boxed())
            .await
    }

    async fn read_for_line(&self, line_id: Uuid) -> Result<Vec<Schedule>, ScheduleRepositoryError> {
        self.run(QueryOptions::default(), |conn| {
            async move {
                let rows: Vec<ScheduleRow> = transit_schedules::table
                    .filter(transit_schedules::line_id.eq(line_id))
                    .order(transit_schedules::id.asc())
                    .select(ScheduleRow::as_select())
                    .load(conn)
                    .await?;
                Ok(assemble(conn, rows).await?)
            }
            .scope_boxed()
        })
        .await
    }

    async fn collection(&self) -> Result<Vec<Schedule>, ScheduleRepositoryError> {
        self.run(QueryOptions::default(), |conn| {
            async move {
                let rows: Vec<ScheduleRow> = transit_schedules::table
                    .order(transit_schedules::id.asc())
                    .select(ScheduleRow::as_select())
                    .load(conn)
                    .await?;
                Ok(assemble(conn, rows).await?)
            }
            .scope_boxed()
        })
        .await
    }

    async fn save(
        &self,
        schedule: &Schedule,
        options: QueryOptions<'_, Self::Transaction>,
    ) -> Result<i32, ScheduleRepositoryError> {
        check_submission(schedule)?;
        let now = self.clock.utc();
        let id = self
            .run(options, |conn| {
                async move { save_tree(conn, schedule, now).await }.scope_boxed()
            })
            .await?;
        debug!(schedule = %schedule.id, integer_id = id, "wrote schedule rows");
        Ok(id)
    }

    async fn delete(
        &self,
        key: ScheduleKey,
        options: QueryOptions<'_, Self::Transaction>,
    ) -> Result<i32, ScheduleRepositoryError> {
        if key.is_legacy() {
            warn!(%key, "deleting schedule by legacy uuid");
        }
        let id = self
            .run(options, |conn| {
                async move {
                    let deleted: Option<i32> = match key {
                        ScheduleKey::Id(id) => {
                            diesel::delete(transit_schedules::table.find(id))
                                .returning(transit_schedules::id)
                                .get_result(conn)
                                .await
                                .optional()?
                        }
                        ScheduleKey::LegacyUuid(uuid) => {
                            diesel::delete(
                                transit_schedules::table.filter(transit_schedules::uuid.eq(uuid)),
                            )
                            .returning(transit_schedules::id)
                            .get_result(conn)
                            .await
                            .optional()?
                        }
                    };
                    deleted.ok_or_else(|| {
                        TransactionError::Repository(ScheduleRepositoryError::not_found(
                            key.to_string(),
                        ))
                    })
                }
                .scope_boxed()
            })
            .await?;
        debug!(%key, integer_id = id, "deleted schedule rows");
        Ok(id)
    }
}
