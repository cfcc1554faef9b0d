//! In-memory schedule repository.
//!
//! Keeps whole aggregates keyed by surrogate id and enforces the same
//! constraints as the relational schema: one schedule per (service, line)
//! pair and unique external ids per entity kind. Each call works on a copy
//! of the state and publishes it only on success, so a failed call leaves
//! nothing behind.
//!
//! Caller-owned units of work come from [`InMemoryScheduleRepository::begin`]
//! and are published with [`InMemoryScheduleRepository::commit`]. Commits are
//! optimistic: a transaction whose base was overtaken by another commit is
//! rejected with a conflict. Dropping a transaction rolls it back.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::{Clock, DefaultClock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ports::{
    QueryOptions, ScheduleRepository, ScheduleRepositoryError, ensure_valid_structure,
};
use crate::domain::reconcile::{RowAction, StoredShape, plan};
use crate::domain::{Identity, Schedule, ScheduleKey};

#[derive(Debug, Clone, Default)]
struct Snapshot {
    next_schedule_id: i32,
    next_period_id: i32,
    next_trip_id: i32,
    schedules: BTreeMap<i32, Schedule>,
}

#[derive(Debug, Default)]
struct State {
    version: u64,
    snapshot: Snapshot,
}

/// Caller-owned unit of work over an [`InMemoryScheduleRepository`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    base_version: u64,
    snapshot: Snapshot,
}

/// Schedule repository held in process memory.
#[derive(Clone)]
pub struct InMemoryScheduleRepository {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryScheduleRepository {
    fn default() -> Self {
        Self::new(Arc::new(DefaultClock))
    }
}

impl InMemoryScheduleRepository {
    /// Create an empty repository stamping writes with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ScheduleRepositoryError> {
        self.state
            .lock()
            .map_err(|_| ScheduleRepositoryError::connection("in-memory store lock poisoned"))
    }

    /// Start a unit of work over the current state.
    pub fn begin(&self) -> Result<InMemoryTransaction, ScheduleRepositoryError> {
        let state = self.lock()?;
        Ok(InMemoryTransaction {
            base_version: state.version,
            snapshot: state.snapshot.clone(),
        })
    }

    /// Publish a unit of work.
    ///
    /// Fails with a conflict, publishing nothing, when another commit or
    /// standalone write landed after `begin`.
    pub fn commit(&self, transaction: InMemoryTransaction) -> Result<(), ScheduleRepositoryError> {
        let mut state = self.lock()?;
        if state.version != transaction.base_version {
            return Err(ScheduleRepositoryError::conflict(
                "store changed since the transaction began",
            ));
        }
        state.snapshot = transaction.snapshot;
        state.version += 1;
        Ok(())
    }

    /// Remove every schedule with its periods and trips.
    pub fn truncate_schedules(&self) -> Result<(), ScheduleRepositoryError> {
        self.write_standalone(|snapshot| {
            snapshot.schedules.clear();
            Ok(())
        })
    }

    /// Remove every period with its trips, keeping schedules.
    pub fn truncate_schedule_periods(&self) -> Result<(), ScheduleRepositoryError> {
        self.write_standalone(|snapshot| {
            for schedule in snapshot.schedules.values_mut() {
                schedule.periods.clear();
            }
            Ok(())
        })
    }

    /// Remove every trip, keeping schedules and periods.
    pub fn truncate_schedule_trips(&self) -> Result<(), ScheduleRepositoryError> {
        self.write_standalone(|snapshot| {
            for period in snapshot
                .schedules
                .values_mut()
                .flat_map(|schedule| schedule.periods.iter_mut())
            {
                period.trips.clear();
            }
            Ok(())
        })
    }

    /// Release held resources. Nothing is held in memory, so this only exists
    /// to mirror the relational adapter.
    pub fn destroy(&self) {}

    fn read_with<T>(
        &self,
        options: QueryOptions<'_, InMemoryTransaction>,
        read: impl FnOnce(&Snapshot) -> Result<T, ScheduleRepositoryError>,
    ) -> Result<T, ScheduleRepositoryError> {
        match options.transaction {
            Some(transaction) => read(&transaction.snapshot),
            None => read(&self.lock()?.snapshot),
        }
    }

    fn write_with<T>(
        &self,
        options: QueryOptions<'_, InMemoryTransaction>,
        write: impl FnOnce(&mut Snapshot) -> Result<T, ScheduleRepositoryError>,
    ) -> Result<T, ScheduleRepositoryError> {
        let Some(transaction) = options.transaction else {
            return self.write_standalone(write);
        };
        let mut working = transaction.snapshot.clone();
        let output = write(&mut working)?;
        transaction.snapshot = working;
        Ok(output)
    }

    fn write_standalone<T>(
        &self,
        write: impl FnOnce(&mut Snapshot) -> Result<T, ScheduleRepositoryError>,
    ) -> Result<T, ScheduleRepositoryError> {
        let mut state = self.lock()?;
        let mut working = state.snapshot.clone();
        let output = write(&mut working)?;
        state.snapshot = working;
        state.version += 1;
        Ok(output)
    }
}

impl Snapshot {
    fn read(&self, id: i32) -> Result<Schedule, ScheduleRepositoryError> {
        self.schedules
            .get(&id)
            .map(ordered)
            .ok_or_else(|| ScheduleRepositoryError::not_found(id.to_string()))
    }

    fn resolve(&self, key: ScheduleKey) -> Option<i32> {
        match key {
            ScheduleKey::Id(id) => self.schedules.contains_key(&id).then_some(id),
            ScheduleKey::LegacyUuid(uuid) => self
                .schedules
                .iter()
                .find(|(_, schedule)| schedule.id == uuid)
                .map(|(id, _)| *id),
        }
    }

    fn save(
        &mut self,
        schedule: &Schedule,
        now: DateTime<Utc>,
    ) -> Result<i32, ScheduleRepositoryError> {
        ensure_valid_structure(schedule)?;

        let (id, previous) = match schedule.identity {
            Identity::Pending => (None, None),
            Identity::Persisted(id) if id <= 0 => {
                return Err(ScheduleRepositoryError::invalid_identifier(format!(
                    "schedule surrogate key must be positive, got {id}"
                )));
            }
            Identity::Persisted(id) => {
                let stored = self
                    .schedules
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| ScheduleRepositoryError::not_found(id.to_string()))?;
                (Some(id), Some(stored))
            }
        };
        let shape = previous.as_ref().map(StoredShape::of).unwrap_or_default();
        let writes = plan(schedule, &shape)?;
        self.ensure_unique(schedule, id)?;

        let id = id.unwrap_or_else(|| next(&mut self.next_schedule_id));
        let created = created_at_index(previous.as_ref());
        let mut stored = schedule.clone();
        stored.identity = Identity::Persisted(id);
        stored.created_at = previous.as_ref().map_or(Some(now), |previous| previous.created_at);
        stored.updated_at = previous.as_ref().map(|_| now);
        stored.periods = Vec::with_capacity(writes.periods.len());

        for period_plan in &writes.periods {
            let mut period = period_plan.period.clone();
            let (period_id, created_at) = match period_plan.action {
                RowAction::Insert => (next(&mut self.next_period_id), None),
                RowAction::Update(period_id) => {
                    (period_id, created.periods.get(&period_id).copied())
                }
            };
            stamp(
                (&mut period.identity, &mut period.created_at, &mut period.updated_at),
                period_id,
                created_at,
                now,
            );
            period.trips = period_plan
                .trips
                .iter()
                .map(|trip_plan| {
                    let mut trip = trip_plan.trip.clone();
                    let (trip_id, created_at) = match trip_plan.action {
                        RowAction::Insert => (next(&mut self.next_trip_id), None),
                        RowAction::Update(trip_id) => {
                            (trip_id, created.trips.get(&trip_id).copied())
                        }
                    };
                    stamp(
                        (&mut trip.identity, &mut trip.created_at, &mut trip.updated_at),
                        trip_id,
                        created_at,
                        now,
                    );
                    trip
                })
                .collect();
            stored.periods.push(period);
        }

        self.schedules.insert(id, stored);
        Ok(id)
    }

    fn ensure_unique(
        &self,
        schedule: &Schedule,
        own_id: Option<i32>,
    ) -> Result<(), ScheduleRepositoryError> {
        let others = self
            .schedules
            .iter()
            .filter(|(id, _)| Some(**id) != own_id)
            .map(|(_, stored)| stored);

        for other in others {
            if other.service_id == schedule.service_id && other.line_id == schedule.line_id {
                return Err(ScheduleRepositoryError::conflict(
                    "transit_schedules_service_line_key",
                ));
            }
            if other.id == schedule.id {
                return Err(ScheduleRepositoryError::conflict(format!(
                    "schedule {} already exists",
                    schedule.id
                )));
            }
            let clash = other.periods.iter().find_map(|stored| {
                schedule
                    .periods
                    .iter()
                    .any(|period| period.id == stored.id)
                    .then_some(("period", stored.id))
            });
            let clash = clash.or_else(|| {
                other.trips().find_map(|stored| {
                    schedule
                        .trips()
                        .any(|trip| trip.id == stored.id)
                        .then_some(("trip", stored.id))
                })
            });
            if let Some((entity, uuid)) = clash {
                return Err(ScheduleRepositoryError::conflict(format!(
                    "{entity} {uuid} belongs to another schedule"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct CreatedAt {
    periods: HashMap<i32, DateTime<Utc>>,
    trips: HashMap<i32, DateTime<Utc>>,
}

fn created_at_index(previous: Option<&Schedule>) -> CreatedAt {
    let mut index = CreatedAt::default();
    for period in previous.into_iter().flat_map(|schedule| schedule.periods.iter()) {
        if let (Some(id), Some(at)) = (period.identity.surrogate(), period.created_at) {
            index.periods.insert(id, at);
        }
        for trip in &period.trips {
            if let (Some(id), Some(at)) = (trip.identity.surrogate(), trip.created_at) {
                index.trips.insert(id, at);
            }
        }
    }
    index
}

type Metadata<'a> = (
    &'a mut Identity,
    &'a mut Option<DateTime<Utc>>,
    &'a mut Option<DateTime<Utc>>,
);

fn stamp(
    (identity, created_at, updated_at): Metadata<'_>,
    id: i32,
    previously_created: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) {
    *identity = Identity::Persisted(id);
    match previously_created {
        Some(at) => {
            *created_at = Some(at);
            *updated_at = Some(now);
        }
        None => {
            *created_at = Some(now);
            *updated_at = None;
        }
    }
}

fn next(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

fn ordered(schedule: &Schedule) -> Schedule {
    let mut schedule = schedule.clone();
    schedule.periods.sort_by(|left, right| {
        left.start_at_hour
            .total_cmp(&right.start_at_hour)
            .then_with(|| left.identity.surrogate().cmp(&right.identity.surrogate()))
    });
    for period in &mut schedule.periods {
        period
            .trips
            .sort_by_key(|trip| (trip.departure_time_seconds, trip.identity.surrogate()));
    }
    schedule
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    type Transaction = InMemoryTransaction;

    async fn exists(
        &self,
        id: i32,
        options: QueryOptions<'_, Self::Transaction>,
    ) -> Result<bool, ScheduleRepositoryError> {
        self.read_with(options, |snapshot| Ok(snapshot.schedules.contains_key(&id)))
    }

    async fn read(
        &self,
        id: i32,
        options: QueryOptions<'_, Self::Transaction>,
    ) -> Result<Schedule, ScheduleRepositoryError> {
        self.read_with(options, |snapshot| snapshot.read(id))
    }

    async fn read_for_line(&self, line_id: Uuid) -> Result<Vec<Schedule>, ScheduleRepositoryError> {
        self.read_with(QueryOptions::default(), |snapshot| {
            Ok(snapshot
                .schedules
                .values()
                .filter(|schedule| schedule.line_id == line_id)
                .map(ordered)
                .collect())
        })
    }

    async fn collection(&self) -> Result<Vec<Schedule>, ScheduleRepositoryError> {
        self.read_with(QueryOptions::default(), |snapshot| {
            Ok(snapshot.schedules.values().map(ordered).collect())
        })
    }

    async fn save(
        &self,
        schedule: &Schedule,
        options: QueryOptions<'_, Self::Transaction>,
    ) -> Result<i32, ScheduleRepositoryError> {
        let now = self.clock.utc();
        let id = self.write_with(options, |snapshot| snapshot.save(schedule, now))?;
        debug!(schedule = %schedule.id, integer_id = id, "stored schedule in memory");
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
        self.write_with(options, |snapshot| {
            let id = snapshot
                .resolve(key)
                .ok_or_else(|| ScheduleRepositoryError::not_found(key.to_string()))?;
            snapshot.schedules.remove(&id);
            Ok(id)
        })
    }
}

#[cfg(test)]
mod tests;
