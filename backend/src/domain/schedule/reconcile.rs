//! Three-way diff between a submitted schedule and its stored shape.
//!
//! At each nesting level the submitted entities are partitioned by
//! surrogate identity:
//!
//! - persisted and stored under the same parent: update in place;
//! - pending, or persisted but unknown under that parent: insert;
//! - stored but absent from the submission: delete.
//!
//! Deleting a period cascades to its trips in the store, so trips of
//! deleted periods are not listed individually. Adapters apply deletes
//! before inserts and updates.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use uuid::Uuid;

use super::{Identity, Schedule, SchedulePeriod, ScheduleTrip};

/// Stored period and trip identities of one schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredShape {
    periods: BTreeMap<i32, BTreeSet<i32>>,
}

impl StoredShape {
    /// Build the shape from stored period ids and `(period_id, trip_id)` pairs.
    pub fn from_rows<P, T>(period_ids: P, trip_ids: T) -> Self
    where
        P: IntoIterator<Item = i32>,
        T: IntoIterator<Item = (i32, i32)>,
    {
        let mut periods: BTreeMap<i32, BTreeSet<i32>> = period_ids
            .into_iter()
            .map(|period_id| (period_id, BTreeSet::new()))
            .collect();
        for (period_id, trip_id) in trip_ids {
            periods.entry(period_id).or_default().insert(trip_id);
        }
        Self { periods }
    }

    /// Shape of an aggregate as read back from a store.
    ///
    /// Pending entities are ignored.
    pub fn of(schedule: &Schedule) -> Self {
        let period_ids = schedule
            .periods
            .iter()
            .filter_map(|period| period.identity.surrogate());
        let trip_ids = schedule.periods.iter().flat_map(|period| {
            let period_id = period.identity.surrogate();
            period
                .trips
                .iter()
                .filter_map(move |trip| Some((period_id?, trip.identity.surrogate()?)))
        });
        Self::from_rows(period_ids, trip_ids)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    fn trips_of(&self, period_id: i32) -> Option<&BTreeSet<i32>> {
        self.periods.get(&period_id)
    }
}

/// Write to issue for one submitted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    /// Insert a new row; the store assigns the surrogate key.
    Insert,
    /// Update the stored row with this surrogate key.
    Update(i32),
}

/// Planned write for one trip.
#[derive(Debug, Clone, PartialEq)]
pub struct TripPlan<'a> {
    /// Insert or update.
    pub action: RowAction,
    /// Submitted trip.
    pub trip: &'a ScheduleTrip,
}

/// Planned write for one period and its trips.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodPlan<'a> {
    /// Insert or update.
    pub action: RowAction,
    /// Submitted period.
    pub period: &'a SchedulePeriod,
    /// Trip writes in submission order.
    pub trips: Vec<TripPlan<'a>>,
}

/// Complete write plan for one schedule save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan<'a> {
    /// Stored periods to delete, with their trips.
    pub deleted_periods: Vec<i32>,
    /// Stored trips to delete from retained periods.
    pub deleted_trips: Vec<i32>,
    /// Period writes in submission order.
    pub periods: Vec<PeriodPlan<'a>>,
}

/// Identity problems that make a submission impossible to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// Surrogate keys start at 1.
    #[error("{entity} surrogate key must be positive, got {id}")]
    NonPositiveIdentity {
        /// Entity kind.
        entity: &'static str,
        /// Offending key.
        id: i32,
    },
    /// Two submitted entities claim the same surrogate key.
    #[error("{entity} surrogate key {id} is used more than once")]
    DuplicateIdentity {
        /// Entity kind.
        entity: &'static str,
        /// Offending key.
        id: i32,
    },
    /// Two submitted entities share an external identity.
    #[error("{entity} {id} appears more than once")]
    DuplicateExternalId {
        /// Entity kind.
        entity: &'static str,
        /// Offending external identity.
        id: Uuid,
    },
}

/// Plan the writes that turn `stored` into `schedule`.
///
/// An empty `stored` shape plans a plain insert of the whole tree.
///
/// # Examples
/// ```
/// use transit_schedules::domain::reconcile::{plan, RowAction, StoredShape};
/// use transit_schedules::domain::{Identity, Schedule, SchedulePeriod};
/// use uuid::Uuid;
///
/// let mut schedule = Schedule::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
/// let mut kept = SchedulePeriod::new(Uuid::new_v4(), 7.0, 12.0);
/// kept.identity = Identity::Persisted(1);
/// schedule.periods.push(kept);
///
/// let stored = StoredShape::from_rows([1, 2], []);
/// let writes = plan(&schedule, &stored).unwrap();
/// assert_eq!(writes.deleted_periods, vec![2]);
/// assert_eq!(writes.periods[0].action, RowAction::Update(1));
/// ```
pub fn plan<'a>(schedule: &'a Schedule, stored: &StoredShape) -> Result<ReconcilePlan<'a>, ReconcileError> {
    check_identities(schedule)?;

    let mut retained_periods = BTreeSet::new();
    let mut deleted_trips = Vec::new();
    let mut periods = Vec::with_capacity(schedule.periods.len());

    for period in &schedule.periods {
        let stored_trips = period
            .identity
            .surrogate()
            .and_then(|id| stored.trips_of(id).map(|trips| (id, trips)));

        let Some((period_id, stored_trips)) = stored_trips else {
            periods.push(PeriodPlan {
                action: RowAction::Insert,
                period,
                trips: period
                    .trips
                    .iter()
                    .map(|trip| TripPlan {
                        action: RowAction::Insert,
                        trip,
                    })
                    .collect(),
            });
            continue;
        };

        retained_periods.insert(period_id);
        let mut retained_trips = BTreeSet::new();
        let trips = period
            .trips
            .iter()
            .map(|trip| {
                let action = match trip.identity {
                    Identity::Persisted(id) if stored_trips.contains(&id) => {
                        retained_trips.insert(id);
                        RowAction::Update(id)
                    }
                    _ => RowAction::Insert,
                };
                TripPlan { action, trip }
            })
            .collect();
        deleted_trips.extend(stored_trips.difference(&retained_trips).copied());

        periods.push(PeriodPlan {
            action: RowAction::Update(period_id),
            period,
            trips,
        });
    }

    let deleted_periods = stored
        .periods
        .keys()
        .filter(|id| !retained_periods.contains(*id))
        .copied()
        .collect();

    Ok(ReconcilePlan {
        deleted_periods,
        deleted_trips,
        periods,
    })
}

fn check_identities(schedule: &Schedule) -> Result<(), ReconcileError> {
    let mut period_keys = HashSet::new();
    let mut trip_keys = HashSet::new();
    let mut period_uuids = HashSet::new();
    let mut trip_uuids = HashSet::new();

    check_identity("schedule", schedule.identity, &mut HashSet::new())?;
    for period in &schedule.periods {
        check_identity("period", period.identity, &mut period_keys)?;
        if !period_uuids.insert(period.id) {
            return Err(ReconcileError::DuplicateExternalId {
                entity: "period",
                id: period.id,
            });
        }
        for trip in &period.trips {
            check_identity("trip", trip.identity, &mut trip_keys)?;
            if !trip_uuids.insert(trip.id) {
                return Err(ReconcileError::DuplicateExternalId {
                    entity: "trip",
                    id: trip.id,
                });
            }
        }
    }
    Ok(())
}

fn check_identity(
    entity: &'static str,
    identity: Identity,
    seen: &mut HashSet<i32>,
) -> Result<(), ReconcileError> {
    let Identity::Persisted(id) = identity else {
        return Ok(());
    };
    if id <= 0 {
        return Err(ReconcileError::NonPositiveIdentity { entity, id });
    }
    if !seen.insert(id) {
        return Err(ReconcileError::DuplicateIdentity { entity, id });
    }
    Ok(())
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
