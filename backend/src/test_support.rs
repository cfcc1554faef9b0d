//! Test utilities for the schedules crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`).
//! Compiled for tests and when the `test-support` feature is enabled.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use uuid::Uuid;

use crate::domain::{Identity, Schedule, SchedulePeriod, ScheduleTrip};

/// Build a four-stop trip departing at `departure` with the given per-stop offsets.
///
/// `offsets` are the arrival seconds at stops two to four relative to the
/// departure; each intermediate stop dwells ten seconds.
pub fn four_stop_trip(path_id: Uuid, departure: i32, offsets: [i32; 3]) -> ScheduleTrip {
    let [second, third, last] = offsets.map(|offset| departure + offset);
    ScheduleTrip {
        identity: Identity::Pending,
        id: Uuid::new_v4(),
        path_id,
        unit_id: None,
        block_id: None,
        departure_time_seconds: departure,
        arrival_time_seconds: last,
        seated_capacity: Some(20),
        total_capacity: Some(50),
        node_arrival_times_seconds: vec![None, Some(second), Some(third), Some(last)],
        node_departure_times_seconds: vec![Some(departure), Some(second + 10), Some(third + 10), None],
        nodes_can_board: vec![true, true, true, false],
        nodes_can_unboard: vec![false, true, true, true],
        created_at: None,
        updated_at: None,
    }
}

/// A valid pending schedule with three periods.
///
/// - Period 0 runs 7h to 12h with three trips.
/// - Period 1 runs 13h to 18h, narrowed to 13:15 to 17:24, with one trip.
/// - Period 2 runs 18h to 23h with custom bounds and no trips.
///
/// Every trip follows `path_id` through four stops.
pub fn sample_schedule(service_id: Uuid, line_id: Uuid, path_id: Uuid) -> Schedule {
    let mut schedule = Schedule::new(Uuid::new_v4(), service_id, line_id);
    schedule.periods_group_shortname = Some("all_day".to_owned());

    let mut morning = period(path_id, 7.0, 12.0, "all_day_period_shortname");
    let mut first = four_stop_trip(path_id, 25_200, [51, 1_050, 1_815]);
    first.block_id = Some(Uuid::new_v4());
    morning.trips = vec![
        first,
        four_stop_trip(path_id, 30_601, [51, 1_049, 1_815]),
        four_stop_trip(path_id, 32_401, [51, 1_049, 1_815]),
    ];

    let mut afternoon = period(path_id, 13.0, 18.0, "all_day_custom_period");
    afternoon.custom_start_at_str = Some("13:15".to_owned());
    afternoon.custom_end_at_str = Some("17:24".to_owned());
    afternoon.trips = vec![four_stop_trip(path_id, 48_000, [50, 1_450, 2_000])];

    let mut evening = period(path_id, 18.0, 23.0, "all_day_custom_period");
    evening.custom_start_at_str = Some("18:00".to_owned());
    evening.custom_end_at_str = Some("23:00".to_owned());

    schedule.periods = vec![morning, afternoon, evening];
    schedule
}

fn period(path_id: Uuid, start: f64, end: f64, shortname: &str) -> SchedulePeriod {
    let mut period = SchedulePeriod::new(Uuid::new_v4(), start, end);
    period.interval_seconds = Some(1_800);
    period.outbound_path_id = Some(path_id);
    period.period_shortname = Some(shortname.to_owned());
    period
}

/// Clear store-owned metadata so a read can be compared with a submission.
///
/// Periods and trips keep their editor order; reads return them ordered by
/// surrogate key, which matches insertion order.
pub fn without_store_metadata(mut schedule: Schedule) -> Schedule {
    schedule.identity = Identity::Pending;
    schedule.created_at = None;
    schedule.updated_at = None;
    for period in &mut schedule.periods {
        period.identity = Identity::Pending;
        period.created_at = None;
        period.updated_at = None;
        for trip in &mut period.trips {
            trip.identity = Identity::Pending;
            trip.created_at = None;
            trip.updated_at = None;
        }
    }
    schedule
}

/// Clock frozen at a settable instant.
#[derive(Debug)]
pub struct FixtureClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixtureClock {
    /// Clock reading `now` until moved.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for FixtureClock {
    fn default() -> Self {
        Self::at(fixture_timestamp())
    }
}

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Instant used by [`FixtureClock::default`].
pub fn fixture_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 8, 30, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
