//! Internal Diesel row structs for the schedule tables.
//!
//! These types never leave the persistence layer; conversions to and from
//! the domain aggregate live beside them.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::{Identity, Schedule, SchedulePeriod, ScheduleTrip};

use super::schema::{transit_schedule_periods, transit_schedule_trips, transit_schedules};

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

/// Row read from `transit_schedules`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = transit_schedules)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ScheduleRow {
    pub id: i32,
    pub uuid: Uuid,
    pub service_id: Uuid,
    pub line_id: Uuid,
    pub allow_seconds_based_schedules: bool,
    pub is_frozen: bool,
    pub periods_group_shortname: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Values for a new schedule; the database fills `id` and `created_at`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transit_schedules)]
pub(crate) struct NewScheduleRow<'a> {
    pub uuid: Uuid,
    pub service_id: Uuid,
    pub line_id: Uuid,
    pub allow_seconds_based_schedules: bool,
    pub is_frozen: bool,
    pub periods_group_shortname: Option<&'a str>,
}

impl<'a> From<&'a Schedule> for NewScheduleRow<'a> {
    fn from(schedule: &'a Schedule) -> Self {
        Self {
            uuid: schedule.id,
            service_id: schedule.service_id,
            line_id: schedule.line_id,
            allow_seconds_based_schedules: schedule.allow_seconds_based_schedules,
            is_frozen: schedule.is_frozen,
            periods_group_shortname: schedule.periods_group_shortname.as_deref(),
        }
    }
}

/// Full overwrite of an existing schedule row.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = transit_schedules)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct ScheduleChangeset<'a> {
    pub uuid: Uuid,
    pub service_id: Uuid,
    pub line_id: Uuid,
    pub allow_seconds_based_schedules: bool,
    pub is_frozen: bool,
    pub periods_group_shortname: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> ScheduleChangeset<'a> {
    pub fn new(schedule: &'a Schedule, updated_at: DateTime<Utc>) -> Self {
        let row = NewScheduleRow::from(schedule);
        Self {
            uuid: row.uuid,
            service_id: row.service_id,
            line_id: row.line_id,
            allow_seconds_based_schedules: row.allow_seconds_based_schedules,
            is_frozen: row.is_frozen,
            periods_group_shortname: row.periods_group_shortname,
            updated_at,
        }
    }
}

impl ScheduleRow {
    /// Assemble the aggregate from this row and its already-built periods.
    pub fn into_schedule(self, periods: Vec<SchedulePeriod>) -> Schedule {
        Schedule {
            identity: Identity::Persisted(self.id),
            id: self.uuid,
            service_id: self.service_id,
            line_id: self.line_id,
            allow_seconds_based_schedules: self.allow_seconds_based_schedules,
            is_frozen: self.is_frozen,
            periods_group_shortname: self.periods_group_shortname,
            created_at: Some(self.created_at),
            updated_at: self.updated_at,
            periods,
        }
    }
}

// ---------------------------------------------------------------------------
// Periods
// ---------------------------------------------------------------------------

/// Row read from `transit_schedule_periods`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = transit_schedule_periods)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PeriodRow {
    pub id: i32,
    pub uuid: Uuid,
    pub schedule_id: i32,
    pub start_at_hour: f64,
    pub end_at_hour: f64,
    pub custom_start_at_str: Option<String>,
    pub custom_end_at_str: Option<String>,
    pub interval_seconds: Option<i32>,
    pub number_of_units: Option<i32>,
    pub outbound_path_id: Option<Uuid>,
    pub inbound_path_id: Option<Uuid>,
    pub period_shortname: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PeriodRow {
    pub fn into_period(self, trips: Vec<ScheduleTrip>) -> SchedulePeriod {
        SchedulePeriod {
            identity: Identity::Persisted(self.id),
            id: self.uuid,
            start_at_hour: self.start_at_hour,
            end_at_hour: self.end_at_hour,
            custom_start_at_str: self.custom_start_at_str,
            custom_end_at_str: self.custom_end_at_str,
            interval_seconds: self.interval_seconds,
            number_of_units: self.number_of_units,
            outbound_path_id: self.outbound_path_id,
            inbound_path_id: self.inbound_path_id,
            period_shortname: self.period_shortname,
            created_at: Some(self.created_at),
            updated_at: self.updated_at,
            trips,
        }
    }
}

/// Values for a new period under `schedule_id`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transit_schedule_periods)]
pub(crate) struct NewPeriodRow<'a> {
    pub uuid: Uuid,
    pub schedule_id: i32,
    pub start_at_hour: f64,
    pub end_at_hour: f64,
    pub custom_start_at_str: Option<&'a str>,
    pub custom_end_at_str: Option<&'a str>,
    pub interval_seconds: Option<i32>,
    pub number_of_units: Option<i32>,
    pub outbound_path_id: Option<Uuid>,
    pub inbound_path_id: Option<Uuid>,
    pub period_shortname: Option<&'a str>,
}

impl<'a> NewPeriodRow<'a> {
    pub fn new(period: &'a SchedulePeriod, schedule_id: i32) -> Self {
        Self {
            uuid: period.id,
            schedule_id,
            start_at_hour: period.start_at_hour,
            end_at_hour: period.end_at_hour,
            custom_start_at_str: period.custom_start_at_str.as_deref(),
            custom_end_at_str: period.custom_end_at_str.as_deref(),
            interval_seconds: period.interval_seconds,
            number_of_units: period.number_of_units,
            outbound_path_id: period.outbound_path_id,
            inbound_path_id: period.inbound_path_id,
            period_shortname: period.period_shortname.as_deref(),
        }
    }
}

/// Full overwrite of an existing period row.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = transit_schedule_periods)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct PeriodChangeset<'a> {
    pub uuid: Uuid,
    pub start_at_hour: f64,
    pub end_at_hour: f64,
    pub custom_start_at_str: Option<&'a str>,
    pub custom_end_at_str: Option<&'a str>,
    pub interval_seconds: Option<i32>,
    pub number_of_units: Option<i32>,
    pub outbound_path_id: Option<Uuid>,
    pub inbound_path_id: Option<Uuid>,
    pub period_shortname: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> PeriodChangeset<'a> {
    pub fn new(period: &'a SchedulePeriod, updated_at: DateTime<Utc>) -> Self {
        Self {
            uuid: period.id,
            start_at_hour: period.start_at_hour,
            end_at_hour: period.end_at_hour,
            custom_start_at_str: period.custom_start_at_str.as_deref(),
            custom_end_at_str: period.custom_end_at_str.as_deref(),
            interval_seconds: period.interval_seconds,
            number_of_units: period.number_of_units,
            outbound_path_id: period.outbound_path_id,
            inbound_path_id: period.inbound_path_id,
            period_shortname: period.period_shortname.as_deref(),
            updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Trips
// ---------------------------------------------------------------------------

/// Row read from `transit_schedule_trips`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = transit_schedule_trips)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct TripRow {
    pub id: i32,
    pub uuid: Uuid,
    pub schedule_period_id: i32,
    pub path_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub block_id: Option<Uuid>,
    pub departure_time_seconds: i32,
    pub arrival_time_seconds: i32,
    pub seated_capacity: Option<i32>,
    pub total_capacity: Option<i32>,
    pub node_arrival_times_seconds: Vec<Option<i32>>,
    pub node_departure_times_seconds: Vec<Option<i32>>,
    pub nodes_can_board: Vec<bool>,
    pub nodes_can_unboard: Vec<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<TripRow> for ScheduleTrip {
    fn from(row: TripRow) -> Self {
        Self {
            identity: Identity::Persisted(row.id),
            id: row.uuid,
            path_id: row.path_id,
            unit_id: row.unit_id,
            block_id: row.block_id,
            departure_time_seconds: row.departure_time_seconds,
            arrival_time_seconds: row.arrival_time_seconds,
            seated_capacity: row.seated_capacity,
            total_capacity: row.total_capacity,
            node_arrival_times_seconds: row.node_arrival_times_seconds,
            node_departure_times_seconds: row.node_departure_times_seconds,
            nodes_can_board: row.nodes_can_board,
            nodes_can_unboard: row.nodes_can_unboard,
            created_at: Some(row.created_at),
            updated_at: row.updated_at,
        }
    }
}

/// Values for a new trip under `schedule_period_id`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transit_schedule_trips)]
pub(crate) struct NewTripRow<'a> {
    pub uuid: Uuid,
    pub schedule_period_id: i32,
    pub path_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub block_id: Option<Uuid>,
    pub departure_time_seconds: i32,
    pub arrival_time_seconds: i32,
    pub seated_capacity: Option<i32>,
    pub total_capacity: Option<i32>,
    pub node_arrival_times_seconds: &'a [Option<i32>],
    pub node_departure_times_seconds: &'a [Option<i32>],
    pub nodes_can_board: &'a [bool],
    pub nodes_can_unboard: &'a [bool],
}

impl<'a> NewTripRow<'a> {
    pub fn new(trip: &'a ScheduleTrip, schedule_period_id: i32) -> Self {
        Self {
            uuid: trip.id,
            schedule_period_id,
            path_id: trip.path_id,
            unit_id: trip.unit_id,
            block_id: trip.block_id,
            departure_time_seconds: trip.departure_time_seconds,
            arrival_time_seconds: trip.arrival_time_seconds,
            seated_capacity: trip.seated_capacity,
            total_capacity: trip.total_capacity,
            node_arrival_times_seconds: &trip.node_arrival_times_seconds,
            node_departure_times_seconds: &trip.node_departure_times_seconds,
            nodes_can_board: &trip.nodes_can_board,
            nodes_can_unboard: &trip.nodes_can_unboard,
        }
    }
}

/// Full overwrite of an existing trip row.
///
/// The owning period never changes here: a trip submitted under another
/// period is planned as a fresh insert.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = transit_schedule_trips)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct TripChangeset<'a> {
    pub uuid: Uuid,
    pub path_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub block_id: Option<Uuid>,
    pub departure_time_seconds: i32,
    pub arrival_time_seconds: i32,
    pub seated_capacity: Option<i32>,
    pub total_capacity: Option<i32>,
    pub node_arrival_times_seconds: &'a [Option<i32>],
    pub node_departure_times_seconds: &'a [Option<i32>],
    pub nodes_can_board: &'a [bool],
    pub nodes_can_unboard: &'a [bool],
    pub updated_at: DateTime<Utc>,
}

impl<'a> TripChangeset<'a> {
    pub fn new(trip: &'a ScheduleTrip, updated_at: DateTime<Utc>) -> Self {
        Self {
            uuid: trip.id,
            path_id: trip.path_id,
            unit_id: trip.unit_id,
            block_id: trip.block_id,
            departure_time_seconds: trip.departure_time_seconds,
            arrival_time_seconds: trip.arrival_time_seconds,
            seated_capacity: trip.seated_capacity,
            total_capacity: trip.total_capacity,
            node_arrival_times_seconds: &trip.node_arrival_times_seconds,
            node_departure_times_seconds: &trip.node_departure_times_seconds,
            nodes_can_board: &trip.nodes_can_board,
            nodes_can_unboard: &trip.nodes_can_unboard,
            updated_at,
        }
    }
}
