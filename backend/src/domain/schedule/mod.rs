//! Schedule aggregate: a Schedule owns Periods, each Period owns Trips.
//!
//! The aggregate is what the schedule editor produces and what the
//! repository port reads and writes. Every entity carries two identities:
//!
//! - `id`: the external UUID assigned at creation time, stable across
//!   systems;
//! - `identity`: the store-assigned surrogate key, canonical for updates and
//!   deletes once assigned (see [`Identity`]).
//!
//! Store metadata (`identity`, `created_at`, `updated_at`) is owned by the
//! store. Editors leave it untouched; the repository fills it in on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod identity;
mod key;
mod payload;
pub mod reconcile;
pub mod validation;

pub use identity::Identity;
pub use key::{ScheduleKey, ScheduleKeyError};
pub use payload::{IdentifierError, decode_schedule};

/// Timetable for one (service, line) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Store-assigned surrogate identity.
    #[serde(rename = "integer_id", default)]
    pub identity: Identity,
    /// External identity.
    pub id: Uuid,
    /// Service the schedule runs under.
    pub service_id: Uuid,
    /// Line the schedule belongs to.
    pub line_id: Uuid,
    /// Whether trips may be timed to the second rather than the minute.
    #[serde(default)]
    pub allow_seconds_based_schedules: bool,
    /// Whether the editor locked the schedule against changes.
    #[serde(default)]
    pub is_frozen: bool,
    /// Label grouping the periods (for example `"all_day"`).
    #[serde(default)]
    pub periods_group_shortname: Option<String>,
    /// Insert timestamp; absent until stored.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp; null until the first update.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Periods in editor order.
    #[serde(default)]
    pub periods: Vec<SchedulePeriod>,
}

impl Schedule {
    /// Create a pending schedule without periods.
    pub fn new(id: Uuid, service_id: Uuid, line_id: Uuid) -> Self {
        Self {
            identity: Identity::Pending,
            id,
            service_id,
            line_id,
            allow_seconds_based_schedules: false,
            is_frozen: false,
            periods_group_shortname: None,
            created_at: None,
            updated_at: None,
            periods: Vec::new(),
        }
    }

    /// Iterate over every trip of every period.
    pub fn trips(&self) -> impl Iterator<Item = &ScheduleTrip> {
        self.periods.iter().flat_map(|period| period.trips.iter())
    }
}

/// Time-of-day window with its own headway rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePeriod {
    /// Store-assigned surrogate identity.
    #[serde(rename = "integer_id", default)]
    pub identity: Identity,
    /// External identity.
    pub id: Uuid,
    /// Start hour of the window; may exceed 24 for after-midnight service.
    pub start_at_hour: f64,
    /// End hour of the window.
    pub end_at_hour: f64,
    /// `H:MM` override of the start bound.
    #[serde(default)]
    pub custom_start_at_str: Option<String>,
    /// `H:MM` override of the end bound.
    #[serde(default)]
    pub custom_end_at_str: Option<String>,
    /// Headway between departures.
    #[serde(default)]
    pub interval_seconds: Option<i32>,
    /// Vehicle count used instead of a headway.
    #[serde(default)]
    pub number_of_units: Option<i32>,
    /// Path used by outbound trips.
    #[serde(default)]
    pub outbound_path_id: Option<Uuid>,
    /// Path used by return trips.
    #[serde(default)]
    pub inbound_path_id: Option<Uuid>,
    /// Editor label of the period.
    #[serde(default)]
    pub period_shortname: Option<String>,
    /// Insert timestamp; absent until stored.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp; null until the first update.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Trips in editor order.
    #[serde(default)]
    pub trips: Vec<ScheduleTrip>,
}

impl SchedulePeriod {
    /// Create a pending period spanning the given hours.
    pub fn new(id: Uuid, start_at_hour: f64, end_at_hour: f64) -> Self {
        Self {
            identity: Identity::Pending,
            id,
            start_at_hour,
            end_at_hour,
            custom_start_at_str: None,
            custom_end_at_str: None,
            interval_seconds: None,
            number_of_units: None,
            outbound_path_id: None,
            inbound_path_id: None,
            period_shortname: None,
            created_at: None,
            updated_at: None,
            trips: Vec::new(),
        }
    }
}

/// One scheduled vehicle run with per-stop timing.
///
/// The four per-stop sequences hold one entry per node of the trip's path.
/// The first arrival and the last departure are legitimately `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTrip {
    /// Store-assigned surrogate identity.
    #[serde(rename = "integer_id", default)]
    pub identity: Identity,
    /// External identity.
    pub id: Uuid,
    /// Path the trip follows.
    pub path_id: Uuid,
    /// Vehicle assigned to the trip.
    #[serde(default)]
    pub unit_id: Option<Uuid>,
    /// Vehicle block the trip belongs to.
    #[serde(default)]
    pub block_id: Option<Uuid>,
    /// Departure from the first stop, in seconds since midnight.
    pub departure_time_seconds: i32,
    /// Arrival at the last stop, in seconds since midnight.
    pub arrival_time_seconds: i32,
    /// Seated capacity of the vehicle.
    #[serde(default)]
    pub seated_capacity: Option<i32>,
    /// Total capacity of the vehicle.
    #[serde(default)]
    pub total_capacity: Option<i32>,
    /// Arrival time at each stop.
    pub node_arrival_times_seconds: Vec<Option<i32>>,
    /// Departure time at each stop.
    pub node_departure_times_seconds: Vec<Option<i32>>,
    /// Whether boarding is allowed at each stop.
    pub nodes_can_board: Vec<bool>,
    /// Whether alighting is allowed at each stop.
    pub nodes_can_unboard: Vec<bool>,
    /// Insert timestamp; absent until stored.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp; null until the first update.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScheduleTrip {
    /// Number of stops described by the per-stop sequences, when they agree.
    pub fn stop_count(&self) -> Option<usize> {
        let count = self.node_arrival_times_seconds.len();
        let consistent = self.node_departure_times_seconds.len() == count
            && self.nodes_can_board.len() == count
            && self.nodes_can_unboard.len() == count;
        consistent.then_some(count)
    }
}
