//! Structural and topology validation of a schedule aggregate.
//!
//! Validation is pure: it never mutates its input and never reads storage,
//! so it can run repeatedly and concurrently. All independent failures are
//! collected into one [`ValidationReport`].

use std::fmt;

use serde::Serialize;

use super::{Schedule, SchedulePeriod, ScheduleTrip};

const SECONDS_PER_HOUR: f64 = 3600.0;
const MAX_SERVICE_HOUR: f64 = 48.0;
const MAX_CUSTOM_HOUR: u32 = 47;

/// Anything that knows how many nodes a path visits.
///
/// Full path entities and lightweight stubs alike implement this so the
/// validator only depends on the one accessor it needs.
pub trait NodeCount {
    /// Number of nodes on the path.
    fn node_count(&self) -> usize;
}

impl NodeCount for usize {
    fn node_count(&self) -> usize {
        *self
    }
}

/// Where in the aggregate an issue was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum Location {
    /// The schedule itself.
    Schedule,
    /// A period, by position in the input.
    Period {
        /// Period position.
        period: usize,
    },
    /// A trip, by position in its period.
    Trip {
        /// Period position.
        period: usize,
        /// Trip position within the period.
        trip: usize,
    },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schedule => write!(f, "schedule"),
            Self::Period { period } => write!(f, "period {period}"),
            Self::Trip { period, trip } => write!(f, "trip {trip} of period {period}"),
        }
    }
}

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// A required identifier or label is missing or blank.
    #[error("{location} is missing required field `{field}`")]
    MissingField {
        /// Offending entity.
        location: Location,
        /// Field name.
        field: &'static str,
    },
    /// A count or interval that must be positive is not.
    #[error("{location} field `{field}` must be positive")]
    NonPositive {
        /// Offending entity.
        location: Location,
        /// Field name.
        field: &'static str,
    },
    /// Start and end hours are out of range or out of order.
    #[error("{location} hours must satisfy 0 <= start < end <= 48")]
    InvalidHours {
        /// Offending period.
        location: Location,
    },
    /// A trip time is negative.
    #[error("{location} field `{field}` must not be negative")]
    NegativeTime {
        /// Offending trip.
        location: Location,
        /// Field name.
        field: &'static str,
    },
    /// The trip departs after it arrives.
    #[error("{location} departs after it arrives")]
    DepartureAfterArrival {
        /// Offending trip.
        location: Location,
    },
    /// Seated capacity exceeds total capacity.
    #[error("{location} seated capacity exceeds total capacity")]
    CapacityExceeded {
        /// Offending trip.
        location: Location,
    },
    /// The per-stop sequences of one trip disagree in length.
    #[error("{location} per-stop sequences differ in length")]
    InconsistentStopSequences {
        /// Offending trip.
        location: Location,
    },
    /// A per-stop sequence does not match the path's node count.
    #[error("{location} `{sequence}` has {actual} entries but the path has {expected} nodes")]
    NodeCountMismatch {
        /// Offending trip.
        location: Location,
        /// Sequence name.
        sequence: &'static str,
        /// Path node count.
        expected: usize,
        /// Sequence length.
        actual: usize,
    },
    /// A custom time string is not `H:MM`.
    #[error("{location} field `{field}` is not a H:MM time: {value}")]
    InvalidCustomTime {
        /// Offending period.
        location: Location,
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
    /// Custom start is not before custom end.
    #[error("{location} custom start must precede custom end")]
    CustomTimeOrder {
        /// Offending period.
        location: Location,
    },
    /// A custom time falls outside the period's hour bounds.
    #[error("{location} field `{field}` lies outside the period hours")]
    CustomTimeOutOfBounds {
        /// Offending period.
        location: Location,
        /// Field name.
        field: &'static str,
    },
}

impl ValidationIssue {
    /// Localisation key for display layers.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "transit:transitSchedule:errors:MissingField",
            Self::NonPositive { .. } => "transit:transitSchedule:errors:NonPositiveValue",
            Self::InvalidHours { .. } => "transit:transitSchedule:errors:InvalidPeriodHours",
            Self::NegativeTime { .. } => "transit:transitSchedule:errors:NegativeTripTime",
            Self::DepartureAfterArrival { .. } => {
                "transit:transitSchedule:errors:DepartureAfterArrival"
            }
            Self::CapacityExceeded { .. } => "transit:transitSchedule:errors:CapacityExceeded",
            Self::InconsistentStopSequences { .. } => {
                "transit:transitSchedule:errors:InconsistentStopSequences"
            }
            Self::NodeCountMismatch { .. } => "transit:transitSchedule:errors:NodeCountMismatch",
            Self::InvalidCustomTime { .. } => "transit:transitSchedule:errors:InvalidCustomTime",
            Self::CustomTimeOrder { .. } => "transit:transitSchedule:errors:CustomTimeOrder",
            Self::CustomTimeOutOfBounds { .. } => {
                "transit:transitSchedule:errors:CustomTimeOutOfBounds"
            }
        }
    }
}

/// Aggregated validation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// True when `errors` is empty.
    pub is_valid: bool,
    /// Every failure found, in traversal order.
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validator for schedule aggregates.
pub struct ScheduleValidator;

impl ScheduleValidator {
    /// Validate a schedule, checking every trip against `path` when given.
    ///
    /// # Examples
    /// ```
    /// use transit_schedules::domain::{Schedule, ScheduleValidator};
    /// use uuid::Uuid;
    ///
    /// let schedule = Schedule::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    /// assert!(ScheduleValidator::validate(&schedule, None).is_valid);
    /// ```
    pub fn validate(schedule: &Schedule, path: Option<&dyn NodeCount>) -> ValidationReport {
        let node_count = path.map(NodeCount::node_count);
        Self::validate_with(schedule, |_| node_count)
    }

    /// Validate a schedule, resolving each trip's path node count through
    /// `node_count_for`. Trips whose path is unknown skip the topology check.
    pub fn validate_with<F>(schedule: &Schedule, node_count_for: F) -> ValidationReport
    where
        F: Fn(&ScheduleTrip) -> Option<usize>,
    {
        let mut issues = Vec::new();
        check_schedule_fields(schedule, &mut issues);

        for (period_index, period) in schedule.periods.iter().enumerate() {
            let location = Location::Period {
                period: period_index,
            };
            check_period_fields(period, location, &mut issues);
            check_custom_times(period, location, &mut issues);

            for (trip_index, trip) in period.trips.iter().enumerate() {
                let location = Location::Trip {
                    period: period_index,
                    trip: trip_index,
                };
                check_trip_fields(trip, location, &mut issues);
                if let Some(expected) = node_count_for(trip) {
                    check_node_count(trip, location, expected, &mut issues);
                }
            }
        }

        ValidationReport::from_issues(issues)
    }
}

fn check_schedule_fields(schedule: &Schedule, issues: &mut Vec<ValidationIssue>) {
    let location = Location::Schedule;
    for (field, missing) in [
        ("id", schedule.id.is_nil()),
        ("service_id", schedule.service_id.is_nil()),
        ("line_id", schedule.line_id.is_nil()),
        ("periods_group_shortname", is_blank(&schedule.periods_group_shortname)),
    ] {
        if missing {
            issues.push(ValidationIssue::MissingField { location, field });
        }
    }
}

fn check_period_fields(period: &SchedulePeriod, location: Location, issues: &mut Vec<ValidationIssue>) {
    if period.id.is_nil() {
        issues.push(ValidationIssue::MissingField { location, field: "id" });
    }
    if is_blank(&period.period_shortname) {
        issues.push(ValidationIssue::MissingField {
            location,
            field: "period_shortname",
        });
    }
    for (field, value) in [
        ("interval_seconds", period.interval_seconds),
        ("number_of_units", period.number_of_units),
    ] {
        if value.is_some_and(|value| value <= 0) {
            issues.push(ValidationIssue::NonPositive { location, field });
        }
    }

    let hours_valid = period.start_at_hour.is_finite()
        && period.end_at_hour.is_finite()
        && period.start_at_hour >= 0.0
        && period.start_at_hour < period.end_at_hour
        && period.end_at_hour <= MAX_SERVICE_HOUR;
    if !hours_valid {
        issues.push(ValidationIssue::InvalidHours { location });
    }
}

fn check_custom_times(period: &SchedulePeriod, location: Location, issues: &mut Vec<ValidationIssue>) {
    let start = parse_custom(
        "custom_start_at_str",
        period.custom_start_at_str.as_deref(),
        location,
        issues,
    );
    let end = parse_custom(
        "custom_end_at_str",
        period.custom_end_at_str.as_deref(),
        location,
        issues,
    );

    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            issues.push(ValidationIssue::CustomTimeOrder { location });
        }
    }

    let lower = period.start_at_hour * SECONDS_PER_HOUR;
    let upper = period.end_at_hour * SECONDS_PER_HOUR;
    for (field, seconds) in [("custom_start_at_str", start), ("custom_end_at_str", end)] {
        let Some(seconds) = seconds else { continue };
        let seconds = f64::from(seconds);
        if seconds < lower || seconds > upper {
            issues.push(ValidationIssue::CustomTimeOutOfBounds { location, field });
        }
    }
}

fn parse_custom(
    field: &'static str,
    raw: Option<&str>,
    location: Location,
    issues: &mut Vec<ValidationIssue>,
) -> Option<u32> {
    let raw = raw?;
    let parsed = parse_time_of_day(raw);
    if parsed.is_none() {
        issues.push(ValidationIssue::InvalidCustomTime {
            location,
            field,
            value: raw.to_owned(),
        });
    }
    parsed
}

/// Parse an `H:MM` or `HH:MM` time into seconds since midnight.
///
/// Hours up to 47 are accepted for service running past midnight.
pub fn parse_time_of_day(raw: &str) -> Option<u32> {
    let (hours, minutes) = raw.trim().split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    if !hours.chars().chain(minutes.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    (hours <= MAX_CUSTOM_HOUR && minutes < 60).then_some(hours * 3600 + minutes * 60)
}

fn check_trip_fields(trip: &ScheduleTrip, location: Location, issues: &mut Vec<ValidationIssue>) {
    for (field, missing) in [("id", trip.id.is_nil()), ("path_id", trip.path_id.is_nil())] {
        if missing {
            issues.push(ValidationIssue::MissingField { location, field });
        }
    }

    for (field, value) in [
        ("departure_time_seconds", trip.departure_time_seconds),
        ("arrival_time_seconds", trip.arrival_time_seconds),
    ] {
        if value < 0 {
            issues.push(ValidationIssue::NegativeTime { location, field });
        }
    }
    if trip.departure_time_seconds > trip.arrival_time_seconds {
        issues.push(ValidationIssue::DepartureAfterArrival { location });
    }

    if let (Some(seated), Some(total)) = (trip.seated_capacity, trip.total_capacity) {
        if seated > total {
            issues.push(ValidationIssue::CapacityExceeded { location });
        }
    }

    if trip.stop_count().is_none() {
        issues.push(ValidationIssue::InconsistentStopSequences { location });
    }
}

fn check_node_count(
    trip: &ScheduleTrip,
    location: Location,
    expected: usize,
    issues: &mut Vec<ValidationIssue>,
) {
    let lengths = [
        ("node_arrival_times_seconds", trip.node_arrival_times_seconds.len()),
        ("node_departure_times_seconds", trip.node_departure_times_seconds.len()),
        ("nodes_can_board", trip.nodes_can_board.len()),
        ("nodes_can_unboard", trip.nodes_can_unboard.len()),
    ];
    for (sequence, actual) in lengths {
        if actual != expected {
            issues.push(ValidationIssue::NodeCountMismatch {
                location,
                sequence,
                expected,
                actual,
            });
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|value| value.trim().is_empty())
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
