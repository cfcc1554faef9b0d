//! Tests for schedule validation.

use rstest::{fixture, rstest};
use uuid::Uuid;

use super::*;
use crate::test_support::sample_schedule;

struct PathStub {
    nodes: Vec<Uuid>,
}

impl NodeCount for PathStub {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn path_with(nodes: usize) -> PathStub {
    PathStub {
        nodes: (0..nodes).map(|_| Uuid::new_v4()).collect(),
    }
}

#[fixture]
fn schedule() -> Schedule {
    sample_schedule(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
}

#[rstest]
fn sample_schedule_is_valid_without_path(schedule: Schedule) {
    let report = ScheduleValidator::validate(&schedule, None);
    assert!(report.is_valid, "unexpected issues: {:?}", report.errors);
    assert!(report.errors.is_empty());
}

#[rstest]
fn four_stop_trips_match_four_node_path(schedule: Schedule) {
    let path = path_with(4);
    assert!(ScheduleValidator::validate(&schedule, Some(&path)).is_valid);
}

#[rstest]
fn four_stop_trips_do_not_match_six_node_path(schedule: Schedule) {
    let path = path_with(6);
    let report = ScheduleValidator::validate(&schedule, Some(&path));

    assert!(!report.is_valid);
    let trip_count = schedule.trips().count();
    let mismatches = report
        .errors
        .iter()
        .filter(|issue| matches!(issue, ValidationIssue::NodeCountMismatch { expected: 6, actual: 4, .. }))
        .count();
    assert_eq!(mismatches, trip_count * 4);
}

#[rstest]
fn bare_node_count_satisfies_capability(schedule: Schedule) {
    assert!(ScheduleValidator::validate(&schedule, Some(&4_usize)).is_valid);
}

#[rstest]
fn per_trip_lookup_skips_unknown_paths(schedule: Schedule) {
    let report = ScheduleValidator::validate_with(&schedule, |_| None);
    assert!(report.is_valid);
}

#[rstest]
fn independent_failures_are_all_reported(mut schedule: Schedule) {
    schedule.line_id = Uuid::nil();
    schedule.periods[0].interval_seconds = Some(0);
    schedule.periods[0].trips[1].seated_capacity = Some(80);
    schedule.periods[1].custom_start_at_str = Some("25h".to_owned());

    let report = ScheduleValidator::validate(&schedule, None);

    assert!(!report.is_valid);
    assert_eq!(
        report.errors,
        vec![
            ValidationIssue::MissingField {
                location: Location::Schedule,
                field: "line_id",
            },
            ValidationIssue::NonPositive {
                location: Location::Period { period: 0 },
                field: "interval_seconds",
            },
            ValidationIssue::CapacityExceeded {
                location: Location::Trip { period: 0, trip: 1 },
            },
            ValidationIssue::InvalidCustomTime {
                location: Location::Period { period: 1 },
                field: "custom_start_at_str",
                value: "25h".to_owned(),
            },
        ]
    );
}

#[rstest]
fn mismatched_stop_sequences_are_structural_failures(mut schedule: Schedule) {
    schedule.periods[0].trips[0].nodes_can_board.pop();

    let report = ScheduleValidator::validate(&schedule, None);
    assert_eq!(
        report.errors,
        vec![ValidationIssue::InconsistentStopSequences {
            location: Location::Trip { period: 0, trip: 0 },
        }]
    );
}

#[rstest]
#[case(Some("13:45"), Some("17:24"), true)]
#[case(Some("13:00"), Some("18:00"), true)]
#[case(Some("12:59"), None, false)]
#[case(None, Some("18:01"), false)]
#[case(Some("17:00"), Some("14:00"), false)]
#[case(Some("1345"), None, false)]
fn custom_times_respect_period_hours(
    mut schedule: Schedule,
    #[case] start: Option<&str>,
    #[case] end: Option<&str>,
    #[case] valid: bool,
) {
    let period = &mut schedule.periods[1];
    period.start_at_hour = 13.0;
    period.end_at_hour = 18.0;
    period.custom_start_at_str = start.map(str::to_owned);
    period.custom_end_at_str = end.map(str::to_owned);

    assert_eq!(ScheduleValidator::validate(&schedule, None).is_valid, valid);
}

#[rstest]
#[case(7.0, 7.0)]
#[case(-1.0, 4.0)]
#[case(20.0, 49.0)]
#[case(f64::NAN, 4.0)]
fn rejects_invalid_hour_bounds(mut schedule: Schedule, #[case] start: f64, #[case] end: f64) {
    let period = &mut schedule.periods[2];
    period.custom_start_at_str = None;
    period.custom_end_at_str = None;
    period.start_at_hour = start;
    period.end_at_hour = end;

    let report = ScheduleValidator::validate(&schedule, None);
    assert!(report
        .errors
        .contains(&ValidationIssue::InvalidHours {
            location: Location::Period { period: 2 },
        }));
}

#[rstest]
#[case("7:05", Some(7 * 3600 + 300))]
#[case("27:30", Some(27 * 3600 + 1800))]
#[case("48:00", None)]
#[case("7:5", None)]
#[case("ab:cd", None)]
#[case("", None)]
fn parses_time_of_day(#[case] raw: &str, #[case] expected: Option<u32>) {
    assert_eq!(parse_time_of_day(raw), expected);
}

#[rstest]
fn validation_does_not_mutate_input(schedule: Schedule) {
    let before = schedule.clone();
    let _report = ScheduleValidator::validate(&schedule, Some(&path_with(6)));
    assert_eq!(schedule, before);
}

#[rstest]
fn issues_carry_localisation_keys() {
    let issue = ValidationIssue::CustomTimeOrder {
        location: Location::Period { period: 0 },
    };
    assert_eq!(
        issue.message_key(),
        "transit:transitSchedule:errors:CustomTimeOrder"
    );
    assert_eq!(issue.to_string(), "period 0 custom start must precede custom end");
}
