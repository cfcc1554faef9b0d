//! Tests for the reconciliation planner.

use rstest::{fixture, rstest};
use uuid::Uuid;

use super::*;
use crate::test_support::sample_schedule;

/// Sample schedule with surrogate keys as a store would assign them:
/// periods 1..=3, trips 10..=13.
#[fixture]
fn stored_schedule() -> Schedule {
    let mut schedule = sample_schedule(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    schedule.identity = Identity::Persisted(1);
    let mut trip_key = 10;
    for (index, period) in schedule.periods.iter_mut().enumerate() {
        period.identity = Identity::Persisted(i32::try_from(index).expect("small index") + 1);
        for trip in &mut period.trips {
            trip.identity = Identity::Persisted(trip_key);
            trip_key += 1;
        }
    }
    schedule
}

fn actions(plan: &ReconcilePlan<'_>) -> Vec<(RowAction, Vec<RowAction>)> {
    plan.periods
        .iter()
        .map(|period| {
            (
                period.action,
                period.trips.iter().map(|trip| trip.action).collect(),
            )
        })
        .collect()
}

#[rstest]
fn empty_store_plans_full_insert() {
    let schedule = sample_schedule(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let plan = plan(&schedule, &StoredShape::default()).expect("plan");

    assert!(plan.deleted_periods.is_empty());
    assert!(plan.deleted_trips.is_empty());
    assert_eq!(
        actions(&plan),
        vec![
            (RowAction::Insert, vec![RowAction::Insert; 3]),
            (RowAction::Insert, vec![RowAction::Insert]),
            (RowAction::Insert, vec![]),
        ]
    );
}

#[rstest]
fn unchanged_schedule_updates_everything_in_place(stored_schedule: Schedule) {
    let stored = StoredShape::of(&stored_schedule);
    let plan = plan(&stored_schedule, &stored).expect("plan");

    assert!(plan.deleted_periods.is_empty());
    assert!(plan.deleted_trips.is_empty());
    assert_eq!(
        actions(&plan),
        vec![
            (
                RowAction::Update(1),
                vec![RowAction::Update(10), RowAction::Update(11), RowAction::Update(12)]
            ),
            (RowAction::Update(2), vec![RowAction::Update(13)]),
            (RowAction::Update(3), vec![]),
        ]
    );
}

#[rstest]
fn mixed_edit_partitions_each_level(mut stored_schedule: Schedule) {
    let stored = StoredShape::of(&stored_schedule);
    let path_id = stored_schedule.periods[0].trips[0].path_id;

    // Drop period 3 entirely, drop trip 11, add a trip to period 1 and a new period.
    stored_schedule.periods.truncate(2);
    stored_schedule.periods[0].trips.remove(1);
    stored_schedule.periods[0]
        .trips
        .push(crate::test_support::four_stop_trip(path_id, 40_000, [60, 600, 900]));
    let mut extra = SchedulePeriod::new(Uuid::new_v4(), 23.0, 26.0);
    extra.trips.push(crate::test_support::four_stop_trip(path_id, 83_000, [60, 600, 900]));
    stored_schedule.periods.push(extra);

    let plan = plan(&stored_schedule, &stored).expect("plan");

    assert_eq!(plan.deleted_periods, vec![3]);
    assert_eq!(plan.deleted_trips, vec![11]);
    assert_eq!(
        actions(&plan),
        vec![
            (
                RowAction::Update(1),
                vec![RowAction::Update(10), RowAction::Update(12), RowAction::Insert]
            ),
            (RowAction::Update(2), vec![RowAction::Update(13)]),
            (RowAction::Insert, vec![RowAction::Insert]),
        ]
    );
}

#[rstest]
fn trips_of_deleted_periods_cascade(mut stored_schedule: Schedule) {
    let stored = StoredShape::of(&stored_schedule);
    stored_schedule.periods.remove(0);

    let plan = plan(&stored_schedule, &stored).expect("plan");

    assert_eq!(plan.deleted_periods, vec![1]);
    assert!(plan.deleted_trips.is_empty());
}

#[rstest]
fn trip_moved_between_periods_is_reinserted(mut stored_schedule: Schedule) {
    let stored = StoredShape::of(&stored_schedule);
    let moved = stored_schedule.periods[0].trips.remove(0);
    stored_schedule.periods[1].trips.push(moved);

    let plan = plan(&stored_schedule, &stored).expect("plan");

    assert_eq!(plan.deleted_trips, vec![10]);
    assert_eq!(plan.periods[1].trips[1].action, RowAction::Insert);
}

#[rstest]
fn unknown_surrogate_key_is_inserted(mut stored_schedule: Schedule) {
    let stored = StoredShape::of(&stored_schedule);
    stored_schedule.periods[2].identity = Identity::Persisted(99);

    let plan = plan(&stored_schedule, &stored).expect("plan");

    assert_eq!(plan.periods[2].action, RowAction::Insert);
    assert_eq!(plan.deleted_periods, vec![3]);
}

#[rstest]
fn rejects_duplicate_surrogate_keys(mut stored_schedule: Schedule) {
    let stored = StoredShape::of(&stored_schedule);
    stored_schedule.periods[1].trips[0].identity = Identity::Persisted(10);

    let error = plan(&stored_schedule, &stored).expect_err("duplicate key");
    assert_eq!(
        error,
        ReconcileError::DuplicateIdentity {
            entity: "trip",
            id: 10
        }
    );
}

#[rstest]
#[case(0)]
#[case(-4)]
fn rejects_non_positive_surrogate_keys(mut stored_schedule: Schedule, #[case] key: i32) {
    let stored = StoredShape::of(&stored_schedule);
    stored_schedule.periods[0].identity = Identity::Persisted(key);

    let error = plan(&stored_schedule, &stored).expect_err("non-positive key");
    assert_eq!(
        error,
        ReconcileError::NonPositiveIdentity {
            entity: "period",
            id: key
        }
    );
}

#[rstest]
fn rejects_duplicate_external_ids(mut stored_schedule: Schedule) {
    let duplicate = stored_schedule.periods[0].trips[0].clone();
    let id = duplicate.id;
    let mut duplicate = duplicate;
    duplicate.identity = Identity::Pending;
    stored_schedule.periods[1].trips.push(duplicate);

    let error = plan(&stored_schedule, &StoredShape::default()).expect_err("duplicate uuid");
    assert_eq!(error, ReconcileError::DuplicateExternalId { entity: "trip", id });
}
