//! Unit coverage for the in-memory schedule repository.

use chrono::TimeDelta;
use rstest::{fixture, rstest};

use super::*;
use crate::test_support::{FixtureClock, fixture_timestamp, sample_schedule};

struct Harness {
    clock: Arc<FixtureClock>,
    repository: InMemoryScheduleRepository,
}

#[fixture]
fn harness() -> Harness {
    let clock = Arc::new(FixtureClock::default());
    let repository = InMemoryScheduleRepository::new(clock.clone());
    Harness { clock, repository }
}

fn schedule() -> Schedule {
    sample_schedule(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
}

#[rstest]
#[tokio::test]
async fn insert_stamps_created_at_and_leaves_updated_at_null(harness: Harness) {
    let id = harness
        .repository
        .save(&schedule(), QueryOptions::default())
        .await
        .expect("insert succeeds");

    let stored = harness
        .repository
        .read(id, QueryOptions::default())
        .await
        .expect("read succeeds");

    assert_eq!(stored.created_at, Some(fixture_timestamp()));
    assert_eq!(stored.updated_at, None);
    assert!(stored.trips().all(|trip| trip.updated_at.is_none()));
}

#[rstest]
#[tokio::test]
async fn update_keeps_created_at_and_stamps_updated_at(harness: Harness) {
    let id = harness
        .repository
        .save(&schedule(), QueryOptions::default())
        .await
        .expect("insert succeeds");
    let mut stored = harness
        .repository
        .read(id, QueryOptions::default())
        .await
        .expect("read succeeds");

    harness.clock.advance(TimeDelta::minutes(5));
    stored.is_frozen = true;
    harness
        .repository
        .save(&stored, QueryOptions::default())
        .await
        .expect("update succeeds");
    let updated = harness
        .repository
        .read(id, QueryOptions::default())
        .await
        .expect("read succeeds");

    let later = fixture_timestamp() + TimeDelta::minutes(5);
    assert_eq!(updated.created_at, Some(fixture_timestamp()));
    assert_eq!(updated.updated_at, Some(later));
    assert_eq!(updated.periods[0].created_at, Some(fixture_timestamp()));
    assert_eq!(updated.periods[0].updated_at, Some(later));
}

#[rstest]
#[tokio::test]
async fn writes_inside_a_transaction_are_invisible_until_commit(harness: Harness) {
    let mut transaction = harness.repository.begin().expect("begin");
    let id = harness
        .repository
        .save(&schedule(), QueryOptions::within(&mut transaction))
        .await
        .expect("insert succeeds");

    let outside = harness
        .repository
        .exists(id, QueryOptions::default())
        .await
        .expect("exists succeeds");
    let inside = harness
        .repository
        .exists(id, QueryOptions::within(&mut transaction))
        .await
        .expect("exists succeeds");
    assert!(!outside);
    assert!(inside);

    harness.repository.commit(transaction).expect("commit");
    assert!(
        harness
            .repository
            .exists(id, QueryOptions::default())
            .await
            .expect("exists succeeds")
    );
}

#[rstest]
#[tokio::test]
async fn dropping_a_transaction_rolls_it_back(harness: Harness) {
    let mut transaction = harness.repository.begin().expect("begin");
    let id = harness
        .repository
        .save(&schedule(), QueryOptions::within(&mut transaction))
        .await
        .expect("insert succeeds");
    drop(transaction);

    assert!(
        !harness
            .repository
            .exists(id, QueryOptions::default())
            .await
            .expect("exists succeeds")
    );
}

#[rstest]
#[tokio::test]
async fn overtaken_transaction_fails_to_commit(harness: Harness) {
    let mut transaction = harness.repository.begin().expect("begin");
    harness
        .repository
        .save(&schedule(), QueryOptions::within(&mut transaction))
        .await
        .expect("insert succeeds");
    harness
        .repository
        .save(&schedule(), QueryOptions::default())
        .await
        .expect("standalone insert succeeds");

    let error = harness
        .repository
        .commit(transaction)
        .expect_err("stale commit is rejected");
    assert_eq!(error.kind(), "conflict");
    assert_eq!(
        harness.repository.collection().await.expect("collection").len(),
        1
    );
}

#[rstest]
#[tokio::test]
async fn failed_joined_call_leaves_transaction_untouched(harness: Harness) {
    let mut transaction = harness.repository.begin().expect("begin");
    let first = schedule();
    harness
        .repository
        .save(&first, QueryOptions::within(&mut transaction))
        .await
        .expect("insert succeeds");

    let mut clash = schedule();
    clash.service_id = first.service_id;
    clash.line_id = first.line_id;
    let error = harness
        .repository
        .save(&clash, QueryOptions::within(&mut transaction))
        .await
        .expect_err("pair is taken");
    assert_eq!(error.kind(), "conflict");

    harness.repository.commit(transaction).expect("commit");
    let stored = harness.repository.collection().await.expect("collection");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, first.id);
}

#[rstest]
#[tokio::test]
async fn truncation_cascades_downwards(harness: Harness) {
    let id = harness
        .repository
        .save(&schedule(), QueryOptions::default())
        .await
        .expect("insert succeeds");

    harness
        .repository
        .truncate_schedule_trips()
        .expect("truncate trips");
    let stored = harness
        .repository
        .read(id, QueryOptions::default())
        .await
        .expect("read succeeds");
    assert_eq!(stored.periods.len(), 3);
    assert_eq!(stored.trips().count(), 0);

    harness
        .repository
        .truncate_schedule_periods()
        .expect("truncate periods");
    harness.repository.truncate_schedules().expect("truncate schedules");
    harness.repository.destroy();
    assert!(harness.repository.collection().await.expect("collection").is_empty());
}

#[rstest]
#[tokio::test]
async fn surrogate_keys_are_never_reused(harness: Harness) {
    let first = harness
        .repository
        .save(&schedule(), QueryOptions::default())
        .await
        .expect("insert succeeds");
    harness
        .repository
        .delete(ScheduleKey::Id(first), QueryOptions::default())
        .await
        .expect("delete succeeds");
    let second = harness
        .repository
        .save(&schedule(), QueryOptions::default())
        .await
        .expect("insert succeeds");

    assert!(second > first);
}

#[rstest]
#[case(0)]
#[case(-2)]
#[tokio::test]
async fn non_positive_schedule_key_is_an_identity_error(harness: Harness, #[case] key: i32) {
    let mut candidate = schedule();
    candidate.identity = Identity::Persisted(key);

    let error = harness
        .repository
        .save(&candidate, QueryOptions::default())
        .await
        .expect_err("key is rejected");
    assert_eq!(error.kind(), "invalid_identifier");
}
