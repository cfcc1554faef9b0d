//! Behavioural coverage of schedule persistence through the service layer.
//!
//! Runs against the in-memory repository so it needs no database; the
//! PostgreSQL adapter is held to the same behaviour in
//! `diesel_schedule_repository.rs`.

use std::sync::Arc;

use chrono::TimeDelta;
use rstest::{fixture, rstest};
use serde_json::json;
use transit_schedules::domain::ports::{
    QueryOptions, ScheduleRepository, StaticPathTopology,
};
use transit_schedules::domain::{ErrorCode, Identity, Schedule, ScheduleKey, ScheduleService};
use transit_schedules::outbound::memory::InMemoryScheduleRepository;
use transit_schedules::test_support::{FixtureClock, sample_schedule, without_store_metadata};
use uuid::Uuid;

type Service = ScheduleService<InMemoryScheduleRepository, StaticPathTopology>;

struct World {
    clock: Arc<FixtureClock>,
    service: Service,
    path_id: Uuid,
}

impl World {
    fn schedule(&self) -> Schedule {
        sample_schedule(Uuid::new_v4(), Uuid::new_v4(), self.path_id)
    }

    fn repository(&self) -> &InMemoryScheduleRepository {
        self.service.repository()
    }
}

#[fixture]
fn world() -> World {
    let path_id = Uuid::new_v4();
    let clock = Arc::new(FixtureClock::default());
    let repository = Arc::new(InMemoryScheduleRepository::new(clock.clone()));
    let paths = Arc::new(StaticPathTopology::new([(path_id, 4)]));
    World {
        clock,
        service: ScheduleService::new(repository, paths),
        path_id,
    }
}

#[rstest]
#[tokio::test]
async fn saved_schedule_reads_back_structurally_equal(world: World) {
    let submitted = world.schedule();

    let id = world.service.save(&submitted).await.expect("save succeeds");
    let stored = world.service.read(id).await.expect("read succeeds");

    assert_eq!(stored.identity, Identity::Persisted(id));
    assert_eq!(without_store_metadata(stored), without_store_metadata(submitted));
}

#[rstest]
#[tokio::test]
async fn exists_is_false_until_saved(world: World) {
    assert!(!world.service.exists(1).await.expect("exists answers"));

    let id = world.service.save(&world.schedule()).await.expect("save succeeds");

    assert_eq!(id, 1);
    assert!(world.service.exists(id).await.expect("exists answers"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_inserts_for_one_pair_admit_exactly_one(world: World) {
    let (service_id, line_id) = (Uuid::new_v4(), Uuid::new_v4());
    let service = Arc::new(world.service);
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&service);
            let schedule = sample_schedule(service_id, line_id, world.path_id);
            tokio::spawn(async move { service.save(&schedule).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("task joins"));
    }

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    let failure = outcomes
        .iter()
        .find_map(|outcome| outcome.as_ref().err())
        .expect("one save fails");
    assert_eq!(failure.code(), ErrorCode::Conflict);
    let stored = service.read_for_line(line_id).await.expect("line reads");
    assert_eq!(stored.len(), 1);
}

#[rstest]
#[tokio::test]
async fn removed_period_and_trip_are_deleted_on_update(world: World) {
    let mut schedule = world.schedule();
    schedule.periods.truncate(2);
    let id = world.service.save(&schedule).await.expect("save succeeds");
    let mut edited = world.service.read(id).await.expect("read succeeds");
    assert_eq!(edited.updated_at, None);

    edited.periods.remove(1);
    edited.periods[0].trips.remove(2);
    world.clock.advance(TimeDelta::minutes(3));
    world.service.save(&edited).await.expect("update succeeds");
    let stored = world.service.read(id).await.expect("read succeeds");

    assert_eq!(stored.periods.len(), 1);
    assert_eq!(stored.periods[0].id, schedule.periods[0].id);
    let trips: Vec<Uuid> = stored.periods[0].trips.iter().map(|trip| trip.id).collect();
    assert_eq!(
        trips,
        vec![
            schedule.periods[0].trips[0].id,
            schedule.periods[0].trips[1].id
        ]
    );
    assert!(stored.updated_at.is_some());
}

#[rstest]
#[tokio::test]
async fn malformed_trip_identity_leaves_schedule_unchanged(world: World) {
    let id = world.service.save(&world.schedule()).await.expect("save succeeds");
    let before = world.service.read(id).await.expect("read succeeds");

    let mut payload = serde_json::to_value(&before).expect("encodes");
    payload["periods"][0]["interval_seconds"] = json!(900);
    payload["periods"][0]["trips"][1]["id"] = json!("not-a-uuid");
    let error = world.service.import(payload).await.expect_err("identity rejected");

    assert_eq!(error.code(), ErrorCode::InvalidIdentifier);
    assert_eq!(world.service.read(id).await.expect("read succeeds"), before);
}

#[rstest]
#[tokio::test]
async fn store_failure_mid_update_leaves_schedule_unchanged(world: World) {
    let other = world.schedule();
    world.service.save(&other).await.expect("save succeeds");
    let id = world.service.save(&world.schedule()).await.expect("save succeeds");
    let before = world.service.read(id).await.expect("read succeeds");

    let mut edited = before.clone();
    edited.periods[0].interval_seconds = Some(900);
    edited.periods.remove(2);
    edited.periods[1].trips[0].id = other.periods[0].trips[0].id;
    let error = world.service.save(&edited).await.expect_err("trip uuid collides");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(world.service.read(id).await.expect("read succeeds"), before);
}

#[rstest]
#[tokio::test]
async fn abandoned_caller_transaction_commits_nothing(world: World) {
    let mut transaction = world.repository().begin().expect("begin");

    let id = world
        .service
        .save_within(&world.schedule(), &mut transaction)
        .await
        .expect("save succeeds");
    // The caller fails before committing.
    drop(transaction);

    assert!(!world.service.exists(id).await.expect("exists answers"));
    assert!(world.service.collection().await.expect("collection").is_empty());
}

#[rstest]
#[tokio::test]
async fn abandoned_update_and_delete_leave_original_schedule(world: World) {
    let id = world.service.save(&world.schedule()).await.expect("save succeeds");
    let original = world.service.read(id).await.expect("read succeeds");
    let mut updated = original.clone();
    updated.periods.remove(1);
    updated.periods[0].trips.remove(2);

    let mut transaction = world.repository().begin().expect("begin");
    world
        .repository()
        .save(&updated, QueryOptions::within(&mut transaction))
        .await
        .expect("update succeeds");
    let deleted = world
        .repository()
        .delete(ScheduleKey::Id(id), QueryOptions::within(&mut transaction))
        .await
        .expect("delete succeeds");
    // The caller fails after both writes.
    drop(transaction);

    assert_eq!(deleted, id);
    assert_eq!(world.service.read(id).await.expect("read succeeds"), original);
}

#[rstest]
#[tokio::test]
async fn joined_calls_commit_together(world: World) {
    let mut transaction = world.repository().begin().expect("begin");
    let first = world
        .service
        .save_within(&world.schedule(), &mut transaction)
        .await
        .expect("save succeeds");
    let second = world
        .service
        .save_within(&world.schedule(), &mut transaction)
        .await
        .expect("save succeeds");
    let seen_inside = world
        .repository()
        .read(first, QueryOptions::within(&mut transaction))
        .await
        .expect("visible inside");

    world.repository().commit(transaction).expect("commit");

    assert_eq!(seen_inside.identity, Identity::Persisted(first));
    assert!(world.service.exists(first).await.expect("exists answers"));
    assert!(world.service.exists(second).await.expect("exists answers"));
}

#[rstest]
#[case(4, true)]
#[case(6, false)]
#[tokio::test]
async fn trip_arrays_are_checked_against_path_node_count(
    #[case] nodes: usize,
    #[case] valid: bool,
) {
    let path_id = Uuid::new_v4();
    let service = ScheduleService::new(
        Arc::new(InMemoryScheduleRepository::default()),
        Arc::new(StaticPathTopology::new([(path_id, nodes)])),
    );
    let schedule = sample_schedule(Uuid::new_v4(), Uuid::new_v4(), path_id);

    let report = service.validate(&schedule).await.expect("validation runs");

    assert_eq!(report.is_valid, valid);
}

#[rstest]
#[case::by_surrogate_key(false)]
#[case::by_legacy_uuid(true)]
#[tokio::test]
async fn delete_removes_periods_and_trips(world: World, #[case] legacy: bool) {
    let schedule = world.schedule();
    let id = world.service.save(&schedule).await.expect("save succeeds");
    let key = if legacy {
        ScheduleKey::from(schedule.id)
    } else {
        ScheduleKey::Id(id)
    };

    assert_eq!(world.service.delete(key).await.expect("delete succeeds"), id);

    let error = world.service.read(id).await.expect_err("gone");
    assert_eq!(error.code(), ErrorCode::NotFound);
    // Period and trip uuids are free again once their rows are gone.
    let mut reused = world.schedule();
    reused.periods = schedule.periods.clone();
    world.service.save(&reused).await.expect("uuids are free");
}
