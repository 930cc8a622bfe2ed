mod common;

use chrono::{Duration, Utc};
use common::Harness;
use jobrunner_core::models::{DispatchMessage, KillRequest};
use jobrunner_testing_utils::{RunBuilder, WorkerBuilder};

#[tokio::test]
async fn test_random_assignment_is_persisted() {
    let h = Harness::new().await;
    let w1 = h.fixture.add_worker(WorkerBuilder::new("key-1").build()).await.unwrap();
    let w2 = h.fixture.add_worker(WorkerBuilder::new("key-2").build()).await.unwrap();
    let job = h.fixture.add_job(h.fixture.job().build()).await.unwrap();
    let run = h
        .fixture
        .add_run(RunBuilder::new(job.id, Utc::now() - Duration::seconds(10)).build())
        .await
        .unwrap();

    let dispatched = h.broadcaster.broadcast_runs(Utc::now()).await.unwrap();
    assert_eq!(dispatched, 1);

    let stored = h.fixture.run_by_id(run.id).await.unwrap().unwrap();
    let assigned = stored.worker_id.unwrap();
    assert!(assigned == w1.id || assigned == w2.id);
    let key = if assigned == w1.id { "key-1" } else { "key-2" };

    assert_eq!(
        h.publisher.dispatch_messages(&Harness::channel(key)).await,
        vec![DispatchMessage::enqueue(run.id)]
    );

    // 尚未被Worker确认，下次扫描重发给同一个Worker
    h.broadcaster.broadcast_runs(Utc::now()).await.unwrap();
    assert_eq!(
        h.publisher.dispatch_messages(&Harness::channel(key)).await.len(),
        2
    );
    assert_eq!(h.publisher.published().await.len(), 2);
}

#[tokio::test]
async fn test_explicit_worker_is_used() {
    let h = Harness::new().await;
    h.fixture.add_worker(WorkerBuilder::new("key-1").build()).await.unwrap();
    let w2 = h.fixture.add_worker(WorkerBuilder::new("key-2").build()).await.unwrap();
    let job = h.fixture.add_job(h.fixture.job().build()).await.unwrap();
    let run = h
        .fixture
        .add_run(RunBuilder::new(job.id, Utc::now()).with_worker(w2.id).build())
        .await
        .unwrap();

    h.broadcaster.broadcast_runs(Utc::now()).await.unwrap();

    assert_eq!(
        h.publisher.dispatch_messages(&Harness::channel("key-2")).await,
        vec![DispatchMessage::enqueue(run.id)]
    );
    assert!(h
        .publisher
        .dispatch_messages(&Harness::channel("key-1"))
        .await
        .is_empty());
}

#[tokio::test]
async fn test_fan_out_creates_batch_per_worker() {
    let h = Harness::new().await;
    let w1 = h.fixture.add_worker(WorkerBuilder::new("key-1").build()).await.unwrap();
    let w2 = h.fixture.add_worker(WorkerBuilder::new("key-2").build()).await.unwrap();
    h.fixture
        .add_worker(WorkerBuilder::new("key-3").disabled().build())
        .await
        .unwrap();
    let job = h
        .fixture
        .add_job(h.fixture.job().on_all_workers().build())
        .await
        .unwrap();
    let placeholder = h
        .fixture
        .add_run(RunBuilder::new(job.id, Utc::now()).build())
        .await
        .unwrap();

    let dispatched = h.broadcaster.broadcast_runs(Utc::now()).await.unwrap();
    assert_eq!(dispatched, 2);

    assert!(h.fixture.run_by_id(placeholder.id).await.unwrap().is_none());
    let runs = h.fixture.runs_of_job(job.id).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].schedule_id, runs[0].id);
    assert_eq!(runs[1].schedule_id, runs[0].id);
    assert_eq!(runs[0].worker_id, Some(w1.id));
    assert_eq!(runs[1].worker_id, Some(w2.id));
    assert_eq!(runs[0].schedule_dts, placeholder.schedule_dts);

    assert_eq!(
        h.publisher.dispatch_messages(&Harness::channel("key-1")).await,
        vec![DispatchMessage::enqueue(runs[0].id)]
    );
    assert_eq!(
        h.publisher.dispatch_messages(&Harness::channel("key-2")).await,
        vec![DispatchMessage::enqueue(runs[1].id)]
    );
    assert!(h
        .publisher
        .dispatch_messages(&Harness::channel("key-3"))
        .await
        .is_empty());
}

#[tokio::test]
async fn test_disabled_job_only_dispatches_manual_runs() {
    let h = Harness::new().await;
    h.fixture.add_worker(WorkerBuilder::new("key-1").build()).await.unwrap();
    let job = h.fixture.add_job(h.fixture.job().disabled().build()).await.unwrap();
    h.fixture
        .add_run(RunBuilder::new(job.id, Utc::now() - Duration::minutes(1)).build())
        .await
        .unwrap();

    assert_eq!(h.broadcaster.broadcast_runs(Utc::now()).await.unwrap(), 0);

    let manual = h
        .fixture
        .add_run(RunBuilder::new(job.id, Utc::now()).manual().build())
        .await
        .unwrap();
    assert_eq!(h.broadcaster.broadcast_runs(Utc::now()).await.unwrap(), 1);
    assert_eq!(
        h.publisher.dispatch_messages(&Harness::channel("key-1")).await,
        vec![DispatchMessage::enqueue(manual.id)]
    );
}

#[tokio::test]
async fn test_active_run_blocks_other_batches() {
    let h = Harness::new().await;
    let worker = h.fixture.add_worker(WorkerBuilder::new("key-1").build()).await.unwrap();
    let job = h.fixture.add_job(h.fixture.job().build()).await.unwrap();
    let now = Utc::now();
    h.fixture
        .add_run(
            RunBuilder::new(job.id, now - Duration::minutes(10))
                .with_worker(worker.id)
                .started_at(now - Duration::minutes(9), 1)
                .build(),
        )
        .await
        .unwrap();
    h.fixture
        .add_run(RunBuilder::new(job.id, now - Duration::minutes(1)).build())
        .await
        .unwrap();

    assert_eq!(h.broadcaster.broadcast_runs(now).await.unwrap(), 0);
    assert!(h.publisher.published().await.is_empty());
}

#[tokio::test]
async fn test_one_batch_per_job_per_sweep() {
    let h = Harness::new().await;
    h.fixture.add_worker(WorkerBuilder::new("key-1").build()).await.unwrap();
    let job = h.fixture.add_job(h.fixture.job().build()).await.unwrap();
    let now = Utc::now();
    let first = h
        .fixture
        .add_run(RunBuilder::new(job.id, now - Duration::minutes(2)).build())
        .await
        .unwrap();
    h.fixture
        .add_run(RunBuilder::new(job.id, now - Duration::minutes(1)).manual().build())
        .await
        .unwrap();

    assert_eq!(h.broadcaster.broadcast_runs(now).await.unwrap(), 1);
    assert_eq!(
        h.publisher.dispatch_messages(&Harness::channel("key-1")).await,
        vec![DispatchMessage::enqueue(first.id)]
    );
}

#[tokio::test]
async fn test_future_runs_and_empty_pools_are_skipped() {
    let h = Harness::new().await;
    let job = h.fixture.add_job(h.fixture.job().build()).await.unwrap();
    h.fixture
        .add_run(RunBuilder::new(job.id, Utc::now() - Duration::minutes(1)).build())
        .await
        .unwrap();

    // 池中没有Worker
    assert_eq!(h.broadcaster.broadcast_runs(Utc::now()).await.unwrap(), 0);

    let other = h.fixture.add_job(h.fixture.job().with_title("later").build()).await.unwrap();
    h.fixture.add_worker(WorkerBuilder::new("key-1").build()).await.unwrap();
    let later = h
        .fixture
        .add_run(RunBuilder::new(other.id, Utc::now() + Duration::hours(1)).build())
        .await
        .unwrap();

    h.broadcaster.broadcast_runs(Utc::now()).await.unwrap();
    let messages = h.publisher.dispatch_messages(&Harness::channel("key-1")).await;
    assert_eq!(messages.len(), 1);
    assert!(!messages.contains(&DispatchMessage::enqueue(later.id)));
}

#[tokio::test]
async fn test_kill_requests_are_broadcast_until_acknowledged() {
    let h = Harness::new().await;
    let worker = h.fixture.add_worker(WorkerBuilder::new("key-1").build()).await.unwrap();
    let job = h.fixture.add_job(h.fixture.job().build()).await.unwrap();
    let now = Utc::now();
    let run = h
        .fixture
        .add_run(
            RunBuilder::new(job.id, now - Duration::minutes(5))
                .with_worker(worker.id)
                .started_at(now - Duration::minutes(4), 321)
                .build(),
        )
        .await
        .unwrap();
    let kill_request = h
        .fixture
        .add_kill_request(KillRequest::new(run.id, now))
        .await
        .unwrap();

    assert_eq!(h.broadcaster.broadcast_kill_requests().await.unwrap(), 1);
    assert_eq!(
        h.publisher.dispatch_messages(&Harness::channel("key-1")).await,
        vec![DispatchMessage::kill(kill_request.id)]
    );

    h.controller
        .update_kill_request(
            kill_request.id,
            "key-1",
            &jobrunner_core::models::KillRequestUpdate {
                enqueue_dts: Some(Utc::now()),
                execute_dts: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(h.broadcaster.broadcast_kill_requests().await.unwrap(), 0);
}

#[tokio::test]
async fn test_kill_request_for_unstarted_run_is_held() {
    let h = Harness::new().await;
    let worker = h.fixture.add_worker(WorkerBuilder::new("key-1").build()).await.unwrap();
    let job = h.fixture.add_job(h.fixture.job().build()).await.unwrap();
    let run = h
        .fixture
        .add_run(
            RunBuilder::new(job.id, Utc::now())
                .with_worker(worker.id)
                .enqueued_at(Utc::now())
                .build(),
        )
        .await
        .unwrap();
    h.fixture
        .add_kill_request(KillRequest::new(run.id, Utc::now()))
        .await
        .unwrap();

    assert_eq!(h.broadcaster.broadcast_kill_requests().await.unwrap(), 0);
}

#[tokio::test]
async fn test_ping_every_worker() {
    let h = Harness::new().await;
    h.fixture.add_worker(WorkerBuilder::new("key-1").build()).await.unwrap();
    h.fixture
        .add_worker(WorkerBuilder::new("key-2").disabled().build())
        .await
        .unwrap();

    assert_eq!(h.broadcaster.broadcast_pings().await.unwrap(), 2);
    for key in ["key-1", "key-2"] {
        assert_eq!(
            h.publisher.dispatch_messages(&Harness::channel(key)).await,
            vec![DispatchMessage::Ping]
        );
    }
}

#[tokio::test]
async fn test_sweep_summary() {
    let h = Harness::new().await;
    h.fixture.add_worker(WorkerBuilder::new("key-1").build()).await.unwrap();
    let job = h.fixture.add_job(h.fixture.job().build()).await.unwrap();
    h.fixture
        .add_run(RunBuilder::new(job.id, Utc::now()).build())
        .await
        .unwrap();

    let summary = h.broadcaster.sweep(Utc::now(), true).await.unwrap();
    assert_eq!(summary.runs_dispatched, 1);
    assert_eq!(summary.pings_sent, 1);
    assert_eq!(summary.kill_requests_dispatched, 0);

    let summary = h.broadcaster.sweep(Utc::now(), false).await.unwrap();
    assert_eq!(summary.pings_sent, 0);
}
