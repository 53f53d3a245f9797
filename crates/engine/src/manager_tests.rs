// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use abp_adapters::{FakeConnectionManager, LaunchOptions, RecordingLauncher};
use abp_core::{FixedIdGen, SequentialIdGen};
use std::time::Duration;

struct Pool {
    manager: Arc<BuilderManager>,
    fake: FakeConnectionManager,
    launcher: RecordingLauncher,
}

fn sh_config(script: &str) -> PoolConfig {
    PoolConfig::new("sh")
        .builder_args(vec!["-c".to_string(), script.to_string(), "abp-builder".to_string()])
        .startup_poll(Duration::from_millis(10))
        .startup_timeout(Duration::from_secs(5))
        .idle_pump_delay(Duration::from_millis(20))
}

fn pool_with(config: PoolConfig, ids: Arc<dyn IdGen>) -> Pool {
    let fake = FakeConnectionManager::new();
    let launcher = RecordingLauncher::new(LaunchOptions::default());
    let manager = BuilderManager::with_parts(
        config,
        Arc::new(fake.clone()),
        Arc::new(launcher.clone()),
        ids,
        CancellationToken::new(),
    );
    Pool { manager: Arc::new(manager), fake, launcher }
}

fn pool() -> Pool {
    pool_with(sh_config("sleep 30"), Arc::new(SequentialIdGen::new()))
}

fn hello(id: WorkerId) -> Vec<u8> {
    abp_wire::encode(&Message::BuilderHello(BuilderHello {
        builder_id: id,
        platform: "testos".to_string(),
    }))
    .unwrap()
}

/// Stands in for the builder side: answers every launched builder with a
/// ping on a fresh connection.
fn ping_back(pool: &Pool) -> JoinHandle<()> {
    let manager = Arc::clone(&pool.manager);
    let fake = pool.fake.clone();
    tokio::spawn(async move {
        let mut next = 100;
        loop {
            for (id, _, state) in manager.builder_summaries() {
                if state == WorkerState::Unconnected {
                    let conn = ConnectionId(next);
                    next += 1;
                    fake.connect(conn);
                    manager.incoming_builder_ping(conn, &hello(id)).await;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
}

#[tokio::test]
async fn idle_builder_is_reused() {
    let pool = pool();
    let pinger = ping_back(&pool);

    let first = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap().id();
    let second = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap().id();

    assert_eq!(first, second);
    assert_eq!(pool.launcher.launch_count(), 1);
    assert_eq!(pool.manager.builder_count(), 1);
    pinger.abort();
}

#[tokio::test]
async fn busy_builder_is_not_shared() {
    let pool = pool();
    let pinger = ping_back(&pool);

    let first = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap();
    let second = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(pool.launcher.launch_count(), 2);
    pinger.abort();
}

#[tokio::test]
async fn registration_builders_are_never_reused() {
    let pool = pool();
    let pinger = ping_back(&pool);

    let first = pool.manager.get_builder(Purpose::Registration).await.unwrap().id();
    let second = pool.manager.get_builder(Purpose::Registration).await.unwrap().id();

    assert_ne!(first, second);
    assert_eq!(pool.launcher.launch_count(), 2);
    pinger.abort();
}

#[tokio::test]
async fn builders_are_reused_per_purpose() {
    let pool = pool();
    let pinger = ping_back(&pool);

    let create = pool.manager.get_builder(Purpose::CreateJobs).await.unwrap().id();
    let process = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap().id();
    let create_again = pool.manager.get_builder(Purpose::CreateJobs).await.unwrap().id();

    assert_ne!(create, process);
    assert_eq!(create, create_again);
    pinger.abort();
}

#[tokio::test]
async fn launched_builders_carry_their_task() {
    let pool = pool();
    let pinger = ping_back(&pool);

    let builder = pool.manager.get_builder(Purpose::CreateJobs).await.unwrap();
    let launched = pool.launcher.launched();
    assert!(launched[0].args.contains(&format!("-id={}", builder.id())));
    assert!(launched[0].args.contains(&"-task=create".to_string()));
    pinger.abort();
}

#[tokio::test]
async fn shutdown_refuses_new_allocations() {
    let pool = pool();
    pool.manager.shutdown().await;
    assert!(pool.manager.is_shutting_down());

    let err = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap_err();
    assert_eq!(err, PoolError::Shutdown);
    assert_eq!(pool.launcher.launch_count(), 0);
}

#[tokio::test]
async fn injected_quit_token_stops_allocations() {
    let quit = CancellationToken::new();
    let manager = BuilderManager::with_parts(
        sh_config("sleep 30"),
        Arc::new(FakeConnectionManager::new()),
        Arc::new(RecordingLauncher::default()),
        Arc::new(SequentialIdGen::new()),
        quit.clone(),
    );
    quit.cancel();
    assert_eq!(manager.get_builder(Purpose::ProcessJob).await.unwrap_err(), PoolError::Shutdown);
}

#[tokio::test]
async fn id_collisions_exhaust_retries() {
    let taken = WorkerId::from_u128(7);
    let ids = Arc::new(FixedIdGen::new(taken));
    let pool = pool_with(
        sh_config("sleep 30").allow_unmanaged_builder_connections(true),
        ids.clone(),
    );
    pool.fake.connect(ConnectionId(1));
    assert_eq!(
        pool.manager.incoming_builder_ping(ConnectionId(1), &hello(taken)).await,
        Some(taken)
    );

    let err = pool.manager.get_builder(Purpose::Registration).await.unwrap_err();
    assert_eq!(err, PoolError::IdCollision { attempts: 10 });
    assert_eq!(ids.calls(), 10);
    assert_eq!(pool.launcher.launch_count(), 0);
    assert_eq!(pool.manager.builder_count(), 1);
}

#[tokio::test]
async fn collision_retry_bound_is_configurable() {
    let ids = Arc::new(FixedIdGen::new(WorkerId::nil()));
    let pool = pool_with(sh_config("sleep 30").id_collision_retries(3), ids.clone());

    let err = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap_err();
    assert_eq!(err, PoolError::IdCollision { attempts: 3 });
    assert_eq!(ids.calls(), 3);
}

#[tokio::test]
async fn start_failure_unregisters_builder() {
    let pool = pool_with(sh_config("exit 1"), Arc::new(SequentialIdGen::new()));

    let err = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap_err();
    match err {
        PoolError::StartFailure { builder_id, purpose, reason } => {
            assert_eq!(builder_id, WorkerId::from_u128(1));
            assert_eq!(purpose, Purpose::ProcessJob);
            assert!(reason.contains("code 1"), "{reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(pool.manager.builder_count(), 0);
}

#[tokio::test]
async fn undecodable_ping_is_ignored() {
    let pool = pool();
    pool.fake.connect(ConnectionId(1));
    assert_eq!(pool.manager.incoming_builder_ping(ConnectionId(1), b"{not json").await, None);
    assert_eq!(pool.manager.builder_count(), 0);
    assert!(pool.fake.sent().is_empty());
}

#[tokio::test]
async fn ping_with_wrong_message_is_ignored() {
    let pool = pool();
    let frame = abp_wire::encode(&Message::BuilderHelloAck(BuilderHelloAck {
        accepted: true,
        builder_id: WorkerId::from_u128(1),
    }))
    .unwrap();
    assert_eq!(pool.manager.incoming_builder_ping(ConnectionId(1), &frame).await, None);
}

#[tokio::test]
async fn unknown_builder_is_rejected_by_default() {
    let pool = pool();
    pool.fake.connect(ConnectionId(1));
    let ping = hello(WorkerId::from_u128(42));
    assert_eq!(pool.manager.incoming_builder_ping(ConnectionId(1), &ping).await, None);
    assert_eq!(pool.manager.builder_count(), 0);
    assert!(pool.fake.sent().is_empty());
}

#[tokio::test]
async fn unmanaged_builder_is_registered_for_process_jobs() {
    let pool = pool_with(
        sh_config("sleep 30").allow_unmanaged_builder_connections(true),
        Arc::new(SequentialIdGen::new()),
    );
    let id = WorkerId::from_u128(42);
    pool.fake.connect(ConnectionId(5));

    assert_eq!(pool.manager.incoming_builder_ping(ConnectionId(5), &hello(id)).await, Some(id));
    assert_eq!(
        pool.fake.sent(),
        vec![(
            ConnectionId(5),
            Message::BuilderHelloAck(BuilderHelloAck { accepted: true, builder_id: id })
        )]
    );
    assert_eq!(
        pool.manager.builder_summaries(),
        vec![(id, Purpose::ProcessJob, WorkerState::Connected)]
    );

    let builder = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap();
    assert_eq!(builder.id(), id);
    assert!(!builder.builder().is_managed());
    assert_eq!(pool.launcher.launch_count(), 0);
}

#[tokio::test]
async fn duplicate_ping_keeps_existing_connection() {
    let pool = pool_with(
        sh_config("sleep 30").allow_unmanaged_builder_connections(true),
        Arc::new(SequentialIdGen::new()),
    );
    let id = WorkerId::from_u128(42);
    pool.fake.connect(ConnectionId(1));
    pool.fake.connect(ConnectionId(2));

    assert!(pool.manager.incoming_builder_ping(ConnectionId(1), &hello(id)).await.is_some());
    assert_eq!(pool.manager.incoming_builder_ping(ConnectionId(2), &hello(id)).await, None);

    let builder = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap();
    assert_eq!(builder.builder().connection(), Some(ConnectionId(1)));
    assert_eq!(pool.fake.sent().len(), 1);
}

#[tokio::test]
async fn connection_lost_removes_builder() {
    let pool = pool();
    let pinger = ping_back(&pool);

    let id = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap().id();
    let conn = pool
        .fake
        .sent()
        .iter()
        .find_map(|(conn, msg)| match msg {
            Message::BuilderHelloAck(ack) if ack.builder_id == id => Some(*conn),
            _ => None,
        })
        .unwrap();
    pinger.abort();

    assert_eq!(pool.manager.connection_lost(conn).await, Some(id));
    assert_eq!(pool.manager.builder_count(), 0);
    assert_eq!(pool.manager.connection_lost(conn).await, None);
}

#[tokio::test]
async fn summaries_track_builder_state() {
    let pool = pool();
    let pinger = ping_back(&pool);

    let builder = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap();
    let id = builder.id();
    assert_eq!(
        pool.manager.builder_summaries(),
        vec![(id, Purpose::ProcessJob, WorkerState::Busy)]
    );

    drop(builder);
    assert_eq!(
        pool.manager.builder_summaries(),
        vec![(id, Purpose::ProcessJob, WorkerState::Idle)]
    );
    pinger.abort();
}

#[tokio::test]
async fn dispatched_jobs_land_in_trace() {
    let pool = pool();
    let pinger = ping_back(&pool);

    let builder = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap();
    for key in ["a.tif", "b.fbx"] {
        let request = abp_wire::JobRequest {
            job_key: key.to_string(),
            purpose: Purpose::ProcessJob,
            payload: serde_json::Value::Null,
        };
        let outcome = builder.run_job_with_retry(request, Duration::from_secs(5), None).await;
        assert!(matches!(outcome, crate::BuilderRunJobOutcome::Ok(_)));
    }
    assert_eq!(builder.builder().debug_trace(), vec!["a.tif", "b.fbx"]);
    pinger.abort();
}

#[tokio::test]
async fn retired_builder_is_pruned_by_pump_task() {
    let pool = pool();
    let pinger = ping_back(&pool);

    let builder = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap();
    builder.builder().disconnect();
    drop(builder);

    let pruned = async {
        while pool.manager.builder_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), pruned).await.unwrap();
    pinger.abort();
}

#[tokio::test]
async fn idle_builder_output_is_drained_by_pump_task() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("done");
    let script = format!(
        "sleep 0.5; i=0; while [ $i -lt 30000 ]; do echo line-$i; i=$((i+1)); done; \
         touch '{}'; sleep 30",
        marker.display()
    );
    let pool = pool_with(sh_config(&script), Arc::new(SequentialIdGen::new()));
    let pinger = ping_back(&pool);

    let builder = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap();
    drop(builder);

    let finished = async {
        while !marker.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(15), finished)
        .await
        .expect("idle builder blocked writing output");
    pinger.abort();
    pool.manager.shutdown().await;
}

#[tokio::test]
async fn shutdown_terminates_builder_processes() {
    let pool = pool();
    let pinger = ping_back(&pool);

    let builder = pool.manager.get_builder(Purpose::ProcessJob).await.unwrap();
    let handle = Arc::clone(builder.builder());
    drop(builder);
    pinger.abort();

    pool.manager.shutdown().await;
    assert!(handle.process_exited().await);
}
