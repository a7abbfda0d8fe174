//! End-to-end routing, reroute, stop and concurrency scenarios against a live pool.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;

use task_dispatch::pool::{Coordinator, Task};
use task_dispatch::{DispatchError, PoolConfig, PoolEvent};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll until the store holds at least `count` results.
async fn wait_for_results(coordinator: &Coordinator, count: usize) -> Vec<Task> {
    loop {
        let results = coordinator.results().await;
        if results.len() >= count {
            return results;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn three_workers_five_tasks() {
    timeout(TEST_TIMEOUT, async {
        let coordinator = Coordinator::start(PoolConfig::with_workers(3)).unwrap();

        for (id, input) in [(0, "a"), (1, "b"), (2, "c"), (3, "d"), (4, "e")] {
            coordinator.submit(Task::new(id, input)).await.unwrap();
        }

        let results = wait_for_results(&coordinator, 5).await;
        assert_eq!(results.len(), 5);

        let received_by = |worker: usize| -> HashSet<i64> {
            results
                .iter()
                .filter(|t| t.worker_id == Some(worker))
                .map(|t| t.id)
                .collect()
        };
        assert_eq!(received_by(0), HashSet::from([0, 3]));
        assert_eq!(received_by(1), HashSet::from([1, 4]));
        assert_eq!(received_by(2), HashSet::from([2]));

        for task in &results {
            assert_eq!(task.result, format!("Processed: {}", task.input));
        }

        let stats = coordinator.worker_stats().await;
        assert_eq!(stats[&0].total_completed, 2);
        assert_eq!(stats[&1].total_completed, 2);
        assert_eq!(stats[&2].total_completed, 1);
        assert!(stats.values().all(|s| s.alive));
        assert!(stats.values().all(|s| s.last_activity_at >= s.started_at));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn dead_primary_reroutes_to_next_live_worker() {
    timeout(TEST_TIMEOUT, async {
        let coordinator = Coordinator::start(PoolConfig::with_workers(3)).unwrap();
        let mut events = coordinator.subscribe();
        coordinator.liveness().set(1, false).await;

        let worker_id = coordinator.submit(Task::new(1, "b")).await.unwrap();
        assert_eq!(worker_id, 2);

        let results = wait_for_results(&coordinator, 1).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].worker_id, Some(2));

        assert_eq!(
            events.recv().await.unwrap(),
            PoolEvent::TaskRerouted {
                task_id: 1,
                from_worker: 1,
                to_worker: 2,
            }
        );

        let stats = coordinator.worker_stats().await;
        assert_eq!(stats[&1].total_dispatched, 0);
        assert_eq!(stats[&2].total_dispatched, 1);
        assert!(!stats[&1].alive);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn all_dead_rejects_without_storing() {
    timeout(TEST_TIMEOUT, async {
        let coordinator = Coordinator::start(PoolConfig::with_workers(3)).unwrap();
        coordinator.submit(Task::new(0, "a")).await.unwrap();
        wait_for_results(&coordinator, 1).await;

        for worker_id in 0..3 {
            coordinator.liveness().set(worker_id, false).await;
        }

        let outcome = coordinator.submit(Task::new(2, "c")).await;
        assert_eq!(outcome, Err(DispatchError::AllWorkersDown { task_id: 2 }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(coordinator.results().await.len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn stop_marks_dead_and_freezes_counters() {
    timeout(TEST_TIMEOUT, async {
        let coordinator = Coordinator::start(PoolConfig::with_workers(3)).unwrap();
        for id in 0..6 {
            coordinator.submit(Task::new(id, format!("t{id}"))).await.unwrap();
        }
        wait_for_results(&coordinator, 6).await;

        coordinator.stop().await;
        coordinator.join().await;

        let before = coordinator.worker_stats().await;
        assert!(before.values().all(|s| !s.alive));

        assert_eq!(
            coordinator.submit(Task::new(7, "late")).await,
            Err(DispatchError::Stopped)
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        let after = coordinator.worker_stats().await;
        for (id, stats) in &after {
            assert_eq!(stats.total_dispatched, before[id].total_dispatched);
            assert_eq!(stats.total_completed, before[id].total_completed);
        }
        assert_eq!(coordinator.results().await.len(), 6);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn stop_emits_worker_stopped_for_each_worker() {
    timeout(TEST_TIMEOUT, async {
        let coordinator = Coordinator::start(PoolConfig::with_workers(4)).unwrap();
        let mut events = coordinator.subscribe();

        coordinator.stop().await;
        coordinator.join().await;

        let mut stopped = HashSet::new();
        while let Ok(event) = events.try_recv() {
            if let PoolEvent::WorkerStopped { worker_id } = event {
                stopped.insert(worker_id);
            }
        }
        assert_eq!(stopped, HashSet::from([0, 1, 2, 3]));
    })
    .await
    .expect("test timed out");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn thousand_concurrent_submissions() {
    timeout(TEST_TIMEOUT, async {
        let coordinator = Coordinator::start(PoolConfig::with_workers(5)).unwrap();

        let callers = (0..10i64).map(|caller| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                for n in 0..100i64 {
                    let id = caller * 100 + n;
                    coordinator
                        .submit(Task::new(id, format!("input-{id}")))
                        .await
                        .unwrap();
                }
            })
        });
        for joined in join_all(callers).await {
            joined.unwrap();
        }

        let results = wait_for_results(&coordinator, 1000).await;
        assert_eq!(results.len(), 1000);

        let ids: HashSet<i64> = results.iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 1000, "duplicate completion records");

        for task in &results {
            assert_eq!(task.worker_id, Some((task.id as usize) % 5));
        }

        let stats = coordinator.worker_stats().await;
        let dispatched: u64 = stats.values().map(|s| s.total_dispatched).sum();
        let completed: u64 = stats.values().map(|s| s.total_completed).sum();
        assert_eq!(dispatched, 1000);
        assert_eq!(completed, 1000);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn full_inbox_backpressures_dispatch() {
    timeout(TEST_TIMEOUT, async {
        let config = PoolConfig {
            inbox_capacity: 1,
            ..PoolConfig::with_workers(2)
        };
        let coordinator = Coordinator::start(config).unwrap();

        // Every task lands on worker 0; a one-slot inbox still drains them all.
        for n in 0..50 {
            assert_eq!(coordinator.submit(Task::new(n * 2, "x")).await, Ok(0));
        }

        let results = wait_for_results(&coordinator, 50).await;
        let ids: Vec<i64> = results.iter().map(|t| t.id).collect();
        let expected: Vec<i64> = (0..50).map(|n| n * 2).collect();
        assert_eq!(ids, expected, "per-worker FIFO order violated");
    })
    .await
    .expect("test timed out");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_answers_every_pending_submission() {
    timeout(TEST_TIMEOUT, async {
        let config = PoolConfig {
            inbox_capacity: 1,
            intake_capacity: 1,
            ..PoolConfig::with_workers(2)
        };
        let coordinator = Coordinator::start(config).unwrap();

        // Each submitter keeps going until the pool turns it away.
        let submitters: Vec<_> = (0..16i64)
            .map(|caller| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    let mut accepted = 0u64;
                    for n in 0..10_000i64 {
                        match coordinator.submit(Task::new(caller * 10_000 + n, "x")).await {
                            Ok(_) => accepted += 1,
                            Err(DispatchError::Stopped) => return accepted,
                            Err(other) => panic!("unexpected rejection: {other}"),
                        }
                    }
                    accepted
                })
            })
            .collect();

        wait_for_results(&coordinator, 1).await;
        coordinator.stop().await;

        // Every submitter, including those parked on the full intake or
        // waiting on a reply, gets an answer.
        let mut accepted = 0u64;
        for joined in join_all(submitters).await {
            accepted += joined.unwrap();
        }

        coordinator.join().await;
        assert_eq!(
            coordinator.submit(Task::new(0, "late")).await,
            Err(DispatchError::Stopped)
        );

        let stats = coordinator.worker_stats().await;
        let dispatched: u64 = stats.values().map(|s| s.total_dispatched).sum();
        assert!(accepted <= dispatched);
        assert!(coordinator.results().await.len() as u64 <= accepted);
    })
    .await
    .expect("a submission was left unanswered after stop");
}
