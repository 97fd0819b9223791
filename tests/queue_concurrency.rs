// tests/queue_concurrency.rs
#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use batchrun::errors::BatchError;
use batchrun::exec::{ExecutionQueue, ExitPolicy, ProcessWorker};
use batchrun::sink::{MemorySinkFactory, SinkFactory};
use tokio_util::sync::CancellationToken;

use crate::common::{TestResult, init_tracing, run_abc, with_timeout};

fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

fn worker(sinks: &MemorySinkFactory, id: &str, script: &str) -> ProcessWorker {
    let run = run_abc(id, "0", "0");
    let sink = sinks.create(&run, None).unwrap();
    ProcessWorker::new(run.label(None), sh(script), sink, ExitPolicy::default())
}

#[tokio::test]
async fn capacity_two_runs_five_short_workers_in_three_waves() -> TestResult {
    init_tracing();
    let sinks = MemorySinkFactory::new();
    let queue = ExecutionQueue::new(2, Duration::from_millis(100), CancellationToken::new());

    let started = Instant::now();
    with_timeout(async {
        for i in 0..5 {
            queue
                .admit(worker(&sinks, &i.to_string(), "sleep 0.1"))
                .await
                .unwrap();
            assert!(queue.running() <= 2);
        }
        let report = queue.wait_all().await.unwrap();
        assert_eq!(report.admitted, 5);
        assert_eq!(report.succeeded, 5);
    })
    .await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300), "too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "too slow: {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn failure_is_raised_only_after_every_sibling_is_joined() -> TestResult {
    init_tracing();
    let sinks = MemorySinkFactory::new();
    let queue = ExecutionQueue::new(3, Duration::from_millis(100), CancellationToken::new());

    let result = with_timeout(async {
        queue.admit(worker(&sinks, "1", "exit 3")).await.unwrap();
        queue
            .admit(worker(&sinks, "2", "sleep 0.3; echo done"))
            .await
            .unwrap();
        queue
            .admit(worker(&sinks, "3", "sleep 0.2; echo done"))
            .await
            .unwrap();
        queue.wait_all().await
    })
    .await;

    match result {
        Err(BatchError::RunFailure { label, code }) => {
            assert_eq!(code, Some(3));
            assert!(label.contains("a: 1"));
        }
        other => panic!("expected RunFailure, got {other:?}"),
    }

    let records = sinks.records();
    assert_eq!(records.len(), 3);
    for record in &records[1..] {
        assert!(record.closed, "{} was not drained", record.label);
        assert_eq!(record.lines, vec!["done"]);
    }
    assert_eq!(queue.running(), 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_queue_refuses_admission() -> TestResult {
    init_tracing();
    let sinks = MemorySinkFactory::new();
    let cancel = CancellationToken::new();
    let queue = ExecutionQueue::new(1, Duration::from_millis(100), cancel.clone());

    cancel.cancel();
    let result = queue.admit(worker(&sinks, "1", "true")).await;
    assert!(matches!(result, Err(BatchError::Cancelled)));
    assert!(queue.is_closed());

    let report = queue.wait_all().await?;
    assert_eq!(report.admitted, 0);
    Ok(())
}

#[tokio::test]
async fn terminate_interrupts_running_and_unblocks_waiting_admission() -> TestResult {
    init_tracing();
    let sinks = MemorySinkFactory::new();
    let queue = std::sync::Arc::new(ExecutionQueue::new(
        1,
        Duration::from_millis(100),
        CancellationToken::new(),
    ));

    queue.admit(worker(&sinks, "1", "exec sleep 5")).await?;

    let waiting = {
        let queue = std::sync::Arc::clone(&queue);
        let w = worker(&sinks, "2", "exec sleep 5");
        tokio::spawn(async move { queue.admit(w).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    queue.terminate();

    let admitted = with_timeout(waiting).await?;
    assert!(matches!(admitted, Err(BatchError::Cancelled)));

    let report = with_timeout(queue.wait_all()).await?;
    assert_eq!(report.admitted, 1);
    assert_eq!(report.cancelled, 1);
    Ok(())
}
