// tests/controller_lifecycle.rs
#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use batchrun::engine::{ControllerState, ExecutionController};
use batchrun::errors::BatchError;
use batchrun::exec::TemplateCommandBuilder;
use batchrun::runs::Run;
use batchrun::sink::{DiscardSinkFactory, MemorySinkFactory, StreamSinkFactory};

use crate::common::{
    ParametersBuilder, ScriptCommandBuilder, TestResult, abc_parameters, init_tracing, run_abc,
    with_timeout,
};

fn controller(
    params: ParametersBuilder,
    builder: ScriptCommandBuilder,
) -> (ExecutionController, MemorySinkFactory) {
    let sinks = MemorySinkFactory::new();
    let c = ExecutionController::new(params.build(), builder)
        .unwrap()
        .with_sinks(sinks.clone());
    (c, sinks)
}

#[tokio::test]
async fn two_runs_one_run_number_capacity_one_run_sequentially() -> TestResult {
    init_tracing();
    let builder = ScriptCommandBuilder::new("sleep 0.1; echo ok");
    let (mut c, sinks) = controller(abc_parameters().async_runs(1), builder.clone());
    c.stage([run_abc("1", "2", "3"), run_abc("4", "5", "6")])?;

    let started = Instant::now();
    let report = with_timeout(c.run(&["01"])).await?.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.planned, 2);
    assert_eq!(report.admitted, 2);
    assert_eq!(report.succeeded, 2);
    assert!(elapsed >= Duration::from_millis(200), "ran in parallel: {elapsed:?}");

    let labels = vec![
        "{a: 1, b: 2, c: 3}_01".to_string(),
        "{a: 4, b: 5, c: 6}_01".to_string(),
    ];
    assert_eq!(builder.built(), labels);

    let records = sinks.records();
    assert_eq!(records.len(), 2);
    for (record, label) in records.iter().zip(&labels) {
        assert_eq!(&record.label, label);
        assert!(record.opened && record.closed);
        assert_eq!(record.lines, vec!["ok"]);
    }

    assert!(c.done());
    Ok(())
}

#[tokio::test]
async fn runs_times_run_numbers_in_admission_order() -> TestResult {
    init_tracing();
    let (mut c, _sinks) = controller(abc_parameters(), ScriptCommandBuilder::new("true"));
    c.stage([run_abc("1", "2", "3"), run_abc("4", "5", "6")])?;

    let plan = c.plan(&["01", "02"])?;
    let labels: Vec<&str> = plan.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "{a: 1, b: 2, c: 3}_01",
            "{a: 1, b: 2, c: 3}_02",
            "{a: 4, b: 5, c: 6}_01",
            "{a: 4, b: 5, c: 6}_02",
        ]
    );

    let unnumbered = c.plan::<&str>(&[])?;
    assert_eq!(unnumbered.len(), 2);
    assert_eq!(unnumbered[0].run_number, None);
    assert_eq!(unnumbered[0].label, "{a: 1, b: 2, c: 3}_NA");
    Ok(())
}

#[tokio::test]
async fn zero_runs_completes_immediately() -> TestResult {
    init_tracing();
    let (c, sinks) = controller(abc_parameters(), ScriptCommandBuilder::new("true"));

    let report = with_timeout(c.run(&["01"])).await?.unwrap();
    assert_eq!(report.planned, 0);
    assert!(sinks.records().is_empty());
    assert_eq!(c.state(), ControllerState::Idle);
    Ok(())
}

#[tokio::test]
async fn stop_mid_run_interrupts_and_admits_nothing_more() -> TestResult {
    init_tracing();
    let (mut c, sinks) = controller(
        abc_parameters().async_runs(2),
        ScriptCommandBuilder::new("exec sleep 5"),
    );
    c.stage([
        run_abc("1", "0", "0"),
        run_abc("2", "0", "0"),
        run_abc("3", "0", "0"),
        run_abc("4", "0", "0"),
    ])?;

    let handle = c.start(&["01"])?.unwrap();
    assert_eq!(c.state(), ControllerState::Running);

    tokio::time::sleep(Duration::from_millis(300)).await;
    c.stop_handle().stop();
    assert_eq!(c.state(), ControllerState::Cancelling);

    let started = Instant::now();
    let report = with_timeout(handle.wait()).await?;
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(report.planned, 4);
    assert_eq!(report.admitted, 2);
    assert_eq!(report.cancelled, 2);
    assert_eq!(report.skipped(), 2);
    assert_eq!(c.state(), ControllerState::Idle);

    // Sinks exist for the whole plan; only admitted ones were opened.
    let opened: Vec<_> = sinks.records().into_iter().filter(|r| r.opened).collect();
    assert_eq!(opened.len(), 2);
    assert!(opened.iter().all(|r| r.closed));
    Ok(())
}

#[tokio::test]
async fn stop_while_idle_is_a_no_op_and_controller_is_reusable() -> TestResult {
    init_tracing();
    let (mut c, _sinks) = controller(abc_parameters(), ScriptCommandBuilder::new("true"));
    c.stage([run_abc("1", "2", "3")])?;

    c.stop();
    assert_eq!(c.state(), ControllerState::Idle);

    let first = with_timeout(c.run::<&str>(&[])).await?.unwrap();
    let second = with_timeout(c.run::<&str>(&[])).await?.unwrap();
    assert_eq!(first.succeeded, 1);
    assert_eq!(second.succeeded, 1);
    Ok(())
}

#[tokio::test]
async fn second_invocation_while_running_is_ignored() -> TestResult {
    init_tracing();
    let builder = ScriptCommandBuilder::new("sleep 0.3");
    let (mut c, _sinks) = controller(abc_parameters(), builder.clone());
    c.stage([run_abc("1", "2", "3")])?;

    let handle = c.start::<&str>(&[])?.unwrap();
    assert!(c.start::<&str>(&[])?.is_none());
    assert!(c.run::<&str>(&[]).await?.is_none());
    assert!(!handle.is_finished());

    let report = with_timeout(handle.wait()).await?;
    assert_eq!(report.admitted, 1);
    assert_eq!(builder.built().len(), 1);
    Ok(())
}

#[tokio::test]
async fn run_failure_surfaces_after_batch_drains() -> TestResult {
    init_tracing();
    let builder = ScriptCommandBuilder::new("sleep 0.2; echo fine")
        .script_for("{a: 1, b: 2, c: 3}_NA", "exit 4");
    let (mut c, sinks) = controller(abc_parameters().async_runs(2), builder);
    c.stage([run_abc("1", "2", "3"), run_abc("4", "5", "6"), run_abc("7", "8", "9")])?;

    match with_timeout(c.run::<&str>(&[])).await {
        Err(BatchError::RunFailure { code: Some(4), .. }) => {}
        other => panic!("expected RunFailure, got {other:?}"),
    }

    let records = sinks.records();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.closed));
    assert_eq!(records[2].lines, vec!["fine"]);
    assert!(c.done());
    Ok(())
}

#[tokio::test]
async fn missing_output_directory_fails_before_spawning() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let missing = tmp.path().join("not-created");
    let builder = ScriptCommandBuilder::new("true");

    let result = ExecutionController::new(
        abc_parameters().output_dir(&missing).build(),
        builder.clone(),
    );

    assert!(matches!(result, Err(BatchError::ConfigError(msg)) if msg.contains("not-created")));
    assert!(builder.built().is_empty());
    Ok(())
}

#[tokio::test]
async fn file_sinks_write_one_file_per_run() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let mut c = ExecutionController::new(
        abc_parameters().output_dir(tmp.path()).build(),
        ScriptCommandBuilder::new("echo line1; echo line2"),
    )?;
    c.stage([run_abc("1", "2", "3")])?;

    with_timeout(c.run(&["01"])).await?;

    let contents = std::fs::read_to_string(tmp.path().join("run_01_1_2_3.out"))?;
    assert_eq!(contents, "line1\nline2\n");
    Ok(())
}

#[tokio::test]
async fn pause_and_resume_are_not_implemented() -> TestResult {
    let (c, _sinks) = controller(abc_parameters(), ScriptCommandBuilder::new("true"));
    assert!(matches!(c.pause(), Err(BatchError::NotImplemented("pause"))));
    assert!(matches!(c.resume(), Err(BatchError::NotImplemented("resume"))));
    Ok(())
}

#[tokio::test]
async fn runs_with_permuted_keys_get_their_own_files() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let first = Run::new().with("a", 1).with("b", 2);
    let second = Run::new().with("b", 1).with("a", 2);
    assert_ne!(first, second);

    let builder = ScriptCommandBuilder::new("echo unexpected")
        .script_for("{a: 1, b: 2}_01", "echo first")
        .script_for("{a: 2, b: 1}_01", "echo second");
    let mut c = ExecutionController::new(
        ParametersBuilder::new(&["a", "b"])
            .async_runs(2)
            .output_dir(tmp.path())
            .build(),
        builder,
    )?;
    c.stage([first, second])?;

    let report = with_timeout(c.run(&["01"])).await?.unwrap();
    assert_eq!(report.succeeded, 2);

    let mut files: Vec<String> = std::fs::read_dir(tmp.path())?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    files.sort();
    assert_eq!(files, vec!["run_01_1_2.out", "run_01_2_1.out"]);
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("run_01_1_2.out"))?,
        "first\n"
    );
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("run_01_2_1.out"))?,
        "second\n"
    );
    Ok(())
}

#[tokio::test]
async fn batches_run_through_stream_and_discard_sinks() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;

    for stream in [true, false] {
        let c = ExecutionController::new(
            abc_parameters().output_dir(tmp.path()).async_runs(2).build(),
            ScriptCommandBuilder::new("echo streamed; printf partial"),
        )?;
        let mut c = if stream {
            c.with_sinks(StreamSinkFactory)
        } else {
            c.with_sinks(DiscardSinkFactory)
        };
        c.stage([run_abc("1", "2", "3"), run_abc("4", "5", "6")])?;

        let report = with_timeout(c.run(&["01"])).await?.unwrap();
        assert_eq!(report.succeeded, 2);
    }

    // Neither strategy touches the output directory.
    assert_eq!(std::fs::read_dir(tmp.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn configured_cancel_exit_code_counts_as_cancelled() -> TestResult {
    init_tracing();
    let builder = ScriptCommandBuilder::new("exit 2");

    let (mut custom, _sinks) = controller(abc_parameters().cancel_exit_code(2), builder.clone());
    custom.stage([run_abc("1", "2", "3")])?;
    let report = with_timeout(custom.run::<&str>(&[])).await?.unwrap();
    assert_eq!(report.cancelled, 1);
    assert_eq!(report.succeeded, 0);

    let (mut default, _sinks) = controller(abc_parameters(), builder);
    default.stage([run_abc("1", "2", "3")])?;
    assert!(matches!(
        with_timeout(default.run::<&str>(&[])).await,
        Err(BatchError::RunFailure { code: Some(2), .. })
    ));
    Ok(())
}

#[tokio::test]
async fn flags_and_parameters_reach_the_command_line() -> TestResult {
    init_tracing();
    let builder = TemplateCommandBuilder::new(
        "sh",
        vec![
            "-c".into(),
            r#"printf '%s\n' "$@""#.into(),
            "batchrun".into(),
            "{flags}".into(),
            "{greeting}-{run_number}".into(),
        ],
    )?;
    let sinks = MemorySinkFactory::new();
    let mut c = ExecutionController::new(
        abc_parameters()
            .flags(&["-b", "-x"])
            .set("greeting", "hi")
            .build(),
        builder,
    )?
    .with_sinks(sinks.clone());
    c.stage([run_abc("1", "2", "3")])?;

    with_timeout(c.run(&["07"])).await?;

    let record = sinks.record("{a: 1, b: 2, c: 3}_07").unwrap();
    assert_eq!(record.lines, vec!["-b", "-x", "hi-07"]);
    Ok(())
}

#[tokio::test]
async fn interrupt_grace_bounds_how_long_a_stubborn_run_survives_stop() -> TestResult {
    init_tracing();
    let (mut c, _sinks) = controller(
        abc_parameters().interrupt_grace_ms(200).poll_interval_ms(10),
        ScriptCommandBuilder::new("trap '' INT; sleep 5"),
    );
    c.stage([run_abc("1", "2", "3")])?;

    let handle = c.start::<&str>(&[])?.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stopped = Instant::now();
    c.stop();
    let report = with_timeout(handle.wait()).await?;

    assert!(stopped.elapsed() >= Duration::from_millis(200));
    assert!(stopped.elapsed() < Duration::from_secs(2));
    assert_eq!(report.cancelled, 1);
    Ok(())
}

#[tokio::test]
async fn malformed_timing_settings_fail_the_invocation() -> TestResult {
    init_tracing();
    for params in [
        abc_parameters().poll_interval_ms(-1),
        abc_parameters().interrupt_grace_ms(-5),
    ] {
        let (mut c, sinks) = controller(params, ScriptCommandBuilder::new("true"));
        c.stage([run_abc("1", "2", "3")])?;

        assert!(matches!(
            c.start::<&str>(&[]),
            Err(BatchError::ConfigError(_))
        ));
        assert!(sinks.records().is_empty());
        assert_eq!(c.state(), ControllerState::Idle);
    }
    Ok(())
}
