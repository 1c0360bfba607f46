// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleetd_core::test_support::job;
use fleetd_core::{EventBus, JobStep, StepAction};
use fleetd_transport::{FakeBroker, FakeCloud};
use std::path::Path;
use uuid::Uuid;

fn identity() -> DeviceIdentity {
    DeviceIdentity {
        uuid: Uuid::nil(),
        api_key: "k".into(),
        broker_url: None,
        broker_username: None,
        broker_password: None,
        os_version: String::new(),
        agent_version: String::new(),
    }
}

/// Install an executable shell script as a handler.
fn install_handler(dir: &Path, name: &str, script: &str) {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

struct Harness {
    broker: FakeBroker,
    cloud: FakeCloud,
    handle: JobEngineHandle,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

fn harness(timeout: Duration, handlers: &[(&str, &str)]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    for (name, script) in handlers {
        install_handler(dir.path(), name, script);
    }
    let broker = FakeBroker::default();
    let cloud = FakeCloud::new();
    let (engine, handle) = JobEngine::new(
        Arc::new(broker.clone()),
        Arc::new(cloud.clone()),
        EventBus::new(),
        identity(),
        dir.path(),
        timeout,
    );
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::new(engine).run(cancel.clone()));
    Harness {
        broker,
        cloud,
        handle,
        cancel,
        task,
        _dir: dir,
    }
}

async fn wait_idle(handle: &JobEngineHandle) {
    for _ in 0..600 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if !handle.is_busy() {
            return;
        }
    }
    panic!("job engine stayed busy");
}

async fn run_to_completion(h: &Harness, job: fleetd_core::JobExecutionData) {
    assert!(h.handle.submit(job).await);
    // Let the executor pick it up before watching the busy flag
    tokio::time::sleep(Duration::from_millis(50)).await;
    wait_idle(&h.handle).await;
}

#[tokio::test]
async fn successful_job_reports_in_progress_then_succeeded() {
    let h = harness(
        Duration::from_secs(10),
        &[("greet", "echo hello from handler")],
    );
    run_to_completion(&h, job("j-1", "greet")).await;

    let updates = h.cloud.status_updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].1.status, JobStatus::InProgress);
    assert_eq!(updates[1].1.status, JobStatus::Succeeded);
    assert_eq!(updates[1].1.exit_code, Some(0));
    assert!(updates[1].1.stdout.as_deref().unwrap().contains("hello"));

    h.cancel.cancel();
    let _ = h.task.await;
}

#[tokio::test]
async fn failing_step_aborts_remaining_steps() {
    let h = harness(
        Duration::from_secs(10),
        &[
            ("boom", "echo broken >&2; exit 3"),
            ("after", "echo should not run"),
        ],
    );
    let mut failing = job("j-2", "boom");
    failing.job_document.steps.push(JobStep {
        action: StepAction {
            kind: "after".into(),
            input: serde_json::Value::Null,
        },
    });
    run_to_completion(&h, failing).await;

    let updates = h.cloud.status_updates();
    let terminal = &updates.last().unwrap().1;
    assert_eq!(terminal.status, JobStatus::Failed);
    assert_eq!(terminal.exit_code, Some(3));
    assert!(terminal.stderr.as_deref().unwrap().contains("broken"));
    assert!(terminal.status_details.as_deref().unwrap().contains("step 0"));

    h.cancel.cancel();
    let _ = h.task.await;
}

#[tokio::test]
async fn hanging_step_is_killed_and_reported_timed_out() {
    let h = harness(
        Duration::from_millis(200),
        &[("hang", "echo starting >&2; sleep 30")],
    );
    run_to_completion(&h, job("j-3", "hang")).await;

    let updates = h.cloud.status_updates();
    let terminal = &updates.last().unwrap().1;
    assert_eq!(terminal.status, JobStatus::TimedOut);
    assert!(terminal.stderr.as_deref().unwrap().contains("starting"));
    assert!(terminal
        .status_details
        .as_deref()
        .unwrap()
        .contains("timeout"));

    h.cancel.cancel();
    let _ = h.task.await;
}

#[tokio::test]
async fn job_timeout_override_beats_default() {
    // Default would allow the sleep; the job document says 1 second… in
    // the other direction: default 200ms, override 10s lets it finish.
    let h = harness(Duration::from_millis(200), &[("nap", "sleep 1; echo ok")]);
    let mut napping = job("j-4", "nap");
    napping.timeout_seconds = Some(10);
    run_to_completion(&h, napping).await;

    let updates = h.cloud.status_updates();
    assert_eq!(updates.last().unwrap().1.status, JobStatus::Succeeded);

    h.cancel.cancel();
    let _ = h.task.await;
}

#[tokio::test]
async fn unknown_handler_fails_the_job() {
    let h = harness(Duration::from_secs(10), &[]);
    run_to_completion(&h, job("j-5", "missing")).await;

    let updates = h.cloud.status_updates();
    let terminal = &updates.last().unwrap().1;
    assert_eq!(terminal.status, JobStatus::Failed);
    assert!(terminal
        .status_details
        .as_deref()
        .unwrap()
        .contains("missing"));

    h.cancel.cancel();
    let _ = h.task.await;
}

#[tokio::test]
async fn path_like_handler_names_are_refused() {
    let h = harness(Duration::from_secs(10), &[]);
    run_to_completion(&h, job("j-6", "../etc/passwd")).await;

    let updates = h.cloud.status_updates();
    let terminal = &updates.last().unwrap().1;
    assert_eq!(terminal.status, JobStatus::Failed);

    h.cancel.cancel();
    let _ = h.task.await;
}

#[tokio::test]
async fn handler_reads_input_from_stdin() {
    let h = harness(Duration::from_secs(10), &[("cat-input", "cat")]);
    let mut with_input = job("j-7", "cat-input");
    with_input.job_document.steps[0].action.input = serde_json::json!({ "url": "https://x" });
    run_to_completion(&h, with_input).await;

    let updates = h.cloud.status_updates();
    let terminal = &updates.last().unwrap().1;
    assert_eq!(terminal.status, JobStatus::Succeeded);
    assert!(terminal.stdout.as_deref().unwrap().contains("https://x"));

    h.cancel.cancel();
    let _ = h.task.await;
}

#[tokio::test]
async fn status_goes_to_broker_when_connected() {
    let h = harness(Duration::from_secs(10), &[("greet", "echo hi")]);
    h.broker.set_connected(true);
    run_to_completion(&h, job("j-8", "greet")).await;

    // Both IN_PROGRESS and terminal went over the broker, none over HTTP
    assert!(h.cloud.status_updates().is_empty());
    let topic = identity().job_update_topic("j-8");
    assert_eq!(h.broker.published_on(&topic).len(), 2);

    h.cancel.cancel();
    let _ = h.task.await;
}

#[tokio::test]
async fn broker_failure_falls_back_to_http() {
    let h = harness(Duration::from_secs(10), &[("greet", "echo hi")]);
    h.broker.set_connected(true);
    h.broker.set_fail_publish(true);
    run_to_completion(&h, job("j-9", "greet")).await;

    assert_eq!(h.cloud.status_updates().len(), 2);
    assert!(h.broker.published().is_empty());

    h.cancel.cancel();
    let _ = h.task.await;
}
