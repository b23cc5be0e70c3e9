//! End-to-end scheduler tests against fixture scanner scripts.
//!
//! Each fixture is a small shell script standing in for the scanner binary:
//! it ignores its arguments and emits a scripted output stream, which lets
//! the tests exercise spawning, streaming, exit classification and
//! termination without a real scanner installed.

#![cfg(unix)]

use scanforge_core::{ScanOptions, TaskId, TaskState};
use scanforge_engine::{DirTemplateStore, EngineError, Scheduler, Settings};
use std::sync::Arc;
use std::time::{Duration, Instant};

const RESULT_A: &str =
    r#"{"templateID":"tmpl1","matched-at":"http://a","info":{"severity":"high"}}"#;
const RESULT_B: &str =
    r#"{"templateID":"tmpl1","matched-at":"http://b","info":{"severity":"medium"}}"#;

struct Fixture {
    scheduler: Scheduler,
    _dir: tempfile::TempDir,
}

/// Build a scheduler whose scanner binary is a shell script with the given
/// body, with one known template `tmpl1` on disk and a 1s grace period.
fn fixture(script_body: &str) -> Fixture {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();

    let templates_dir = dir.path().join("templates");
    std::fs::create_dir_all(&templates_dir).unwrap();
    std::fs::write(templates_dir.join("tmpl1.yaml"), "id: tmpl1\n").unwrap();

    let script = dir.path().join("scanner.sh");
    std::fs::write(&script, format!("#!/bin/sh\n{}\n", script_body)).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let settings = Settings {
        binary: script.display().to_string(),
        templates_dir: templates_dir.clone(),
        grace_period_secs: 1,
        ..Settings::default()
    };
    let scheduler = Scheduler::new(settings, Arc::new(DirTemplateStore::new(templates_dir)));

    Fixture {
        scheduler,
        _dir: dir,
    }
}

async fn create(
    scheduler: &Scheduler,
    targets: &[&str],
    options: ScanOptions,
) -> Result<TaskId, EngineError> {
    scheduler
        .create_task(
            "test-scan",
            targets.iter().map(|t| t.to_string()).collect(),
            vec!["tmpl1".to_string()],
            options,
        )
        .await
}

async fn wait_for_terminal(scheduler: &Scheduler, id: &TaskId) -> TaskState {
    wait_for(scheduler, id, TaskState::is_terminal).await
}

async fn wait_for(
    scheduler: &Scheduler,
    id: &TaskId,
    pred: impl Fn(&TaskState) -> bool,
) -> TaskState {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let snap = scheduler.get(id).await.unwrap();
        if pred(&snap.state) {
            return snap.state;
        }
        assert!(
            Instant::now() < deadline,
            "task stuck in {:?}",
            snap.state
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn completed_scan_collects_findings() {
    // Two targets, one template, concurrency 10; the process emits two
    // valid result lines and exits 0.
    let fx = fixture(&format!("echo '{}'\necho '{}'", RESULT_A, RESULT_B));
    let id = create(
        &fx.scheduler,
        &["http://a", "http://b"],
        ScanOptions::default().with_concurrency(10),
    )
    .await
    .unwrap();

    assert_eq!(wait_for_terminal(&fx.scheduler, &id).await, TaskState::Completed);

    let snap = fx.scheduler.get(&id).await.unwrap();
    assert_eq!(snap.result_count, 2);
    assert_eq!(snap.lines_processed, 2);
    assert_eq!(snap.malformed_lines, 0);
    assert_eq!(snap.target_count, 2);
    assert_eq!(snap.template_count, 1);
    assert!(snap.elapsed_ms.is_some());
    assert!(snap.last_error.is_none());

    let findings = fx.scheduler.findings(&id).await.unwrap();
    assert_eq!(findings[0].matched_at, "http://a");
    assert_eq!(findings[0].severity, "high");
    assert_eq!(findings[1].matched_at, "http://b");
}

#[tokio::test]
async fn malformed_lines_are_counted_not_fatal() {
    let fx = fixture(&format!(
        "echo '[INF] scanner starting'\necho '{}'\necho 'not json at all'",
        RESULT_A
    ));
    let id = create(&fx.scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(wait_for_terminal(&fx.scheduler, &id).await, TaskState::Completed);

    let snap = fx.scheduler.get(&id).await.unwrap();
    assert_eq!(snap.result_count, 1);
    assert_eq!(snap.malformed_lines, 2);
    assert_eq!(snap.lines_processed, 3);
}

#[tokio::test]
async fn nonzero_exit_fails_and_keeps_partial_results() {
    let fx = fixture(&format!("echo '{}'\necho 'disk full' >&2\nexit 2", RESULT_A));
    let id = create(&fx.scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(wait_for_terminal(&fx.scheduler, &id).await, TaskState::Failed);

    let snap = fx.scheduler.get(&id).await.unwrap();
    assert_eq!(snap.result_count, 1);
    assert!(snap.last_error.as_deref().unwrap().contains("disk full"));
}

#[tokio::test]
async fn exit_code_reported_when_stderr_is_silent() {
    let fx = fixture("exit 7");
    let id = create(&fx.scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(wait_for_terminal(&fx.scheduler, &id).await, TaskState::Failed);

    let snap = fx.scheduler.get(&id).await.unwrap();
    assert!(snap.last_error.as_deref().unwrap().contains("code 7"));
}

#[tokio::test]
async fn spawn_failure_fails_the_task() {
    let fx = fixture("true");
    let mut settings = fx.scheduler.settings().clone();
    settings.binary = "/nonexistent/scanner-binary".to_string();
    let scheduler = Scheduler::new(
        settings,
        Arc::new(DirTemplateStore::new(fx._dir.path().join("templates"))),
    );

    let id = create(&scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(wait_for_terminal(&scheduler, &id).await, TaskState::Failed);
    let snap = scheduler.get(&id).await.unwrap();
    assert!(snap.last_error.as_deref().unwrap().contains("spawn"));
}

#[tokio::test]
async fn empty_targets_rejected_without_registering() {
    let fx = fixture("true");
    let err = create(&fx.scheduler, &[], ScanOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(fx.scheduler.list().await.is_empty());
}

#[tokio::test]
async fn invalid_option_rejected_without_registering() {
    let fx = fixture("true");
    let err = create(
        &fx.scheduler,
        &["http://a"],
        ScanOptions::default().with_proxy("gopher://bad"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(fx.scheduler.task_count().await, 0);
}

#[tokio::test]
async fn unknown_template_rejected_without_registering() {
    let fx = fixture("true");
    let err = fx
        .scheduler
        .create_task(
            "test-scan",
            vec!["http://a".to_string()],
            vec!["no-such-template".to_string()],
            ScanOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TemplateNotFound(_)));
    assert!(fx.scheduler.list().await.is_empty());
}

#[tokio::test]
async fn stop_terminates_a_running_scan() {
    let fx = fixture("sleep 30");
    let id = create(&fx.scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();
    wait_for(&fx.scheduler, &id, |s| *s == TaskState::Running).await;

    let start = Instant::now();
    fx.scheduler.stop(&id).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));

    let snap = fx.scheduler.get(&id).await.unwrap();
    assert_eq!(snap.state, TaskState::Stopped);
}

#[tokio::test]
async fn stop_force_kills_past_the_grace_period() {
    // The script ignores the termination signal; only the follow-up
    // force-kill can end it, still within the bounded wait.
    let fx = fixture("trap '' TERM\nsleep 30");
    let id = create(&fx.scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();
    wait_for(&fx.scheduler, &id, |s| *s == TaskState::Running).await;
    // Let the trap install before signalling.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    fx.scheduler.stop(&id).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(
        fx.scheduler.get(&id).await.unwrap().state,
        TaskState::Stopped
    );
}

#[tokio::test]
async fn stop_immediately_after_create_never_hangs() {
    // The stop may land before the process spawns (Pending -> Stopped) or
    // just after; either way the task must settle in Stopped.
    let fx = fixture("sleep 30");
    let id = create(&fx.scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();

    fx.scheduler.stop(&id).await.unwrap();
    assert_eq!(wait_for_terminal(&fx.scheduler, &id).await, TaskState::Stopped);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let fx = fixture("sleep 30");
    let id = create(&fx.scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();
    wait_for(&fx.scheduler, &id, |s| *s == TaskState::Running).await;

    fx.scheduler.stop(&id).await.unwrap();
    fx.scheduler.stop(&id).await.unwrap();
    assert_eq!(
        fx.scheduler.get(&id).await.unwrap().state,
        TaskState::Stopped
    );
}

#[tokio::test]
async fn stop_unknown_task_is_not_found() {
    let fx = fixture("true");
    let err = fx.scheduler.stop(&TaskId::generate()).await.unwrap_err();
    assert!(matches!(err, EngineError::TaskNotFound(_)));
}

#[tokio::test]
async fn concurrent_tasks_are_isolated() {
    let fx = fixture("sleep 30");
    let a = create(&fx.scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();
    let b = create(&fx.scheduler, &["http://b"], ScanOptions::default())
        .await
        .unwrap();
    wait_for(&fx.scheduler, &a, |s| *s == TaskState::Running).await;
    wait_for(&fx.scheduler, &b, |s| *s == TaskState::Running).await;

    fx.scheduler.stop(&a).await.unwrap();

    assert_eq!(fx.scheduler.get(&a).await.unwrap().state, TaskState::Stopped);
    assert_eq!(fx.scheduler.get(&b).await.unwrap().state, TaskState::Running);
    assert!(fx.scheduler.get(&b).await.unwrap().last_error.is_none());

    fx.scheduler.stop(&b).await.unwrap();
}

#[tokio::test]
async fn remove_requires_a_terminal_state() {
    let fx = fixture("sleep 30");
    let id = create(&fx.scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();
    wait_for(&fx.scheduler, &id, |s| *s == TaskState::Running).await;

    let err = fx.scheduler.remove(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));

    fx.scheduler.stop(&id).await.unwrap();
    fx.scheduler.remove(&id).await.unwrap();

    let err = fx.scheduler.get(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::TaskNotFound(_)));
}

#[tokio::test]
async fn list_preserves_insertion_order() {
    let fx = fixture("true");
    let mut ids = Vec::new();
    for target in ["http://a", "http://b", "http://c"] {
        ids.push(create(&fx.scheduler, &[target], ScanOptions::default()).await.unwrap());
    }

    let listed: Vec<TaskId> = fx.scheduler.list().await.into_iter().map(|s| s.id).collect();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn prune_finished_drops_only_terminal_tasks() {
    let fx = fixture("sleep 30");
    let running = create(&fx.scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();
    let stopped = create(&fx.scheduler, &["http://b"], ScanOptions::default())
        .await
        .unwrap();
    wait_for(&fx.scheduler, &running, |s| *s == TaskState::Running).await;
    wait_for(&fx.scheduler, &stopped, |s| *s == TaskState::Running).await;
    fx.scheduler.stop(&stopped).await.unwrap();

    assert_eq!(fx.scheduler.prune_finished().await, 1);
    assert!(fx.scheduler.get(&running).await.is_ok());
    assert!(matches!(
        fx.scheduler.get(&stopped).await.unwrap_err(),
        EngineError::TaskNotFound(_)
    ));

    fx.scheduler.stop(&running).await.unwrap();
}

#[tokio::test]
async fn events_follow_state_transitions() {
    let fx = fixture(&format!("echo '{}'", RESULT_A));
    let mut events = fx.scheduler.subscribe();

    let id = create(&fx.scheduler, &["http://a"], ScanOptions::default())
        .await
        .unwrap();
    wait_for_terminal(&fx.scheduler, &id).await;

    let first = events.recv().await.unwrap();
    assert_eq!(first.task_id, id);
    assert_eq!(first.state, TaskState::Running);

    let second = events.recv().await.unwrap();
    assert_eq!(second.state, TaskState::Completed);
    assert!(second.error.is_none());
}
