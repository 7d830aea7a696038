//! Session controller command and break-plumbing tests.

use std::sync::Arc;

use tokio::sync::Mutex;

use machine_session::config::MachineConfig;
use machine_session::controller::{BreakReason, Session, SessionController, SharedSession};
use machine_session::machine::word_machine::{halt, load, out, store};

fn new_session() -> SharedSession {
    Arc::new(Mutex::new(Session::new(None, "tcp".into())))
}

fn test_machine_config() -> MachineConfig {
    let mut program = vec![load(1, 8), out(1), store(9, 1), halt()];
    program.resize(8, 0);
    program.push(99); // word 8
    MachineConfig {
        memory_log2_size: 9,
        program,
        entry_point: 0,
        registers: Vec::new(),
    }
}

#[tokio::test]
async fn create_twice_reports_already_exists() {
    let session = new_session();
    let controller = SessionController::new(Arc::clone(&session));

    controller.create(&test_machine_config()).await.expect("first create");
    let err = controller
        .create(&test_machine_config())
        .await
        .expect_err("second create");
    assert_eq!(err.kind_str(), "already_exists");
}

#[tokio::test]
async fn create_surfaces_collaborator_failure_as_unknown() {
    let session = new_session();
    let controller = SessionController::new(Arc::clone(&session));

    let config = MachineConfig {
        entry_point: 4, // unaligned
        ..MachineConfig::default()
    };
    let err = controller.create(&config).await.expect_err("bad config");
    assert_eq!(err.kind_str(), "unknown");
    assert!(session.lock().await.machine.is_none());
}

#[tokio::test]
async fn run_without_machine_reports_not_found() {
    let controller = SessionController::new(new_session());
    let err = controller.run(5).await.expect_err("no machine");
    assert_eq!(err.kind_str(), "not_found");
}

#[tokio::test]
async fn run_rejects_zero_limit() {
    let controller = SessionController::new(new_session());
    controller.create(&test_machine_config()).await.expect("create");

    let err = controller.run(0).await.expect_err("zero limit");
    assert_eq!(err.kind_str(), "invalid_argument");

    // Cycle count is unchanged by the rejection.
    let (cycle, _) = controller.run(1).await.expect("run");
    assert_eq!(cycle, 1);
}

#[tokio::test]
async fn run_rejects_limit_behind_current_cycle() {
    let controller = SessionController::new(new_session());
    controller.create(&test_machine_config()).await.expect("create");

    controller.run(3).await.expect("advance");
    let err = controller.run(2).await.expect_err("behind");
    assert_eq!(err.kind_str(), "invalid_argument");

    let (cycle, output) = controller.run(3).await.expect("no-op at current cycle");
    assert_eq!(cycle, 3);
    assert_eq!(output, 99);
}

#[tokio::test]
async fn run_returns_cycle_and_output() {
    let controller = SessionController::new(new_session());
    controller.create(&test_machine_config()).await.expect("create");

    let (cycle, output) = controller.run(100).await.expect("run");
    assert_eq!(cycle, 4);
    assert_eq!(output, 99);
}

#[tokio::test]
async fn step_without_machine_reports_not_found() {
    let controller = SessionController::new(new_session());
    let err = controller.step().await.expect_err("no machine");
    assert_eq!(err.kind_str(), "not_found");
}

#[tokio::test]
async fn step_returns_proof_valid_log() {
    let controller = SessionController::new(new_session());
    controller.create(&test_machine_config()).await.expect("create");

    let log = controller.step().await.expect("step");
    assert!(!log.accesses.is_empty());
    for access in &log.accesses {
        assert!(access.proof.verify());
    }
}

#[tokio::test]
async fn machine_failure_keeps_session_usable() {
    let controller = SessionController::new(new_session());
    let config = MachineConfig {
        memory_log2_size: 9,
        program: vec![0xff], // invalid opcode
        entry_point: 0,
        registers: Vec::new(),
    };
    controller.create(&config).await.expect("create");

    let err = controller.run(10).await.expect_err("interpretation failure");
    assert_eq!(err.kind_str(), "unknown");

    // The session still answers commands after the recovered failure.
    assert_eq!(controller.inc().await, 1);
    let err = controller.rollback().await.expect_err("not forked");
    assert_eq!(err.kind_str(), "failed_precondition");
}

#[tokio::test]
async fn rollback_requires_a_checkpoint_child() {
    let session = new_session();
    let controller = SessionController::new(Arc::clone(&session));

    let err = controller.rollback().await.expect_err("not forked");
    assert_eq!(err.kind_str(), "failed_precondition");
    assert_eq!(err.message(), "no snapshot");

    // Rejection is side-effect free: no break was requested.
    assert!(session.lock().await.break_reason.is_none());
    assert!(!controller.teardown_token().is_cancelled());
}

#[tokio::test]
async fn rollback_allowed_when_forked() {
    let session = new_session();
    session.lock().await.forked = true;
    let controller = SessionController::new(Arc::clone(&session));

    controller.rollback().await.expect("forked rollback");
    assert_eq!(
        session.lock().await.break_reason,
        Some(BreakReason::Rollback)
    );
    assert!(controller.teardown_token().is_cancelled());
}

#[tokio::test]
async fn first_break_wins_for_a_listener_instance() {
    let session = new_session();
    let controller = SessionController::new(Arc::clone(&session));

    controller.snapshot().await;
    controller.shutdown().await;

    assert_eq!(
        session.lock().await.break_reason,
        Some(BreakReason::Snapshot)
    );
    assert!(controller.teardown_token().is_cancelled());
}

#[tokio::test]
async fn shutdown_requests_break() {
    let session = new_session();
    let controller = SessionController::new(Arc::clone(&session));

    controller.shutdown().await;
    assert_eq!(
        session.lock().await.break_reason,
        Some(BreakReason::Shutdown)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn commands_never_interleave() {
    let controller = Arc::new(SessionController::new(new_session()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let controller = Arc::clone(&controller);
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                controller.inc().await;
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }

    // Every increment ran under the one session lock; none were lost to
    // interleaving.
    assert_eq!(controller.read_counter().await, 800);
}
