//! Cancellation and teardown integration tests.

mod common;

use std::io::{Read, Write};
use std::net::TcpListener;
use std::time::{Duration, Instant};

use common::*;
use water_runtime::{
    Conn, Errno, Registry, RuntimeError, WaterDialer, WorkerOutcome,
};

// ── Scenario: cancel a stuck guest ──

#[test]
fn test_cancel_unblocks_stuck_guest_quickly() {
    init_tracing();
    let mut session = Registry::builtin().session(config_for(STUCK_GUEST)).unwrap();
    session.initialize().unwrap();

    let (_app, guest_half) = water_runtime::conn::unix_pair().unwrap();
    let _view = session.dial_from(guest_half).unwrap();
    assert!(!session.is_terminated());

    let started = Instant::now();
    let outcome = session.cancel().unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, WorkerOutcome::Errno(Errno::Canceled));
    assert!(
        elapsed < Duration::from_millis(500),
        "cancel took {elapsed:?}"
    );
    assert!(session.is_terminated());
    assert_eq!(session.descriptor_count(), 0);
}

#[test]
fn test_double_cancel_is_stable_and_nonblocking() {
    init_tracing();
    let mut session = Registry::builtin().session(config_for(STUCK_GUEST)).unwrap();
    session.initialize().unwrap();
    let (_app, guest_half) = water_runtime::conn::unix_pair().unwrap();
    session.dial_from(guest_half).unwrap();

    session.cancel().unwrap();

    let started = Instant::now();
    let err = session.cancel().unwrap_err();
    assert!(matches!(err, RuntimeError::AlreadyCancelled), "{err}");
    assert!(started.elapsed() < Duration::from_millis(100));

    // Still stable on the third try.
    assert!(matches!(
        session.cancel().unwrap_err(),
        RuntimeError::AlreadyCancelled
    ));
}

// ── Cancel after natural worker exit ──

#[test]
fn test_cancel_returns_result_of_finished_worker() {
    init_tracing();
    let remote = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = remote.local_addr().unwrap();

    let dialer = WaterDialer::new(config_for(&relay_guest(GuestRole::Dial, false)));
    let conn = dialer.dial("tcp", &addr.to_string()).unwrap();
    let (_remote_conn, _) = remote.accept().unwrap();

    // Close the caller side and give the worker time to observe EOF and
    // return on its own.
    Conn::shutdown(&conn).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let mut conn = conn;
    let outcome = conn.cancel().unwrap();
    assert_eq!(outcome, WorkerOutcome::Clean, "worker saw caller EOF");

    let err = conn.cancel().unwrap_err();
    assert!(matches!(err, RuntimeError::AlreadyCancelled));
}

// ── Teardown invariants ──

#[test]
fn test_terminated_session_has_empty_table_and_closed_sockets() {
    init_tracing();
    let remote = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = remote.local_addr().unwrap();

    let dialer = WaterDialer::new(config_for(&relay_guest(GuestRole::Dial, false)));
    let mut conn = dialer.dial("tcp", &addr.to_string()).unwrap();
    let (mut remote_conn, _) = remote.accept().unwrap();
    remote_conn
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    assert!(conn.session().descriptor_count() >= 3, "caller+network+cancel");

    conn.cancel().unwrap();
    assert_eq!(conn.session().descriptor_count(), 0);

    // The network-side ground truth was shut down by teardown.
    let mut rest = Vec::new();
    remote_conn.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}

#[test]
fn test_descriptor_lookup_stable_until_terminated() {
    init_tracing();
    let mut session = Registry::builtin().session(config_for(STUCK_GUEST)).unwrap();
    session.initialize().unwrap();
    let (_app, guest_half) = water_runtime::conn::unix_pair().unwrap();
    let _view = session.dial_from(guest_half).unwrap();

    // The stuck guest returns the caller descriptor as its "network" side;
    // the bridge view must resolve to the same live socket every time.
    for fd in 0..16 {
        let first = session.lookup(fd).is_some();
        let second = session.lookup(fd).is_some();
        assert_eq!(first, second);
    }

    session.cancel().unwrap();
    for fd in 0..16 {
        assert!(session.lookup(fd).is_none(), "fd {fd} survived teardown");
    }
}

#[test]
fn test_drop_of_running_session_does_not_leak_worker() {
    init_tracing();
    let remote = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = remote.local_addr().unwrap();

    let dialer = WaterDialer::new(config_for(&relay_guest(GuestRole::Dial, false)));
    let conn = dialer.dial("tcp", &addr.to_string()).unwrap();
    let (mut remote_conn, _) = remote.accept().unwrap();
    remote_conn
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    // Finalizer path: drop without an explicit cancel. The worker must be
    // cancelled and every socket closed, observable as EOF on the remote.
    drop(conn);
    let mut rest = Vec::new();
    remote_conn.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}

#[test]
fn test_worker_errno_is_surfaced_to_cancel() {
    init_tracing();
    // A worker that exits with a non-cancel errno as soon as it starts.
    let wat = r#"(module
      (func (export "_water_v0"))
      (func (export "_water_init") (result i32) (i32.const 0))
      (func (export "_water_cancel_with") (param $fd i32) (result i32) (i32.const 0))
      (func (export "_water_dial") (param $caller i32) (result i32)
        (local.get $caller))
      (func (export "_water_worker") (result i32) (i32.const -64))
    )"#;
    let mut session = Registry::builtin().session(config_for(wat)).unwrap();
    session.initialize().unwrap();
    let (_app, guest_half) = water_runtime::conn::unix_pair().unwrap();
    session.dial_from(guest_half).unwrap();

    std::thread::sleep(Duration::from_millis(100));
    let outcome = session.cancel().unwrap();
    assert_eq!(outcome, WorkerOutcome::Errno(Errno::Pipe));
}

#[test]
fn test_trapping_worker_is_surfaced_as_failure() {
    init_tracing();
    let wat = r#"(module
      (func (export "_water_v0"))
      (func (export "_water_init") (result i32) (i32.const 0))
      (func (export "_water_cancel_with") (param $fd i32) (result i32) (i32.const 0))
      (func (export "_water_dial") (param $caller i32) (result i32)
        (local.get $caller))
      (func (export "_water_worker") (result i32) (unreachable))
    )"#;
    let mut session = Registry::builtin().session(config_for(wat)).unwrap();
    session.initialize().unwrap();
    let (_app, guest_half) = water_runtime::conn::unix_pair().unwrap();
    session.dial_from(guest_half).unwrap();

    let outcome = session.cancel().unwrap();
    assert!(
        matches!(outcome, WorkerOutcome::Failed(_)),
        "expected trap failure, got {outcome:?}"
    );
    assert!(session.is_terminated());
}

// ── Caller-side write after cancel reaches a dead pipe ──

#[test]
fn test_writes_after_terminate_fail() {
    init_tracing();
    let mut session = Registry::builtin().session(config_for(STUCK_GUEST)).unwrap();
    session.initialize().unwrap();
    let (app, guest_half) = water_runtime::conn::unix_pair().unwrap();
    session.dial_from(guest_half).unwrap();
    session.cancel().unwrap();

    // Teardown shut down the guest half; the app half now hits a dead peer.
    let mut app = app;
    let result = app.write_all(b"late");
    assert!(result.is_err(), "write into terminated session must fail");
}
