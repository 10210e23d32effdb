//! End-to-end session scenarios over real UDP sockets.
//!
//! A small `sh` script stands in for the capture tool: it waits for SIGTERM
//! and then writes its hex lines to `{output}`, the way a real capture tool
//! flushes its file on termination.

#![cfg(unix)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;
use tokio::net::UdpSocket;
use tokio_test::{assert_err, assert_ok};

use super::*;
use crate::configuration::{CaptureSettings, OutputFormat, SessionConfig};
use crate::error_handling::types::{SessionError, SessionErrorKind};

/// Time for the stand-in tool to install its SIGTERM trap.
const TOOL_STARTUP: Duration = Duration::from_millis(300);

#[derive(Default)]
struct RecordingObserver {
    data: AtomicUsize,
    stops: AtomicUsize,
    errors: AtomicUsize,
    records: Mutex<Vec<String>>,
}

impl SessionObserver for RecordingObserver {
    fn on_data(&self, records: &[String]) {
        self.data.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut stored) = self.records.lock() {
            stored.extend(records.iter().cloned());
        }
    }

    fn on_stop(&self, _report: &CaptureReport) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _error: &SessionError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordingObserver {
    fn assert_success_once(&self) {
        assert_eq!(self.data.load(Ordering::SeqCst), 1);
        assert_eq!(self.stops.load(Ordering::SeqCst), 1);
        assert_eq!(self.errors.load(Ordering::SeqCst), 0);
    }

    fn assert_error_once(&self) {
        assert_eq!(self.data.load(Ordering::SeqCst), 0);
        assert_eq!(self.stops.load(Ordering::SeqCst), 0);
        assert_eq!(self.errors.load(Ordering::SeqCst), 1);
    }
}

/// Capture command that writes `payloads` as hex lines once terminated.
fn writes_on_term(payloads: &[&str]) -> Vec<String> {
    let lines: Vec<String> = payloads.iter().map(hex::encode).collect();
    writes_raw_on_term(&lines.join(" "))
}

fn writes_raw_on_term(lines: &str) -> Vec<String> {
    let script = format!(
        r#"trap "printf '%s\n' {} > \"$0\"; exit 0" TERM; while :; do sleep 0.05; done"#,
        lines
    );
    vec![
        "sh".to_string(),
        "-c".to_string(),
        script,
        "{output}".to_string(),
    ]
}

fn config(dir: &TempDir, command: Vec<String>) -> SessionConfig {
    SessionConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        start_signal: Some("START".to_string()),
        stop_signal: Some("STOP".to_string()),
        timeout_seconds: 5,
        auto_stop_after_timeout: true,
        include_signals_in_message: true,
        verbose: true,
        capture: CaptureSettings {
            command: Some(command),
            output_format: OutputFormat::Hex,
            output_dir: dir.path().to_path_buf(),
            poll_interval_ms: 10,
            exit_timeout_ms: 2_000,
            ..CaptureSettings::default()
        },
    }
}

async fn send(addr: SocketAddr, payload: &str) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(payload.as_bytes(), addr).await.unwrap();
}

async fn wait_for_state(handle: &SessionHandle, state: SessionState) {
    let mut rx = handle.subscribe();
    let reached = matches!(
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state)).await,
        Ok(Ok(_))
    );
    assert!(reached, "session never reached {}", state);
}

/// Sends the start signal and waits until the capture tool is ready.
async fn start_capture(handle: &SessionHandle, addr: SocketAddr) {
    send(addr, "START").await;
    wait_for_state(handle, SessionState::Capturing).await;
    tokio::time::sleep(TOOL_STARTUP).await;
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn test_start_data_stop_delivers_wrapped_records() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let handle = run_session(
        config(&dir, writes_on_term(&["START", "hello", "STOP"])),
        observer.clone(),
    );
    let addr = handle.local_addr().await.unwrap();

    start_capture(&handle, addr).await;
    send(addr, "hello").await;
    send(addr, "STOP").await;

    let report = assert_ok!(handle.wait().await);
    assert_eq!(
        report.records,
        vec!["Start Signal: START", "hello", "Stop Signal: STOP"]
    );
    assert_eq!(report.end, SessionEnd::StopSignal);
    assert!(report.capture_file.unwrap().exists());
    observer.assert_success_once();
    assert_eq!(
        *observer.records.lock().unwrap(),
        vec!["Start Signal: START", "hello", "Stop Signal: STOP"]
    );
}

#[tokio::test]
async fn test_stop_echo_dropped_without_markers() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["START", "hello", "STOP"]));
    config.include_signals_in_message = false;
    let handle = spawn_session(config);
    let addr = handle.local_addr().await.unwrap();

    start_capture(&handle, addr).await;
    send(addr, "STOP").await;

    let report = assert_ok!(handle.wait().await);
    assert_eq!(report.records, vec!["START", "hello"]);
}

#[tokio::test]
async fn test_timeout_without_data_fails() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["hello"]));
    config.timeout_seconds = 1;
    let observer = Arc::new(RecordingObserver::default());
    let handle = run_session(config, observer.clone());
    let state = handle.subscribe();

    let err = assert_err!(handle.wait().await);
    assert!(matches!(err, SessionError::Timeout { seconds: 1 }));
    assert_eq!(*state.borrow(), SessionState::Failed);
    observer.assert_error_once();
    // capture never started
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test]
async fn test_timeout_after_data_auto_stops() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["hello"]));
    config.timeout_seconds = 2;
    let observer = Arc::new(RecordingObserver::default());
    let handle = run_session(config, observer.clone());
    let addr = handle.local_addr().await.unwrap();

    start_capture(&handle, addr).await;
    send(addr, "hello").await;

    let report = assert_ok!(handle.wait().await);
    assert_eq!(report.end, SessionEnd::AutoStop);
    assert_eq!(
        report.records,
        vec!["Start Signal: START", "hello", "Stop Signal: STOP"]
    );
    observer.assert_success_once();
}

#[tokio::test]
async fn test_timeout_after_start_without_data_fails() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["hello"]));
    config.timeout_seconds = 1;
    let handle = spawn_session(config);
    let addr = handle.local_addr().await.unwrap();

    send(addr, "START").await;
    wait_for_state(&handle, SessionState::Capturing).await;

    let err = assert_err!(handle.wait().await);
    assert_eq!(err.kind(), SessionErrorKind::Timeout);
}

#[tokio::test]
async fn test_timeout_with_data_fails_when_auto_stop_disabled() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["hello"]));
    config.timeout_seconds = 2;
    config.auto_stop_after_timeout = false;
    let handle = spawn_session(config);
    let addr = handle.local_addr().await.unwrap();

    start_capture(&handle, addr).await;
    send(addr, "hello").await;

    let err = assert_err!(handle.wait().await);
    assert_eq!(err.kind(), SessionErrorKind::Timeout);
}

#[tokio::test]
async fn test_disabled_signals_with_data_auto_stop() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["hello"]));
    config.start_signal = None;
    config.stop_signal = None;
    config.timeout_seconds = 1;
    let observer = Arc::new(RecordingObserver::default());
    let handle = run_session(config, observer.clone());
    let states = handle.subscribe();
    let addr = handle.local_addr().await.unwrap();

    for payload in ["START", "hello", "STOP"] {
        send(addr, payload).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*states.borrow(), SessionState::AwaitingStart);

    let report = assert_ok!(handle.wait().await);
    assert_eq!(report.end, SessionEnd::AutoStop);
    assert!(report.records.is_empty());
    assert_eq!(report.capture_file, None);
    assert_eq!(*states.borrow(), SessionState::Completed);
    observer.assert_success_once();
    // no capture was ever started
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test]
async fn test_disabled_signals_without_auto_stop_time_out() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["hello"]));
    config.start_signal = None;
    config.stop_signal = None;
    config.timeout_seconds = 1;
    config.auto_stop_after_timeout = false;
    let handle = spawn_session(config);
    let addr = handle.local_addr().await.unwrap();

    send(addr, "hello").await;

    let err = assert_err!(handle.wait().await);
    assert_eq!(err.kind(), SessionErrorKind::Timeout);
}

#[tokio::test]
async fn test_data_before_start_auto_stops_without_capture() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["hello"]));
    config.timeout_seconds = 1;
    let handle = spawn_session(config);
    let addr = handle.local_addr().await.unwrap();

    send(addr, "hello").await;

    let report = assert_ok!(handle.wait().await);
    assert_eq!(report.end, SessionEnd::AutoStop);
    assert!(report.records.is_empty());
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test]
async fn test_stop_before_start_is_ignored() {
    let dir = TempDir::new().unwrap();
    let handle = spawn_session(config(&dir, writes_on_term(&["hello"])));
    let addr = handle.local_addr().await.unwrap();

    send(addr, "STOP").await;
    send(addr, "hello").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.state(), SessionState::AwaitingStart);

    start_capture(&handle, addr).await;
    send(addr, "STOP").await;
    let report = assert_ok!(handle.wait().await);
    assert_eq!(
        report.records,
        vec!["Start Signal: START", "hello", "Stop Signal: STOP"]
    );
}

#[tokio::test]
async fn test_cancel_while_awaiting_start() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["hello"]));
    config.timeout_seconds = 30;
    let observer = Arc::new(RecordingObserver::default());
    let handle = run_session(config, observer.clone());
    handle.local_addr().await.unwrap();

    handle.cancel();
    let err = tokio::time::timeout(Duration::from_secs(3), handle.wait())
        .await
        .expect("cancellation is prompt")
        .unwrap_err();
    assert_eq!(err.kind(), SessionErrorKind::Cancelled);
    observer.assert_error_once();
}

#[tokio::test]
async fn test_cancel_while_capturing_kills_the_tool() {
    let dir = TempDir::new().unwrap();
    let command = vec![
        "sh".to_string(),
        "-c".to_string(),
        "trap '' TERM; exec sleep 30".to_string(),
        "{output}".to_string(),
    ];
    let mut config = config(&dir, command);
    config.timeout_seconds = 30;
    let handle = spawn_session(config);
    let addr = handle.local_addr().await.unwrap();

    start_capture(&handle, addr).await;
    handle.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("cancellation is prompt")
        .unwrap_err();
    assert!(matches!(err, SessionError::Cancelled));
}

#[tokio::test]
async fn test_cancel_while_waiting_for_exit() {
    let dir = TempDir::new().unwrap();
    let command = vec![
        "sh".to_string(),
        "-c".to_string(),
        "trap '' TERM; exec sleep 30".to_string(),
        "{output}".to_string(),
    ];
    let mut config = config(&dir, command);
    config.timeout_seconds = 30;
    config.capture.exit_timeout_ms = 20_000;
    let handle = spawn_session(config);
    let addr = handle.local_addr().await.unwrap();

    start_capture(&handle, addr).await;
    send(addr, "STOP").await;
    wait_for_state(&handle, SessionState::Stopping).await;
    handle.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("cancellation interrupts wait-for-exit")
        .unwrap_err();
    assert_eq!(err.kind(), SessionErrorKind::Cancelled);
}

#[tokio::test]
async fn test_huge_timeout_runs_until_cancelled() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["hello"]));
    config.timeout_seconds = u64::MAX;
    let observer = Arc::new(RecordingObserver::default());
    let handle = run_session(config, observer.clone());
    let addr = handle.local_addr().await.unwrap();

    send(addr, "hello").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.state(), SessionState::AwaitingStart);

    handle.cancel();
    let err = tokio::time::timeout(Duration::from_secs(3), handle.wait())
        .await
        .expect("cancellation is prompt")
        .unwrap_err();
    assert_eq!(err.kind(), SessionErrorKind::Cancelled);
    observer.assert_error_once();
}

#[tokio::test]
async fn test_unvalidated_config_is_rejected_once() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["hello"]));
    config.capture.poll_interval_ms = 0;
    let observer = Arc::new(RecordingObserver::default());
    let handle = run_session(config, observer.clone());

    assert_eq!(handle.local_addr().await, None);
    let err = assert_err!(handle.wait().await);
    assert!(matches!(err, SessionError::Config(_)));
    assert_eq!(err.kind(), SessionErrorKind::Config);
    observer.assert_error_once();
}

#[tokio::test]
async fn test_spawn_failure_is_reported_once() {
    let dir = TempDir::new().unwrap();
    let command = vec![
        "/nonexistent/sigcap-capture-tool".to_string(),
        "{output}".to_string(),
    ];
    let observer = Arc::new(RecordingObserver::default());
    let handle = run_session(config(&dir, command), observer.clone());
    let addr = handle.local_addr().await.unwrap();

    send(addr, "START").await;
    let err = assert_err!(handle.wait().await);
    assert_eq!(err.kind(), SessionErrorKind::Spawn);
    observer.assert_error_once();
}

#[tokio::test]
async fn test_bind_failure_is_reported_once() {
    let dir = TempDir::new().unwrap();
    let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut config = config(&dir, writes_on_term(&["hello"]));
    config.port = taken.local_addr().unwrap().port();
    let observer = Arc::new(RecordingObserver::default());
    let handle = run_session(config, observer.clone());

    assert_eq!(handle.local_addr().await, None);
    let err = assert_err!(handle.wait().await);
    assert_eq!(err.kind(), SessionErrorKind::Bind);
    observer.assert_error_once();
}

#[tokio::test]
async fn test_malformed_capture_fails_decode() {
    let dir = TempDir::new().unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let handle = run_session(
        config(&dir, writes_raw_on_term("68656c6c6f 6zz9")),
        observer.clone(),
    );
    let addr = handle.local_addr().await.unwrap();

    start_capture(&handle, addr).await;
    send(addr, "STOP").await;

    let err = assert_err!(handle.wait().await);
    assert_eq!(err.kind(), SessionErrorKind::Decode);
    observer.assert_error_once();
}

#[tokio::test]
async fn test_pcap_output_goes_through_export() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["hello", "world"]));
    config.capture.output_format = OutputFormat::Pcap;
    config.capture.export_command = Some(vec!["cat".to_string(), "{input}".to_string()]);
    config.capture.keep_capture_files = false;
    let handle = spawn_session(config);
    let addr = handle.local_addr().await.unwrap();

    start_capture(&handle, addr).await;
    send(addr, "STOP").await;

    let report = assert_ok!(handle.wait().await);
    assert_eq!(
        report.records,
        vec!["Start Signal: START", "hello", "world", "Stop Signal: STOP"]
    );
    assert_eq!(report.capture_file, None);
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test]
#[serial]
async fn test_default_port_scenario() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, writes_on_term(&["START", "hello", "STOP"]));
    config.port = 5005;
    let handle = spawn_session(config);
    let addr = handle.local_addr().await.unwrap();
    assert_eq!(addr.port(), 5005);

    start_capture(&handle, addr).await;
    send(addr, "hello").await;
    send(addr, "STOP").await;

    let report = assert_ok!(handle.wait().await);
    assert_eq!(
        report.records,
        vec!["Start Signal: START", "hello", "Stop Signal: STOP"]
    );
}
