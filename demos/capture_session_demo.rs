use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use env_logger::Env;
use log::info;
use sigcap::configuration::{CaptureSettings, OutputFormat, SessionConfig};
use sigcap::session_management::run_session;
use sigcap::storage::{FileStorage, RecordStorage, StorageObserver};
use tokio::net::UdpSocket;

#[tokio::main]
async fn main() {
    // Initialize logger (RUST_LOG can override; default to info)
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();

    let out_dir: PathBuf = env::var("SIGCAP_DEMO_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            env::current_dir()
                .expect("cwd")
                .join("target")
                .join("capture_demo")
        });

    // A shell script stands in for tshark: on SIGTERM it writes what a real
    // capture of this exchange would export, one hex payload per line.
    let lines: Vec<String> = ["START", "hello", "world", "STOP"]
        .iter()
        .map(hex::encode)
        .collect();
    let script = format!(
        r#"trap "printf '%s\n' {} > \"$0\"; exit 0" TERM; while :; do sleep 0.05; done"#,
        lines.join(" ")
    );

    let config = SessionConfig {
        port: 0,
        start_signal: Some("START".into()),
        stop_signal: Some("STOP".into()),
        timeout_seconds: 10,
        include_signals_in_message: true,
        verbose: true,
        capture: CaptureSettings {
            command: Some(vec!["sh".into(), "-c".into(), script, "{output}".into()]),
            output_format: OutputFormat::Hex,
            output_dir: out_dir.join("captures-raw"),
            ..CaptureSettings::default()
        },
        ..SessionConfig::default()
    };

    let storage: Arc<dyn RecordStorage> =
        Arc::new(FileStorage::new(&out_dir).expect("create storage"));
    let handle = run_session(
        config,
        StorageObserver::new(storage.clone(), "127.0.0.1"),
    );
    let addr = handle.local_addr().await.expect("signal channel bound");
    info!("Session {} listening on {}", handle.id(), addr);

    let sender = UdpSocket::bind("127.0.0.1:0").await.expect("bind sender");
    sender.send_to(b"START\n", addr).await.expect("send start");
    tokio::time::sleep(Duration::from_millis(500)).await;
    for payload in ["hello", "world", "STOP"] {
        sender.send_to(payload.as_bytes(), addr).await.expect("send");
    }

    match handle.wait().await {
        Ok(report) => {
            println!("Session {} ended by {:?}:", report.session_id, report.end);
            for record in &report.records {
                println!("  {}", record);
            }
            let stored = storage
                .get_capture(report.session_id)
                .expect("capture persisted");
            println!("Persisted {} record(s) at {}", stored.report.records.len(), stored.saved_at);
        }
        Err(e) => eprintln!("Session failed ({:?}): {}", e.kind(), e),
    }
}
