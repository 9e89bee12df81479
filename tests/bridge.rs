//! End-to-end control loop tests against a scripted emulator over a real
//! loopback socket.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;

use emu_agent::{
    BridgeError, BridgeListener, Button, ControlLoop, DecisionAdapter, DecisionEngine,
    DecisionRequest, DecisionResponse, MemoryStore, ProviderError,
};

/// Engine that always answers with a fixed button and notepad text.
struct FixedEngine {
    button: Button,
    notepad: String,
}

impl DecisionEngine for FixedEngine {
    async fn decide(&self, _request: &DecisionRequest) -> Result<DecisionResponse, ProviderError> {
        Ok(DecisionResponse {
            button: self.button,
            notepad: self.notepad.clone(),
            thinking: "scripted".to_string(),
            is_fallback: false,
        })
    }
}

fn spawn_loop(
    listener: BridgeListener,
    engine: FixedEngine,
    notepad_path: std::path::PathBuf,
    cooldown: Duration,
) -> (
    tokio::task::JoinHandle<Result<(), BridgeError>>,
    watch::Sender<bool>,
) {
    let memory = MemoryStore::open(notepad_path, 10);
    let adapter = DecisionAdapter::new(engine, 3, Duration::ZERO, Duration::from_secs(5));
    let control = ControlLoop::new(listener, adapter, memory, cooldown, 0);

    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(control.run(stop_rx));
    (handle, stop_tx)
}

fn write_test_png(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("frame.png");
    image::RgbaImage::new(160, 144).save(&path).unwrap();
    path
}

#[tokio::test]
async fn test_full_turn_over_loopback() {
    let dir = tempfile::tempdir().unwrap();
    let png_path = write_test_png(&dir);
    let notepad_path = dir.path().join("notepad.txt");

    let listener = BridgeListener::bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let engine = FixedEngine {
        button: Button::Up,
        notepad: "heading north".to_string(),
    };
    let (handle, _stop_tx) = spawn_loop(listener, engine, notepad_path.clone(), Duration::ZERO);

    // Scripted emulator side of one full turn.
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half.write_all(b"ready||true\n").await.unwrap();
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "request_screenshot"
    );

    let report = format!(
        "screenshot_with_state||{}||UP||12||7||4||0\n",
        png_path.display()
    );
    write_half.write_all(report.as_bytes()).await.unwrap();

    // The decision comes back as the bare wire code for UP.
    assert_eq!(lines.next_line().await.unwrap().unwrap(), "6");

    // Closing the connection with a zero reconnect budget ends the loop.
    drop(write_half);
    drop(lines);
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(BridgeError::ConnectionLost(0))));

    // The notepad replacement from the decision was persisted.
    assert_eq!(
        std::fs::read_to_string(&notepad_path).unwrap(),
        "heading north"
    );
}

#[tokio::test]
async fn test_disconnect_while_awaiting_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    let notepad_path = dir.path().join("notepad.txt");

    let listener = BridgeListener::bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let engine = FixedEngine {
        button: Button::A,
        notepad: String::new(),
    };
    let (handle, _stop_tx) = spawn_loop(listener, engine, notepad_path.clone(), Duration::ZERO);

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half.write_all(b"ready||true\n").await.unwrap();
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "request_screenshot"
    );

    // Vanish instead of answering the screenshot request.
    drop(write_half);
    drop(lines);
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(BridgeError::ConnectionLost(0))));

    // No decision was made; teardown flushed the untouched template.
    let persisted = std::fs::read_to_string(&notepad_path).unwrap();
    assert!(persisted.contains("## Current Objectives"));
}

#[tokio::test]
async fn test_malformed_report_skips_turn() {
    let dir = tempfile::tempdir().unwrap();
    let png_path = write_test_png(&dir);
    let notepad_path = dir.path().join("notepad.txt");

    let listener = BridgeListener::bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let engine = FixedEngine {
        button: Button::Start,
        notepad: "made it".to_string(),
    };
    let (handle, _stop_tx) = spawn_loop(listener, engine, notepad_path, Duration::ZERO);

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half.write_all(b"ready||true\n").await.unwrap();
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "request_screenshot"
    );

    // Truncated report: no decision should follow, the loop waits for the
    // next ready instead.
    write_half
        .write_all(b"screenshot_with_state||only||three\n")
        .await
        .unwrap();

    write_half.write_all(b"ready||true\n").await.unwrap();
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "request_screenshot"
    );

    let report = format!(
        "screenshot_with_state||{}||DOWN||3||9||0||1\n",
        png_path.display()
    );
    write_half.write_all(report.as_bytes()).await.unwrap();
    assert_eq!(lines.next_line().await.unwrap().unwrap(), "3");

    drop(write_half);
    drop(lines);
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(BridgeError::ConnectionLost(0))));
}

#[tokio::test]
async fn test_skipped_turn_still_spends_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let notepad_path = dir.path().join("notepad.txt");
    let cooldown = Duration::from_millis(200);

    let listener = BridgeListener::bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let engine = FixedEngine {
        button: Button::A,
        notepad: String::new(),
    };
    let (handle, _stop_tx) = spawn_loop(listener, engine, notepad_path, cooldown);

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half.write_all(b"ready||true\n").await.unwrap();
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "request_screenshot"
    );
    let first_request = std::time::Instant::now();

    // Malformed report then an immediate ready: the skipped turn must not
    // let the next screenshot request through before the cooldown.
    write_half
        .write_all(b"screenshot_with_state||only||three\n")
        .await
        .unwrap();
    write_half.write_all(b"ready||true\n").await.unwrap();

    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "request_screenshot"
    );
    assert!(
        first_request.elapsed() >= cooldown,
        "second request after only {:?}, cooldown is {:?}",
        first_request.elapsed(),
        cooldown
    );

    drop(write_half);
    drop(lines);
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(BridgeError::ConnectionLost(0))));
}

#[tokio::test]
async fn test_duplicate_ready_does_not_stack_requests() {
    let dir = tempfile::tempdir().unwrap();
    let png_path = write_test_png(&dir);
    let notepad_path = dir.path().join("notepad.txt");

    let listener = BridgeListener::bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let engine = FixedEngine {
        button: Button::Up,
        notepad: String::new(),
    };
    let (handle, _stop_tx) = spawn_loop(listener, engine, notepad_path, Duration::ZERO);

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half.write_all(b"ready||true\n").await.unwrap();
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "request_screenshot"
    );

    // A second ready while the request is outstanding must be ignored,
    // never answered with another request.
    write_half.write_all(b"ready||true\n").await.unwrap();
    let extra = tokio::time::timeout(Duration::from_millis(100), lines.next_line()).await;
    assert!(extra.is_err(), "unexpected extra line: {extra:?}");

    // The turn still completes normally once the report arrives.
    let report = format!(
        "screenshot_with_state||{}||UP||12||7||4||0\n",
        png_path.display()
    );
    write_half.write_all(report.as_bytes()).await.unwrap();
    assert_eq!(lines.next_line().await.unwrap().unwrap(), "6");

    drop(write_half);
    drop(lines);
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(BridgeError::ConnectionLost(0))));
}

#[tokio::test]
async fn test_stop_signal_while_waiting_for_connection() {
    let dir = tempfile::tempdir().unwrap();
    let notepad_path = dir.path().join("notepad.txt");

    let listener = BridgeListener::bind("127.0.0.1", 0).await.unwrap();
    let engine = FixedEngine {
        button: Button::A,
        notepad: String::new(),
    };
    let (handle, stop_tx) = spawn_loop(listener, engine, notepad_path, Duration::ZERO);

    stop_tx.send(true).unwrap();
    assert!(handle.await.unwrap().is_ok());
}
