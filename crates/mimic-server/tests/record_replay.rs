//! Round-trip tests: record live traffic through the proxy, then replay it.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use mimic_server::record::session::RecordingSession;
use mimic_server::record::{start_recording_server, RecordOptions};
use mimic_server::replay::{start_replay_server, ReplayOptions};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;

/// A minimal live target: GET /ping returns a fixed body, POST /echo echos.
async fn start_target() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(|req: Request<Incoming>| async move {
                    let method = req.method().clone();
                    let path = req.uri().path().to_string();
                    let body = req
                        .into_body()
                        .collect()
                        .await
                        .map(|collected| collected.to_bytes())
                        .unwrap_or_default();

                    let response = if method == Method::GET && path.starts_with("/ping") {
                        Response::builder()
                            .header("content-type", "application/json")
                            .body(Full::new(Bytes::from_static(b"{\"ok\":true}")))
                            .unwrap()
                    } else if method == Method::POST && path.starts_with("/echo") {
                        let payload = if body.is_empty() {
                            Bytes::from_static(b"{}")
                        } else {
                            body
                        };
                        Response::builder()
                            .header("content-type", "application/json")
                            .body(Full::new(payload))
                            .unwrap()
                    } else {
                        Response::builder()
                            .status(404)
                            .body(Full::new(Bytes::new()))
                            .unwrap()
                    };
                    Ok::<_, Infallible>(response)
                });
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    (addr, handle)
}

/// Session persistence is asynchronous; poll until the expected entry count
/// lands on disk.
async fn wait_for_entries(path: &Path, count: usize) -> RecordingSession {
    for _ in 0..100 {
        if let Ok(raw) = std::fs::read_to_string(path) {
            if let Ok(session) = serde_json::from_str::<RecordingSession>(&raw) {
                if session.entries.len() >= count {
                    return session;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("session at {} never reached {} entries", path.display(), count);
}

#[tokio::test]
async fn record_then_replay_round_trip() {
    let (target_addr, target_handle) = start_target().await;
    let tmp = tempfile::tempdir().unwrap();
    let session_path = tmp.path().join("session.json");

    let recorder = start_recording_server(RecordOptions {
        target: format!("http://{target_addr}"),
        output: session_path.clone(),
        host: "127.0.0.1".to_string(),
        port: 0,
        include: None,
        status_filter: None,
    })
    .await
    .unwrap();

    let client = reqwest::Client::new();

    // Traffic through the proxy is served by the real target.
    let ping: Value = client
        .get(format!("{}/ping", recorder.base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ping, json!({"ok": true}));

    let echo: Value = client
        .post(format!("{}/echo", recorder.base_url()))
        .json(&json!({"message": "hello"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echo, json!({"message": "hello"}));

    let session = wait_for_entries(&session_path, 2).await;
    assert_eq!(session.entries.len(), 2);
    assert_eq!(session.entries[0].request.method, "GET");
    assert_eq!(session.entries[0].request.url, "/ping");
    assert_eq!(session.entries[1].request.method, "POST");

    recorder.shutdown();
    target_handle.abort();

    // Replay against the same request shapes reproduces status and body,
    // with no live target behind it.
    let replay = start_replay_server(ReplayOptions {
        recording: session_path.clone(),
        host: "127.0.0.1".to_string(),
        port: 0,
        loop_replay: true,
        use_latency: false,
    })
    .await
    .unwrap();

    let ping: Value = client
        .get(format!("{}/ping", replay.base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ping, json!({"ok": true}));

    let echo_response = client
        .post(format!("{}/echo", replay.base_url()))
        .json(&json!({"message": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(echo_response.status(), 200);
    let echo: Value = echo_response.json().await.unwrap();
    assert_eq!(echo, json!({"message": "hello"}));

    // Looping over a one-entry bucket keeps serving the same response.
    let ping_again: Value = client
        .get(format!("{}/ping", replay.base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ping_again, json!({"ok": true}));

    replay.shutdown();
}

#[tokio::test]
async fn replay_miss_echoes_lookup_key() {
    let tmp = tempfile::tempdir().unwrap();
    let session_path = tmp.path().join("empty.json");
    let session = RecordingSession::new("http://127.0.0.1:1");
    std::fs::write(&session_path, serde_json::to_vec_pretty(&session).unwrap()).unwrap();

    let replay = start_replay_server(ReplayOptions {
        recording: session_path,
        host: "127.0.0.1".to_string(),
        port: 0,
        loop_replay: false,
        use_latency: false,
    })
    .await
    .unwrap();

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/nothing?x=1", replay.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["key"], "GET /nothing?x=1");

    replay.shutdown();
}

#[tokio::test]
async fn include_filter_limits_recording() {
    let (target_addr, target_handle) = start_target().await;
    let tmp = tempfile::tempdir().unwrap();
    let session_path = tmp.path().join("filtered.json");

    let recorder = start_recording_server(RecordOptions {
        target: format!("http://{target_addr}"),
        output: session_path.clone(),
        host: "127.0.0.1".to_string(),
        port: 0,
        include: Some("/echo".to_string()),
        status_filter: None,
    })
    .await
    .unwrap();

    let client = reqwest::Client::new();
    client
        .get(format!("{}/ping", recorder.base_url()))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/echo", recorder.base_url()))
        .json(&json!({"kept": true}))
        .send()
        .await
        .unwrap();

    let session = wait_for_entries(&session_path, 1).await;
    // Give the writer a beat to flush anything else, then re-read.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let raw = std::fs::read_to_string(&session_path).unwrap();
    let session: RecordingSession =
        serde_json::from_str(&raw).unwrap_or_else(|_| session);
    assert_eq!(session.entries.len(), 1);
    assert_eq!(session.entries[0].request.url, "/echo");

    recorder.shutdown();
    target_handle.abort();
}

#[tokio::test]
async fn proxy_failure_is_502_and_unrecorded() {
    let tmp = tempfile::tempdir().unwrap();
    let session_path = tmp.path().join("dead.json");

    // Point at a port nothing listens on.
    let recorder = start_recording_server(RecordOptions {
        target: "http://127.0.0.1:9".to_string(),
        output: session_path.clone(),
        host: "127.0.0.1".to_string(),
        port: 0,
        include: None,
        status_filter: None,
    })
    .await
    .unwrap();

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/ping", recorder.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Proxy request failed");

    // Nothing was persisted.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!session_path.exists());

    recorder.shutdown();
}
