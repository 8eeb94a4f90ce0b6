//! Deterministic replay of recorded sessions.
//!
//! Entries are bucketed by `"METHOD URL"` using the exact recorded URL,
//! query string included. Each bucket serves its entries in recorded order;
//! looping mode wraps the cursor, non-looping mode clamps on the last entry
//! and repeats it forever.

use crate::record::session::{decode_body, RecordingEntry, RecordingSession};
use crate::record::{is_hop_response_header, StartedServer};
use anyhow::Context;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub recording: PathBuf,
    pub host: String,
    pub port: u16,
    /// Wrap to the first entry after the last; otherwise clamp on the last.
    pub loop_replay: bool,
    /// Sleep each entry's recorded latency before responding.
    pub use_latency: bool,
}

struct Bucket {
    entries: Vec<RecordingEntry>,
    cursor: usize,
}

/// Session entries bucketed by method + URL, with per-bucket cursors.
pub struct ReplayIndex {
    buckets: Mutex<HashMap<String, Bucket>>,
    loop_replay: bool,
}

impl ReplayIndex {
    pub fn from_session(session: &RecordingSession, loop_replay: bool) -> Self {
        let mut buckets: HashMap<String, Bucket> = HashMap::new();
        for entry in &session.entries {
            let key = replay_key(&entry.request.method, &entry.request.url);
            buckets
                .entry(key)
                .or_insert_with(|| Bucket {
                    entries: Vec::new(),
                    cursor: 0,
                })
                .entries
                .push(entry.clone());
        }
        Self {
            buckets: Mutex::new(buckets),
            loop_replay,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// The entry at the bucket's cursor, advancing it for the next call.
    pub fn next(&self, key: &str) -> Option<RecordingEntry> {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.get_mut(key)?;
        if bucket.entries.is_empty() {
            return None;
        }

        let entry = bucket.entries[bucket.cursor].clone();
        bucket.cursor = if self.loop_replay {
            (bucket.cursor + 1) % bucket.entries.len()
        } else {
            (bucket.cursor + 1).min(bucket.entries.len() - 1)
        };
        Some(entry)
    }
}

pub fn replay_key(method: &str, url: &str) -> String {
    format!("{} {}", method.to_uppercase(), url)
}

struct ReplayContext {
    index: ReplayIndex,
    use_latency: bool,
}

pub async fn start_replay_server(options: ReplayOptions) -> Result<StartedServer, anyhow::Error> {
    let raw = std::fs::read_to_string(&options.recording).with_context(|| {
        format!("failed to read recording {}", options.recording.display())
    })?;
    let session: RecordingSession = serde_json::from_str(&raw).with_context(|| {
        format!("failed to parse recording {}", options.recording.display())
    })?;

    let index = ReplayIndex::from_session(&session, options.loop_replay);
    info!(
        "loaded {} entries across {} buckets from {}",
        session.entries.len(),
        index.bucket_count(),
        options.recording.display()
    );

    let ctx = Arc::new(ReplayContext {
        index,
        use_latency: options.use_latency,
    });

    let listener = TcpListener::bind((options.host.as_str(), options.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", options.host, options.port))?;
    let addr = listener.local_addr()?;
    info!("replay server listening on http://{}", addr);

    let handle = tokio::spawn(async move {
        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let ctx = Arc::clone(&ctx);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let ctx = Arc::clone(&ctx);
                    async move { replay_request(&ctx, req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("replay connection error from {}: {}", remote_addr, err);
                }
            });
        }
    });

    Ok(StartedServer::new(addr, handle))
}

async fn replay_request(
    ctx: &ReplayContext,
    req: hyper::Request<Incoming>,
) -> Result<hyper::Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let key = replay_key(method.as_str(), &url);

    let Some(entry) = ctx.index.next(&key) else {
        let body = json!({"error": "No recording for this request", "key": key});
        return Ok(hyper::Response::builder()
            .status(404)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap());
    };

    if ctx.use_latency && entry.response.latency_ms > 0 {
        tokio::time::sleep(Duration::from_millis(entry.response.latency_ms)).await;
    }

    let mut response = hyper::Response::builder().status(entry.response.status);
    for (name, value) in &entry.response.headers {
        if !is_hop_response_header(&name.to_lowercase()) {
            response = response.header(name.as_str(), value.as_str());
        }
    }

    let body = decode_body(entry.response.body.as_ref());
    let payload = if body.is_empty() || method == hyper::Method::HEAD {
        Bytes::new()
    } else {
        Bytes::from(body)
    };

    Ok(response
        .body(Full::new(payload))
        .unwrap_or_else(|_| {
            hyper::Response::builder()
                .status(500)
                .body(Full::new(Bytes::from_static(
                    b"{\"error\": \"Failed to rebuild recorded response\"}",
                )))
                .unwrap()
        }))
}
