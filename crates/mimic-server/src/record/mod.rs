//! Pass-through recording proxy.
//!
//! Every request is forwarded to the configured target and the upstream
//! response returned verbatim; recording is a side effect. Entries passing
//! the include and status filters are appended to the session, which a
//! single writer task rewrites to disk on every append so concurrent
//! requests can never interleave partial writes.

pub mod session;

use anyhow::Context;
use chrono::Utc;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::json;
use session::{
    encode_body, IncludeFilter, RecordedRequest, RecordedResponse, RecordingEntry,
    RecordingSession,
};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RecordOptions {
    /// Upstream base URL, e.g. `http://127.0.0.1:9000`.
    pub target: String,
    /// Session file path (`.json`), or a directory for a timestamped file.
    pub output: PathBuf,
    pub host: String,
    pub port: u16,
    /// Substring or `/.../` regex over the request path.
    pub include: Option<String>,
    /// Only record responses with these statuses.
    pub status_filter: Option<Vec<u16>>,
}

type HttpClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

fn create_upstream_client() -> HttpClient {
    let mut http_connector = HttpConnector::new();
    http_connector.enforce_http(false);

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .expect("failed to load native root certificates")
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    Client::builder(TokioExecutor::new()).build(https_connector)
}

/// A spawned record or replay server. Dropping the handle does not stop it;
/// call `shutdown` (tests) or `wait` (CLI).
pub struct StartedServer {
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<Result<(), anyhow::Error>>,
}

impl StartedServer {
    pub(crate) fn new(
        addr: SocketAddr,
        handle: tokio::task::JoinHandle<Result<(), anyhow::Error>>,
    ) -> Self {
        Self { addr, handle }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Block until the server task exits (it normally never does).
    pub async fn wait(self) -> Result<(), anyhow::Error> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(anyhow::anyhow!("server task panicked: {e}")),
        }
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

/// Hands entries to the single writer task. Send order is write order.
#[derive(Clone)]
struct SessionWriter {
    tx: mpsc::UnboundedSender<RecordingEntry>,
}

impl SessionWriter {
    fn spawn(session: RecordingSession, path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<RecordingEntry>();
        tokio::spawn(async move {
            let mut session = session;
            while let Some(entry) = rx.recv().await {
                session.entries.push(entry);
                match serde_json::to_vec_pretty(&session) {
                    Ok(contents) => {
                        if let Err(e) = tokio::fs::write(&path, contents).await {
                            error!("failed to persist session to {}: {}", path.display(), e);
                        }
                    }
                    Err(e) => error!("failed to serialize session: {}", e),
                }
            }
        });
        Self { tx }
    }

    fn append(&self, entry: RecordingEntry) {
        let _ = self.tx.send(entry);
    }
}

/// `.json` paths are used directly; anything else is a directory that gets
/// a timestamped session file.
fn resolve_output_path(output: &Path) -> Result<PathBuf, anyhow::Error> {
    if output.extension().and_then(|e| e.to_str()) == Some("json") {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        return Ok(output.to_path_buf());
    }

    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
    Ok(output.join(format!("recording-{stamp}.json")))
}

struct RecorderContext {
    client: HttpClient,
    target: String,
    include: IncludeFilter,
    status_filter: Option<Vec<u16>>,
    writer: SessionWriter,
}

pub async fn start_recording_server(options: RecordOptions) -> Result<StartedServer, anyhow::Error> {
    let output_path = resolve_output_path(&options.output)?;
    let include = IncludeFilter::parse(options.include.as_deref())?;
    let writer = SessionWriter::spawn(RecordingSession::new(&options.target), output_path.clone());

    let ctx = Arc::new(RecorderContext {
        client: create_upstream_client(),
        target: options.target.trim_end_matches('/').to_string(),
        include,
        status_filter: options.status_filter,
        writer,
    });

    let listener = TcpListener::bind((options.host.as_str(), options.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", options.host, options.port))?;
    let addr = listener.local_addr()?;

    info!("recording proxy listening on http://{}", addr);
    info!("target: {}", options.target);
    info!("output: {}", output_path.display());

    let handle = tokio::spawn(async move {
        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let ctx = Arc::clone(&ctx);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let ctx = Arc::clone(&ctx);
                    async move { proxy_and_record(&ctx, req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("recording proxy connection error from {}: {}", remote_addr, err);
                }
            });
        }
    });

    Ok(StartedServer::new(addr, handle))
}

/// Headers never forwarded to the upstream.
fn is_hop_request_header(name: &hyper::header::HeaderName) -> bool {
    matches!(name.as_str(), "host" | "content-length" | "connection")
}

/// Headers never copied back onto the proxied (or replayed) response; the
/// body is re-framed, so the old length/encoding would lie.
pub(crate) fn is_hop_response_header(name: &str) -> bool {
    matches!(name, "content-length" | "connection" | "transfer-encoding")
}

async fn proxy_and_record(
    ctx: &RecorderContext,
    req: hyper::Request<Incoming>,
) -> Result<hyper::Response<Full<Bytes>>, Infallible> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let original_url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let request_headers = req.headers().clone();

    let body_bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("failed to read proxied request body: {}", e);
            return Ok(proxy_error_response(&e.to_string()));
        }
    };

    let target_url = format!("{}{}", ctx.target, original_url);
    debug!("forwarding {} {} -> {}", method, original_url, target_url);

    let mut upstream_req = hyper::Request::builder()
        .method(method.clone())
        .uri(target_url);
    for (name, value) in request_headers.iter() {
        if !is_hop_request_header(name) {
            upstream_req = upstream_req.header(name, value);
        }
    }
    let send_body = method != hyper::Method::GET && method != hyper::Method::HEAD;
    let upstream_req = match upstream_req.body(Full::new(if send_body {
        body_bytes.clone()
    } else {
        Bytes::new()
    })) {
        Ok(req) => req,
        Err(e) => {
            error!("failed to build upstream request: {}", e);
            return Ok(proxy_error_response(&e.to_string()));
        }
    };

    let upstream_response = match ctx.client.request(upstream_req).await {
        Ok(response) => response,
        Err(e) => {
            // Failed upstream calls are never recorded.
            error!("upstream request failed: {}", e);
            return Ok(proxy_error_response(&e.to_string()));
        }
    };

    let status = upstream_response.status();
    let (parts, body) = upstream_response.into_parts();
    let response_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("failed to read upstream response body: {}", e);
            return Ok(proxy_error_response(&e.to_string()));
        }
    };
    let latency_ms = start.elapsed().as_millis() as u64;

    let mut response = hyper::Response::builder().status(status);
    for (name, value) in parts.headers.iter() {
        if !is_hop_response_header(name.as_str()) {
            response = response.header(name, value);
        }
    }
    let response = response
        .body(Full::new(response_bytes.clone()))
        .unwrap_or_else(|_| proxy_error_response("failed to rebuild upstream response"));

    let should_record = ctx.include.matches(&path)
        && ctx
            .status_filter
            .as_ref()
            .map(|statuses| statuses.contains(&status.as_u16()))
            .unwrap_or(true);

    if should_record {
        ctx.writer.append(RecordingEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request: RecordedRequest {
                method: method.to_string(),
                url: original_url,
                headers: header_map(&request_headers),
                body: encode_body(&body_bytes),
            },
            response: RecordedResponse {
                status: status.as_u16(),
                headers: header_map(&parts.headers),
                body: encode_body(&response_bytes),
                latency_ms,
            },
        });
    }

    Ok(response)
}

fn header_map(headers: &hyper::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn proxy_error_response(message: &str) -> hyper::Response<Full<Bytes>> {
    let body = json!({"error": "Proxy request failed", "message": message});
    hyper::Response::builder()
        .status(502)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
