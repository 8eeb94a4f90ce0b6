//! Request dispatch engine.
//!
//! Per request: admin endpoints first, then route lookup, then fault
//! injection (forced status header, chaos draw, latency), then either an
//! error body, or stateful CRUD against the resource store, or stateless
//! generation. Every handled exchange is appended to the request log.

use crate::config::{ChaosConfig, Config, LatencyConfig};
use crate::datagen::DataGenerator;
use crate::request_log::{LogEntry, RequestLog, ResponseSummary};
use crate::routes::RouteMeta;
use crate::server::router::RouterHandle;
use crate::spec::{self, HttpMethod};
use crate::store::MockStore;
use chrono::Utc;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{HeaderMap, Request, Response, StatusCode};
use rand::Rng;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

pub const STATUS_OVERRIDE_HEADER: &str = "x-mock-status";
pub const DELAY_OVERRIDE_HEADER: &str = "x-mock-delay";

/// Everything a request needs, constructor-injected by the server.
pub struct HandlerContext {
    pub config: Arc<Config>,
    pub router: Arc<RouterHandle>,
    pub store: Arc<MockStore>,
    pub log: Arc<RequestLog>,
    pub datagen: Arc<DataGenerator>,
}

pub async fn handle_request(
    ctx: &HandlerContext,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(String::from);
    let headers = req.headers().clone();

    debug!("mock request: {} {}", method, path);

    if let Some(response) = handle_admin(ctx, &method, &path) {
        return Ok(response);
    }

    let head_request = method == hyper::Method::HEAD;
    let Some(kind) = HttpMethod::from_hyper(&method) else {
        return Ok(not_found_route(&method, &path));
    };

    let router = ctx.router.current();
    // HEAD falls back to the GET route, mirroring what a conventional HTTP
    // framework registers implicitly.
    let matched = router.find(kind, &path).or_else(|| {
        (kind == HttpMethod::Head)
            .then(|| router.find(HttpMethod::Get, &path))
            .flatten()
    });

    let Some(matched) = matched else {
        if kind == HttpMethod::Options {
            return Ok(preflight_response());
        }
        return Ok(not_found_route(&method, &path));
    };
    let route = matched.route;
    let params = matched.params;

    let body_bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("failed to read request body: {}", e);
            return Ok(json_response(
                500,
                &json!({"error": "Failed to read request body"}),
            ));
        }
    };
    let payload = parse_json_body(&body_bytes);

    let header_status: Option<u16> = header_number(&headers, STATUS_OVERRIDE_HEADER);
    let header_delay: u64 = header_number(&headers, DELAY_OVERRIDE_HEADER).unwrap_or(0);
    let status_override = header_status.or_else(|| draw_chaos(&ctx.config.chaos));

    let delay_ms = base_delay(&ctx.config.latency) + header_delay;
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    let (status, body) = match status_override {
        // Error simulation takes priority over data state: the store is
        // never consulted, even for item routes that would 404.
        Some(forced) if forced >= 400 => (forced, Some(error_body(ctx, route, forced))),
        _ => {
            let (status, body) = dispatch_success(
                &ctx.config,
                &ctx.store,
                &ctx.datagen,
                route,
                &params,
                payload.as_ref(),
            );
            (status_override.unwrap_or(status), body)
        }
    };

    let latency_ms = start.elapsed().as_millis() as u64;
    ctx.log.append(LogEntry {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        method: method.to_string(),
        path,
        query,
        headers: header_map(&headers),
        body: payload,
        response: ResponseSummary {
            status,
            body: body.clone().unwrap_or(Value::Null),
            latency_ms,
        },
    });

    if head_request || status == 204 {
        return Ok(empty_response(status));
    }
    Ok(match body {
        Some(body) => json_response(status, &body),
        None => empty_response(status),
    })
}

/// Built-in endpoints registered ahead of the compiled routes.
fn handle_admin(
    ctx: &HandlerContext,
    method: &hyper::Method,
    path: &str,
) -> Option<Response<Full<Bytes>>> {
    let endpoints = &ctx.config.endpoints;
    match (method, path) {
        (&hyper::Method::GET, p) if p == endpoints.health => Some(json_response(
            200,
            &json!({"status": "ok", "timestamp": Utc::now().to_rfc3339()}),
        )),
        (&hyper::Method::POST, p) if p == endpoints.reset => {
            ctx.store.reset();
            ctx.log.clear();
            Some(empty_response(204))
        }
        (&hyper::Method::GET, p) if p == endpoints.logs => {
            let logs = serde_json::to_value(ctx.log.list()).unwrap_or(Value::Null);
            Some(json_response(200, &json!({"logs": logs})))
        }
        (&hyper::Method::GET, p) if p == endpoints.state => {
            Some(json_response(200, &json!({"state": ctx.store.snapshot()})))
        }
        _ => None,
    }
}

/// Body for a forced error status: the operation's own declared response
/// for that status if any, else a generic error object.
fn error_body(ctx: &HandlerContext, route: &RouteMeta, status: u16) -> Value {
    match spec::response_for_status(&route.operation, status) {
        Some(response) => {
            if let Some(example) = response.example {
                example
            } else if let Some(schema) = response.schema {
                ctx.datagen.generate(Some(&schema), None)
            } else {
                json!({"error": "Mock error", "status": status})
            }
        }
        None => json!({"error": "Mock error", "status": status}),
    }
}

/// Stateful/stateless dispatch. Returns `(status, body)`; a `None` body is
/// written as an empty response.
pub(crate) fn dispatch_success(
    config: &Config,
    store: &MockStore,
    datagen: &DataGenerator,
    route: &RouteMeta,
    params: &HashMap<String, String>,
    payload: Option<&Value>,
) -> (u16, Option<Value>) {
    let default_status = route.default_status;

    // Item routes need their id regardless of mode.
    let id = if route.is_item {
        let captured = route
            .id_param
            .as_ref()
            .and_then(|name| params.get(name))
            .filter(|value| !value.is_empty());
        match captured {
            Some(id) => Some(id.clone()),
            None => {
                return (
                    400,
                    Some(json!({"error": "Missing path parameter for resource id."})),
                )
            }
        }
    } else {
        None
    };

    if !config.stateful {
        return (default_status, Some(generate_body(route, datagen)));
    }

    let collection = route.collection_path.as_str();
    let id_param = route.id_param.as_deref();

    if let Some(id) = id {
        let existing = store.get(collection, &id);
        return match route.method {
            HttpMethod::Get => match existing {
                Some(resource) => (default_status, Some(resource)),
                None => (404, Some(not_found_body(&id))),
            },
            HttpMethod::Put => {
                // Upsert: the body replaces whatever was stored.
                let mut resource = object_payload(payload);
                ensure_id(&mut resource, id_param, Some(&id));
                let resource = Value::Object(resource);
                store.insert(collection, &id, resource.clone());
                (default_status, Some(resource))
            }
            HttpMethod::Patch => match existing {
                Some(current) => {
                    let mut merged = current.as_object().cloned().unwrap_or_default();
                    for (key, value) in object_payload(payload) {
                        merged.insert(key, value);
                    }
                    ensure_id(&mut merged, id_param, Some(&id));
                    let merged = Value::Object(merged);
                    store.insert(collection, &id, merged.clone());
                    (default_status, Some(merged))
                }
                None => (404, Some(not_found_body(&id))),
            },
            HttpMethod::Delete => {
                // Idempotent: the store-level result is deliberately ignored.
                let _ = store.delete(collection, &id);
                (default_status, None)
            }
            _ => match existing {
                Some(_) => (default_status, Some(generate_body(route, datagen))),
                None => (404, Some(not_found_body(&id))),
            },
        };
    }

    match route.method {
        HttpMethod::Get => (default_status, Some(Value::Array(store.list(collection)))),
        HttpMethod::Post => {
            let resource = match payload.and_then(Value::as_object) {
                Some(body) if !body.is_empty() => Value::Object(body.clone()),
                _ => generate_body(route, datagen),
            };
            let mut resource = match resource {
                Value::Object(map) => map,
                // Generated something non-object; serve it without persisting.
                other => return (default_status, Some(other)),
            };
            let id = ensure_id(&mut resource, id_param, None);
            let resource = Value::Object(resource);
            store.insert(collection, &id, resource.clone());
            (default_status, Some(resource))
        }
        _ => (default_status, Some(generate_body(route, datagen))),
    }
}

/// Stateless body: declared example, else generation from the response
/// schema, else from the request schema.
fn generate_body(route: &RouteMeta, datagen: &DataGenerator) -> Value {
    if let Some(ref example) = route.response_example {
        return example.clone();
    }
    let schema = route
        .response_schema
        .as_ref()
        .or(route.request_schema.as_ref());
    datagen.generate(schema, None)
}

/// Resolve the id a resource is persisted under: the route's id parameter,
/// then `id`, `_id`, `uuid`; otherwise the provided path id or a fresh UUID,
/// written back under the id parameter's name (or `id`).
pub(crate) fn ensure_id(
    resource: &mut Map<String, Value>,
    id_param: Option<&str>,
    provided: Option<&str>,
) -> String {
    let mut keys: Vec<&str> = Vec::new();
    if let Some(param) = id_param {
        keys.push(param);
    }
    keys.extend(["id", "_id", "uuid"]);

    for key in keys {
        match resource.get(key) {
            Some(Value::Null) | None => {}
            Some(value) => return id_value_to_string(value),
        }
    }

    let new_id = provided
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    resource.insert(
        id_param.unwrap_or("id").to_string(),
        Value::String(new_id.clone()),
    );
    new_id
}

fn id_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn not_found_body(id: &str) -> Value {
    json!({"error": "Resource not found", "id": id})
}

fn object_payload(payload: Option<&Value>) -> Map<String, Value> {
    payload
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn parse_json_body(bytes: &Bytes) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes).ok()
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<T>()
        .ok()
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(key, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (key.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn draw_chaos(chaos: &ChaosConfig) -> Option<u16> {
    if !chaos.enabled || chaos.status_codes.is_empty() {
        return None;
    }
    let mut rng = rand::thread_rng();
    if rng.gen::<f64>() < chaos.failure_rate {
        let index = rng.gen_range(0..chaos.status_codes.len());
        Some(chaos.status_codes[index])
    } else {
        None
    }
}

fn base_delay(latency: &LatencyConfig) -> u64 {
    if latency.max_ms <= latency.min_ms {
        latency.min_ms
    } else {
        rand::thread_rng().gen_range(latency.min_ms..=latency.max_ms)
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn apply_cors<B>(response: &mut Response<B>) {
    let headers = response.headers_mut();
    headers.insert(
        "access-control-allow-origin",
        hyper::header::HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-methods",
        hyper::header::HeaderValue::from_static("GET,POST,PUT,PATCH,DELETE,HEAD,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        hyper::header::HeaderValue::from_static("*"),
    );
}

pub(crate) fn json_response(status: u16, body: &Value) -> Response<Full<Bytes>> {
    let payload = serde_json::to_vec(body).unwrap_or_else(|_| b"null".to_vec());
    let mut response = Response::builder()
        .status(status_code(status))
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(payload)))
        .unwrap();
    apply_cors(&mut response);
    response
}

pub(crate) fn empty_response(status: u16) -> Response<Full<Bytes>> {
    let mut response = Response::builder()
        .status(status_code(status))
        .body(Full::new(Bytes::new()))
        .unwrap();
    apply_cors(&mut response);
    response
}

fn preflight_response() -> Response<Full<Bytes>> {
    empty_response(204)
}

fn not_found_route(method: &hyper::Method, path: &str) -> Response<Full<Bytes>> {
    json_response(
        404,
        &json!({"error": format!("No mock route for {method} {path}")}),
    )
}
