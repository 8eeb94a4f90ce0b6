//! Loading and interrogation of dereferenced OpenAPI documents.
//!
//! The document is consumed as a plain JSON tree: `paths` maps template
//! paths to method maps, each operation carrying `responses` and an optional
//! `requestBody`. Reference resolution is the spec author's problem; `$ref`
//! nodes that survive are treated as empty schemas.

use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read spec file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse spec file {path}: {message}")]
    Parse { path: String, message: String },
}

/// HTTP methods an operation can be declared under.
///
/// A closed enum rather than a string: dispatch over methods is an
/// exhaustive match everywhere downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    /// Lowercase key as it appears in an OpenAPI path item.
    pub fn spec_key(self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Patch => "patch",
            HttpMethod::Delete => "delete",
            HttpMethod::Head => "head",
            HttpMethod::Options => "options",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub fn from_hyper(method: &hyper::Method) -> Option<Self> {
        match *method {
            hyper::Method::GET => Some(HttpMethod::Get),
            hyper::Method::POST => Some(HttpMethod::Post),
            hyper::Method::PUT => Some(HttpMethod::Put),
            hyper::Method::PATCH => Some(HttpMethod::Patch),
            hyper::Method::DELETE => Some(HttpMethod::Delete),
            hyper::Method::HEAD => Some(HttpMethod::Head),
            hyper::Method::OPTIONS => Some(HttpMethod::Options),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The response definition selected for an operation.
#[derive(Debug, Clone)]
pub struct ResponseSpec {
    pub status: u16,
    pub schema: Option<Value>,
    pub example: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct RequestBodySpec {
    pub schema: Option<Value>,
}

/// One (path, method) pair from the document.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub path: String,
    pub method: HttpMethod,
    /// The raw operation node, kept for per-status error lookups.
    pub operation: Value,
    pub response: Option<ResponseSpec>,
    pub request_body: Option<RequestBodySpec>,
}

/// Load a spec file into a JSON tree. YAML and JSON are both accepted;
/// `.json` files go through the JSON parser, everything else through YAML.
pub fn load_document(path: &Path) -> Result<Value, SpecError> {
    let display = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: display.clone(),
        source,
    })?;

    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&contents).map_err(|e| SpecError::Parse {
            path: display,
            message: e.to_string(),
        })
    } else {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(&contents).map_err(|e| SpecError::Parse {
                path: display,
                message: e.to_string(),
            })?;
        Ok(yaml_to_json(yaml))
    }
}

/// Convert YAML to a JSON tree. YAML allows non-string mapping keys
/// (unquoted `200:` response codes are the common case); those become their
/// string form.
fn yaml_to_json(yaml: serde_yaml::Value) -> Value {
    match yaml {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => serde_json::to_value(n).unwrap_or(Value::Null),
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = serde_json::Map::new();
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                out.insert(key, yaml_to_json(value));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

/// Enumerate every declared operation in document order.
pub fn list_operations(doc: &Value) -> Vec<OperationSpec> {
    let mut operations = Vec::new();
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return operations;
    };

    for (path, path_item) in paths {
        for method in HttpMethod::ALL {
            let Some(operation) = path_item.get(method.spec_key()) else {
                continue;
            };
            operations.push(OperationSpec {
                path: path.clone(),
                method,
                operation: operation.clone(),
                response: pick_response(operation),
                request_body: pick_request_body(operation),
            });
        }
    }
    operations
}

/// Sort rank for a response status key. `"default"` ranks above every
/// explicit code; anything non-numeric is discarded.
fn status_rank(key: &str) -> Option<u32> {
    if key == "default" {
        return Some(999);
    }
    key.parse::<u32>().ok()
}

/// Select the ONE response definition an operation's mock is built from.
///
/// Tie-break: lowest declared 2xx key wins; otherwise `default`; otherwise
/// the lowest remaining key. A chosen `default` reports status 200.
fn pick_response(operation: &Value) -> Option<ResponseSpec> {
    let responses = operation.get("responses").and_then(Value::as_object)?;

    let mut candidates: Vec<(&str, u32)> = responses
        .keys()
        .filter_map(|key| status_rank(key).map(|rank| (key.as_str(), rank)))
        .collect();
    candidates.sort_by_key(|(_, rank)| *rank);

    let chosen = candidates
        .iter()
        .find(|(key, _)| key.starts_with('2'))
        .or_else(|| candidates.iter().find(|(key, _)| *key == "default"))
        .or_else(|| candidates.first())
        .map(|(key, _)| *key)?;

    let (schema, example) = media_schema_and_example(responses.get(chosen)?);
    let status = if chosen == "default" {
        200
    } else {
        chosen.parse().unwrap_or(200)
    };

    Some(ResponseSpec {
        status,
        schema,
        example,
    })
}

fn pick_request_body(operation: &Value) -> Option<RequestBodySpec> {
    let request_body = operation.get("requestBody")?;
    let (schema, _) = media_schema_and_example(request_body);
    Some(RequestBodySpec { schema })
}

/// The response definition an operation declares for a specific status,
/// falling back to `default`. Used when a forced error status needs a body.
pub fn response_for_status(operation: &Value, status: u16) -> Option<ResponseSpec> {
    let responses = operation.get("responses").and_then(Value::as_object)?;
    let response = responses
        .get(&status.to_string())
        .or_else(|| responses.get("default"))?;

    let (schema, example) = media_schema_and_example(response);
    Some(ResponseSpec {
        status,
        schema,
        example,
    })
}

/// Pull `(schema, example)` out of a response or requestBody node:
/// `application/json` if declared, else the first media type.
fn media_schema_and_example(node: &Value) -> (Option<Value>, Option<Value>) {
    let Some(content) = node.get("content").and_then(Value::as_object) else {
        return (None, None);
    };
    let Some(media) = content
        .get("application/json")
        .or_else(|| content.values().next())
    else {
        return (None, None);
    };

    let schema = media.get("schema").cloned();
    let example = media
        .get("example")
        .cloned()
        .or_else(|| first_named_example(media.get("examples")));
    (schema, example)
}

/// First entry's `.value` in an OpenAPI `examples` map.
fn first_named_example(examples: Option<&Value>) -> Option<Value> {
    examples?
        .as_object()?
        .values()
        .next()?
        .get("value")
        .cloned()
}
