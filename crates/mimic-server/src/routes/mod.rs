//! Route compiler: OpenAPI operations to mock route metadata.
//!
//! Every (path, method) pair becomes one `RouteMeta`. The template path is
//! classified as a collection route (`/users`) or an item route
//! (`/users/{id}`): an item route is one whose final segment is a template
//! parameter, and its `collection_path` is shared with the sibling
//! collection operations so item handlers can find their family's state.

use crate::spec::{self, HttpMethod, OperationSpec};
use serde_json::Value;

/// Compiled metadata for one operation. Immutable after compilation.
#[derive(Debug, Clone)]
pub struct RouteMeta {
    pub method: HttpMethod,
    /// OpenAPI template path, e.g. `/users/{id}`.
    pub path: String,
    /// True iff the last segment is a template parameter.
    pub is_item: bool,
    /// Path addressing the resource family. Invariant: equals `path` for
    /// collection routes, `path` minus the trailing parameter for item
    /// routes.
    pub collection_path: String,
    /// Name of the trailing parameter. Invariant: set iff `is_item`.
    pub id_param: Option<String>,
    pub response_schema: Option<Value>,
    pub response_example: Option<Value>,
    pub request_schema: Option<Value>,
    pub default_status: u16,
    /// Raw operation node, kept for per-status error-response lookups.
    pub operation: Value,
}

impl RouteMeta {
    /// `"GET /users/{id}"` — the identity used for reload diffing.
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

struct ParsedPath {
    is_item: bool,
    collection_path: String,
    id_param: Option<String>,
}

fn template_param(segment: &str) -> Option<&str> {
    let name = segment.strip_prefix('{')?.strip_suffix('}')?;
    (!name.is_empty()).then_some(name)
}

fn parse_path(path: &str) -> ParsedPath {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let id_param = segments
        .last()
        .and_then(|segment| template_param(segment))
        .map(String::from);

    let kept = if id_param.is_some() {
        &segments[..segments.len() - 1]
    } else {
        &segments[..]
    };

    ParsedPath {
        is_item: id_param.is_some(),
        collection_path: format!("/{}", kept.join("/")),
        id_param,
    }
}

fn default_status_for(method: HttpMethod) -> u16 {
    match method {
        HttpMethod::Post => 201,
        HttpMethod::Delete => 204,
        _ => 200,
    }
}

fn compile_operation(op: OperationSpec) -> RouteMeta {
    let parsed = parse_path(&op.path);
    let default_status = op
        .response
        .as_ref()
        .map(|r| r.status)
        .unwrap_or_else(|| default_status_for(op.method));

    let (response_schema, response_example) = match op.response {
        Some(response) => (response.schema, response.example),
        None => (None, None),
    };

    RouteMeta {
        method: op.method,
        path: op.path,
        is_item: parsed.is_item,
        collection_path: parsed.collection_path,
        id_param: parsed.id_param,
        response_schema,
        response_example,
        request_schema: op.request_body.and_then(|body| body.schema),
        default_status,
        operation: op.operation,
    }
}

/// Compile every declared operation, in document order.
pub fn compile_routes(doc: &Value) -> Vec<RouteMeta> {
    spec::list_operations(doc)
        .into_iter()
        .map(compile_operation)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_route() {
        let parsed = parse_path("/users");
        assert!(!parsed.is_item);
        assert_eq!(parsed.collection_path, "/users");
        assert!(parsed.id_param.is_none());
    }

    #[test]
    fn test_item_route() {
        let parsed = parse_path("/users/{id}");
        assert!(parsed.is_item);
        assert_eq!(parsed.collection_path, "/users");
        assert_eq!(parsed.id_param.as_deref(), Some("id"));
    }

    #[test]
    fn test_nested_item_route() {
        let parsed = parse_path("/users/{userId}/orders/{orderId}");
        assert!(parsed.is_item);
        assert_eq!(parsed.collection_path, "/users/{userId}/orders");
        assert_eq!(parsed.id_param.as_deref(), Some("orderId"));
    }

    #[test]
    fn test_non_terminal_parameter_is_collection() {
        let parsed = parse_path("/users/{userId}/orders");
        assert!(!parsed.is_item);
        assert_eq!(parsed.collection_path, "/users/{userId}/orders");
        assert!(parsed.id_param.is_none());
    }

    #[test]
    fn test_root_path() {
        let parsed = parse_path("/");
        assert!(!parsed.is_item);
        assert_eq!(parsed.collection_path, "/");
    }

    fn doc() -> Value {
        json!({
            "paths": {
                "/users": {
                    "get": {"responses": {"200": {}}},
                    "post": {"responses": {"201": {}}}
                },
                "/users/{id}": {
                    "get": {"responses": {"200": {}}},
                    "delete": {}
                }
            }
        })
    }

    #[test]
    fn test_compile_routes_shapes() {
        let routes = compile_routes(&doc());
        assert_eq!(routes.len(), 4);

        let get_collection = &routes[0];
        assert_eq!(get_collection.label(), "GET /users");
        assert!(!get_collection.is_item);
        assert_eq!(get_collection.default_status, 200);

        let get_item = &routes[2];
        assert_eq!(get_item.label(), "GET /users/{id}");
        assert!(get_item.is_item);
        assert_eq!(get_item.collection_path, "/users");
        assert_eq!(get_item.id_param.as_deref(), Some("id"));
    }

    #[test]
    fn test_default_statuses_without_declared_responses() {
        let doc = json!({
            "paths": {
                "/things": {
                    "post": {},
                    "get": {}
                },
                "/things/{id}": {
                    "delete": {}
                }
            }
        });
        let routes = compile_routes(&doc);
        let by_label = |label: &str| {
            routes
                .iter()
                .find(|r| r.label() == label)
                .unwrap()
                .default_status
        };
        assert_eq!(by_label("POST /things"), 201);
        assert_eq!(by_label("GET /things"), 200);
        assert_eq!(by_label("DELETE /things/{id}"), 204);
    }

    #[test]
    fn test_declared_status_wins_over_method_default() {
        let doc = json!({
            "paths": {
                "/jobs": {
                    "post": {"responses": {"202": {}}}
                }
            }
        });
        let routes = compile_routes(&doc);
        assert_eq!(routes[0].default_status, 202);
    }
}
