//! Compiled route table and its hot-swap handle.
//!
//! A `CompiledRouter` is immutable once built: one `matchit` matcher per
//! HTTP method over the spec's template paths. Hot reload builds a whole new
//! router off the hot path and publishes it through `RouterHandle` with a
//! single reference swap, so in-flight requests keep the table they started
//! with.

use crate::routes::{self, RouteMeta};
use crate::spec::HttpMethod;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A matched route plus its captured path parameters.
pub struct RouteMatch<'r> {
    pub route: &'r RouteMeta,
    pub params: HashMap<String, String>,
}

pub struct CompiledRouter {
    routes: Vec<RouteMeta>,
    matchers: HashMap<HttpMethod, matchit::Router<usize>>,
}

impl CompiledRouter {
    /// Build the route table for a dereferenced spec document.
    pub fn compile(doc: &Value) -> Result<Self, anyhow::Error> {
        let routes = routes::compile_routes(doc);
        let mut matchers: HashMap<HttpMethod, matchit::Router<usize>> = HashMap::new();

        for (index, route) in routes.iter().enumerate() {
            matchers
                .entry(route.method)
                .or_default()
                .insert(route.path.as_str(), index)
                .map_err(|e| {
                    anyhow::anyhow!("conflicting route template {}: {e}", route.label())
                })?;
        }

        Ok(Self { routes, matchers })
    }

    pub fn find(&self, method: HttpMethod, path: &str) -> Option<RouteMatch<'_>> {
        let matcher = self.matchers.get(&method)?;
        let matched = matcher.at(path).ok()?;
        let params = matched
            .params
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Some(RouteMatch {
            route: &self.routes[*matched.value],
            params,
        })
    }

    /// `"METHOD /path"` labels of every compiled route, for reload diffing.
    pub fn labels(&self) -> HashSet<String> {
        self.routes.iter().map(RouteMeta::label).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Shared handle to the active router. Readers clone the `Arc`; a reload
/// replaces it wholesale.
pub struct RouterHandle {
    inner: RwLock<Arc<CompiledRouter>>,
}

impl RouterHandle {
    pub fn new(router: CompiledRouter) -> Self {
        Self {
            inner: RwLock::new(Arc::new(router)),
        }
    }

    pub fn current(&self) -> Arc<CompiledRouter> {
        Arc::clone(&self.inner.read())
    }

    pub fn swap(&self, next: CompiledRouter) {
        *self.inner.write() = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "paths": {
                "/users": {
                    "get": {"responses": {"200": {}}},
                    "post": {"responses": {"201": {}}}
                },
                "/users/{id}": {
                    "get": {"responses": {"200": {}}}
                }
            }
        })
    }

    #[test]
    fn test_find_collection_route() {
        let router = CompiledRouter::compile(&doc()).unwrap();
        let matched = router.find(HttpMethod::Get, "/users").unwrap();
        assert_eq!(matched.route.label(), "GET /users");
        assert!(matched.params.is_empty());
    }

    #[test]
    fn test_find_item_route_captures_param() {
        let router = CompiledRouter::compile(&doc()).unwrap();
        let matched = router.find(HttpMethod::Get, "/users/42").unwrap();
        assert_eq!(matched.route.label(), "GET /users/{id}");
        assert_eq!(matched.params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_method_mismatch_is_no_match() {
        let router = CompiledRouter::compile(&doc()).unwrap();
        assert!(router.find(HttpMethod::Delete, "/users").is_none());
        assert!(router.find(HttpMethod::Post, "/users/42").is_none());
    }

    #[test]
    fn test_labels() {
        let router = CompiledRouter::compile(&doc()).unwrap();
        let labels = router.labels();
        assert_eq!(labels.len(), 3);
        assert!(labels.contains("GET /users"));
        assert!(labels.contains("POST /users"));
        assert!(labels.contains("GET /users/{id}"));
    }

    #[test]
    fn test_handle_swap_publishes_new_router() {
        let handle = RouterHandle::new(CompiledRouter::compile(&doc()).unwrap());
        let before = handle.current();
        assert_eq!(before.len(), 3);

        let next_doc = json!({"paths": {"/ping": {"get": {"responses": {"200": {}}}}}});
        handle.swap(CompiledRouter::compile(&next_doc).unwrap());

        // Old reference still serves the old table; new reads see the swap.
        assert_eq!(before.len(), 3);
        assert_eq!(handle.current().len(), 1);
        assert!(handle.current().find(HttpMethod::Get, "/ping").is_some());
    }
}
