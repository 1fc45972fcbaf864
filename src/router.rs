//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Middleware registered on
//! the router runs in registration order before the matched handler.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::context::Context;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// A middleware plus the path prefix it is limited to.
struct Layer {
    prefix: Option<String>,
    middleware: BoxedMiddleware,
}

impl Layer {
    fn applies_to(&self, path: &str) -> bool {
        self.prefix.as_deref().is_none_or(|p| path.starts_with(p))
    }
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every registration returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    layers: Vec<Layer>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), layers: Vec::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `c.req().param("name")` retrieves them.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    /// Run `middleware` for every matched request.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Layer { prefix: None, middleware: Arc::new(middleware) });
        self
    }

    /// Run `middleware` only for request paths starting with `prefix`.
    pub fn with_at(mut self, prefix: &str, middleware: impl Middleware) -> Self {
        self.layers.push(Layer { prefix: Some(prefix.to_owned()), middleware: Arc::new(middleware) });
        self
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Routes one request through the middleware chain to its handler.
    ///
    /// Used by the server for every request; also handy for driving the
    /// application in-process.
    pub async fn handle(&self, req: http::Request<Bytes>) -> Response {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_owned();

        let Some((handler, params)) = self.lookup(&parts.method, &path) else {
            debug!(method = %parts.method, %path, "no route");
            return Response::status(StatusCode::NOT_FOUND);
        };

        let chain: Arc<[BoxedMiddleware]> = self.layers.iter()
            .filter(|layer| layer.applies_to(&path))
            .map(|layer| Arc::clone(&layer.middleware))
            .collect();

        let c = Context::new(Request::new(parts, body, params));
        Next::new(chain, handler).run(c).await
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
