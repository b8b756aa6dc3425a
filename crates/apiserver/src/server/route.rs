//! Route descriptors and the immutable route table.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::Method;
use axum::response::Response;
use common::{ApiError, JSON_CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::context::RequestContext;
use super::json::{self, HandlerResult};

/// Future returned by a type-erased handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, ApiError>> + Send>>;

/// Type-erased handler: the shape every route takes once its typed business
/// handler has been adapted. Shared across all requests to the route.
pub type BoxedHandler = Arc<dyn Fn(RequestContext, Request) -> HandlerFuture + Send + Sync>;

/// A declared `(method, path, content type) → handler` binding.
///
/// A route declared without a handler is kept in the table but never
/// registered with the router.
#[derive(Clone)]
pub struct Route {
    method: Method,
    path: String,
    content_type: &'static str,
    handler: Option<BoxedHandler>,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            content_type: JSON_CONTENT_TYPE,
            handler: None,
        }
    }

    /// Attach a business handler that takes a JSON request body.
    ///
    /// The handler receives the request's [`RequestContext`] and a freshly
    /// decoded input, and returns the status and output to encode. It must
    /// observe the context deadline for any blocking work it performs.
    pub fn json<I, O, F, Fut>(mut self, handler: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<O>> + Send + 'static,
    {
        self.handler = Some(json::json_handler(handler));
        self
    }

    /// Attach a business handler that takes no request body.
    pub fn json_output<O, F, Fut>(mut self, handler: F) -> Self
    where
        O: Serialize + Send + 'static,
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<O>> + Send + 'static,
    {
        self.handler = Some(json::output_handler(handler));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Value the request `Content-Type` header must contain.
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn handler(&self) -> Option<&BoxedHandler> {
        self.handler.as_ref()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("content_type", &self.content_type)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Ordered, immutable set of routes declared at startup.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Arc<[Route]>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes: routes.into(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl FromIterator<Route> for RouteTable {
    fn from_iter<T: IntoIterator<Item = Route>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
