//! Axum router construction from a [`RouteTable`].
//!
//! Each route with a handler is matched on exact path, exact method and a
//! `Content-Type` containing the route's media type. Every other request,
//! including a known path with an undeclared method (`HEAD` on a `GET`
//! route too), reaches the not-found handler. Routes and the not-found handler share the same [`ApiWrapper`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{header, HeaderMap, Method};
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;
use tower_http::timeout::RequestBodyTimeoutLayer;
use tracing::{debug, warn};

use super::context::RequestContext;
use super::error::RouteError;
use super::handlers;
use super::middleware::ApiWrapper;
use super::route::{BoxedHandler, HandlerFuture, RouteTable};
use crate::config::Config;

/// Values fixed at router construction and shared by every request.
#[derive(Debug, Clone, Copy)]
pub struct RouterSettings {
    /// Deadline given to each request.
    pub request_timeout: Duration,
    /// Longest wait for the next chunk of a request body.
    pub read_timeout: Duration,
    /// Largest request body a JSON route will buffer.
    pub max_body_bytes: usize,
}

impl From<&Config> for RouterSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            request_timeout: cfg.request_timeout(),
            read_timeout: cfg.read_timeout(),
            max_body_bytes: cfg.api_max_body_bytes,
        }
    }
}

/// Build the application [`Router`] for `routes`.
///
/// # Errors
///
/// Returns a [`RouteError`] for a path that is not absolute, a method the
/// router cannot match on, or a duplicate method and path.
pub fn build(routes: &RouteTable, settings: &RouterSettings) -> Result<Router, RouteError> {
    if routes.is_empty() {
        warn!("no routes declared; every request will be answered with 404");
    }
    let not_found = ApiWrapper::new(handlers::not_found(), settings.request_timeout);
    let mut seen = HashSet::new();
    let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();

    for route in routes.iter() {
        let Some(handler) = route.handler() else {
            debug!(method = %route.method(), path = route.path(), "route has no handler; skipping");
            continue;
        };
        if !route.path().starts_with('/') {
            return Err(RouteError::InvalidPath(route.path().to_owned()));
        }
        let filter = MethodFilter::try_from(route.method().clone()).map_err(|_| {
            RouteError::UnsupportedMethod {
                method: route.method().to_string(),
                path: route.path().to_owned(),
            }
        })?;
        if !seen.insert((route.method().clone(), route.path().to_owned())) {
            return Err(RouteError::Duplicate {
                method: route.method().to_string(),
                path: route.path().to_owned(),
            });
        }

        let guarded = exact_match(
            route.method().clone(),
            route.content_type(),
            handler.clone(),
            handlers::not_found(),
        );
        let wrapped = ApiWrapper::new(guarded, settings.request_timeout);
        let endpoint = move |req: Request| wrapped.clone().call(req);

        let method_router = match by_path.remove(route.path()) {
            Some(existing) => existing.on(filter, endpoint),
            None => on(filter, endpoint),
        };
        by_path.insert(route.path().to_owned(), method_router);
        debug!(method = %route.method(), path = route.path(), "route registered");
    }

    let mut router = Router::new();
    for (path, method_router) in by_path {
        let fallback = not_found.clone();
        router = router.route(
            &path,
            method_router.fallback(move |req: Request| fallback.clone().call(req)),
        );
    }

    debug!(routes = routes.len(), registered = seen.len(), "router built");
    Ok(router
        .fallback(move |req: Request| not_found.clone().call(req))
        .layer(DefaultBodyLimit::max(settings.max_body_bytes))
        .layer(RequestBodyTimeoutLayer::new(settings.read_timeout)))
}

/// Dispatch to `handler` only when the request method is exactly `method`
/// and its `Content-Type` contains `content_type`; otherwise to `fallback`.
///
/// axum's `GET` filter also admits `HEAD`, hence the method check.
fn exact_match(
    method: Method,
    content_type: &'static str,
    handler: BoxedHandler,
    fallback: BoxedHandler,
) -> BoxedHandler {
    Arc::new(move |ctx: RequestContext, req: Request| -> HandlerFuture {
        if req.method() == method && content_type_matches(req.headers(), content_type) {
            handler(ctx, req)
        } else {
            fallback(ctx, req)
        }
    })
}

fn content_type_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(expected))
}
