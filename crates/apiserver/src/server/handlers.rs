//! Handlers owned by the server itself rather than by a declared route.

use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;
use common::ApiError;

use super::context::RequestContext;
use super::route::{BoxedHandler, HandlerFuture};

/// Catch-all handler for requests no route matched. Always fails with
/// [`ApiError::NotFound`]; the request wrapper renders the 404 body.
pub fn not_found() -> BoxedHandler {
    Arc::new(|_ctx: RequestContext, _req: Request| -> HandlerFuture {
        Box::pin(async { Err::<Response, _>(ApiError::NotFound) })
    })
}
