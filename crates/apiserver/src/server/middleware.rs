//! The request wrapper applied to every route and to the not-found handler.
//!
//! For each request it derives a [`RequestContext`] with the per-request
//! deadline, logs one entry line and one exit line under the connection's
//! span, and turns a handler error into a [`RestError`] body. The deadline is
//! advisory; the wrapper never aborts a handler that is still running, even
//! when the client goes away.

use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::{ApiError, RestError};
use tracing::{error, info, Instrument};

use super::context::{ConnectionContext, RequestContext};
use super::route::BoxedHandler;

/// Status sent for an error the handler reported with a non-error status.
pub const FALLBACK_ERROR_STATUS: StatusCode = StatusCode::INTERNAL_SERVER_ERROR;

/// A handler wrapped with deadline, access logging and error mapping.
#[derive(Clone)]
pub struct ApiWrapper {
    handler: BoxedHandler,
    request_timeout: Duration,
}

impl ApiWrapper {
    /// `request_timeout` is fixed for the lifetime of the wrapper.
    pub fn new(handler: BoxedHandler, request_timeout: Duration) -> Self {
        Self {
            handler,
            request_timeout,
        }
    }

    /// Process one request.
    ///
    /// The handler and the exit log line run on their own task, so a client
    /// that disconnects mid-request does not cancel the handler.
    pub async fn call(self, req: Request) -> Response {
        let connection = req
            .extensions()
            .get::<ConnectionContext>()
            .cloned()
            .unwrap_or_else(ConnectionContext::detached);
        let span = connection.span().clone();
        let ctx = RequestContext::new(connection, self.request_timeout);

        match tokio::spawn(self.process(ctx, req).instrument(span)).await {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "request task failed");
                error_response(FALLBACK_ERROR_STATUS, &internal_error())
            }
        }
    }

    async fn process(self, ctx: RequestContext, req: Request) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        info!(method = %method, path = %path, "--> {method} {path}");

        let start = Instant::now();
        let result = match tokio::spawn((self.handler)(ctx, req)).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "handler panicked");
                Err(internal_error())
            }
        };
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(resp) => {
                let status = resp.status().as_u16();
                info!(
                    method = %method,
                    path = %path,
                    status,
                    duration_ms,
                    "<-- {method} {path} [{status}] ({duration_ms:.2}ms)"
                );
                resp
            }
            Err(err) => {
                let status = error_status(err.http_status());
                info!(
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    duration_ms,
                    error = %err,
                    "<-- {method} {path} [{}] ({duration_ms:.2}ms): {err}",
                    status.as_u16()
                );
                error_response(status, &err)
            }
        }
    }
}

fn internal_error() -> ApiError {
    ApiError::handler(FALLBACK_ERROR_STATUS.as_u16(), "internal server error")
}

/// Map the status a handler reported alongside an error to the status sent.
///
/// Anything below 300 (or not a valid status at all) becomes
/// [`FALLBACK_ERROR_STATUS`], so an error never goes out looking like success.
pub fn error_status(reported: u16) -> StatusCode {
    match StatusCode::from_u16(reported) {
        Ok(status) if reported >= 300 => status,
        _ => FALLBACK_ERROR_STATUS,
    }
}

/// JSON [`RestError`] response for `err`.
pub fn error_response(status: StatusCode, err: &ApiError) -> Response {
    (status, Json(RestError::from(err))).into_response()
}
