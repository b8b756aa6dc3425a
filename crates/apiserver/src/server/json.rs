//! Adapts typed JSON business handlers to the type-erased [`BoxedHandler`]
//! shape the router registers.
//!
//! Per request: read and decode the body into the handler's input type
//! (any failure here is a 400 and the handler is never called), run the
//! handler, then encode its output with the status it chose.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRequest, Request};
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use common::{ApiError, JSON_CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use super::context::RequestContext;
use super::route::{BoxedHandler, HandlerFuture};

/// What a typed business handler returns: the success status and the output
/// to encode, or an error carrying its own status.
pub type HandlerResult<O> = Result<(StatusCode, O), ApiError>;

/// Adapt a handler that takes a decoded JSON body.
pub fn json_handler<I, O, F, Fut>(handler: F) -> BoxedHandler
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<O>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |ctx: RequestContext, req: Request| -> HandlerFuture {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let input: I = decode_body(req).await?;
            let (status, output) = handler(ctx, input).await?;
            encode_response(status, &output)
        })
    })
}

/// Adapt a handler that expects no request body.
pub fn output_handler<O, F, Fut>(handler: F) -> BoxedHandler
where
    O: Serialize + Send + 'static,
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<O>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |ctx: RequestContext, _req: Request| -> HandlerFuture {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let (status, output) = handler(ctx).await?;
            encode_response(status, &output)
        })
    })
}

/// Buffer the request body and decode it as `I`.
///
/// The buffer honours the router's body size limit and read timeout; both
/// surface as [`ApiError::Decode`].
async fn decode_body<I: DeserializeOwned>(req: Request) -> Result<I, ApiError> {
    let bytes = Bytes::from_request(req, &())
        .await
        .map_err(|rejection| ApiError::Decode(rejection.body_text()))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encode `output` as the JSON response body.
///
/// The body is serialised before the response is built, so an encoding
/// failure still reaches the client as a clean error response.
pub(crate) fn encode_response<O: Serialize>(
    status: StatusCode,
    output: &O,
) -> Result<Response, ApiError> {
    let body = serde_json::to_vec(output).map_err(|e| {
        error!(error = %e, "failed to marshal response");
        ApiError::ResponseMarshal(e.to_string())
    })?;

    axum::http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, JSON_CONTENT_TYPE)
        .body(Body::from(body))
        .map_err(|e| {
            error!(error = %e, "failed to build response");
            ApiError::ResponseMarshal(e.to_string())
        })
}
