//! Built-in routes served by the `apiserver` binary.
//!
//! | Method | Path                | Body             | Response                |
//! |--------|---------------------|------------------|-------------------------|
//! | GET    | `/api/v1/status`    | none             | `200 {"version"}`       |
//! | POST   | `/api/v1/widgets`   | `{"name"}`       | `201 {"id","name"}`     |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use common::ApiError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::server::{HandlerResult, RequestContext, Route, RouteTable};

pub const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWidget {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Widget {
    pub id: String,
    pub name: String,
}

/// The route table under [`API_PREFIX`].
pub fn table() -> RouteTable {
    table_with_prefix(API_PREFIX)
}

/// The route table with every path under `prefix`.
fn table_with_prefix(prefix: &str) -> RouteTable {
    let ids = Arc::new(AtomicU64::new(0));
    RouteTable::new(vec![
        Route::new(Method::GET, format!("{prefix}/status")).json_output(get_status),
        Route::new(Method::POST, format!("{prefix}/widgets")).json(move |ctx, input: NewWidget| {
            create_widget(ctx, input, Arc::clone(&ids))
        }),
    ])
}

async fn get_status(_ctx: RequestContext) -> HandlerResult<Status> {
    Ok((
        StatusCode::OK,
        Status {
            version: env!("CARGO_PKG_VERSION").to_owned(),
        },
    ))
}

async fn create_widget(
    ctx: RequestContext,
    input: NewWidget,
    ids: Arc<AtomicU64>,
) -> HandlerResult<Widget> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let id = format!("w{}", ids.fetch_add(1, Ordering::Relaxed) + 1);
    debug!(parent: ctx.span(), widget = %id, "widget created");
    Ok((
        StatusCode::CREATED,
        Widget {
            id,
            name: name.to_owned(),
        },
    ))
}
