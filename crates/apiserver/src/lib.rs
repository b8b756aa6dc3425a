//! JSON-over-HTTP(S) API server core.
//!
//! A caller declares a [`RouteTable`] of JSON endpoints and hands it, with a
//! [`Config`], to [`serve`]. The server binds the listener, optionally
//! terminates (mutual) TLS, tags every connection with a correlation id,
//! wraps each request with a deadline and access logging, and shuts down
//! when the supplied cancellation token fires.

pub mod config;
pub mod routes;
pub mod server;
pub mod telemetry;

pub use config::Config;
pub use server::{
    serve, ApiServer, HandlerResult, RequestContext, Route, RouteTable, ServerError, ServerHandle,
};
