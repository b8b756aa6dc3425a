//! Logging and optional span export.
//!
//! Structured JSON logs go to stdout. When an OTLP endpoint is configured,
//! spans (including the per-connection `conn` span carrying the correlation
//! id) are also exported over OTLP/gRPC.
//!
//! Log level is configurable via `LOG_LEVEL` (default: `info`), and `RUST_LOG`
//! takes precedence when set.

pub mod init;

pub use init::init_telemetry;
