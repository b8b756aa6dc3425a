//! Configuration loading and validation for the API server.
//!
//! Values come from an optional config file (named by `APISERVER_CONFIG`)
//! overlaid with environment variables. The process exits with a clear error
//! message if any value is missing or invalid. The resulting [`Config`] is
//! immutable for the lifetime of the server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;

/// Environment variable naming an optional config file.
pub const CONFIG_FILE_ENV: &str = "APISERVER_CONFIG";

/// Validated API server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Interface the listener binds to.
    #[serde(default = "default_http_address")]
    pub http_address: String,

    /// Port the listener binds to. `0` asks the OS for a free port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Serve HTTPS instead of plain HTTP.
    #[serde(default)]
    pub http_tls_enabled: bool,

    /// Require and verify client certificates (mutual TLS).
    #[serde(default)]
    pub http_tls_client_auth: bool,

    /// PEM bundle of trusted CAs. Unset means the default trust store.
    #[serde(default)]
    pub http_tls_ca_file: Option<PathBuf>,

    /// PEM certificate chain served to clients. **Required** with TLS.
    #[serde(default)]
    pub http_tls_cert_file: Option<PathBuf>,

    /// PEM private key for the certificate chain. **Required** with TLS.
    #[serde(default)]
    pub http_tls_key_file: Option<PathBuf>,

    /// Bound (seconds) on the TLS handshake, request headers and body read stalls.
    #[serde(default = "default_read_timeout")]
    pub http_read_timeout_secs: u64,

    /// Bound (seconds) on each response write stall.
    ///
    /// This is not a deadline for the whole response: a client that keeps
    /// reading, however slowly, keeps the write alive.
    #[serde(default = "default_write_timeout")]
    pub http_write_timeout_secs: u64,

    /// Deadline (seconds) given to every request's handler.
    #[serde(default = "default_request_timeout")]
    pub api_request_timeout_secs: u64,

    /// Largest request body accepted by JSON routes.
    #[serde(default = "default_max_body_bytes")]
    pub api_max_body_bytes: usize,

    /// How long (seconds) open connections may drain after shutdown starts.
    #[serde(default = "default_shutdown_drain")]
    pub shutdown_drain_secs: u64,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP endpoint for span export. Unset disables export.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
}

fn default_http_address() -> String {
    "127.0.0.1".into()
}
fn default_http_port() -> u16 {
    5000
}
fn default_read_timeout() -> u64 {
    15
}
fn default_write_timeout() -> u64 {
    15
}
fn default_request_timeout() -> u64 {
    120
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_shutdown_drain() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_address: default_http_address(),
            http_port: default_http_port(),
            http_tls_enabled: false,
            http_tls_client_auth: false,
            http_tls_ca_file: None,
            http_tls_cert_file: None,
            http_tls_key_file: None,
            http_read_timeout_secs: default_read_timeout(),
            http_write_timeout_secs: default_write_timeout(),
            api_request_timeout_secs: default_request_timeout(),
            api_max_body_bytes: default_max_body_bytes(),
            shutdown_drain_secs: default_shutdown_drain(),
            log_level: default_log_level(),
            otel_exporter_otlp_endpoint: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from the environment, layered over
    /// the file named by [`CONFIG_FILE_ENV`] when it is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a value cannot be parsed,
    /// or validation fails.
    pub fn from_env() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }
        Self::from_builder(builder.add_source(config::Environment::default()))
    }

    /// Build, deserialise and validate from an assembled source stack.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let cfg = builder
            .build()
            .context("failed to build configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// `host:port` string the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.http_address, self.http_port)
    }

    /// The CA bundle path, treating an empty value as unset.
    pub fn ca_file(&self) -> Option<&Path> {
        self.http_tls_ca_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.http_read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.http_write_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api_request_timeout_secs)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    pub fn validate(&self) -> Result<()> {
        if self.http_address.trim().is_empty() {
            anyhow::bail!("HTTP_ADDRESS is required and must not be empty");
        }
        if self.http_tls_enabled {
            ensure_path(self.http_tls_cert_file.as_deref(), "HTTP_TLS_CERT_FILE")?;
            ensure_path(self.http_tls_key_file.as_deref(), "HTTP_TLS_KEY_FILE")?;
        }
        if self.http_tls_client_auth && !self.http_tls_enabled {
            anyhow::bail!("HTTP_TLS_CLIENT_AUTH requires HTTP_TLS_ENABLED");
        }
        if self.http_read_timeout_secs == 0 {
            anyhow::bail!("HTTP_READ_TIMEOUT_SECS must be > 0");
        }
        if self.http_write_timeout_secs == 0 {
            anyhow::bail!("HTTP_WRITE_TIMEOUT_SECS must be > 0");
        }
        if self.api_request_timeout_secs == 0 {
            anyhow::bail!("API_REQUEST_TIMEOUT_SECS must be > 0");
        }
        if self.api_max_body_bytes == 0 {
            anyhow::bail!("API_MAX_BODY_BYTES must be > 0");
        }
        Ok(())
    }
}

fn ensure_path(value: Option<&Path>, name: &str) -> Result<()> {
    match value {
        Some(p) if !p.as_os_str().is_empty() => Ok(()),
        _ => anyhow::bail!("{name} is required when TLS is enabled"),
    }
}
