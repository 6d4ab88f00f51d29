//! proms-mcp library
//!
//! MCP server exposing read-only PromQL and metadata tools over the
//! Prometheus datasources of a Grafana provisioning file. Callers present an
//! OpenShift/Kubernetes bearer token, which is verified against the cluster
//! identity API before any tool runs.
//!
//! # Protocol Version
//!
//! Implements MCP Streamable HTTP (stateless `POST /mcp`), protocol versions
//! 2024-11-05 through 2025-06-18.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod datasource;
pub mod error;
pub mod prometheus;
pub mod protocol;
pub mod server;
pub mod tools;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` is `text` (default) or `json`.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
    }
}
