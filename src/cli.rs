//! Command-line interface

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};

use crate::config::{AuthMode, Config, VerificationMethod};

/// MCP server for PromQL queries across Prometheus datasources
#[derive(Parser, Debug, Default)]
#[command(name = "proms-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PROMS_MCP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port for the MCP endpoint
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Port for the health and metrics listener
    #[arg(long, env = "HEALTH_METRICS_PORT")]
    pub health_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Authentication mode
    #[arg(long, env = "AUTH_MODE", value_enum)]
    pub auth_mode: Option<AuthMode>,

    /// Token verification method in active mode
    #[arg(long, env = "AUTH_METHOD", value_enum)]
    pub auth_method: Option<VerificationMethod>,

    /// Cluster API base URL
    #[arg(long, env = "OPENSHIFT_API_URL")]
    pub openshift_api_url: Option<String>,

    /// CA bundle for the cluster API
    #[arg(long, env = "OPENSHIFT_CA_CERT_PATH")]
    pub ca_cert_path: Option<PathBuf>,

    /// Skip TLS verification towards the cluster API (development only).
    /// Accepts true/false, 1/0, yes/no and on/off.
    #[arg(
        long,
        env = "OPENSHIFT_INSECURE_SKIP_TLS_VERIFY",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true"
    )]
    pub insecure_skip_tls_verify: bool,

    /// Identity cache TTL in seconds, 0 disables caching
    #[arg(long, env = "AUTH_CACHE_TTL_SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Grafana datasource provisioning file
    #[arg(long, env = "GRAFANA_DATASOURCES_PATH")]
    pub datasources: Option<PathBuf>,

    /// Prometheus query timeout in seconds
    #[arg(long, env = "QUERY_TIMEOUT")]
    pub query_timeout_seconds: Option<u64>,

    /// Subcommand (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the server (default)
    Serve,
    /// Load and validate configuration, then print a redacted summary
    CheckConfig,
}

impl Cli {
    /// Overlay CLI and environment values onto a loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(port) = self.health_port {
            config.server.health_port = Some(port);
        }
        if let Some(mode) = self.auth_mode {
            config.auth.mode = mode;
        }
        if let Some(method) = self.auth_method {
            config.auth.method = method;
        }
        if let Some(url) = &self.openshift_api_url {
            config.auth.api_url = Some(url.clone());
        }
        if let Some(path) = &self.ca_cert_path {
            config.auth.ca_cert_path = Some(path.clone());
        }
        if self.insecure_skip_tls_verify {
            config.auth.insecure_skip_tls_verify = true;
        }
        if let Some(secs) = self.cache_ttl_seconds {
            config.auth.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(path) = &self.datasources {
            config.prometheus.datasources_path.clone_from(path);
        }
        if let Some(secs) = self.query_timeout_seconds {
            config.prometheus.query_timeout = Duration::from_secs(secs);
        }
    }
}
