//! Configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Prometheus datasource configuration
    pub prometheus: PrometheusConfig,
}

impl Config {
    /// Load configuration from an optional YAML file and `PROMS_MCP_` env vars
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // e.g. PROMS_MCP_AUTH__METHOD=tokenreview
        figment = figment.merge(Env::prefixed("PROMS_MCP_").split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.auth.validate()?;

        if self.server.health_port == Some(self.server.port) {
            return Err(Error::Config(format!(
                "server.health_port must differ from server.port ({})",
                self.server.port
            )));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port for the MCP endpoint
    pub port: u16,
    /// Separate port serving only `/health` and `/metrics`
    pub health_port: Option<u16>,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            health_port: Some(8080),
            shutdown_timeout: Duration::from_secs(8),
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Whether callers are authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Development only: every caller gets a fixed identity
    None,
    /// Verify bearer tokens against the cluster API
    #[default]
    Active,
}

/// Which identity API verifies tokens in active mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMethod {
    /// OpenShift `users/~` endpoint
    #[default]
    #[value(name = "userinfo")]
    UserInfo,
    /// Kubernetes `TokenReview` with self-validation
    #[value(name = "tokenreview")]
    TokenReview,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// `none` or `active`
    pub mode: AuthMode,
    /// Verification strategy in active mode
    pub method: VerificationMethod,
    /// Cluster API base URL, required in active mode
    pub api_url: Option<String>,
    /// CA bundle for the cluster API; must exist when set
    pub ca_cert_path: Option<PathBuf>,
    /// Skip TLS certificate verification (development only)
    pub insecure_skip_tls_verify: bool,
    /// Identity cache TTL; zero disables caching
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Maximum cached identities
    pub cache_capacity: usize,
    /// Timeout for a single identity-API call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Lifetime of the access grant derived from an identity
    #[serde(with = "humantime_serde")]
    pub grant_ttl: Duration,
    /// Paths that bypass authentication
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string(), "/metrics".to_string()]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            method: VerificationMethod::default(),
            api_url: None,
            ca_cert_path: None,
            insecure_skip_tls_verify: false,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1000,
            request_timeout: Duration::from_secs(10),
            grant_ttl: Duration::from_secs(3600),
            public_paths: default_public_paths(),
        }
    }
}

impl AuthConfig {
    /// Validate the auth section
    pub fn validate(&self) -> Result<()> {
        // Grants are minted in both modes; a zero lifetime denies every tool call.
        if self.grant_ttl.is_zero() {
            return Err(Error::Config("auth.grant_ttl must be greater than zero".to_string()));
        }

        if self.mode == AuthMode::None {
            return Ok(());
        }

        let api_url = self.api_url.as_deref().ok_or_else(|| {
            Error::Config(
                "OPENSHIFT_API_URL (auth.api_url) is required for active authentication"
                    .to_string(),
            )
        })?;
        let parsed = Url::parse(api_url)
            .map_err(|e| Error::Config(format!("Invalid auth.api_url '{api_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "auth.api_url must be an http(s) URL: {api_url}"
            )));
        }

        if self.insecure_skip_tls_verify && self.ca_cert_path.is_some() {
            return Err(Error::Config(
                "auth.insecure_skip_tls_verify cannot be combined with auth.ca_cert_path"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Whether `path` bypasses authentication (exact match or a sub-path)
    #[must_use]
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| {
            path == p
                || path
                    .strip_prefix(p.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Prometheus datasource configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    /// Grafana datasource provisioning file
    pub datasources_path: PathBuf,
    /// Timeout for a single Prometheus query
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            datasources_path: PathBuf::from(
                "/etc/grafana/provisioning/datasources/datasources.yaml",
            ),
            query_timeout: Duration::from_secs(30),
        }
    }
}
