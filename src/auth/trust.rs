//! TLS trust for calls to the identity API.
//!
//! Resolution order:
//!
//! 1. An explicit CA path. It must exist; a missing file is a
//!    configuration error, never a silent downgrade.
//! 2. The in-cluster service-account CA mount, if present.
//! 3. The platform trust store.
//!
//! Skipping certificate verification is only possible through the separate
//! `insecure_skip_tls_verify` flag and is logged at warn level both here and
//! on every identity-API call.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::{Error, Result};

/// Service-account CA bundle mounted into every pod
pub const IN_CLUSTER_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// How the identity-API certificate is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustMode {
    /// CA bundle supplied by the operator
    ExplicitPath,
    /// CA bundle found at [`IN_CLUSTER_CA_PATH`]
    InClusterAuto,
    /// Platform default roots
    SystemStore,
    /// Certificate verification disabled by explicit opt-in
    InsecureSkipVerify,
}

/// Resolved trust configuration. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustConfig {
    mode: TrustMode,
    ca_path: Option<PathBuf>,
}

impl TrustConfig {
    /// Trust the platform roots only
    #[must_use]
    pub fn system_store() -> Self {
        Self {
            mode: TrustMode::SystemStore,
            ca_path: None,
        }
    }

    /// Resolve trust, checking the standard in-cluster CA location.
    pub fn resolve(explicit: Option<&Path>, insecure_skip_verify: bool) -> Result<Self> {
        Self::resolve_in_cluster(explicit, Path::new(IN_CLUSTER_CA_PATH), insecure_skip_verify)
    }

    /// Resolve trust against a caller-supplied in-cluster CA location.
    pub fn resolve_in_cluster(
        explicit: Option<&Path>,
        in_cluster: &Path,
        insecure_skip_verify: bool,
    ) -> Result<Self> {
        if insecure_skip_verify {
            if let Some(path) = explicit {
                return Err(Error::Config(format!(
                    "insecure_skip_tls_verify cannot be combined with ca_cert_path ({})",
                    path.display()
                )));
            }
            warn!(
                "TLS certificate verification for the identity API is DISABLED \
                 (insecure_skip_tls_verify=true); use only for development"
            );
            return Ok(Self {
                mode: TrustMode::InsecureSkipVerify,
                ca_path: None,
            });
        }

        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(Error::Config(format!(
                    "CA certificate file not found: {}",
                    path.display()
                )));
            }
            info!(path = %path.display(), "Using explicit CA certificate");
            return Ok(Self {
                mode: TrustMode::ExplicitPath,
                ca_path: Some(path.to_path_buf()),
            });
        }

        if in_cluster.is_file() {
            info!(path = %in_cluster.display(), "Using in-cluster CA certificate");
            return Ok(Self {
                mode: TrustMode::InClusterAuto,
                ca_path: Some(in_cluster.to_path_buf()),
            });
        }

        info!("Using system CA certificate store for TLS verification");
        Ok(Self::system_store())
    }

    /// Resolved mode
    #[must_use]
    pub fn mode(&self) -> TrustMode {
        self.mode
    }

    /// CA bundle path, for the explicit and in-cluster modes
    #[must_use]
    pub fn ca_path(&self) -> Option<&Path> {
        self.ca_path.as_deref()
    }

    /// Whether certificate verification is off
    #[must_use]
    pub fn is_insecure(&self) -> bool {
        self.mode == TrustMode::InsecureSkipVerify
    }

    /// Emit the per-call warning when verification is disabled
    pub fn warn_if_insecure(&self) {
        if self.is_insecure() {
            warn!("Calling identity API without TLS certificate verification");
        }
    }

    /// Read and parse the CA bundle, if this mode uses one.
    ///
    /// A file that holds no PEM certificate at all is a configuration
    /// error, so a wrong path fails at startup instead of on every call.
    pub fn load_ca_bundle(&self) -> Result<Vec<reqwest::Certificate>> {
        let Some(path) = self.ca_path() else {
            return Ok(Vec::new());
        };
        let pem = fs::read(path).map_err(|e| {
            Error::Config(format!("Cannot read CA certificate {}: {e}", path.display()))
        })?;
        let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
            Error::Config(format!("Invalid CA certificate {}: {e}", path.display()))
        })?;
        if certs.is_empty() {
            return Err(Error::Config(format!(
                "Invalid CA certificate {}: no PEM certificates found",
                path.display()
            )));
        }
        Ok(certs)
    }

    /// Build an HTTP client honouring this trust configuration.
    ///
    /// The CA bundle is read and parsed here so an unreadable or malformed
    /// file fails at startup.
    pub fn build_client(&self, timeout: Duration) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("proms-mcp/", env!("CARGO_PKG_VERSION")));

        for cert in self.load_ca_bundle()? {
            builder = builder.add_root_certificate(cert);
        }

        if self.is_insecure() {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build identity API client: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn missing() -> PathBuf {
        PathBuf::from("/nonexistent/proms-mcp/ca.crt")
    }

    #[test]
    fn explicit_path_must_exist() {
        let err = TrustConfig::resolve_in_cluster(Some(&missing()), &missing(), false)
            .expect_err("missing explicit CA must fail");
        match err {
            Error::Config(msg) => assert!(msg.contains("CA certificate file not found")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn explicit_path_wins_over_in_cluster() {
        let explicit = tempfile::NamedTempFile::new().unwrap();
        let in_cluster = tempfile::NamedTempFile::new().unwrap();

        let trust =
            TrustConfig::resolve_in_cluster(Some(explicit.path()), in_cluster.path(), false)
                .unwrap();
        assert_eq!(trust.mode(), TrustMode::ExplicitPath);
        assert_eq!(trust.ca_path(), Some(explicit.path()));
    }

    #[test]
    fn in_cluster_ca_is_detected() {
        let in_cluster = tempfile::NamedTempFile::new().unwrap();
        let trust = TrustConfig::resolve_in_cluster(None, in_cluster.path(), false).unwrap();
        assert_eq!(trust.mode(), TrustMode::InClusterAuto);
        assert_eq!(trust.ca_path(), Some(in_cluster.path()));
    }

    #[test]
    fn falls_back_to_system_store() {
        let trust = TrustConfig::resolve_in_cluster(None, &missing(), false).unwrap();
        assert_eq!(trust, TrustConfig::system_store());
        assert!(!trust.is_insecure());
        assert!(trust.ca_path().is_none());
    }

    #[test]
    fn insecure_requires_explicit_flag() {
        let trust = TrustConfig::resolve_in_cluster(None, &missing(), true).unwrap();
        assert_eq!(trust.mode(), TrustMode::InsecureSkipVerify);
        assert!(trust.is_insecure());
    }

    #[test]
    fn insecure_conflicts_with_explicit_ca() {
        let explicit = tempfile::NamedTempFile::new().unwrap();
        let err = TrustConfig::resolve_in_cluster(Some(explicit.path()), &missing(), true)
            .expect_err("conflicting options must fail");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_ca_bundle_fails_client_build() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not a certificate").unwrap();
        let trust = TrustConfig::resolve_in_cluster(Some(file.path()), &missing(), false).unwrap();

        let Err(err) = trust.load_ca_bundle() else {
            panic!("garbage bundle must fail");
        };
        assert!(matches!(&err, Error::Config(msg) if msg.contains("Invalid CA certificate")));
        assert!(matches!(
            trust.build_client(Duration::from_secs(1)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn empty_in_cluster_ca_fails_client_build() {
        let in_cluster = tempfile::NamedTempFile::new().unwrap();
        let trust = TrustConfig::resolve_in_cluster(None, in_cluster.path(), false).unwrap();
        assert!(trust.build_client(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn system_store_has_no_bundle() {
        let bundle = TrustConfig::system_store().load_ca_bundle();
        assert!(bundle.is_ok_and(|certs| certs.is_empty()));
    }

    #[test]
    fn system_store_client_builds() {
        let client = TrustConfig::system_store().build_client(Duration::from_secs(1));
        assert!(client.is_ok());
    }
}
