//! Caller authentication against the cluster identity API.
//!
//! # Flow
//!
//! ```text
//! Request arrives
//!   -> Gate skips allow-listed paths (/health, /metrics)
//!   -> Extract bearer token (missing / non-Bearer -> 401, verifier untouched)
//!   -> TokenCache lookup by SHA-256 fingerprint
//!   -> On miss: IdentityVerifier::verify (no-auth | userinfo | tokenreview)
//!   -> Authenticated: cache, derive AccessGrant, attach to request
//!   -> Rejected / Unreachable: 401 (same response, different log severity)
//! ```
//!
//! The verifier strategy is chosen once at startup from [`AuthConfig`]; TLS
//! trust for the identity API is resolved once per verifier by [`trust`].

pub mod cache;
pub mod scope;
pub mod tokenreview;
pub mod trust;
pub mod userinfo;
pub mod verifier;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{AuthConfig, AuthMode, VerificationMethod};
use crate::{Error, Result};

pub use cache::{CacheKey, CacheStatsSnapshot, TokenCache};
pub use scope::{AccessGrant, READ_SCOPE, RESOURCE_NAME, map_scopes};
pub use tokenreview::TokenReviewVerifier;
pub use trust::{IN_CLUSTER_CA_PATH, TrustConfig, TrustMode};
pub use userinfo::UserInfoVerifier;
pub use verifier::{IdentityVerifier, NoAuthVerifier};

/// Which strategy produced an [`Identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Development mode, no verification performed
    None,
    /// OpenShift "who am I" user endpoint
    UserInfo,
    /// Kubernetes `TokenReview` endpoint
    TokenReview,
}

impl AuthMethod {
    /// Stable lowercase name used in logs and metrics
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::UserInfo => "userinfo",
            Self::TokenReview => "tokenreview",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verified caller identity. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Username (`metadata.name` or `status.user.username`)
    pub username: String,
    /// Unique id assigned by the identity provider
    pub uid: String,
    /// Group memberships (may be empty)
    pub groups: BTreeSet<String>,
    /// Strategy that verified this identity
    pub auth_method: AuthMethod,
}

impl Identity {
    /// Build an identity from any iterable of group names
    pub fn new<I, S>(
        username: impl Into<String>,
        uid: impl Into<String>,
        groups: I,
        auth_method: AuthMethod,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            username: username.into(),
            uid: uid.into(),
            groups: groups.into_iter().map(Into::into).collect(),
            auth_method,
        }
    }

    /// Whether this identity is a member of `group`
    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}

/// Result of a single verification attempt.
///
/// `Rejected` and `Unreachable` look the same to callers (no identity) but
/// are logged at different severities by the verifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The identity API vouched for the token
    Authenticated(Identity),
    /// The token is invalid, expired, or the answer could not be understood
    Rejected,
    /// The identity API could not be reached (timeout, connect or DNS failure)
    Unreachable(String),
}

impl VerificationOutcome {
    /// The verified identity, if any
    #[must_use]
    pub fn into_identity(self) -> Option<Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Rejected | Self::Unreachable(_) => None,
        }
    }

    /// Short label for metrics
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => "authenticated",
            Self::Rejected => "rejected",
            Self::Unreachable(_) => "unreachable",
        }
    }
}

/// Extract the bearer token from an `Authorization` header.
///
/// The scheme is matched case-insensitively. Returns `None` for a missing
/// header, a non-`Bearer` scheme, or an empty token.
#[must_use]
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Cache-aside front for the configured verifier.
///
/// Owns the shared [`TokenCache`]; the verifier itself holds no mutable state.
pub struct Authenticator {
    verifier: Arc<dyn IdentityVerifier>,
    cache: Arc<TokenCache>,
}

impl Authenticator {
    /// Wrap a verifier with a cache
    #[must_use]
    pub fn new(verifier: Arc<dyn IdentityVerifier>, cache: Arc<TokenCache>) -> Self {
        Self { verifier, cache }
    }

    /// Build the verifier and cache selected by configuration.
    ///
    /// TLS trust is resolved here, before any network call, so a bad
    /// `ca_cert_path` surfaces as [`Error::Config`] at startup.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let verifier = build_verifier(config)?;
        let cache = Arc::new(TokenCache::new(config.cache_ttl, config.cache_capacity));
        Ok(Self::new(verifier, cache))
    }

    /// Strategy in use
    #[must_use]
    pub fn method(&self) -> AuthMethod {
        self.verifier.method()
    }

    /// Shared token cache
    #[must_use]
    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Authenticate a request from its headers.
    ///
    /// Exactly one verification attempt is made on a cache miss; no retry.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = extract_bearer_token(headers);

        if !self.verifier.requires_token() {
            return self
                .verifier
                .verify(token.unwrap_or_default())
                .await
                .into_identity();
        }

        let token = token?;
        self.verify_token(token).await
    }

    /// Verify a raw token, consulting the cache first
    pub async fn verify_token(&self, token: &str) -> Option<Identity> {
        if let Some(identity) = self.cache.get(token) {
            telemetry_metrics::counter!("proms_mcp_auth_cache_hits_total").increment(1);
            debug!(username = %identity.username, "Authenticated from cache");
            return Some(identity);
        }

        let outcome = self.verifier.verify(token).await;
        telemetry_metrics::counter!("proms_mcp_auth_attempts_total", "outcome" => outcome.label())
            .increment(1);

        let identity = outcome.into_identity()?;
        self.cache.put(token, identity.clone());
        info!(
            username = %identity.username,
            method = %identity.auth_method,
            groups_count = identity.groups.len(),
            "Authentication successful"
        );
        Some(identity)
    }
}

/// Construct the verifier strategy named by configuration.
pub fn build_verifier(config: &AuthConfig) -> Result<Arc<dyn IdentityVerifier>> {
    if config.mode == AuthMode::None {
        return Ok(Arc::new(NoAuthVerifier));
    }

    let api_url = config.api_url.as_deref().ok_or_else(|| {
        Error::Config("auth.api_url (OPENSHIFT_API_URL) is required in active mode".to_string())
    })?;
    let trust = TrustConfig::resolve(config.ca_cert_path.as_deref(), config.insecure_skip_tls_verify)?;
    let timeout = nonzero_timeout(config.request_timeout);

    let verifier: Arc<dyn IdentityVerifier> = match config.method {
        VerificationMethod::UserInfo => {
            Arc::new(UserInfoVerifier::new(api_url, trust, timeout)?)
        }
        VerificationMethod::TokenReview => {
            Arc::new(TokenReviewVerifier::new(api_url, trust, timeout)?)
        }
    };
    Ok(verifier)
}

fn nonzero_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        verifier::DEFAULT_REQUEST_TIMEOUT
    } else {
        timeout
    }
}
