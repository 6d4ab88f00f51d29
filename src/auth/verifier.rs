//! Identity verifier strategies and the shared identity-API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, error, warn};
use url::Url;

use super::trust::TrustConfig;
use super::{AuthMethod, Identity, VerificationOutcome};
use crate::{Error, Result};

/// Bound on a single identity-API call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Response bodies are truncated to this many characters in logs
const LOG_BODY_LIMIT: usize = 200;

/// Turns a bearer token into a [`VerificationOutcome`].
///
/// Implementations are stateless: caching is layered on top by
/// [`super::Authenticator`]. `verify` never fails; every error path is folded
/// into `Rejected` or `Unreachable` and logged by the implementation.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Strategy name stamped on produced identities
    fn method(&self) -> AuthMethod;

    /// Whether a request without a bearer token can be verified at all
    fn requires_token(&self) -> bool {
        true
    }

    /// Make exactly one verification attempt
    async fn verify(&self, token: &str) -> VerificationOutcome;
}

/// Development verifier: every caller is the same fixed identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthVerifier;

impl NoAuthVerifier {
    /// The identity returned for every request
    #[must_use]
    pub fn identity() -> Identity {
        Identity::new("dev-user", "dev-user-id", ["developers"], AuthMethod::None)
    }
}

#[async_trait]
impl IdentityVerifier for NoAuthVerifier {
    fn method(&self) -> AuthMethod {
        AuthMethod::None
    }

    fn requires_token(&self) -> bool {
        false
    }

    async fn verify(&self, _token: &str) -> VerificationOutcome {
        debug!("Authentication disabled, using development identity");
        VerificationOutcome::Authenticated(Self::identity())
    }
}

/// HTTP plumbing shared by the userinfo and tokenreview strategies.
#[derive(Debug, Clone)]
pub(crate) struct IdentityApiClient {
    base_url: String,
    trust: TrustConfig,
    http: reqwest::Client,
    method: AuthMethod,
}

impl IdentityApiClient {
    pub(crate) fn new(
        api_url: &str,
        trust: TrustConfig,
        timeout: Duration,
        method: AuthMethod,
    ) -> Result<Self> {
        let parsed = Url::parse(api_url)
            .map_err(|e| Error::Config(format!("Invalid identity API URL '{api_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Identity API URL must use http or https: {api_url}"
            )));
        }

        let http = trust.build_client(timeout)?;
        Ok(Self {
            base_url: api_url.trim_end_matches('/').to_string(),
            trust,
            http,
            method,
        })
    }

    pub(crate) fn trust(&self) -> &TrustConfig {
        &self.trust
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Send `request`, returning the status and body.
    ///
    /// Transport failures (timeout, connect, DNS, body read) are logged at
    /// error level and surface as `Err(Unreachable)`.
    pub(crate) async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<(StatusCode, String), VerificationOutcome> {
        self.trust.warn_if_insecure();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Err(self.unreachable(&e)),
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => Ok((status, body)),
            Err(e) => Err(self.unreachable(&e)),
        }
    }

    /// Fold a non-success status into `Rejected`
    pub(crate) fn rejected_status(&self, status: StatusCode, body: &str) -> VerificationOutcome {
        if status == StatusCode::UNAUTHORIZED {
            warn!(
                method = %self.method,
                status = status.as_u16(),
                "Token validation failed: unauthorized"
            );
        } else {
            warn!(
                method = %self.method,
                status = status.as_u16(),
                response = truncate(body, LOG_BODY_LIMIT),
                "Token validation failed: unexpected status"
            );
        }
        VerificationOutcome::Rejected
    }

    /// Fold an unparseable success body into `Rejected`
    pub(crate) fn malformed_body(&self, status: StatusCode, reason: &str) -> VerificationOutcome {
        warn!(
            method = %self.method,
            status = status.as_u16(),
            reason,
            "Token validation failed: malformed identity API response"
        );
        VerificationOutcome::Rejected
    }

    fn unreachable(&self, e: &reqwest::Error) -> VerificationOutcome {
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };
        error!(
            method = %self.method,
            kind,
            error = %e,
            "Identity API unreachable"
        );
        VerificationOutcome::Unreachable(kind.to_string())
    }
}

fn truncate(body: &str, limit: usize) -> &str {
    match body.char_indices().nth(limit) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_auth_ignores_the_token() {
        let verifier = NoAuthVerifier;
        let expected = VerificationOutcome::Authenticated(NoAuthVerifier::identity());

        assert_eq!(verifier.verify("anything").await, expected);
        assert_eq!(verifier.verify("").await, expected);
        assert_eq!(verifier.method(), AuthMethod::None);
    }

    #[test]
    fn no_auth_identity_is_fixed() {
        let identity = NoAuthVerifier::identity();
        assert_eq!(identity.username, "dev-user");
        assert_eq!(identity.uid, "dev-user-id");
        assert!(identity.in_group("developers"));
    }

    #[test]
    fn api_url_must_be_http() {
        let err = IdentityApiClient::new(
            "ftp://api.example.com",
            TrustConfig::system_store(),
            DEFAULT_REQUEST_TIMEOUT,
            AuthMethod::UserInfo,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(
            IdentityApiClient::new(
                "not a url",
                TrustConfig::system_store(),
                DEFAULT_REQUEST_TIMEOUT,
                AuthMethod::UserInfo,
            )
            .is_err()
        );
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = IdentityApiClient::new(
            "https://api.example.com:6443/",
            TrustConfig::system_store(),
            DEFAULT_REQUEST_TIMEOUT,
            AuthMethod::TokenReview,
        )
        .unwrap();
        assert_eq!(
            client.endpoint("/apis/x"),
            "https://api.example.com:6443/apis/x"
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 200), "short");
    }
}
