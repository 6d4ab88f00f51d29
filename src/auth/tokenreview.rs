//! Kubernetes `TokenReview` verification
//!
//! The review request is authenticated with the very token under review, so
//! no privileged service-account credential is needed. This works for human
//! users and in-cluster service accounts alike.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::trust::TrustConfig;
use super::verifier::{IdentityApiClient, IdentityVerifier};
use super::{AuthMethod, Identity, VerificationOutcome};
use crate::Result;

/// Token-review endpoint of the authentication API group
pub const TOKENREVIEW_PATH: &str = "/apis/authentication.k8s.io/v1/tokenreviews";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenReviewRequest<'a> {
    kind: &'static str,
    api_version: &'static str,
    spec: TokenReviewSpec<'a>,
}

#[derive(Debug, Serialize)]
struct TokenReviewSpec<'a> {
    token: &'a str,
}

impl<'a> TokenReviewRequest<'a> {
    fn new(token: &'a str) -> Self {
        Self {
            kind: "TokenReview",
            api_version: "authentication.k8s.io/v1",
            spec: TokenReviewSpec { token },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenReviewResponse {
    #[serde(default)]
    status: TokenReviewStatus,
}

#[derive(Debug, Default, Deserialize)]
struct TokenReviewStatus {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    user: Option<ReviewedUser>,
}

#[derive(Debug, Deserialize)]
struct ReviewedUser {
    #[serde(default)]
    username: String,
    #[serde(default)]
    uid: String,
    #[serde(default)]
    groups: Option<Vec<String>>,
}

/// Verifies a token through the `TokenReview` API using self-validation
#[derive(Debug, Clone)]
pub struct TokenReviewVerifier {
    client: IdentityApiClient,
}

impl TokenReviewVerifier {
    /// Create a verifier against `api_url`
    pub fn new(api_url: &str, trust: TrustConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: IdentityApiClient::new(api_url, trust, timeout, AuthMethod::TokenReview)?,
        })
    }

    /// Trust configuration in use
    #[must_use]
    pub fn trust(&self) -> &TrustConfig {
        self.client.trust()
    }
}

#[async_trait]
impl IdentityVerifier for TokenReviewVerifier {
    fn method(&self) -> AuthMethod {
        AuthMethod::TokenReview
    }

    async fn verify(&self, token: &str) -> VerificationOutcome {
        let request = self
            .client
            .http()
            .post(self.client.endpoint(TOKENREVIEW_PATH))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/json")
            .json(&TokenReviewRequest::new(token));

        let (status, body) = match self.client.execute(request).await {
            Ok(response) => response,
            Err(outcome) => return outcome,
        };

        if !status.is_success() {
            return self.client.rejected_status(status, &body);
        }

        let review = match serde_json::from_str::<TokenReviewResponse>(&body) {
            Ok(review) => review,
            Err(e) => return self.client.malformed_body(status, &e.to_string()),
        };

        if !review.status.authenticated {
            warn!("Token validation failed: not authenticated by TokenReview");
            return VerificationOutcome::Rejected;
        }

        match review.status.user {
            Some(user) if !user.username.is_empty() => {
                VerificationOutcome::Authenticated(Identity::new(
                    user.username,
                    user.uid,
                    user.groups.unwrap_or_default(),
                    AuthMethod::TokenReview,
                ))
            }
            _ => self
                .client
                .malformed_body(status, "authenticated review without status.user.username"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn verifier_for(server: &MockServer) -> TokenReviewVerifier {
        TokenReviewVerifier::new(
            &server.uri(),
            TrustConfig::system_store(),
            Duration::from_millis(500),
        )
        .unwrap()
    }

    fn review_body(token: &str) -> serde_json::Value {
        json!({
            "kind": "TokenReview",
            "apiVersion": "authentication.k8s.io/v1",
            "spec": {"token": token}
        })
    }

    #[test]
    fn request_payload_shape() {
        let payload = serde_json::to_value(TokenReviewRequest::new("abc")).unwrap();
        assert_eq!(payload, review_body("abc"));
    }

    #[tokio::test]
    async fn self_validation_uses_reviewed_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKENREVIEW_PATH))
            .and(header("authorization", "Bearer good-token"))
            .and(body_json(review_body("good-token")))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "status": {
                    "authenticated": true,
                    "user": {"username": "alice", "uid": "123", "groups": ["dev"]}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = verifier_for(&server).verify("good-token").await;
        assert_eq!(
            outcome,
            VerificationOutcome::Authenticated(Identity::new(
                "alice",
                "123",
                ["dev"],
                AuthMethod::TokenReview
            ))
        );
    }

    #[tokio::test]
    async fn unauthenticated_review_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": {"authenticated": false}})),
            )
            .mount(&server)
            .await;

        assert_eq!(
            verifier_for(&server).verify("bad").await,
            VerificationOutcome::Rejected
        );
    }

    #[tokio::test]
    async fn missing_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "TokenReview"})))
            .mount(&server)
            .await;

        assert_eq!(
            verifier_for(&server).verify("t").await,
            VerificationOutcome::Rejected
        );
    }

    #[tokio::test]
    async fn missing_groups_is_empty_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": {"authenticated": true, "user": {"username": "system:serviceaccount:ns:sa", "uid": "u"}}
            })))
            .mount(&server)
            .await;

        let identity = verifier_for(&server)
            .verify("t")
            .await
            .into_identity()
            .unwrap();
        assert_eq!(identity.username, "system:serviceaccount:ns:sa");
        assert!(identity.groups.is_empty());
    }

    #[tokio::test]
    async fn forbidden_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        assert_eq!(
            verifier_for(&server).verify("t").await,
            VerificationOutcome::Rejected
        );
    }

    #[tokio::test]
    async fn timeout_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        assert!(matches!(
            verifier_for(&server).verify("t").await,
            VerificationOutcome::Unreachable(_)
        ));
    }
}
