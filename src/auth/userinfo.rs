//! OpenShift user-info verification (`GET /apis/user.openshift.io/v1/users/~`)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use super::trust::TrustConfig;
use super::verifier::{IdentityApiClient, IdentityVerifier};
use super::{AuthMethod, Identity, VerificationOutcome};
use crate::Result;

/// "Who am I" route of the OpenShift user API
pub const USERINFO_PATH: &str = "/apis/user.openshift.io/v1/users/~";

#[derive(Debug, Deserialize)]
struct UserResponse {
    metadata: UserMetadata,
    #[serde(default)]
    groups: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct UserMetadata {
    name: String,
    uid: String,
}

/// Verifies a token by asking the API server who it belongs to
#[derive(Debug, Clone)]
pub struct UserInfoVerifier {
    client: IdentityApiClient,
}

impl UserInfoVerifier {
    /// Create a verifier against `api_url`
    pub fn new(api_url: &str, trust: TrustConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: IdentityApiClient::new(api_url, trust, timeout, AuthMethod::UserInfo)?,
        })
    }

    /// Trust configuration in use
    #[must_use]
    pub fn trust(&self) -> &TrustConfig {
        self.client.trust()
    }
}

#[async_trait]
impl IdentityVerifier for UserInfoVerifier {
    fn method(&self) -> AuthMethod {
        AuthMethod::UserInfo
    }

    async fn verify(&self, token: &str) -> VerificationOutcome {
        let request = self
            .client
            .http()
            .get(self.client.endpoint(USERINFO_PATH))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/json");

        let (status, body) = match self.client.execute(request).await {
            Ok(response) => response,
            Err(outcome) => return outcome,
        };

        if !status.is_success() {
            return self.client.rejected_status(status, &body);
        }

        match serde_json::from_str::<UserResponse>(&body) {
            Ok(user) if !user.metadata.name.is_empty() && !user.metadata.uid.is_empty() => {
                VerificationOutcome::Authenticated(Identity::new(
                    user.metadata.name,
                    user.metadata.uid,
                    user.groups.unwrap_or_default(),
                    AuthMethod::UserInfo,
                ))
            }
            Ok(_) => self.client.malformed_body(status, "empty name or uid"),
            Err(e) => self.client.malformed_body(status, &e.to_string()),
        }
    }
}
