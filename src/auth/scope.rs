//! Identity to scope mapping and time-bounded access grants
//!
//! The server is read-only, so every authenticated identity maps to exactly
//! [`READ_SCOPE`]. Group membership is not consulted; no write or
//! admin scope is ever issued.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Identity;

/// The single scope granted to authenticated callers
pub const READ_SCOPE: &str = "read:data";

/// Resource identifier stamped on every grant
pub const RESOURCE_NAME: &str = "proms-mcp-server";

/// Default grant lifetime
pub const DEFAULT_GRANT_TTL: Duration = Duration::from_secs(3600);

/// Scopes for `identity`. Constant by policy.
#[must_use]
pub fn map_scopes(_identity: &Identity) -> BTreeSet<String> {
    BTreeSet::from([READ_SCOPE.to_string()])
}

/// Access derived from a verified identity, attached to the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    /// Caller username
    pub client_id: String,
    /// Granted scopes
    pub scopes: BTreeSet<String>,
    /// Grant expiry
    pub expires_at: DateTime<Utc>,
    /// Resource this grant applies to
    pub resource: &'static str,
}

impl AccessGrant {
    /// Derive a grant valid for `ttl` from now
    #[must_use]
    pub fn for_identity(identity: &Identity, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        Self {
            client_id: identity.username.clone(),
            scopes: map_scopes(identity),
            expires_at: Utc::now() + ttl,
            resource: RESOURCE_NAME,
        }
    }

    /// Whether `scope` was granted
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Whether the grant has lapsed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
