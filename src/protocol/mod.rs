//! MCP protocol types for the stateless Streamable HTTP tool server

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// Newest MCP protocol version spoken by this server
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Every protocol version this server accepts, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Pick the version to answer `initialize` with.
///
/// Echoes the client's version when supported, otherwise offers the newest.
#[must_use]
pub fn negotiate_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|v| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|s| **s == v))
        .copied()
        .unwrap_or(PROTOCOL_VERSION)
}
