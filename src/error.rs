//! Error types for proms-mcp

use std::io;

use thiserror::Error;

/// Result type alias for proms-mcp
pub type Result<T> = std::result::Result<T, Error>;

/// proms-mcp errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Datasource lookup or loading error
    #[error("Datasource error: {0}")]
    Datasource(String),

    /// Invalid tool arguments
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// JSON-RPC error
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        /// Error code
        code: i32,
        /// Error message
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a JSON-RPC error
    pub fn json_rpc(code: i32, message: impl Into<String>) -> Self {
        Self::JsonRpc {
            code,
            message: message.into(),
        }
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::JsonRpc { code, .. } => *code,
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::InvalidParams(_) => rpc_codes::INVALID_PARAMS,
            Self::Datasource(_) => rpc_codes::SERVER_ERROR_START,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server error range start
    pub const SERVER_ERROR_START: i32 = -32000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_codes_follow_error_kind() {
        assert_eq!(Error::InvalidParams("x".into()).to_rpc_code(), -32602);
        assert_eq!(Error::json_rpc(-32601, "nope").to_rpc_code(), -32601);
        assert_eq!(Error::Config("x".into()).to_rpc_code(), -32603);
        assert_eq!(Error::Datasource("x".into()).to_rpc_code(), -32000);
    }

    #[test]
    fn config_error_message_is_prefixed() {
        let err = Error::Config("CA certificate file not found: /nope".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: CA certificate file not found: /nope"
        );
    }
}
