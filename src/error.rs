//! Error types for the icon MCP server
//!
//! Structured error definitions via thiserror, with anyhow accepted at the
//! binary edge. Every variant maps to a stable `kind()` string that tool
//! callers can branch on.

use thiserror::Error;

/// Main error type for icon server operations
#[derive(Error, Debug)]
pub enum IconMcpError {
    /// Bad arguments, rejected before any network or state work
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream search API answered with a non-success code
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Upstream call exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Unknown search ID
    #[error("Not found: {0}")]
    NotFound(String),

    /// Writing a saved icon failed
    #[error("Storage I/O error: {0}")]
    StorageIo(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// MCP protocol error
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    /// Web server could not be started or stopped
    #[error("Web server error: {0}")]
    Server(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl IconMcpError {
    /// Machine-readable error category, embedded in tool error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            IconMcpError::Validation(_) => "validation_error",
            IconMcpError::Upstream(_) | IconMcpError::Http(_) => "upstream_error",
            IconMcpError::Timeout(_) => "timeout_error",
            IconMcpError::NotFound(_) => "not_found_error",
            IconMcpError::StorageIo(_) => "storage_io_error",
            _ => "internal_error",
        }
    }

    /// Human-readable message without the category prefix
    pub fn message(&self) -> String {
        match self {
            IconMcpError::Validation(msg)
            | IconMcpError::Upstream(msg)
            | IconMcpError::Timeout(msg)
            | IconMcpError::NotFound(msg)
            | IconMcpError::StorageIo(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for icon server operations
pub type Result<T> = std::result::Result<T, IconMcpError>;

/// Convert anyhow::Error to IconMcpError
impl From<anyhow::Error> for IconMcpError {
    fn from(err: anyhow::Error) -> Self {
        IconMcpError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IconMcpError::NotFound("search_1_abc".to_string());
        assert_eq!(err.to_string(), "Not found: search_1_abc");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(IconMcpError::Validation("x".into()).kind(), "validation_error");
        assert_eq!(IconMcpError::Upstream("x".into()).kind(), "upstream_error");
        assert_eq!(IconMcpError::Timeout("x".into()).kind(), "timeout_error");
        assert_eq!(IconMcpError::NotFound("x".into()).kind(), "not_found_error");
        assert_eq!(IconMcpError::StorageIo("x".into()).kind(), "storage_io_error");
        assert_eq!(IconMcpError::Other("x".into()).kind(), "internal_error");
    }

    #[test]
    fn test_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json");
        assert!(parse_err.is_err());

        let err: IconMcpError = parse_err.unwrap_err().into();
        assert!(matches!(err, IconMcpError::Serialization(_)));
    }
}
