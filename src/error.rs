//! Unified error type for nexushub: maps internal errors to JSON-RPC codes.

use thiserror::Error;

/// Standard JSON-RPC 2.0 error codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_PARAMS: i32 = -32602;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INTERNAL_ERROR: i32 = -32603;
/// Application-level server error (implementation-defined).
pub const SERVER_ERROR: i32 = -32000;

#[derive(Error, Debug)]
pub enum NexusError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Carries the method for logging; the wire message is fixed.
    #[error("Method not found")]
    MethodNotFound(String),

    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::sqlite::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl NexusError {
    /// JSON-RPC error code for this error variant.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::ParseError(_) => PARSE_ERROR,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::ToolNotFound(_)
            | Self::DuplicateTool(_)
            | Self::Config(_)
            | Self::Storage(_)
            | Self::Io(_)
            | Self::Http(_) => SERVER_ERROR,
            Self::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// Convert to (code, message) pair for `Response::error`.
    pub fn into_rpc(self) -> (i32, String) {
        let code = self.rpc_code();
        (code, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_codes() {
        assert_eq!(NexusError::ParseError("x".into()).rpc_code(), PARSE_ERROR);
        assert_eq!(NexusError::MethodNotFound("x".into()).rpc_code(), METHOD_NOT_FOUND);
        assert_eq!(NexusError::ToolNotFound("x".into()).rpc_code(), SERVER_ERROR);
        assert_eq!(
            NexusError::Internal(anyhow::anyhow!("boom")).rpc_code(),
            INTERNAL_ERROR
        );
    }

    #[test]
    fn test_into_rpc_keeps_message() {
        let (code, msg) = NexusError::InvalidParams("path is required".into()).into_rpc();
        assert_eq!(code, INVALID_PARAMS);
        assert_eq!(msg, "Invalid params: path is required");

        let (code, msg) = NexusError::MethodNotFound("prompts/list".into()).into_rpc();
        assert_eq!(code, METHOD_NOT_FOUND);
        assert_eq!(msg, "Method not found");
    }
}
