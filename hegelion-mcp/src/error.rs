//! Server-side error types with JSON-RPC error codes.

/// Errors that can occur while serving the protocol.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("JSON-RPC parse error: {message}")]
    ParseError { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("method not found: {method}")]
    MethodNotFound { method: String },

    #[error("invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("internal error: {message}")]
    InternalError { message: String },

    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("transport error: {message}")]
    TransportError { message: String },

    #[error("server not initialized")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// The JSON-RPC 2.0 error code for this error.
    pub fn error_code(&self) -> i64 {
        match self {
            ServerError::ParseError { .. } => -32700,
            ServerError::InvalidRequest { .. } => -32600,
            ServerError::MethodNotFound { .. } => -32601,
            ServerError::InvalidParams { .. } => -32602,
            ServerError::InternalError { .. } | ServerError::Io(_) => -32603,
            ServerError::UnknownTool { .. } => -32000,
            ServerError::TransportError { .. } => -32002,
            ServerError::NotInitialized => -32003,
        }
    }
}
