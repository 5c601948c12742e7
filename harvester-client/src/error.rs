//! Error types for the backend client

use harvester_core::HarvesterError;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to a backend
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed (connection refused, timeout, TLS, ...)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The server answered with a non-success status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// The response body is not a well-formed document
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The document parsed but lacks a required element
    #[error("Missing element <{0}> in response")]
    MissingElement(String),

    /// The backend answered with its error element
    #[error("{0}")]
    Backend(String),

    /// Local file handling failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Downloaded archive is not a valid zip file
    #[error("Invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }

    /// Whether retrying the same request later may succeed
    ///
    /// Only the project's own error element is a rejection. Any HTTP error
    /// status comes from the transport path (proxy, gateway, web server).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_)
            | Self::ApiError { .. }
            | Self::ParseError(_)
            | Self::MissingElement(_) => true,
            Self::Backend(_) | Self::Io(_) | Self::Archive(_) | Self::InternalError(_) => false,
        }
    }
}

impl From<ClientError> for HarvesterError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Backend(message) => HarvesterError::BackendApplication(message),
            ClientError::Io(_) | ClientError::Archive(_) => {
                HarvesterError::Retrieval(err.to_string())
            }
            err if err.is_transient() => HarvesterError::TransientTransport(err.to_string()),
            err => HarvesterError::BackendApplication(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ClientError::api_error(503, "maintenance").is_transient());
        assert!(ClientError::api_error(429, "slow down").is_transient());
        assert!(ClientError::api_error(404, "no handler").is_transient());
        assert!(ClientError::api_error(403, "forbidden").is_transient());
        assert!(ClientError::api_error(404, "no handler").is_client_error());
        assert!(ClientError::api_error(500, "boom").is_server_error());
    }

    #[test]
    fn test_conversion_into_taxonomy() {
        let err: HarvesterError = ClientError::Backend("bad authenticator".into()).into();
        assert_eq!(
            err,
            HarvesterError::BackendApplication("bad authenticator".into())
        );

        let err: HarvesterError = ClientError::ParseError("truncated".into()).into();
        assert!(matches!(err, HarvesterError::TransientTransport(_)));

        let err: HarvesterError = ClientError::api_error(403, "forbidden").into();
        assert!(matches!(err, HarvesterError::TransientTransport(_)));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HarvesterError = ClientError::Io(io).into();
        assert!(matches!(err, HarvesterError::Retrieval(_)));
    }
}
