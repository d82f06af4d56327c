//! Failure taxonomy surfaced at the tool boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable class of a tool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials or settings absent at startup.
    ConfigurationMissing,
    /// Timeout, refused connection, DNS failure.
    TransientNetwork,
    /// Non-2xx response or an error payload from a provider.
    UpstreamError,
    /// Caller supplied something unusable (bad URL, nested metadata, ...).
    InvalidArgument,
    /// Anything else.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationMissing => write!(f, "configuration_missing"),
            Self::TransientNetwork => write!(f, "transient_network"),
            Self::UpstreamError => write!(f, "upstream_error"),
            Self::InvalidArgument => write!(f, "invalid_argument"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Errors raised by the service clients. They travel through `anyhow`
/// and are classified again at the tool boundary.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingConfig(_) => ErrorKind::ConfigurationMissing,
            Self::Network(_) => ErrorKind::TransientNetwork,
            Self::Upstream { .. } => ErrorKind::UpstreamError,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }
}

/// Classify an error by walking its cause chain.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(tool_err) = cause.downcast_ref::<ToolError>() {
            return tool_err.kind();
        }
        if let Some(http_err) = cause.downcast_ref::<reqwest::Error>() {
            if http_err.is_builder() {
                return ErrorKind::InvalidArgument;
            }
            if http_err.is_status() {
                return ErrorKind::UpstreamError;
            }
            if http_err.is_timeout() || http_err.is_connect() || http_err.is_request() {
                return ErrorKind::TransientNetwork;
            }
            if http_err.is_decode() || http_err.is_body() {
                return ErrorKind::UpstreamError;
            }
        }
    }
    ErrorKind::Internal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_tool_errors_through_context() {
        let err = anyhow::Error::new(ToolError::MissingConfig("GOOGLE_CSE_ID".into()))
            .context("search failed");
        assert_eq!(classify(&err), ErrorKind::ConfigurationMissing);

        let err = anyhow::Error::new(ToolError::Upstream {
            service: "chroma",
            status: 401,
            body: "unauthorized".into(),
        });
        assert_eq!(classify(&err), ErrorKind::UpstreamError);
        assert_eq!(err.to_string(), "chroma returned 401: unauthorized");
    }

    #[test]
    fn unknown_errors_are_internal() {
        let err = anyhow::anyhow!("something odd");
        assert_eq!(classify(&err), ErrorKind::Internal);
        assert_eq!(ErrorKind::Internal.to_string(), "internal");
    }
}
