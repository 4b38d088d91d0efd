//! Error handling for the Relatics client

use thiserror::Error;

/// Result type of the Relatics client
pub type Result<T> = std::result::Result<T, RelaticsError>;

/// Errors raised by the Relatics client
///
/// Errors reported by the remote service inside a valid response are not
/// raised: they are carried by `has_error`/`error_msg` of the result types.
#[derive(Error, Debug)]
pub enum RelaticsError {
    /// Token request refused (unknown client, wrong secret, disabled client)
    /// or answered without an access token
    #[error("Token request failed: {0}")]
    Auth(String),

    /// Invalid call arguments, detected before any network traffic
    #[error("Validation error: {0}")]
    Validation(String),

    /// SOAP Fault, unparsable answer or other transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),

    /// SOAP envelope error
    #[error("SOAP error: {0}")]
    Soap(#[from] rwssoap::SoapError),

    /// I/O error (data file, attachments, temporary archive)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip archive error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML generation error
    #[error("XML error: {0}")]
    Xml(String),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 decoding error
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Configuration error (anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

impl RelaticsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Checks whether the error was raised before any network call
    pub fn is_validation(&self) -> bool {
        matches!(self, RelaticsError::Validation(_))
    }
}
