//! Error types for the transformation engine.
//!
//! Data-quality problems inside `build` / `interpret` never surface as errors;
//! they are reported through [`crate::diagnostics`] and the offending item is
//! omitted. The variants below cover the failures that do cross an API
//! boundary: bad configuration, encoder failures and collaborator errors.

use derive_more::{Display, Error};
use http::StatusCode;

/// Errors raised by the transformation engine and its collaborators.
#[derive(Debug, Display, Error)]
pub enum TransformError {
    /// Settings could not be loaded, merged or validated.
    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// A bid request is missing parameters required by its exchange.
    #[display("Invalid bid request: {message}")]
    InvalidBidRequest { message: String },

    /// An exchange response could not be decoded.
    #[display("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// A wire payload could not be serialized.
    #[display("Serialization error: {message}")]
    Serialization { message: String },

    /// An adapter failed while encoding a batch.
    #[display("Adapter error: {message}")]
    Adapter { message: String },

    /// A real-time data provider failed.
    #[display("RTD provider error: {message}")]
    Rtd { message: String },

    /// A user-ID submodule failed.
    #[display("User ID error: {message}")]
    UserId { message: String },
}

impl TransformError {
    /// HTTP-like status a host can use when reporting this failure.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration { .. } | Self::Serialization { .. } | Self::Adapter { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::InvalidBidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidResponse { .. } | Self::Rtd { .. } | Self::UserId { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}
