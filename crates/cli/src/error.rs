//! CLI error types.

use std::fmt;

use error_stack::Report;
use hb_transform_common::error::TransformError;

#[derive(Debug)]
pub enum CliError {
    /// Settings could not be loaded or validated
    Config(String),
    /// IO error
    Io(std::io::Error),
    /// Input or output JSON error
    Json(String),
    /// Error raised by the transformation engine
    Transform(Report<TransformError>),
}

impl CliError {
    /// Process exit code: 2 for input problems, 3 for engine failures.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Json(_) => 2,
            CliError::Io(_) => 1,
            CliError::Transform(report) => {
                if report.current_context().status_code().is_client_error() {
                    2
                } else {
                    3
                }
            }
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Io(err) => write!(f, "IO error: {}", err),
            CliError::Json(msg) => write!(f, "JSON error: {}", msg),
            CliError::Transform(report) => write!(f, "{}", report.current_context()),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Json(err.to_string())
    }
}

impl From<Report<TransformError>> for CliError {
    fn from(report: Report<TransformError>) -> Self {
        CliError::Transform(report)
    }
}
