use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Generic = 1,
    Usage = 3,
    Network = 4,
    Status = 5,
    Stream = 6,
    Attachment = 7,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Attachment(String),
    #[error("{0}")]
    Network(String),
    /// The backend answered with a non-success status.
    #[error("{0}")]
    Status(String),
    /// The response body could not be opened or read.
    #[error("{0}")]
    Stream(String),
    #[error("{0}")]
    Generic(String),
    /// Already shown to the user; only its exit code is left to apply.
    #[error("{0}")]
    Reported(Box<CliError>),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => ExitCode::Usage as i32,
            CliError::Attachment(_) => ExitCode::Attachment as i32,
            CliError::Network(_) => ExitCode::Network as i32,
            CliError::Status(_) => ExitCode::Status as i32,
            CliError::Stream(_) => ExitCode::Stream as i32,
            CliError::Generic(_) => ExitCode::Generic as i32,
            CliError::Reported(inner) => inner.exit_code(),
        }
    }

    pub fn is_reported(&self) -> bool {
        matches!(self, CliError::Reported(_))
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        CliError::Generic(format!("I/O error: {value}"))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        CliError::Generic(format!("JSON error: {value}"))
    }
}

impl From<url::ParseError> for CliError {
    fn from(value: url::ParseError) -> Self {
        CliError::Usage(format!("Invalid URL: {value}"))
    }
}

impl From<reqwest::Error> for CliError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return CliError::Network("Request timed out.".to_string());
        }
        if value.is_body() || value.is_decode() {
            return CliError::Stream(format!("Failed reading response body: {value}"));
        }
        CliError::Network(format!("Network request failed: {value}"))
    }
}

pub fn with_debug_hint(message: &str, debug: bool) -> String {
    if debug {
        return message.to_string();
    }
    format!("{message} (try --debug for details)")
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as i32)
    }
}
