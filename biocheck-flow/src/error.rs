use serde::{Deserialize, Serialize};
use std::fmt;

/// Codes surfaced to the host bridge on a terminal report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CameraPermissionDenied,
    CameraError,
    TokenError,
    TokenRequestError,
    TokenParseError,
    TokenNetworkError,
    ConfigError,
    Cancelled,
    ParseError,
    CredentialsNotConfigured,
    InvalidParams,
    InvalidCedula,
    InvalidCodDactilar,
    ValidationFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::CameraPermissionDenied => "CAMERA_PERMISSION_DENIED",
            ErrorCode::CameraError => "CAMERA_ERROR",
            ErrorCode::TokenError => "TOKEN_ERROR",
            ErrorCode::TokenRequestError => "TOKEN_REQUEST_ERROR",
            ErrorCode::TokenParseError => "TOKEN_PARSE_ERROR",
            ErrorCode::TokenNetworkError => "TOKEN_NETWORK_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::CredentialsNotConfigured => "CREDENTIALS_NOT_CONFIGURED",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::InvalidCedula => "INVALID_CEDULA",
            ErrorCode::InvalidCodDactilar => "INVALID_COD_DACTILAR",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal failure as the host bridge sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct FlowError {
    pub code: ErrorCode,
    pub message: String,
}

impl FlowError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("No camera available")]
    NoDevice,
    #[error("Could not access the camera: {0}")]
    Unavailable(String),
    #[error("Camera stream is not open")]
    NotStreaming,
    #[error("Frame capture failed: {0}")]
    Capture(String),
}

/// Failures of the token exchange. Each maps onto its own host-facing code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Could not obtain token (HTTP {0})")]
    Request(u16),
    #[error("Invalid token response: {0}")]
    Parse(String),
    #[error("Invalid token")]
    Missing,
}

impl TokenError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TokenError::Network(_) => ErrorCode::TokenNetworkError,
            TokenError::Request(_) => ErrorCode::TokenRequestError,
            TokenError::Parse(_) => ErrorCode::TokenParseError,
            TokenError::Missing => ErrorCode::TokenError,
        }
    }
}

impl From<TokenError> for FlowError {
    fn from(err: TokenError) -> Self {
        FlowError::new(err.code(), err.to_string())
    }
}

/// Failures of one biometric submission. These are never coded individually;
/// the display text is what the user sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Network error")]
    Network(String),
    #[error("{0}")]
    Declined(String),
    #[error("Server error")]
    Status(u16),
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Camera not active")]
    CameraInactive,
}
