use thiserror::Error;

/// Coarse classification of a failure, surfaced to the caller alongside the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Business,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Server responded with HTTP {status}")]
    Http { status: u16 },

    #[error("Response has no body")]
    MissingBody,

    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Empty or missing output")]
    EmptyOutput,

    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("Body exceeds declared length of {expected} bytes")]
    BodyOverrun { expected: u64 },

    #[error("API returned error {code}: {message}")]
    Business { code: i64, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl AppError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AppError::Network(_)
            | AppError::LengthMismatch { .. }
            | AppError::BodyOverrun { .. } => FailureKind::Network,
            AppError::Http { .. }
            | AppError::MissingBody
            | AppError::Business { .. }
            | AppError::InvalidResponse(_) => FailureKind::Business,
            AppError::Io(_) | AppError::EmptyOutput => FailureKind::Unknown,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => AppError::Http {
                status: status.as_u16(),
            },
            None if e.is_decode() => AppError::InvalidResponse(e.to_string()),
            None => AppError::Network(e.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

/// Failure reported by a [`Launcher`](super::Launcher).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("No component can handle {0}")]
    NotResolved(String),

    #[error("Launch failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentParseError {
    #[error("Not an intent URI")]
    NotIntent,

    #[error("Intent URI is missing the `end` terminator")]
    Unterminated,

    #[error("Malformed intent component: {0}")]
    Malformed(String),
}
