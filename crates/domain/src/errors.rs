use derive_new::new;
use thiserror::Error;

/// Application error carrying the HTTP status it should be answered with.
///
/// Raised by handlers and business code; the status is a plain `u16` so the
/// domain stays free of any HTTP framework types.
#[derive(Error, Debug, Clone, PartialEq, Eq, new)]
#[error("{message}")]
pub struct AppError {
    status_code: u16,
    #[new(into)]
    message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, message)
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Discriminant of [`Error`], used by the HTTP layer to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Application,
    Schema,
    InvalidId,
    Unexpected,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    App(#[from] AppError),

    #[error("Schema validation failed: {details}")]
    Schema { details: String },

    #[error("Invalid identifier: {value}")]
    InvalidId { value: String },

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl Error {
    pub fn schema(details: impl Into<String>) -> Self {
        Self::Schema {
            details: details.into(),
        }
    }

    pub fn invalid_id(value: impl Into<String>) -> Self {
        Self::InvalidId {
            value: value.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::App(_) => ErrorKind::Application,
            Error::Schema { .. } => ErrorKind::Schema,
            Error::InvalidId { .. } => ErrorKind::InvalidId,
            Error::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}
