//! Error types shared across the client core.
//!
//! Storage-layer helpers keep the `Result<_, String>` convention used by the
//! database module; everything that crosses into screen code gets a typed
//! error so callers can branch on the failure instead of parsing messages.

use thiserror::Error;

/// Failure talking to the stock backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("Cannot reach the stock server at {0}")]
    Unreachable(String),
    #[error("Connection to {0} timed out")]
    Timeout(String),
    #[error("Session expired or invalid credentials")]
    Unauthorized,
    #[error("Not allowed: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },
    #[error("Invalid response from stock server: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
}

impl ApiError {
    /// `true` when the backend rejected the session token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// Rejection of an edit by the working-list controller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ListError {
    #[error("Line {0} is not in this list")]
    LineNotFound(String),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("{unit} products only accept whole quantities")]
    FractionalQuantity { unit: String },
    #[error("Only {available} in stock (requested {requested})")]
    ExceedsAvailable { available: f64, requested: f64 },
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}

/// Validation failure detected before any submission request is sent.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubmitError {
    #[error("The list is empty")]
    EmptyList,
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("No line has a quantity greater than zero")]
    NothingToSubmit,
}

/// Startup failure of the application bundle.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("database: {0}")]
    Database(String),
    #[error("http client: {0}")]
    HttpClient(String),
    #[error("configuration: {0}")]
    Config(String),
}
