//! Error types for the application

use thiserror::Error;

/// Result type alias using our RadarError
pub type Result<T> = std::result::Result<T, RadarError>;

/// Coarse classification of an error, used by callers to decide how to
/// render or handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller (never retried)
    Validation,
    /// Unknown user, asset or alert
    NotFound,
    /// Operation not allowed in the entity's current state
    InvalidState,
    /// Upstream market data failure
    ExternalFetch,
    /// Notification publish or relay failure
    Delivery,
    /// Storage, configuration and other infrastructure failures
    Infrastructure,
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum RadarError {
    /// Request failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Upstream page/batch request failed
    #[error("External fetch error (status {status:?}): {message}")]
    ExternalFetch {
        status: Option<u16>,
        message: String,
    },

    /// Publish or relay failure
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Persistent store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RadarError {
    pub fn validation(message: impl Into<String>) -> Self {
        RadarError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        RadarError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RadarError::Validation(_) => ErrorKind::Validation,
            RadarError::NotFound { .. } => ErrorKind::NotFound,
            RadarError::InvalidState(_) => ErrorKind::InvalidState,
            RadarError::ExternalFetch { .. } | RadarError::HttpRequest(_) => {
                ErrorKind::ExternalFetch
            }
            RadarError::Delivery(_) => ErrorKind::Delivery,
            RadarError::JsonParse(_)
            | RadarError::Storage(_)
            | RadarError::Configuration(_)
            | RadarError::Internal(_) => ErrorKind::Infrastructure,
        }
    }

    /// Whether the error is meant to be shown to the end user
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::InvalidState
        )
    }
}

impl From<sqlx::Error> for RadarError {
    fn from(err: sqlx::Error) -> Self {
        RadarError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for RadarError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        RadarError::Storage(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RadarError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RadarError::Delivery(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_kinds() {
        assert!(RadarError::validation("Must be positive!").is_user_facing());
        assert!(RadarError::not_found("alert", 7).is_user_facing());
        assert!(RadarError::InvalidState("triggered".into()).is_user_facing());

        let fetch = RadarError::ExternalFetch {
            status: Some(429),
            message: "rate limited".into(),
        };
        assert_eq!(fetch.kind(), ErrorKind::ExternalFetch);
        assert!(!fetch.is_user_facing());
        assert!(!RadarError::Delivery("closed".into()).is_user_facing());
    }

    #[test]
    fn test_not_found_message() {
        let err = RadarError::not_found("asset", "bitcoin");
        assert_eq!(err.to_string(), "asset not found: bitcoin");
    }
}
