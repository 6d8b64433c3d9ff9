//! # Error Types
//!
//! Central error enum for the orchestration core. Background paths (webhook
//! processing, dispatcher iterations) catch and log these rather than letting
//! them escape; the management surface maps them to HTTP status codes in
//! `web::errors`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("State transition error: {0}")]
    StateTransition(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for MeshError {
    fn from(err: reqwest::Error) -> Self {
        MeshError::Transport(err.to_string())
    }
}

impl MeshError {
    /// Whether this error class is expected to clear on retry without
    /// intervention (provider/transport hiccups rather than caller mistakes).
    pub fn is_transient(&self) -> bool {
        matches!(self, MeshError::Agent(_) | MeshError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_class_prefix() {
        let err = MeshError::StateTransition("cannot launch from 'completed'".to_string());
        assert_eq!(
            err.to_string(),
            "State transition error: cannot launch from 'completed'"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(MeshError::Agent("timeout".into()).is_transient());
        assert!(MeshError::Transport("503".into()).is_transient());
        assert!(!MeshError::Validation("empty name".into()).is_transient());
        assert!(!MeshError::NotFound("campaign".into()).is_transient());
    }
}
