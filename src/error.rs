//! Error types for the reading intake.

use std::time::Duration;

use crate::intake::stage::IntakeStage;

/// Top-level error type for the intake service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Row-store and local storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {id}")]
    NotFound { id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content-generation collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("No API key configured for {provider}")]
    NotConfigured { provider: String },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Generation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A per-stage precondition that is not yet met.
///
/// These never abort the flow; the front end keeps "continue" disabled and
/// may show the message inline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please tell us your name")]
    MissingName,

    #[error("Please enter your birth date")]
    MissingBirthDate,

    #[error("Please enter a valid birth date (YYYY-MM-DD)")]
    MalformedBirthDate,

    #[error("Please enter a valid birth year (after 1900)")]
    BirthYearOutOfRange { year: i32 },

    #[error("Please choose a reading category")]
    MissingCategory,

    #[error("Please choose one of the options")]
    MissingSubSelection,

    #[error("Please tell us whether someone else is involved")]
    MissingPartnerChoice,

    #[error("Please enter their name and birth date")]
    MissingPartnerDetails,

    #[error("Please describe your situation in a little more detail")]
    SituationTooShort,

    #[error("Please enter a valid email address")]
    MalformedEmail,
}

/// Intake controller errors.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Stage {stage} is not complete: {source}")]
    Incomplete {
        stage: IntakeStage,
        #[source]
        source: ValidationError,
    },

    #[error("A stage transition is already in progress")]
    TransitionInProgress,

    #[error("Partner choice is only accepted at the partner question, not at {stage}")]
    NotAtPartnerQuery { stage: IntakeStage },
}

/// Result type alias for the intake service.
pub type Result<T> = std::result::Result<T, Error>;
