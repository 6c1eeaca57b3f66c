use thiserror::Error;

/// Main error type for the trading agent
#[derive(Error, Debug)]
pub enum TraderError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config source error: {0}")]
    Config(#[from] config::ConfigError),

    // Action / state errors
    #[error("Invalid action index: {index} (supported: 0..{max})")]
    InvalidAction { index: usize, max: usize },

    #[error("State shape mismatch: expected {expected}, got {actual}")]
    StateShapeMismatch { expected: usize, actual: usize },

    // Data errors
    #[error("Invalid feature data: {0}")]
    Data(String),

    // Model / backend errors
    #[error("Model error: {0}")]
    Model(String),

    // Persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TraderError {
    /// Shorthand for a configuration failure
    pub fn config(msg: impl Into<String>) -> Self {
        TraderError::Configuration(msg.into())
    }

    /// Whether this error was raised while validating construction inputs
    pub fn is_configuration(&self) -> bool {
        matches!(self, TraderError::Configuration(_) | TraderError::Config(_))
    }
}

/// Result type alias for TraderError
pub type Result<T> = std::result::Result<T, TraderError>;
