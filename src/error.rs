//! Error types for chatrelay.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatRelayError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Required option missing: {field}")]
    ConfigMissing { field: String },

    // Session errors
    #[error("Authentication failed: {message}")]
    AuthFailure { message: String },

    #[error("Login credential incomplete, missing: {}", missing.join(", "))]
    IncompleteCredential { missing: Vec<&'static str> },

    #[error("Login surface error: {message}")]
    LoginSurface { message: String },

    // Delivery errors
    #[error("Failed to send chat message: {message}")]
    SendFailure { message: String },

    // Platform / HTTP errors
    #[error("Platform returned code {code}: {message}")]
    Platform { code: i64, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // Backend errors
    #[error("[{backend}] {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl ChatRelayError {
    /// True for failures that end an in-flight login or connect attempt.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ChatRelayError::AuthFailure { .. }
                | ChatRelayError::IncompleteCredential { .. }
                | ChatRelayError::ConfigMissing { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ChatRelayError>;
