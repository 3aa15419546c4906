use thiserror::Error;

/// Main error type for chatseal
#[derive(Error, Debug)]
pub enum E2eeError {
    // Key custody errors
    #[error("Key pair generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Sealing private key failed: {0}")]
    SealFailed(String),

    /// Wrong password or corrupted envelope. Deliberately carries no detail.
    #[error("Unable to unseal private key")]
    UnsealFailed,

    // Message cipher errors
    #[error("Unable to decrypt message")]
    MessageDecryptionFailed,

    #[error("Plaintext too large: {len} bytes exceeds the {max} byte limit")]
    PlaintextTooLarge { len: usize, max: usize },

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    // Account errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account already exists: {0}")]
    AccountExists(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Storage / encoding errors
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result type alias for chatseal operations
pub type E2eeResult<T> = Result<T, E2eeError>;

impl E2eeError {
    /// Whether the user may retry the same flow with different input
    /// (a corrected password, a shorter message, another recipient).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            E2eeError::UnsealFailed
                | E2eeError::MessageDecryptionFailed
                | E2eeError::PlaintextTooLarge { .. }
                | E2eeError::InvalidCredentials
                | E2eeError::AccountExists(_)
                | E2eeError::UnknownAccount(_)
                | E2eeError::InvalidInput(_)
        )
    }
}

impl From<rusqlite::Error> for E2eeError {
    fn from(err: rusqlite::Error) -> Self {
        E2eeError::Database(err.to_string())
    }
}

impl From<base64::DecodeError> for E2eeError {
    fn from(err: base64::DecodeError) -> Self {
        E2eeError::Encoding(format!("Base64 decode error: {}", err))
    }
}

impl From<tokio::task::JoinError> for E2eeError {
    fn from(err: tokio::task::JoinError) -> Self {
        E2eeError::Task(err.to_string())
    }
}
