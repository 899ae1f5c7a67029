use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to find PoW solution after {attempts} attempts")]
    PowExhausted { attempts: u64 },

    #[error("Invalid PoW difficulty {0}: must be at most 64 hex digits")]
    InvalidDifficulty(u32),

    #[error("Invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("Encryption failed")]
    EncryptFailed,

    #[error("Decryption failed: wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("Venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Trade attempt cancelled")]
    Cancelled,

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures reported by an execution venue when submitting an order.
#[derive(Error, Debug)]
pub enum VenueError {
    #[error("order rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("venue unavailable: {0}")]
    Unavailable(String),
}

impl ArbError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn feed_error(msg: impl Into<String>) -> Self {
        Self::Feed(msg.into())
    }

    /// Short machine-friendly tag used in reports and the trade journal.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::PowExhausted { .. } => "pow_exhausted",
            Self::InvalidDifficulty(_) => "invalid_difficulty",
            Self::InvalidKeySize { .. } => "invalid_key_size",
            Self::EncryptFailed => "encrypt_failed",
            Self::DecryptFailed => "decrypt_failed",
            Self::Venue(_) => "venue",
            Self::Feed(_) => "feed",
            Self::Cancelled => "cancelled",
            Self::TaskFailed(_) => "task_failed",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<reqwest::Error> for VenueError {
    fn from(err: reqwest::Error) -> Self {
        VenueError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ArbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_errors_convert_into_arb_error() {
        let err: ArbError = VenueError::Unavailable("maintenance".into()).into();
        assert_eq!(err.kind(), "venue");
        assert_eq!(err.to_string(), "Venue error: venue unavailable: maintenance");
    }

    #[test]
    fn pow_exhausted_mentions_attempts() {
        let err = ArbError::PowExhausted { attempts: 1_000_000 };
        assert!(err.to_string().contains("1000000"));
    }
}
