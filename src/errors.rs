//! Error types for the Void Collector economy service
//!
//! Every fallible operation in the crate returns [`VoidResult`]. Policy denials carry
//! a stable reason code so the HTTP layer can map them without string matching.

use crate::{limits::LimitDenial, payout::PayoutError};
use thiserror::Error;

/// Root error type for all economy operations
#[derive(Debug, Error)]
pub enum VoidError {
    /// Requested entity does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Missing or malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Rate limit, cooldown or balance denial
    #[error("Denied: {0}")]
    Denied(LimitDenial),

    /// Subject or wallet is on the block list. Permanent.
    #[error("Account suspended")]
    AccountSuspended,

    /// Idempotency key was already consumed
    #[error("Duplicate transaction reference: {0}")]
    DuplicateTransaction(String),

    /// Withdrawal state machine refused the move
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Numeric write above the configured ceiling
    #[error("Value {value} for {field} exceeds the allowed maximum")]
    ValueOutOfRange { field: String, value: i128 },

    /// Debit would take a counter below zero
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Mission {0} already claimed today")]
    MissionAlreadyClaimed(String),

    #[error("Mission {mission} incomplete: {progress}/{target}")]
    MissionIncomplete { mission: String, progress: u64, target: u64 },

    #[error("Vote limit reached for poll {poll_id} ({max} votes)")]
    VoteLimitReached { poll_id: String, max: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Payout error: {0}")]
    Payout(#[from] PayoutError),

    /// A blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

/// Storage system errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// Lock contention that outlived the retry budget. Retryable.
    #[error("Storage busy: {0}")]
    Busy(String),
}

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

impl VoidError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        match self {
            VoidError::Denied(denial) => denial.retry_at.is_some(),
            VoidError::Storage(StorageError::Busy(_)) => true,
            VoidError::Payout(e) => e.is_retryable(),
            _ => false,
        }
    }
}

// External error conversions
impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind;
        match e.kind() {
            ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
                StorageError::Busy(e.to_string())
            }
            ErrorKind::Corruption => StorageError::CorruptedData(e.to_string()),
            _ => StorageError::WriteFailed(e.to_string()),
        }
    }
}

impl From<rocksdb::Error> for VoidError {
    fn from(e: rocksdb::Error) -> Self {
        VoidError::Storage(e.into())
    }
}

impl From<std::io::Error> for VoidError {
    fn from(e: std::io::Error) -> Self {
        VoidError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl From<tokio::task::JoinError> for VoidError {
    fn from(e: tokio::task::JoinError) -> Self {
        VoidError::TaskFailed(e.to_string())
    }
}

/// Convenience type alias for Results
pub type VoidResult<T> = Result<T, VoidError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{DenialReason, LimitScope};
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = VoidError::InsufficientBalance {
            required: 75_000,
            available: 10,
        };
        assert!(err.to_string().contains("required 75000"));
        assert!(err.to_string().contains("available 10"));
    }

    #[test]
    fn test_error_source_chain() {
        let err: VoidError = StorageError::ReadFailed("disk".to_string()).into();
        assert!(err.source().is_some());
        assert!(err.to_string().contains("Storage error"));
    }

    #[test]
    fn test_retryable_classification() {
        let cooldown = VoidError::Denied(LimitDenial {
            reason: DenialReason::PersonalCooldown,
            scope: LimitScope::User,
            retry_at: Some(chrono::Utc::now()),
        });
        assert!(cooldown.is_retryable());
        assert!(!VoidError::AccountSuspended.is_retryable());
        assert!(VoidError::Storage(StorageError::Busy("lock".into())).is_retryable());
    }
}
