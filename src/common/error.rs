//! Common Error Types for the Casino Backend
//!
//! Provides unified error handling across all modules. The per-domain
//! enums (`StorageError`, `SessionError`, `LedgerError`) fold into this
//! root type at the binary and service-glue level; HTTP handlers map the
//! domain enums to response codes directly.

use thiserror::Error;

/// Root error type for the casino backend
#[derive(Debug, Error)]
pub enum CasinoError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Logging errors
    #[error("logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    /// Storage errors
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Session registry errors
    #[error("session error: {0}")]
    Session(#[from] crate::session::SessionError),

    /// Ledger errors
    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),

    /// Outbound provider call errors
    #[error("provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),

    /// Internal errors
    #[error("internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CasinoError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            CasinoError::Config(_) => "CONFIG_ERROR",
            CasinoError::Logging(_) => "LOGGING_ERROR",
            CasinoError::Storage(_) => "STORAGE_ERROR",
            CasinoError::Session(e) => e.code(),
            CasinoError::Ledger(e) => e.code(),
            CasinoError::Provider(_) => "CASINO_API_ERROR",
            CasinoError::Internal(_) => "INTERNAL_ERROR",
            CasinoError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias using CasinoError
pub type Result<T> = std::result::Result<T, CasinoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CasinoError::internal("boom");
        assert!(err.to_string().contains("boom"));
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }
}
