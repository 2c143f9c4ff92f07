//! Error taxonomy for curriculum optimization.
//!
//! Only genuinely exceptional conditions live here. Cycles, non-atomic nodes,
//! budget exhaustion and planner stalls are ordinary outcomes reported through
//! diagnostics or stop reasons.

use serde::{Deserialize, Serialize};

/// Errors produced while talking to collaborators or persisting artifacts.
#[derive(Debug, thiserror::Error)]
pub enum CurriculaError {
    #[error("schema violation in {stage} response: {detail}")]
    SchemaViolation { stage: String, detail: String },

    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("{stage} call timed out after {timeout_ms}ms")]
    ProviderTimeout { stage: String, timeout_ms: u64 },

    #[error("{stage} provider unavailable: {detail}")]
    ProviderUnavailable { stage: String, detail: String },

    #[error("incompatible artifact schema: found {found}, expected {expected}")]
    IncompatibleSchema { found: String, expected: String },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CurriculaError {
    /// Stable machine-readable code recorded in the trace when a run aborts.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SchemaViolation { .. } => ErrorCode::SchemaViolation,
            Self::ContractViolation(_) => ErrorCode::ContractViolation,
            Self::ProviderTimeout { .. } => ErrorCode::ProviderTimeout,
            Self::ProviderUnavailable { .. } => ErrorCode::ProviderUnavailable,
            Self::IncompatibleSchema { .. } | Self::DigestMismatch { .. } => {
                ErrorCode::ArtifactIntegrity
            }
            Self::Config(_) | Self::Toml(_) => ErrorCode::Config,
            Self::Serialization(_) | Self::Io(_) => ErrorCode::Internal,
        }
    }

    /// Whether a collaborator call that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SchemaViolation { .. }
                | Self::ProviderTimeout { .. }
                | Self::ProviderUnavailable { .. }
        )
    }
}

/// Machine-readable error codes carried by terminal trace records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SchemaViolation,
    ContractViolation,
    ProviderTimeout,
    ProviderUnavailable,
    ArtifactIntegrity,
    Config,
    Internal,
}

/// Result type for curriculum operations.
pub type Result<T> = std::result::Result<T, CurriculaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_violation_display() {
        let err = CurriculaError::SchemaViolation {
            stage: "proposer".to_string(),
            detail: "missing field `nodes`".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("proposer"));
        assert!(msg.contains("missing field"));
        assert_eq!(err.code(), ErrorCode::SchemaViolation);
    }

    #[test]
    fn test_retryable_classification() {
        let timeout = CurriculaError::ProviderTimeout {
            stage: "critic".to_string(),
            timeout_ms: 100,
        };
        assert!(timeout.is_retryable());
        assert!(!CurriculaError::Config("bad".to_string()).is_retryable());
        assert!(!CurriculaError::ContractViolation("x".to_string()).is_retryable());
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = CurriculaError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
        assert_eq!(err.code(), ErrorCode::ArtifactIntegrity);
    }
}
