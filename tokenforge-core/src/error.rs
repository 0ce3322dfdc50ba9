use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::findings::SecurityValidationResult;
use crate::id::TokenId;
use crate::status::TokenStatus;

/// Represents all possible errors that can occur when talking to a record store
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO errors that occur when reading/writing files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Database errors that occur with the underlying storage backend
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Errors related to missing rows
    #[error("Not found: {0}")]
    NotFound(String),

    /// A row with the same primary key already exists
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Generic errors that don't fit in other categories
    #[error("Other error: {0}")]
    Other(String),

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound("Row not found".to_string()),
            _ => StorageError::Database(err.to_string()),
        }
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        StorageError::Other(err)
    }
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        StorageError::Other(err.to_string())
    }
}

/// What went wrong with a single form or storage field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldProblem {
    /// A required field was absent or empty
    Missing,
    /// The value was present but malformed or out of bounds
    Invalid(String),
}

/// A problem attached to a field path such as `feeRecipient` or
/// `assetAllocations[1].percentage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub problem: FieldProblem,
}

impl FieldIssue {
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: FieldProblem::Missing,
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: FieldProblem::Invalid(reason.into()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.problem, FieldProblem::Missing)
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            FieldProblem::Missing => write!(f, "{}: required", self.field),
            FieldProblem::Invalid(reason) => write!(f, "{}: {}", self.field, reason),
        }
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by the token engine to its callers
#[derive(Error, Debug)]
pub enum TokenError {
    /// Form or storage data references a standard that is not registered
    #[error("Unknown token standard: {0:?}")]
    UnknownStandard(String),

    /// Required fields for the standard are missing after mapping
    #[error("Required fields missing: {}", .fields.join(", "))]
    FieldMappingIncomplete { fields: Vec<String> },

    /// One or more fields failed a bounded-decimal, address or shape check
    #[error("Validation failed: {}", join_issues(.issues))]
    ValidationFailed { issues: Vec<FieldIssue> },

    /// The requested status edge is not in the lifecycle table
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: TokenStatus, to: TokenStatus },

    /// The edge exists but may only be taken by the deployment orchestrator
    #[error("Transition from {from} to {to} is only performed by a deployment")]
    TransitionReserved { from: TokenStatus, to: TokenStatus },

    /// A status string could not be normalized to a lifecycle state
    #[error("Unknown token status: {0:?}")]
    UnknownStatus(String),

    /// The stored status no longer matches the status the caller observed
    #[error("Token {token_id} was modified concurrently: expected {expected}, found {actual}")]
    ConcurrentModification {
        token_id: TokenId,
        expected: TokenStatus,
        actual: String,
    },

    /// The validation gate reported blocking findings and no override was given
    #[error("Deployment blocked by {} validation finding(s)", .report.findings.len())]
    DeploymentBlocked { report: SecurityValidationResult },

    /// The external deployer reported a failure or timed out
    #[error("Deployer failure: {0}")]
    DeployerFailure(String),

    /// Deployment validation was requested outside the MINTED state
    #[error("Deployment validation requires a MINTED token, found {status}")]
    ValidationNotApplicable { status: TokenStatus },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored rows contradict the token model (wrong extension tag, duplicates)
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TokenError {
    /// Build the error for a set of collected field issues.
    ///
    /// Pure omissions become `FieldMappingIncomplete`; as soon as one value is
    /// malformed every issue is reported together as `ValidationFailed`.
    pub fn from_issues(issues: Vec<FieldIssue>) -> Self {
        if issues.iter().all(FieldIssue::is_missing) {
            TokenError::FieldMappingIncomplete {
                fields: issues.into_iter().map(|issue| issue.field).collect(),
            }
        } else {
            TokenError::ValidationFailed { issues }
        }
    }
}

impl From<serde_json::Error> for TokenError {
    fn from(err: serde_json::Error) -> Self {
        TokenError::Storage(StorageError::from(err))
    }
}

/// Result type for engine operations
pub type TokenResult<T> = Result<T, TokenError>;
