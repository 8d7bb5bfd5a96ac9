use thiserror::Error;

use crate::plan::PlanError;

/// Error taxonomy for migration runs.
///
/// Script-level variants always carry the ID of the migration that failed.
/// Statement positions are 1-based.
#[derive(Error, Debug)]
pub enum ShiftError {
    /// The datastore session could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed migration script. Never retried.
    #[error("Syntax error in migration {id}{}: {message}", at_statement(.statement))]
    Syntax {
        id: String,
        statement: Option<usize>,
        message: String,
    },

    /// The script references missing objects or breaks a constraint.
    #[error("Constraint violation in migration {id}{}: {message}", at_statement(.statement))]
    ConstraintViolation {
        id: String,
        statement: Option<usize>,
        message: String,
    },

    /// Transient datastore failure (lost connection, timeout, cancellation, serialization).
    /// The whole call may be retried.
    #[error("Connectivity error{}: {message}", for_migration(.id))]
    Connectivity { id: Option<String>, message: String },

    #[error("Migration {0} is already applied")]
    AlreadyApplied(String),

    #[error("Migration {0} is not applied")]
    NotApplied(String),

    /// Down requested for a migration that has no down script.
    #[error("Migration {0} has no down script and cannot be reverted")]
    Irreversible(String),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// The classifier could not map the failure. The message is the datastore's own.
    #[error("Unknown error{}: {message}", for_migration(.id))]
    Unknown { id: Option<String>, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShiftError {
    /// Whether the failed call can be retried as a whole.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ShiftError::Connectivity { .. })
    }

    /// The migration the error belongs to, if any.
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            ShiftError::Syntax { id, .. } | ShiftError::ConstraintViolation { id, .. } => {
                Some(id.as_str())
            }
            ShiftError::AlreadyApplied(id)
            | ShiftError::NotApplied(id)
            | ShiftError::Irreversible(id) => Some(id.as_str()),
            ShiftError::Connectivity { id, .. } | ShiftError::Unknown { id, .. } => id.as_deref(),
            _ => None,
        }
    }
}

fn at_statement(statement: &Option<usize>) -> String {
    match statement {
        Some(n) => format!(" (statement {})", n),
        None => String::new(),
    }
}

fn for_migration(id: &Option<String>) -> String {
    match id {
        Some(id) => format!(" in migration {}", id),
        None => String::new(),
    }
}

/// Result type alias using ShiftError.
pub type Result<T> = std::result::Result<T, ShiftError>;
