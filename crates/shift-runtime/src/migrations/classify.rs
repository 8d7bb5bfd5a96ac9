//! Error classification.
//!
//! The only place that looks at Postgres SQLSTATE codes. Everything above this
//! module works with [`ShiftError`] variants.

use std::fmt;

use shift_core::error::ShiftError;

/// Transport-level shape of a datastore failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The server rejected a statement and returned an error code.
    Database,
    /// The socket or TLS layer failed.
    Io,
    /// Waiting for the session timed out.
    Timeout,
    /// The session was closed underneath the call.
    Closed,
    /// Anything else the driver reported (decoding, protocol, configuration).
    Other,
}

/// A datastore failure reduced to what classification needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreFailure {
    pub kind: FailureKind,
    /// SQLSTATE, when the server sent one.
    pub code: Option<String>,
    pub message: String,
}

impl DatastoreFailure {
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Database,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }
}

impl From<&sqlx::Error> for DatastoreFailure {
    fn from(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => Self {
                kind: FailureKind::Database,
                code: db.code().map(|c| c.into_owned()),
                message: db.message().to_string(),
            },
            sqlx::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                Self::new(FailureKind::Timeout, io.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => Self::new(FailureKind::Io, err.to_string()),
            sqlx::Error::PoolTimedOut => Self::new(FailureKind::Timeout, err.to_string()),
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                Self::new(FailureKind::Closed, err.to_string())
            }
            _ => Self::new(FailureKind::Other, err.to_string()),
        }
    }
}

impl From<sqlx::Error> for DatastoreFailure {
    fn from(err: sqlx::Error) -> Self {
        Self::from(&err)
    }
}

/// Where in a migration step the failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Opening the step transaction.
    Begin,
    /// Reading the ledger (membership check or listing).
    LedgerRead,
    /// The n-th statement of the script (1-based).
    Statement(usize),
    /// Inserting or deleting the ledger row.
    LedgerWrite,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Begin => f.write_str("begin"),
            Stage::LedgerRead => f.write_str("ledger read"),
            Stage::Statement(n) => write!(f, "statement {}", n),
            Stage::LedgerWrite => f.write_str("ledger write"),
            Stage::Commit => f.write_str("commit"),
        }
    }
}

/// Coarse meaning of a SQLSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Syntax,
    Constraint,
    UniqueViolation,
    Transient,
    Unrecognized,
}

fn categorize(code: &str) -> Category {
    match code {
        "23505" => Category::UniqueViolation,
        // undefined/duplicate objects, datatype mismatch, dependent objects, invalid schema
        "42P01" | "42703" | "42704" | "42883" | "42P07" | "42701" | "42710" | "42P06"
        | "42804" | "2BP01" | "3F000" => Category::Constraint,
        // lost connection, shutdown, cancellation, resource exhaustion, serialization
        "57P01" | "57P02" | "57P03" | "57014" | "53300" | "40001" | "40P01" => Category::Transient,
        // insufficient privilege is an access rule, not a malformed script
        "42501" => Category::Unrecognized,
        _ => match code.get(..2).unwrap_or(code) {
            "42" => Category::Syntax,
            "23" => Category::Constraint,
            "08" => Category::Transient,
            _ => Category::Unrecognized,
        },
    }
}

/// Maps datastore failures into the engine's error taxonomy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a failure that happened at `stage`.
    ///
    /// Without a migration ID (plain ledger queries) script-level categories
    /// can not be attributed to an author and come back as `Unknown`.
    pub fn classify(&self, failure: &DatastoreFailure, id: Option<&str>, stage: Stage) -> ShiftError {
        let category = match failure.kind {
            FailureKind::Database => failure
                .code
                .as_deref()
                .map(categorize)
                .unwrap_or(Category::Unrecognized),
            FailureKind::Io | FailureKind::Timeout | FailureKind::Closed => Category::Transient,
            FailureKind::Other => Category::Unrecognized,
        };

        let statement = match stage {
            Stage::Statement(n) => Some(n),
            _ => None,
        };
        let message = failure.message.clone();

        match (category, id) {
            (Category::Transient, id) => ShiftError::Connectivity {
                id: id.map(String::from),
                message,
            },
            (Category::UniqueViolation, Some(id)) if stage == Stage::LedgerWrite => {
                ShiftError::AlreadyApplied(id.to_string())
            }
            (Category::Syntax, Some(id)) => ShiftError::Syntax {
                id: id.to_string(),
                statement,
                message,
            },
            (Category::Constraint | Category::UniqueViolation, Some(id)) => {
                ShiftError::ConstraintViolation {
                    id: id.to_string(),
                    statement,
                    message,
                }
            }
            (_, id) => ShiftError::Unknown {
                id: id.map(String::from),
                message: match failure.code.as_deref() {
                    Some(code) => format!("{} (SQLSTATE {}, during {})", message, code, stage),
                    None => format!("{} (during {})", message, stage),
                },
            },
        }
    }

    /// Classify a raw driver error.
    pub fn classify_sqlx(&self, err: &sqlx::Error, id: Option<&str>, stage: Stage) -> ShiftError {
        self.classify(&DatastoreFailure::from(err), id, stage)
    }

    /// Whether a failed `CREATE ... IF NOT EXISTS` lost a race with another
    /// process creating the same object. Postgres reports this as a unique
    /// violation on its catalog or as a duplicate object.
    pub fn is_concurrent_create(&self, failure: &DatastoreFailure) -> bool {
        matches!(failure.code.as_deref(), Some("23505" | "42P07" | "42710"))
    }
}
