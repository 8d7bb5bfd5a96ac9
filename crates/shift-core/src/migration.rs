use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A versioned unit of schema change.
///
/// IDs sort lexically in application order; the usual convention is a
/// timestamp prefix such as `201610041422_init`. A migration without a down
/// script is irreversible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    id: String,
    up: String,
    down: Option<String>,
}

impl Migration {
    /// Create an irreversible migration.
    pub fn new(id: impl Into<String>, up: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            up: up.into(),
            down: None,
        }
    }

    /// Attach a down script.
    pub fn with_down(mut self, down: impl Into<String>) -> Self {
        self.down = Some(down.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn up(&self) -> &str {
        &self.up
    }

    pub fn down(&self) -> Option<&str> {
        self.down.as_deref()
    }

    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    /// Bind this migration to a direction.
    pub fn planned(&self, direction: Direction) -> PlannedMigration {
        PlannedMigration::new(self.clone(), direction)
    }
}

/// Which script of a migration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Run the up script and record the version.
    Up,
    /// Run the down script and remove the version record.
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A migration bound to a direction, ready to be executed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMigration {
    pub migration: Migration,
    pub direction: Direction,
}

impl PlannedMigration {
    pub fn new(migration: Migration, direction: Direction) -> Self {
        Self {
            migration,
            direction,
        }
    }

    pub fn up(migration: Migration) -> Self {
        Self::new(migration, Direction::Up)
    }

    pub fn down(migration: Migration) -> Self {
        Self::new(migration, Direction::Down)
    }

    pub fn id(&self) -> &str {
        self.migration.id()
    }

    /// The script for this direction. `None` for Down on an irreversible migration.
    pub fn script(&self) -> Option<&str> {
        match self.direction {
            Direction::Up => Some(self.migration.up()),
            Direction::Down => self.migration.down(),
        }
    }
}

/// A row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedVersion {
    pub id: String,
    pub applied_at: DateTime<Utc>,
}

/// Lifecycle of one planned migration inside a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Executing,
    /// Terminal: script and ledger change committed together.
    Committed,
    /// Terminal: nothing changed.
    RolledBack,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::Pending => "pending",
            MigrationState::Executing => "executing",
            MigrationState::Committed => "committed",
            MigrationState::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationState::Committed | MigrationState::RolledBack)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An applied ledger entry as seen against the current catalog.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedEntry {
    pub id: String,
    pub applied_at: DateTime<Utc>,
    /// A down script exists in the catalog.
    pub reversible: bool,
    /// Recorded in the ledger but unknown to the catalog.
    pub orphaned: bool,
}

/// Applied and pending migrations for reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationStatus {
    pub applied: Vec<AppliedEntry>,
    pub pending: Vec<String>,
}

impl MigrationStatus {
    /// Combine the ledger with the catalog. Both lists come out sorted by ID.
    pub fn build(catalog: &[Migration], applied: &[AppliedVersion]) -> Self {
        let by_id: HashMap<&str, &Migration> = catalog.iter().map(|m| (m.id(), m)).collect();
        let applied_ids: BTreeSet<&str> = applied.iter().map(|v| v.id.as_str()).collect();

        let mut applied_entries: Vec<AppliedEntry> = applied
            .iter()
            .map(|v| {
                let known = by_id.get(v.id.as_str());
                AppliedEntry {
                    id: v.id.clone(),
                    applied_at: v.applied_at,
                    reversible: known.map(|m| m.is_reversible()).unwrap_or(false),
                    orphaned: known.is_none(),
                }
            })
            .collect();
        applied_entries.sort_by(|a, b| a.id.cmp(&b.id));

        let pending: BTreeSet<&str> = catalog
            .iter()
            .map(|m| m.id())
            .filter(|id| !applied_ids.contains(id))
            .collect();

        Self {
            applied: applied_entries,
            pending: pending.into_iter().map(String::from).collect(),
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}
