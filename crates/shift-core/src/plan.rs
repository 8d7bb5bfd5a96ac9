//! Migration planning.
//!
//! Turns the catalog of known migrations and the applied set into an ordered
//! list of [`PlannedMigration`]s. Up plans run in ascending ID order, down plans
//! unwind in descending ID order.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use thiserror::Error;
use tracing::debug;

use crate::migration::{Direction, Migration, PlannedMigration};

/// Planning failures. Nothing has touched the datastore when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("target migration {0} is not in the catalog")]
    UnknownTarget(String),

    #[error("migration {0} is defined more than once")]
    DuplicateId(String),

    #[error("migration {0} has no down script")]
    Irreversible(String),

    #[error("applied migration {0} is missing from the catalog")]
    MissingFromCatalog(String),

    #[error("migration {0} appears twice in the plan with the same direction")]
    RepeatedStep(String),

    #[error("{direction} step {next} is out of order after {previous}")]
    OutOfOrder {
        direction: Direction,
        previous: String,
        next: String,
    },
}

/// What a plan should converge to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Apply every pending migration.
    Latest,
    /// Apply pending migrations up to and including this ID.
    UpTo(String),
    /// Revert applied migrations above this ID. The target itself stays applied.
    DownTo(String),
    /// Revert every applied migration.
    DownAll,
    /// Revert the most recent `n` applied migrations.
    Rollback(usize),
}

impl Target {
    pub fn direction(&self) -> Direction {
        match self {
            Target::Latest | Target::UpTo(_) => Direction::Up,
            Target::DownTo(_) | Target::DownAll | Target::Rollback(_) => Direction::Down,
        }
    }
}

/// Plans against a fixed catalog.
pub struct Planner<'a> {
    catalog: BTreeMap<&'a str, &'a Migration>,
}

impl<'a> Planner<'a> {
    /// Index the catalog. Fails if two migrations share an ID.
    pub fn new(catalog: &'a [Migration]) -> Result<Self, PlanError> {
        let mut index = BTreeMap::new();
        for migration in catalog {
            if index.insert(migration.id(), migration).is_some() {
                return Err(PlanError::DuplicateId(migration.id().to_string()));
            }
        }
        Ok(Self { catalog: index })
    }

    pub fn get(&self, id: &str) -> Option<&'a Migration> {
        self.catalog.get(id).copied()
    }

    /// Build the ordered plan for `target` given the currently applied IDs.
    pub fn plan(&self, applied: &[String], target: &Target) -> Result<Vec<PlannedMigration>, PlanError> {
        let applied: BTreeSet<&str> = applied.iter().map(String::as_str).collect();

        let plan = match target {
            Target::Latest => Ok(self.pending(&applied, None)),
            Target::UpTo(id) => {
                self.require(id)?;
                Ok(self.pending(&applied, Some(id)))
            }
            Target::DownTo(id) => {
                self.require(id)?;
                let above = applied.iter().rev().copied().filter(|a| *a > id.as_str());
                self.unwind(above)
            }
            Target::DownAll => self.unwind(applied.iter().rev().copied()),
            Target::Rollback(n) => self.unwind(applied.iter().rev().copied().take(*n)),
        }?;

        debug!(goal = ?target, steps = plan.len(), "Planned migrations");
        Ok(plan)
    }

    fn require(&self, id: &str) -> Result<(), PlanError> {
        if self.catalog.contains_key(id) {
            Ok(())
        } else {
            Err(PlanError::UnknownTarget(id.to_string()))
        }
    }

    fn pending(&self, applied: &BTreeSet<&str>, upper: Option<&str>) -> Vec<PlannedMigration> {
        self.catalog
            .iter()
            .filter(|(id, _)| !applied.contains(*id))
            .filter(|(id, _)| upper.map_or(true, |upper| **id <= upper))
            .map(|(_, m)| m.planned(Direction::Up))
            .collect()
    }

    fn unwind<'s>(
        &self,
        ids: impl Iterator<Item = &'s str>,
    ) -> Result<Vec<PlannedMigration>, PlanError> {
        ids.map(|id| {
            let migration = self
                .get(id)
                .ok_or_else(|| PlanError::MissingFromCatalog(id.to_string()))?;
            if !migration.is_reversible() {
                return Err(PlanError::Irreversible(id.to_string()));
            }
            Ok(migration.planned(Direction::Down))
        })
        .collect()
    }
}

/// Check a caller-built plan: each (ID, direction) once, up steps ascending,
/// down steps descending and reversible.
pub fn validate_sequence(plan: &[PlannedMigration]) -> Result<(), PlanError> {
    let mut seen = HashSet::new();
    let mut last_up: Option<&str> = None;
    let mut last_down: Option<&str> = None;

    for step in plan {
        let id = step.id();
        if !seen.insert((id, step.direction)) {
            return Err(PlanError::RepeatedStep(id.to_string()));
        }

        let last = match step.direction {
            Direction::Up => &mut last_up,
            Direction::Down => {
                if !step.migration.is_reversible() {
                    return Err(PlanError::Irreversible(id.to_string()));
                }
                &mut last_down
            }
        };

        if let Some(previous) = *last {
            let in_order = match step.direction {
                Direction::Up => previous < id,
                Direction::Down => previous > id,
            };
            if !in_order {
                return Err(PlanError::OutOfOrder {
                    direction: step.direction,
                    previous: previous.to_string(),
                    next: id.to_string(),
                });
            }
        }
        *last = Some(id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Migration> {
        vec![
            Migration::new("0003_add_index", "CREATE INDEX i ON t (a)").with_down("DROP INDEX i"),
            Migration::new("0001_init", "CREATE TABLE t (a int)"),
            Migration::new("0002_add_col", "ALTER TABLE t ADD b int")
                .with_down("ALTER TABLE t DROP b"),
            Migration::new("0004_seed", "INSERT INTO t VALUES (1, 2)").with_down("DELETE FROM t"),
        ]
    }

    fn ids(plan: &[PlannedMigration]) -> Vec<&str> {
        plan.iter().map(|p| p.id()).collect()
    }

    fn applied(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_latest_applies_pending_ascending() {
        let catalog = catalog();
        let planner = Planner::new(&catalog).unwrap();

        let plan = planner.plan(&applied(&["0002_add_col"]), &Target::Latest).unwrap();

        assert_eq!(ids(&plan), vec!["0001_init", "0003_add_index", "0004_seed"]);
        assert!(plan.iter().all(|p| p.direction == Direction::Up));
    }

    #[test]
    fn test_up_to_includes_target() {
        let catalog = catalog();
        let planner = Planner::new(&catalog).unwrap();

        let plan = planner
            .plan(&[], &Target::UpTo("0002_add_col".into()))
            .unwrap();

        assert_eq!(ids(&plan), vec!["0001_init", "0002_add_col"]);
    }

    #[test]
    fn test_down_to_excludes_target_descending() {
        let catalog = catalog();
        let planner = Planner::new(&catalog).unwrap();
        let applied = applied(&["0001_init", "0002_add_col", "0003_add_index", "0004_seed"]);

        let plan = planner
            .plan(&applied, &Target::DownTo("0002_add_col".into()))
            .unwrap();

        assert_eq!(ids(&plan), vec!["0004_seed", "0003_add_index"]);
        assert!(plan.iter().all(|p| p.direction == Direction::Down));
    }

    #[test]
    fn test_rollback_takes_most_recent() {
        let catalog = catalog();
        let planner = Planner::new(&catalog).unwrap();
        let applied = applied(&["0004_seed", "0001_init", "0003_add_index"]);

        let plan = planner.plan(&applied, &Target::Rollback(2)).unwrap();

        assert_eq!(ids(&plan), vec!["0004_seed", "0003_add_index"]);
    }

    #[test]
    fn test_down_all_hits_irreversible() {
        let catalog = catalog();
        let planner = Planner::new(&catalog).unwrap();
        let applied = applied(&["0001_init", "0002_add_col"]);

        let err = planner.plan(&applied, &Target::DownAll).unwrap_err();
        assert_eq!(err, PlanError::Irreversible("0001_init".into()));
    }

    #[test]
    fn test_unknown_target() {
        let catalog = catalog();
        let planner = Planner::new(&catalog).unwrap();

        let err = planner
            .plan(&[], &Target::UpTo("9999_nope".into()))
            .unwrap_err();
        assert_eq!(err, PlanError::UnknownTarget("9999_nope".into()));

        let err = planner
            .plan(&[], &Target::DownTo("9999_nope".into()))
            .unwrap_err();
        assert_eq!(err, PlanError::UnknownTarget("9999_nope".into()));
    }

    #[test]
    fn test_down_with_orphaned_ledger_entry() {
        let catalog = catalog();
        let planner = Planner::new(&catalog).unwrap();
        let applied = applied(&["0004_seed", "0005_removed"]);

        let err = planner.plan(&applied, &Target::Rollback(1)).unwrap_err();
        assert_eq!(err, PlanError::MissingFromCatalog("0005_removed".into()));
    }

    #[test]
    fn test_duplicate_catalog_id() {
        let catalog = vec![
            Migration::new("0001_init", "SELECT 1"),
            Migration::new("0001_init", "SELECT 2"),
        ];
        assert_eq!(
            Planner::new(&catalog).err(),
            Some(PlanError::DuplicateId("0001_init".into()))
        );
    }

    #[test]
    fn test_nothing_pending() {
        let catalog = catalog();
        let planner = Planner::new(&catalog).unwrap();
        let applied = applied(&["0001_init", "0002_add_col", "0003_add_index", "0004_seed"]);

        assert!(planner.plan(&applied, &Target::Latest).unwrap().is_empty());
        assert!(planner.plan(&[], &Target::DownAll).unwrap().is_empty());
    }

    #[test]
    fn test_validate_sequence() {
        let a = Migration::new("0001", "SELECT 1").with_down("SELECT 1");
        let b = Migration::new("0002", "SELECT 2").with_down("SELECT 2");
        let c = Migration::new("0003", "SELECT 3");

        // Redo of one migration is fine.
        let redo = vec![
            PlannedMigration::down(b.clone()),
            PlannedMigration::up(b.clone()),
        ];
        assert!(validate_sequence(&redo).is_ok());

        let unordered = vec![PlannedMigration::up(b.clone()), PlannedMigration::up(a.clone())];
        assert!(matches!(
            validate_sequence(&unordered),
            Err(PlanError::OutOfOrder { direction: Direction::Up, .. })
        ));

        let unordered_down = vec![PlannedMigration::down(a.clone()), PlannedMigration::down(b.clone())];
        assert!(matches!(
            validate_sequence(&unordered_down),
            Err(PlanError::OutOfOrder { direction: Direction::Down, .. })
        ));

        let repeated = vec![PlannedMigration::up(a.clone()), PlannedMigration::up(a)];
        assert_eq!(
            validate_sequence(&repeated),
            Err(PlanError::RepeatedStep("0001".into()))
        );

        let irreversible = vec![PlannedMigration::down(c)];
        assert_eq!(
            validate_sequence(&irreversible),
            Err(PlanError::Irreversible("0003".into()))
        );
    }
}
