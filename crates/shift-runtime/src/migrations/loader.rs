//! Loading migrations from a directory.
//!
//! File layout:
//! - `<id>.up.sql` with an optional `<id>.down.sql` (reversible)
//! - `<id>.sql` (irreversible)
//!
//! IDs sort lexically, so a timestamp prefix such as `201610041422_init`
//! keeps them in creation order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use shift_core::error::{Result, ShiftError};
use shift_core::migration::Migration;

#[derive(Default)]
struct Sources {
    up: Option<(PathBuf, String)>,
    down: Option<(PathBuf, String)>,
}

enum Part {
    Up,
    Down,
}

fn classify_file_name(name: &str) -> Option<(&str, Part)> {
    if let Some(id) = name.strip_suffix(".up.sql") {
        Some((id, Part::Up))
    } else if let Some(id) = name.strip_suffix(".down.sql") {
        Some((id, Part::Down))
    } else {
        name.strip_suffix(".sql").map(|id| (id, Part::Up))
    }
}

/// Load the migration catalog from `dir`, sorted by ID.
///
/// A missing directory is an empty catalog.
pub fn load_migrations_from_dir(dir: &Path) -> Result<Vec<Migration>> {
    if !dir.exists() {
        debug!("Migrations directory does not exist: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut sources: BTreeMap<String, Sources> = BTreeMap::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some((id, part)) = classify_file_name(file_name) else {
            continue;
        };
        if id.is_empty() {
            return Err(ShiftError::Config(format!(
                "Migration file {:?} has no ID",
                path
            )));
        }

        let sql = std::fs::read_to_string(&path)?;
        let slot = sources.entry(id.to_string()).or_default();
        let target = match part {
            Part::Up => &mut slot.up,
            Part::Down => &mut slot.down,
        };

        if let Some((existing, _)) = target {
            return Err(ShiftError::Config(format!(
                "Migration {} is defined twice: {:?} and {:?}",
                id, existing, path
            )));
        }
        *target = Some((path, sql));
    }

    let mut migrations = Vec::with_capacity(sources.len());
    for (id, source) in sources {
        let Some((_, up)) = source.up else {
            let path = source.down.map(|(p, _)| p).unwrap_or_default();
            return Err(ShiftError::Config(format!(
                "Down migration {:?} has no matching up migration",
                path
            )));
        };

        let migration = match source.down {
            Some((_, down)) => Migration::new(id, up).with_down(down),
            None => Migration::new(id, up),
        };
        migrations.push(migration);
    }

    debug!("Loaded {} migrations from {:?}", migrations.len(), dir);
    Ok(migrations)
}

/// Create an empty reversible migration pair named `<timestamp>_<name>`.
///
/// Returns the paths of the up and down files.
pub fn create_migration_files(
    dir: &Path,
    name: &str,
    now: DateTime<Utc>,
) -> Result<(PathBuf, PathBuf)> {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if slug.trim_matches('_').is_empty() {
        return Err(ShiftError::Config(format!(
            "Invalid migration name: {:?}",
            name
        )));
    }

    let id = format!("{}_{}", now.format("%Y%m%d%H%M%S"), slug);
    std::fs::create_dir_all(dir)?;

    let up = dir.join(format!("{}.up.sql", id));
    let down = dir.join(format!("{}.down.sql", id));
    if up.exists() || down.exists() {
        return Err(ShiftError::Config(format!("Migration {} already exists", id)));
    }

    std::fs::write(&up, format!("-- {}: up\n", id))?;
    std::fs::write(&down, format!("-- {}: down\n", id))?;
    Ok((up, down))
}
