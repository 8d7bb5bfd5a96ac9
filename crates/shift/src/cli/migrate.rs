use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};
use tracing::debug;

use shift_core::config::ShiftConfig;
use shift_core::migration::MigrationStatus;
use shift_core::plan::Target;
use shift_runtime::migrations::{create_migration_files, load_migrations_from_dir, MigrationLock};
use shift_runtime::Driver;

use super::logging::init_tracing;

/// Manage database migrations.
#[derive(Parser)]
pub struct MigrateCommand {
    #[command(subcommand)]
    pub action: MigrateAction,

    /// Configuration file path.
    #[arg(short, long, default_value = "shift.toml", global = true)]
    pub config: String,

    /// Migrations directory path (overrides config).
    #[arg(short, long, global = true)]
    pub migrations_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Apply pending migrations.
    Up {
        /// Stop after this migration.
        #[arg(long)]
        to: Option<String>,
    },

    /// Revert applied migrations (the last one by default).
    Down {
        /// Number of migrations to revert.
        #[arg(conflicts_with_all = ["to", "all"])]
        count: Option<usize>,

        /// Revert everything applied after this migration.
        #[arg(long, conflicts_with = "all")]
        to: Option<String>,

        /// Revert every applied migration.
        #[arg(long)]
        all: bool,
    },

    /// Show applied and pending migrations.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List applied migration IDs.
    Versions {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Create an empty up/down migration pair.
    New {
        /// Migration name, appended to a timestamp.
        name: String,
    },
}

impl MigrateAction {
    fn target(&self) -> Option<Target> {
        match self {
            MigrateAction::Up { to } => Some(match to {
                Some(id) => Target::UpTo(id.clone()),
                None => Target::Latest,
            }),
            MigrateAction::Down { count, to, all } => Some(match (count, to, all) {
                (_, _, true) => Target::DownAll,
                (_, Some(id), _) => Target::DownTo(id.clone()),
                (Some(n), _, _) => Target::Rollback(*n),
                (None, None, false) => Target::Rollback(1),
            }),
            _ => None,
        }
    }
}

impl MigrateCommand {
    pub async fn execute(self) -> Result<()> {
        // Load .env if present
        dotenvy::dotenv().ok();

        if let MigrateAction::New { name } = &self.action {
            let dir = match &self.migrations_dir {
                Some(dir) => dir.clone(),
                None if Path::new(&self.config).exists() => {
                    ShiftConfig::from_file(&self.config)?.migrations.dir
                }
                None => PathBuf::from("migrations"),
            };
            let (up, down) = create_migration_files(&dir, name, Utc::now())?;
            println!("  {} Created {}", style("✓").green(), up.display());
            println!("  {} Created {}", style("✓").green(), down.display());
            return Ok(());
        }

        let config = load_config(&self.config)?;
        init_tracing(&config.logging);

        let migrations_dir = self
            .migrations_dir
            .clone()
            .unwrap_or_else(|| config.migrations.dir.clone());
        let catalog = load_migrations_from_dir(&migrations_dir)?;
        debug!(dir = %migrations_dir.display(), migrations = catalog.len(), "Loaded catalog");

        let driver = Driver::from_config(&config.database).await?;
        let result = self.run(&driver, &config, &catalog, &migrations_dir).await;
        driver.close().await;

        if let Err(err) = &result {
            if let Some(shift_err) = err.downcast_ref::<shift_core::ShiftError>() {
                if shift_err.is_retryable() {
                    eprintln!(
                        "  {} The failure looks transient; running the command again is safe.",
                        style("ℹ").blue()
                    );
                }
            }
        }
        result
    }

    async fn run(
        &self,
        driver: &Driver,
        config: &ShiftConfig,
        catalog: &[shift_core::Migration],
        migrations_dir: &Path,
    ) -> Result<()> {
        match &self.action {
            MigrateAction::Up { .. } | MigrateAction::Down { .. } => {
                let Some(target) = self.action.target() else {
                    return Ok(());
                };

                print_header("Migrations");

                if catalog.is_empty() {
                    println!(
                        "  {} No migrations found in {}",
                        style("ℹ").blue(),
                        migrations_dir.display()
                    );
                    return Ok(());
                }

                if matches!(target, Target::Rollback(0)) {
                    println!("  {} Nothing to roll back (count=0)", style("ℹ").blue());
                    return Ok(());
                }

                let done = if config.migrations.advisory_lock {
                    let lock = MigrationLock::new(config.migrations.lock_key);
                    driver.migrate_to_exclusive(catalog, &target, lock).await?
                } else {
                    driver.migrate_to(catalog, &target).await?
                };

                let verb = match target.direction() {
                    shift_core::Direction::Up => "Applied",
                    shift_core::Direction::Down => "Reverted",
                };

                if done.is_empty() {
                    println!("  {} Already at target", style("ℹ").blue());
                } else {
                    for id in &done {
                        println!("  {} {}: {}", style("✓").green(), verb, id);
                    }
                    println!();
                    println!(
                        "  {} {} {} migration(s)",
                        style("✓").green(),
                        verb,
                        done.len()
                    );
                }
                println!();
            }

            MigrateAction::Status { json } => {
                let status = driver.status(catalog).await?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                } else {
                    print_status(&status);
                }
            }

            MigrateAction::Versions { json } => {
                let versions = driver.versions().await?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&versions)?);
                } else {
                    for id in &versions {
                        println!("{}", id);
                    }
                }
            }

            MigrateAction::New { .. } => {}
        }

        Ok(())
    }
}

/// Read the config file, or fall back to `DATABASE_URL` when there is none.
fn load_config(path: &str) -> Result<ShiftConfig> {
    if Path::new(path).exists() {
        return Ok(ShiftConfig::from_file(path)?);
    }

    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => Ok(ShiftConfig::default_with_database_url(&url)),
        _ => anyhow::bail!(
            "Configuration file not found: {}\nCreate it or set DATABASE_URL.",
            path
        ),
    }
}

fn print_header(title: &str) {
    println!();
    println!("  {} {}", style("SHIFT").bold().cyan(), title);
    println!();
}

fn print_status(status: &MigrationStatus) {
    print_header("Migration Status");

    if status.applied.is_empty() && status.pending.is_empty() {
        println!("  {} No migrations found", style("ℹ").blue());
        return;
    }

    if !status.applied.is_empty() {
        println!("  {} Applied:", style("✓").green());
        for m in &status.applied {
            let marker = if m.orphaned {
                style("?").red().to_string()
            } else if m.reversible {
                style("↓").green().to_string()
            } else {
                style("-").dim().to_string()
            };
            println!(
                "    {} {} {} ({})",
                marker,
                style(&m.id).cyan(),
                style("at").dim(),
                m.applied_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    if !status.pending.is_empty() {
        if !status.applied.is_empty() {
            println!();
        }
        println!("  {} Pending:", style("○").yellow());
        for id in &status.pending {
            println!("    {} {}", style("→").dim(), style(id).yellow());
        }
    }

    println!();
    println!(
        "  {} {} applied, {} pending",
        style("ℹ").blue(),
        status.applied.len(),
        status.pending.len()
    );
    println!();
    println!(
        "  {} = reversible, {} = irreversible, {} = not in migrations directory",
        style("↓").green(),
        style("-").dim(),
        style("?").red()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> MigrateCommand {
        let mut argv = vec!["migrate"];
        argv.extend_from_slice(args);
        MigrateCommand::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_up_targets() {
        assert_eq!(parse(&["up"]).action.target(), Some(Target::Latest));
        assert_eq!(
            parse(&["up", "--to", "0002_b"]).action.target(),
            Some(Target::UpTo("0002_b".into()))
        );
    }

    #[test]
    fn test_down_targets() {
        assert_eq!(parse(&["down"]).action.target(), Some(Target::Rollback(1)));
        assert_eq!(parse(&["down", "3"]).action.target(), Some(Target::Rollback(3)));
        assert_eq!(parse(&["down", "--all"]).action.target(), Some(Target::DownAll));
        assert_eq!(
            parse(&["down", "--to", "0001_a"]).action.target(),
            Some(Target::DownTo("0001_a".into()))
        );
    }

    #[test]
    fn test_down_flags_conflict() {
        assert!(MigrateCommand::try_parse_from(["migrate", "down", "2", "--all"]).is_err());
        assert!(MigrateCommand::try_parse_from(["migrate", "down", "--to", "x", "--all"]).is_err());
    }

    #[test]
    fn test_reporting_actions_have_no_target() {
        assert_eq!(parse(&["status"]).action.target(), None);
        assert_eq!(parse(&["versions", "--json"]).action.target(), None);
        assert_eq!(parse(&["new", "add_users"]).action.target(), None);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shift.toml");
        std::fs::write(
            &path,
            "[database]\nurl = \"postgres://localhost/app\"\n\n[migrations]\ndir = \"db\"\n",
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.database.url, "postgres://localhost/app");
        assert_eq!(config.migrations.dir, PathBuf::from("db"));
    }

    #[tokio::test]
    async fn test_new_creates_pair_without_database() {
        let dir = TempDir::new().unwrap();
        let cmd = parse(&[
            "new",
            "add users",
            "--config",
            "/nonexistent/shift.toml",
            "--migrations-dir",
            dir.path().to_str().unwrap(),
        ]);
        cmd.execute().await.unwrap();

        let catalog = load_migrations_from_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog[0].id().ends_with("_add_users"));
        assert!(catalog[0].is_reversible());
    }
}
