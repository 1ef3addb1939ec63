use colored::*;
use sea_orm::DatabaseConnection;
use sea_orm_migration::prelude::*;
use std::io::{self, Write};
use std::time::Instant;

use migration::Migrator;

const STATUS_COLUMN: usize = 72;

pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    sea_orm::Database::connect(url).await
}

/// Applies pending migrations one at a time so each gets its own status line.
pub async fn run_pending(db: &DatabaseConnection) -> Result<(), DbErr> {
    let pending = Migrator::get_pending_migrations(db).await?;
    if pending.is_empty() {
        println!("{}", "Nothing to migrate".dimmed());
        return Ok(());
    }

    println!("Running {} migration(s)...", pending.len());
    for migration in pending {
        let label = format!("Applying {}", migration.name().bold());
        let dots = ".".repeat(STATUS_COLUMN.saturating_sub(label.len()));
        print!("{}{} ", label, dots);
        io::stdout().flush().ok();

        let start = Instant::now();
        match Migrator::up(db, Some(1)).await {
            Ok(()) => {
                let time_str = format!("({:.2?})", start.elapsed()).dimmed();
                println!("{} {}", "done".green(), time_str);
            }
            Err(e) => {
                println!("{}", "failed".red());
                return Err(e);
            }
        }
    }
    Ok(())
}

pub async fn print_status(db: &DatabaseConnection) -> Result<(), DbErr> {
    let applied = Migrator::get_applied_migrations(db).await?;
    let pending = Migrator::get_pending_migrations(db).await?;

    for m in applied {
        println!("{} {}", "applied".green(), m.name());
    }
    for m in pending {
        println!("{} {}", "pending".yellow(), m.name());
    }
    Ok(())
}
