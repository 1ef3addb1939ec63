use std::{env, fs, path::Path, process};

use common::{config, logger};
use tracing::{error, info};

mod runner;

#[tokio::main]
async fn main() {
    let _log_guard = logger::init_logging(
        &config::log_file(),
        &config::log_level(),
        config::log_to_stdout(),
    );

    let db_path = config::database_path();
    let url = format!("sqlite://{}?mode=rwc", db_path);
    let args: Vec<String> = env::args().collect();
    info!(
        env = %config::env(),
        project = %config::project_name(),
        db = %db_path,
        command = args.get(1).map(String::as_str).unwrap_or("up"),
        "migration started"
    );

    let result = match args.get(1).map(|s| s.as_str()) {
        Some("clean") => {
            remove_db_file(&db_path);
            return;
        }
        Some("fresh") => {
            remove_db_file(&db_path);
            create_db_dir(&db_path);
            migrate(&url).await
        }
        Some("status") => match runner::connect(&url).await {
            Ok(db) => runner::print_status(&db).await,
            Err(e) => Err(e),
        },
        _ => {
            create_db_dir(&db_path);
            migrate(&url).await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "migration failed");
        eprintln!("Migration error: {e}");
        process::exit(1);
    }
}

async fn migrate(url: &str) -> Result<(), sea_orm::DbErr> {
    let db = runner::connect(url).await?;
    runner::run_pending(&db).await
}

fn remove_db_file(path: &str) {
    let db_path = Path::new(path);
    if db_path.exists() {
        fs::remove_file(db_path).expect("Failed to delete DB file");
        println!("Deleted DB: {}", db_path.display());
    } else {
        println!("DB file does not exist: {}", db_path.display());
    }
}

fn create_db_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent).expect("Failed to create DB directory");
    }
}
