//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `devportal_core` linkage and report its version.
//! - Optionally open a database file, migrate it and report its schema
//!   version.

use clap::Parser;
use devportal_core::db::migrations::{current_user_version, latest_version};
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "devportal_cli")]
#[command(about = "Inspect a devportal database and its schema version")]
#[command(version)]
struct Args {
    /// SQLite database file to open and migrate.
    db_path: Option<PathBuf>,

    /// Absolute directory for rolling log files.
    #[arg(long)]
    log_dir: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(dir) = &args.log_dir {
        if let Err(err) = devportal_core::init_logging(devportal_core::default_log_level(), dir) {
            eprintln!("devportal_core logging error={err}");
            return ExitCode::FAILURE;
        }
    }

    println!("devportal_core version={}", devportal_core::core_version());
    println!("devportal_core schema_latest={}", latest_version());

    let Some(path) = args.db_path else {
        return ExitCode::SUCCESS;
    };
    let version = devportal_core::open_db(&path).and_then(|conn| current_user_version(&conn));
    match version {
        Ok(version) => {
            info!("event=cli_probe module=cli status=ok schema_version={version}");
            println!("devportal_core schema_version={version}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("devportal_core open error={err}");
            ExitCode::FAILURE
        }
    }
}
