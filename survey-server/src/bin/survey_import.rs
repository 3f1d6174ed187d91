//! survey-import: backfill the local database from the document store
//!
//! Reads every document under `responses/`, validates it and inserts the
//! ones the database does not have yet. Safe to run repeatedly.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use survey_common::config::{ConfigOverrides, SurveyConfig};
use survey_common::db::init_database;
use tracing::error;

use survey_server::document_store::GitHubDocumentStore;
use survey_server::reconcile::import_documents;

#[derive(Parser, Debug)]
#[command(name = "survey-import")]
#[command(about = "Import document store responses into the local database")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/survey/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "survey_server=info,survey_common=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Import failed: {:#}", e);
            eprintln!("Import failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let overrides = ConfigOverrides {
        sqlite_filename: args.db,
        ..Default::default()
    };
    let config = SurveyConfig::resolve(&overrides, args.config.as_deref())
        .context("Failed to resolve configuration")?;

    let pool = init_database(&config.database_path())
        .await
        .context("Failed to initialize database")?;
    let store = GitHubDocumentStore::from_config(&config)
        .context("Failed to create document store client")?;

    let report = import_documents(&store, &pool).await?;
    pool.close().await;

    for skipped in &report.skipped {
        eprintln!("skipped {}: {}", skipped.path, skipped.reason);
    }
    eprintln!("Skipped {} documents", report.skipped_count());
    println!(
        "Imported {} new responses ({} already present, {} skipped, {} listed)",
        report.imported,
        report.already_present,
        report.skipped_count(),
        report.listed
    );

    Ok(())
}
