//! survey-server: questionnaire web app
//!
//! Serves the landing page, the survey form and the results dashboard, and
//! stores every submission in the document store and the local database.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use survey_common::config::{ConfigOverrides, SurveyConfig};
use survey_common::db::init_database;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use survey_server::document_store::GitHubDocumentStore;
use survey_server::submission::RetryPolicy;
use survey_server::{build_router, AppState};

/// Command-line arguments for survey-server
#[derive(Parser, Debug)]
#[command(name = "survey-server")]
#[command(about = "Survey form, landing page and results dashboard")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/survey/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long)]
    db: Option<String>,

    /// Address to listen on, e.g. 0.0.0.0:8501
    #[arg(short, long)]
    bind: Option<String>,

    /// Base URL respondents reach the app at
    #[arg(long)]
    app_url: Option<String>,

    /// Document store repository, owner/name
    #[arg(long)]
    repo: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "survey_server=info,survey_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting survey-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let overrides = ConfigOverrides {
        sqlite_filename: args.db,
        bind_addr: args.bind,
        app_url: args.app_url,
        repo_name: args.repo,
        ..Default::default()
    };
    let config = SurveyConfig::resolve(&overrides, args.config.as_deref())
        .context("Failed to resolve configuration")?;
    info!("Configuration: {:?}", config);

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let store = GitHubDocumentStore::from_config(&config)
        .context("Failed to create document store client")?;
    info!("Document store: {} via {}", config.repo_name, config.github_api_url);

    let state = AppState::new(
        pool.clone(),
        Arc::new(store),
        RetryPolicy::from_config(&config),
        config.commit_message.clone(),
        config.app_url.clone(),
    );
    info!("Survey link: {}", state.survey_url());

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
