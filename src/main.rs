use anyhow::Result;
use axum::Router;
use config::{AppConfig, Command};
use services::{
    AppState,
    clock::{Clock, SystemClock},
    image_store::ImageStore,
};
use std::{io::ErrorKind, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting lost-found with config: {:?}", cfg);

    // --- Ensure upload directory exists ---
    let images = ImageStore::new(&cfg.upload_root);
    let upload_dir = images.upload_dir();
    if !upload_dir.exists() {
        tokio::fs::create_dir_all(&upload_dir).await?;
        tracing::info!("Created upload directory at {:?}", upload_dir);
    }

    // --- Initialize SQLite connection ---
    let pool = Arc::new(db::connect(&cfg.database_url).await?);
    db::run_migrations(&pool).await?;

    let state = AppState::new(pool, images, Arc::new(SystemClock));

    // --- One-shot modes ---
    match command {
        Command::Migrate => {
            tracing::info!("Database migration complete.");
            return Ok(());
        }
        Command::ArchiveOld => {
            let archived = state.items.archive_stale().await?;
            tracing::info!("Archived {} item(s).", archived);
            return Ok(());
        }
        Command::CreateUser(username) => {
            let user = state
                .items
                .store()
                .insert_user(&username, SystemClock.now())
                .await?;
            tracing::info!("Created user {}", user.username);
            println!("{}", user.id);
            return Ok(());
        }
        Command::Serve => {}
    }

    // --- Periodic archival sweep ---
    if cfg.archive_interval_secs > 0 {
        spawn_archive_sweep(state.clone(), Duration::from_secs(cfg.archive_interval_secs));
    }

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Archive stale items on a fixed interval. The first tick fires immediately
/// so a restart catches up at once. Failures are logged and retried next tick.
fn spawn_archive_sweep(state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match state.items.archive_stale().await {
                Ok(0) => tracing::debug!("archival sweep: nothing to archive"),
                Ok(n) => tracing::info!("archival sweep archived {} item(s)", n),
                Err(err) => tracing::error!("archival sweep failed: {}", err),
            }
        }
    });
}
