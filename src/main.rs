// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use events_identity::config::Settings;
use events_identity::state::AppState;
use events_identity::storage::AuthDatabase;
use events_identity::sweeper::CleanupSweeper;
use events_identity::telemetry::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(settings.log_format) {
        eprintln!("Failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Identity service failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = settings.database_path();
    let db = Arc::new(AuthDatabase::open(&db_path)?);
    let counts = db.table_counts()?;
    info!(path = %db_path.display(), ?counts, "Identity database opened");

    let state = AppState::new(&settings, db)?;
    info!(
        rp_id = state.passkeys.settings().rp_id(),
        apple_keys_url = %settings.apple_keys_url,
        "Identity services ready"
    );

    let shutdown = CancellationToken::new();
    let sweeper = CleanupSweeper::new(
        state.api_tokens.clone(),
        state.passkeys.clone(),
        settings.cleanup_interval,
    );
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown.cancel();
    sweeper_handle.await?;

    Ok(())
}
