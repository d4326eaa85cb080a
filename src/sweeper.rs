// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expiry Sweeper
//!
//! Background task that periodically deletes records past their retention:
//! API tokens expired for more than the retention window and WebAuthn
//! ceremonies past their deadline.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::ApiTokenService;
use crate::webauthn::PasskeyService;

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub api_tokens: usize,
    pub challenges: usize,
}

pub struct CleanupSweeper {
    api_tokens: Arc<ApiTokenService>,
    passkeys: Arc<PasskeyService>,
    interval: Duration,
}

impl CleanupSweeper {
    pub fn new(
        api_tokens: Arc<ApiTokenService>,
        passkeys: Arc<PasskeyService>,
        interval: Duration,
    ) -> Self {
        Self {
            api_tokens,
            passkeys,
            interval,
        }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Expiry sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Expiry sweeper shutting down");
                return;
            }

            self.sweep_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Expiry sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep on the blocking pool.
    pub async fn sweep_step(&self) -> SweepReport {
        let api_tokens = self.api_tokens.clone();
        let passkeys = self.passkeys.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let mut report = SweepReport::default();
            match api_tokens.cleanup_expired() {
                Ok(count) => report.api_tokens = count,
                Err(e) => warn!(error = %e, "Expiry sweeper: API token cleanup failed"),
            }
            match passkeys.cleanup_expired_challenges() {
                Ok(count) => report.challenges = count,
                Err(e) => warn!(error = %e, "Expiry sweeper: challenge cleanup failed"),
            }
            report
        })
        .await;

        match joined {
            Ok(report) => {
                if report == SweepReport::default() {
                    debug!("Expiry sweeper: nothing to remove");
                } else {
                    info!(
                        api_tokens = report.api_tokens,
                        challenges = report.challenges,
                        "Expiry sweeper: removed expired records"
                    );
                }
                report
            }
            Err(e) => {
                warn!(error = %e, "Expiry sweeper: sweep task panicked");
                SweepReport::default()
            }
        }
    }
}
