use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::core::state::AppState;
use crate::tasks::sweep;

pub async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = vec![
        tokio::spawn(close_expired_loop(state.clone(), shutdown_rx.clone())),
        tokio::spawn(recover_submitted_loop(state.clone(), shutdown_rx.clone())),
    ];

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn close_expired_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period = state.settings().grading().sweep_interval_seconds;
    let mut tick = interval(Duration::from_secs(period));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = sweep::close_expired_submissions(state.engine()).await {
                    tracing::error!(error = %err, "close_expired_submissions failed");
                }
            }
        }
    }
}

async fn recover_submitted_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period = state.settings().grading().recovery_interval_seconds;
    let mut tick = interval(Duration::from_secs(period));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = sweep::recover_submitted(state.engine()).await {
                    tracing::error!(error = %err, "recover_submitted failed");
                }
            }
        }
    }
}
