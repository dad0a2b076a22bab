//! Graceful shutdown coordinator
//!
//! A signal flips the coordinator into `ShuttingDown`; whatever is still
//! running gets `timeout` to finish before the caller gives up on it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Shutdown,
}

/// How a drained future ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed,
    /// The grace period ran out first
    Forced,
}

pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self { state, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request a graceful shutdown. Only the first call has any effect.
    pub fn shutdown(&self) {
        let started = self.state.send_if_modified(|state| {
            if *state != ShutdownState::Running {
                return false;
            }
            *state = ShutdownState::ShuttingDown;
            true
        });

        if started {
            info!(grace_ms = self.timeout.as_millis() as u64, "Initiating graceful shutdown");
        } else {
            warn!("Shutdown already in progress");
        }
    }

    /// Await `work` for at most the grace period, then mark shutdown complete
    pub async fn drain<F>(&self, work: F) -> DrainOutcome
    where
        F: Future<Output = ()>,
    {
        let outcome = match tokio::time::timeout(self.timeout, work).await {
            Ok(()) => DrainOutcome::Completed,
            Err(_) => {
                warn!(grace_ms = self.timeout.as_millis() as u64, "Grace period elapsed, forcing exit");
                DrainOutcome::Forced
            }
        };

        self.state.send_replace(ShutdownState::Shutdown);
        info!(?outcome, "Shutdown complete");
        outcome
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Resolves once a shutdown has been requested, including one that
    /// happened before this call
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|state| *state != ShutdownState::Running).await;
    }
}

/// Install signal handlers for graceful shutdown
#[cfg(unix)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        coordinator.shutdown();
    });

    Ok(())
}

/// Install signal handlers for graceful shutdown (Windows)
#[cfg(windows)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C");
                coordinator.shutdown();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    Ok(())
}
