use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug)]
struct ControllerState {
    state: ShutdownState,
    interrupted: bool,
}

/// Drives the `Running -> ShuttingDown -> Stopped` state machine.
///
/// `shutdown` is the cooperative token handed to every worker; `force` fires
/// when in-flight work must be abandoned (second signal or grace expiry).
#[derive(Debug, Clone)]
pub struct CancellationController {
    shutdown: CancellationToken,
    force: CancellationToken,
    grace: Option<Duration>,
    inner: Arc<Mutex<ControllerState>>,
}

impl CancellationController {
    pub fn new(grace: Option<Duration>) -> Self {
        Self {
            shutdown: CancellationToken::new(),
            force: CancellationToken::new(),
            grace,
            inner: Arc::new(Mutex::new(ControllerState {
                state: ShutdownState::Running,
                interrupted: false,
            })),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn force_token(&self) -> CancellationToken {
        self.force.clone()
    }

    pub fn grace(&self) -> Option<Duration> {
        self.grace
    }

    pub fn state(&self) -> ShutdownState {
        self.lock().state
    }

    pub fn interrupted(&self) -> bool {
        self.lock().interrupted
    }

    pub fn forced(&self) -> bool {
        self.force.is_cancelled()
    }

    /// First call moves to `ShuttingDown`; a call while already shutting down
    /// escalates to a forced stop. No effect once `Stopped`.
    pub fn request_shutdown(&self, reason: &str) {
        let mut inner = self.lock();
        match inner.state {
            ShutdownState::Running => {
                warn!("{reason}: no new directories will be started, waiting for in-flight work");
                inner.state = ShutdownState::ShuttingDown;
                inner.interrupted = true;
                self.shutdown.cancel();
            }
            ShutdownState::ShuttingDown => {
                warn!("{reason}: terminating in-flight work");
                self.force.cancel();
            }
            ShutdownState::Stopped => {}
        }
    }

    /// Escalates straight to abandoning in-flight work.
    pub fn force_stop(&self, reason: &str) {
        if self.state() == ShutdownState::Running {
            self.request_shutdown(reason);
        }
        if self.state() == ShutdownState::ShuttingDown && !self.force.is_cancelled() {
            warn!("{reason}: terminating in-flight work");
            self.force.cancel();
        }
    }

    pub fn mark_stopped(&self) {
        let mut inner = self.lock();
        if inner.state != ShutdownState::Stopped {
            info!(interrupted = inner.interrupted, "reclaim run stopped");
            inner.state = ShutdownState::Stopped;
        }
    }

    /// Listens for SIGINT (and SIGTERM on unix) until the run stops. The first
    /// signal starts a graceful shutdown, the second forces it.
    pub fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            loop {
                let stopped = controller.force.clone();
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    signal = wait_for_signal() => match signal {
                        Some(name) => controller.request_shutdown(&format!("received {name}")),
                        None => break,
                    },
                }
                if controller.state() == ShutdownState::Stopped {
                    break;
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Option<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!("cannot install SIGTERM handler: {err}");
            return tokio::signal::ctrl_c().await.ok().map(|_| "SIGINT");
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.ok().map(|_| "SIGINT"),
        _ = terminate.recv() => Some("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<&'static str> {
    tokio::signal::ctrl_c().await.ok().map(|_| "Ctrl+C")
}
