//! Lifecycle control: the running flag and the signal handlers that clear it.
//!
//! [`RunningFlag`] is handed to [`Server::run`](crate::server::Server::run)
//! explicitly. Signal handlers only log and call [`RunningFlag::stop`]; all
//! teardown happens on the main control path after the run-loop returns.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Cooperative shutdown flag.
///
/// Starts out running and transitions to stopped exactly once. Clones share
/// the same state.
#[derive(Debug, Clone)]
pub struct RunningFlag {
    state: Arc<watch::Sender<bool>>,
}

impl Default for RunningFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningFlag {
    pub fn new() -> Self {
        let (state, _) = watch::channel(true);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn is_running(&self) -> bool {
        *self.state.borrow()
    }

    /// Clear the flag. Returns `true` for the call that actually stopped it.
    pub fn stop(&self) -> bool {
        self.state.send_if_modified(|running| {
            let was_running = *running;
            *running = false;
            was_running
        })
    }

    /// Resolves once the flag has been cleared.
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        loop {
            let running = *rx.borrow_and_update();
            if !running {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Install SIGINT and SIGTERM handlers that clear `running`.
///
/// The handlers are registered before this function returns, so it must be
/// called before the server is constructed.
#[cfg(unix)]
pub fn install_signal_handlers(running: RunningFlag) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => tracing::info!("Received Ctrl-C"),
            _ = terminate.recv() => tracing::info!("Received SIGTERM"),
            _ = running.stopped() => return,
        }
        running.stop();
    }))
}

/// Install a Ctrl-C handler that clears `running`.
#[cfg(not(unix))]
pub fn install_signal_handlers(running: RunningFlag) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                tracing::info!("Received Ctrl-C");
            }
            _ = running.stopped() => return,
        }
        running.stop();
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_flag_starts_running() {
        assert!(RunningFlag::new().is_running());
    }

    #[test]
    fn test_stop_is_monotonic() {
        let flag = RunningFlag::new();
        let clone = flag.clone();

        assert!(clone.stop());
        assert!(!flag.is_running());
        // Second stop is a no-op
        assert!(!flag.stop());
        assert!(!clone.is_running());
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let flag = RunningFlag::new();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.stopped().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        flag.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("stopped() did not resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stopped_resolves_immediately_when_already_stopped() {
        let flag = RunningFlag::new();
        flag.stop();
        tokio::time::timeout(Duration::from_millis(100), flag.stopped())
            .await
            .expect("stopped() should not block");
    }

    #[tokio::test]
    async fn test_signal_task_exits_when_stopped_elsewhere() {
        let flag = RunningFlag::new();
        let handle = install_signal_handlers(flag.clone()).unwrap();

        flag.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("signal task should exit")
            .unwrap();
    }
}
