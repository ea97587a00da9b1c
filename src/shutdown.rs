use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Process-wide stop flag shared by the controller and the loops.
///
/// The flag flips exactly once. Loops check it at the top of every cycle and
/// wait on [`Shutdown::cancelled`] wherever they would otherwise block.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    token: CancellationToken,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Returns `true` only for the call that actually
    /// flipped it; later calls are no-ops.
    pub fn trigger(&self, reason: &str) -> bool {
        let flipped = self.raise(reason);
        if !flipped {
            warn!(reason, "Shutdown already in progress, ignoring repeated request");
        }
        flipped
    }

    /// Raises the flag once a loop has returned on its own. A flag already
    /// raised by a signal is left alone without a warning.
    pub fn complete(&self, reason: &str) {
        if !self.raise(reason) {
            debug!(reason, "Shutdown already in progress");
        }
    }

    fn raise(&self, reason: &str) -> bool {
        let flipped = self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if flipped {
            info!(reason, "Shutdown requested, finishing in-flight work");
            self.token.cancel();
        }
        flipped
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is raised.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Spawns a listener that raises the flag on SIGINT or SIGTERM. The
    /// listener keeps running so repeated signals are absorbed.
    pub fn install_signal_handlers(&self) -> std::io::Result<JoinHandle<()>> {
        let shutdown = self.clone();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            Ok(tokio::spawn(async move {
                loop {
                    let name = tokio::select! {
                        Some(()) = sigterm.recv() => "SIGTERM",
                        Some(()) = sigint.recv() => "SIGINT",
                        else => break,
                    };
                    shutdown.trigger(name);
                }
            }))
        }

        #[cfg(not(unix))]
        {
            Ok(tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.trigger("ctrl-c");
                }
            }))
        }
    }
}
