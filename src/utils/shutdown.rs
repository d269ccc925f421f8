//! Cooperative cancellation built on a `watch` channel

use std::time::Duration;
use tokio::sync::watch;

use crate::error::{Error, Result};

/// Sending half; flips the signal for every clone of [`ShutdownSignal`]
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Trigger shutdown
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half, checked between iterations and inside every sleep
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair
pub fn channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

impl ShutdownSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_, signal) = channel();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Return `Err(Cancelled)` if shutdown was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Sleep for `duration` unless shutdown is requested first
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        let mut rx = self.rx.clone();
        if *rx.borrow_and_update() {
            return Err(Error::Cancelled);
        }

        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                changed = rx.changed() => match changed {
                    Ok(()) => {
                        if *rx.borrow_and_update() {
                            return Err(Error::Cancelled);
                        }
                    }
                    // Sender gone: nobody can cancel any more
                    Err(_) => {
                        (&mut sleep).await;
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Resolve once shutdown is requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
