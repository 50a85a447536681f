// src/shutdown.rs
//! Cooperative shutdown signal.
//!
//! Every wait in the relay (poll interval, throttle, pacing, retry backoff)
//! goes through [`Shutdown::sleep`] so a stop request interrupts it promptly.

use std::time::Duration;
use tokio::sync::watch;

/// Fires the signal. Dropping it without triggering leaves listeners waiting.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires. A dropped trigger never resolves.
    pub async fn wait(&mut self) {
        if self.is_triggered() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await
    }

    /// Sleep for `dur`. Returns `false` if shutdown interrupted (or preceded) it.
    pub async fn sleep(&mut self, dur: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(dur) => true,
            _ = self.wait() => false,
        }
    }
}
