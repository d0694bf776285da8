//! Cooperative shutdown for the background loops.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

/// Fires the shutdown signal. Dropping the trigger fires it as well.
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving side, cloned into every loop.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Drop for ShutdownTrigger {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn cancelled(&mut self) {
        // An error means the trigger is gone, which counts as shutdown.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` unless shutdown comes first. Returns false on shutdown.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            biased;

            _ = self.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }
}

/// Run `pass` every `interval` until shutdown. A pass in progress is allowed
/// to finish; no new pass starts after the signal.
pub fn spawn_loop<F, Fut>(name: &'static str, interval: Duration, mut shutdown: Shutdown, mut pass: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!("{} loop started ({:?})", name, interval);
        while shutdown.sleep(interval).await {
            pass().await;
        }
        debug!("{} loop stopped", name);
    })
}
