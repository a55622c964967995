//! Periodic progress polling alongside a long-running session.
//!
//! While one session copies or unpacks a large file, a second task runs
//! short sessions (for example a remote `ls -l`) to report progress. The
//! poller is stopped through a one-way signal and joined with a bounded wait.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Handle to a running poll task.
#[derive(Debug)]
pub struct ProgressPoller {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ProgressPoller {
    /// Run `poll` every `interval` on a new task until stopped.
    ///
    /// The first poll runs immediately. Poll errors are logged and the
    /// polling continues.
    pub fn spawn<F, Fut>(interval: Duration, mut poll: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                if *stopped.borrow() {
                    break;
                }
                if let Err(e) = poll().await {
                    debug!("Progress poll failed: {}", e);
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = stopped.changed() => {
                        // The handle was dropped without stopping.
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Progress poller stopped");
        });

        Self { stop, handle }
    }

    /// Signal the task to stop and wait at most `join_timeout` for it.
    ///
    /// Returns `false` if the task was still running when the wait ran out;
    /// it is then left to finish on its own.
    pub async fn stop(self, join_timeout: Duration) -> bool {
        let _ = self.stop.send(true);
        match tokio::time::timeout(join_timeout, self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Progress poller ended abnormally: {}", e);
                true
            }
            Err(_) => {
                warn!(
                    "Progress poller did not stop within {:?}; detaching",
                    join_timeout
                );
                false
            }
        }
    }
}
