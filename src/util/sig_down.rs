use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Turns SIGTERM and SIGINT into cancellation of pending payment submissions.
///
/// Hand [`SigDown::submission_token`] to each `submit_payment` call: a signal aborts the
/// in-flight gateway request or backoff sleep, and no further attempt is started.
pub struct SigDown {
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl SigDown {
    /// Registers the signal handlers. Must run inside a Tokio runtime.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let cancellation_token = CancellationToken::new();
        let on_signal = cancellation_token.clone();
        let task_tracker = TaskTracker::new();
        task_tracker.spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::warn!("SIGTERM received, cancelling payment submissions"),
                _ = sigint.recv() => tracing::warn!("SIGINT received, cancelling payment submissions"),
                _ = on_signal.cancelled() => return,
            }
            on_signal.cancel();
        });
        task_tracker.close();
        Ok(Self {
            task_tracker,
            cancellation_token,
        })
    }

    /// A token cancelled on shutdown. Cancelling it does not affect other submissions.
    pub fn submission_token(&self) -> CancellationToken {
        self.cancellation_token.child_token()
    }

    /// Cancels everything as if a signal had arrived and waits for the listener to stop.
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        self.task_tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_cancels_submission_tokens() {
        let sig_down = SigDown::try_new().unwrap();
        let first = sig_down.submission_token();
        let second = sig_down.submission_token();
        first.cancel();
        assert!(!second.is_cancelled());

        sig_down.shutdown().await;
        assert!(second.is_cancelled());
        assert!(sig_down.submission_token().is_cancelled());
    }
}
