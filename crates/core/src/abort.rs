//! Cancellation of an in-flight send.

use std::future::pending;
use std::sync::Arc;

use tokio::sync::watch;

/// Creates a connected abort handle and signal.
pub fn pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle(Arc::new(tx)), AbortSignal(rx))
}

/// Requests that the associated send stops.
///
/// The handle can be cloned and moved to another task, e.g. a Ctrl-C
/// listener. Aborting more than once has no further effect.
#[derive(Clone, Debug)]
pub struct AbortHandle(Arc<watch::Sender<bool>>);

impl AbortHandle {
    /// Aborts the associated send.
    #[inline]
    pub fn abort(&self) {
        self.0.send_replace(true);
    }

    /// Returns `true` if [`abort`](Self::abort) has been called.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        *self.0.borrow()
    }
}

/// The receiving side of an [`AbortHandle`].
#[derive(Clone, Debug)]
pub struct AbortSignal(watch::Receiver<bool>);

impl AbortSignal {
    /// Returns a signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = pair();
        signal
    }

    /// Returns `true` if the send has been aborted.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits until the send is aborted.
    ///
    /// If every handle is dropped without aborting, this waits forever.
    pub async fn aborted(&mut self) {
        if self.0.wait_for(|aborted| *aborted).await.is_err() {
            pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let (handle, mut signal) = pair();
        let other = handle.clone();
        assert!(!signal.is_aborted());

        handle.abort();
        other.abort();
        assert!(handle.is_aborted());
        assert!(signal.is_aborted());
        signal.aborted().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_fires() {
        let mut signal = AbortSignal::never();
        let result =
            timeout(Duration::from_secs(3600), signal.aborted()).await;
        assert!(result.is_err());
        assert!(!signal.is_aborted());
    }

    #[tokio::test]
    async fn test_abort_from_another_task() {
        let (handle, mut signal) = pair();
        tokio::spawn(async move { handle.abort() });
        signal.aborted().await;
    }
}
