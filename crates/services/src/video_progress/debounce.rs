use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A cancellable action scheduled to run after a delay.
///
/// Each task carries a token so the owner can tell whether the slot it is
/// stored in still refers to this task when it fires. The action itself is
/// expected to claim its slot (compare tokens and clear it) before doing any
/// work, so a later `cancel` never interrupts work that has already begun.
#[derive(Debug)]
pub(crate) struct DelayedTask {
    token: u64,
    handle: JoinHandle<()>,
}

impl DelayedTask {
    /// Spawn `action` on the current tokio runtime after `delay`.
    pub(crate) fn spawn<F>(token: u64, delay: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Deadline is fixed here, not when the spawned task is first polled.
        let sleep = tokio::time::sleep(delay);
        let handle = tokio::spawn(async move {
            sleep.await;
            action.await;
        });
        Self { token, handle }
    }

    pub(crate) fn token(&self) -> u64 {
        self.token
    }

    /// Abort the task if it has not fired yet. Safe to call at any time.
    pub(crate) fn cancel(self) {
        self.handle.abort();
    }
}
