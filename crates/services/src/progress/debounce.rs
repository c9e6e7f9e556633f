use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// An owned, cancellable one-shot delay in front of a background task.
///
/// Scheduling replaces whatever was pending. Once the delay elapses the task
/// is detached onto the runtime, so cancelling only ever stops work that has
/// not started yet. Dropping the timer cancels it.
#[derive(Debug, Default)]
pub struct DebounceTimer {
    handle: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay` unless cancelled or rescheduled first.
    ///
    /// Returns `false` when no tokio runtime is available; nothing is scheduled then.
    pub fn schedule<F>(&mut self, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let Ok(runtime) = Handle::try_current() else {
            return false;
        };
        let spawner = runtime.clone();
        self.handle = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            drop(spawner.spawn(task));
        }));
        true
    }

    /// Cancels the pending task. Returns whether one was still waiting.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
