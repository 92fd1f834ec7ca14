//! Background work lifecycle for the invocation and naming runtimes.
//!
//! The binaries here run exactly two kinds of background work: the
//! discovery-cache refresher and the log retention sweep. Both register
//! with a [`TaskSet`] owned by the binary; shutting the set down signals
//! every task at once, joins them, and reports how each one ended.
//! Dropping a set that was never shut down aborts whatever is still
//! running, so an early return in the owner cannot leak a live loop.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A long-running unit of background work. `run` owns the task until it
/// finishes on its own or `shutdown_signal` fires; returning `Err` marks
/// the task failed in the shutdown report.
#[async_trait]
pub trait Task: Send {
    const NAME: &'static str;

    async fn run(self, shutdown_signal: ShutdownSignal) -> anyhow::Result<()>;
}

/// Receiving side of a [`TaskSet`]'s shutdown channel; cheap to clone.
/// Also wakes when the owning set is dropped, so a task never waits on a
/// channel nobody can signal anymore.
#[derive(Clone, Debug)]
pub struct ShutdownSignal(tokio::sync::watch::Receiver<()>);

impl ShutdownSignal {
    pub async fn wait(&mut self) {
        let _ = self.0.changed().await;
    }
}

/// Owns every background task a binary runs.
pub struct TaskSet {
    shutdown_tx: tokio::sync::watch::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<anyhow::Result<()>>)>,
}

impl TaskSet {
    pub fn new() -> Self {
        let (shutdown_tx, _) = tokio::sync::watch::channel(());
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// A signal wired to this set, for work that wants to observe shutdown
    /// without being owned by the set (e.g. a task spawned elsewhere).
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal(self.shutdown_tx.subscribe())
    }

    /// Spawns `task` onto the runtime and takes ownership of its handle.
    pub fn spawn<T>(&mut self, task: T)
    where
        T: Task + 'static,
    {
        let signal = self.shutdown_signal();
        self.tasks.push((T::NAME, tokio::task::spawn(task.run(signal))));
    }

    /// Signals shutdown, then waits for every owned task and reports each
    /// outcome.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        for (name, handle) in self.tasks.drain(..) {
            match handle.await {
                Ok(Ok(())) => info!(task = name, "background task stopped"),
                Ok(Err(error)) => error!(task = name, %error, "background task failed"),
                Err(join_error) if join_error.is_cancelled() => {}
                Err(join_error) => error!(task = name, %join_error, "background task panicked"),
            }
        }
    }
}

impl Default for TaskSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct StopsOnSignal {
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Task for StopsOnSignal {
        const NAME: &'static str = "stops on signal";

        async fn run(self, mut shutdown_signal: ShutdownSignal) -> anyhow::Result<()> {
            shutdown_signal.wait().await;
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NeverFinishes {
        _held: tokio::sync::oneshot::Sender<()>,
    }

    #[async_trait]
    impl Task for NeverFinishes {
        const NAME: &'static str = "never finishes";

        async fn run(self, _shutdown_signal: ShutdownSignal) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn shutdown_signals_and_joins_every_registered_task() {
        let stopped = Arc::new(AtomicBool::new(false));
        let mut tasks = TaskSet::new();
        tasks.spawn(StopsOnSignal {
            stopped: Arc::clone(&stopped),
        });
        tasks.shutdown().await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropping_the_set_aborts_tasks_that_never_observed_shutdown() {
        let (held_tx, held_rx) = tokio::sync::oneshot::channel::<()>();
        let mut tasks = TaskSet::new();
        tasks.spawn(NeverFinishes { _held: held_tx });
        drop(tasks);
        // The abort drops the task's future, which drops the held sender.
        assert!(held_rx.await.is_err());
    }
}
