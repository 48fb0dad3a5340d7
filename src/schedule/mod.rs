//! Cancellable timers on the Tokio runtime.
//!
//! Each scheduled task is a spawned Tokio task. The returned [`TaskHandle`]
//! aborts it when cancelled or dropped, so a task never fires after its
//! handle is gone. Both functions must be called from inside a runtime.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    task: JoinHandle<()>,
}

impl TaskHandle {
    fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::trace!(task = name, "scheduled task started");
        Self {
            name,
            task: tokio::spawn(future),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `false` once the task has fired its last time or been cancelled.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            tracing::trace!(task = self.name, "scheduled task cancelled");
        }
        self.task.abort();
    }
}

/// Runs `task` once after `delay` unless the handle goes away first.
pub fn schedule_once<F>(name: &'static str, delay: Duration, task: F) -> TaskHandle
where
    F: FnOnce() + Send + 'static,
{
    TaskHandle::spawn(name, async move {
        time::sleep(delay).await;
        task();
    })
}

/// Runs `task` every `interval`, first after one full interval, until it
/// breaks or the handle goes away.
pub fn schedule_repeating<F>(name: &'static str, interval: Duration, mut task: F) -> TaskHandle
where
    F: FnMut() -> ControlFlow<()> + Send + 'static,
{
    TaskHandle::spawn(name, async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if task().is_break() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    const SHORT: Duration = Duration::from_millis(20);

    #[tokio::test(start_paused = true)]
    async fn once_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        let _handle = schedule_once("test-once", SHORT, move || {
            let _ = tx.send(());
        });

        rx.recv().await.expect("task should fire");
        assert!(started.elapsed() >= SHORT);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_once_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let handle = schedule_once("test-cancel", SHORT, move || {
            let _ = tx.send(());
        });
        handle.cancel();

        // Aborting drops the closure and with it the only sender.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_cancels() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        drop(schedule_once("test-drop", SHORT, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        time::sleep(SHORT * 5).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_runs_until_break() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = schedule_repeating("test-repeat", SHORT, move || {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        });

        time::sleep(SHORT * 10).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_stops_on_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = schedule_repeating("test-repeat-cancel", SHORT, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        assert!(handle.is_active());
        assert_eq!(handle.name(), "test-repeat-cancel");

        time::sleep(SHORT * 3 + SHORT / 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        handle.cancel();
        time::sleep(SHORT * 4).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
