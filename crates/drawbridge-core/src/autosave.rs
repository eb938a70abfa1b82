//! Autosave Task
//!
//! A cancellable periodic task. The session adapter owns one per mount
//! and cancels it exactly once at close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default interval between autosave ticks
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(10);

/// Periodic background task driving autosave ticks
#[derive(Debug)]
pub struct AutosaveTask {
    cancel: CancellationToken,
    cancelled: AtomicBool,
    handle: JoinHandle<()>,
    interval: Duration,
}

impl AutosaveTask {
    /// Spawn a task calling `tick` every `interval`
    ///
    /// The first tick fires one full interval after spawning. Ticks delayed
    /// by a busy runtime are not replayed in a burst. Must be called from
    /// within a tokio runtime.
    pub fn spawn<F>(interval: Duration, tick: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let first_tick = Instant::now() + interval;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => tick(),
                }
            }
            debug!("Autosave task stopped");
        });

        Self {
            cancel,
            cancelled: AtomicBool::new(false),
            handle,
            interval,
        }
    }

    /// Stop the task; no tick starts after this returns
    ///
    /// Returns `true` on the first call only.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        true
    }

    /// Whether the task has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the background loop has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Interval between ticks
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for AutosaveTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    fn counting_task(interval: Duration) -> (AutosaveTask, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = AutosaveTask::spawn(interval, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (task, ticks)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_interval() {
        let (task, ticks) = counting_task(Duration::from_secs(10));
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        time::advance(Duration::from_secs(9)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert_eq!(task.interval(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let (task, ticks) = counting_task(Duration::from_secs(10));
        time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        assert!(task.cancel());
        assert!(!task.cancel());
        assert!(task.is_cancelled());

        time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (task, ticks) = counting_task(Duration::from_secs(10));
        drop(task);
        time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
