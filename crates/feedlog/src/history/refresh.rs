//! Periodic background refresh of the feeding history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::HistoryManager;

#[derive(Debug, Default)]
struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn should_stop(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Handle to a running periodic refresh task.
///
/// The task waits for the manager to become ready, then refreshes once per
/// interval. Failed refreshes are logged and polling continues. Dropping
/// the handle aborts the task.
#[derive(Debug)]
pub struct RefreshHandle {
    interval: Duration,
    signal: Arc<StopSignal>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    pub(super) fn spawn(manager: Arc<HistoryManager>, interval: Duration) -> Self {
        let signal = Arc::new(StopSignal::default());
        let task_signal = Arc::clone(&signal);

        let task = tokio::spawn(async move {
            tokio::select! {
                ready = manager.wait_until_ready() => {
                    if let Err(e) = ready {
                        warn!("Periodic refresh not started: {e}");
                        return;
                    }
                }
                () = task_signal.notify.notified() => return,
            }

            info!("Refreshing feeding history every {}s", interval.as_secs());
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = task_signal.notify.notified() => {}
                }
                if task_signal.should_stop() {
                    break;
                }

                match manager.refresh().await {
                    Ok(()) => debug!("Periodic refresh complete"),
                    Err(e) => warn!("Periodic refresh failed: {e}"),
                }
            }
            debug!("Periodic refresh stopped");
        });

        Self {
            interval,
            signal,
            task: Some(task),
        }
    }

    /// The refresh interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signal the task to stop after any refresh in progress.
    pub fn stop(&self) {
        self.signal.stop();
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.signal.should_stop()
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Periodic refresh task failed: {e}");
                }
            }
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
