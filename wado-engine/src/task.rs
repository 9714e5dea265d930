//! A single series' load task: the handle the host holds, mediating between
//! the [`crate::scheduler::DownloadQueue`] and the [`crate::manager`] worker
//! that actually runs the download.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::model::{OpeningStrategy, Progress, SeriesRef, TaskStatus};

/// The host-facing handle for one series download. Cloning shares the same
/// underlying task: every clone observes the same status and can cancel it.
#[derive(Clone)]
pub struct LoadSeriesTask {
    series: Arc<SeriesRef>,
    strategy: OpeningStrategy,
    cancel: CancellationToken,
    status_rx: watch::Receiver<TaskStatus>,
    progress_rx: watch::Receiver<Progress>,
    error_count_rx: watch::Receiver<u64>,
    pause_tx: watch::Sender<bool>,
    pause_rx: watch::Receiver<bool>,
}

/// The manager-facing half, used to publish status/progress updates. Kept
/// separate from [`LoadSeriesTask`] so only the worker driving the download
/// can advance the state machine.
pub struct TaskHandle {
    status_tx: watch::Sender<TaskStatus>,
    progress_tx: watch::Sender<Progress>,
    error_count_tx: watch::Sender<u64>,
}

pub fn new_task(series: SeriesRef, strategy: OpeningStrategy) -> (LoadSeriesTask, TaskHandle) {
    let (status_tx, status_rx) = watch::channel(TaskStatus::Queued);
    let (progress_tx, progress_rx) = watch::channel(Progress::new(series.len()));
    let (error_count_tx, error_count_rx) = watch::channel(0u64);
    let (pause_tx, pause_rx) = watch::channel(false);
    let cancel = CancellationToken::new();
    (
        LoadSeriesTask {
            series: Arc::new(series),
            strategy,
            cancel,
            status_rx,
            progress_rx,
            error_count_rx,
            pause_tx,
            pause_rx,
        },
        TaskHandle {
            status_tx,
            progress_tx,
            error_count_tx,
        },
    )
}

impl LoadSeriesTask {
    pub fn series(&self) -> &SeriesRef {
        &self.series
    }

    pub fn strategy(&self) -> OpeningStrategy {
        self.strategy
    }

    pub fn status(&self) -> TaskStatus {
        *self.status_rx.borrow()
    }

    pub fn progress(&self) -> Progress {
        *self.progress_rx.borrow()
    }

    /// The number of jobs that have failed so far. Monotonically
    /// non-decreasing for the lifetime of the task.
    pub fn error_count(&self) -> u64 {
        *self.error_count_rx.borrow()
    }

    /// Requests cancellation. Idempotent; the worker observes this via its
    /// `CancellationToken` and winds down the current job before the task
    /// transitions to [`TaskStatus::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests that the manager suspend dispatching new `DownloadJob`s for
    /// this task once its in-flight jobs drain, without cancelling it.
    /// `paused` is reachable from `downloading` and reversible. A no-op if
    /// the task is not currently downloading.
    pub fn pause(&self) {
        if self.status() == TaskStatus::Downloading {
            let _ = self.pause_tx.send(true);
        }
    }

    /// Reverses a prior [`LoadSeriesTask::pause`], letting the manager
    /// resume dispatching jobs.
    pub fn resume(&self) {
        let _ = self.pause_tx.send(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_rx.borrow()
    }

    pub(crate) fn pause_receiver(&self) -> watch::Receiver<bool> {
        self.pause_rx.clone()
    }

    /// Waits until the task leaves [`TaskStatus::Queued`] and
    /// [`TaskStatus::Downloading`].
    pub async fn wait_terminal(&mut self) -> TaskStatus {
        loop {
            let status = *self.status_rx.borrow();
            if matches!(
                status,
                TaskStatus::Complete | TaskStatus::Error | TaskStatus::Cancelled
            ) {
                return status;
            }
            if self.status_rx.changed().await.is_err() {
                return self.status();
            }
        }
    }
}

impl TaskHandle {
    pub fn set_status(&self, status: TaskStatus) {
        let _ = self.status_tx.send(status);
    }

    pub fn set_progress(&self, progress: Progress) {
        let _ = self.progress_tx.send(progress);
    }

    /// Increments the task's error count by one.
    pub fn record_error(&self) {
        self.error_count_tx.send_modify(|count| *count += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WadoEndpoint;

    fn sample_series() -> SeriesRef {
        let mut series = SeriesRef::new("1.1", "2.2", "3.3", WadoEndpoint::new("http://x"));
        series.instances.push(crate::model::SopInstanceRef::new("1.2.3"));
        series
    }

    #[test]
    fn new_task_starts_queued() {
        let (task, _handle) = new_task(sample_series(), OpeningStrategy::Eager);
        assert_eq!(task.status(), TaskStatus::Queued);
        assert!(!task.is_cancelled());
    }

    #[tokio::test]
    async fn wait_terminal_observes_completion() {
        let (mut task, handle) = new_task(sample_series(), OpeningStrategy::Eager);
        handle.set_status(TaskStatus::Downloading);
        handle.set_status(TaskStatus::Complete);
        assert_eq!(task.wait_terminal().await, TaskStatus::Complete);
    }

    #[test]
    fn cancelling_is_observable_on_every_clone() {
        let (task, _handle) = new_task(sample_series(), OpeningStrategy::Eager);
        let clone = task.clone();
        task.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn error_count_is_monotonically_non_decreasing() {
        let (task, handle) = new_task(sample_series(), OpeningStrategy::Eager);
        assert_eq!(task.error_count(), 0);
        handle.record_error();
        assert_eq!(task.error_count(), 1);
        handle.record_error();
        handle.record_error();
        assert_eq!(task.error_count(), 3);
    }

    #[test]
    fn pausing_only_takes_effect_while_downloading() {
        let (task, handle) = new_task(sample_series(), OpeningStrategy::Eager);
        task.pause();
        assert!(!task.is_paused(), "queued tasks cannot be paused");

        handle.set_status(TaskStatus::Downloading);
        task.pause();
        assert!(task.is_paused());

        task.resume();
        assert!(!task.is_paused());
    }
}
