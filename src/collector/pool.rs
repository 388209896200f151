//! Bounded-concurrency executor for scrape tasks.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::collector::diagnostics::{DiagnosticsSink, Event, EventKind, EventSeverity};
use crate::collector::task::{ScrapeTask, TaskError};

/// Default number of tasks running at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Final state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Panicked,
    Canceled,
}

/// Outcome counts for every task drained by [`TaskPool::wait`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub succeeded: usize,
    pub failed: usize,
    pub panicked: usize,
    pub canceled: usize,
}

impl PoolReport {
    /// Total number of tasks accounted for.
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.panicked + self.canceled
    }

    /// True if every task succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total()
    }

    fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Succeeded => self.succeeded += 1,
            TaskOutcome::Failed => self.failed += 1,
            TaskOutcome::Panicked => self.panicked += 1,
            TaskOutcome::Canceled => self.canceled += 1,
        }
    }
}

impl std::fmt::Display for PoolReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} panicked, {} canceled",
            self.succeeded, self.failed, self.panicked, self.canceled
        )
    }
}

/// Runs scrape tasks in parallel under a fixed permit count.
///
/// Each task is isolated: a fetch error, handler error or panic ends only that
/// task and is reported to the diagnostics sink. The pool never retries.
/// Once the cancellation token fires, tasks still waiting for a permit are
/// reported as canceled without starting.
///
/// Dropping the pool aborts every task that has not been drained by
/// [`wait`](Self::wait).
pub struct TaskPool {
    permits: Arc<Semaphore>,
    concurrency: usize,
    cancel: CancellationToken,
    sink: Arc<dyn DiagnosticsSink>,
    tasks: Mutex<JoinSet<TaskOutcome>>,
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("concurrency", &self.concurrency)
            .field("pending", &self.pending())
            .field("canceled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl TaskPool {
    /// Create a pool running at most `concurrency` tasks at once (minimum 1).
    pub fn new(
        concurrency: usize,
        cancel: CancellationToken,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            cancel,
            sink,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of tasks added and not yet drained.
    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Enqueue a task. It starts as soon as a permit is free.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add_task(&self, task: ScrapeTask) {
        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();
        let sink = Arc::clone(&self.sink);

        tracing::trace!(task = %task.name(), "Task enqueued");
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(execute(task, permits, cancel, sink));
    }

    /// Wait for every task added so far and report their outcomes.
    ///
    /// Tasks added while waiting are left for the next call.
    pub async fn wait(&self) -> PoolReport {
        let mut tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );

        let mut report = PoolReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    tracing::error!(error = %e, "Scrape task aborted");
                    report.record(if e.is_cancelled() {
                        TaskOutcome::Canceled
                    } else {
                        TaskOutcome::Panicked
                    });
                }
            }
        }

        tracing::debug!(%report, "Task pool drained");
        report
    }
}

/// Run one task under a permit and report its outcome.
async fn execute(
    task: ScrapeTask,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    sink: Arc<dyn DiagnosticsSink>,
) -> TaskOutcome {
    let name = task.name().to_owned();

    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = permits.acquire_owned() => permit.ok(),
    };
    let Some(_permit) = permit.filter(|_| !cancel.is_cancelled()) else {
        sink.emit(
            Event::new(
                &name,
                EventKind::Canceled,
                EventSeverity::Warn,
                "Task canceled before start",
            )
            .with_payload(serde_json::json!({ "task": name, "started": false })),
        );
        return TaskOutcome::Canceled;
    };

    let start = Instant::now();
    let result = AssertUnwindSafe(task.run()).catch_unwind().await;
    let duration_ms = start.elapsed().as_millis();

    let mut payload = serde_json::json!({ "task": name, "duration_ms": duration_ms });
    let (outcome, kind, severity, message) = match result {
        Ok(Ok(())) => (
            TaskOutcome::Succeeded,
            EventKind::Completed,
            EventSeverity::Debug,
            format!("Task completed in {duration_ms}ms"),
        ),
        Ok(Err(e)) => {
            payload["error"] = serde_json::json!(e.to_string());
            match e {
                e if e.is_canceled() => (
                    TaskOutcome::Canceled,
                    EventKind::Canceled,
                    EventSeverity::Warn,
                    "Task canceled during fetch".to_owned(),
                ),
                TaskError::Fetch(e) => (
                    TaskOutcome::Failed,
                    EventKind::FetchFailed,
                    EventSeverity::Error,
                    format!("Fetch failed: {e}"),
                ),
                TaskError::Handler { index, source } => {
                    payload["handler"] = serde_json::json!(index);
                    (
                        TaskOutcome::Failed,
                        EventKind::HandlerFailed,
                        EventSeverity::Error,
                        format!("Handler {index} failed: {source}"),
                    )
                }
            }
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            payload["error"] = serde_json::json!(reason);
            (
                TaskOutcome::Panicked,
                EventKind::Panicked,
                EventSeverity::Error,
                format!("Task panicked: {reason}"),
            )
        }
    };

    sink.emit(Event::new(&name, kind, severity, message).with_payload(payload));
    outcome
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;

    use crate::collector::diagnostics::MemorySink;
    use crate::collector::task::{FetchFn, Handler, HandlerError};
    use crate::transport::TransportError;

    fn ok_task(name: &str, hits: &Arc<AtomicUsize>) -> ScrapeTask {
        let hits = Arc::clone(hits);
        let handler: Arc<dyn Handler> = Arc::new(move |_: &[u8]| -> Result<(), HandlerError> {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        ScrapeTask::new(
            name,
            FetchFn(|| async { Ok::<_, TransportError>(Bytes::from_static(b"{}")) }),
            vec![handler],
        )
    }

    fn pool(concurrency: usize) -> (TaskPool, Arc<MemorySink>, CancellationToken) {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let pool = TaskPool::new(concurrency, cancel.clone(), sink.clone());
        (pool, sink, cancel)
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let (pool, sink, _cancel) = pool(4);
        let hits = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            pool.add_task(ok_task(&format!("ok-{i}"), &hits));
        }
        pool.add_task(ScrapeTask::new(
            "down",
            FetchFn(|| async { Err::<Bytes, _>(TransportError::Status { code: 503 }) }),
            Vec::new(),
        ));

        let report = pool.wait().await;
        assert_eq!(report.succeeded, 5);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total(), 6);
        assert!(!report.all_succeeded());
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(sink.count(EventKind::FetchFailed), 1);
        assert_eq!(sink.count(EventKind::Completed), 5);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let (pool, sink, _cancel) = pool(2);
        let hits = Arc::new(AtomicUsize::new(0));

        let boom: Arc<dyn Handler> = Arc::new(|_: &[u8]| -> Result<(), HandlerError> {
            panic!("handler exploded")
        });
        pool.add_task(ScrapeTask::new(
            "boom",
            FetchFn(|| async { Ok::<_, TransportError>(Bytes::new()) }),
            vec![boom],
        ));
        pool.add_task(ok_task("fine", &hits));

        let report = pool.wait().await;
        assert_eq!(report.panicked, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let events = sink.events();
        let panicked = events
            .iter()
            .find(|e| e.kind == EventKind::Panicked)
            .unwrap();
        assert_eq!(panicked.source, "task.boom");
        assert!(panicked.message.contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_fetch_panic_is_isolated() {
        let (pool, sink, _cancel) = pool(2);
        let hits = Arc::new(AtomicUsize::new(0));

        pool.add_task(ScrapeTask::new(
            "fetch-boom",
            FetchFn(|| async {
                if true {
                    panic!("fetch exploded");
                }
                Ok::<_, TransportError>(Bytes::new())
            }),
            Vec::new(),
        ));
        pool.add_task(ok_task("fine", &hits));

        let report = pool.wait().await;
        assert_eq!(report.panicked, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let panicked = sink
            .events()
            .into_iter()
            .find(|e| e.kind == EventKind::Panicked)
            .unwrap();
        assert_eq!(panicked.source, "task.fetch-boom");
        assert!(panicked.message.contains("fetch exploded"));
    }

    #[tokio::test]
    async fn test_handler_failure_reported() {
        let (pool, sink, _cancel) = pool(1);
        let reject: Arc<dyn Handler> = Arc::new(|_: &[u8]| -> Result<(), HandlerError> {
            Err(HandlerError::Other("bad body".to_string()))
        });
        pool.add_task(ScrapeTask::new(
            "reject",
            FetchFn(|| async { Ok::<_, TransportError>(Bytes::new()) }),
            vec![reject],
        ));

        let report = pool.wait().await;
        assert_eq!(report.failed, 1);
        let event = &sink.events()[0];
        assert_eq!(event.kind, EventKind::HandlerFailed);
        assert_eq!(event.payload.as_ref().unwrap()["handler"], 0);
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let (pool, _sink, _cancel) = pool(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..12 {
            let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
            pool.add_task(ScrapeTask::new(
                format!("slow-{i}"),
                FetchFn(move || {
                    let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, TransportError>(Bytes::new())
                    }
                }),
                Vec::new(),
            ));
        }

        let report = pool.wait().await;
        assert_eq!(report.succeeded, 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_canceled_tasks_do_not_start() {
        let (pool, sink, cancel) = pool(1);
        let hits = Arc::new(AtomicUsize::new(0));
        cancel.cancel();

        for i in 0..3 {
            pool.add_task(ok_task(&format!("late-{i}"), &hits));
        }

        let report = pool.wait().await;
        assert_eq!(report.canceled, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(sink.count(EventKind::Canceled), 3);
    }

    #[tokio::test]
    async fn test_zero_concurrency_clamped() {
        let (pool, _sink, _cancel) = pool(0);
        assert_eq!(pool.concurrency(), 1);

        let hits = Arc::new(AtomicUsize::new(0));
        pool.add_task(ok_task("only", &hits));
        assert_eq!(pool.pending(), 1);
        assert!(pool.wait().await.all_succeeded());
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_wait_on_empty_pool() {
        let (pool, _sink, _cancel) = pool(2);
        let report = pool.wait().await;
        assert_eq!(report, PoolReport::default());
        assert!(report.all_succeeded());
    }

    #[test]
    fn test_report_display() {
        let report = PoolReport {
            succeeded: 3,
            failed: 1,
            panicked: 0,
            canceled: 2,
        };
        assert_eq!(
            report.to_string(),
            "3 succeeded, 1 failed, 0 panicked, 2 canceled"
        );
    }
}
