// Atomic Queue Module
//
// INTENTION:
// Serialize tasks that mutate the node's shared tables (registry, code
// store, live instance table) across several suspension points. Tasks are
// executed by a single worker, strictly one at a time and in submission
// order; a task that suspends (for example while awaiting a nested
// dispatch) still holds the queue until it completes.
//
// ARCHITECTURAL PRINCIPLES:
// 1. Submission never blocks - tasks go into an unbounded FIFO channel
// 2. Failure isolation - an error or panic in one task is reported to its
//    submitter only; the worker keeps going
// 3. Explicit shutdown - a closed queue refuses new work with QueueClosed
//
// A task must never await the completion of another task submitted to the
// same queue: the worker would wait for itself.

use futures_util::FutureExt;
use inai_common::logging::Logger;
use inai_common::{log_debug, log_error, log_warn};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::{panic_message, MeshError};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Single-consumer, multi-producer serialized task executor
pub struct AtomicQueue {
    // `None` tells the worker to stop after draining what was queued before it
    sender: mpsc::UnboundedSender<Option<Job>>,
    closed: AtomicBool,
    next_task: AtomicU64,
    logger: Arc<Logger>,
}

impl AtomicQueue {
    /// Create the queue and spawn its worker on the current tokio runtime.
    pub fn new(logger: Arc<Logger>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Option<Job>>();
        let worker_logger = logger.clone();
        tokio::spawn(async move {
            while let Some(Some(job)) = receiver.recv().await {
                job.await;
            }
            log_debug!(worker_logger, "atomic queue worker stopped");
        });

        Self {
            sender,
            closed: AtomicBool::new(false),
            next_task: AtomicU64::new(1),
            logger,
        }
    }

    /// Submit a task.
    ///
    /// The task is enqueued immediately, before the returned future is first
    /// polled, so the order of `atomic` calls is the execution order. The
    /// future resolves with the task's result once it has run; only this
    /// submitter observes the task's failure.
    pub fn atomic<F, Fut, T>(
        &self,
        task: F,
    ) -> impl Future<Output = Result<T, MeshError>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let task_id = self.next_task.fetch_add(1, Ordering::SeqCst);
        let (result_tx, result_rx) = oneshot::channel::<Result<T, MeshError>>();
        let logger = self.logger.clone();

        let job: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(async move { task().await })
                .catch_unwind()
                .await;
            let result = match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => {
                    log_warn!(logger, "atomic task {} failed: {}", task_id, err);
                    Err(MeshError::Task(err))
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log_error!(logger, "atomic task {} panicked: {}", task_id, message);
                    Err(MeshError::TaskPanicked(message))
                }
            };
            // The submitter may have stopped waiting.
            let _ = result_tx.send(result);
        });

        let submitted = !self.closed.load(Ordering::SeqCst) && self.sender.send(Some(job)).is_ok();

        async move {
            if !submitted {
                return Err(MeshError::QueueClosed);
            }
            // A dropped sender means the job never ran (queue closed under us).
            result_rx.await.unwrap_or(Err(MeshError::QueueClosed))
        }
    }

    /// Refuse further tasks. Tasks already queued still run.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log_debug!(self.logger, "closing atomic queue");
            let _ = self.sender.send(None);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use inai_common::logging::Component;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn queue() -> Arc<AtomicQueue> {
        Arc::new(AtomicQueue::new(Arc::new(Logger::new_root(
            Component::AtomicQueue,
            "test-node",
        ))))
    }

    #[tokio::test]
    async fn test_tasks_run_in_order_without_overlap() {
        let queue = queue();
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut pending = Vec::new();
        for i in 0..5u64 {
            let events = events.clone();
            pending.push(queue.atomic(move || async move {
                events.lock().unwrap().push(format!("start {i}"));
                // Earlier tasks sleep longer; they must still finish first.
                sleep(Duration::from_millis(25 - i * 5)).await;
                events.lock().unwrap().push(format!("end {i}"));
                Ok(i)
            }));
        }

        let mut handles = Vec::new();
        for fut in pending {
            handles.push(tokio::spawn(fut));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let value = timeout(Duration::from_secs(5), handle)
                .await
                .expect("task timed out")
                .expect("join failed")
                .expect("task failed");
            assert_eq!(value, i as u64);
        }

        let events = events.lock().unwrap().clone();
        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("start {i}"), format!("end {i}")])
            .collect();
        assert_eq!(events, expected);
    }

    #[tokio::test]
    async fn test_failing_task_does_not_halt_queue() {
        let queue = queue();

        let failing = queue.atomic(|| async { Err::<(), _>(anyhow!("task error")) });
        let panicking = queue.atomic(|| async {
            if true {
                panic!("task panic");
            }
            Ok(())
        });
        let next = queue.atomic(|| async { Ok("still running") });

        assert!(matches!(failing.await, Err(MeshError::Task(_))));
        match panicking.await {
            Err(MeshError::TaskPanicked(message)) => assert_eq!(message, "task panic"),
            other => panic!("expected panic error, got {other:?}"),
        }
        let value = timeout(Duration::from_secs(5), next)
            .await
            .expect("queue stalled");
        assert_eq!(value.unwrap(), "still running");
    }

    #[tokio::test]
    async fn test_closed_queue_refuses_tasks() {
        let queue = queue();
        let before = queue.atomic(|| async { Ok(1) });
        queue.close();
        assert!(queue.is_closed());

        assert_eq!(before.await.unwrap(), 1);
        let after = queue.atomic(|| async { Ok(2) }).await;
        assert!(matches!(after, Err(MeshError::QueueClosed)));
        // Closing twice is harmless.
        queue.close();
    }
}
