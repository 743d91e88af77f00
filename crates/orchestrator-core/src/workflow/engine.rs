//! InProcessEngine: a workflow gateway that runs processes on the local
//! runtime.
//!
//! `start` only enqueues; a dispatcher task drains the bounded job queue and
//! runs each job on its own task, with at most `worker_count` jobs executing
//! at once. Nothing here waits for a process to finish. Results reach callers
//! through the correlation registry.
//!
//! ```text
//!  start() ──try_send──▶ [ job queue ] ──▶ dispatcher ──permit──▶ StepHandler::execute
//!                                                                   │
//!                                           registry.complete(id) ◀─┘
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;

use super::gateway::WorkflowStepGateway;
use super::steps::{ProcessRequest, StepOutcome};
use crate::error::GatewayError;
use crate::registry::CorrelationRegistry;
use crate::types::CorrelationId;

/// Keys are allocated like a partitioned engine's: partition 1 in the high
/// bits, a sequence below.
const FIRST_PROCESS_KEY: u64 = (1 << 51) + 1;

/// Executes the steps of one process instance.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, correlation_id: CorrelationId, request: ProcessRequest);
}

struct ProcessJob {
    correlation_id: CorrelationId,
    request: ProcessRequest,
}

pub struct InProcessEngine {
    next_key: AtomicU64,
    jobs: mpsc::Sender<ProcessJob>,
}

impl InProcessEngine {
    /// Start the dispatcher and return the engine plus the dispatcher's
    /// join handle. The dispatcher exits when `shutdown_rx` flips to true.
    pub fn spawn(
        handler: Arc<dyn StepHandler>,
        registry: Arc<CorrelationRegistry<StepOutcome>>,
        worker_count: usize,
        queue_capacity: usize,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let engine = Arc::new(Self {
            next_key: AtomicU64::new(FIRST_PROCESS_KEY),
            jobs: tx,
        });

        let dispatcher = Dispatcher {
            handler,
            registry,
            permits: Arc::new(Semaphore::new(worker_count.max(1))),
        };
        let task = tokio::spawn(dispatcher.run(rx, shutdown_rx));

        tracing::info!(worker_count, queue_capacity, "InProcessEngine started");
        (engine, task)
    }
}

#[async_trait]
impl WorkflowStepGateway for InProcessEngine {
    fn reserve(&self) -> CorrelationId {
        CorrelationId(self.next_key.fetch_add(1, Ordering::Relaxed))
    }

    async fn start(
        &self,
        correlation_id: CorrelationId,
        request: ProcessRequest,
    ) -> Result<(), GatewayError> {
        let process_key = request.process_key();
        self.jobs
            .try_send(ProcessJob {
                correlation_id,
                request,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => GatewayError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => {
                    GatewayError::Unavailable("engine is shut down".to_string())
                }
            })?;

        tracing::info!(
            correlation_id = %correlation_id,
            process_key,
            "Started process instance"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

struct Dispatcher {
    handler: Arc<dyn StepHandler>,
    registry: Arc<CorrelationRegistry<StepOutcome>>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    async fn run(self, mut rx: mpsc::Receiver<ProcessJob>, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let job = tokio::select! {
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
                _ = shutdown_rx.changed() => break,
            };

            let permit = tokio::select! {
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown_rx.changed() => {
                    self.abort(job.correlation_id, "engine shutting down");
                    break;
                }
            };

            let handler = self.handler.clone();
            let registry = self.registry.clone();
            tokio::spawn(async move {
                let ProcessJob {
                    correlation_id,
                    request,
                } = job;
                let process_key = request.process_key();

                // Run on a child task so a panicking step still releases its caller.
                let step = tokio::spawn(async move { handler.execute(correlation_id, request).await });
                if let Err(e) = step.await {
                    tracing::error!(
                        correlation_id = %correlation_id,
                        process_key,
                        error = %e,
                        "Process step crashed"
                    );
                    registry.complete(
                        correlation_id,
                        StepOutcome::Aborted {
                            reason: format!("{process_key} step crashed"),
                        },
                    );
                }
                drop(permit);
            });
        }

        // Release callers whose jobs will never run.
        rx.close();
        while let Ok(job) = rx.try_recv() {
            self.abort(job.correlation_id, "engine shutting down");
        }
        tracing::info!("InProcessEngine dispatcher stopped");
    }

    fn abort(&self, correlation_id: CorrelationId, reason: &str) {
        self.registry.complete(
            correlation_id,
            StepOutcome::Aborted {
                reason: reason.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChallengeId, OperationId, Recipient};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Completes every job with a fixed outcome after an optional gate.
    struct EchoHandler {
        registry: Arc<CorrelationRegistry<StepOutcome>>,
        gate: Option<Arc<Notify>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl EchoHandler {
        fn new(registry: Arc<CorrelationRegistry<StepOutcome>>, gate: Option<Arc<Notify>>) -> Arc<Self> {
            Arc::new(Self {
                registry,
                gate,
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StepHandler for EchoHandler {
        async fn execute(&self, correlation_id: CorrelationId, request: ProcessRequest) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            match &self.gate {
                Some(gate) => gate.notified().await,
                None => tokio::time::sleep(Duration::from_millis(5)).await,
            }
            if let ProcessRequest::ValidateCode { code, .. } = &request {
                if code == "panic" {
                    panic!("step blew up");
                }
            }

            self.running.fetch_sub(1, Ordering::SeqCst);
            self.registry.complete(
                correlation_id,
                StepOutcome::ChallengeIssued {
                    operation_id: OperationId(1),
                    challenge_id: ChallengeId(1),
                    expires_at: chrono::Utc::now(),
                },
            );
        }
    }

    fn send_request() -> ProcessRequest {
        ProcessRequest::SendVerification {
            recipient: Recipient::email("a@b.com"),
        }
    }

    #[tokio::test]
    async fn test_reserve_allocates_distinct_keys() {
        let registry = Arc::new(CorrelationRegistry::new());
        let handler = EchoHandler::new(registry.clone(), None);
        let (_tx, rx) = watch::channel(false);
        let (engine, _task) = InProcessEngine::spawn(handler, registry, 1, 4, rx);

        let a = engine.reserve();
        let b = engine.reserve();
        assert_eq!(a, CorrelationId(2251799813685249));
        assert_eq!(b.0, a.0 + 1);
    }

    #[tokio::test]
    async fn test_started_job_completes_waiter() {
        let registry = Arc::new(CorrelationRegistry::new());
        let handler = EchoHandler::new(registry.clone(), None);
        let (_tx, rx) = watch::channel(false);
        let (engine, _task) = InProcessEngine::spawn(handler, registry.clone(), 2, 4, rx);

        let id = engine.reserve();
        let handle = registry.register(id).unwrap();
        engine.start(id, send_request()).await.unwrap();

        let outcome = registry.wait(handle, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.kind(), "challenge_issued");
    }

    #[tokio::test]
    async fn test_worker_count_bounds_concurrency() {
        let registry = Arc::new(CorrelationRegistry::new());
        let handler = EchoHandler::new(registry.clone(), None);
        let (_tx, rx) = watch::channel(false);
        let (engine, _task) =
            InProcessEngine::spawn(handler.clone(), registry.clone(), 3, 32, rx);

        let mut handles = Vec::new();
        for _ in 0..12 {
            let id = engine.reserve();
            handles.push(registry.register(id).unwrap());
            engine.start(id, send_request()).await.unwrap();
        }
        for handle in handles {
            registry.wait(handle, Duration::from_secs(5)).await.unwrap();
        }
        assert!(handler.max_running.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_full_queue_is_reported() {
        let registry = Arc::new(CorrelationRegistry::new());
        let gate = Arc::new(Notify::new());
        let handler = EchoHandler::new(registry.clone(), Some(gate.clone()));
        let (_tx, rx) = watch::channel(false);
        let (engine, _task) = InProcessEngine::spawn(handler, registry, 1, 1, rx);

        // First job runs and blocks, second is held by the dispatcher
        // waiting for a permit, third fills the queue.
        for _ in 0..3 {
            engine.start(engine.reserve(), send_request()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let err = engine
            .start(engine.reserve(), send_request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::QueueFull));
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn test_panicking_step_publishes_aborted() {
        let registry = Arc::new(CorrelationRegistry::new());
        let handler = EchoHandler::new(registry.clone(), None);
        let (_tx, rx) = watch::channel(false);
        let (engine, _task) = InProcessEngine::spawn(handler, registry.clone(), 1, 4, rx);

        let id = engine.reserve();
        let handle = registry.register(id).unwrap();
        engine
            .start(
                id,
                ProcessRequest::ValidateCode {
                    operation_id: OperationId(1),
                    code: "panic".into(),
                },
            )
            .await
            .unwrap();

        let outcome = registry.wait(handle, Duration::from_secs(5)).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Aborted { .. }));
    }

    #[tokio::test]
    async fn test_start_after_shutdown_is_unavailable() {
        let registry = Arc::new(CorrelationRegistry::new());
        let handler = EchoHandler::new(registry.clone(), None);
        let (tx, rx) = watch::channel(false);
        let (engine, task) = InProcessEngine::spawn(handler, registry, 1, 4, rx);

        tx.send(true).unwrap();
        task.await.unwrap();

        let err = engine
            .start(engine.reserve(), send_request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }
}
