//! Upload worker: consumes broker deliveries and settles them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use patent_core::{defaults, Error, Result};

use crate::broker::{Delivery, MessageBroker};
use crate::handler::MessageHandler;

/// Pause after a failed receive before polling the broker again.
const RECEIVE_ERROR_BACKOFF_MS: u64 = 1000;

/// Configuration for the upload worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum deliveries processed concurrently.
    pub prefetch_count: usize,
    /// Per-job timeout in seconds; an expired job is nacked and requeued.
    pub job_timeout_secs: u64,
    /// Seconds a receive blocks before shutdown is re-checked.
    pub receive_wait_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            prefetch_count: defaults::BROKER_PREFETCH_COUNT,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
            receive_wait_secs: defaults::BROKER_RECEIVE_WAIT_SECS,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `BROKER_PREFETCH_COUNT` | `1` | Max in-flight deliveries |
    /// | `JOB_TIMEOUT_SECS` | `3600` | Per-job timeout |
    pub fn from_env() -> Self {
        let prefetch_count = std::env::var("BROKER_PREFETCH_COUNT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::BROKER_PREFETCH_COUNT)
            .max(1);

        let job_timeout_secs = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_TIMEOUT_SECS);

        Self {
            prefetch_count,
            job_timeout_secs,
            ..Self::default()
        }
    }

    pub fn with_prefetch_count(mut self, count: usize) -> Self {
        self.prefetch_count = count.max(1);
        self
    }

    pub fn with_job_timeout_secs(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    pub fn with_receive_wait_secs(mut self, secs: u64) -> Self {
        self.receive_wait_secs = secs;
        self
    }
}

/// Event emitted by the upload worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    WorkerStarted,
    WorkerStopped,
    /// A delivery was handed to the handler.
    JobStarted { delivery_id: Uuid },
    /// The completion message was published and the delivery acknowledged.
    JobCompleted { delivery_id: Uuid },
    /// The delivery was nacked.
    JobFailed {
        delivery_id: Uuid,
        error: String,
        requeued: bool,
    },
    /// An empty delivery was acknowledged without processing.
    MessageSkipped { delivery_id: Uuid },
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    task: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down. In-flight jobs are cancelled and
    /// requeued.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Wait until the worker loop has exited.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = ?e, "Upload worker task panicked");
        }
    }
}

/// Consumes upload jobs from a [`MessageBroker`].
pub struct UploadWorker {
    broker: Arc<dyn MessageBroker>,
    handler: Arc<dyn MessageHandler>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl UploadWorker {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        handler: Arc<dyn MessageHandler>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            broker,
            handler,
            config,
            event_tx,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let task = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    /// Receive loop. Receives only while fewer than `prefetch_count`
    /// deliveries are in flight.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        info!(
            prefetch_count = self.config.prefetch_count,
            job_timeout_secs = self.config.job_timeout_secs,
            "Upload worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let wait = Duration::from_secs(self.config.receive_wait_secs);
        let prefetch = self.config.prefetch_count.max(1);
        let mut tasks = JoinSet::new();

        loop {
            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }

            if tasks.len() >= prefetch {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Upload worker received shutdown signal");
                        break;
                    }
                    Some(joined) = tasks.join_next() => log_join(joined),
                }
                continue;
            }

            if shutdown_rx.try_recv().is_ok() {
                info!("Upload worker received shutdown signal");
                break;
            }

            match self.broker.receive(wait).await {
                Ok(Some(delivery)) => {
                    let worker = self.clone_refs(cancel_rx.clone());
                    tasks.spawn(async move {
                        worker.process(delivery).await;
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Failed to receive from broker");
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!("Upload worker received shutdown signal");
                            break;
                        }
                        _ = sleep(Duration::from_millis(RECEIVE_ERROR_BACKOFF_MS)) => {}
                    }
                }
            }
        }

        if !tasks.is_empty() {
            debug!(in_flight = tasks.len(), "Cancelling in-flight jobs");
        }
        let _ = cancel_tx.send(true);
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Upload worker stopped");
    }

    fn clone_refs(&self, shutdown: watch::Receiver<bool>) -> UploadWorkerRef {
        UploadWorkerRef {
            broker: self.broker.clone(),
            handler: self.handler.clone(),
            event_tx: self.event_tx.clone(),
            job_timeout: Duration::from_secs(self.config.job_timeout_secs),
            shutdown,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = ?e, "Upload job task panicked");
    }
}

/// References needed to process one delivery in a spawned task.
struct UploadWorkerRef {
    broker: Arc<dyn MessageBroker>,
    handler: Arc<dyn MessageHandler>,
    event_tx: broadcast::Sender<WorkerEvent>,
    job_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl UploadWorkerRef {
    /// Run the handler and settle the delivery:
    /// handler failure requeues, a failed completion publish does not.
    async fn process(self, delivery: Delivery) {
        let start = Instant::now();
        let delivery_id = delivery.id;

        if delivery.body.is_empty() {
            warn!(%delivery_id, "Skipping empty delivery");
            self.ack(&delivery).await;
            let _ = self
                .event_tx
                .send(WorkerEvent::MessageSkipped { delivery_id });
            return;
        }

        info!(%delivery_id, "Processing upload job");
        let _ = self.event_tx.send(WorkerEvent::JobStarted { delivery_id });

        let handled = match tokio::time::timeout(
            self.job_timeout,
            self.handler.handle(&delivery.body, self.shutdown.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled(format!(
                "job exceeded timeout of {}s",
                self.job_timeout.as_secs()
            ))),
        };

        let reply = match handled {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    %delivery_id,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Upload job failed, requeueing"
                );
                self.nack(&delivery, true).await;
                let _ = self.event_tx.send(WorkerEvent::JobFailed {
                    delivery_id,
                    error: e.to_string(),
                    requeued: true,
                });
                return;
            }
        };

        if let Err(e) = self.broker.publish(&reply).await {
            // The records are already committed; requeueing would ingest them twice.
            error!(%delivery_id, error = %e, "Failed to publish completion, dropping delivery");
            self.nack(&delivery, false).await;
            let _ = self.event_tx.send(WorkerEvent::JobFailed {
                delivery_id,
                error: e.to_string(),
                requeued: false,
            });
            return;
        }

        self.ack(&delivery).await;
        info!(
            %delivery_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Upload job completed"
        );
        let _ = self
            .event_tx
            .send(WorkerEvent::JobCompleted { delivery_id });
    }

    async fn ack(&self, delivery: &Delivery) {
        if let Err(e) = self.broker.ack(delivery).await {
            error!(delivery_id = %delivery.id, error = %e, "Failed to ack delivery");
        }
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) {
        if let Err(e) = self.broker.nack(delivery, requeue).await {
            error!(delivery_id = %delivery.id, requeue, error = %e, "Failed to nack delivery");
        }
    }
}
