//! Upload handler and worker behavior against in-memory collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use patent_core::{
    Error, FilterSet, PatentProvider, PatentRecord, PatentStore, RawPage, Result,
    SearchStatistics, UploadCompleted,
};
use patent_jobs::{
    Delivery, IngestionPipeline, MessageBroker, MessageHandler, PatentExtractor, PipelineConfig,
    UploadHandler, UploadWorker, WorkerConfig, WorkerEvent,
};

// =============================================================================
// Doubles
// =============================================================================

struct FakeProvider {
    total: i64,
    fail_search: bool,
}

#[async_trait]
impl PatentProvider for FakeProvider {
    async fn search(&self, _filters: &FilterSet, offset: i64, count: i64) -> Result<RawPage> {
        if self.fail_search {
            return Err(Error::Provider("Provider returned 503: unavailable".into()));
        }
        let end = (offset + count).min(self.total);
        let items: Vec<_> = (offset..end)
            .map(|n| json!({"documentNumber": format!("US{:07}B2", n)}))
            .collect();
        Ok(RawPage::new(json!({"response": {"items": items}}).to_string()))
    }

    async fn statistics(&self, _filters: &FilterSet) -> Result<SearchStatistics> {
        Ok(SearchStatistics {
            total_found: self.total,
            ..Default::default()
        })
    }
}

#[derive(Default)]
struct RecordingStore {
    saves: Mutex<Vec<(usize, Uuid, Uuid)>>,
}

#[async_trait]
impl PatentStore for RecordingStore {
    async fn save(&self, records: &[PatentRecord], transaction_id: Uuid, bundle_id: Uuid) -> Result<()> {
        self.saves
            .lock()
            .unwrap()
            .push((records.len(), transaction_id, bundle_id));
        Ok(())
    }
}

#[derive(Default)]
struct MemoryBroker {
    queue: Mutex<VecDeque<Vec<u8>>>,
    acked: Mutex<Vec<Vec<u8>>>,
    nacked: Mutex<Vec<(Vec<u8>, bool)>>,
    published: Mutex<Vec<Vec<u8>>>,
    fail_publish: bool,
}

impl MemoryBroker {
    fn push(&self, body: &[u8]) {
        self.queue.lock().unwrap().push_back(body.to_vec());
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>> {
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(body) => Ok(Some(Delivery::new(body))),
            None => {
                tokio::time::sleep(wait.min(Duration::from_millis(10))).await;
                Ok(None)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.acked.lock().unwrap().push(delivery.body.clone());
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        self.nacked
            .lock()
            .unwrap()
            .push((delivery.body.clone(), requeue));
        Ok(())
    }

    async fn publish(&self, body: &[u8]) -> Result<()> {
        if self.fail_publish {
            return Err(Error::Broker("publish: connection reset".into()));
        }
        self.published.lock().unwrap().push(body.to_vec());
        Ok(())
    }
}

enum Script {
    Echo,
    Fail,
    Sleep(Duration),
    WaitForShutdown,
}

struct ScriptedHandler {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    async fn handle(&self, payload: &[u8], mut shutdown: watch::Receiver<bool>) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Echo => Ok(payload.to_vec()),
            Script::Fail => Err(Error::Provider("Provider returned 500: boom".into())),
            Script::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(payload.to_vec())
            }
            Script::WaitForShutdown => {
                while !*shutdown.borrow_and_update() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
                Err(Error::Cancelled("shutdown".into()))
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn upload_handler(provider: FakeProvider, store: Arc<RecordingStore>) -> UploadHandler {
    let pipeline = IngestionPipeline::new(
        Arc::new(provider),
        PatentExtractor::new("https://provider.test/patents/pdf"),
        PipelineConfig::default(),
    );
    UploadHandler::new(Arc::new(pipeline), store)
}

fn job_body(transaction_id: Uuid, bundle_id: Uuid) -> Vec<u8> {
    json!({
        "filters": {"authority": ["US"]},
        "transaction_id": transaction_id,
        "bundle_id": bundle_id
    })
    .to_string()
    .into_bytes()
}

/// A shutdown signal whose sender is gone; it can never be raised.
fn not_cancelled() -> watch::Receiver<bool> {
    watch::channel(false).1
}

async fn next_settled(events: &mut broadcast::Receiver<WorkerEvent>) -> WorkerEvent {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match events.recv().await {
                Ok(event @ WorkerEvent::JobCompleted { .. })
                | Ok(event @ WorkerEvent::JobFailed { .. })
                | Ok(event @ WorkerEvent::MessageSkipped { .. }) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event channel failed: {:?}", e),
            }
        }
    })
    .await
    .expect("worker should settle the delivery")
}

fn fast_config() -> WorkerConfig {
    WorkerConfig::default().with_receive_wait_secs(1)
}

// =============================================================================
// UploadHandler
// =============================================================================

#[tokio::test]
async fn test_handler_persists_every_record_and_replies() {
    let store = Arc::new(RecordingStore::default());
    let handler = upload_handler(
        FakeProvider {
            total: 45,
            fail_search: false,
        },
        store.clone(),
    );
    let (transaction_id, bundle_id) = (Uuid::new_v4(), Uuid::new_v4());

    let reply = handler
        .handle(&job_body(transaction_id, bundle_id), not_cancelled())
        .await
        .unwrap();

    let completed: UploadCompleted = serde_json::from_slice(&reply).unwrap();
    assert_eq!(completed.transaction_id, transaction_id);
    assert_eq!(completed.bundle_id, bundle_id);
    assert_eq!(
        *store.saves.lock().unwrap(),
        vec![(45, transaction_id, bundle_id)]
    );
}

#[tokio::test]
async fn test_handler_zero_results_saves_empty_and_replies() {
    let store = Arc::new(RecordingStore::default());
    let handler = upload_handler(
        FakeProvider {
            total: 0,
            fail_search: false,
        },
        store.clone(),
    );
    let (transaction_id, bundle_id) = (Uuid::new_v4(), Uuid::new_v4());

    let reply = handler
        .handle(&job_body(transaction_id, bundle_id), not_cancelled())
        .await
        .unwrap();

    let completed: UploadCompleted = serde_json::from_slice(&reply).unwrap();
    assert_eq!(completed.transaction_id, transaction_id);
    assert_eq!(
        *store.saves.lock().unwrap(),
        vec![(0, transaction_id, bundle_id)]
    );
}

#[tokio::test]
async fn test_handler_fetch_error_never_saves() {
    let store = Arc::new(RecordingStore::default());
    let handler = upload_handler(
        FakeProvider {
            total: 100,
            fail_search: true,
        },
        store.clone(),
    );

    let result = handler
        .handle(&job_body(Uuid::new_v4(), Uuid::new_v4()), not_cancelled())
        .await;

    assert!(matches!(result, Err(Error::Provider(_))));
    assert!(store.saves.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_handler_parse_error_never_saves() {
    struct PagesWithoutItems;

    #[async_trait]
    impl PatentProvider for PagesWithoutItems {
        async fn search(&self, _: &FilterSet, _: i64, _: i64) -> Result<RawPage> {
            Ok(RawPage::new(r#"{"response": {}}"#))
        }

        async fn statistics(&self, _: &FilterSet) -> Result<SearchStatistics> {
            Ok(SearchStatistics {
                total_found: 30,
                ..Default::default()
            })
        }
    }

    let store = Arc::new(RecordingStore::default());
    let pipeline = IngestionPipeline::new(
        Arc::new(PagesWithoutItems),
        PatentExtractor::new("https://provider.test/patents/pdf"),
        PipelineConfig::default(),
    );
    let handler = UploadHandler::new(Arc::new(pipeline), store.clone());

    let result = handler
        .handle(&job_body(Uuid::new_v4(), Uuid::new_v4()), not_cancelled())
        .await;

    assert!(matches!(result, Err(Error::MalformedResponse(_))));
    assert!(store.saves.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_handler_ignores_preview_pagination() {
    let store = Arc::new(RecordingStore::default());
    let handler = upload_handler(
        FakeProvider {
            total: 25,
            fail_search: false,
        },
        store.clone(),
    );
    let (transaction_id, bundle_id) = (Uuid::new_v4(), Uuid::new_v4());
    let body = json!({
        "filters": {"authority": ["US"], "limit": 100_000_000_000_i64, "offset": 7},
        "transaction_id": transaction_id,
        "bundle_id": bundle_id
    })
    .to_string();

    handler.handle(body.as_bytes(), not_cancelled()).await.unwrap();

    assert_eq!(
        *store.saves.lock().unwrap(),
        vec![(25, transaction_id, bundle_id)]
    );
}

#[tokio::test]
async fn test_handler_rejects_undecodable_job() {
    let store = Arc::new(RecordingStore::default());
    let handler = upload_handler(
        FakeProvider {
            total: 1,
            fail_search: false,
        },
        store.clone(),
    );

    let result = handler.handle(b"{not json", not_cancelled()).await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(store.saves.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_handler_rejects_malformed_filter_date() {
    let store = Arc::new(RecordingStore::default());
    let handler = upload_handler(
        FakeProvider {
            total: 1,
            fail_search: false,
        },
        store.clone(),
    );
    let body = json!({
        "filters": {"publication_date": [{"min": "yesterday", "max": "2024-01-01"}]},
        "transaction_id": Uuid::new_v4(),
        "bundle_id": Uuid::new_v4()
    })
    .to_string();

    let result = handler.handle(body.as_bytes(), not_cancelled()).await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(store.saves.lock().unwrap().is_empty());
}

// =============================================================================
// UploadWorker
// =============================================================================

#[tokio::test]
async fn test_worker_success_publishes_then_acks() {
    let broker = Arc::new(MemoryBroker::default());
    let handler = ScriptedHandler::new(Script::Echo);
    let handle = UploadWorker::new(broker.clone(), handler.clone(), fast_config()).start();
    let mut events = handle.events();

    broker.push(b"job-1");
    let event = next_settled(&mut events).await;

    assert!(matches!(event, WorkerEvent::JobCompleted { .. }));
    assert_eq!(*broker.published.lock().unwrap(), vec![b"job-1".to_vec()]);
    assert_eq!(*broker.acked.lock().unwrap(), vec![b"job-1".to_vec()]);
    assert!(broker.nacked.lock().unwrap().is_empty());

    handle.shutdown().await.unwrap();
    handle.join().await;
}

#[tokio::test]
async fn test_worker_handler_error_nacks_with_requeue() {
    let broker = Arc::new(MemoryBroker::default());
    let handler = ScriptedHandler::new(Script::Fail);
    let handle = UploadWorker::new(broker.clone(), handler.clone(), fast_config()).start();
    let mut events = handle.events();

    broker.push(b"job-2");
    let event = next_settled(&mut events).await;

    match event {
        WorkerEvent::JobFailed { requeued, .. } => assert!(requeued),
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(
        *broker.nacked.lock().unwrap(),
        vec![(b"job-2".to_vec(), true)]
    );
    assert!(broker.published.lock().unwrap().is_empty());
    assert!(broker.acked.lock().unwrap().is_empty());

    handle.shutdown().await.unwrap();
    handle.join().await;
}

#[tokio::test]
async fn test_worker_publish_error_nacks_without_requeue() {
    let broker = Arc::new(MemoryBroker {
        fail_publish: true,
        ..Default::default()
    });
    let handler = ScriptedHandler::new(Script::Echo);
    let handle = UploadWorker::new(broker.clone(), handler.clone(), fast_config()).start();
    let mut events = handle.events();

    broker.push(b"job-3");
    let event = next_settled(&mut events).await;

    match event {
        WorkerEvent::JobFailed { requeued, .. } => assert!(!requeued),
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(
        *broker.nacked.lock().unwrap(),
        vec![(b"job-3".to_vec(), false)]
    );
    assert!(broker.acked.lock().unwrap().is_empty());

    handle.shutdown().await.unwrap();
    handle.join().await;
}

#[tokio::test]
async fn test_worker_empty_message_is_acked_and_skipped() {
    let broker = Arc::new(MemoryBroker::default());
    let handler = ScriptedHandler::new(Script::Echo);
    let handle = UploadWorker::new(broker.clone(), handler.clone(), fast_config()).start();
    let mut events = handle.events();

    broker.push(b"");
    let event = next_settled(&mut events).await;

    assert!(matches!(event, WorkerEvent::MessageSkipped { .. }));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(broker.acked.lock().unwrap().len(), 1);
    assert!(broker.published.lock().unwrap().is_empty());

    handle.shutdown().await.unwrap();
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_worker_timed_out_job_is_requeued() {
    let broker = Arc::new(MemoryBroker::default());
    let handler = ScriptedHandler::new(Script::Sleep(Duration::from_secs(120)));
    let config = fast_config().with_job_timeout_secs(1);
    let handle = UploadWorker::new(broker.clone(), handler.clone(), config).start();
    let mut events = handle.events();

    broker.push(b"job-4");
    let event = next_settled(&mut events).await;

    match event {
        WorkerEvent::JobFailed { requeued, error, .. } => {
            assert!(requeued);
            assert!(error.contains("timeout"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(broker.published.lock().unwrap().is_empty());

    handle.shutdown().await.unwrap();
    handle.join().await;
}

#[tokio::test]
async fn test_worker_shutdown_cancels_and_requeues_in_flight_job() {
    let broker = Arc::new(MemoryBroker::default());
    let handler = ScriptedHandler::new(Script::WaitForShutdown);
    let handle = UploadWorker::new(broker.clone(), handler.clone(), fast_config()).start();
    let mut events = handle.events();

    broker.push(b"job-5");
    loop {
        match events.recv().await.unwrap() {
            WorkerEvent::JobStarted { .. } => break,
            _ => continue,
        }
    }

    handle.shutdown().await.unwrap();
    handle.join().await;

    assert_eq!(
        *broker.nacked.lock().unwrap(),
        vec![(b"job-5".to_vec(), true)]
    );
    assert!(broker.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_worker_respects_prefetch_count() {
    let broker = Arc::new(MemoryBroker::default());
    let handler = ScriptedHandler::new(Script::WaitForShutdown);
    let handle = UploadWorker::new(broker.clone(), handler.clone(), fast_config()).start();
    let mut events = handle.events();

    broker.push(b"job-6");
    broker.push(b"job-7");
    loop {
        match events.recv().await.unwrap() {
            WorkerEvent::JobStarted { .. } => break,
            _ => continue,
        }
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Prefetch of one: the second job stays queued while the first is in flight.
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(broker.queue.lock().unwrap().len(), 1);

    handle.shutdown().await.unwrap();
    handle.join().await;
}
